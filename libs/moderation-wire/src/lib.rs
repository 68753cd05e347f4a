//! Remote moderation server wire models

pub mod models;

pub use models::*;
