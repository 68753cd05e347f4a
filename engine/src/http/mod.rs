//! HTTP transport and moderation server endpoints

pub mod client;
pub mod moderation;
