//! modsync library
//!
//! Moderation configuration deployment and drift reconciliation.

pub mod app;
pub mod config;
pub mod deploy;
pub mod drift;
pub mod errors;
pub mod filesys;
pub mod health;
pub mod http;
pub mod logs;
pub mod models;
pub mod server;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod workers;
