//! Data models

pub mod deployment;
pub mod drift;
pub mod history;
pub mod queue;
pub mod server;
pub mod site;
