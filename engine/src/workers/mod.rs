//! Background workers

pub mod drift_monitor;
pub mod sweeper;
