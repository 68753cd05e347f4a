//! Deployment: attempt state machine, resilient deployer, queue and rollback

pub mod deployer;
pub mod fsm;
pub mod queue;
pub mod rollback;
