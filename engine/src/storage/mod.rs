//! Persistence: data directory layout, settings and the store

pub mod layout;
pub mod memory;
pub mod settings;
pub mod store;
