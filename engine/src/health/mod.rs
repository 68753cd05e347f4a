//! Server health probing

pub mod prober;
