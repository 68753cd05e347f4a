//! Effective configuration: template merging and server translation

pub mod merge;
pub mod translate;
