//! Drift detection between intended and live configuration

pub mod comparator;
pub mod severity;
