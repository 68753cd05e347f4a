//! Reconciliation of intended and live configuration

pub mod reconciler;
