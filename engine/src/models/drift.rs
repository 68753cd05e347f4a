//! Drift detection models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::site::Detector;

/// Drift severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::None => "none",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// Kind of a single difference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifferenceKind {
    ThresholdMismatch,
    KeywordMismatch,
    NoMatchingThreshold,
    TypeMismatch,
    ValueMismatch,
    Missing,
    Extra,
}

/// A single expected/actual divergence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Difference {
    pub kind: DifferenceKind,
    /// Dotted path, e.g. `blip.child_keywords`
    pub path: String,
    #[serde(default)]
    pub expected: Option<serde_json::Value>,
    #[serde(default)]
    pub actual: Option<serde_json::Value>,
    pub message: String,
}

/// How one unified field mapped onto the server schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub unified_field: String,
    pub server_field: String,
    #[serde(default)]
    pub expected: Option<serde_json::Value>,
    #[serde(default)]
    pub actual: Option<serde_json::Value>,
    pub matched: bool,
    /// Tolerance or overlap ratio applied, if any
    #[serde(default)]
    pub tolerance: Option<f64>,
}

/// Comparison result for one detector family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftResult {
    pub detector: Detector,
    pub overall_match: bool,
    pub differences: Vec<Difference>,
    pub mappings: Vec<FieldMapping>,
    /// `configuration`-wrapped (newer) or flat (older) server response
    pub response_shape: ResponseShape,
}

/// Shape the server used to return its live configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseShape {
    Wrapped,
    Flat,
    Unreadable,
    /// Detector not supported by the server; nothing compared
    Skipped,
}

/// Persisted result of one comparison run; never mutated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftLogEntry {
    pub id: u64,
    pub site_id: u64,
    pub server_id: u64,
    pub config_version: u64,
    pub nudenet_match: bool,
    pub blip_match: bool,
    pub differences: Vec<Difference>,
    pub nudenet: DriftResult,
    pub blip: DriftResult,
    pub severity: Severity,
    /// Keyword endpoint known not to implement writes
    pub known_limitation: bool,
    pub checked_at: DateTime<Utc>,
}

impl DriftLogEntry {
    pub fn overall_match(&self) -> bool {
        self.nudenet_match && self.blip_match
    }
}
