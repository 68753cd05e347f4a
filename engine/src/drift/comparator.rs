//! Semantic comparison of expected vs. live server configuration

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::translate::Translator;
use crate::models::drift::{Difference, DifferenceKind, DriftResult, FieldMapping, ResponseShape};
use crate::models::site::Detector;

/// Keys under which newer servers wrap the live configuration
const WRAPPER_KEYS: &[&str] = &["configuration", "config", "active_config"];

/// Drift detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftSettings {
    /// Allowed absolute difference for thresholds, in points (0-100)
    #[serde(default = "default_threshold_tolerance")]
    pub threshold_tolerance: f64,

    /// Minimum share of expected keywords the server must carry
    #[serde(default = "default_keyword_overlap")]
    pub keyword_overlap: f64,

    /// Interval between scheduled drift checks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_threshold_tolerance() -> f64 {
    5.0
}

fn default_keyword_overlap() -> f64 {
    0.8
}

fn default_interval_secs() -> u64 {
    900
}

fn default_true() -> bool {
    true
}

impl Default for DriftSettings {
    fn default() -> Self {
        Self {
            threshold_tolerance: default_threshold_tolerance(),
            keyword_overlap: default_keyword_overlap(),
            interval_secs: default_interval_secs(),
            enabled: true,
        }
    }
}

/// How a field's expected and actual values are matched
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Matcher {
    /// Numeric, within an absolute tolerance
    Threshold { tolerance: f64 },

    /// Keyword sets; share of expected keywords present on the server
    KeywordOverlap { min_ratio: f64 },

    /// Equal values (numbers compared numerically)
    Exact,

    /// Map of boolean flags compared key by key
    Flags,
}

impl Matcher {
    fn tolerance(&self) -> Option<f64> {
        match self {
            Matcher::Threshold { tolerance } => Some(*tolerance),
            Matcher::KeywordOverlap { min_ratio } => Some(*min_ratio),
            Matcher::Exact | Matcher::Flags => None,
        }
    }
}

/// One unified field and the server fields it maps to
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub unified_field: &'static str,
    pub server_fields: &'static [&'static str],
    pub matcher: Matcher,
}

/// Rules for the numeric detector
pub fn nudenet_rules(settings: &DriftSettings) -> Vec<FieldRule> {
    let threshold = Matcher::Threshold {
        tolerance: settings.threshold_tolerance,
    };
    vec![
        FieldRule {
            unified_field: "detection_threshold",
            server_fields: &["public_gallery_threshold", "private_share_threshold", "default_threshold"],
            matcher: threshold,
        },
        FieldRule {
            unified_field: "body_part_thresholds",
            server_fields: &["body_part_threshold"],
            matcher: threshold,
        },
        FieldRule {
            unified_field: "nudenet_components",
            server_fields: &["nudenet_components"],
            matcher: Matcher::Flags,
        },
    ]
}

/// Rules for the keyword detector
pub fn blip_rules(settings: &DriftSettings) -> Vec<FieldRule> {
    vec![
        FieldRule {
            unified_field: "child_keywords",
            server_fields: &["child_keywords"],
            matcher: Matcher::KeywordOverlap {
                min_ratio: settings.keyword_overlap,
            },
        },
        FieldRule {
            unified_field: "risk_multiplier",
            server_fields: &["risk_threshold"],
            matcher: Matcher::Threshold {
                tolerance: settings.threshold_tolerance,
            },
        },
        FieldRule {
            unified_field: "age_threshold",
            server_fields: &["age_threshold"],
            matcher: Matcher::Exact,
        },
        FieldRule {
            unified_field: "blip_components",
            server_fields: &["blip_components"],
            matcher: Matcher::Flags,
        },
    ]
}

/// Detect the response shape and return the configuration object inside it
pub fn normalize_response(raw: &Value) -> (Option<&serde_json::Map<String, Value>>, ResponseShape) {
    let Some(map) = raw.as_object() else {
        return (None, ResponseShape::Unreadable);
    };

    for key in WRAPPER_KEYS {
        if let Some(inner) = map.get(*key).and_then(Value::as_object) {
            return (Some(inner), ResponseShape::Wrapped);
        }
    }

    (Some(map), ResponseShape::Flat)
}

/// Compares the effective configuration against what a server reports
#[derive(Debug, Clone)]
pub struct Comparator {
    translator: Translator,
    nudenet_rules: Vec<FieldRule>,
    blip_rules: Vec<FieldRule>,
}

impl Comparator {
    pub fn new(translator: Translator, settings: &DriftSettings) -> Self {
        Self {
            translator,
            nudenet_rules: nudenet_rules(settings),
            blip_rules: blip_rules(settings),
        }
    }

    pub fn rules(&self, detector: Detector) -> &[FieldRule] {
        match detector {
            Detector::Nudenet => &self.nudenet_rules,
            Detector::Blip => &self.blip_rules,
        }
    }

    /// Compare a unified block against the server's raw response
    pub fn compare(&self, detector: Detector, expected_unified: &Value, actual_raw: &Value) -> DriftResult {
        let expected = self.translator.to_server_value(detector, expected_unified);
        self.compare_translated(detector, &expected, actual_raw)
    }

    /// Compare an already-translated block against the server's raw response
    pub fn compare_translated(&self, detector: Detector, expected: &Value, actual_raw: &Value) -> DriftResult {
        let (actual, shape) = normalize_response(actual_raw);

        let Some(actual) = actual else {
            return DriftResult {
                detector,
                overall_match: false,
                differences: vec![Difference {
                    kind: DifferenceKind::Missing,
                    path: detector.as_str().to_string(),
                    expected: Some(expected.clone()),
                    actual: Some(actual_raw.clone()),
                    message: "server did not return a configuration object".to_string(),
                }],
                mappings: Vec::new(),
                response_shape: shape,
            };
        };

        let mut differences = Vec::new();
        let mut mappings = Vec::new();

        for rule in self.rules(detector) {
            apply_rule(detector, rule, expected, actual, &mut differences, &mut mappings);
        }

        DriftResult {
            detector,
            overall_match: differences.is_empty(),
            differences,
            mappings,
            response_shape: shape,
        }
    }

    /// Result for a detector the server does not run
    pub fn skipped(&self, detector: Detector) -> DriftResult {
        DriftResult {
            detector,
            overall_match: true,
            differences: Vec::new(),
            mappings: Vec::new(),
            response_shape: ResponseShape::Skipped,
        }
    }

    /// Result for a detector whose live config could not be read
    pub fn unreadable(&self, detector: Detector, reason: &str) -> DriftResult {
        DriftResult {
            detector,
            overall_match: false,
            differences: vec![Difference {
                kind: DifferenceKind::Missing,
                path: detector.as_str().to_string(),
                expected: None,
                actual: None,
                message: format!("live configuration unreadable: {}", reason),
            }],
            mappings: Vec::new(),
            response_shape: ResponseShape::Unreadable,
        }
    }
}

fn apply_rule(
    detector: Detector,
    rule: &FieldRule,
    expected: &Value,
    actual: &serde_json::Map<String, Value>,
    differences: &mut Vec<Difference>,
    mappings: &mut Vec<FieldMapping>,
) {
    let grouped_threshold =
        matches!(rule.matcher, Matcher::Threshold { .. }) && rule.server_fields.len() > 1;

    if grouped_threshold && rule.server_fields.iter().all(|f| actual.get(*f).is_none()) {
        let expected_points: Vec<Value> = rule
            .server_fields
            .iter()
            .filter_map(|f| expected.get(*f).cloned())
            .collect();
        differences.push(Difference {
            kind: DifferenceKind::NoMatchingThreshold,
            path: format!("{}.{}", detector, rule.unified_field),
            expected: Some(Value::Array(expected_points)),
            actual: None,
            message: format!(
                "server exposes none of {} for {}",
                rule.server_fields.join(", "),
                rule.unified_field
            ),
        });
        for field in rule.server_fields {
            mappings.push(FieldMapping {
                unified_field: rule.unified_field.to_string(),
                server_field: field.to_string(),
                expected: expected.get(*field).cloned(),
                actual: None,
                matched: false,
                tolerance: rule.matcher.tolerance(),
            });
        }
        return;
    }

    for field in rule.server_fields {
        let Some(expected_value) = expected.get(*field) else {
            continue;
        };
        let actual_value = actual.get(*field);
        let path = format!("{}.{}", detector, field);

        let before = differences.len();
        match actual_value {
            None => differences.push(Difference {
                kind: DifferenceKind::Missing,
                path: path.clone(),
                expected: Some(expected_value.clone()),
                actual: None,
                message: format!("{} is not set on the server", field),
            }),
            Some(actual_value) => {
                match_value(&rule.matcher, &path, expected_value, actual_value, differences)
            }
        }

        mappings.push(FieldMapping {
            unified_field: rule.unified_field.to_string(),
            server_field: field.to_string(),
            expected: Some(expected_value.clone()),
            actual: actual_value.cloned(),
            matched: differences.len() == before,
            tolerance: rule.matcher.tolerance(),
        });
    }
}

fn match_value(matcher: &Matcher, path: &str, expected: &Value, actual: &Value, differences: &mut Vec<Difference>) {
    let diff = |kind: DifferenceKind, message: String| Difference {
        kind,
        path: path.to_string(),
        expected: Some(expected.clone()),
        actual: Some(actual.clone()),
        message,
    };

    match matcher {
        Matcher::Threshold { tolerance } => match (expected.as_f64(), actual.as_f64()) {
            (Some(e), Some(a)) => {
                if (e - a).abs() > *tolerance {
                    differences.push(diff(
                        DifferenceKind::ThresholdMismatch,
                        format!("expected {} (±{}), server has {}", e, tolerance, a),
                    ));
                }
            }
            _ => differences.push(diff(DifferenceKind::TypeMismatch, "expected a number".to_string())),
        },

        Matcher::KeywordOverlap { min_ratio } => {
            let (Some(expected_list), Some(actual_list)) = (expected.as_array(), actual.as_array()) else {
                differences.push(diff(DifferenceKind::TypeMismatch, "expected a keyword list".to_string()));
                return;
            };
            let expected_set = keyword_set(expected_list);
            let actual_set = keyword_set(actual_list);
            if expected_set.is_empty() {
                return;
            }
            let shared = expected_set.intersection(&actual_set).count();
            let ratio = shared as f64 / expected_set.len() as f64;
            if ratio < *min_ratio {
                let mut missing: Vec<&String> = expected_set.difference(&actual_set).collect();
                missing.sort();
                differences.push(diff(
                    DifferenceKind::KeywordMismatch,
                    format!(
                        "keyword overlap {:.0}% below {:.0}%; missing: {}",
                        ratio * 100.0,
                        min_ratio * 100.0,
                        missing.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                    ),
                ));
            }
        }

        Matcher::Exact => {
            let equal = match (expected.as_f64(), actual.as_f64()) {
                (Some(e), Some(a)) => e == a,
                _ => expected == actual,
            };
            if !equal {
                let kind = if same_type(expected, actual) {
                    DifferenceKind::ValueMismatch
                } else {
                    DifferenceKind::TypeMismatch
                };
                differences.push(diff(kind, format!("expected {}, server has {}", expected, actual)));
            }
        }

        Matcher::Flags => {
            let (Some(expected_flags), Some(actual_flags)) = (expected.as_object(), actual.as_object()) else {
                differences.push(diff(DifferenceKind::TypeMismatch, "expected a flag map".to_string()));
                return;
            };
            for (name, flag) in expected_flags {
                let flag_path = format!("{}.{}", path, name);
                match actual_flags.get(name) {
                    None => differences.push(Difference {
                        kind: DifferenceKind::Missing,
                        path: flag_path,
                        expected: Some(flag.clone()),
                        actual: None,
                        message: format!("component {} is not reported by the server", name),
                    }),
                    Some(actual_flag) if actual_flag != flag => differences.push(Difference {
                        kind: if actual_flag.is_boolean() {
                            DifferenceKind::ValueMismatch
                        } else {
                            DifferenceKind::TypeMismatch
                        },
                        path: flag_path,
                        expected: Some(flag.clone()),
                        actual: Some(actual_flag.clone()),
                        message: format!("component {} expected {}, server has {}", name, flag, actual_flag),
                    }),
                    Some(_) => {}
                }
            }
            for (name, actual_flag) in actual_flags {
                if !expected_flags.contains_key(name) {
                    differences.push(Difference {
                        kind: DifferenceKind::Extra,
                        path: format!("{}.{}", path, name),
                        expected: None,
                        actual: Some(actual_flag.clone()),
                        message: format!("server reports unexpected component {}", name),
                    });
                }
            }
        }
    }
}

fn keyword_set(list: &[Value]) -> HashSet<String> {
    list.iter()
        .filter_map(Value::as_str)
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn same_type(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}
