//! Unified schema -> server schema translation

use std::collections::{BTreeMap, HashSet};

use moderation_wire::{BlipServerConfig, NudenetServerConfig};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::site::Detector;

/// Unified numeric detector fields consumed by the translator
const NUDENET_KEYS: &[&str] = &[
    "detection_threshold",
    "body_part_thresholds",
    "nudenet_components",
    "components",
];

/// Unified keyword detector fields consumed by the translator
const BLIP_KEYS: &[&str] = &[
    "child_keywords",
    "risk_multiplier",
    "age_threshold",
    "blip_components",
    "components",
];

pub const NUDENET_COMPONENTS: &[&str] = &[
    "breast_detection",
    "genitalia_detection",
    "buttocks_detection",
    "anus_detection",
    "face_detection",
];

pub const BLIP_COMPONENTS: &[&str] = &["age_estimation", "child_content_detection", "image_description"];

pub const DEFAULT_CHILD_KEYWORDS: &[&str] =
    &["child", "kid", "baby", "toddler", "minor", "young", "teen"];

/// Singular/plural pairs that naive pluralization gets wrong
const KNOWN_PLURALS: &[(&str, &str)] = &[
    ("child", "children"),
    ("baby", "babies"),
    ("person", "people"),
    ("man", "men"),
    ("woman", "women"),
    ("boy", "boys"),
    ("girl", "girls"),
    ("kid", "kids"),
    ("teen", "teens"),
    ("minor", "minors"),
    ("toddler", "toddlers"),
    ("infant", "infants"),
];

/// Translation constants.
///
/// These were tuned against one server build and are kept configurable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslatorSettings {
    /// Points subtracted from the unified threshold for public content
    #[serde(default = "default_public_offset")]
    pub public_offset: f64,

    /// Points added to the unified threshold for private shares
    #[serde(default = "default_private_offset")]
    pub private_offset: f64,

    /// Lowest allowed public threshold
    #[serde(default = "default_public_floor")]
    pub public_floor: f64,

    #[serde(default = "default_risk_scale")]
    pub risk_multiplier_scale: f64,

    #[serde(default = "default_risk_base")]
    pub risk_multiplier_base: f64,

    #[serde(default = "default_age_threshold")]
    pub default_age_threshold: u32,

    /// Used when the unified config has no `detection_threshold`
    #[serde(default = "default_detection_threshold")]
    pub default_detection_threshold: f64,

    #[serde(default = "default_risk_multiplier")]
    pub default_risk_multiplier: i64,
}

fn default_public_offset() -> f64 {
    5.0
}

fn default_private_offset() -> f64 {
    10.0
}

fn default_public_floor() -> f64 {
    15.0
}

fn default_risk_scale() -> f64 {
    15.0
}

fn default_risk_base() -> f64 {
    20.0
}

fn default_age_threshold() -> u32 {
    18
}

fn default_detection_threshold() -> f64 {
    0.7
}

fn default_risk_multiplier() -> i64 {
    2
}

impl Default for TranslatorSettings {
    fn default() -> Self {
        Self {
            public_offset: default_public_offset(),
            private_offset: default_private_offset(),
            public_floor: default_public_floor(),
            risk_multiplier_scale: default_risk_scale(),
            risk_multiplier_base: default_risk_base(),
            default_age_threshold: default_age_threshold(),
            default_detection_threshold: default_detection_threshold(),
            default_risk_multiplier: default_risk_multiplier(),
        }
    }
}

/// Maps unified configuration blocks onto each server's wire schema
#[derive(Debug, Clone, Default)]
pub struct Translator {
    settings: TranslatorSettings,
}

impl Translator {
    pub fn new(settings: TranslatorSettings) -> Self {
        Self { settings }
    }

    /// Translate the numeric detector block
    pub fn nudenet(&self, unified: &Value) -> NudenetServerConfig {
        let s = &self.settings;
        let threshold = unified
            .get("detection_threshold")
            .and_then(Value::as_f64)
            .unwrap_or(s.default_detection_threshold)
            .clamp(0.0, 1.0);
        let points = to_points(threshold);

        let public = (points - s.public_offset).max(s.public_floor).min(100.0);
        let private = (points + s.private_offset).min(100.0).max(public);

        let body_part = unified
            .get("body_part_thresholds")
            .and_then(Value::as_object)
            .and_then(average_score)
            .map(to_points)
            .unwrap_or(points);

        NudenetServerConfig {
            public_gallery_threshold: public,
            private_share_threshold: private,
            default_threshold: points,
            body_part_threshold: body_part,
            nudenet_components: components(unified, "nudenet_components", NUDENET_COMPONENTS),
            passthrough: passthrough(unified, NUDENET_KEYS),
        }
    }

    /// Translate the keyword detector block
    pub fn blip(&self, unified: &Value) -> BlipServerConfig {
        let s = &self.settings;
        let keywords: Vec<String> = match unified.get("child_keywords").and_then(Value::as_array) {
            Some(list) => list
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            None => DEFAULT_CHILD_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        };

        let multiplier = unified
            .get("risk_multiplier")
            .and_then(Value::as_f64)
            .unwrap_or(s.default_risk_multiplier as f64);
        let risk_threshold = (multiplier * s.risk_multiplier_scale + s.risk_multiplier_base)
            .clamp(0.0, 100.0);

        let age_threshold = unified
            .get("age_threshold")
            .and_then(Value::as_u64)
            .and_then(|a| u32::try_from(a).ok())
            .unwrap_or(s.default_age_threshold);

        BlipServerConfig {
            child_keywords: expand_keywords(&keywords),
            risk_threshold,
            age_threshold,
            blip_components: components(unified, "blip_components", BLIP_COMPONENTS),
            passthrough: passthrough(unified, BLIP_KEYS),
        }
    }

    /// Translate a block into its server JSON shape
    pub fn to_server_value(&self, detector: Detector, unified: &Value) -> Value {
        let translated = match detector {
            Detector::Nudenet => serde_json::to_value(self.nudenet(unified)),
            Detector::Blip => serde_json::to_value(self.blip(unified)),
        };
        // Both schemas serialize to plain objects
        translated.unwrap_or(Value::Null)
    }
}

fn to_points(score: f64) -> f64 {
    (score * 100.0).round()
}

fn average_score(scores: &Map<String, Value>) -> Option<f64> {
    let values: Vec<f64> = scores
        .values()
        .filter_map(Value::as_f64)
        .map(|v| v.clamp(0.0, 1.0))
        .collect();
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Component flags from `key` (or the generic `components`), defaulting to enabled
fn components(unified: &Value, key: &str, known: &[&str]) -> BTreeMap<String, bool> {
    let mut flags: BTreeMap<String, bool> = known.iter().map(|c| (c.to_string(), true)).collect();
    let source = unified
        .get(key)
        .or_else(|| unified.get("components"))
        .and_then(Value::as_object);
    if let Some(map) = source {
        for (name, enabled) in map {
            if let Some(enabled) = enabled.as_bool() {
                flags.insert(name.clone(), enabled);
            }
        }
    }
    flags
}

fn passthrough(unified: &Value, consumed: &[&str]) -> Map<String, Value> {
    unified
        .as_object()
        .map(|map| {
            map.iter()
                .filter(|(k, _)| !consumed.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Expand safety keywords with plural/singular forms, deduplicated.
///
/// Idempotent: expanding an expanded list adds nothing.
pub fn expand_keywords(keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut expanded = Vec::new();

    let mut push = |word: String, out: &mut Vec<String>| {
        if seen.insert(word.clone()) {
            out.push(word);
        }
    };

    for keyword in keywords {
        let word = keyword.trim().to_lowercase();
        if word.is_empty() {
            continue;
        }
        push(word.clone(), &mut expanded);

        if let Some((_, plural)) = KNOWN_PLURALS.iter().find(|(s, _)| *s == word) {
            push(plural.to_string(), &mut expanded);
        } else if let Some((singular, _)) = KNOWN_PLURALS.iter().find(|(_, p)| *p == word) {
            push(singular.to_string(), &mut expanded);
        } else if !word.ends_with('s') && !word.contains(' ') {
            push(format!("{}s", word), &mut expanded);
        }
    }

    expanded
}
