//! Template + override deep merge

use serde_json::{Map, Value};
use tracing::warn;

use crate::models::site::{Detector, EffectiveConfig, IndustryTemplate, SiteConfiguration};

/// Normalize an override value into a JSON object.
///
/// Overrides arrive as objects or as JSON text. Null, malformed text and
/// non-object values become an empty object.
pub fn parse_overrides(raw: &Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map.clone(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Map::new();
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(Value::Object(map)) => map,
                Ok(_) => Map::new(),
                Err(e) => {
                    warn!("Ignoring malformed override JSON: {}", e);
                    Map::new()
                }
            }
        }
        _ => Map::new(),
    }
}

/// Deep-merge `overrides` onto `template`.
///
/// Object values merge recursively when both sides are objects; any other
/// override value, arrays included, replaces the template value outright.
pub fn merge(template: &Value, overrides: &Value) -> Value {
    let overrides = parse_overrides(overrides);
    let base = match template {
        Value::Object(map) => map.clone(),
        Value::String(_) => parse_overrides(template),
        _ => Map::new(),
    };

    Value::Object(merge_maps(base, &overrides))
}

fn merge_maps(mut base: Map<String, Value>, overrides: &Map<String, Value>) -> Map<String, Value> {
    for (key, value) in overrides {
        let merged = match (base.remove(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                Value::Object(merge_maps(existing, incoming))
            }
            _ => value.clone(),
        };
        base.insert(key.clone(), merged);
    }
    base
}

/// Compute the effective configuration for a site
pub fn effective_config(
    template: Option<&IndustryTemplate>,
    site: &SiteConfiguration,
) -> EffectiveConfig {
    let block = |detector: Detector| {
        let base = template
            .map(|t| t.config(detector).clone())
            .unwrap_or(Value::Null);
        merge(&base, site.overrides(detector))
    };

    EffectiveConfig {
        nudenet: block(Detector::Nudenet),
        blip: block(Detector::Blip),
    }
}
