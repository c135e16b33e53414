//! Deep merge of JSON trees
//!
//! One rule, applied recursively: objects merge key by key, everything else
//! (arrays included) is replaced by the overlay. The overlay always wins.

use serde_json::{Map, Value};

/// Merge `overlay` on top of `base`, returning a new tree
#[must_use]
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in overlay_map {
                let next = match base_map.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, replacement) => replacement.clone(),
    }
}
