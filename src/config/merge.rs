//! Field-by-field merging of configuration layers.

use serde_json::Value;

/// Merge `overlay` onto `base`.
///
/// Maps merge key by key, recursively. Anything else in `overlay` replaces
/// `base` wholesale, except `null`, which means "not specified" and keeps
/// `base`.
///
/// ```
/// use fold_coord::config::deep_merge;
/// use serde_json::json;
///
/// let merged = deep_merge(
///     json!({ "coordination": { "claim_window_minutes": 120, "task_scan_limit": 100 } }),
///     json!({ "coordination": { "claim_window_minutes": 30 } }),
/// );
/// assert_eq!(
///     merged,
///     json!({ "coordination": { "claim_window_minutes": 30, "task_scan_limit": 100 } })
/// );
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay {
                let next = match merged.remove(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value,
                };
                merged.insert(key, next);
            }
            Value::Object(merged)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge layers lowest-priority first.
pub fn deep_merge_all(layers: impl IntoIterator<Item = Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}
