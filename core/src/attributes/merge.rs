use serde_json::Value;

/// Merge `overlay` into `base`: mappings merge key by key, recursively;
/// anything else (scalars, sequences, null) in `overlay` replaces `base`.
pub fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}

/// Fold values found at the same path in several layers, lowest precedence first.
pub fn overlay_all<'a, I>(values: I) -> Option<Value>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut acc: Option<Value> = None;
    for value in values {
        match acc.as_mut() {
            Some(existing) => deep_merge(existing, value),
            None => acc = Some(value.clone()),
        }
    }
    acc
}
