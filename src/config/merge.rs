//! Config layer merging
//!
//! Objects deep-merge by key; arrays and scalars are replaced by the
//! later layer.

use serde_json::Value;

/// Deep merge `overlay` onto `base`.
///
/// A `null` in the overlay clears the base value.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge layers in order; the last layer has highest precedence
pub fn merge_layers(layers: Vec<Value>) -> Value {
    layers.into_iter().fold(Value::Null, deep_merge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scalar_override() {
        let result = deep_merge(json!({"parallelism": 1}), json!({"parallelism": 4}));
        assert_eq!(result["parallelism"], 4);
    }

    #[test]
    fn test_object_deep_merge() {
        let base = json!({"upload": {"kind": "none", "location": "reg"}});
        let overlay = json!({"upload": {"kind": "oci"}});
        let result = deep_merge(base, overlay);

        assert_eq!(result["upload"]["kind"], "oci");
        assert_eq!(result["upload"]["location"], "reg");
    }

    #[test]
    fn test_array_replace() {
        let result = deep_merge(json!({"skip": ["a", "b", "c"]}), json!({"skip": ["x"]}));
        assert_eq!(result["skip"], json!(["x"]));
    }

    #[test]
    fn test_add_new_key() {
        let result = deep_merge(json!({"file_mode": 384}), json!({"signing_key_path": "k"}));
        assert_eq!(result["file_mode"], 384);
        assert_eq!(result["signing_key_path"], "k");
    }

    #[test]
    fn test_null_override() {
        let result = deep_merge(json!({"signing_key_path": "k"}), json!({"signing_key_path": null}));
        assert!(result["signing_key_path"].is_null());
    }

    #[test]
    fn test_merge_layers_last_wins() {
        let builtin = json!({"parallelism": 1, "upload": "none", "temp_dir_prefix": "vsa-"});
        let file = json!({"parallelism": 8, "upload": "rekor"});
        let cli = json!({"upload": "oci"});

        let result = merge_layers(vec![builtin, file, cli]);

        assert_eq!(result["parallelism"], 8);
        assert_eq!(result["upload"], "oci");
        assert_eq!(result["temp_dir_prefix"], "vsa-");
    }

    #[test]
    fn test_merge_no_layers() {
        assert!(merge_layers(vec![]).is_null());
    }
}
