//! NUL stripping. PostgreSQL text and jsonb columns reject `\u{0}`.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// Removes NUL characters from every string (and object key) nested in `value`.
pub fn strip_nul_value(value: &mut Value) {
    match value {
        Value::String(s) => {
            if s.contains('\0') {
                s.retain(|c| c != '\0');
            }
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nul_value),
        Value::Object(map) => {
            if map.keys().any(|k| k.contains('\0')) {
                let entries = std::mem::take(map);
                for (key, mut item) in entries {
                    strip_nul_value(&mut item);
                    map.insert(key.replace('\0', ""), item);
                }
            } else {
                map.values_mut().for_each(strip_nul_value);
            }
        }
        _ => {}
    }
}

/// Returns `value` with NUL characters removed from all of its strings.
pub fn strip_nul<T: Serialize + DeserializeOwned>(value: T) -> Result<T, serde_json::Error> {
    let mut json = serde_json::to_value(value)?;
    strip_nul_value(&mut json);
    serde_json::from_value(json)
}
