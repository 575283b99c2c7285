use serde_json::{Map, Value};

/// Fields kept when a live platform object crosses the HTTP boundary.
const SAFE_FIELDS: &[&str] = &[
    "name",
    "pushname",
    "number",
    "body",
    "from",
    "to",
    "author",
    "timestamp",
    "type",
    "isGroup",
    "fromMe",
    "hasMedia",
    "isAdmin",
    "isSuperAdmin",
];

fn composite_id(map: &Map<String, Value>) -> Option<&str> {
    map.get("id")?.get("_serialized")?.as_str()
}

/// Strip handle internals from an invocation result.
///
/// Primitives and `null` pass through. Arrays keep their shape with each
/// element sanitized. Objects carrying a composite id are narrowed to the
/// serialized id plus [`SAFE_FIELDS`]; any other object is sanitized field by
/// field.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::Object(map) => match composite_id(&map).map(str::to_string) {
            Some(id) => {
                let mut narrowed = Map::new();
                narrowed.insert("id".to_string(), Value::String(id));
                for key in SAFE_FIELDS {
                    if let Some(v) = map.get(*key) {
                        narrowed.insert(key.to_string(), v.clone());
                    }
                }
                Value::Object(narrowed)
            }
            None => Value::Object(map.into_iter().map(|(k, v)| (k, sanitize(v))).collect()),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_primitives_and_arrays_unchanged() {
        assert_eq!(sanitize(Value::Null), Value::Null);
        assert_eq!(sanitize(json!(42)), json!(42));
        assert_eq!(sanitize(json!("CONNECTED")), json!("CONNECTED"));
        assert_eq!(sanitize(json!([1, "two", true, null])), json!([1, "two", true, null]));
    }

    #[test]
    fn test_handle_is_narrowed() {
        let raw = json!({
            "id": { "server": "c.us", "user": "5551234", "_serialized": "5551234@c.us" },
            "name": "Alice",
            "isGroup": false,
            "pupPage": { "target": "internal" },
            "client": { "options": {} }
        });
        assert_eq!(
            sanitize(raw),
            json!({ "id": "5551234@c.us", "name": "Alice", "isGroup": false })
        );
    }

    #[test]
    fn test_nested_handles_inside_plain_objects() {
        let raw = json!({
            "count": 1,
            "items": [{ "id": { "_serialized": "m1" }, "body": "hi", "rawData": {} }]
        });
        assert_eq!(
            sanitize(raw),
            json!({ "count": 1, "items": [{ "id": "m1", "body": "hi" }] })
        );
    }
}
