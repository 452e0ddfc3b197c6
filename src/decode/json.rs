use super::{DecodeError, Decoder};
use crate::model::{Object, Value};
use serde_json::Value as JsonValue;

/// Decodes a self-describing JSON object whose keys match the target
/// table's columns.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode(&self, body: &[u8]) -> Result<Object, DecodeError> {
        let parsed: JsonValue = serde_json::from_slice(body)?;
        let JsonValue::Object(map) = parsed else {
            // A syntactically valid, but non-object, payload is still a
            // decode failure from the caller's point of view.
            return Err(DecodeError::NotAnObject);
        };

        Ok(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_flat_object() {
        let body = br#"{"x": 1, "y": "a", "z": null}"#;
        let obj = JsonDecoder.decode(body).unwrap();
        assert_eq!(obj.get("x"), Some(&Value::Int(1)));
        assert_eq!(obj.get("y"), Some(&Value::Str("a".into())));
        assert_eq!(obj.get("z"), Some(&Value::Null));
    }

    #[test]
    fn rejects_malformed_json() {
        let body = b"{not json";
        assert!(JsonDecoder.decode(body).is_err());
    }

    #[test]
    fn rejects_non_object_json() {
        let body = b"[1, 2, 3]";
        assert!(JsonDecoder.decode(body).is_err());
    }
}
