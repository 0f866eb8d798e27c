//! Inbound payload normalization and display-text extraction.
//!
//! Upstream workflows sometimes double-encode a JSON body as a string value,
//! e.g. `{"oi": "{\"message\": \"hi\"}"}`. [`normalize`] promotes the first
//! such field whose decoded document carries a message-like key. The unwrap is
//! a single level: the promoted document is never scanned again.
//!
//! Known limitation: the first qualifying field wins, even when a later field
//! holds the document the sender actually meant.
//!
//! The unwrap and the display text judge fields differently. The unwrap only
//! asks whether a message-like key is present, so `{"message": ""}` or
//! `{"text": null}` still qualifies. [`extract_display_text`] skips empty and
//! falsy values. A payload can therefore be unwrapped and still be displayed
//! through the JSON fallback.

use serde_json::{Map, Value};

/// Fields probed for chat text, in priority order.
pub const MESSAGE_FIELDS: [&str; 3] = ["message", "text", "output"];

/// A normalized payload together with where it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Normalized {
    /// The payload after at most one level of unwrapping.
    pub payload: Value,
    /// Top-level field the payload was promoted from, if an unwrap happened.
    pub unwrapped_from: Option<String>,
}

/// Normalize an inbound payload.
///
/// Returns `raw` unchanged unless it is an object with a string field that
/// decodes to an object containing `message`, `text` or `output`.
pub fn normalize(raw: Value) -> Value {
    normalize_traced(raw).payload
}

/// Like [`normalize`], but also reports which field was unwrapped.
pub fn normalize_traced(raw: Value) -> Normalized {
    let Value::Object(fields) = &raw else {
        return Normalized {
            payload: raw,
            unwrapped_from: None,
        };
    };

    let promoted = fields
        .iter()
        .find_map(|(key, value)| decode_nested(value).map(|inner| (key.clone(), inner)));

    match promoted {
        Some((key, inner)) => Normalized {
            payload: Value::Object(inner),
            unwrapped_from: Some(key),
        },
        None => Normalized {
            payload: raw,
            unwrapped_from: None,
        },
    }
}

/// Decode a field value that looks like a stringified chat document.
///
/// Parse failures are swallowed; the caller moves on to the next field.
fn decode_nested(value: &Value) -> Option<Map<String, Value>> {
    let text = value.as_str()?;
    if !text.trim_start().starts_with('{') {
        return None;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(inner)) if MESSAGE_FIELDS.iter().any(|f| inner.contains_key(*f)) => {
            Some(inner)
        }
        _ => None,
    }
}

/// Derive the text a chat client shows for a payload.
///
/// Probes `message`, `text`, then `output`, skipping empty or falsy values.
/// Falls back to the compact JSON serialization of the whole payload, so the
/// result is never empty for a non-empty object.
pub fn extract_display_text(payload: &Value) -> String {
    if let Value::Object(fields) = payload {
        for name in MESSAGE_FIELDS {
            if let Some(text) = fields.get(name).and_then(displayable) {
                return text;
            }
        }
    }
    payload.to_string()
}

fn displayable(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn unwraps_stringified_message() {
        let raw = json!({"oi": "{\"message\": \"hello\"}"});
        let normalized = normalize(raw);
        assert_eq!(normalized, json!({"message": "hello"}));
        assert_eq!(extract_display_text(&normalized), "hello");
    }

    #[test]
    fn reports_unwrapped_field() {
        let result = normalize_traced(json!({"body": "{\"text\": \"hi\"}"}));
        assert_eq!(result.unwrapped_from.as_deref(), Some("body"));
        assert_eq!(result.payload, json!({"text": "hi"}));
    }

    #[test]
    fn leading_whitespace_is_tolerated() {
        let raw = json!({"data": "   {\"output\": \"done\"}"});
        assert_eq!(normalize(raw), json!({"output": "done"}));
    }

    #[test]
    fn first_matching_field_wins() {
        let raw = json!({
            "a": "{\"message\": \"first\"}",
            "b": "{\"message\": \"second\"}",
        });
        assert_eq!(normalize(raw), json!({"message": "first"}));
    }

    #[test]
    fn skips_fields_without_message_keys() {
        let raw = json!({
            "meta": "{\"id\": 7}",
            "payload": "{\"text\": \"real\"}",
        });
        assert_eq!(normalize(raw), json!({"text": "real"}));
    }

    #[test]
    fn unwrap_triggers_on_key_presence_even_when_empty() {
        let raw = json!({"a": "{\"message\": \"\"}"});
        let normalized = normalize(raw);
        assert_eq!(normalized, json!({"message": ""}));
        assert_eq!(extract_display_text(&normalized), r#"{"message":""}"#);

        let null_text = json!({"b": "{\"text\": null, \"id\": 3}"});
        assert_eq!(normalize(null_text), json!({"text": null, "id": 3}));
    }

    #[test]
    fn malformed_nested_json_is_ignored() {
        let raw = json!({"broken": "{not json", "ok": "{\"message\": \"fine\"}"});
        assert_eq!(normalize(raw), json!({"message": "fine"}));

        let only_broken = json!({"broken": "{oops"});
        assert_eq!(normalize(only_broken.clone()), only_broken);
    }

    #[test]
    fn does_not_recurse() {
        let inner = json!({"message": "outer", "nested": "{\"message\": \"deeper\"}"});
        let raw = json!({"wrap": inner.to_string()});
        let normalized = normalize(raw);
        assert_eq!(normalized, inner);
    }

    #[test]
    fn non_objects_pass_through() {
        for raw in [json!("{\"message\": \"x\"}"), json!(42), json!(null), json!([1, 2])] {
            assert_eq!(normalize(raw.clone()), raw);
        }
    }

    #[test]
    fn display_prefers_message_then_text_then_output() {
        let payload = json!({"output": "o", "text": "t", "message": "m"});
        assert_eq!(extract_display_text(&payload), "m");
        let payload = json!({"output": "o", "text": "t"});
        assert_eq!(extract_display_text(&payload), "t");
        let payload = json!({"output": "o"});
        assert_eq!(extract_display_text(&payload), "o");
    }

    #[test]
    fn display_skips_empty_values() {
        let payload = json!({"message": "", "text": null, "output": "fallback"});
        assert_eq!(extract_display_text(&payload), "fallback");
    }

    #[test]
    fn display_serializes_non_string_values() {
        let payload = json!({"message": {"nested": true}});
        assert_eq!(extract_display_text(&payload), r#"{"nested":true}"#);
        let payload = json!({"output": 3});
        assert_eq!(extract_display_text(&payload), "3");
    }

    #[test]
    fn display_falls_back_to_serialization() {
        let payload = json!({"data": {"key": "value"}});
        assert_eq!(extract_display_text(&payload), r#"{"data":{"key":"value"}}"#);
        assert_eq!(extract_display_text(&json!("plain")), "\"plain\"");
        assert_eq!(extract_display_text(&json!(null)), "null");
    }

    #[test]
    fn display_keeps_insertion_order_in_fallback() {
        let payload = json!({"zeta": 1, "alpha": 2});
        assert_eq!(extract_display_text(&payload), r#"{"zeta":1,"alpha":2}"#);
    }

    fn plain_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[^{ \\t\\n\\r][a-z0-9 {}\":]{0,16}".prop_map(Value::String),
            Just(Value::String(String::new())),
        ]
    }

    proptest! {
        #[test]
        fn normalize_is_identity_without_brace_strings(
            fields in prop::collection::vec(("[a-z]{1,8}", plain_value()), 0..8)
        ) {
            let map: Map<String, Value> = fields.into_iter().collect();
            let raw = Value::Object(map);
            prop_assert_eq!(normalize(raw.clone()), raw);
        }

        #[test]
        fn display_text_is_total_and_non_empty(
            fields in prop::collection::vec(("[a-z]{1,8}", plain_value()), 1..8)
        ) {
            let map: Map<String, Value> = fields.into_iter().collect();
            let text = extract_display_text(&Value::Object(map));
            prop_assert!(!text.is_empty());
        }
    }
}
