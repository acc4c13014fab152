//! v5 record building blocks
//!
//! The output document is assembled as sorted JSON maps rather than
//! typed structs: upconverted records carry passthrough blocks whose
//! shape is unknowable ahead of time, and the published schema is the
//! arbiter of validity, not the Rust type system.

use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use serde_json::{Map, Value};

pub const DATA_TYPE: &str = "CVE_RECORD";
pub const DATA_VERSION: &str = "5.0";

/// v5 record lifecycle states with their v4 spellings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Reserved,
    Published,
    Rejected,
}

impl RecordState {
    /// Maps a v4 `STATE` value. `None` means the state is one this
    /// converter has no dispatch path for.
    pub fn from_v4(state: &str) -> Option<Self> {
        match state {
            "RESERVED" => Some(Self::Reserved),
            "PUBLIC" => Some(Self::Published),
            "REJECT" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reserved => "RESERVED",
            Self::Published => "PUBLISHED",
            Self::Rejected => "REJECTED",
        }
    }
}

/// Wraps record metadata and containers in the v5 envelope.
pub fn envelope(cve_metadata: Value, containers: Option<Value>) -> Value {
    let mut record = Map::new();
    record.insert("dataType".to_string(), Value::String(DATA_TYPE.to_string()));
    record.insert(
        "dataVersion".to_string(),
        Value::String(DATA_VERSION.to_string()),
    );
    record.insert("cveMetadata".to_string(), cve_metadata);
    if let Some(containers) = containers {
        record.insert("containers".to_string(), containers);
    }
    Value::Object(record)
}

/// Whether a value carries content worth keeping. Empty strings,
/// containers, and bare `{"lang": "en"}` description stubs do not.
pub fn has_val(value: &Value) -> bool {
    match value {
        Value::String(s) => !s.is_empty(),
        Value::Object(map) => !map.is_empty() && !is_lang_stub(value),
        Value::Array(items) => {
            !items.is_empty() && !(items.len() == 1 && is_lang_stub(&items[0]))
        }
        _ => true,
    }
}

/// An `{"lang": "en"}` entry, with or without an empty `value`.
fn is_lang_stub(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    match map.len() {
        1 => map.get("lang").and_then(Value::as_str) == Some("en"),
        2 => {
            map.get("lang").and_then(Value::as_str) == Some("en")
                && map.get("value").and_then(Value::as_str) == Some("")
        }
        _ => false,
    }
}

/// Rebuilds a value without contentless members, depth first, through
/// both objects and arrays.
pub fn clean_empty(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, member)| (key.clone(), clean_empty(member)))
                .filter(|(_, member)| has_val(member))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(clean_empty)
                .filter(has_val)
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Renders a record the way the published corpus is formatted: keys
/// sorted, four-space indent, no trailing newline.
pub fn to_pretty_string(value: &Value) -> Result<String, serde_json::Error> {
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut out = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_mapping() {
        assert_eq!(RecordState::from_v4("PUBLIC"), Some(RecordState::Published));
        assert_eq!(RecordState::from_v4("RESERVED"), Some(RecordState::Reserved));
        assert_eq!(RecordState::from_v4("REJECT"), Some(RecordState::Rejected));
        assert_eq!(RecordState::from_v4("PUBLISHED"), None);
        assert_eq!(RecordState::from_v4(""), None);
        assert_eq!(RecordState::Rejected.as_str(), "REJECTED");
    }

    #[test]
    fn test_has_val_rejects_contentless_shapes() {
        assert!(!has_val(&json!("")));
        assert!(!has_val(&json!({})));
        assert!(!has_val(&json!([])));
        assert!(!has_val(&json!({"lang": "en"})));
        assert!(!has_val(&json!({"lang": "en", "value": ""})));
        assert!(!has_val(&json!([{"lang": "en", "value": ""}])));
        assert!(!has_val(&json!([{"lang": "en"}])));

        assert!(has_val(&json!("x")));
        assert!(has_val(&json!(0)));
        assert!(has_val(&json!(null)));
        assert!(has_val(&json!({"lang": "fr"})));
        assert!(has_val(&json!({"lang": "en", "value": "text"})));
        assert!(has_val(&json!([{"lang": "en"}, {"lang": "en"}])));
    }

    #[test]
    fn test_clean_empty_recurses_into_arrays() {
        let dirty = json!({
            "keep": "yes",
            "drop": "",
            "nested": {"inner": {}, "ok": 1},
            "list": [{"lang": "en", "value": ""}, {"lang": "en", "value": "kept"}, ""]
        });
        let cleaned = clean_empty(&dirty);
        assert_eq!(
            cleaned,
            json!({
                "keep": "yes",
                "nested": {"ok": 1},
                "list": [{"lang": "en", "value": "kept"}]
            })
        );
    }

    #[test]
    fn test_envelope_shape() {
        let record = envelope(json!({"cveId": "CVE-2020-0001"}), Some(json!({"cna": {}})));
        assert_eq!(record["dataType"], "CVE_RECORD");
        assert_eq!(record["dataVersion"], "5.0");
        assert_eq!(record["cveMetadata"]["cveId"], "CVE-2020-0001");
        assert!(record.get("containers").is_some());

        let reserved = envelope(json!({"cveId": "CVE-2020-0002"}), None);
        assert!(reserved.get("containers").is_none());
    }

    #[test]
    fn test_pretty_output_is_sorted_with_four_space_indent() {
        let rendered = to_pretty_string(&json!({"b": 1, "a": {"z": 2, "y": 3}})).unwrap();
        assert_eq!(
            rendered,
            "{\n    \"a\": {\n        \"y\": 3,\n        \"z\": 2\n    },\n    \"b\": 1\n}"
        );
    }
}
