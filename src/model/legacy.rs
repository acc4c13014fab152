//! Loose v4 record access
//!
//! The v4 corpus predates strict validation, so input stays raw
//! `serde_json::Value` and accessors tolerate missing or oddly shaped
//! blocks. The wrapper tracks which top-level blocks a conversion
//! consumed; present blocks nobody consumed ride into the v5 container
//! as `x_`-prefixed passthrough and are tallied in the run report.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

/// v4 envelope fields that are never passed through.
const ENVELOPE_KEYS: &[&str] = &["data_format", "data_type", "data_version"];

pub struct LegacyRecord {
    source: Value,
    consumed: BTreeSet<String>,
}

impl LegacyRecord {
    pub fn new(source: Value) -> Self {
        let mut consumed = BTreeSet::new();
        // The metadata block is handled by every conversion path.
        consumed.insert("CVE_data_meta".to_string());
        Self { source, consumed }
    }

    /// The unmodified input document.
    pub fn source(&self) -> &Value {
        &self.source
    }

    pub fn meta(&self) -> Option<&Map<String, Value>> {
        self.source.get("CVE_data_meta").and_then(Value::as_object)
    }

    pub fn meta_value(&self, key: &str) -> Option<&Value> {
        self.meta().and_then(|meta| meta.get(key))
    }

    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.meta_value(key).and_then(Value::as_str)
    }

    /// Whether the metadata block carries a key at all, regardless of
    /// shape. Some fields change meaning between absent and empty.
    pub fn meta_has(&self, key: &str) -> bool {
        self.meta().is_some_and(|meta| meta.contains_key(key))
    }

    /// Claims a top-level block for the conversion and returns a copy
    /// of it. The claim is recorded even when the block is absent.
    pub fn section(&mut self, key: &str) -> Option<Value> {
        self.consumed.insert(key.to_string());
        self.source.get(key).cloned()
    }

    /// Reads a top-level block without claiming it. Gated sections only
    /// count as consumed once their gate passes.
    pub fn peek(&self, key: &str) -> Option<&Value> {
        self.source.get(key)
    }

    /// Whether a top-level block is present.
    pub fn has_section(&self, key: &str) -> bool {
        self.source
            .as_object()
            .is_some_and(|map| map.contains_key(key))
    }

    /// Present top-level keys no conversion path claimed, envelope
    /// fields excluded. Sorted, since the input map order is not
    /// meaningful.
    pub fn leftover_keys(&self) -> Vec<String> {
        let Some(map) = self.source.as_object() else {
            return Vec::new();
        };
        map.keys()
            .filter(|key| !self.consumed.contains(*key))
            .filter(|key| !ENVELOPE_KEYS.contains(&key.as_str()))
            .map(String::clone)
            .collect()
    }
}

/// Loose-JSON truthiness: null, `false`, zero, and empty strings,
/// arrays, and objects all count as absent.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_section_claims_keys() {
        let mut record = LegacyRecord::new(json!({
            "data_type": "CVE",
            "data_format": "MITRE",
            "data_version": "4.0",
            "CVE_data_meta": {"ID": "CVE-2020-0001", "STATE": "PUBLIC"},
            "description": {"description_data": []},
            "impact": {},
            "custom_block": {"a": 1}
        }));

        assert!(record.section("description").is_some());
        assert!(record.section("affects").is_none());
        assert_eq!(record.leftover_keys(), vec!["custom_block", "impact"]);

        record.section("impact");
        assert_eq!(record.leftover_keys(), vec!["custom_block"]);
    }

    #[test]
    fn test_meta_accessors() {
        let record = LegacyRecord::new(json!({
            "CVE_data_meta": {"ID": "CVE-2020-0001", "DATE_PUBLIC": ""}
        }));
        assert_eq!(record.meta_str("ID"), Some("CVE-2020-0001"));
        assert!(record.meta_has("DATE_PUBLIC"));
        assert!(!record.meta_has("TITLE"));
        assert!(record.meta_str("STATE").is_none());
    }

    #[test]
    fn test_truthy_matches_loose_json() {
        assert!(!truthy(&json!(null)));
        assert!(!truthy(&json!(false)));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!(0.0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!([])));
        assert!(!truthy(&json!({})));
        assert!(truthy(&json!(" ")));
        assert!(truthy(&json!(-1)));
        assert!(truthy(&json!([0])));
        assert!(truthy(&json!({"k": null})));
    }
}
