//! CVE v5 record schema validation
//!
//! Wraps compiled JSON Schema validators for the v5 envelope. Findings
//! are rendered one per line as `$<json path> -- validator = <keyword>`
//! and annotate the output record; they never fail a conversion.

use std::path::Path;

use jsonschema::error::ValidationErrorKind;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to read schema {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse schema {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },

    #[error("schema {path} did not compile: {message}")]
    Compile { path: String, message: String },
}

pub struct RecordValidator {
    validator: jsonschema::Validator,
}

impl RecordValidator {
    pub fn from_file(path: &Path) -> Result<Self, SchemaError> {
        let shown = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
            path: shown.clone(),
            source,
        })?;
        let schema: Value = serde_json::from_str(&text).map_err(|source| SchemaError::Json {
            path: shown.clone(),
            source,
        })?;
        Self::from_schema(&schema, &shown)
    }

    pub fn from_schema(schema: &Value, shown_path: &str) -> Result<Self, SchemaError> {
        let validator = jsonschema::options()
            .should_validate_formats(true)
            .build(schema)
            .map_err(|e| SchemaError::Compile {
                path: shown_path.to_string(),
                message: e.to_string(),
            })?;
        Ok(Self { validator })
    }

    /// All validation findings for a record, empty when it conforms.
    pub fn findings(&self, record: &Value) -> Vec<String> {
        self.validator
            .iter_errors(record)
            .map(|error| {
                let path = error.instance_path.to_string();
                let formatted_path = if path.is_empty() {
                    "$".to_string()
                } else {
                    format!("${path}")
                };
                format!(
                    "{formatted_path} -- validator = {}",
                    keyword(&error.kind)
                )
            })
            .collect()
    }
}

/// Schema keyword behind a finding, named the way the schema spells it.
fn keyword(kind: &ValidationErrorKind) -> &'static str {
    match kind {
        ValidationErrorKind::AdditionalProperties { .. } => "additionalProperties",
        ValidationErrorKind::UnevaluatedProperties { .. } => "unevaluatedProperties",
        ValidationErrorKind::Required { .. } => "required",
        ValidationErrorKind::Type { .. } => "type",
        ValidationErrorKind::Pattern { .. } => "pattern",
        ValidationErrorKind::Format { .. } => "format",
        ValidationErrorKind::Enum { .. } => "enum",
        ValidationErrorKind::Constant { .. } => "const",
        ValidationErrorKind::MinLength { .. } => "minLength",
        ValidationErrorKind::MaxLength { .. } => "maxLength",
        ValidationErrorKind::MinItems { .. } => "minItems",
        ValidationErrorKind::MaxItems { .. } => "maxItems",
        ValidationErrorKind::Minimum { .. } => "minimum",
        ValidationErrorKind::Maximum { .. } => "maximum",
        ValidationErrorKind::UniqueItems => "uniqueItems",
        _ => "schema",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> RecordValidator {
        let schema = json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "required": ["dataType", "cveMetadata"],
            "properties": {
                "dataType": { "const": "CVE_RECORD" },
                "cveMetadata": {
                    "type": "object",
                    "required": ["cveId"],
                    "properties": {
                        "cveId": { "type": "string", "pattern": "^CVE-[0-9]{4}-[0-9]{4,}$" }
                    }
                }
            },
            "additionalProperties": false
        });
        RecordValidator::from_schema(&schema, "inline").unwrap()
    }

    #[test]
    fn test_conforming_record_has_no_findings() {
        let record = json!({
            "dataType": "CVE_RECORD",
            "cveMetadata": { "cveId": "CVE-2020-0001" }
        });
        assert!(validator().findings(&record).is_empty());
    }

    #[test]
    fn test_findings_name_path_and_keyword() {
        let record = json!({
            "dataType": "CVE_RECORD",
            "cveMetadata": { "cveId": "not-an-id" },
            "bogus": true
        });
        let findings = validator().findings(&record);
        assert!(
            findings
                .iter()
                .any(|f| f == "$/cveMetadata/cveId -- validator = pattern"),
            "findings were {findings:?}"
        );
        assert!(
            findings
                .iter()
                .any(|f| f.contains("validator = additionalProperties")),
            "findings were {findings:?}"
        );
    }

    #[test]
    fn test_missing_required_property() {
        let record = json!({ "dataType": "CVE_RECORD" });
        let findings = validator().findings(&record);
        assert_eq!(findings, vec!["$ -- validator = required".to_string()]);
    }

    #[test]
    fn test_bad_schema_does_not_compile() {
        let schema = json!({ "type": 12 });
        assert!(RecordValidator::from_schema(&schema, "inline").is_err());
    }
}
