//! Legacy impact classification and CVSS repair
//!
//! The v4 `impact` block is loose: objects keyed `cvss` or `cvssv3`,
//! lists of lists, lists of objects, bare strings. Classification
//! buckets every payload under `cvssV3_1`, `cvssV3_0`, `cvssV2_0`, or
//! `other`. The repair pass then re-extracts each vector string,
//! re-scores it, strips optional metric groups the source vector never
//! defined, moves entries whose parsed version disagrees with their
//! bucket, and finally drops entries left without a usable score.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::cvss::{CvssV2, CvssV3};
use crate::error::ConvertError;
use crate::model::legacy::truthy;

use super::{ConverterErrors, string_form};

/// Candidate v3 vector run inside a free-form string. Case-insensitive
/// so damaged vectors still surface; the strict parser decides after.
static V3_VECTOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([A-Z]+:[A-Z310.]+/?)+").expect("v3 vector regex is valid")
});

/// Candidate v2 vector run, same idea with the v2 value alphabet.
static V2_VECTOR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)([A-Z]+:[A-Z0123.]+/?)+").expect("v2 vector regex is valid")
});

/// Marker deciding whether a vector defined any temporal metric.
static TEMPORAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"/(E|RL|PC|RC):[A-Z]").expect("temporal regex is valid"));

/// Marker deciding whether a vector defined any environmental metric.
static ENVIRONMENTAL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(CDP|TD|M[A-Z]{1,2}|[CIA]R):").expect("environmental regex is valid")
});

/// Fields backfilled by the scorers that only temporal metrics justify.
const TEMPORAL_FIELDS: &[&str] = &[
    "exploitCodeMaturity",
    "exploitability",
    "remediationLevel",
    "reportConfidence",
    "temporalScore",
    "temporalSeverity",
];

/// Fields backfilled by the scorers that only environmental metrics
/// justify.
const ENVIRONMENTAL_FIELDS: &[&str] = &[
    "collateralDamagePotential",
    "targetDistribution",
    "confidentialityRequirement",
    "integrityRequirement",
    "availabilityRequirement",
    "environmentalScore",
    "environmentalSeverity",
    "modifiedAttackVector",
    "modifiedAttackComplexity",
    "modifiedPrivilegesRequired",
    "modifiedUserInteraction",
    "modifiedScope",
    "modifiedConfidentialityImpact",
    "modifiedIntegrityImpact",
    "modifiedAvailabilityImpact",
];

const CVSS_KEYS: &[&str] = &["cvssV3_1", "cvssV3_0", "cvssV2_0"];

#[derive(Debug, Default)]
pub struct MetricsOutcome {
    /// The v5 `metrics` list, one entry per classified impact payload.
    pub metrics: Vec<Value>,
    /// `content` payloads that ended up under `other` despite arriving
    /// under a scoring key; surfaced in the run report.
    pub scoring_other: Vec<Value>,
    /// Tally keys (`<impact key>-<version>`) for payloads declaring a
    /// CVSS version this converter does not know.
    pub invalid_versions: Vec<String>,
}

/// Converts a v4 `impact` block into v5 `metrics` entries.
pub fn convert_impact(
    cve_id: &str,
    impact: &Value,
    notes: &mut ConverterErrors,
) -> Result<MetricsOutcome, ConvertError> {
    let mut outcome = MetricsOutcome::default();

    match impact {
        Value::Object(map) => {
            for (key, payload) in map {
                let mut entry = Map::new();
                classify(cve_id, key, payload, &mut entry, &mut outcome)?;
                if let Err(message) = repair(&mut entry, notes) {
                    notes.add("impact_cvss", "CVSS data from v4 record is invalid", &message);
                }
                if entry.is_empty() {
                    continue;
                }
                if key != "other"
                    && let Some(content) = entry.get("other").and_then(|o| o.get("content"))
                {
                    outcome.scoring_other.push(content.clone());
                }
                outcome.metrics.push(Value::Object(entry));
            }
        }
        Value::String(text) => {
            outcome
                .metrics
                .push(json!({"other": build_other(&Value::String(text.clone()))}));
        }
        Value::Array(items) => {
            for item in items {
                let cleaned = crate::model::record::clean_empty(item);
                outcome.metrics.push(json!({"other": build_other(&cleaned)}));
            }
        }
        other => {
            return Err(ConvertError::unexpected_detail(
                cve_id,
                "IMPACT",
                format!("impact shape not recognized: {other}"),
            ));
        }
    }

    Ok(outcome)
}

/// Buckets one impact payload into the entry map for its key.
fn classify(
    cve_id: &str,
    key: &str,
    payload: &Value,
    entry: &mut Map<String, Value>,
    outcome: &mut MetricsOutcome,
) -> Result<(), ConvertError> {
    match key {
        "cvss" => match payload {
            Value::Object(map) if map.contains_key("version") => {
                classify_versioned(key, payload, entry, outcome);
            }
            Value::Array(elements) => {
                for (index, element) in elements.iter().enumerate() {
                    match element {
                        Value::Array(inner) => {
                            for (inner_index, item) in inner.iter().enumerate() {
                                if item.get("version").is_none() {
                                    return Err(ConvertError::missing(
                                        cve_id,
                                        format!("IMPACT.version from cvss[[{inner_index}]]"),
                                    ));
                                }
                                classify_versioned(key, item, entry, outcome);
                            }
                        }
                        Value::Object(_) => {
                            if element.get("version").is_none() {
                                return Err(ConvertError::missing(
                                    cve_id,
                                    format!("IMPACT.version from cvss[{index}]"),
                                ));
                            }
                            classify_versioned(key, element, entry, outcome);
                        }
                        _ => {
                            return Err(ConvertError::unexpected(
                                cve_id,
                                "Impact - cvss structure not recognized",
                            ));
                        }
                    }
                }
            }
            other => {
                entry.insert("other".to_string(), build_other(other));
            }
        },
        // Legacy alias that never carried a version of its own.
        "cvssv3" => {
            entry.insert("cvssV3_0".to_string(), payload.clone());
        }
        _ => {
            entry.insert("other".to_string(), build_other(payload));
        }
    }
    Ok(())
}

/// Places a payload carrying an explicit `version` field.
fn classify_versioned(
    key: &str,
    payload: &Value,
    entry: &mut Map<String, Value>,
    outcome: &mut MetricsOutcome,
) {
    let version = payload.get("version").cloned().unwrap_or(Value::Null);
    let label = string_form(&version);
    match label.as_str() {
        "3.1" => {
            entry.insert("cvssV3_1".to_string(), payload.clone());
        }
        "3.0" => {
            entry.insert("cvssV3_0".to_string(), payload.clone());
        }
        "2.0" => {
            entry.insert("cvssV2_0".to_string(), payload.clone());
        }
        _ => {
            outcome.invalid_versions.push(format!("{key}-{label}"));
            entry.insert("other".to_string(), build_other(payload));
        }
    }
}

/// Wraps an unclassifiable payload. Scalars get keyed by their own
/// string form so no content is lost.
fn build_other(content: &Value) -> Value {
    match content {
        Value::Object(_) | Value::Array(_) => {
            json!({"type": "unknown", "content": content.clone()})
        }
        scalar => {
            let key = string_form(scalar);
            json!({"type": "unknown", "content": { key: scalar.clone() }})
        }
    }
}

/// Repairs the CVSS blocks of one metrics entry in place. An `Err`
/// means the entry structure itself could not be worked with; the
/// caller records it and keeps whatever state the entry reached.
fn repair(entry: &mut Map<String, Value>, notes: &mut ConverterErrors) -> Result<(), String> {
    if let Some(block) = entry.get("cvssV3_1").cloned() {
        match rescore_v3(&block, "CVSS:3.1/")? {
            Rescore::Scored(scored) => place_v3(entry, "cvssV3_1", scored),
            Rescore::NoVectorMatch => {}
            Rescore::ParseFailed(message) => {
                entry.remove("cvssV3_1");
                notes.add(
                    "cvssV3_1",
                    "CVSSV3_1 data from v4 record is invalid",
                    &message,
                );
            }
        }
    }

    // Fresh lookup: the 3.1 pass may just have moved a block here.
    if let Some(block) = entry.get("cvssV3_0").cloned() {
        let block = if block.get("BM").is_some() {
            rebuild_split_vector(&block)?
        } else {
            block
        };
        match rescore_v3(&block, "CVSS:3.0/")? {
            Rescore::Scored(scored) => place_v3(entry, "cvssV3_0", scored),
            Rescore::NoVectorMatch => {}
            Rescore::ParseFailed(message) => {
                entry.remove("cvssV3_0");
                notes.add(
                    "cvssV3_0",
                    "CVSSV3_0 data from v4 record is invalid",
                    &message,
                );
            }
        }
    }

    if let Some(block) = entry.get("cvssV2_0").cloned() {
        match rescore_v2(&block)? {
            Rescore::Scored(scored) => {
                entry.insert("cvssV2_0".to_string(), scored);
            }
            Rescore::NoVectorMatch => {}
            Rescore::ParseFailed(message) => {
                entry.remove("cvssV2_0");
                notes.add(
                    "cvssV2_0",
                    "CVSSV2_0 data from v4 record is invalid",
                    &message,
                );
            }
        }
    }

    drop_unscored(entry)
}

enum Rescore {
    /// Parsed and re-scored; the official JSON object, group-stripped.
    Scored(Value),
    /// Nothing vector-shaped found; the block is left untouched.
    NoVectorMatch,
    /// A candidate vector was found but did not parse.
    ParseFailed(String),
}

fn rescore_v3(block: &Value, fallback_prefix: &str) -> Result<Rescore, String> {
    let vector = extract_vector(block, &V3_VECTOR_REGEX)?;
    let Some(candidate) = vector else {
        return Ok(Rescore::NoVectorMatch);
    };
    let candidate = if candidate.starts_with("CVSS:3.") {
        candidate
    } else {
        format!("{fallback_prefix}{candidate}")
    };
    match CvssV3::parse(&candidate) {
        Ok(cvss) => Ok(Rescore::Scored(strip_undefined_groups(
            cvss.as_json(),
            &candidate,
        ))),
        Err(error) => Ok(Rescore::ParseFailed(error.to_string())),
    }
}

fn rescore_v2(block: &Value) -> Result<Rescore, String> {
    let vector = extract_vector(block, &V2_VECTOR_REGEX)?;
    let Some(candidate) = vector else {
        return Ok(Rescore::NoVectorMatch);
    };
    match CvssV2::parse(&candidate) {
        Ok(cvss) => Ok(Rescore::Scored(strip_undefined_groups(
            cvss.as_json(),
            &candidate,
        ))),
        Err(error) => Ok(Rescore::ParseFailed(error.to_string())),
    }
}

/// Pulls the first vector-shaped run out of a block's `vectorString`.
fn extract_vector(block: &Value, pattern: &Regex) -> Result<Option<String>, String> {
    let raw = block
        .get("vectorString")
        .ok_or_else(|| "cvss block lacks a vectorString".to_string())?;
    let text = raw
        .as_str()
        .ok_or_else(|| format!("vectorString is not a string: {raw}"))?;
    Ok(pattern.find(text).map(|m| m.as_str().to_string()))
}

/// Moves a re-scored v3 block to the bucket matching its parsed
/// version, overwriting whatever was there.
fn place_v3(entry: &mut Map<String, Value>, source_key: &str, scored: Value) {
    let target_key = if scored.get("version").and_then(Value::as_str) == Some("3.0") {
        "cvssV3_0"
    } else {
        "cvssV3_1"
    };
    if target_key != source_key {
        entry.remove(source_key);
    }
    entry.insert(target_key.to_string(), scored);
}

/// Rebuilds `vectorString` for blocks that ship base and temporal
/// metrics as `BM`/`TM` maps instead of a vector.
fn rebuild_split_vector(block: &Value) -> Result<Value, String> {
    let mut rebuilt = block
        .as_object()
        .cloned()
        .ok_or_else(|| "cvssV3_0 block is not an object".to_string())?;

    let mut base = rebuilt
        .get("BM")
        .and_then(Value::as_object)
        .cloned()
        .ok_or_else(|| "BM block is not an object".to_string())?;
    if base.remove("SCORE").is_none() {
        return Err("BM block lacks a SCORE to discard".to_string());
    }

    let mut vector = String::from("CVSS:3.0");
    append_metric_segments(&mut vector, &base);
    if let Some(temporal) = rebuilt.get("TM") {
        let temporal = temporal
            .as_object()
            .ok_or_else(|| "TM block is not an object".to_string())?;
        append_metric_segments(&mut vector, temporal);
    }

    rebuilt.insert("vectorString".to_string(), Value::String(vector));
    Ok(Value::Object(rebuilt))
}

fn append_metric_segments(vector: &mut String, metrics: &Map<String, Value>) {
    for (key, value) in metrics {
        let value = string_form(value);
        vector.push('/');
        vector.push_str(key);
        vector.push(':');
        vector.push_str(&value);
    }
}

/// Strips temporal and environmental fields the scorer backfilled when
/// the source vector never defined those groups.
fn strip_undefined_groups(scored: Value, source_vector: &str) -> Value {
    let Value::Object(mut map) = scored else {
        return scored;
    };
    if !TEMPORAL_MARKER.is_match(source_vector) {
        for field in TEMPORAL_FIELDS {
            map.remove(*field);
        }
    }
    if !ENVIRONMENTAL_MARKER.is_match(source_vector) {
        for field in ENVIRONMENTAL_FIELDS {
            map.remove(*field);
        }
    }
    Value::Object(map)
}

/// Final gate: a CVSS block must carry a vector string with at least
/// one digit and a non-zero `baseScore`. String scores are coerced to
/// numbers.
fn drop_unscored(entry: &mut Map<String, Value>) -> Result<(), String> {
    for key in CVSS_KEYS {
        let Some(block) = entry.get(*key) else {
            continue;
        };
        let vector_ok = block
            .get("vectorString")
            .and_then(Value::as_str)
            .is_some_and(|v| v.chars().any(|c| c.is_ascii_digit()));
        let score = block.get("baseScore").cloned().unwrap_or(Value::Null);
        if !vector_ok || !truthy(&score) {
            entry.remove(*key);
            continue;
        }
        if !score.is_number() {
            let text = string_form(&score);
            let parsed: f64 = text
                .trim()
                .parse()
                .map_err(|_| format!("baseScore is not numeric: {score}"))?;
            let number = serde_json::Number::from_f64(parsed)
                .ok_or_else(|| format!("baseScore is not a finite number: {score}"))?;
            if let Some(block) = entry.get_mut(*key).and_then(Value::as_object_mut) {
                block.insert("baseScore".to_string(), Value::Number(number));
            }
        }
    }
    Ok(())
}
