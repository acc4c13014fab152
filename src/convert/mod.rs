//! Legacy v4 record conversion
//!
//! Entry point for turning one loose v4 JSON record into a v5
//! `CVE_RECORD` document. Metadata resolution decides the lifecycle
//! state; PUBLISHED and REJECTED records additionally get a CNA
//! container assembled from the legacy sections. Recoverable problems
//! (truncation, bad dates, CVSS repair) are collected as keyed notes
//! and embedded in the container as `x_ConverterErrors`; structural
//! problems abort the record with a [`ConvertError`].

pub mod dates;
pub mod metadata;
pub mod metrics;
pub mod references;
pub mod versions;

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value, json};

use crate::error::ConvertError;
use crate::lang::narrow_lang_code;
use crate::model::RecordState;
use crate::model::legacy::{LegacyRecord, truthy};
use crate::model::record;
use crate::service::{HistoryIndex, IdrClient, TagMap};

use metadata::ResolvedMetadata;

/// CWE identifier anywhere in free text; first match wins.
static CWE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCWE-[1-9]\d*\b").expect("cwe regex is valid"));

/// Explicit `CWE-ID` fields must be exactly one identifier.
static CWE_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^CWE-[1-9][0-9]+$").expect("cwe id regex is valid"));

/// v4 sections copied through with language-code normalization.
const LANG_SECTIONS: &[(&str, &str)] = &[
    ("configuration", "configurations"),
    ("work_around", "workarounds"),
    ("workaround", "workarounds"),
    ("exploit", "exploits"),
    ("timeline", "timeline"),
    ("solution", "solutions"),
];

/// Keyed per-record diagnostics, embedded as `x_ConverterErrors`.
#[derive(Debug, Default)]
pub struct ConverterErrors {
    notes: BTreeMap<String, Value>,
}

impl ConverterErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one diagnostic. A later note under the same key replaces
    /// the earlier one.
    pub fn add(&mut self, key: &str, error: &str, message: impl Into<String>) {
        self.notes.insert(
            key.to_string(),
            json!({"error": error, "message": message.into()}),
        );
    }

    pub fn has(&self, key: &str) -> bool {
        self.notes.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn message(&self, key: &str) -> Option<&str> {
        self.notes.get(key)?.get("message")?.as_str()
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.notes.clone().into_iter().collect())
    }
}

/// One converted record plus everything the run report tallies.
pub struct Conversion {
    pub cve_id: String,
    pub state: RecordState,
    pub document: Value,
    pub notes: ConverterErrors,
    pub scoring_other: Vec<Value>,
    pub invalid_impact_versions: Vec<String>,
    pub leftover_keys: Vec<String>,
    pub title_length: usize,
}

/// Converts one parsed v4 record into a v5 document.
pub async fn convert_record(
    input_name: &str,
    source: Value,
    history: &HistoryIndex,
    tag_map: &TagMap,
    idr: &mut IdrClient,
) -> Result<Conversion, ConvertError> {
    let mut legacy = LegacyRecord::new(source);
    let mut notes = ConverterErrors::new();
    let resolved = metadata::resolve(input_name, &legacy, history, idr, &mut notes).await?;

    let mut scoring_other = Vec::new();
    let mut invalid_impact_versions = Vec::new();
    let mut title_length = 0usize;

    let (containers, leftover_keys) = match resolved.state {
        RecordState::Reserved => (None, legacy.leftover_keys()),
        RecordState::Published => {
            let output = published_container(&mut legacy, &resolved, tag_map, &mut notes)?;
            scoring_other = output.scoring_other;
            invalid_impact_versions = output.invalid_versions;
            title_length = output.title_length;
            (Some(output.container), output.leftover)
        }
        RecordState::Rejected => {
            let (container, leftover) = rejected_container(&mut legacy, &resolved, &mut notes);
            (Some(container), leftover)
        }
    };

    let document = record::envelope(resolved.cve_metadata.clone(), containers);
    Ok(Conversion {
        cve_id: resolved.cve_id,
        state: resolved.state,
        document,
        notes,
        scoring_other,
        invalid_impact_versions,
        leftover_keys,
        title_length,
    })
}

struct PublishedOutput {
    container: Value,
    leftover: Vec<String>,
    title_length: usize,
    scoring_other: Vec<Value>,
    invalid_versions: Vec<String>,
}

fn published_container(
    legacy: &mut LegacyRecord,
    resolved: &ResolvedMetadata,
    tag_map: &TagMap,
    notes: &mut ConverterErrors,
) -> Result<PublishedOutput, ConvertError> {
    let mut cna = Map::new();

    let mut title_length = 0usize;
    if let Some(title) = legacy.meta_str("TITLE") {
        title_length = title.chars().count();
        let text = if title_length > 256 {
            notes.add("TITLE", "TITLE too long. Truncating in v5 record.", "Truncated!");
            format!("{} ...", clip_chars(title, 251))
        } else {
            title.to_string()
        };
        cna.insert("title".to_string(), json!(text));
    }

    if let Some(raw) = legacy.meta_value("DATE_PUBLIC")
        && truthy(raw)
        && let Some(iso) = dates::midnight_iso(&string_form(raw))
    {
        cna.insert("datePublic".to_string(), json!(iso));
    }

    if let Some(raw) = legacy.meta_value("DATE_ASSIGNED") {
        let text = string_form(raw);
        match dates::midnight_iso(&text) {
            Some(iso) => {
                cna.insert("dateAssigned".to_string(), json!(iso));
            }
            None => notes.add("DATE_ASSIGNED", "v4 DATE_ASSIGNED is invalid", &text),
        }
    }

    cna.insert("providerMetadata".to_string(), provider_metadata(resolved));

    if legacy.peek("description").is_some_and(|d| d.get("description_data").is_some())
        && let Some(description) = legacy.section("description")
    {
        let descriptions = description_entries(&description, &mut cna, strip_status_marker);
        if !descriptions.is_empty() {
            cna.insert("descriptions".to_string(), json!(descriptions));
        }
    }

    if legacy.has_section("affects") {
        if let Some(affects) = legacy.section("affects") {
            let affected = versions::convert_affected(&resolved.cve_id, &affects, notes)?;
            cna.insert("affected".to_string(), json!(affected));
        }
    } else {
        notes.add(
            "affects",
            "Missing affected product. Using unspecified instead.",
            "Marking it unspecified!",
        );
        cna.insert(
            "affected".to_string(),
            json!([{
                "vendor": "unspecified",
                "product": "unspecified",
                "defaultStatus": "unknown"
            }]),
        );
    }

    if legacy.peek("references").is_some_and(|r| r.get("reference_data").is_some())
        && let Some(refs) = legacy.section("references")
    {
        cna.insert(
            "references".to_string(),
            json!(references::convert_references(&refs, tag_map)),
        );
    }

    if let Some(credit) = legacy.section("credit") {
        let credits = convert_credits(&credit);
        if !credits.is_empty() {
            cna.insert("credits".to_string(), json!(credits));
        }
    }

    let mut scoring_other = Vec::new();
    let mut invalid_versions = Vec::new();
    // Only a non-empty impact block counts; a bare key stays unclaimed.
    if legacy.peek("impact").is_some_and(truthy)
        && let Some(impact) = legacy.section("impact")
    {
        let outcome = metrics::convert_impact(&resolved.cve_id, &impact, notes)?;
        if !outcome.metrics.is_empty() {
            cna.insert("metrics".to_string(), json!(outcome.metrics));
        }
        scoring_other = outcome.scoring_other;
        invalid_versions = outcome.invalid_versions;
    }

    if legacy.peek("problemtype").is_some_and(|p| p.get("problemtype_data").is_some())
        && let Some(problemtype) = legacy.section("problemtype")
    {
        let problem_types = convert_problem_types(&problemtype);
        let problem_types = json!(problem_types);
        if record::has_val(&problem_types) {
            cna.insert("problemTypes".to_string(), problem_types);
        }
    }

    if let Some(generator) = legacy.section("generator") {
        cna.insert("x_generator".to_string(), generator);
    }
    if let Some(source) = legacy.section("source") {
        cna.insert("source".to_string(), source);
    }

    for (v4_key, v5_key) in LANG_SECTIONS {
        if let Some(section) = legacy.section(v4_key) {
            let mut entries = convert_lang_list(&section);
            match *v5_key {
                "timeline" => entries = finish_timeline(entries),
                "solutions" => entries = finish_solutions(entries),
                _ => {}
            }
            // Later spellings of the same section overwrite earlier ones,
            // even when they come up empty.
            if entries.is_empty() {
                cna.remove(*v5_key);
            } else {
                cna.insert((*v5_key).to_string(), json!(entries));
            }
        }
    }

    // Anything the mapping above did not claim is kept under an x_ key.
    let leftover = legacy.leftover_keys();
    for key in &leftover {
        if let Some(value) = legacy.section(key) {
            let target = if key.starts_with("x_") {
                key.clone()
            } else {
                format!("x_{key}")
            };
            cna.insert(target, value);
        }
    }

    Ok(PublishedOutput {
        container: finish_container(cna, legacy, notes),
        leftover,
        title_length,
        scoring_other,
        invalid_versions,
    })
}

fn rejected_container(
    legacy: &mut LegacyRecord,
    resolved: &ResolvedMetadata,
    notes: &mut ConverterErrors,
) -> (Value, Vec<String>) {
    let mut cna = Map::new();
    cna.insert("providerMetadata".to_string(), provider_metadata(resolved));

    if legacy.peek("description").is_some_and(|d| d.get("description_data").is_some())
        && let Some(description) = legacy.section("description")
    {
        let reasons = description_entries(&description, &mut cna, strip_rejection_marker);
        if !reasons.is_empty() {
            cna.insert("rejectedReasons".to_string(), json!(reasons));
        }
    }

    let leftover = legacy.leftover_keys();
    (finish_container(cna, legacy, notes), leftover)
}

/// Prunes empties, then attaches the diagnostics block and the
/// untouched original record for audit.
fn finish_container(cna: Map<String, Value>, legacy: &LegacyRecord, notes: &ConverterErrors) -> Value {
    let mut map = match record::clean_empty(&Value::Object(cna)) {
        Value::Object(map) => map,
        other => return other,
    };
    if !notes.is_empty() {
        map.insert("x_ConverterErrors".to_string(), notes.as_value());
    }
    map.insert("x_legacyV4Record".to_string(), legacy.source().clone());
    json!({"cna": Value::Object(map)})
}

fn provider_metadata(resolved: &ResolvedMetadata) -> Value {
    let updated = resolved
        .cve_metadata
        .get("dateUpdated")
        .and_then(Value::as_str)
        .and_then(dates::parse_loose)
        .map(|dt| dates::iso_seconds(dates::midnight_of(dt)))
        .unwrap_or_else(|| dates::iso_seconds(dates::today_midnight()));
    json!({
        "orgId": resolved.assigner_org_id,
        "shortName": resolved.assigner_short_name,
        "dateUpdated": updated
    })
}

fn description_entries(
    description: &Value,
    cna: &mut Map<String, Value>,
    strip: impl Fn(&str) -> (String, Vec<&'static str>),
) -> Vec<Value> {
    let items = description
        .get("description_data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();
    for item in &items {
        let mut entry = Map::new();
        if let Some(lang) = item.get("lang").and_then(Value::as_str) {
            entry.insert("lang".to_string(), json!(narrow_lang_code(lang)));
        }
        if let Some(value) = item.get("value").and_then(Value::as_str) {
            let (text, tags) = strip(value);
            for tag in tags {
                add_container_tag(cna, tag);
            }
            entry.insert("value".to_string(), json!(text));
        }
        out.push(Value::Object(entry));
    }
    out
}

/// Splits a leading dispute/support marker off a description, mapping
/// it to the container tag it stands for.
fn strip_status_marker(value: &str) -> (String, Vec<&'static str>) {
    let folded = value.to_lowercase();
    if folded.starts_with("** disputed") {
        (skip_chars(value, 14).trim().to_string(), vec!["disputed"])
    } else if folded.starts_with("** unsupported when assigned") {
        (
            skip_chars(value, 31).trim().to_string(),
            vec!["unsupported-when-assigned"],
        )
    } else {
        (value.to_string(), Vec::new())
    }
}

/// Rejection reasons run the full marker chain on the progressively
/// stripped text, ending with the `** REJECT **` preamble itself, so
/// stacked markers all peel off.
fn strip_rejection_marker(value: &str) -> (String, Vec<&'static str>) {
    let mut tags = Vec::new();
    let mut text = value.to_string();
    if text.to_lowercase().starts_with("** disputed") {
        text = skip_chars(&text, 14).trim().to_string();
        tags.push("disputed");
    }
    if text.to_lowercase().starts_with("** unsupported when assigned") {
        text = skip_chars(&text, 31).trim().to_string();
        tags.push("unsupported-when-assigned");
    }
    if text.to_lowercase().starts_with("** reject") {
        text = skip_chars(&text, 12).trim().to_string();
    }
    (text, tags)
}

fn add_container_tag(cna: &mut Map<String, Value>, tag: &str) {
    let tags = cna
        .entry("tags")
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Some(list) = tags.as_array_mut() {
        let tag = json!(tag);
        if !list.contains(&tag) {
            list.push(tag);
        }
    }
}

fn convert_credits(credit: &Value) -> Vec<Value> {
    let mut out = Vec::new();
    match credit {
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::Object(obj) => {
                        let Some(value) = obj.get("value") else {
                            continue;
                        };
                        let lang = obj
                            .get("lang")
                            .and_then(Value::as_str)
                            .map(narrow_lang_code)
                            .unwrap_or_else(|| "en".to_string());
                        out.push(json!({"lang": lang, "value": value.clone()}));
                    }
                    Value::Array(nested) => {
                        for inner in nested {
                            out.push(json!({"lang": "en", "value": inner.clone()}));
                        }
                    }
                    scalar => {
                        out.push(json!({"lang": "en", "value": scalar.clone()}));
                    }
                }
            }
        }
        other => {
            out.push(json!({"lang": "en", "value": string_form(other)}));
        }
    }
    out
}

fn convert_problem_types(problemtype: &Value) -> Vec<Value> {
    let groups = problemtype
        .get("problemtype_data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();
    for group in &groups {
        let items = group
            .get("description")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut converted = Vec::new();
        for item in &items {
            let Some(obj) = item.as_object() else {
                continue;
            };
            let mut entry = Map::new();
            entry.insert("type".to_string(), json!("text"));
            for (key, value) in obj {
                match key.as_str() {
                    "lang" => {
                        match value.as_str() {
                            Some(code) => {
                                entry.insert("lang".to_string(), json!(narrow_lang_code(code)));
                            }
                            None => {
                                entry.insert("lang".to_string(), value.clone());
                            }
                        };
                    }
                    "value" => {
                        entry.insert("description".to_string(), value.clone());
                        if let Some(text) = value.as_str()
                            && let Some(found) = CWE_REGEX.find(text)
                        {
                            entry.insert("type".to_string(), json!("CWE"));
                            entry.insert("cweId".to_string(), json!(found.as_str().to_uppercase()));
                        }
                    }
                    _ => {
                        entry.insert(key.clone(), value.clone());
                    }
                }
            }
            if !entry.get("lang").is_some_and(truthy) {
                entry.insert("lang".to_string(), json!("en"));
            }
            if entry.get("description").is_some_and(truthy) {
                converted.push(Value::Object(entry));
            }
        }
        // An explicit CWE-ID on the group adds its own entry, keeping
        // the legacy "eng" code that came with these fields.
        if let Some(cwe_id) = group.get("CWE-ID").and_then(Value::as_str)
            && CWE_ID_REGEX.is_match(cwe_id)
        {
            converted.push(json!({
                "cweId": cwe_id,
                "description": cwe_id,
                "lang": "eng",
                "type": "CWE"
            }));
        }
        if !converted.is_empty() {
            out.push(json!({"descriptions": converted}));
        }
    }
    out
}

/// Normalizes a list-or-scalar section to a list of objects with
/// narrowed language codes. Entries without a `lang` key are dropped.
fn convert_lang_list(value: &Value) -> Vec<Value> {
    let items: Vec<Value> = match value {
        Value::Array(list) => list.clone(),
        other => vec![other.clone()],
    };
    let mut out = Vec::new();
    for item in items {
        let Some(obj) = item.as_object() else {
            continue;
        };
        if !obj.contains_key("lang") {
            continue;
        }
        let mut rebuilt = obj.clone();
        if let Some(code) = obj.get("lang").and_then(Value::as_str) {
            rebuilt.insert("lang".to_string(), json!(narrow_lang_code(code)));
        }
        out.push(Value::Object(rebuilt));
    }
    out
}

/// Timeline entries need both a value and a time; times snap to
/// midnight ISO when they parse.
fn finish_timeline(entries: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::new();
    for entry in entries {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        if !(obj.get("value").is_some_and(truthy) && obj.get("time").is_some_and(truthy)) {
            continue;
        }
        let mut rebuilt = obj.clone();
        if !rebuilt.get("lang").is_some_and(truthy) {
            rebuilt.insert("lang".to_string(), json!("en"));
        }
        if let Some(time) = obj.get("time").and_then(Value::as_str)
            && let Some(iso) = dates::midnight_iso(time)
        {
            rebuilt.insert("time".to_string(), json!(iso));
        }
        out.push(Value::Object(rebuilt));
    }
    out
}

fn finish_solutions(entries: Vec<Value>) -> Vec<Value> {
    let mut out = Vec::new();
    for entry in entries {
        let Some(obj) = entry.as_object() else {
            continue;
        };
        if !obj.get("value").is_some_and(truthy) {
            continue;
        }
        let mut rebuilt = obj.clone();
        if !rebuilt.get("lang").is_some_and(truthy) {
            rebuilt.insert("lang".to_string(), json!("en"));
        }
        out.push(Value::Object(rebuilt));
    }
    out
}

/// First `limit` characters, never splitting a code point.
pub(crate) fn clip_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Everything after the first `count` characters.
fn skip_chars(text: &str, count: usize) -> &str {
    match text.char_indices().nth(count) {
        Some((index, _)) => &text[index..],
        None => "",
    }
}

pub(crate) fn string_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_idr() -> IdrClient {
        let settings = crate::model::IdrSettings {
            base_url: "https://idr.invalid/api".to_string(),
            fetch_attempts: 1,
            retry_delay_secs: 0,
            ..Default::default()
        };
        let mut idr = IdrClient::new(settings);
        idr.seed_record(
            "CVE-2020-0001",
            json!({"cve_id": "CVE-2020-0001", "owning_cna": "org-uuid-1"}),
        );
        idr.seed_orgs(vec![json!({"UUID": "org-uuid-1", "short_name": "acme"})]);
        idr
    }

    async fn convert(source: Value) -> Conversion {
        let mut idr = seeded_idr();
        convert_record(
            "input.json",
            source,
            &HistoryIndex::empty(),
            &TagMap::empty(),
            &mut idr,
        )
        .await
        .unwrap()
    }

    fn published_source() -> Value {
        json!({
            "data_type": "CVE",
            "data_format": "MITRE",
            "data_version": "4.0",
            "CVE_data_meta": {
                "ID": "CVE-2020-0001",
                "ASSIGNER": "cve@acme.example",
                "STATE": "PUBLIC",
                "TITLE": "Stack overflow in widget",
                "DATE_PUBLIC": "2020-03-01T16:00:00Z"
            },
            "description": {"description_data": [{
                "lang": "eng",
                "value": "** DISPUTED ** A stack overflow in Widget allows remote crashes."
            }]},
            "affects": {"vendor": {"vendor_data": [{
                "vendor_name": "Acme",
                "product": {"product_data": [{
                    "product_name": "Widget",
                    "version": {"version_data": [
                        {"version_affected": "<", "version_value": "2.0"}
                    ]}
                }]}
            }]}},
            "references": {"reference_data": [{
                "url": "https://example.com/advisory",
                "name": "advisory",
                "refsource": "MISC"
            }]},
            "impact": {"cvss": {
                "version": "3.1",
                "vectorString": "CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H"
            }},
            "problemtype": {"problemtype_data": [{"description": [{
                "lang": "eng",
                "value": "CWE-121 Stack-based Buffer Overflow"
            }]}]},
            "custom_block": {"anything": true}
        })
    }

    #[tokio::test]
    async fn test_published_record_end_to_end() {
        let source = published_source();
        let conversion = convert(source.clone()).await;

        let doc = &conversion.document;
        assert_eq!(doc["dataType"], "CVE_RECORD");
        assert_eq!(doc["dataVersion"], "5.0");
        assert_eq!(doc["cveMetadata"]["state"], "PUBLISHED");
        assert_eq!(doc["cveMetadata"]["datePublished"], "2020-03-01T00:00:00");

        let cna = &doc["containers"]["cna"];
        assert_eq!(cna["title"], "Stack overflow in widget");
        assert_eq!(cna["datePublic"], "2020-03-01T00:00:00");
        assert_eq!(cna["providerMetadata"]["orgId"], "org-uuid-1");
        assert_eq!(cna["providerMetadata"]["shortName"], "acme");
        assert_eq!(cna["tags"], json!(["disputed"]));
        assert_eq!(cna["descriptions"][0]["lang"], "en");
        assert_eq!(
            cna["descriptions"][0]["value"],
            "A stack overflow in Widget allows remote crashes."
        );
        assert_eq!(cna["affected"][0]["versions"][0]["lessThan"], "2.0");
        assert_eq!(cna["references"][0]["tags"], json!(["x_refsource_MISC"]));
        assert_eq!(cna["metrics"][0]["cvssV3_1"]["baseScore"], 9.8);
        let problem = &cna["problemTypes"][0]["descriptions"][0];
        assert_eq!(problem["type"], "CWE");
        assert_eq!(problem["cweId"], "CWE-121");
        assert_eq!(cna["x_custom_block"], json!({"anything": true}));
        assert_eq!(cna["x_legacyV4Record"], source);
        assert!(cna.get("x_ConverterErrors").is_none());
        assert_eq!(conversion.leftover_keys, vec!["custom_block".to_string()]);
    }

    #[tokio::test]
    async fn test_rejected_record_builds_reasons() {
        let source = json!({
            "CVE_data_meta": {
                "ID": "CVE-2020-0001",
                "STATE": "REJECT",
                "REPLACED_BY": "CVE-2020-0002"
            },
            "description": {"description_data": [
                {"lang": "eng", "value": "** REJECT ** DO NOT USE THIS CANDIDATE NUMBER."},
                {"lang": "eng"}
            ]},
            "affects": {"vendor": {"vendor_data": []}}
        });
        let conversion = convert(source.clone()).await;

        let doc = &conversion.document;
        assert_eq!(doc["cveMetadata"]["state"], "REJECTED");
        assert_eq!(doc["cveMetadata"]["replacedBy"], json!(["CVE-2020-0002"]));
        let cna = &doc["containers"]["cna"];
        assert_eq!(
            cna["rejectedReasons"],
            json!([{"lang": "en", "value": "DO NOT USE THIS CANDIDATE NUMBER."}])
        );
        // Rejected containers carry no product data, and the unclaimed
        // section is only reported, not embedded.
        assert!(cna.get("affected").is_none());
        assert!(cna.get("x_affects").is_none());
        assert_eq!(conversion.leftover_keys, vec!["affects".to_string()]);
        assert_eq!(cna["x_legacyV4Record"], source);
    }

    #[tokio::test]
    async fn test_reserved_record_has_no_containers() {
        let conversion = convert(json!({
            "CVE_data_meta": {"ID": "CVE-2020-0002", "STATE": "RESERVED"},
            "description": {"description_data": [{"lang": "eng", "value": "reserved"}]}
        }))
        .await;

        let doc = &conversion.document;
        assert_eq!(doc["cveMetadata"]["state"], "RESERVED");
        assert!(doc.get("containers").is_none());
        assert!(doc["cveMetadata"].get("dateReserved").is_some());
        assert!(doc["cveMetadata"].get("dateUpdated").is_some());
        assert_eq!(conversion.leftover_keys, vec!["description".to_string()]);
    }

    #[tokio::test]
    async fn test_long_title_is_truncated_with_note() {
        let mut source = published_source();
        source["CVE_data_meta"]["TITLE"] = json!("t".repeat(300));
        let conversion = convert(source).await;

        let cna = &conversion.document["containers"]["cna"];
        let title = cna["title"].as_str().unwrap();
        assert_eq!(title.chars().count(), 255);
        assert!(title.ends_with(" ..."));
        assert!(conversion.notes.has("TITLE"));
        assert!(cna["x_ConverterErrors"].get("TITLE").is_some());
        assert_eq!(conversion.title_length, 300);
    }

    #[tokio::test]
    async fn test_missing_affects_defaults_to_unspecified() {
        let mut source = published_source();
        source.as_object_mut().unwrap().remove("affects");
        let conversion = convert(source).await;

        let cna = &conversion.document["containers"]["cna"];
        assert_eq!(
            cna["affected"],
            json!([{
                "defaultStatus": "unknown",
                "product": "unspecified",
                "vendor": "unspecified"
            }])
        );
        assert!(conversion.notes.has("affects"));
    }

    #[tokio::test]
    async fn test_credits_and_lang_sections() {
        let mut source = published_source();
        let obj = source.as_object_mut().unwrap();
        obj.insert(
            "credit".to_string(),
            json!([{"lang": "eng", "value": "Jane Researcher"}, "Bob"]),
        );
        obj.insert(
            "solution".to_string(),
            json!({"lang": "eng", "value": "Upgrade to 2.0"}),
        );
        obj.insert(
            "timeline".to_string(),
            json!([
                {"lang": "eng", "time": "2020-01-02T10:00:00Z", "value": "reported"},
                {"lang": "eng", "value": "no time given"}
            ]),
        );
        let conversion = convert(source).await;

        let cna = &conversion.document["containers"]["cna"];
        assert_eq!(
            cna["credits"],
            json!([
                {"lang": "en", "value": "Jane Researcher"},
                {"lang": "en", "value": "Bob"}
            ])
        );
        assert_eq!(
            cna["solutions"],
            json!([{"lang": "en", "value": "Upgrade to 2.0"}])
        );
        assert_eq!(
            cna["timeline"],
            json!([{"lang": "en", "time": "2020-01-02T00:00:00", "value": "reported"}])
        );
    }

    #[tokio::test]
    async fn test_rejected_markers_chain_before_reject() {
        let source = json!({
            "CVE_data_meta": {"ID": "CVE-2020-0001", "STATE": "REJECT"},
            "description": {"description_data": [{
                "lang": "eng",
                "value": "** DISPUTED ** ** REJECT ** DO NOT USE THIS CANDIDATE NUMBER."
            }]}
        });
        let conversion = convert(source).await;

        let cna = &conversion.document["containers"]["cna"];
        assert_eq!(cna["tags"], json!(["disputed"]));
        assert_eq!(
            cna["rejectedReasons"][0]["value"],
            "DO NOT USE THIS CANDIDATE NUMBER."
        );
    }

    #[tokio::test]
    async fn test_problemtype_cwe_id_field_adds_entry() {
        let mut source = published_source();
        source["problemtype"] = json!({"problemtype_data": [{
            "description": [{"lang": "eng", "value": "Cross-site scripting"}],
            "CWE-ID": "CWE-79"
        }, {
            "description": [{"lang": "eng", "value": "Other"}],
            "CWE-ID": "cwe-80"
        }]});
        let conversion = convert(source).await;

        let groups = &conversion.document["containers"]["cna"]["problemTypes"];
        assert_eq!(
            groups[0]["descriptions"],
            json!([
                {"description": "Cross-site scripting", "lang": "en", "type": "text"},
                {"cweId": "CWE-79", "description": "CWE-79", "lang": "eng", "type": "CWE"}
            ])
        );
        // Lowercase identifiers do not qualify as explicit CWE ids.
        assert_eq!(
            groups[1]["descriptions"],
            json!([{"description": "Other", "lang": "en", "type": "text"}])
        );
    }

    #[tokio::test]
    async fn test_workaround_spellings_overwrite() {
        let mut source = published_source();
        let obj = source.as_object_mut().unwrap();
        obj.insert(
            "work_around".to_string(),
            json!([{"lang": "eng", "value": "Disable the plugin."}]),
        );
        obj.insert("workaround".to_string(), json!([]));
        let conversion = convert(source).await;

        // The later empty spelling erases what the earlier one produced.
        let cna = &conversion.document["containers"]["cna"];
        assert!(cna.get("workarounds").is_none());

        let mut source = published_source();
        source.as_object_mut().unwrap().insert(
            "work_around".to_string(),
            json!([{"lang": "eng", "value": "Disable the plugin."}]),
        );
        let conversion = convert(source).await;
        assert_eq!(
            conversion.document["containers"]["cna"]["workarounds"],
            json!([{"lang": "en", "value": "Disable the plugin."}])
        );
    }

    #[tokio::test]
    async fn test_blank_date_assigned_is_noted() {
        let mut source = published_source();
        source["CVE_data_meta"]["DATE_ASSIGNED"] = json!("");
        let conversion = convert(source).await;

        let cna = &conversion.document["containers"]["cna"];
        assert!(cna.get("dateAssigned").is_none());
        assert_eq!(
            cna["x_ConverterErrors"]["DATE_ASSIGNED"]["error"],
            "v4 DATE_ASSIGNED is invalid"
        );

        let mut source = published_source();
        source["CVE_data_meta"]["DATE_ASSIGNED"] = json!("2020-02-10T08:00:00Z");
        let conversion = convert(source).await;
        assert_eq!(
            conversion.document["containers"]["cna"]["dateAssigned"],
            "2020-02-10T00:00:00"
        );
        assert!(!conversion.notes.has("DATE_ASSIGNED"));
    }

    #[tokio::test]
    async fn test_empty_impact_is_not_claimed() {
        let mut source = published_source();
        source["impact"] = json!({});
        let conversion = convert(source).await;

        // The empty block rides the passthrough path and is pruned
        // there, but the run report still sees it as unclaimed.
        let cna = &conversion.document["containers"]["cna"];
        assert!(cna.get("metrics").is_none());
        assert!(cna.get("x_impact").is_none());
        assert!(conversion.leftover_keys.contains(&"impact".to_string()));
    }
}
