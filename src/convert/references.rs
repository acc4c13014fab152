//! Reference rewriting
//!
//! v4 `references.reference_data` entries carry a URL, an optional
//! display name, and a `refsource` label. URLs are normalized by a
//! decode/encode round trip so mixed or double percent-encoding comes
//! out uniform, refsource labels are mapped to v5 tags, and the label
//! itself is preserved as an `x_refsource_*` tag.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use serde_json::{Map, Value};

use crate::service::TagMap;

use super::string_form;

/// Characters left intact when re-encoding a reference URL.
const URL_KEEP: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b':')
    .remove(b'/')
    .remove(b'=')
    .remove(b'&')
    .remove(b'?')
    .remove(b'#')
    .remove(b'%')
    .remove(b'+');

/// Converts a v4 `references` block into the v5 `references` list.
pub fn convert_references(references: &Value, tag_map: &TagMap) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();

    let reference_data = references
        .get("reference_data")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for item in &reference_data {
        let refsource = item.get("refsource");
        // A literal "url" refsource marks placeholder rows.
        if refsource.and_then(Value::as_str) == Some("url") {
            continue;
        }
        let Some(raw_url) = item.get("url").and_then(Value::as_str) else {
            continue;
        };
        let url = re_encode(raw_url);
        if url.is_empty() {
            continue;
        }

        let mut entry = Map::new();
        entry.insert("url".to_string(), Value::String(url));

        if let Some(name) = item.get("name")
            && name.as_str() != Some("")
            && name.as_str() != Some(raw_url)
        {
            entry.insert("name".to_string(), name.clone());
        }

        if let Some(refsource) = refsource {
            let label = string_form(refsource);
            let mut tags: Vec<Value> = Vec::new();
            if let Some(mapped) = tag_map.tags_for(&label) {
                tags.extend(mapped.iter().map(|t| Value::String(t.clone())));
            }
            let marker = Value::String(format!("x_refsource_{label}"));
            if !tags.contains(&marker) {
                tags.push(marker);
            }
            entry.insert("tags".to_string(), Value::Array(tags));
        }

        let entry = Value::Object(entry);
        if !out.contains(&entry) {
            out.push(entry);
        }
    }

    out
}

/// Decodes any percent escapes and re-encodes with a fixed keep set.
fn re_encode(raw: &str) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy().into_owned();
    utf8_percent_encode(&decoded, URL_KEEP).to_string()
}
