//! Affected product and version range normalization
//!
//! v4 `affects` trees nest vendor/product/version lists with a
//! free-text `version_affected` marker (`<`, `<=`, `!`, `?`, ...).
//! Each product is regrouped by platform and its version items are
//! rewritten as v5 `versions` entries: plain statuses, `lessThan` /
//! `lessThanOrEqual` bounds, and named ranges that accumulate
//! status change points.

use serde_json::{Map, Value, json};

use crate::error::ConvertError;
use crate::model::legacy::truthy;

use super::{ConverterErrors, clip_chars, string_form};

const TRUNCATION_MARKER: &str = " ...[truncated*]";
const PRODUCT_LIMIT: usize = 2048;
const VERSION_LIMIT: usize = 1024;

/// One platform bucket of a product while its versions are collected.
/// Named ranges keep insertion order so change points stay attached to
/// the range that introduced them.
struct PlatformGroup {
    platform: Option<Value>,
    flat: Vec<Value>,
    named: Vec<(String, Value)>,
}

/// Converts a v4 `affects` tree into the v5 `affected` list.
pub fn convert_affected(
    cve_id: &str,
    affects: &Value,
    notes: &mut ConverterErrors,
) -> Result<Vec<Value>, ConvertError> {
    let mut out: Vec<Value> = Vec::new();

    let vendor_data = affects
        .get("vendor")
        .and_then(|v| v.get("vendor_data"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for vendor_entry in &vendor_data {
        let vendor = vendor_entry
            .get("vendor_name")
            .cloned()
            .unwrap_or_else(|| json!("unspecified"));
        let product_data = vendor_entry
            .get("product")
            .and_then(|p| p.get("product_data"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for product_entry in &product_data {
            let product = product_entry
                .get("product_name")
                .cloned()
                .unwrap_or_else(|| json!("unspecified"));
            let Some(version_data) = product_entry
                .get("version")
                .and_then(|v| v.get("version_data"))
                .and_then(Value::as_array)
            else {
                continue;
            };

            let mut groups: Vec<(String, PlatformGroup)> = Vec::new();
            for item in version_data {
                collect_version(cve_id, item, &vendor, &product, &mut groups)?;
            }

            if groups.is_empty() {
                push_unique(
                    &mut out,
                    product_item(&vendor, &product, Vec::new(), None),
                );
                continue;
            }
            for (key, group) in groups {
                let mut versions = group.flat;
                versions.extend(group.named.into_iter().map(|(_, entry)| entry));
                let mut deduped: Vec<Value> = Vec::new();
                for version in versions {
                    if !deduped.contains(&version) {
                        deduped.push(version);
                    }
                }
                let platform = if key.is_empty() { None } else { group.platform };
                push_unique(&mut out, product_item(&vendor, &product, deduped, platform));
            }
        }
    }

    finish(&mut out, notes);
    Ok(out)
}

/// Routes one version item into its platform group.
fn collect_version(
    cve_id: &str,
    item: &Value,
    vendor: &Value,
    product: &Value,
    groups: &mut Vec<(String, PlatformGroup)>,
) -> Result<(), ConvertError> {
    let value = match item.get("version_value") {
        None | Some(Value::Null) => {
            return Err(ConvertError::missing(
                cve_id,
                format!(
                    "AFFECT.vendor.product  missing a version_value for ({} - {})",
                    string_form(vendor),
                    string_form(product)
                ),
            ));
        }
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };
    let marker = item
        .get("version_affected")
        .or_else(|| item.get("affected"))
        .and_then(Value::as_str)
        .unwrap_or("");
    let (status, op) = parse_marker(marker);

    let platform = item.get("platform").filter(|p| !p.is_null());
    let key = platform.map(string_form).unwrap_or_default();
    let position = match groups.iter().position(|(k, _)| *k == key) {
        Some(index) => index,
        None => {
            groups.push((
                key,
                PlatformGroup {
                    platform: platform.cloned(),
                    flat: Vec::new(),
                    named: Vec::new(),
                },
            ));
            groups.len() - 1
        }
    };
    let group = &mut groups[position].1;

    let has_name = item
        .as_object()
        .is_some_and(|o| o.contains_key("version_name"));
    if has_name {
        let name = string_form(item.get("version_name").unwrap_or(&Value::Null));
        collect_named(group, &name, &value, status, &op);
    } else {
        group.flat.push(unnamed_entry(&value, status, &op));
    }
    Ok(())
}

/// Splits a `version_affected` marker into a status and a comparison
/// operator. Markers only count when they start with an operator or
/// negation character; `!` anywhere flips to unaffected, `?` to
/// unknown, and whatever is left over is the operator (`=` if nothing).
fn parse_marker(marker: &str) -> (&'static str, String) {
    if !marker.starts_with(['!', '?', '<', '>', '=']) {
        return ("affected", "=".to_string());
    }
    let (status, op) = if marker.contains('!') {
        ("unaffected", marker.replace('!', ""))
    } else if marker.contains('?') {
        ("unknown", marker.replace('?', ""))
    } else {
        ("affected", marker.to_string())
    };
    let op = if op.is_empty() { "=".to_string() } else { op };
    (status, op)
}

/// Handles items that carry a `version_name`: exact values become flat
/// entries, repeated names accumulate change points, new names open a
/// bounded range.
fn collect_named(group: &mut PlatformGroup, name: &str, value: &str, status: &str, op: &str) {
    if op == "=" {
        let version = if value.starts_with(name) {
            value.to_string()
        } else {
            format!("{name} {value}")
        };
        group
            .flat
            .push(non_empty(json!({"version": version, "status": status})));
        return;
    }

    if let Some((_, existing)) = group.named.iter_mut().find(|(n, _)| n == name) {
        // A bound on an already-open range marks the point where the
        // status flips.
        let change = match op {
            "<" => json!({"at": value, "status": negate(status)}),
            "<=" => json!({"at": format!("{value} +1"), "status": negate(status)}),
            _ => json!({"at": value, "status": status}),
        };
        if let Some(obj) = existing.as_object_mut() {
            let changes = obj
                .entry("changes")
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Some(list) = changes.as_array_mut()
                && !list.contains(&change)
            {
                list.push(change);
            }
        }
        return;
    }

    let entry = match op {
        "<" => non_empty(json!({
            "version": name, "status": status,
            "lessThan": value, "versionType": "custom"
        })),
        "<=" => non_empty(json!({
            "version": name, "status": status,
            "lessThanOrEqual": value, "versionType": "custom"
        })),
        _ => json!({
            "version": value, "status": status,
            "lessThan": format!("{name}*"), "versionType": "custom"
        }),
    };
    group.named.push((name.to_string(), entry));
}

/// Builds the v5 entry for an unnamed version item.
fn unnamed_entry(value: &str, status: &str, op: &str) -> Value {
    let trimmed = value.trim();
    let bound = if trimmed.is_empty() {
        "undefined".to_string()
    } else {
        trimmed.to_string()
    };
    let entry = match op {
        "=" => json!({"version": value, "status": status}),
        "<" => json!({
            "version": "unspecified", "status": status,
            "lessThan": bound, "versionType": "custom"
        }),
        "<=" => json!({
            "version": "unspecified", "status": status,
            "lessThanOrEqual": bound, "versionType": "custom"
        }),
        ">" => json!({
            "version": format!("next of {value}"), "status": status,
            "lessThan": "unspecified", "versionType": "custom"
        }),
        ">=" => json!({
            "version": value, "status": status,
            "lessThan": "unspecified", "versionType": "custom"
        }),
        _ => json!({"version": value, "status": "affected"}),
    };
    non_empty(entry)
}

fn product_item(
    vendor: &Value,
    product: &Value,
    versions: Vec<Value>,
    platform: Option<Value>,
) -> Value {
    let mut item = Map::new();
    item.insert("vendor".to_string(), vendor.clone());
    item.insert("product".to_string(), product.clone());
    if versions.is_empty() {
        item.insert("defaultStatus".to_string(), json!("unknown"));
    } else {
        item.insert("versions".to_string(), Value::Array(versions));
    }
    if let Some(platform) = platform {
        item.insert("platforms".to_string(), json!([platform]));
    }
    Value::Object(item)
}

fn push_unique(out: &mut Vec<Value>, item: Value) {
    if !out.contains(&item) {
        out.push(item);
    }
}

/// Backfills unusable vendor/product names and truncates oversized
/// strings, leaving a converter note when content was cut.
fn finish(out: &mut [Value], notes: &mut ConverterErrors) {
    for item in out.iter_mut() {
        let Some(obj) = item.as_object_mut() else {
            continue;
        };
        for field in ["vendor", "product"] {
            if !obj.get(field).is_some_and(truthy) {
                obj.insert(field.to_string(), json!("unspecified"));
            }
        }
        if let Some(product) = obj.get("product").and_then(Value::as_str)
            && product.chars().count() > PRODUCT_LIMIT
        {
            let clipped = format!(
                "{}{TRUNCATION_MARKER}",
                clip_chars(product, PRODUCT_LIMIT - TRUNCATION_MARKER.chars().count())
            );
            obj.insert("product".to_string(), json!(clipped));
            notes.add(
                "product_name",
                "product_name too long. Use array of products to recond more than one product.",
                "Truncated!",
            );
        }
        let Some(versions) = obj.get_mut("versions").and_then(Value::as_array_mut) else {
            continue;
        };
        for version in versions {
            let Some(vobj) = version.as_object_mut() else {
                continue;
            };
            // Only the version label itself is clipped; bounds stay intact.
            if let Some(text) = vobj.get("version").and_then(Value::as_str)
                && text.chars().count() > VERSION_LIMIT
            {
                let clipped = format!(
                    "{}{TRUNCATION_MARKER}",
                    clip_chars(text, VERSION_LIMIT - TRUNCATION_MARKER.chars().count())
                );
                vobj.insert("version".to_string(), json!(clipped));
                notes.add(
                    "version_name",
                    "version_name too long. Use array of versions to record more than one version.",
                    "Truncated!",
                );
            }
        }
    }
}

fn negate(status: &str) -> &str {
    match status {
        "affected" => "unaffected",
        "unaffected" => "affected",
        other => other,
    }
}

fn non_empty(entry: Value) -> Value {
    let Value::Object(mut map) = entry else {
        return entry;
    };
    if map.get("version").and_then(Value::as_str) == Some("") {
        map.insert("version".to_string(), json!("unspecified"));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn affects_with(version_data: Value) -> Value {
        json!({
            "vendor": {"vendor_data": [{
                "vendor_name": "Acme",
                "product": {"product_data": [{
                    "product_name": "Widget",
                    "version": {"version_data": version_data}
                }]}
            }]}
        })
    }

    fn run(version_data: Value) -> Vec<Value> {
        let mut notes = ConverterErrors::new();
        convert_affected("CVE-2020-0001", &affects_with(version_data), &mut notes).unwrap()
    }

    #[test]
    fn test_plain_value_is_exact_affected() {
        let out = run(json!([{"version_value": "1.0"}]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["vendor"], "Acme");
        assert_eq!(out[0]["product"], "Widget");
        assert_eq!(
            out[0]["versions"],
            json!([{"version": "1.0", "status": "affected"}])
        );
    }

    #[test]
    fn test_less_than_marker_becomes_bounded_range() {
        let out = run(json!([{"version_affected": "<", "version_value": "2.0"}]));
        assert_eq!(
            out[0]["versions"][0],
            json!({
                "version": "unspecified", "status": "affected",
                "lessThan": "2.0", "versionType": "custom"
            })
        );
    }

    #[test]
    fn test_negated_and_unknown_markers() {
        let out = run(json!([
            {"version_affected": "!", "version_value": "3.0"},
            {"version_affected": "?>=", "version_value": "4.0"}
        ]));
        let versions = out[0]["versions"].as_array().unwrap();
        assert_eq!(versions[0], json!({"version": "3.0", "status": "unaffected"}));
        assert_eq!(
            versions[1],
            json!({
                "version": "4.0", "status": "unknown",
                "lessThan": "unspecified", "versionType": "custom"
            })
        );
    }

    #[test]
    fn test_named_range_accumulates_changes() {
        let out = run(json!([
            {"version_name": "2.x", "version_affected": "<", "version_value": "2.5"},
            {"version_name": "2.x", "version_affected": ">=", "version_value": "2.0"}
        ]));
        let versions = out[0]["versions"].as_array().unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0]["version"], "2.x");
        assert_eq!(versions[0]["lessThan"], "2.5");
        assert_eq!(
            versions[0]["changes"],
            json!([{"at": "2.0", "status": "affected"}])
        );
    }

    #[test]
    fn test_repeated_le_bound_records_bumped_change() {
        let out = run(json!([
            {"version_name": "3.x", "version_affected": "<=", "version_value": "3.9"},
            {"version_name": "3.x", "version_affected": "<=", "version_value": "3.5"}
        ]));
        let versions = out[0]["versions"].as_array().unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0]["lessThanOrEqual"], "3.9");
        assert_eq!(
            versions[0]["changes"],
            json!([{"at": "3.5 +1", "status": "unaffected"}])
        );
    }

    #[test]
    fn test_marker_without_leading_operator_is_exact() {
        let out = run(json!([{"version_affected": "x<", "version_value": "2.0"}]));
        assert_eq!(
            out[0]["versions"],
            json!([{"version": "2.0", "status": "affected"}])
        );
    }

    #[test]
    fn test_named_unrecognized_op_keeps_raw_value() {
        let out = run(json!([
            {"version_name": "4.x", "version_affected": ">", "version_value": ""}
        ]));
        assert_eq!(
            out[0]["versions"][0],
            json!({
                "version": "", "status": "affected",
                "lessThan": "4.x*", "versionType": "custom"
            })
        );
    }

    #[test]
    fn test_named_exact_joins_name_and_value() {
        let out = run(json!([
            {"version_name": "2", "version_value": "2.1"},
            {"version_name": "v9", "version_value": "9.4"}
        ]));
        let versions = out[0]["versions"].as_array().unwrap();
        assert_eq!(versions[0]["version"], "2.1");
        assert_eq!(versions[1]["version"], "v9 9.4");
    }

    #[test]
    fn test_empty_value_uses_placeholder_bounds() {
        let out = run(json!([{"version_affected": "<", "version_value": ""}]));
        assert_eq!(
            out[0]["versions"][0],
            json!({
                "version": "unspecified", "status": "affected",
                "lessThan": "undefined", "versionType": "custom"
            })
        );
    }

    #[test]
    fn test_platform_scoping_splits_products() {
        let out = run(json!([
            {"version_value": "1.0", "platform": "x86"},
            {"version_value": "1.0", "platform": "arm64"}
        ]));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["platforms"], json!(["x86"]));
        assert_eq!(out[1]["platforms"], json!(["arm64"]));
    }

    #[test]
    fn test_duplicate_entries_collapse() {
        let out = run(json!([
            {"version_value": "1.0"},
            {"version_value": "1.0"}
        ]));
        assert_eq!(out[0]["versions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_version_value_is_fatal() {
        let mut notes = ConverterErrors::new();
        let affects = affects_with(json!([{"version_affected": "<"}]));
        let err = convert_affected("CVE-2020-0001", &affects, &mut notes).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("version_value for (Acme - Widget)"), "{text}");
    }

    #[test]
    fn test_empty_version_data_marks_status_unknown() {
        let out = run(json!([]));
        assert_eq!(out[0]["defaultStatus"], "unknown");
        assert!(out[0].get("versions").is_none());
    }

    #[test]
    fn test_oversized_product_name_is_truncated() {
        let mut notes = ConverterErrors::new();
        let affects = json!({
            "vendor": {"vendor_data": [{
                "vendor_name": "Acme",
                "product": {"product_data": [{
                    "product_name": "p".repeat(3000),
                    "version": {"version_data": [{"version_value": "1.0"}]}
                }]}
            }]}
        });
        let out = convert_affected("CVE-2020-0001", &affects, &mut notes).unwrap();
        let product = out[0]["product"].as_str().unwrap();
        assert_eq!(product.chars().count(), 2048);
        assert!(product.ends_with(" ...[truncated*]"));
        assert!(notes.has("product_name"));
    }

    #[test]
    fn test_oversized_version_string_is_truncated() {
        let mut notes = ConverterErrors::new();
        let affects = affects_with(json!([{"version_value": "9".repeat(1100)}]));
        let out = convert_affected("CVE-2020-0001", &affects, &mut notes).unwrap();
        let version = out[0]["versions"][0]["version"].as_str().unwrap();
        assert_eq!(version.chars().count(), 1024);
        assert!(notes.has("version_name"));
    }

    #[test]
    fn test_unusable_vendor_name_is_replaced() {
        let mut notes = ConverterErrors::new();
        let affects = json!({
            "vendor": {"vendor_data": [{
                "vendor_name": "",
                "product": {"product_data": [{
                    "product_name": "Widget",
                    "version": {"version_data": [{"version_value": "1.0"}]}
                }]}
            }]}
        });
        let out = convert_affected("CVE-2020-0001", &affects, &mut notes).unwrap();
        assert_eq!(out[0]["vendor"], "unspecified");
    }
}
