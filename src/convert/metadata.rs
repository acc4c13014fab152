//! Record metadata resolution
//!
//! Builds the v5 `cveMetadata` envelope block: lifecycle state, the
//! owning CNA resolved through the IDR service, and the derived date
//! fields. Dates favor what the record itself declares, fall back to
//! the record history export, and only then to the current day.

use serde_json::{Map, Value, json};

use crate::error::ConvertError;
use crate::model::RecordState;
use crate::model::legacy::{LegacyRecord, truthy};
use crate::service::{HistoryIndex, IdrClient};

use super::{ConverterErrors, dates, string_form};

/// Everything downstream assembly needs to know about a record's
/// identity.
#[derive(Debug)]
pub struct ResolvedMetadata {
    pub cve_id: String,
    pub state: RecordState,
    pub assigner_org_id: String,
    pub assigner_short_name: String,
    pub cve_metadata: Value,
}

/// Placeholder when the owning CNA cannot be resolved.
const UNRESOLVED: &str = "Not found";

pub async fn resolve(
    input_name: &str,
    legacy: &LegacyRecord,
    history: &HistoryIndex,
    idr: &mut IdrClient,
    notes: &mut ConverterErrors,
) -> Result<ResolvedMetadata, ConvertError> {
    let state_label = legacy
        .meta_value("STATE")
        .map(string_form)
        .ok_or_else(|| ConvertError::missing(input_name, "CVE_data_meta no STATE"))?;
    let cve_id = legacy
        .meta_value("ID")
        .map(string_form)
        .ok_or_else(|| ConvertError::missing(input_name, "CVE_data_meta ID"))?;
    let state = RecordState::from_v4(&state_label)
        .ok_or_else(|| ConvertError::unexpected_detail(&cve_id, "STATE", &state_label))?;

    let mut assigner_org_id = UNRESOLVED.to_string();
    let mut assigner_short_name = UNRESOLVED.to_string();
    if state != RecordState::Reserved {
        let record = idr.lookup(&cve_id).await.map_err(|error| {
            ConvertError::missing_detail(input_name, "CVE_data_meta structure error", error)
        })?;
        let owning = record
            .get("owning_cna")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                ConvertError::missing_detail(
                    input_name,
                    "CVE_data_meta structure error",
                    format!("ERROR - no CNA for record ID - {cve_id}"),
                )
            })?;
        assigner_org_id = owning;
        if let Some(short_name) = idr.org_short_name(&assigner_org_id).await? {
            assigner_short_name = short_name;
        }
    }

    let mut metadata = Map::new();
    metadata.insert("assignerOrgId".to_string(), json!(assigner_org_id));
    metadata.insert(
        "assignerShortName".to_string(),
        json!(assigner_short_name),
    );
    metadata.insert("cveId".to_string(), json!(cve_id));
    metadata.insert("state".to_string(), json!(state.as_str()));

    let date_updated = history
        .last_updated(&cve_id)
        .unwrap_or_else(dates::today_midnight)
        .to_string();
    metadata.insert("dateUpdated".to_string(), json!(date_updated));

    if let Some(reserved) = reserved_date(&cve_id, legacy, history, notes) {
        metadata.insert("dateReserved".to_string(), json!(reserved));
    }

    if let Some(published) = published_date(&cve_id, state, legacy, history, notes) {
        metadata.insert("datePublished".to_string(), json!(published));
    }

    match state {
        RecordState::Rejected => {
            let rejected = history
                .first_rejected(&cve_id)
                .map(|dt| dates::iso_seconds(dates::midnight_of(dt)))
                .unwrap_or_else(|| dates::iso_seconds(dates::today_midnight()));
            metadata.insert("dateRejected".to_string(), json!(rejected));

            if let Some(replaced) = legacy.meta_value("REPLACED_BY").and_then(Value::as_str)
                && !replaced.is_empty()
            {
                let ids: Vec<Value> = replaced.split(',').map(|id| json!(id)).collect();
                metadata.insert("replacedBy".to_string(), Value::Array(ids));
            }
        }
        RecordState::Published | RecordState::Reserved => {}
    }

    Ok(ResolvedMetadata {
        cve_id,
        state,
        assigner_org_id,
        assigner_short_name,
        cve_metadata: Value::Object(metadata),
    })
}

/// `dateReserved` comes from the record's own `DATE_REQUESTED` when it
/// parses, otherwise from the history export's reservation date.
fn reserved_date(
    cve_id: &str,
    legacy: &LegacyRecord,
    history: &HistoryIndex,
    notes: &mut ConverterErrors,
) -> Option<String> {
    if let Some(raw) = legacy.meta_value("DATE_REQUESTED")
        && truthy(raw)
    {
        let text = string_form(raw);
        return match dates::midnight_iso(&text) {
            Some(iso) => Some(iso),
            None => {
                notes.add("DATE_REQUESTED", "v4 DATE_REQUESTED is invalid", &text);
                None
            }
        };
    }
    let reserved = history
        .first_reserved(cve_id)
        .unwrap_or_else(dates::now_naive);
    Some(dates::iso_seconds(dates::midnight_of(reserved)))
}

/// `datePublished` favors the declared `DATE_PUBLIC` whatever the
/// state; only published records fall back to history, and that
/// fallback keeps its full timestamp since that is when the record
/// actually went out.
fn published_date(
    cve_id: &str,
    state: RecordState,
    legacy: &LegacyRecord,
    history: &HistoryIndex,
    notes: &mut ConverterErrors,
) -> Option<String> {
    if let Some(raw) = legacy.meta_value("DATE_PUBLIC")
        && truthy(raw)
    {
        let text = string_form(raw);
        return match dates::midnight_iso(&text) {
            Some(iso) => Some(iso),
            None => {
                notes.add("DATE_PUBLIC", "v4 DATE_PUBLIC is invalid", &text);
                None
            }
        };
    }
    if state != RecordState::Published {
        return None;
    }
    Some(
        history
            .first_populated(cve_id)
            .unwrap_or_else(dates::now_naive)
            .to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_with_meta(meta: Value) -> LegacyRecord {
        LegacyRecord::new(json!({"CVE_data_meta": meta}))
    }

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

    #[tokio::test]
    async fn test_published_record_resolves_owning_cna() {
        let legacy = legacy_with_meta(json!({
            "ID": "CVE-2020-0001",
            "STATE": "PUBLIC",
            "DATE_PUBLIC": "2020-03-01T16:00:00Z"
        }));
        let mut idr = seeded_idr();
        let mut notes = ConverterErrors::new();
        let resolved = resolve(
            "input.json",
            &legacy,
            &HistoryIndex::empty(),
            &mut idr,
            &mut notes,
        )
        .await
        .unwrap();

        assert_eq!(resolved.state, RecordState::Published);
        assert_eq!(resolved.assigner_org_id, "org-uuid-1");
        assert_eq!(resolved.assigner_short_name, "acme");
        assert_eq!(resolved.cve_metadata["state"], "PUBLISHED");
        assert_eq!(resolved.cve_metadata["datePublished"], "2020-03-01T00:00:00");
        assert!(resolved.cve_metadata.get("dateReserved").is_some());
        assert!(resolved.cve_metadata.get("dateUpdated").is_some());
    }

    #[tokio::test]
    async fn test_reserved_record_skips_idr() {
        let legacy = legacy_with_meta(json!({
            "ID": "CVE-2020-0002",
            "STATE": "RESERVED",
            "DATE_REQUESTED": "2020-01-15"
        }));
        // CVE-2020-0002 is not seeded: a lookup would fail.
        let mut idr = seeded_idr();
        let mut notes = ConverterErrors::new();
        let resolved = resolve(
            "input.json",
            &legacy,
            &HistoryIndex::empty(),
            &mut idr,
            &mut notes,
        )
        .await
        .unwrap();

        assert_eq!(resolved.assigner_org_id, "Not found");
        assert_eq!(resolved.cve_metadata["state"], "RESERVED");
        assert_eq!(resolved.cve_metadata["dateReserved"], "2020-01-15T00:00:00");
        assert!(resolved.cve_metadata.get("datePublished").is_none());
    }

    #[tokio::test]
    async fn test_date_public_carries_over_outside_published() {
        let legacy = legacy_with_meta(json!({
            "ID": "CVE-2020-0001",
            "STATE": "REJECT",
            "DATE_PUBLIC": "2019-06-02"
        }));
        let mut idr = seeded_idr();
        let mut notes = ConverterErrors::new();
        let resolved = resolve(
            "input.json",
            &legacy,
            &HistoryIndex::empty(),
            &mut idr,
            &mut notes,
        )
        .await
        .unwrap();

        assert_eq!(resolved.cve_metadata["datePublished"], "2019-06-02T00:00:00");
    }

    #[tokio::test]
    async fn test_invalid_date_requested_leaves_note() {
        let legacy = legacy_with_meta(json!({
            "ID": "CVE-2020-0002",
            "STATE": "RESERVED",
            "DATE_REQUESTED": "sometime in 2020"
        }));
        let mut idr = seeded_idr();
        let mut notes = ConverterErrors::new();
        let resolved = resolve(
            "input.json",
            &legacy,
            &HistoryIndex::empty(),
            &mut idr,
            &mut notes,
        )
        .await
        .unwrap();

        assert!(notes.has("DATE_REQUESTED"));
        assert!(resolved.cve_metadata.get("dateReserved").is_none());
    }

    #[tokio::test]
    async fn test_rejected_record_splits_replaced_by() {
        let legacy = legacy_with_meta(json!({
            "ID": "CVE-2020-0001",
            "STATE": "REJECT",
            "REPLACED_BY": "CVE-2020-0003,CVE-2020-0004"
        }));
        let mut idr = seeded_idr();
        let mut notes = ConverterErrors::new();
        let resolved = resolve(
            "input.json",
            &legacy,
            &HistoryIndex::empty(),
            &mut idr,
            &mut notes,
        )
        .await
        .unwrap();

        assert_eq!(resolved.cve_metadata["state"], "REJECTED");
        assert_eq!(
            resolved.cve_metadata["replacedBy"],
            json!(["CVE-2020-0003", "CVE-2020-0004"])
        );
        assert!(resolved.cve_metadata.get("dateRejected").is_some());
    }

    #[tokio::test]
    async fn test_unknown_state_is_fatal() {
        let legacy = legacy_with_meta(json!({"ID": "CVE-2020-0001", "STATE": "PENDING"}));
        let mut idr = seeded_idr();
        let mut notes = ConverterErrors::new();
        let err = resolve(
            "input.json",
            &legacy,
            &HistoryIndex::empty(),
            &mut idr,
            &mut notes,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("STATE"));
    }

    #[tokio::test]
    async fn test_missing_state_is_fatal() {
        let legacy = legacy_with_meta(json!({"ID": "CVE-2020-0001"}));
        let mut idr = seeded_idr();
        let mut notes = ConverterErrors::new();
        let err = resolve(
            "input.json",
            &legacy,
            &HistoryIndex::empty(),
            &mut idr,
            &mut notes,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("CVE_data_meta no STATE"));
    }
}
