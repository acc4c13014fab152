//! CVE record history index
//!
//! Loads the record dates snapshot (one history event per entry, JSON
//! array) and answers the date queries the metadata resolver needs:
//! first reservation, first population, last modification, first
//! rejection. Snapshot fields hold the literal string `"null"` where a
//! date is absent.

use std::collections::HashMap;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::convert::dates;

const HTYPE_MODIFIED: &str = "Modified";
const HTYPE_REJECTED: &str = "Rejected";

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("failed to read history snapshot: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse history snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    cve_identifier: String,
    #[serde(rename = "HType")]
    htype: Option<String>,
    history_date: Option<Value>,
    populated_date: Option<Value>,
    reserved_date: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct HistoryEvent {
    pub htype: String,
    pub history_date: Option<NaiveDateTime>,
    pub populated_date: Option<NaiveDateTime>,
    pub reserved_date: Option<NaiveDateTime>,
}

/// History events grouped by CVE ID.
pub struct HistoryIndex {
    events: HashMap<String, Vec<HistoryEvent>>,
}

impl HistoryIndex {
    pub fn load(path: &Path) -> Result<Self, HistoryError> {
        let text = std::fs::read_to_string(path)?;
        let raw: Vec<RawEvent> = serde_json::from_str(&text)?;

        let mut events: HashMap<String, Vec<HistoryEvent>> = HashMap::new();
        for entry in raw {
            let event = HistoryEvent {
                htype: entry.htype.unwrap_or_default(),
                history_date: parse_field(&entry.history_date, dates::parse_history_timestamp),
                populated_date: parse_field(&entry.populated_date, dates::parse_history_timestamp),
                reserved_date: parse_field(&entry.reserved_date, dates::parse_reserved_date),
            };
            events.entry(entry.cve_identifier).or_default().push(event);
        }
        tracing::info!(records = events.len(), "Loaded record history index");
        Ok(Self { events })
    }

    pub fn empty() -> Self {
        Self {
            events: HashMap::new(),
        }
    }

    /// Earliest date the record was populated with content.
    pub fn first_populated(&self, cve_id: &str) -> Option<NaiveDateTime> {
        self.dates_of(cve_id, |e| e.populated_date).min()
    }

    /// Earliest date the ID was reserved.
    pub fn first_reserved(&self, cve_id: &str) -> Option<NaiveDateTime> {
        self.dates_of(cve_id, |e| e.reserved_date).min()
    }

    /// Latest modification or rejection event.
    pub fn last_updated(&self, cve_id: &str) -> Option<NaiveDateTime> {
        self.events
            .get(cve_id)
            .into_iter()
            .flatten()
            .filter(|e| e.htype == HTYPE_MODIFIED || e.htype == HTYPE_REJECTED)
            .filter_map(|e| e.history_date)
            .max()
    }

    /// Earliest rejection event, or the earliest modification when the
    /// snapshot never recorded an explicit rejection.
    pub fn first_rejected(&self, cve_id: &str) -> Option<NaiveDateTime> {
        let earliest_of = |htype: &str| {
            self.events
                .get(cve_id)
                .into_iter()
                .flatten()
                .filter(|e| e.htype == htype)
                .filter_map(|e| e.history_date)
                .min()
        };
        earliest_of(HTYPE_REJECTED).or_else(|| earliest_of(HTYPE_MODIFIED))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn dates_of<'a>(
        &'a self,
        cve_id: &str,
        field: fn(&HistoryEvent) -> Option<NaiveDateTime>,
    ) -> impl Iterator<Item = NaiveDateTime> + 'a {
        self.events
            .get(cve_id)
            .into_iter()
            .flatten()
            .filter_map(field)
    }
}

/// Snapshot date fields arrive as JSON strings, with `"null"` (and
/// occasionally JSON null) standing in for absent.
fn parse_field(
    value: &Option<Value>,
    parse: fn(&str) -> Option<NaiveDateTime>,
) -> Option<NaiveDateTime> {
    let text = value.as_ref()?.as_str()?;
    if text.is_empty() || text == "null" {
        return None;
    }
    parse(text)
}
