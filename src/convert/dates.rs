//! Lenient date parsing and normalization.
//!
//! Legacy records carry dates in whatever shape the submitting CNA felt
//! like: RFC 3339, bare dates, US-style slashes, month names. Derived
//! fields are normalized to the date at midnight and formatted as
//! second-precision ISO (`2021-05-04T00:00:00`), the form the upconverted
//! corpus carries.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Timestamp layout used by the record-history export.
const HISTORY_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Date layout used by the history export's `reserved_date` field.
const HISTORY_RESERVED_FORMAT: &str = "%Y-%m-%d";

/// Parse a date or datetime string in any of the layouts seen in the v4
/// corpus. Offsets are kept local (the wall-clock date is what matters
/// downstream), not converted to UTC.
pub fn parse_loose(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_local());
    }
    // RFC 3339 variants with compact offsets ("+0000") or none at all.
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(dt.naive_local());
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(dt);
        }
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%B %d, %Y", "%d %B %Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return Some(d.and_time(NaiveTime::MIN));
        }
    }
    None
}

/// The same wall-clock date at 00:00:00.
pub fn midnight_of(dt: NaiveDateTime) -> NaiveDateTime {
    dt.date().and_time(NaiveTime::MIN)
}

/// Second-precision ISO formatting, no offset.
pub fn iso_seconds(dt: NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Parse leniently, then snap to midnight ISO. `None` when unparseable.
pub fn midnight_iso(value: &str) -> Option<String> {
    parse_loose(value).map(|dt| iso_seconds(midnight_of(dt)))
}

pub fn today_midnight() -> NaiveDateTime {
    Utc::now().date_naive().and_time(NaiveTime::MIN)
}

pub fn now_naive() -> NaiveDateTime {
    Utc::now().naive_utc()
}

/// Parse a history event timestamp (`2021-05-04 13:22:01.123456`).
pub fn parse_history_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, HISTORY_DATETIME_FORMAT).ok()
}

/// Parse a history `reserved_date` (`2021-05-04`).
pub fn parse_reserved_date(value: &str) -> Option<NaiveDateTime> {
    NaiveDate::parse_from_str(value, HISTORY_RESERVED_FORMAT)
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_rfc3339() {
        let dt = parse_loose("2019-07-30T14:22:01Z").unwrap();
        assert_eq!(iso_seconds(dt), "2019-07-30T14:22:01");
    }

    #[test]
    fn test_parses_compact_offset() {
        let dt = parse_loose("2020-01-21T16:00:00-0800").unwrap();
        assert_eq!(dt.date().to_string(), "2020-01-21");
    }

    #[test]
    fn test_parses_bare_date_and_slashes() {
        assert!(parse_loose("2019-07-30").is_some());
        assert!(parse_loose("07/30/2019").is_some());
        assert!(parse_loose("July 30, 2019").is_some());
    }

    #[test]
    fn test_parses_space_separated_precision() {
        let dt = parse_loose("2021-05-04 13:22:01.123456").unwrap();
        assert_eq!(dt.to_string(), "2021-05-04 13:22:01.123456");
        assert!(parse_loose("2021-05-04 13:22:01").is_some());
    }

    #[test]
    fn test_rejects_garbage() {
        assert_eq!(parse_loose(""), None);
        assert_eq!(parse_loose("not a date"), None);
        assert_eq!(parse_loose("n/a"), None);
    }

    #[test]
    fn test_midnight_iso_snaps_time() {
        assert_eq!(
            midnight_iso("2019-07-30T14:22:01Z").as_deref(),
            Some("2019-07-30T00:00:00")
        );
        assert_eq!(midnight_iso("bogus"), None);
    }

    #[test]
    fn test_history_formats() {
        assert!(parse_history_timestamp("2021-05-04 13:22:01.123456").is_some());
        assert!(parse_history_timestamp("2021-05-04 13:22:01").is_some());
        assert!(parse_history_timestamp("2021-05-04").is_none());
        assert!(parse_reserved_date("2021-05-04").is_some());
        assert!(parse_reserved_date("null").is_none());
    }
}
