//! Record-fatal conversion errors.
//!
//! A `ConvertError` aborts one input record and is reported against its
//! file; the batch keeps going. Recoverable upstream defects (bad CVSS
//! vectors, broken dates) never surface here, they are written into the
//! record as `x_ConverterErrors` annotations instead.

use crate::service::IdrError;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// The v4 record lacks a property the v5 record cannot be built
    /// without, or carries one in an unusable shape.
    #[error("{cve_id} -- v4 record is missing required property: {property}{detail}")]
    MissingRequiredProperty {
        cve_id: String,
        property: String,
        detail: String,
    },

    /// The v4 record carries a property or value the converter does not
    /// recognize and cannot safely pass through.
    #[error("{cve_id} -- v4 record has unexpected property: {property}{detail}")]
    UnexpectedProperty {
        cve_id: String,
        property: String,
        detail: String,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("identity service error: {0}")]
    Identity(#[from] IdrError),
}

impl ConvertError {
    pub fn missing(cve_id: impl Into<String>, property: impl Into<String>) -> Self {
        Self::MissingRequiredProperty {
            cve_id: cve_id.into(),
            property: property.into(),
            detail: String::new(),
        }
    }

    pub fn missing_detail(
        cve_id: impl Into<String>,
        property: impl Into<String>,
        detail: impl std::fmt::Display,
    ) -> Self {
        Self::MissingRequiredProperty {
            cve_id: cve_id.into(),
            property: property.into(),
            detail: format!(" ({detail})"),
        }
    }

    pub fn unexpected(cve_id: impl Into<String>, property: impl Into<String>) -> Self {
        Self::UnexpectedProperty {
            cve_id: cve_id.into(),
            property: property.into(),
            detail: String::new(),
        }
    }

    pub fn unexpected_detail(
        cve_id: impl Into<String>,
        property: impl Into<String>,
        detail: impl std::fmt::Display,
    ) -> Self {
        Self::UnexpectedProperty {
            cve_id: cve_id.into(),
            property: property.into(),
            detail: format!(" ({detail})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_strings_name_the_record() {
        let err = ConvertError::missing("CVE-2020-0001", "CVE_data_meta no STATE");
        assert_eq!(
            err.to_string(),
            "CVE-2020-0001 -- v4 record is missing required property: CVE_data_meta no STATE"
        );

        let err = ConvertError::unexpected_detail("CVE-2020-0002", "STATE", "FROZEN");
        assert_eq!(
            err.to_string(),
            "CVE-2020-0002 -- v4 record has unexpected property: STATE (FROZEN)"
        );
    }
}
