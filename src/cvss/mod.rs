//! CVSS vector parsing and scoring.
//!
//! Implements the v2.0 and v3.x (3.0/3.1) metric systems end to end:
//! strict vector parsing, the standard score equations, and emission of
//! the official JSON metric objects (`attackVector: "NETWORK"`,
//! `NOT_DEFINED` defaults, computed base/temporal/environmental scores).
//! The emitted object always carries every group; the metric repair
//! pass prunes the groups the source vector never defined.

pub mod v2;
pub mod v3;

pub use v2::CvssV2;
pub use v3::CvssV3;

/// Vector parsing failures. These are always recoverable at the record
/// level: a bad vector drops the metric entry, never the record.
#[derive(Debug, thiserror::Error)]
pub enum CvssError {
    #[error("malformed vector: {0}")]
    Malformed(String),

    #[error("unknown metric '{0}'")]
    UnknownMetric(String),

    #[error("duplicate metric '{0}'")]
    DuplicateMetric(String),

    #[error("invalid value '{value}' for metric '{metric}'")]
    InvalidValue { metric: String, value: String },

    #[error("mandatory metric '{0}' not given")]
    MissingMandatory(&'static str),
}

/// Qualitative severity rating for a v3.x score.
pub fn severity_v3(score: f64) -> &'static str {
    if score <= 0.0 {
        "NONE"
    } else if score < 4.0 {
        "LOW"
    } else if score < 7.0 {
        "MEDIUM"
    } else if score < 9.0 {
        "HIGH"
    } else {
        "CRITICAL"
    }
}
