//! CVSS v2.0 parsing and scoring.
//!
//! v2 vectors carry no `CVSS:` prefix and use multi-letter value tokens
//! (`POC`, `OF`, `ND`). `ND` is an explicit token here, not an absent
//! metric, so optional metrics default to it.

use serde_json::{Value, json};

use super::CvssError;

/// Metric keys in canonical vector order with their permitted tokens.
const METRICS: &[(&str, &[&str], bool)] = &[
    ("AV", &["L", "A", "N"], true),
    ("AC", &["H", "M", "L"], true),
    ("Au", &["M", "S", "N"], true),
    ("C", &["N", "P", "C"], true),
    ("I", &["N", "P", "C"], true),
    ("A", &["N", "P", "C"], true),
    ("E", &["U", "POC", "F", "H", "ND"], false),
    ("RL", &["OF", "TF", "W", "U", "ND"], false),
    ("RC", &["UC", "UR", "C", "ND"], false),
    ("CDP", &["N", "L", "LM", "MH", "H", "ND"], false),
    ("TD", &["N", "L", "M", "H", "ND"], false),
    ("CR", &["L", "M", "H", "ND"], false),
    ("IR", &["L", "M", "H", "ND"], false),
    ("AR", &["L", "M", "H", "ND"], false),
];

#[derive(Debug, Clone)]
pub struct CvssV2 {
    av: &'static str,
    ac: &'static str,
    au: &'static str,
    c: &'static str,
    i: &'static str,
    a: &'static str,
    e: &'static str,
    rl: &'static str,
    rc: &'static str,
    cdp: &'static str,
    td: &'static str,
    cr: &'static str,
    ir: &'static str,
    ar: &'static str,
}

impl CvssV2 {
    /// Parses an unprefixed vector such as `AV:N/AC:L/Au:N/C:C/I:C/A:C`.
    pub fn parse(vector: &str) -> Result<Self, CvssError> {
        let mut seen: Vec<(&'static str, &'static str)> = Vec::new();
        for segment in vector.split('/') {
            let (key, value) = segment.split_once(':').ok_or_else(|| {
                CvssError::Malformed(format!("segment '{segment}' is not KEY:VALUE"))
            })?;
            let (key, allowed, _) = METRICS
                .iter()
                .find(|(k, _, _)| *k == key)
                .ok_or_else(|| CvssError::UnknownMetric(key.to_string()))?;
            let token = allowed.iter().find(|t| **t == value).ok_or_else(|| {
                CvssError::InvalidValue {
                    metric: key.to_string(),
                    value: value.to_string(),
                }
            })?;
            if seen.iter().any(|(k, _)| k == key) {
                return Err(CvssError::DuplicateMetric(key.to_string()));
            }
            seen.push((key, token));
        }
        for (key, _, mandatory) in METRICS {
            if *mandatory && !seen.iter().any(|(k, _)| k == key) {
                return Err(CvssError::MissingMandatory(key));
            }
        }

        let get = |key: &str| {
            seen.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, token)| *token)
                .unwrap_or("ND")
        };
        Ok(Self {
            av: get("AV"),
            ac: get("AC"),
            au: get("Au"),
            c: get("C"),
            i: get("I"),
            a: get("A"),
            e: get("E"),
            rl: get("RL"),
            rc: get("RC"),
            cdp: get("CDP"),
            td: get("TD"),
            cr: get("CR"),
            ir: get("IR"),
            ar: get("AR"),
        })
    }

    /// Canonical vector with `ND` metrics omitted.
    pub fn vector_string(&self) -> String {
        let mut out = format!(
            "AV:{}/AC:{}/Au:{}/C:{}/I:{}/A:{}",
            self.av, self.ac, self.au, self.c, self.i, self.a
        );
        let optional = [
            ("E", self.e),
            ("RL", self.rl),
            ("RC", self.rc),
            ("CDP", self.cdp),
            ("TD", self.td),
            ("CR", self.cr),
            ("IR", self.ir),
            ("AR", self.ar),
        ];
        for (key, token) in optional {
            if token != "ND" {
                out.push('/');
                out.push_str(key);
                out.push(':');
                out.push_str(token);
            }
        }
        out
    }

    pub fn base_score(&self) -> f64 {
        base_from_impact(self.impact(), self.exploitability())
    }

    pub fn temporal_score(&self) -> f64 {
        round1(self.base_score() * e_weight(self.e) * rl_weight(self.rl) * rc_weight(self.rc))
    }

    pub fn environmental_score(&self) -> f64 {
        let adjusted_impact = f64::min(
            10.0,
            10.41
                * (1.0
                    - (1.0 - cia_weight(self.c) * req_weight(self.cr))
                        * (1.0 - cia_weight(self.i) * req_weight(self.ir))
                        * (1.0 - cia_weight(self.a) * req_weight(self.ar))),
        );
        let adjusted_base = base_from_impact(adjusted_impact, self.exploitability());
        let adjusted_temporal =
            round1(adjusted_base * e_weight(self.e) * rl_weight(self.rl) * rc_weight(self.rc));
        round1(
            (adjusted_temporal + (10.0 - adjusted_temporal) * cdp_weight(self.cdp))
                * td_weight(self.td),
        )
    }

    /// Official JSON metric object with computed scores. Temporal and
    /// environmental fields are always present, backfilled with
    /// `NOT_DEFINED`; callers strip groups the vector never defined.
    /// v2 has no qualitative severity, so no severity fields appear.
    pub fn as_json(&self) -> Value {
        json!({
            "version": "2.0",
            "vectorString": self.vector_string(),
            "accessVector": av_name(self.av),
            "accessComplexity": ac_name(self.ac),
            "authentication": au_name(self.au),
            "confidentialityImpact": cia_name(self.c),
            "integrityImpact": cia_name(self.i),
            "availabilityImpact": cia_name(self.a),
            "baseScore": self.base_score(),
            "exploitability": e_name(self.e),
            "remediationLevel": rl_name(self.rl),
            "reportConfidence": rc_name(self.rc),
            "temporalScore": self.temporal_score(),
            "collateralDamagePotential": cdp_name(self.cdp),
            "targetDistribution": td_name(self.td),
            "confidentialityRequirement": req_name(self.cr),
            "integrityRequirement": req_name(self.ir),
            "availabilityRequirement": req_name(self.ar),
            "environmentalScore": self.environmental_score(),
        })
    }

    fn impact(&self) -> f64 {
        10.41
            * (1.0
                - (1.0 - cia_weight(self.c))
                    * (1.0 - cia_weight(self.i))
                    * (1.0 - cia_weight(self.a)))
    }

    fn exploitability(&self) -> f64 {
        20.0 * av_weight(self.av) * ac_weight(self.ac) * au_weight(self.au)
    }
}

fn base_from_impact(impact: f64, exploitability: f64) -> f64 {
    let f = if impact == 0.0 { 0.0 } else { 1.176 };
    round1((0.6 * impact + 0.4 * exploitability - 1.5) * f)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

fn av_weight(v: &str) -> f64 {
    match v {
        "L" => 0.395,
        "A" => 0.646,
        _ => 1.0,
    }
}

fn av_name(v: &str) -> &'static str {
    match v {
        "L" => "LOCAL",
        "A" => "ADJACENT_NETWORK",
        _ => "NETWORK",
    }
}

fn ac_weight(v: &str) -> f64 {
    match v {
        "H" => 0.35,
        "M" => 0.61,
        _ => 0.71,
    }
}

fn ac_name(v: &str) -> &'static str {
    match v {
        "H" => "HIGH",
        "M" => "MEDIUM",
        _ => "LOW",
    }
}

fn au_weight(v: &str) -> f64 {
    match v {
        "M" => 0.45,
        "S" => 0.56,
        _ => 0.704,
    }
}

fn au_name(v: &str) -> &'static str {
    match v {
        "M" => "MULTIPLE",
        "S" => "SINGLE",
        _ => "NONE",
    }
}

fn cia_weight(v: &str) -> f64 {
    match v {
        "P" => 0.275,
        "C" => 0.660,
        _ => 0.0,
    }
}

fn cia_name(v: &str) -> &'static str {
    match v {
        "P" => "PARTIAL",
        "C" => "COMPLETE",
        _ => "NONE",
    }
}

fn e_weight(v: &str) -> f64 {
    match v {
        "U" => 0.85,
        "POC" => 0.9,
        "F" => 0.95,
        _ => 1.0,
    }
}

fn e_name(v: &str) -> &'static str {
    match v {
        "U" => "UNPROVEN",
        "POC" => "PROOF_OF_CONCEPT",
        "F" => "FUNCTIONAL",
        "H" => "HIGH",
        _ => "NOT_DEFINED",
    }
}

fn rl_weight(v: &str) -> f64 {
    match v {
        "OF" => 0.87,
        "TF" => 0.90,
        "W" => 0.95,
        _ => 1.0,
    }
}

fn rl_name(v: &str) -> &'static str {
    match v {
        "OF" => "OFFICIAL_FIX",
        "TF" => "TEMPORARY_FIX",
        "W" => "WORKAROUND",
        "U" => "UNAVAILABLE",
        _ => "NOT_DEFINED",
    }
}

fn rc_weight(v: &str) -> f64 {
    match v {
        "UC" => 0.90,
        "UR" => 0.95,
        _ => 1.0,
    }
}

fn rc_name(v: &str) -> &'static str {
    match v {
        "UC" => "UNCONFIRMED",
        "UR" => "UNCORROBORATED",
        "C" => "CONFIRMED",
        _ => "NOT_DEFINED",
    }
}

fn cdp_weight(v: &str) -> f64 {
    match v {
        "L" => 0.1,
        "LM" => 0.3,
        "MH" => 0.4,
        "H" => 0.5,
        _ => 0.0,
    }
}

fn cdp_name(v: &str) -> &'static str {
    match v {
        "N" => "NONE",
        "L" => "LOW",
        "LM" => "LOW_MEDIUM",
        "MH" => "MEDIUM_HIGH",
        "H" => "HIGH",
        _ => "NOT_DEFINED",
    }
}

fn td_weight(v: &str) -> f64 {
    match v {
        "N" => 0.0,
        "L" => 0.25,
        "M" => 0.75,
        _ => 1.0,
    }
}

fn td_name(v: &str) -> &'static str {
    match v {
        "N" => "NONE",
        "L" => "LOW",
        "M" => "MEDIUM",
        "H" => "HIGH",
        _ => "NOT_DEFINED",
    }
}

fn req_weight(v: &str) -> f64 {
    match v {
        "L" => 0.5,
        "H" => 1.51,
        _ => 1.0,
    }
}

fn req_name(v: &str) -> &'static str {
    match v {
        "L" => "LOW",
        "M" => "MEDIUM",
        "H" => "HIGH",
        _ => "NOT_DEFINED",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_score_complete_impact() {
        let cvss = CvssV2::parse("AV:N/AC:L/Au:N/C:C/I:C/A:C").expect("vector parses");
        assert_eq!(cvss.base_score(), 10.0);
    }

    #[test]
    fn test_base_score_partial_impact() {
        let cvss = CvssV2::parse("AV:N/AC:L/Au:N/C:P/I:P/A:P").expect("vector parses");
        assert_eq!(cvss.base_score(), 7.5);
    }

    #[test]
    fn test_temporal_score() {
        let cvss = CvssV2::parse("AV:N/AC:L/Au:N/C:C/I:C/A:C/E:F/RL:OF/RC:C")
            .expect("vector parses");
        assert_eq!(cvss.temporal_score(), 8.3);
    }

    #[test]
    fn test_environmental_score() {
        let cvss = CvssV2::parse("AV:N/AC:L/Au:N/C:P/I:P/A:P/CDP:H/TD:H")
            .expect("vector parses");
        assert_eq!(cvss.environmental_score(), 8.8);
    }

    #[test]
    fn test_as_json_has_no_severity_fields() {
        let cvss = CvssV2::parse("AV:L/AC:M/Au:S/C:P/I:N/A:N").expect("vector parses");
        let json = cvss.as_json();
        assert_eq!(json["version"], "2.0");
        assert_eq!(json["accessVector"], "LOCAL");
        assert_eq!(json["authentication"], "SINGLE");
        assert_eq!(json["exploitability"], "NOT_DEFINED");
        assert!(json.get("baseSeverity").is_none());
        assert_eq!(json["vectorString"], "AV:L/AC:M/Au:S/C:P/I:N/A:N");
    }

    #[test]
    fn test_rejects_malformed_vectors() {
        assert!(CvssV2::parse("AV:N/AC:L/Au:N/C:C/I:C").is_err());
        assert!(CvssV2::parse("AV:N/AC:L/Au:N/C:C/I:C/A:C/").is_err());
        assert!(CvssV2::parse("AV:N/AV:N/AC:L/Au:N/C:C/I:C/A:C").is_err());
        assert!(CvssV2::parse("AV:X/AC:L/Au:N/C:C/I:C/A:C").is_err());
        assert!(CvssV2::parse("CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H").is_err());
    }
}
