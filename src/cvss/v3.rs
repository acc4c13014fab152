//! CVSS v3.0 / v3.1 parsing and scoring.
//!
//! The two minor versions share metrics and weights; they differ in the
//! rounding function and in one environmental sub-formula, so a single
//! type carries the minor version and branches where 3.0 and 3.1 diverge.

use serde_json::{Value, json};

use super::{CvssError, severity_v3};

/// Metric keys in canonical vector order with their permitted value
/// letters. Optional metrics admit `X` (not defined).
const METRICS: &[(&str, &str, bool)] = &[
    ("AV", "NALP", true),
    ("AC", "LH", true),
    ("PR", "NLH", true),
    ("UI", "NR", true),
    ("S", "UC", true),
    ("C", "HLN", true),
    ("I", "HLN", true),
    ("A", "HLN", true),
    ("E", "XHFPU", false),
    ("RL", "XUWTO", false),
    ("RC", "XCRU", false),
    ("CR", "XHML", false),
    ("IR", "XHML", false),
    ("AR", "XHML", false),
    ("MAV", "XNALP", false),
    ("MAC", "XLH", false),
    ("MPR", "XNLH", false),
    ("MUI", "XNR", false),
    ("MS", "XUC", false),
    ("MC", "XHLN", false),
    ("MI", "XHLN", false),
    ("MA", "XHLN", false),
];

/// A parsed v3.x vector. Optional metrics default to `X`.
#[derive(Debug, Clone)]
pub struct CvssV3 {
    minor: u8,
    av: char,
    ac: char,
    pr: char,
    ui: char,
    s: char,
    c: char,
    i: char,
    a: char,
    e: char,
    rl: char,
    rc: char,
    cr: char,
    ir: char,
    ar: char,
    mav: char,
    mac: char,
    mpr: char,
    mui: char,
    ms: char,
    mc: char,
    mi: char,
    ma: char,
}

impl CvssV3 {
    /// Parses a full prefixed vector such as
    /// `CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H`.
    pub fn parse(vector: &str) -> Result<Self, CvssError> {
        let (minor, rest) = if let Some(rest) = vector.strip_prefix("CVSS:3.0/") {
            (0, rest)
        } else if let Some(rest) = vector.strip_prefix("CVSS:3.1/") {
            (1, rest)
        } else {
            return Err(CvssError::Malformed(format!(
                "vector '{vector}' lacks a CVSS:3.x prefix"
            )));
        };

        let mut seen: Vec<(&'static str, char)> = Vec::new();
        for segment in rest.split('/') {
            let (key, value) = segment.split_once(':').ok_or_else(|| {
                CvssError::Malformed(format!("segment '{segment}' is not KEY:VALUE"))
            })?;
            let (key, allowed, _) = METRICS
                .iter()
                .find(|(k, _, _)| *k == key)
                .ok_or_else(|| CvssError::UnknownMetric(key.to_string()))?;
            let mut chars = value.chars();
            let letter = match (chars.next(), chars.next()) {
                (Some(letter), None) => letter,
                _ => {
                    return Err(CvssError::InvalidValue {
                        metric: key.to_string(),
                        value: value.to_string(),
                    });
                }
            };
            if !allowed.contains(letter) {
                return Err(CvssError::InvalidValue {
                    metric: key.to_string(),
                    value: value.to_string(),
                });
            }
            if seen.iter().any(|(k, _)| k == key) {
                return Err(CvssError::DuplicateMetric(key.to_string()));
            }
            seen.push((key, letter));
        }
        for (key, _, mandatory) in METRICS {
            if *mandatory && !seen.iter().any(|(k, _)| k == key) {
                return Err(CvssError::MissingMandatory(key));
            }
        }

        let get = |key: &str, default: char| {
            seen.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, letter)| *letter)
                .unwrap_or(default)
        };
        Ok(Self {
            minor,
            av: get("AV", 'X'),
            ac: get("AC", 'X'),
            pr: get("PR", 'X'),
            ui: get("UI", 'X'),
            s: get("S", 'X'),
            c: get("C", 'X'),
            i: get("I", 'X'),
            a: get("A", 'X'),
            e: get("E", 'X'),
            rl: get("RL", 'X'),
            rc: get("RC", 'X'),
            cr: get("CR", 'X'),
            ir: get("IR", 'X'),
            ar: get("AR", 'X'),
            mav: get("MAV", 'X'),
            mac: get("MAC", 'X'),
            mpr: get("MPR", 'X'),
            mui: get("MUI", 'X'),
            ms: get("MS", 'X'),
            mc: get("MC", 'X'),
            mi: get("MI", 'X'),
            ma: get("MA", 'X'),
        })
    }

    pub fn version(&self) -> &'static str {
        if self.minor == 1 { "3.1" } else { "3.0" }
    }

    /// Canonical vector: base metrics in standard order, then any temporal
    /// and environmental metrics that are defined.
    pub fn vector_string(&self) -> String {
        let mut out = format!(
            "CVSS:{}/AV:{}/AC:{}/PR:{}/UI:{}/S:{}/C:{}/I:{}/A:{}",
            self.version(),
            self.av,
            self.ac,
            self.pr,
            self.ui,
            self.s,
            self.c,
            self.i,
            self.a
        );
        let optional = [
            ("E", self.e),
            ("RL", self.rl),
            ("RC", self.rc),
            ("CR", self.cr),
            ("IR", self.ir),
            ("AR", self.ar),
            ("MAV", self.mav),
            ("MAC", self.mac),
            ("MPR", self.mpr),
            ("MUI", self.mui),
            ("MS", self.ms),
            ("MC", self.mc),
            ("MI", self.mi),
            ("MA", self.ma),
        ];
        for (key, letter) in optional {
            if letter != 'X' {
                out.push('/');
                out.push_str(key);
                out.push(':');
                out.push(letter);
            }
        }
        out
    }

    pub fn base_score(&self) -> f64 {
        let iss = 1.0
            - (1.0 - cia_weight(self.c)) * (1.0 - cia_weight(self.i)) * (1.0 - cia_weight(self.a));
        let changed = self.s == 'C';
        let impact = if changed {
            7.52 * (iss - 0.029) - 3.25 * (iss - 0.02).powi(15)
        } else {
            6.42 * iss
        };
        let exploitability = 8.22
            * av_weight(self.av)
            * ac_weight(self.ac)
            * pr_weight(self.pr, changed)
            * ui_weight(self.ui);
        if impact <= 0.0 {
            return 0.0;
        }
        if changed {
            self.round_up(f64::min(1.08 * (impact + exploitability), 10.0))
        } else {
            self.round_up(f64::min(impact + exploitability, 10.0))
        }
    }

    pub fn temporal_score(&self) -> f64 {
        self.round_up(
            self.base_score() * e_weight(self.e) * rl_weight(self.rl) * rc_weight(self.rc),
        )
    }

    pub fn environmental_score(&self) -> f64 {
        let mav = defined_or(self.mav, self.av);
        let mac = defined_or(self.mac, self.ac);
        let mpr = defined_or(self.mpr, self.pr);
        let mui = defined_or(self.mui, self.ui);
        let ms = defined_or(self.ms, self.s);
        let mc = defined_or(self.mc, self.c);
        let mi = defined_or(self.mi, self.i);
        let ma = defined_or(self.ma, self.a);
        let changed = ms == 'C';

        let miss = f64::min(
            1.0 - (1.0 - req_weight(self.cr) * cia_weight(mc))
                * (1.0 - req_weight(self.ir) * cia_weight(mi))
                * (1.0 - req_weight(self.ar) * cia_weight(ma)),
            0.915,
        );
        let impact = if changed {
            if self.minor == 1 {
                7.52 * (miss - 0.029) - 3.25 * (miss * 0.9731 - 0.02).powi(13)
            } else {
                7.52 * (miss - 0.029) - 3.25 * (miss - 0.02).powi(15)
            }
        } else {
            6.42 * miss
        };
        let exploitability =
            8.22 * av_weight(mav) * ac_weight(mac) * pr_weight(mpr, changed) * ui_weight(mui);
        if impact <= 0.0 {
            return 0.0;
        }
        let combined = if changed {
            f64::min(1.08 * (impact + exploitability), 10.0)
        } else {
            f64::min(impact + exploitability, 10.0)
        };
        self.round_up(
            self.round_up(combined) * e_weight(self.e) * rl_weight(self.rl) * rc_weight(self.rc),
        )
    }

    /// Official JSON metric object with computed scores. Temporal and
    /// environmental fields are always present, backfilled with
    /// `NOT_DEFINED`; callers strip groups the vector never defined.
    pub fn as_json(&self) -> Value {
        let base = self.base_score();
        let temporal = self.temporal_score();
        let environmental = self.environmental_score();
        json!({
            "version": self.version(),
            "vectorString": self.vector_string(),
            "attackVector": av_name(self.av),
            "attackComplexity": ac_name(self.ac),
            "privilegesRequired": pr_name(self.pr),
            "userInteraction": ui_name(self.ui),
            "scope": scope_name(self.s),
            "confidentialityImpact": cia_name(self.c),
            "integrityImpact": cia_name(self.i),
            "availabilityImpact": cia_name(self.a),
            "baseScore": base,
            "baseSeverity": severity_v3(base),
            "exploitCodeMaturity": e_name(self.e),
            "remediationLevel": rl_name(self.rl),
            "reportConfidence": rc_name(self.rc),
            "temporalScore": temporal,
            "temporalSeverity": severity_v3(temporal),
            "confidentialityRequirement": req_name(self.cr),
            "integrityRequirement": req_name(self.ir),
            "availabilityRequirement": req_name(self.ar),
            "modifiedAttackVector": modified(self.mav, av_name),
            "modifiedAttackComplexity": modified(self.mac, ac_name),
            "modifiedPrivilegesRequired": modified(self.mpr, pr_name),
            "modifiedUserInteraction": modified(self.mui, ui_name),
            "modifiedScope": modified(self.ms, scope_name),
            "modifiedConfidentialityImpact": modified(self.mc, cia_name),
            "modifiedIntegrityImpact": modified(self.mi, cia_name),
            "modifiedAvailabilityImpact": modified(self.ma, cia_name),
            "environmentalScore": environmental,
            "environmentalSeverity": severity_v3(environmental),
        })
    }

    /// v3.1 rounds up on an integer representation to dodge floating
    /// point dust; v3.0 is a plain ceiling to one decimal.
    fn round_up(&self, value: f64) -> f64 {
        if self.minor == 1 {
            let scaled = (value * 100_000.0).round() as i64;
            if scaled % 10_000 == 0 {
                scaled as f64 / 100_000.0
            } else {
                ((scaled / 10_000) + 1) as f64 / 10.0
            }
        } else {
            (value * 10.0).ceil() / 10.0
        }
    }
}

fn defined_or(modified: char, base: char) -> char {
    if modified == 'X' { base } else { modified }
}

fn modified(letter: char, name: fn(char) -> &'static str) -> &'static str {
    if letter == 'X' { "NOT_DEFINED" } else { name(letter) }
}

fn av_weight(v: char) -> f64 {
    match v {
        'N' => 0.85,
        'A' => 0.62,
        'L' => 0.55,
        _ => 0.2,
    }
}

fn av_name(v: char) -> &'static str {
    match v {
        'N' => "NETWORK",
        'A' => "ADJACENT_NETWORK",
        'L' => "LOCAL",
        _ => "PHYSICAL",
    }
}

fn ac_weight(v: char) -> f64 {
    match v {
        'L' => 0.77,
        _ => 0.44,
    }
}

fn ac_name(v: char) -> &'static str {
    match v {
        'L' => "LOW",
        _ => "HIGH",
    }
}

fn pr_weight(v: char, scope_changed: bool) -> f64 {
    match v {
        'N' => 0.85,
        'L' => {
            if scope_changed {
                0.68
            } else {
                0.62
            }
        }
        _ => {
            if scope_changed {
                0.5
            } else {
                0.27
            }
        }
    }
}

fn pr_name(v: char) -> &'static str {
    match v {
        'N' => "NONE",
        'L' => "LOW",
        _ => "HIGH",
    }
}

fn ui_weight(v: char) -> f64 {
    match v {
        'N' => 0.85,
        _ => 0.62,
    }
}

fn ui_name(v: char) -> &'static str {
    match v {
        'N' => "NONE",
        _ => "REQUIRED",
    }
}

fn scope_name(v: char) -> &'static str {
    match v {
        'C' => "CHANGED",
        _ => "UNCHANGED",
    }
}

fn cia_weight(v: char) -> f64 {
    match v {
        'H' => 0.56,
        'L' => 0.22,
        _ => 0.0,
    }
}

fn cia_name(v: char) -> &'static str {
    match v {
        'H' => "HIGH",
        'L' => "LOW",
        _ => "NONE",
    }
}

fn e_weight(v: char) -> f64 {
    match v {
        'F' => 0.97,
        'P' => 0.94,
        'U' => 0.91,
        _ => 1.0,
    }
}

fn e_name(v: char) -> &'static str {
    match v {
        'H' => "HIGH",
        'F' => "FUNCTIONAL",
        'P' => "PROOF_OF_CONCEPT",
        'U' => "UNPROVEN",
        _ => "NOT_DEFINED",
    }
}

fn rl_weight(v: char) -> f64 {
    match v {
        'W' => 0.97,
        'T' => 0.96,
        'O' => 0.95,
        _ => 1.0,
    }
}

fn rl_name(v: char) -> &'static str {
    match v {
        'U' => "UNAVAILABLE",
        'W' => "WORKAROUND",
        'T' => "TEMPORARY_FIX",
        'O' => "OFFICIAL_FIX",
        _ => "NOT_DEFINED",
    }
}

fn rc_weight(v: char) -> f64 {
    match v {
        'R' => 0.96,
        'U' => 0.92,
        _ => 1.0,
    }
}

fn rc_name(v: char) -> &'static str {
    match v {
        'C' => "CONFIRMED",
        'R' => "REASONABLE",
        'U' => "UNKNOWN",
        _ => "NOT_DEFINED",
    }
}

fn req_weight(v: char) -> f64 {
    match v {
        'H' => 1.5,
        'L' => 0.5,
        _ => 1.0,
    }
}

fn req_name(v: char) -> &'static str {
    match v {
        'H' => "HIGH",
        'M' => "MEDIUM",
        'L' => "LOW",
        _ => "NOT_DEFINED",
    }
}
