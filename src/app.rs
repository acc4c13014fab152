//! Application state and batch driver
//!
//! Centralizes loading of the shared datasets (history index, reference
//! tag map, user map, schemas) and the identity-service client, and
//! drives single-file and directory conversions while accumulating the
//! end-of-run report.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde_json::{Value, json};

use crate::convert::{self, Conversion};
use crate::error::ConvertError;
use crate::model::{Config, RecordState};
use crate::model::record;
use crate::service::{HistoryIndex, IdrClient, RecordValidator, TagMap, UserMap};

/// Application state: shared datasets, the identity-service client, and
/// the running report.
pub struct AppState {
    pub history: HistoryIndex,
    pub tag_map: TagMap,
    pub user_map: UserMap,
    pub idr: IdrClient,
    pub general_validator: RecordValidator,
    pub published_validator: RecordValidator,
    pub report: RunReport,
}

impl AppState {
    /// Load every shared dataset and compile the schema validators.
    /// A missing ID snapshot only costs live lookups; everything else
    /// is required.
    pub fn new(config: Config) -> Result<Self, AppError> {
        let history = HistoryIndex::load(&config.paths.record_dates)
            .map_err(|e| AppError::HistoryInit(e.to_string()))?;
        let tag_map = TagMap::load(&config.paths.ref_tag_map)
            .map_err(|e| AppError::TagMapInit(e.to_string()))?;
        let user_map = UserMap::load(&config.paths.user_map)
            .map_err(|e| AppError::UserMapInit(e.to_string()))?;
        let general_validator = RecordValidator::from_file(&config.paths.schema)
            .map_err(|e| AppError::SchemaInit(e.to_string()))?;
        let published_validator = RecordValidator::from_file(&config.paths.published_schema)
            .map_err(|e| AppError::SchemaInit(e.to_string()))?;

        let mut idr = IdrClient::new(config.idr.clone());
        if config.paths.id_snapshot.exists() {
            if let Err(error) = idr.preload_records(&config.paths.id_snapshot) {
                tracing::warn!(error = %error, "Could not preload the ID snapshot");
            }
        } else {
            tracing::warn!(
                path = %config.paths.id_snapshot.display(),
                "ID snapshot not found, lookups go to the live service"
            );
        }

        Ok(Self {
            history,
            tag_map,
            user_map,
            idr,
            general_validator,
            published_validator,
            report: RunReport::default(),
        })
    }

    /// Convert one v4 file and write `<cveId>.json` under `output_dir`.
    /// Validation findings are embedded in the output and tracked in
    /// the report; the file is written either way.
    pub async fn convert_file(
        &mut self,
        input: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf, ConvertError> {
        let text = std::fs::read_to_string(input)?;
        let source: Value = serde_json::from_str(&text)?;
        let input_name = input
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("input")
            .to_string();

        let conversion = convert::convert_record(
            &input_name,
            source,
            &self.history,
            &self.tag_map,
            &mut self.idr,
        )
        .await?;
        let mut document = conversion.document.clone();

        // Reserved records carry no content container, so there is
        // nothing for the schema to check.
        let findings = match conversion.state {
            RecordState::Published => self.published_validator.findings(&document),
            RecordState::Rejected => self.general_validator.findings(&document),
            RecordState::Reserved => Vec::new(),
        };
        if !findings.is_empty() {
            if let Some(cna) = document
                .get_mut("containers")
                .and_then(|c| c.get_mut("cna"))
                .and_then(Value::as_object_mut)
            {
                cna.insert("x_ValidationErrors".to_string(), json!(findings));
            }
            self.report
                .validation_failures
                .insert(conversion.cve_id.clone(), findings);
        }
        self.report.absorb(&conversion);

        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(format!("{}.json", conversion.cve_id));
        std::fs::write(&path, record::to_pretty_string(&document)?)?;
        tracing::debug!(file = %path.display(), "Wrote converted record");
        Ok(path)
    }

    /// Convert every `.json` file under `input_dir`, mirroring its
    /// directory layout under `output_dir`. Per-file failures are
    /// recorded and the batch keeps going.
    pub async fn run_batch(&mut self, input_dir: &Path, output_dir: &Path) {
        let started = Instant::now();
        let mut inputs: Vec<PathBuf> = walkdir::WalkDir::new(input_dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
            })
            .collect();
        inputs.sort();
        tracing::info!(files = inputs.len(), dir = %input_dir.display(), "Starting batch conversion");

        for input in &inputs {
            self.report.files_seen += 1;
            let target_dir = match input.parent().and_then(|p| p.strip_prefix(input_dir).ok()) {
                Some(relative) if !relative.as_os_str().is_empty() => output_dir.join(relative),
                _ => output_dir.to_path_buf(),
            };
            if let Err(error) = self.convert_file(input, &target_dir).await {
                tracing::error!(file = %input.display(), error = %error, "Conversion failed");
                self.report
                    .problem_files
                    .insert(input.display().to_string(), error.to_string());
            }
            if self.report.files_seen % 10 == 0 {
                tracing::info!(
                    processed = self.report.files_seen,
                    elapsed = ?started.elapsed(),
                    "Batch progress"
                );
            }
        }

        self.report.processing = started.elapsed();
        self.report.idr_wait = self.idr.waited();
    }

    /// Connectivity and dataset sanity check.
    pub async fn self_test(&self) {
        println!("History events loaded: {}", self.history.len());
        println!("Reference tag map entries: {}", self.tag_map.len());
        println!("User map entries: {}", self.user_map.len());
        if self.idr.healthy().await {
            println!("Identity service: reachable");
        } else {
            println!("Identity service: NOT reachable");
        }
    }
}

/// End-of-run tallies, printed after a batch.
#[derive(Debug, Default)]
pub struct RunReport {
    pub files_seen: usize,
    /// Input path -> error for records that aborted.
    pub problem_files: BTreeMap<String, String>,
    /// CVE ID -> schema findings for records that converted but do not
    /// validate.
    pub validation_failures: BTreeMap<String, Vec<String>>,
    /// One `{cveId: message}` entry per CVSS repair failure.
    pub cvss_errors: Vec<Value>,
    /// state -> unclaimed top-level key -> record IDs.
    pub extra_keys: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    /// Tally of impact payloads declaring an unknown CVSS version.
    pub invalid_impact_versions: BTreeMap<String, u64>,
    /// CVE ID -> content payloads that fell through to `other`.
    pub scoring_other: BTreeMap<String, Vec<Value>>,
    /// v5 lifecycle states encountered during the run.
    pub states_seen: BTreeSet<&'static str>,
    /// Records that carry converter notes.
    pub flagged: BTreeSet<String>,
    pub max_title: usize,
    pub processing: Duration,
    pub idr_wait: Duration,
}

impl RunReport {
    fn absorb(&mut self, conversion: &Conversion) {
        self.states_seen.insert(conversion.state.as_str());
        if !conversion.notes.is_empty() {
            self.flagged.insert(conversion.cve_id.clone());
        }
        if let Some(message) = conversion.notes.message("impact_cvss") {
            self.cvss_errors
                .push(json!({conversion.cve_id.clone(): message}));
        }
        for key in &conversion.leftover_keys {
            self.extra_keys
                .entry(conversion.state.as_str().to_string())
                .or_default()
                .entry(key.clone())
                .or_default()
                .push(conversion.cve_id.clone());
        }
        for tag in &conversion.invalid_impact_versions {
            *self.invalid_impact_versions.entry(tag.clone()).or_insert(0) += 1;
        }
        if !conversion.scoring_other.is_empty() {
            self.scoring_other
                .insert(conversion.cve_id.clone(), conversion.scoring_other.clone());
        }
        if conversion.title_length > self.max_title {
            self.max_title = conversion.title_length;
        }
    }

    pub fn converted(&self) -> usize {
        self.files_seen.saturating_sub(self.problem_files.len())
    }

    pub fn print(&self) {
        println!();
        println!("UP CONVERT JOB REPORT");
        println!(
            "Processing time was: {:.2} seconds",
            self.processing.as_secs_f64()
        );
        println!(
            "Time waited for IDR info: {:.2} seconds",
            self.idr_wait.as_secs_f64()
        );
        println!();
        println!(
            "{} upconverter records failed to validate",
            self.validation_failures.len()
        );
        println!("{} records carry converter notes", self.flagged.len());
        println!("Title: max={}", self.max_title);
        println!();
        if self.problem_files.is_empty() {
            println!("{} JSON files converted.", self.files_seen);
        } else {
            println!(
                "JSON files that failed to convert: {} of {}",
                self.problem_files.len(),
                self.files_seen
            );
        }
        println!();
        println!("cvss errors encountered: {}", self.cvss_errors.len());
        if !self.extra_keys.is_empty() {
            println!();
            println!("Extra keys encountered");
            for (state, keys) in &self.extra_keys {
                println!("{state}");
                for (key, records) in keys {
                    println!("     {key} - used in {} records.", records.len());
                }
            }
        }
        println!();
        println!("Saw v4 STATEs");
        for state in &self.states_seen {
            println!("{state}");
        }
        println!();
        println!(
            "Unsupported IMPACT version values found --- {}",
            self.invalid_impact_versions.len()
        );
        for (tag, count) in &self.invalid_impact_versions {
            println!(" --- {tag} : {count}");
        }
        if !self.scoring_other.is_empty() {
            println!(
                "IMPACT scoring data remapped into 'other' --- {}",
                self.scoring_other.len()
            );
        }
        println!();
        println!("----- DETAILED RESULTS -----");
        println!();
        if self.problem_files.is_empty() {
            println!("No JSON files failed to convert.");
        } else {
            println!(
                "JSON files that failed to convert ({}):",
                self.problem_files.len()
            );
            for (file, error) in &self.problem_files {
                println!("{file}");
                println!("     {error}");
            }
        }
        if !self.validation_failures.is_empty() {
            println!();
            println!(
                "records with validation errors encountered: {}",
                self.validation_failures.len()
            );
            for (cve_id, findings) in &self.validation_failures {
                println!("{cve_id}");
                for finding in findings {
                    println!("     {finding}");
                }
            }
        }
        println!();
        println!("Done");
    }
}

/// Application-level errors
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AppError {
    #[error("Failed to load the record history dataset: {0}")]
    HistoryInit(String),

    #[error("Failed to load the reference tag map: {0}")]
    TagMapInit(String),

    #[error("Failed to load the user map: {0}")]
    UserMapInit(String),

    #[error("Failed to compile a record schema: {0}")]
    SchemaInit(String),
}
