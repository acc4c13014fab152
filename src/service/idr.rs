//! CVE IDR (ID Reservation) service client
//!
//! Resolves reserved CVE IDs to their owning CNA and the CNA org
//! directory. Lookups are served from a local cache first; the cache is
//! bulk-seeded from a downloaded ID snapshot and falls back to live
//! requests with a bounded wait-and-retry loop when the service is
//! down or rate limiting.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tokio::time::Instant;

use crate::model::IdrSettings;

#[derive(Debug, thiserror::Error)]
pub enum IdrError {
    #[error("no usable IDR record for {0}")]
    RecordUnavailable(String),

    #[error("IDR Error: {0}")]
    Service(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Client for the CVE IDR service.
///
/// Holds per-run state: the record cache, the lazily fetched org
/// directory, and the total time spent waiting on the service.
pub struct IdrClient {
    client: Client,
    settings: IdrSettings,
    records: HashMap<String, Value>,
    orgs: Option<HashMap<String, Value>>,
    waited: Duration,
}

impl IdrClient {
    pub fn new(settings: IdrSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
            records: HashMap::new(),
            orgs: None,
            waited: Duration::ZERO,
        }
    }

    /// Seeds the record cache from a bulk ID snapshot: one JSON object
    /// per line, keyed by `cve_id`. Returns how many records loaded.
    /// Unparseable lines are skipped; a missing snapshot is not fatal,
    /// lookups just go to the live service instead.
    pub fn preload_records(&mut self, path: &Path) -> std::io::Result<usize> {
        let text = std::fs::read_to_string(path)?;
        let mut loaded = 0usize;
        let mut skipped = 0usize;
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(line) {
                Ok(record) => {
                    if let Some(id) = record.get("cve_id").and_then(Value::as_str) {
                        self.records.insert(id.to_string(), record.clone());
                        loaded += 1;
                    } else {
                        skipped += 1;
                    }
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::warn!(path = %path.display(), skipped, "Skipped unusable lines in ID snapshot");
        }
        tracing::info!(path = %path.display(), loaded, "Seeded IDR record cache");
        Ok(loaded)
    }

    /// Inserts a single record into the cache.
    pub fn seed_record(&mut self, cve_id: impl Into<String>, record: Value) {
        self.records.insert(cve_id.into(), record);
    }

    /// Seeds the org directory, keyed by `UUID`, so short-name lookups
    /// never touch the live service.
    pub fn seed_orgs(&mut self, entries: Vec<Value>) {
        let orgs = self.orgs.get_or_insert_with(HashMap::new);
        for org in entries {
            if let Some(uuid) = org.get("UUID").and_then(Value::as_str) {
                orgs.insert(uuid.to_string(), org.clone());
            }
        }
    }

    /// Total time this run spent sleeping on IDR retries.
    pub fn waited(&self) -> Duration {
        self.waited
    }

    /// Fetches the IDR record for a CVE ID, cache first. A cache miss
    /// goes to the live service; failures wait out a fixed delay
    /// (checking service health for the log) and retry, up to the
    /// configured attempt limit.
    pub async fn lookup(&mut self, cve_id: &str) -> Result<Value, IdrError> {
        if let Some(hit) = self.records.get(cve_id) {
            return Ok(hit.clone());
        }

        let attempts = self.settings.fetch_attempts.max(1);
        let mut last_error = IdrError::RecordUnavailable(cve_id.to_string());
        for attempt in 1..=attempts {
            match self.fetch_record(cve_id).await {
                Ok(record) => {
                    self.records.insert(cve_id.to_string(), record.clone());
                    return Ok(record);
                }
                Err(error) => {
                    if attempt == attempts {
                        return Err(error);
                    }
                    tracing::warn!(
                        cve_id = %cve_id,
                        attempt,
                        error = %error,
                        "IDR fetch failed, waiting before retry"
                    );
                    last_error = error;
                    let started = Instant::now();
                    tokio::time::sleep(Duration::from_secs(self.settings.retry_delay_secs)).await;
                    self.waited += started.elapsed();
                    if !self.healthy().await {
                        tracing::warn!(attempt, "IDR service still unhealthy");
                    }
                }
            }
        }
        Err(last_error)
    }

    /// Resolves a CNA org UUID to its registered short name. The org
    /// directory is fetched once per run on first use.
    pub async fn org_short_name(&mut self, org_uuid: &str) -> Result<Option<String>, IdrError> {
        if self.orgs.is_none() {
            self.orgs = Some(self.fetch_orgs().await?);
        }
        let short_name = self
            .orgs
            .as_ref()
            .and_then(|orgs| orgs.get(org_uuid))
            .and_then(|org| org.get("short_name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(short_name)
    }

    /// Whether the service health endpoint answers with success.
    pub async fn healthy(&self) -> bool {
        let url = format!("{}{}", self.settings.base_url, self.settings.health_path);
        match self.request(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(error) => {
                tracing::debug!(error = %error, "IDR health check failed");
                false
            }
        }
    }

    async fn fetch_record(&self, cve_id: &str) -> Result<Value, IdrError> {
        let url = format!("{}/cve-id/{}", self.settings.base_url, cve_id);
        tracing::debug!(cve_id = %cve_id, url = %url, "Fetching IDR record");

        let response = self.request(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status == StatusCode::OK || status == StatusCode::PARTIAL_CONTENT {
            if body.trim_start().starts_with('{') {
                serde_json::from_str(&body)
                    .map_err(|e| IdrError::ParseError(format!("IDR record for {cve_id}: {e}")))
            } else {
                Err(IdrError::RecordUnavailable(cve_id.to_string()))
            }
        } else {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| format!("unexpected status {status}"));
            Err(IdrError::Service(message))
        }
    }

    async fn fetch_orgs(&self) -> Result<HashMap<String, Value>, IdrError> {
        let url = format!("{}/org", self.settings.base_url);
        tracing::debug!(url = %url, "Fetching CNA org directory");

        let response = self.request(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(IdrError::Service(format!(
                "org directory fetch failed with {status}: {body}"
            )));
        }

        let listing: Value = response
            .json()
            .await
            .map_err(|e| IdrError::ParseError(format!("org directory: {e}")))?;
        let mut orgs = HashMap::new();
        if let Some(entries) = listing.get("organizations").and_then(Value::as_array) {
            for org in entries {
                if let Some(uuid) = org.get("UUID").and_then(Value::as_str) {
                    orgs.insert(uuid.to_string(), org.clone());
                }
            }
        }
        tracing::info!(orgs = orgs.len(), "Loaded CNA org directory");
        Ok(orgs)
    }

    fn request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .header("CVE-API-KEY", &self.settings.api_key)
            .header("CVE-API-ORG", &self.settings.api_org)
            .header("CVE-API-USER", &self.settings.api_user)
    }
}
