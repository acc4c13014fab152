use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const ENV_CONFIG_PATH: &str = "CVE4TO5_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "cve4to5.yaml";

const ENV_IDR_BASE_URL: &str = "CVE_SERVICES_URL";
const ENV_IDR_API_KEY: &str = "CVE_API_KEY";
const ENV_IDR_API_ORG: &str = "CVE_API_ORG";
const ENV_IDR_API_USER: &str = "CVE_API_USER";

/// Locations of the support files a run loads at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    /// Record history snapshot (reserved/populated/modified dates).
    pub record_dates: PathBuf,
    /// Bulk IDR ID snapshot, one JSON object per line.
    pub id_snapshot: PathBuf,
    /// v4 refsource to v5 tag map.
    pub ref_tag_map: PathBuf,
    /// Legacy CNA user CSV.
    pub user_map: PathBuf,
    /// v5 record schema applied to every written record.
    pub schema: PathBuf,
    /// Stricter schema applied to published records.
    pub published_schema: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            record_dates: PathBuf::from("cve_record_dates.json"),
            id_snapshot: PathBuf::from("cve_ids.json"),
            ref_tag_map: PathBuf::from("ref_tag_map.json"),
            user_map: PathBuf::from("user_map.csv"),
            schema: PathBuf::from("schema/v5_schema.json"),
            published_schema: PathBuf::from("schema/v5_published_schema.json"),
        }
    }
}

/// IDR service endpoint and credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IdrSettings {
    pub base_url: String,
    pub health_path: String,
    pub api_key: String,
    pub api_org: String,
    pub api_user: String,
    /// Live lookup attempts before a record is given up on.
    pub fetch_attempts: u32,
    /// Fixed wait between attempts while the service recovers.
    pub retry_delay_secs: u64,
}

impl Default for IdrSettings {
    fn default() -> Self {
        Self {
            base_url: "https://cveawg.mitre.org/api".to_string(),
            health_path: "/health-check".to_string(),
            api_key: String::new(),
            api_org: String::new(),
            api_user: String::new(),
            fetch_attempts: 14,
            retry_delay_secs: 300,
        }
    }
}

/// YAML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub paths: DataPaths,
    #[serde(default)]
    pub idr: IdrSettings,
}

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub paths: DataPaths,
    pub idr: IdrSettings,
}

impl Config {
    /// Load configuration from environment and config file. Environment
    /// variables override the file for the IDR endpoint and credentials.
    pub fn from_env() -> Self {
        let config_path =
            std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let file = Self::load_config_file(&config_path).unwrap_or_default();
        let mut idr = file.idr;
        if let Ok(base_url) = std::env::var(ENV_IDR_BASE_URL) {
            idr.base_url = base_url;
        }
        if let Ok(api_key) = std::env::var(ENV_IDR_API_KEY) {
            idr.api_key = api_key;
        }
        if let Ok(api_org) = std::env::var(ENV_IDR_API_ORG) {
            idr.api_org = api_org;
        }
        if let Ok(api_user) = std::env::var(ENV_IDR_API_USER) {
            idr.api_user = api_user;
        }

        Self {
            paths: file.paths,
            idr,
        }
    }

    /// Load configuration from YAML file
    fn load_config_file(path: &str) -> Option<ConfigFile> {
        let path = Path::new(path);

        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => {
                // Handle empty file
                let contents = contents.trim();
                if contents.is_empty() {
                    tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
                    return Some(ConfigFile::default());
                }

                match serde_yaml::from_str(contents) {
                    Ok(config) => {
                        tracing::info!(path = %path.display(), "Loaded configuration from file");
                        Some(config)
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                        None
                    }
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                None
            }
        }
    }
}
