//! Reference tag map
//!
//! Maps v4 `refsource` names onto v5 reference tags. The map ships as
//! a JSON file of `{v4, v5: [...]}` entries; lookups are
//! case-insensitive and take the first matching entry.

use std::path::Path;

use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum TagMapError {
    #[error("failed to read tag map: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse tag map: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RawTagMap {
    #[serde(rename = "referenceMaps")]
    reference_maps: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    v4: String,
    #[serde(default)]
    v5: Vec<String>,
}

pub struct TagMap {
    entries: Vec<(String, Vec<String>)>,
}

impl TagMap {
    pub fn load(path: &Path) -> Result<Self, TagMapError> {
        let text = std::fs::read_to_string(path)?;
        let raw: RawTagMap = serde_json::from_str(&text)?;
        let entries = raw
            .reference_maps
            .into_iter()
            .map(|entry| (entry.v4, entry.v5))
            .collect::<Vec<_>>();
        tracing::info!(entries = entries.len(), "Loaded reference tag map");
        Ok(Self { entries })
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn from_entries(entries: Vec<(String, Vec<String>)>) -> Self {
        Self { entries }
    }

    /// v5 tags for a v4 refsource. `Some` with an empty slice means the
    /// refsource is known but maps to no tags; `None` means unmapped.
    pub fn tags_for(&self, refsource: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(v4, _)| v4.eq_ignore_ascii_case(refsource))
            .map(|(_, v5)| v5.as_slice())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
