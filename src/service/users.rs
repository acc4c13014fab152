//! Legacy CNA user map
//!
//! Loads the user CSV snapshot: the first column keys each row, the
//! remaining columns ride along verbatim. Only the self-test dump
//! surfaces this data.

use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum UserMapError {
    #[error("failed to read user map: {0}")]
    Csv(#[from] csv::Error),
}

pub struct UserMap {
    users: BTreeMap<String, Vec<String>>,
}

impl UserMap {
    pub fn load(path: &Path) -> Result<Self, UserMapError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path)?;

        let mut users = BTreeMap::new();
        for result in reader.records() {
            let record = result?;
            let mut fields = record.iter();
            if let Some(key) = fields.next()
                && !key.is_empty()
            {
                users.insert(key.to_string(), fields.map(str::to_string).collect());
            }
        }
        tracing::info!(users = users.len(), "Loaded legacy user map");
        Ok(Self { users })
    }

    pub fn empty() -> Self {
        Self {
            users: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.users.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_keyed_by_first_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("user_map.csv");
        std::fs::write(
            &path,
            "jdoe,Jane Doe,example-cna\nasmith,Aaron Smith,other-cna,extra\n,skipped row\n",
        )
        .unwrap();

        let users = UserMap::load(&path).unwrap();
        assert_eq!(users.len(), 2);
        let (first_key, first_row) = users.iter().next().unwrap();
        assert_eq!(first_key, "asmith");
        assert_eq!(first_row.len(), 3);
    }
}
