//! Repository configuration stored at `.dgit/config.json`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::storage::write_atomic;

const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Branch created by `init` and checked out initially.
    pub default_branch: String,
    /// Message of the root commit created by `init`.
    pub initial_message: String,
    /// Digest prefix length used when printing merge parents.
    pub abbrev_len: usize,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            default_branch: "master".to_string(),
            initial_message: "initial commit".to_string(),
            abbrev_len: 7,
        }
    }
}

impl RepoConfig {
    /// Load config from a metadata directory. A missing file means defaults.
    pub fn load(meta_dir: &Path) -> Result<Self> {
        let config_path = meta_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let data = fs::read_to_string(&config_path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, meta_dir: &Path) -> Result<()> {
        let data = serde_json::to_string_pretty(self)?;
        write_atomic(&meta_dir.join(CONFIG_FILE), data.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(RepoConfig::load(tmp.path()).unwrap(), RepoConfig::default());
    }

    #[test]
    fn test_roundtrip_and_partial_file() {
        let tmp = TempDir::new().unwrap();
        let config = RepoConfig {
            default_branch: "main".into(),
            ..RepoConfig::default()
        };
        config.save(tmp.path()).unwrap();
        assert_eq!(RepoConfig::load(tmp.path()).unwrap(), config);

        fs::write(tmp.path().join(CONFIG_FILE), r#"{"abbrev_len": 12}"#).unwrap();
        let loaded = RepoConfig::load(tmp.path()).unwrap();
        assert_eq!(loaded.abbrev_len, 12);
        assert_eq!(loaded.default_branch, "master");
    }
}
