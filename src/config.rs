use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Result;

/// Trainer settings. Any field left out of a config file keeps its default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON array of drills
    pub drills_path: PathBuf,
    /// Log file backing the answer store
    pub store_path: PathBuf,
    pub total_days: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            drills_path: PathBuf::from("data/drills.json"),
            store_path: PathBuf::from("sql_learn_app.db"),
            total_days: 17,
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::Config;
    use crate::error::Result;

    #[test]
    fn test_partial_config_keeps_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sqldrill.json");
        std::fs::write(&path, r#"{"store_path": "/tmp/answers.db", "total_days": 30}"#)?;

        let config = Config::load(&path)?;
        assert_eq!(config.store_path, PathBuf::from("/tmp/answers.db"));
        assert_eq!(config.total_days, 30);
        assert_eq!(config.drills_path, Config::default().drills_path);
        Ok(())
    }

    #[test]
    fn test_missing_config_is_an_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(Config::load(dir.path().join("nope.json")).is_err());
        Ok(())
    }
}
