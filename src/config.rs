// src/config.rs

use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::{IoContext, Result};

/// Embedded database file.
pub const DB_PATH: &str = "dwh.duckdb";
/// Root of the Hive-partitioned raw layer.
pub const RAW_DATA_PATH: &str = "data/raw/case_history";
pub const STAGING_PATH: &str = "data/staging";
pub const WAREHOUSE_PATH: &str = "data/warehouse";
pub const BACKUP_PATH: &str = "backups";

pub const DEFAULT_MEMORY_LIMIT: &str = "4GB";
pub const DEFAULT_THREADS: usize = 4;

/// Prefix of every partition file: `case_history_YYYYMMDD.parquet`.
pub const FILE_PREFIX: &str = "case_history";
/// Column counted distinctly by the partition statistics query.
pub const DEFAULT_ID_COLUMN: &str = "CASE_ID";

/// Settings the database adapter is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbConfig {
    pub path: PathBuf,
    /// Passed verbatim to the engine, e.g. `4GB`.
    pub memory_limit: String,
    pub threads: usize,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn with_memory_limit(mut self, limit: impl Into<String>) -> Self {
        self.memory_limit = limit.into();
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DB_PATH),
            memory_limit: DEFAULT_MEMORY_LIMIT.to_string(),
            threads: DEFAULT_THREADS,
        }
    }
}

/// Process-wide warehouse settings. Every field falls back to the constants
/// above, so an empty YAML document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WarehouseConfig {
    pub db_path: PathBuf,
    pub raw_data_path: PathBuf,
    pub staging_path: PathBuf,
    pub warehouse_path: PathBuf,
    pub backup_path: PathBuf,
    pub memory_limit: String,
    pub threads: usize,
    pub id_column: String,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DB_PATH),
            raw_data_path: PathBuf::from(RAW_DATA_PATH),
            staging_path: PathBuf::from(STAGING_PATH),
            warehouse_path: PathBuf::from(WAREHOUSE_PATH),
            backup_path: PathBuf::from(BACKUP_PATH),
            memory_limit: DEFAULT_MEMORY_LIMIT.to_string(),
            threads: DEFAULT_THREADS,
            id_column: DEFAULT_ID_COLUMN.to_string(),
        }
    }
}

impl WarehouseConfig {
    /// Read a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .io_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            path: self.db_path.clone(),
            memory_limit: self.memory_limit.clone(),
            threads: self.threads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let cfg = WarehouseConfig::default();
        assert_eq!(cfg.db_path, PathBuf::from("dwh.duckdb"));
        assert_eq!(cfg.raw_data_path, PathBuf::from("data/raw/case_history"));
        assert_eq!(cfg.db_config(), DbConfig::default());
        assert_eq!(DbConfig::default().memory_limit, "4GB");
        assert_eq!(DbConfig::default().threads, 4);
    }

    #[test]
    fn partial_yaml_keeps_defaults() {
        let cfg = WarehouseConfig::from_yaml_str("threads: 8\nmemory_limit: 1GB\n").unwrap();
        assert_eq!(cfg.threads, 8);
        assert_eq!(cfg.memory_limit, "1GB");
        assert_eq!(cfg.id_column, DEFAULT_ID_COLUMN);
        assert_eq!(cfg.backup_path, PathBuf::from(BACKUP_PATH));
    }

    #[test]
    fn empty_yaml_is_default() {
        assert_eq!(
            WarehouseConfig::from_yaml_str("  \n").unwrap(),
            WarehouseConfig::default()
        );
    }

    #[test]
    fn yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dwh.yaml");
        fs::write(&path, "raw_data_path: /srv/raw\nid_column: TICKET\n").unwrap();
        let cfg = WarehouseConfig::from_yaml_file(&path).unwrap();
        assert_eq!(cfg.raw_data_path, PathBuf::from("/srv/raw"));
        assert_eq!(cfg.id_column, "TICKET");
    }

    #[test]
    fn bad_yaml_is_config_error() {
        let err = WarehouseConfig::from_yaml_str("threads: [not, a, number]").unwrap_err();
        assert!(matches!(err, crate::WarehouseError::Config(_)));
    }
}
