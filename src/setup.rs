//! Project scaffolding for a fresh warehouse directory.

use chrono::NaiveDate;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::info;

use crate::config::WarehouseConfig;
use crate::error::{IoContext, Result};
use crate::paths::{ensure_dir, partition_dir};

const GITIGNORE: &str = "\
# DuckDB database files
*.duckdb
*.duckdb.wal

# Rust
/target/

# Data files
data/raw/**/*.parquet
data/raw/**/*.csv
data/staging/*.parquet
data/warehouse/*.parquet
backups/*.parquet

# Logs
logs/*.log

# IDE / OS
.vscode/
.idea/
.DS_Store
Thumbs.db
";

fn readme(created: NaiveDate) -> String {
    format!(
        "# RRHH Data Warehouse

Case-history extracts stored as Hive-partitioned Parquet and queried with DuckDB.

## Layout

```
data/
  raw/case_history/year=YYYY/month=MM/day=DD/case_history_YYYYMMDD.parquet
  staging/
  warehouse/
sql/queries/
backups/
logs/
dwh.duckdb
```

## Usage

```bash
rrhh-dwh load extract.csv --date 2025-02-11
rrhh-dwh summary
rrhh-dwh query
rrhh-dwh check
```

Created on: {}
",
        created.format("%Y-%m-%d")
    )
}

/// What [`scaffold`] created. Paths that already existed are not listed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScaffoldReport {
    pub directories: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
}

/// Create the warehouse folder tree under `root`, including today's raw
/// partition directory, plus `.gitignore` and `README.md` when absent.
/// Safe to run repeatedly.
pub fn scaffold(root: &Path, config: &WarehouseConfig, today: NaiveDate) -> Result<ScaffoldReport> {
    let mut report = ScaffoldReport::default();

    let dirs = [
        root.join(&config.staging_path),
        root.join(&config.warehouse_path),
        partition_dir(&root.join(&config.raw_data_path), &today),
        root.join("sql").join("queries"),
        root.join(&config.backup_path),
        root.join("logs"),
    ];
    for dir in dirs {
        let existed = dir.is_dir();
        ensure_dir(&dir)?;
        if !existed {
            info!(path = %dir.display(), "created directory");
            report.directories.push(dir);
        }
    }

    let files = [
        (root.join(".gitignore"), GITIGNORE.to_string()),
        (root.join("README.md"), readme(today)),
    ];
    for (path, contents) in files {
        if path.exists() {
            continue;
        }
        fs::write(&path, contents).io_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "created file");
        report.files.push(path);
    }

    Ok(report)
}
