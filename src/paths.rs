//! Hive-style partition paths for the raw layer.
//!
//! Layout: `<base>/year=YYYY/month=MM/day=DD/case_history_YYYYMMDD.parquet`

use chrono::{Datelike, NaiveDate};
use glob::{glob, Pattern};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use crate::config::FILE_PREFIX;
use crate::error::{IoContext, Result};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// The (year, month, day) triple a partition is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl PartitionKey {
    pub fn from_date<D: Datelike>(date: &D) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
            day: date.day(),
        }
    }

    /// `year=2025/month=02/day=11`, always zero-padded.
    pub fn relative_dir(&self) -> PathBuf {
        PathBuf::from(format!("year={}", self.year))
            .join(format!("month={:02}", self.month))
            .join(format!("day={:02}", self.day))
    }

    /// `case_history_20250211.parquet`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{:04}{:02}{:02}.parquet",
            FILE_PREFIX, self.year, self.month, self.day
        )
    }
}

/// Partition directory for `date` under `base`.
pub fn partition_dir<D: Datelike>(base: &Path, date: &D) -> PathBuf {
    base.join(PartitionKey::from_date(date).relative_dir())
}

/// Full partition file path for `date` under `base`.
pub fn partition_file<D: Datelike>(base: &Path, date: &D) -> PathBuf {
    let key = PartitionKey::from_date(date);
    base.join(key.relative_dir()).join(key.file_name())
}

/// Create `path` (and parents) if missing and hand it back.
pub fn ensure_dir(path: &Path) -> Result<PathBuf> {
    fs::create_dir_all(path).io_context(|| format!("creating directory {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// Every `*.parquet` below `base`, sorted by path. Because partition
/// directories are zero-padded this is also chronological.
pub fn list_partition_files(base: &Path) -> Result<Vec<PathBuf>> {
    let pattern = format!(
        "{}/**/*.parquet",
        Pattern::escape(&base.to_string_lossy())
    );
    let mut files: Vec<PathBuf> = glob(&pattern)?
        .filter_map(|entry| entry.ok())
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    debug!(base = %base.display(), count = files.len(), "listed partition files");
    Ok(files)
}

/// Partition files for each day in `[start, end]`, probing the expected
/// path day by day. Days without a file are skipped.
pub fn list_partition_files_in_range(
    base: &Path,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<PathBuf> {
    start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| partition_file(base, &day))
        .filter(|path| path.exists())
        .collect()
}

/// Most recently modified partition file, if any.
pub fn latest_partition_file(base: &Path) -> Result<Option<PathBuf>> {
    let latest = list_partition_files(base)?
        .into_iter()
        .filter_map(|p| {
            let modified = fs::metadata(&p).and_then(|m| m.modified()).ok()?;
            Some((modified, p))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, p)| p);
    Ok(latest)
}

/// Size in MiB; zero when the file does not exist.
pub fn file_size_mb(path: &Path) -> f64 {
    match fs::metadata(path) {
        Ok(meta) => meta.len() as f64 / BYTES_PER_MB,
        Err(_) => 0.0,
    }
}

/// Partition values recovered from `key=value` path segments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionValues {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

/// Scan the components of `path` for `year=`, `month=` and `day=`.
/// A missing or unparsable segment leaves that field unset.
pub fn partition_values(path: &Path) -> PartitionValues {
    let mut values = PartitionValues::default();
    for part in path.iter().filter_map(|c| c.to_str()) {
        if let Some(v) = part.strip_prefix("year=") {
            values.year = v.parse().ok();
        } else if let Some(v) = part.strip_prefix("month=") {
            values.month = v.parse().ok();
        } else if let Some(v) = part.strip_prefix("day=") {
            values.day = v.parse().ok();
        }
    }
    values
}
