//! Error types shared by the loader, reader and database adapter.

use std::path::PathBuf;
use thiserror::Error;

/// Everything the warehouse library can fail with.
///
/// Engine errors are carried through untouched so callers see exactly what
/// the embedded database reported.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// A source file (CSV, workbook, Parquet) is missing.
    #[error("{kind} file not found: {}", path.display())]
    NotFound { kind: &'static str, path: PathBuf },

    /// `IfExists::Fail` and the target table is already there.
    #[error("Table '{0}' already exists")]
    TableExists(String),

    /// The factory was asked for a backend it does not know.
    #[error("Unsupported database type: {0}")]
    UnsupportedBackend(String),

    #[error("invalid if_exists value '{0}' (expected fail, replace or append)")]
    InvalidIfExists(String),

    /// The loader cannot dispatch on this file extension.
    #[error("Unsupported file type: {0}")]
    UnsupportedSource(String),

    #[error("sheet {0} not found in workbook")]
    SheetNotFound(String),

    /// A result column held NULL or a value of the wrong type.
    #[error("unexpected value in column {column}: {value}")]
    UnexpectedValue { column: &'static str, value: String },

    #[error(transparent)]
    Engine(#[from] duckdb::Error),

    #[error(transparent)]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error(transparent)]
    Excel(#[from] calamine::Error),

    #[error(transparent)]
    Glob(#[from] glob::PatternError),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl WarehouseError {
    pub fn not_found(kind: &'static str, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            kind,
            path: path.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, WarehouseError>;

/// Attach a context string to an `io::Result`, mirroring `anyhow::Context`.
pub(crate) trait IoContext<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| WarehouseError::io(f(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_names_the_path() {
        let err = WarehouseError::not_found("CSV", "downloads/missing.csv");
        assert_eq!(err.to_string(), "CSV file not found: downloads/missing.csv");
    }

    #[test]
    fn io_context_wraps_source() {
        let res: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        let err = res.io_context(|| "creating data/raw").unwrap_err();
        assert!(matches!(err, WarehouseError::Io { .. }));
        assert_eq!(err.to_string(), "creating data/raw: denied");
    }
}
