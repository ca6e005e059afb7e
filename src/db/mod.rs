//! Database access behind a backend-neutral interface.
//!
//! Callers program against [`DatabaseInterface`]; [`get_database`] hands out
//! a boxed implementation picked by name. DuckDB is the only backend today.

pub mod duck;
pub mod sql;
pub mod value;

use std::{fmt, path::Path, str::FromStr};
use tracing::warn;

use crate::config::{DbConfig, WarehouseConfig};
use crate::error::{Result, WarehouseError};
use crate::table::Table;

pub use duck::DuckDbAdapter;
pub use value::{ColumnInfo, Row, Value};

/// What to do when a table being created already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IfExists {
    /// Error out and leave the existing table alone.
    #[default]
    Fail,
    /// Drop the existing table, then create it again.
    Replace,
    /// Insert into the existing table (create it if absent).
    Append,
}

impl FromStr for IfExists {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(IfExists::Fail),
            "replace" => Ok(IfExists::Replace),
            "append" => Ok(IfExists::Append),
            _ => Err(WarehouseError::InvalidIfExists(s.to_string())),
        }
    }
}

impl fmt::Display for IfExists {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IfExists::Fail => "fail",
            IfExists::Replace => "replace",
            IfExists::Append => "append",
        })
    }
}

/// Operations every database backend provides.
///
/// Implementations connect lazily: any query method opens the connection
/// first if needed. `connect` and `close` are idempotent.
pub trait DatabaseInterface {
    fn connect(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Run a statement, returning the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize>;

    /// Run `sql` once per parameter set, in order. The first failure stops
    /// the loop; earlier executions are not undone.
    fn execute_many(&mut self, sql: &str, params_list: &[Vec<Value>]) -> Result<()>;

    fn fetch_one(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>>;

    fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Materialize the full result as Arrow batches.
    fn fetch_df(&mut self, sql: &str, params: &[Value]) -> Result<Table>;

    fn table_exists(&mut self, table_name: &str) -> Result<bool>;

    fn create_table_from_df(
        &mut self,
        df: &Table,
        table_name: &str,
        if_exists: IfExists,
    ) -> Result<()>;

    fn create_table_from_parquet(
        &mut self,
        parquet_path: &Path,
        table_name: &str,
        if_exists: IfExists,
    ) -> Result<()>;

    /// Write the result of `sql` straight to a compressed Parquet file,
    /// creating parent directories as needed.
    fn export_to_parquet(&mut self, sql: &str, output_path: &Path, params: &[Value])
        -> Result<()>;

    fn get_table_info(&mut self, table_name: &str) -> Result<Vec<ColumnInfo>>;

    /// Open an explicit transaction.
    fn begin(&mut self) -> Result<()>;

    /// Commit the open transaction; no-op when none is open.
    fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction; no-op when none is open.
    fn rollback(&mut self) -> Result<()>;
}

/// Run `f` against a connected database, then close it.
///
/// If `f` fails, the open transaction (if any) is rolled back before the
/// connection is closed and the original error is returned.
pub fn with_connection<D, T, F>(db: &mut D, f: F) -> Result<T>
where
    D: DatabaseInterface + ?Sized,
    F: FnOnce(&mut D) -> Result<T>,
{
    db.connect()?;
    match f(db) {
        Ok(value) => {
            db.close()?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rb) = db.rollback() {
                warn!(error = %rb, "rollback after failure did not succeed");
            }
            if let Err(close) = db.close() {
                warn!(error = %close, "close after failure did not succeed");
            }
            Err(err)
        }
    }
}

/// Registered backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    DuckDb,
}

impl FromStr for Backend {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "duckdb" => Ok(Backend::DuckDb),
            _ => Err(WarehouseError::UnsupportedBackend(s.to_string())),
        }
    }
}

/// Build a database adapter for the backend called `db_type`.
pub fn get_database(db_type: &str, config: DbConfig) -> Result<Box<dyn DatabaseInterface>> {
    match db_type.parse::<Backend>()? {
        Backend::DuckDb => Ok(Box::new(DuckDbAdapter::new(config))),
    }
}

/// The project's default database: DuckDB at `DB_PATH` with default settings.
pub fn get_default_database() -> Box<dyn DatabaseInterface> {
    Box::new(DuckDbAdapter::new(WarehouseConfig::default().db_config()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn if_exists_parsing() {
        assert_eq!("fail".parse::<IfExists>().unwrap(), IfExists::Fail);
        assert_eq!("Replace".parse::<IfExists>().unwrap(), IfExists::Replace);
        assert_eq!(" append ".parse::<IfExists>().unwrap(), IfExists::Append);
        assert_eq!(IfExists::default(), IfExists::Fail);
        assert!(matches!(
            "upsert".parse::<IfExists>(),
            Err(WarehouseError::InvalidIfExists(v)) if v == "upsert"
        ));
        assert_eq!(IfExists::Append.to_string(), "append");
    }

    #[test]
    fn factory_knows_duckdb_only() {
        let tmp = tempdir().unwrap();
        let db = get_database("DuckDB", DbConfig::new(tmp.path().join("f.duckdb"))).unwrap();
        assert!(!db.is_connected());

        let err = get_database("postgres", DbConfig::default()).err().unwrap();
        assert!(matches!(err, WarehouseError::UnsupportedBackend(ref name) if name == "postgres"));
        assert_eq!(err.to_string(), "Unsupported database type: postgres");
    }

    #[test]
    fn default_database_is_not_connected() {
        let db = get_default_database();
        assert!(!db.is_connected());
    }

    #[test]
    fn with_connection_closes_on_success() {
        let tmp = tempdir().unwrap();
        let mut db = get_database("duckdb", DbConfig::new(tmp.path().join("s.duckdb"))).unwrap();
        let greeting = with_connection(db.as_mut(), |db| {
            assert!(db.is_connected());
            let row = db.fetch_one("SELECT 'Connection successful!' AS message", &[])?;
            Ok(row.and_then(|r| r.into_iter().next()))
        })
        .unwrap();
        assert_eq!(greeting, Some(Value::Text("Connection successful!".into())));
        assert!(!db.is_connected());
    }

    #[test]
    fn with_connection_rolls_back_on_failure() {
        let tmp = tempdir().unwrap();
        let mut db = get_database("duckdb", DbConfig::new(tmp.path().join("r.duckdb"))).unwrap();
        with_connection(db.as_mut(), |db| {
            db.execute("CREATE TABLE cases (id BIGINT)", &[])?;
            Ok(())
        })
        .unwrap();

        let res: Result<()> = with_connection(db.as_mut(), |db| {
            db.begin()?;
            db.execute("INSERT INTO cases VALUES (1), (2)", &[])?;
            db.execute("SELECT * FROM no_such_table", &[])?;
            Ok(())
        });
        assert!(matches!(res, Err(WarehouseError::Engine(_))));
        assert!(!db.is_connected());

        let count = with_connection(db.as_mut(), |db| {
            Ok(db.fetch_one("SELECT COUNT(*) FROM cases", &[])?)
        })
        .unwrap()
        .unwrap();
        assert_eq!(count[0], Value::Int(0));
    }
}
