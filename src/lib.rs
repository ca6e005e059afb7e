//! Case-history warehouse: CSV/Excel extracts written as Hive-partitioned
//! Parquet and queried through an embedded DuckDB.

pub mod config;
pub mod db;
pub mod error;
pub mod load;
pub mod paths;
pub mod read;
pub mod setup;
pub mod table;

pub use config::{DbConfig, WarehouseConfig};
pub use db::{get_database, get_default_database, with_connection, DatabaseInterface, IfExists};
pub use error::{Result, WarehouseError};
pub use load::{FileSummary, ParquetLoader};
pub use read::{CaseReader, PartitionStat};
pub use table::Table;
