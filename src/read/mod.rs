//! Queries over the whole partitioned raw layer.
//!
//! Every query reads `<raw>/**/*.parquet` with Hive partitioning on, so the
//! `year`, `month` and `day` directory segments come back as integer columns
//! and filters on them prune whole directories.

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, instrument};

use crate::config::{WarehouseConfig, DEFAULT_ID_COLUMN, RAW_DATA_PATH};
use crate::db::sql::{path_literal, quote_identifier};
use crate::db::{
    get_database, get_default_database, with_connection, DatabaseInterface, Row, Value,
};
use crate::error::{Result, WarehouseError};
use crate::table::Table;

/// Row counts for one (year, month, day) partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionStat {
    pub year: i64,
    pub month: i64,
    pub day: i64,
    pub case_count: i64,
    pub unique_cases: i64,
}

pub struct CaseReader {
    db: Box<dyn DatabaseInterface>,
    raw_path: PathBuf,
    id_column: String,
}

impl Default for CaseReader {
    fn default() -> Self {
        Self::new(get_default_database(), RAW_DATA_PATH)
    }
}

impl CaseReader {
    pub fn new(db: Box<dyn DatabaseInterface>, raw_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            raw_path: raw_path.into(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
        }
    }

    pub fn from_config(config: &WarehouseConfig) -> Result<Self> {
        let db = get_database("duckdb", config.db_config())?;
        Ok(Self::new(db, &config.raw_data_path).with_id_column(&config.id_column))
    }

    /// Column counted distinctly by [`CaseReader::get_partition_stats`].
    pub fn with_id_column(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    fn source(&self) -> String {
        format!(
            "read_parquet({}, hive_partitioning = true)",
            path_literal(&self.raw_path.join("**").join("*.parquet"))
        )
    }

    fn fetch(&mut self, sql: &str, params: &[Value]) -> Result<Table> {
        let table = with_connection(self.db.as_mut(), |db| db.fetch_df(sql, params))?;
        info!(rows = table.num_rows(), "query returned");
        Ok(table)
    }

    /// Every row of every partition.
    pub fn read_all_cases(&mut self) -> Result<Table> {
        let sql = format!("SELECT * FROM {}", self.source());
        self.fetch(&sql, &[])
    }

    /// Rows of one year, optionally narrowed to a month and a day.
    #[instrument(level = "info", skip(self))]
    pub fn read_cases_by_date(
        &mut self,
        year: i32,
        month: Option<u32>,
        day: Option<u32>,
    ) -> Result<Table> {
        let mut clauses = vec!["year = ?"];
        let mut params = vec![Value::from(year)];
        if let Some(month) = month {
            clauses.push("month = ?");
            params.push(month.into());
        }
        if let Some(day) = day {
            clauses.push("day = ?");
            params.push(day.into());
        }
        let sql = format!("SELECT * FROM {} WHERE {}", self.source(), clauses.join(" AND "));
        self.fetch(&sql, &params)
    }

    /// Bounds year and month independently and ignores the day.
    ///
    /// A range that crosses a year boundary (December to January) matches
    /// nothing because no month is both `>= 12` and `<= 1`. Use
    /// [`CaseReader::read_cases_in_date_range`] for calendar-exact ranges.
    #[instrument(level = "info", skip(self))]
    pub fn read_cases_by_date_range(&mut self, start: NaiveDate, end: NaiveDate) -> Result<Table> {
        let sql = format!(
            "SELECT * FROM {} WHERE year BETWEEN ? AND ? AND month BETWEEN ? AND ?",
            self.source()
        );
        let params = [
            Value::from(start.year()),
            Value::from(end.year()),
            Value::from(start.month()),
            Value::from(end.month()),
        ];
        self.fetch(&sql, &params)
    }

    /// Rows whose partition date lies in `[start, end]`.
    #[instrument(level = "info", skip(self))]
    pub fn read_cases_in_date_range(&mut self, start: NaiveDate, end: NaiveDate) -> Result<Table> {
        let sql = format!(
            "SELECT * FROM {} \
             WHERE make_date(year, month, day) BETWEEN CAST(? AS DATE) AND CAST(? AS DATE)",
            self.source()
        );
        self.fetch(&sql, &[start.into(), end.into()])
    }

    /// Row and distinct-id counts per partition, newest first.
    pub fn get_partition_stats(&mut self) -> Result<Vec<PartitionStat>> {
        let sql = format!(
            "SELECT year, month, day, COUNT(*) AS case_count, COUNT(DISTINCT {}) AS unique_cases \
             FROM {} \
             GROUP BY year, month, day \
             ORDER BY year DESC, month DESC, day DESC",
            quote_identifier(&self.id_column),
            self.source()
        );
        let rows = with_connection(self.db.as_mut(), |db| db.fetch_all(&sql, &[]))?;
        let stats = rows.iter().map(stat_from_row).collect::<Result<Vec<_>>>()?;
        info!(partitions = stats.len(), "partition statistics");
        Ok(stats)
    }

    /// Run a filter or a full query over the raw layer.
    ///
    /// Text starting with `SELECT` runs verbatim; anything else becomes the
    /// `WHERE` clause of a select over all partitions. The text is executed
    /// as-is, so it must come from a trusted source.
    pub fn query_cases(&mut self, sql_filter: &str) -> Result<Table> {
        let sql = if sql_filter.trim().to_uppercase().starts_with("SELECT") {
            sql_filter.to_string()
        } else {
            format!("SELECT * FROM {} WHERE {}", self.source(), sql_filter)
        };
        self.fetch(&sql, &[])
    }
}

fn stat_from_row(row: &Row) -> Result<PartitionStat> {
    const COLUMNS: [&str; 5] = ["year", "month", "day", "case_count", "unique_cases"];
    let mut ints = [0i64; 5];
    for (i, column) in COLUMNS.into_iter().enumerate() {
        let value = row.get(i).unwrap_or(&Value::Null);
        ints[i] = value.as_i64().ok_or_else(|| WarehouseError::UnexpectedValue {
            column,
            value: value.to_string(),
        })?;
    }
    let [year, month, day, case_count, unique_cases] = ints;
    Ok(PartitionStat {
        year,
        month,
        day,
        case_count,
        unique_cases,
    })
}
