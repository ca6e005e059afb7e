use arrow::{
    datatypes::{DataType, Schema},
    record_batch::RecordBatch,
};
use duckdb::{params_from_iter, types::Value as DuckValue, Connection};
use std::path::Path;
use tracing::{debug, info, instrument};

use super::sql::{path_literal, quote_identifier, quote_literal};
use super::{ColumnInfo, DatabaseInterface, IfExists, Row, Value};
use crate::config::DbConfig;
use crate::error::{Result, WarehouseError};
use crate::paths::ensure_dir;
use crate::table::Table;

/// DuckDB implementation of [`DatabaseInterface`].
///
/// Holds at most one connection, opened on first use and configured with
/// the memory limit and thread count from [`DbConfig`].
pub struct DuckDbAdapter {
    config: DbConfig,
    conn: Option<Connection>,
    in_transaction: bool,
}

impl DuckDbAdapter {
    pub fn new(config: DbConfig) -> Self {
        Self {
            config,
            conn: None,
            in_transaction: false,
        }
    }

    /// The live connection, opening it if needed.
    pub fn connection(&mut self) -> Result<&Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.open()?,
        };
        let conn: &Connection = self.conn.insert(conn);
        Ok(conn)
    }

    /// Compact the database file.
    pub fn vacuum(&mut self) -> Result<()> {
        self.connection()?.execute_batch("CHECKPOINT")?;
        info!(path = %self.config.path.display(), "database optimized (CHECKPOINT)");
        Ok(())
    }

    fn open(&self) -> Result<Connection> {
        let conn = Connection::open(&self.config.path)?;
        conn.execute_batch(&format!(
            "SET memory_limit = {}; SET threads = {};",
            quote_literal(&self.config.memory_limit),
            self.config.threads
        ))?;
        info!(
            path = %self.config.path.display(),
            memory_limit = %self.config.memory_limit,
            threads = self.config.threads,
            "connected to DuckDB"
        );
        Ok(conn)
    }

    fn create_from_schema(&mut self, table_name: &str, schema: &Schema) -> Result<()> {
        let columns: Vec<String> = schema
            .fields()
            .iter()
            .map(|f| format!("{} {}", quote_identifier(f.name()), sql_type(f.data_type())))
            .collect();
        let ddl = format!(
            "CREATE TABLE {} ({})",
            quote_identifier(table_name),
            columns.join(", ")
        );
        debug!(%ddl, "creating table");
        self.connection()?.execute_batch(&ddl)?;
        Ok(())
    }

    fn drop_table(&mut self, table_name: &str) -> Result<()> {
        self.connection()?
            .execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_identifier(table_name)))?;
        Ok(())
    }

    fn count_rows(&mut self, table_name: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_identifier(table_name));
        Ok(self
            .fetch_one(&sql, &[])?
            .and_then(|row| row.first().and_then(Value::as_i64))
            .unwrap_or(0))
    }
}

/// DuckDB column type for an Arrow type.
fn sql_type(dt: &DataType) -> String {
    match dt {
        DataType::Boolean => "BOOLEAN".into(),
        DataType::Int8 => "TINYINT".into(),
        DataType::Int16 => "SMALLINT".into(),
        DataType::Int32 => "INTEGER".into(),
        DataType::Int64 => "BIGINT".into(),
        DataType::UInt8 => "UTINYINT".into(),
        DataType::UInt16 => "USMALLINT".into(),
        DataType::UInt32 => "UINTEGER".into(),
        DataType::UInt64 => "UBIGINT".into(),
        DataType::Float16 | DataType::Float32 => "FLOAT".into(),
        DataType::Float64 => "DOUBLE".into(),
        DataType::Decimal128(p, s) => format!("DECIMAL({}, {})", p, s),
        DataType::Date32 | DataType::Date64 => "DATE".into(),
        DataType::Time32(_) | DataType::Time64(_) => "TIME".into(),
        DataType::Timestamp(_, None) => "TIMESTAMP".into(),
        DataType::Timestamp(_, Some(_)) => "TIMESTAMPTZ".into(),
        DataType::Binary | DataType::LargeBinary | DataType::FixedSizeBinary(_) => "BLOB".into(),
        _ => "VARCHAR".into(),
    }
}

fn read_row(row: &duckdb::Row<'_>) -> Result<Row> {
    let width = row.as_ref().column_count();
    (0..width)
        .map(|i| Ok(Value::from(row.get::<_, DuckValue>(i)?)))
        .collect()
}

impl DatabaseInterface for DuckDbAdapter {
    fn connect(&mut self) -> Result<()> {
        self.connection()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            self.in_transaction = false;
            conn.close().map_err(|(_, e)| e)?;
            info!(path = %self.config.path.display(), "DuckDB connection closed");
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
        let conn = self.connection()?;
        Ok(conn.execute(sql, params_from_iter(params))?)
    }

    fn execute_many(&mut self, sql: &str, params_list: &[Vec<Value>]) -> Result<()> {
        if params_list.is_empty() {
            return Ok(());
        }
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        for params in params_list {
            stmt.execute(params_from_iter(params))?;
        }
        Ok(())
    }

    fn fetch_one(&mut self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        let first = match rows.next()? {
            Some(row) => Some(read_row(row)?),
            None => None,
        };
        Ok(first)
    }

    fn fetch_all(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_row(row)?);
        }
        Ok(out)
    }

    fn fetch_df(&mut self, sql: &str, params: &[Value]) -> Result<Table> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let arrow = stmt.query_arrow(params_from_iter(params))?;
        let schema = arrow.get_schema();
        let batches: Vec<RecordBatch> = arrow.collect();
        Ok(Table::new(schema, batches))
    }

    fn table_exists(&mut self, table_name: &str) -> Result<bool> {
        let row = self.fetch_one(
            "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
            &[Value::from(table_name)],
        )?;
        Ok(row
            .and_then(|r| r.first().and_then(Value::as_i64))
            .is_some_and(|n| n > 0))
    }

    #[instrument(level = "debug", skip(self, df), fields(rows = df.num_rows()))]
    fn create_table_from_df(
        &mut self,
        df: &Table,
        table_name: &str,
        if_exists: IfExists,
    ) -> Result<()> {
        let exists = self.table_exists(table_name)?;
        match (exists, if_exists) {
            (true, IfExists::Fail) => {
                return Err(WarehouseError::TableExists(table_name.to_string()))
            }
            (true, IfExists::Replace) => {
                self.drop_table(table_name)?;
                self.create_from_schema(table_name, df.schema())?;
            }
            (true, IfExists::Append) => {}
            (false, _) => self.create_from_schema(table_name, df.schema())?,
        }

        let conn = self.connection()?;
        let mut appender = conn.appender(table_name)?;
        for batch in df.batches() {
            appender.append_record_batch(batch.clone())?;
        }
        appender.flush()?;

        info!(
            table = table_name,
            rows = df.num_rows(),
            mode = %if_exists,
            "table created from record batches"
        );
        Ok(())
    }

    #[instrument(level = "debug", skip(self, parquet_path), fields(path = %parquet_path.display()))]
    fn create_table_from_parquet(
        &mut self,
        parquet_path: &Path,
        table_name: &str,
        if_exists: IfExists,
    ) -> Result<()> {
        if !parquet_path.exists() {
            return Err(WarehouseError::not_found("Parquet", parquet_path));
        }

        let ident = quote_identifier(table_name);
        let source = format!("read_parquet({})", path_literal(parquet_path));
        let exists = self.table_exists(table_name)?;
        let sql = match (exists, if_exists) {
            (true, IfExists::Fail) => {
                return Err(WarehouseError::TableExists(table_name.to_string()))
            }
            (true, IfExists::Append) => format!("INSERT INTO {} SELECT * FROM {}", ident, source),
            (true, IfExists::Replace) => {
                self.drop_table(table_name)?;
                format!("CREATE TABLE {} AS SELECT * FROM {}", ident, source)
            }
            (false, _) => format!("CREATE TABLE {} AS SELECT * FROM {}", ident, source),
        };
        self.execute(&sql, &[])?;

        let count = self.count_rows(table_name)?;
        info!(table = table_name, rows = count, "table created from Parquet");
        Ok(())
    }

    #[instrument(level = "debug", skip(self, sql, output_path, params), fields(path = %output_path.display()))]
    fn export_to_parquet(
        &mut self,
        sql: &str,
        output_path: &Path,
        params: &[Value],
    ) -> Result<()> {
        if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir(parent)?;
        }
        let copy = format!(
            "COPY ({}) TO {} (FORMAT PARQUET, COMPRESSION ZSTD)",
            sql,
            path_literal(output_path)
        );
        self.execute(&copy, params)?;
        info!(path = %output_path.display(), "data exported to Parquet");
        Ok(())
    }

    fn get_table_info(&mut self, table_name: &str) -> Result<Vec<ColumnInfo>> {
        let rows = self.fetch_all(&format!("DESCRIBE {}", quote_identifier(table_name)), &[])?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let text = |i: usize| row.get(i).map(ToString::to_string).unwrap_or_default();
                ColumnInfo {
                    name: text(0),
                    data_type: text(1),
                    nullable: text(2).eq_ignore_ascii_case("YES"),
                }
            })
            .collect())
    }

    fn begin(&mut self) -> Result<()> {
        self.connection()?.execute_batch("BEGIN TRANSACTION")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        match self.conn.as_ref() {
            Some(conn) if self.in_transaction => {
                conn.execute_batch("COMMIT")?;
                self.in_transaction = false;
            }
            _ => debug!("commit: no open transaction (auto-commit)"),
        }
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        match self.conn.as_ref() {
            Some(conn) if self.in_transaction => {
                self.in_transaction = false;
                conn.execute_batch("ROLLBACK")?;
            }
            _ => debug!("rollback: no open transaction"),
        }
        Ok(())
    }
}
