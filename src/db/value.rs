use chrono::{DateTime, NaiveDate, NaiveDateTime};
use duckdb::types::{TimeUnit, Value as DuckValue};
use std::fmt;

/// A single scalar going into or coming out of the database.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Int(i64),
    Double(f64),
    Text(String),
    Blob(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

/// One materialized result row.
pub type Row = Vec<Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(s) => f.write_str(s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S%.f")),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Days between 0001-01-01 (CE day 1) and the Unix epoch.
const UNIX_EPOCH_CE_DAYS: i32 = 719_163;

fn micros(unit: TimeUnit, v: i64) -> i64 {
    match unit {
        TimeUnit::Second => v.saturating_mul(1_000_000),
        TimeUnit::Millisecond => v.saturating_mul(1_000),
        TimeUnit::Microsecond => v,
        TimeUnit::Nanosecond => v / 1_000,
    }
}

impl From<DuckValue> for Value {
    fn from(v: DuckValue) -> Self {
        match v {
            DuckValue::Null => Value::Null,
            DuckValue::Boolean(b) => Value::Boolean(b),
            DuckValue::TinyInt(i) => Value::Int(i.into()),
            DuckValue::SmallInt(i) => Value::Int(i.into()),
            DuckValue::Int(i) => Value::Int(i.into()),
            DuckValue::BigInt(i) => Value::Int(i),
            DuckValue::UTinyInt(i) => Value::Int(i.into()),
            DuckValue::USmallInt(i) => Value::Int(i.into()),
            DuckValue::UInt(i) => Value::Int(i.into()),
            DuckValue::UBigInt(i) => {
                i64::try_from(i).map_or_else(|_| Value::Text(i.to_string()), Value::Int)
            }
            DuckValue::HugeInt(i) => {
                i64::try_from(i).map_or_else(|_| Value::Text(i.to_string()), Value::Int)
            }
            DuckValue::Float(f) => Value::Double(f.into()),
            DuckValue::Double(f) => Value::Double(f),
            DuckValue::Decimal(d) => {
                let s = d.to_string();
                s.parse::<f64>().map_or(Value::Text(s), Value::Double)
            }
            DuckValue::Text(s) | DuckValue::Enum(s) => Value::Text(s),
            DuckValue::Blob(b) => Value::Blob(b),
            DuckValue::Date32(days) => days
                .checked_add(UNIX_EPOCH_CE_DAYS)
                .and_then(NaiveDate::from_num_days_from_ce_opt)
                .map_or(Value::Null, Value::Date),
            DuckValue::Timestamp(unit, v) => DateTime::from_timestamp_micros(micros(unit, v))
                .map_or(Value::Null, |dt| Value::Timestamp(dt.naive_utc())),
            other => Value::Text(format!("{:?}", other)),
        }
    }
}

impl duckdb::ToSql for Value {
    fn to_sql(&self) -> duckdb::Result<duckdb::types::ToSqlOutput<'_>> {
        use duckdb::types::ToSqlOutput;
        // Dates and timestamps travel as ISO text; the engine casts them on use.
        let out = match self {
            Value::Null => DuckValue::Null,
            Value::Boolean(b) => DuckValue::Boolean(*b),
            Value::Int(i) => DuckValue::BigInt(*i),
            Value::Double(f) => DuckValue::Double(*f),
            Value::Text(s) => DuckValue::Text(s.clone()),
            Value::Blob(b) => DuckValue::Blob(b.clone()),
            Value::Date(_) | Value::Timestamp(_) => DuckValue::Text(self.to_string()),
        };
        Ok(ToSqlOutput::Owned(out))
    }
}

/// Column metadata as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}
