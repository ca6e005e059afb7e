use arrow::{
    array::{ArrayRef, BooleanArray, Float64Array, Int64Array, StringArray, TimestampMillisecondArray},
    datatypes::{DataType, Field, Schema, TimeUnit},
    record_batch::RecordBatch,
};
use calamine::{open_workbook_auto, Data, Range, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use std::{collections::HashMap, convert::Infallible, fmt, path::Path, str::FromStr, sync::Arc};
use tracing::debug;

use crate::error::{Result, WarehouseError};
use crate::table::Table;

/// Which worksheet to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sheet {
    Index(usize),
    Name(String),
}

impl Default for Sheet {
    fn default() -> Self {
        Sheet::Index(0)
    }
}

impl FromStr for Sheet {
    type Err = Infallible;

    /// Digits select by position, anything else by name.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.parse::<usize>() {
            Ok(idx) => Sheet::Index(idx),
            Err(_) => Sheet::Name(s.to_string()),
        })
    }
}

impl fmt::Display for Sheet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sheet::Index(idx) => write!(f, "#{}", idx),
            Sheet::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// Read one worksheet into memory. The first row holds the column names.
pub fn read_excel(path: &Path, sheet: &Sheet) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)?;
    let range = match sheet {
        Sheet::Index(idx) => workbook
            .worksheet_range_at(*idx)
            .ok_or_else(|| WarehouseError::SheetNotFound(sheet.to_string()))??,
        Sheet::Name(name) => {
            if !workbook.sheet_names().iter().any(|s| s == name) {
                return Err(WarehouseError::SheetNotFound(sheet.to_string()));
            }
            workbook.worksheet_range(name)?
        }
    };
    debug!(path = %path.display(), %sheet, size = ?range.get_size(), "read worksheet");
    range_to_table(&range)
}

const EMPTY: Data = Data::Empty;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Empty,
    Int,
    Float,
    Bool,
    DateTime,
    Text,
}

impl Kind {
    fn of(cell: &Data) -> Kind {
        match cell {
            Data::Empty | Data::Error(_) => Kind::Empty,
            Data::Int(_) => Kind::Int,
            // whole numbers stored as floats read back as integers
            Data::Float(f) if f.fract() == 0.0 && f.abs() < 9.0e15 => Kind::Int,
            Data::Float(_) => Kind::Float,
            Data::Bool(_) => Kind::Bool,
            Data::DateTime(_) | Data::DateTimeIso(_) => Kind::DateTime,
            Data::String(_) | Data::DurationIso(_) => Kind::Text,
        }
    }

    fn merge(self, other: Kind) -> Kind {
        match (self, other) {
            (Kind::Empty, k) | (k, Kind::Empty) => k,
            (a, b) if a == b => a,
            (Kind::Int, Kind::Float) | (Kind::Float, Kind::Int) => Kind::Float,
            _ => Kind::Text,
        }
    }

    fn data_type(self) -> DataType {
        match self {
            Kind::Int => DataType::Int64,
            Kind::Float => DataType::Float64,
            Kind::Bool => DataType::Boolean,
            Kind::DateTime => DataType::Timestamp(TimeUnit::Millisecond, None),
            Kind::Empty | Kind::Text => DataType::Utf8,
        }
    }
}

fn cell_datetime(cell: &Data) -> Option<NaiveDateTime> {
    match cell {
        Data::DateTime(dt) => dt.as_datetime(),
        Data::DateTimeIso(s) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            }),
        _ => None,
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => Some(s.clone()),
        Data::DateTime(_) => cell_datetime(cell).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string()),
        other => Some(other.to_string()),
    }
}

fn column_array(kind: Kind, cells: &[&Data]) -> ArrayRef {
    match kind {
        Kind::Int => Arc::new(
            cells
                .iter()
                .map(|c| match c {
                    Data::Int(i) => Some(*i),
                    Data::Float(f) => Some(*f as i64),
                    _ => None,
                })
                .collect::<Int64Array>(),
        ),
        Kind::Float => Arc::new(
            cells
                .iter()
                .map(|c| match c {
                    Data::Int(i) => Some(*i as f64),
                    Data::Float(f) => Some(*f),
                    _ => None,
                })
                .collect::<Float64Array>(),
        ),
        Kind::Bool => Arc::new(
            cells
                .iter()
                .map(|c| match c {
                    Data::Bool(b) => Some(*b),
                    _ => None,
                })
                .collect::<BooleanArray>(),
        ),
        Kind::DateTime => Arc::new(
            cells
                .iter()
                .map(|c| cell_datetime(c).map(|dt| dt.and_utc().timestamp_millis()))
                .collect::<TimestampMillisecondArray>(),
        ),
        Kind::Empty | Kind::Text => Arc::new(
            cells
                .iter()
                .map(|c| cell_text(c))
                .collect::<StringArray>(),
        ),
    }
}

/// Header names from the first row. Blank headers get a positional name and
/// repeats get a numeric suffix.
fn header_names(header: &[Data], width: usize) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    (0..width)
        .map(|c| {
            let base = header
                .get(c)
                .and_then(cell_text)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| format!("column_{}", c + 1));
            let n = seen.entry(base.clone()).or_insert(0);
            *n += 1;
            if *n == 1 {
                base
            } else {
                format!("{}_{}", base, *n - 1)
            }
        })
        .collect()
}

fn range_to_table(range: &Range<Data>) -> Result<Table> {
    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::empty());
    };
    let width = range.width();
    let names = header_names(header, width);
    let body: Vec<&[Data]> = rows.collect();

    let mut fields = Vec::with_capacity(width);
    let mut columns = Vec::with_capacity(width);
    for (c, name) in names.into_iter().enumerate() {
        let cells: Vec<&Data> = body.iter().map(|row| row.get(c).unwrap_or(&EMPTY)).collect();
        let kind = cells
            .iter()
            .fold(Kind::Empty, |acc, cell| acc.merge(Kind::of(cell)));
        fields.push(Field::new(name, kind.data_type(), true));
        columns.push(column_array(kind, &cells));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema, columns)?;
    Ok(Table::from_batch(batch))
}
