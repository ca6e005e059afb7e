use arrow::{
    csv::{reader::Format, ReaderBuilder},
    datatypes::{DataType, Field, Schema},
    record_batch::RecordBatch,
};
use std::{
    fs::File,
    io::{Seek, SeekFrom},
    path::Path,
    sync::Arc,
};
use tracing::debug;

use crate::error::{IoContext, Result};
use crate::table::Table;

/// Dialect and inference knobs for CSV sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    pub has_header: bool,
    pub quote: u8,
    pub escape: Option<u8>,
    pub comment: Option<u8>,
    /// Rows sampled for type inference; `None` scans the whole file.
    pub infer_rows: Option<usize>,
    pub batch_size: usize,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            quote: b'"',
            escape: None,
            comment: None,
            infer_rows: None,
            batch_size: 8_192,
        }
    }
}

impl CsvOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    fn format(&self) -> Format {
        let mut format = Format::default()
            .with_header(self.has_header)
            .with_delimiter(self.delimiter)
            .with_quote(self.quote);
        if let Some(escape) = self.escape {
            format = format.with_escape(escape);
        }
        if let Some(comment) = self.comment {
            format = format.with_comment(comment);
        }
        format
    }
}

/// Read a whole CSV file into memory, inferring column types.
///
/// Columns that are empty throughout come back as `Utf8` rather than
/// `Null`, so every partition of the same extract has a writable type.
pub fn read_csv(path: &Path, options: &CsvOptions) -> Result<Table> {
    let mut file = File::open(path).io_context(|| format!("opening CSV {}", path.display()))?;
    let format = options.format();

    let (inferred, sampled) = format.infer_schema(&mut file, options.infer_rows)?;
    let schema = Arc::new(Schema::new(
        inferred
            .fields()
            .iter()
            .map(|f| match f.data_type() {
                DataType::Null => Arc::new(Field::new(f.name(), DataType::Utf8, true)),
                _ => f.clone(),
            })
            .collect::<Vec<_>>(),
    ));
    debug!(path = %path.display(), columns = schema.fields().len(), sampled, "inferred CSV schema");

    file.seek(SeekFrom::Start(0))
        .io_context(|| format!("rewinding CSV {}", path.display()))?;
    let reader = ReaderBuilder::new(schema.clone())
        .with_format(format)
        .with_batch_size(options.batch_size)
        .build(file)?;
    let batches = reader.collect::<std::result::Result<Vec<RecordBatch>, _>>()?;

    Ok(Table::new(schema, batches))
}
