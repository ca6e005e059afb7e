//! Raw-layer loader: CSV/Excel extracts in, one Hive-partitioned Parquet
//! file per extraction date out.

pub mod csv;
pub mod excel;

use chrono::{DateTime, Local, NaiveDate};
use parquet::{
    arrow::ArrowWriter,
    basic::{Compression, ZstdLevel},
    file::properties::WriterProperties,
};
use serde::Serialize;
use std::{
    fs::{self, File},
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

use crate::config::RAW_DATA_PATH;
use crate::error::{IoContext, Result, WarehouseError};
use crate::paths::{
    ensure_dir, file_size_mb, list_partition_files, partition_dir, partition_values, PartitionKey,
};
use crate::table::Table;

pub use self::csv::{read_csv, CsvOptions};
pub use self::excel::{read_excel, Sheet};

/// One row of [`ParquetLoader::get_data_summary`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSummary {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub filename: String,
    /// Rounded to two decimals.
    pub size_mb: f64,
    pub modified_at: DateTime<Local>,
    pub full_path: PathBuf,
}

/// Sum of `size_mb` over a summary.
pub fn total_size_mb(files: &[FileSummary]) -> f64 {
    files.iter().map(|f| f.size_mb).sum()
}

/// Writes extracts under `base_path` as
/// `year=YYYY/month=MM/day=DD/case_history_YYYYMMDD.parquet`.
///
/// Loading twice for the same date overwrites the earlier file.
#[derive(Debug, Clone)]
pub struct ParquetLoader {
    base_path: PathBuf,
    csv_options: CsvOptions,
}

impl Default for ParquetLoader {
    fn default() -> Self {
        Self::new(RAW_DATA_PATH)
    }
}

impl ParquetLoader {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            csv_options: CsvOptions::default(),
        }
    }

    pub fn with_csv_options(mut self, options: CsvOptions) -> Self {
        self.csv_options = options;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Load a CSV extract. `extraction_date` defaults to today.
    #[instrument(level = "info", skip(self, path), fields(path = %path.display()))]
    pub fn load_from_csv(&self, path: &Path, extraction_date: Option<NaiveDate>) -> Result<PathBuf> {
        if !path.is_file() {
            return Err(WarehouseError::not_found("CSV", path));
        }
        let table = read_csv(path, &self.csv_options)?;
        info!(rows = table.num_rows(), columns = table.num_columns(), "read CSV");
        self.save_to_parquet(&table, extraction_date.unwrap_or_else(today))
    }

    /// Load one sheet of a workbook. `extraction_date` defaults to today.
    #[instrument(level = "info", skip(self, path), fields(path = %path.display()))]
    pub fn load_from_excel(
        &self,
        path: &Path,
        extraction_date: Option<NaiveDate>,
        sheet: &Sheet,
    ) -> Result<PathBuf> {
        if !path.is_file() {
            return Err(WarehouseError::not_found("Excel", path));
        }
        let table = read_excel(path, sheet)?;
        info!(rows = table.num_rows(), columns = table.num_columns(), "read worksheet");
        self.save_to_parquet(&table, extraction_date.unwrap_or_else(today))
    }

    /// Pick the reader from the file extension.
    pub fn load_file(
        &self,
        path: &Path,
        extraction_date: Option<NaiveDate>,
        sheet: &Sheet,
    ) -> Result<PathBuf> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "csv" => self.load_from_csv(path, extraction_date),
            "xlsx" | "xls" | "xlsm" | "xlsb" | "ods" => {
                self.load_from_excel(path, extraction_date, sheet)
            }
            _ => Err(WarehouseError::UnsupportedSource(path.display().to_string())),
        }
    }

    /// Write `table` to the partition file for `date`, replacing any file
    /// already there.
    pub fn save_to_parquet(&self, table: &Table, date: NaiveDate) -> Result<PathBuf> {
        let dir = ensure_dir(&partition_dir(&self.base_path, &date))?;
        let output = dir.join(PartitionKey::from_date(&date).file_name());
        let tmp = output.with_extension("parquet.tmp");

        let file = File::create(&tmp).io_context(|| format!("creating {}", tmp.display()))?;
        let props = WriterProperties::builder()
            .set_compression(Compression::ZSTD(ZstdLevel::default()))
            .build();
        let mut writer = ArrowWriter::try_new(file, table.schema().clone(), Some(props))?;
        for batch in table.batches() {
            writer.write(batch)?;
        }
        writer.close()?;
        fs::rename(&tmp, &output)
            .io_context(|| format!("moving {} into place", output.display()))?;

        info!(
            path = %output.display(),
            rows = table.num_rows(),
            size_mb = %format!("{:.2}", file_size_mb(&output)),
            compression = "ZSTD",
            "saved partition file"
        );
        Ok(output)
    }

    /// One entry per partition file, in path order. Empty when nothing has
    /// been loaded yet.
    pub fn get_data_summary(&self) -> Result<Vec<FileSummary>> {
        let files = list_partition_files(&self.base_path)?;
        if files.is_empty() {
            warn!(base = %self.base_path.display(), "no Parquet files found in raw layer");
            return Ok(Vec::new());
        }

        files
            .into_iter()
            .map(|path| {
                let meta = fs::metadata(&path)
                    .io_context(|| format!("reading metadata of {}", path.display()))?;
                let modified = meta
                    .modified()
                    .io_context(|| format!("reading mtime of {}", path.display()))?;
                let values = partition_values(&path);
                Ok(FileSummary {
                    year: values.year,
                    month: values.month,
                    day: values.day,
                    filename: path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default(),
                    size_mb: (file_size_mb(&path) * 100.0).round() / 100.0,
                    modified_at: DateTime::<Local>::from(modified),
                    full_path: path,
                })
            })
            .collect()
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, StringArray};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use rust_xlsxwriter::Workbook;
    use tempfile::tempdir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn read_status(path: &Path) -> Vec<String> {
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap())
            .unwrap()
            .build()
            .unwrap();
        let mut out = Vec::new();
        for batch in reader {
            let batch = batch.unwrap();
            let col = batch
                .column_by_name("STATUS")
                .unwrap()
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap()
                .clone();
            out.extend((0..col.len()).map(|i| col.value(i).to_string()));
        }
        out
    }

    #[test]
    fn csv_lands_in_its_partition() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("extract.csv");
        fs::write(&src, "CASE_ID,STATUS\n1,Open\n2,Resolved\n").unwrap();

        let loader = ParquetLoader::new(tmp.path().join("raw"));
        let out = loader.load_from_csv(&src, Some(date(2025, 2, 11))).unwrap();
        assert_eq!(
            out,
            tmp.path()
                .join("raw/year=2025/month=02/day=11/case_history_20250211.parquet")
        );
        assert_eq!(read_status(&out), vec!["Open", "Resolved"]);

        let meta = ParquetRecordBatchReaderBuilder::try_new(File::open(&out).unwrap())
            .unwrap()
            .metadata()
            .clone();
        assert!(matches!(
            meta.row_group(0).column(0).compression(),
            Compression::ZSTD(_)
        ));
        assert!(!out.with_extension("parquet.tmp").exists());
    }

    #[test]
    fn semicolon_csv_loads_with_matching_options() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("extract.csv");
        fs::write(&src, "CASE_ID;STATUS\n1;Open\n2;En curso, pendiente\n").unwrap();

        let loader = ParquetLoader::new(tmp.path().join("raw"))
            .with_csv_options(CsvOptions::default().with_delimiter(b';'));
        let out = loader.load_from_csv(&src, Some(date(2025, 2, 11))).unwrap();
        assert_eq!(read_status(&out), vec!["Open", "En curso, pendiente"]);
    }

    #[test]
    fn headerless_csv_gets_generated_names() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("extract.csv");
        fs::write(&src, "1,Open\n2,Closed\n").unwrap();

        let loader = ParquetLoader::new(tmp.path().join("raw"))
            .with_csv_options(CsvOptions::default().with_header(false));
        let out = loader.load_from_csv(&src, Some(date(2025, 2, 11))).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(&out).unwrap()).unwrap();
        assert_eq!(reader.schema().fields().len(), 2);
        assert_eq!(reader.metadata().file_metadata().num_rows(), 2);
    }

    #[test]
    fn excel_sheet_lands_in_its_partition() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("extract.xlsx");
        let mut workbook = Workbook::new();
        workbook.add_worksheet().set_name("Notes").unwrap();
        let cases = workbook.add_worksheet();
        cases.set_name("Cases").unwrap();
        cases.write_string(0, 0, "CASE_ID").unwrap();
        cases.write_string(0, 1, "STATUS").unwrap();
        cases.write_number(1, 0, 7.0).unwrap();
        cases.write_string(1, 1, "Escalated").unwrap();
        workbook.save(&src).unwrap();

        let loader = ParquetLoader::new(tmp.path().join("raw"));
        let out = loader
            .load_from_excel(&src, Some(date(2025, 2, 11)), &Sheet::Name("Cases".into()))
            .unwrap();
        assert_eq!(
            out,
            tmp.path()
                .join("raw/year=2025/month=02/day=11/case_history_20250211.parquet")
        );
        assert_eq!(read_status(&out), vec!["Escalated"]);

        let err = loader
            .load_file(&src, Some(date(2025, 2, 12)), &Sheet::Name("Archive".into()))
            .unwrap_err();
        assert!(matches!(err, WarehouseError::SheetNotFound(_)));
        assert_eq!(loader.get_data_summary().unwrap().len(), 1);
    }

    #[test]
    fn second_load_for_same_date_overwrites() {
        let tmp = tempdir().unwrap();
        let first = tmp.path().join("first.csv");
        let second = tmp.path().join("second.csv");
        fs::write(&first, "CASE_ID,STATUS\n1,Open\n2,Open\n3,Open\n").unwrap();
        fs::write(&second, "CASE_ID,STATUS\n9,Closed\n").unwrap();

        let loader = ParquetLoader::new(tmp.path().join("raw"));
        let d = date(2025, 3, 5);
        let a = loader.load_from_csv(&first, Some(d)).unwrap();
        let b = loader.load_from_csv(&second, Some(d)).unwrap();
        assert_eq!(a, b);
        assert_eq!(read_status(&b), vec!["Closed"]);
        assert_eq!(loader.get_data_summary().unwrap().len(), 1);
    }

    #[test]
    fn default_date_is_today() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("extract.csv");
        fs::write(&src, "CASE_ID\n1\n").unwrap();
        let loader = ParquetLoader::new(tmp.path().join("raw"));
        let out = loader.load_from_csv(&src, None).unwrap();
        assert!(out.ends_with(PartitionKey::from_date(&today()).file_name()));
    }

    #[test]
    fn missing_sources_are_not_found() {
        let tmp = tempdir().unwrap();
        let loader = ParquetLoader::new(tmp.path().join("raw"));

        let err = loader
            .load_from_csv(&tmp.path().join("nope.csv"), None)
            .unwrap_err();
        assert!(matches!(err, WarehouseError::NotFound { kind: "CSV", .. }));

        let err = loader
            .load_from_excel(&tmp.path().join("nope.xlsx"), None, &Sheet::default())
            .unwrap_err();
        assert!(matches!(err, WarehouseError::NotFound { kind: "Excel", .. }));
        assert!(!tmp.path().join("raw").exists());
    }

    #[test]
    fn load_file_dispatches_on_extension() {
        let tmp = tempdir().unwrap();
        let loader = ParquetLoader::new(tmp.path().join("raw"));

        let csv = tmp.path().join("EXTRACT.CSV");
        fs::write(&csv, "CASE_ID,STATUS\n1,Open\n").unwrap();
        let out = loader
            .load_file(&csv, Some(date(2025, 1, 2)), &Sheet::default())
            .unwrap();
        assert!(out.is_file());

        let txt = tmp.path().join("extract.txt");
        fs::write(&txt, "whatever").unwrap();
        let err = loader.load_file(&txt, None, &Sheet::default()).unwrap_err();
        assert!(matches!(err, WarehouseError::UnsupportedSource(_)));

        let xlsx = tmp.path().join("missing.xlsx");
        let err = loader.load_file(&xlsx, None, &Sheet::default()).unwrap_err();
        assert!(matches!(err, WarehouseError::NotFound { kind: "Excel", .. }));
    }

    #[test]
    fn summary_of_empty_layer_is_empty() {
        let tmp = tempdir().unwrap();
        let loader = ParquetLoader::new(tmp.path().join("raw"));
        let summary = loader.get_data_summary().unwrap();
        assert!(summary.is_empty());
        assert_eq!(total_size_mb(&summary), 0.0);
    }

    #[test]
    fn summary_reports_partitions_in_order() {
        let tmp = tempdir().unwrap();
        let src = tmp.path().join("extract.csv");
        fs::write(&src, "CASE_ID,STATUS\n1,Open\n").unwrap();

        let loader = ParquetLoader::new(tmp.path().join("raw"));
        for d in [date(2025, 2, 1), date(2024, 12, 31), date(2025, 1, 15)] {
            loader.load_from_csv(&src, Some(d)).unwrap();
        }

        let summary = loader.get_data_summary().unwrap();
        let keys: Vec<_> = summary.iter().map(|s| (s.year, s.month, s.day)).collect();
        assert_eq!(
            keys,
            vec![
                (Some(2024), Some(12), Some(31)),
                (Some(2025), Some(1), Some(15)),
                (Some(2025), Some(2), Some(1)),
            ]
        );
        assert_eq!(summary[0].filename, "case_history_20241231.parquet");
        assert!(summary[0].full_path.is_file());
        assert!(total_size_mb(&summary) >= 0.0);

        let json = serde_json::to_value(&summary[0]).unwrap();
        assert_eq!(json["year"], 2024);
        assert_eq!(json["filename"], "case_history_20241231.parquet");
    }
}
