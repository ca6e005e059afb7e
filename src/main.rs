// src/main.rs
use anyhow::{ensure, Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use rrhh_dwh::{
    db::{get_database, with_connection, Value},
    load::{total_size_mb, CsvOptions, ParquetLoader, Sheet},
    paths::latest_partition_file,
    read::CaseReader,
    setup::scaffold,
    WarehouseConfig,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "rrhh-dwh",
    version,
    about = "Case-history warehouse: partitioned Parquet raw layer queried with DuckDB"
)]
struct Cli {
    /// YAML file overriding the default paths and engine settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a CSV or Excel extract into its date partition
    Load {
        file: PathBuf,
        /// Extraction date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Worksheet name or zero-based index
        #[arg(long, default_value = "0")]
        sheet: Sheet,
        /// CSV field separator (single ASCII character)
        #[arg(long, default_value_t = ',')]
        delimiter: char,
        /// CSV has no header row; columns are named column_1, column_2, ...
        #[arg(long)]
        no_header: bool,
    },
    /// Run the example queries over the raw layer
    Query,
    /// Create the project folder structure in the current directory
    Setup,
    /// List partition files with their sizes
    Summary {
        #[arg(long)]
        json: bool,
    },
    /// Check that the database opens and answers queries
    Check,
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => WarehouseConfig::from_yaml_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => WarehouseConfig::default(),
    };

    match cli.command {
        Command::Load {
            file,
            date,
            sheet,
            delimiter,
            no_header,
        } => {
            ensure!(
                delimiter.is_ascii(),
                "delimiter must be a single ASCII character, got {:?}",
                delimiter
            );
            let csv = CsvOptions::default()
                .with_delimiter(delimiter as u8)
                .with_header(!no_header);
            load(&config, &file, date, &sheet, csv)
        }
        Command::Query => query(&config),
        Command::Setup => setup(&config),
        Command::Summary { json } => summary(&config, json),
        Command::Check => check(&config),
    }
}

fn rule() {
    println!("{}", "=".repeat(60));
}

fn load(
    config: &WarehouseConfig,
    file: &Path,
    date: Option<NaiveDate>,
    sheet: &Sheet,
    csv: CsvOptions,
) -> Result<()> {
    let loader = ParquetLoader::new(&config.raw_data_path).with_csv_options(csv);
    let out = loader
        .load_file(file, date, sheet)
        .with_context(|| format!("loading {}", file.display()))?;
    println!("Saved to: {}", out.display());

    let summary = loader.get_data_summary()?;
    println!(
        "Raw layer: {} file(s), {:.2} MB",
        summary.len(),
        total_size_mb(&summary)
    );
    Ok(())
}

fn query(config: &WarehouseConfig) -> Result<()> {
    let mut reader = CaseReader::from_config(config)?;

    rule();
    println!("Partition statistics");
    rule();
    println!(
        "{:>6} {:>5} {:>4} {:>12} {:>12}",
        "year", "month", "day", "case_count", "unique_cases"
    );
    for s in reader.get_partition_stats()? {
        println!(
            "{:>6} {:>5} {:>4} {:>12} {:>12}",
            s.year, s.month, s.day, s.case_count, s.unique_cases
        );
    }

    let all = reader.read_all_cases()?;
    println!("\nAll cases: {} rows", all.num_rows());
    println!("Columns: {}", all.column_names().join(", "));

    let feb = reader.read_cases_by_date(2025, Some(2), None)?;
    println!("\nFebruary 2025: {} rows", feb.num_rows());

    let resolved = reader.query_cases("STATUS = 'Resolved'")?;
    println!("Resolved cases: {} rows", resolved.num_rows());
    Ok(())
}

fn setup(config: &WarehouseConfig) -> Result<()> {
    let report = scaffold(Path::new("."), config, Local::now().date_naive())?;
    for dir in &report.directories {
        println!("Created: {}", dir.display());
    }
    for file in &report.files {
        println!("Created: {}", file.display());
    }
    if report.directories.is_empty() && report.files.is_empty() {
        println!("Project structure already in place");
    }
    Ok(())
}

fn summary(config: &WarehouseConfig, json: bool) -> Result<()> {
    let loader = ParquetLoader::new(&config.raw_data_path);
    let files = loader.get_data_summary()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&files)?);
        return Ok(());
    }
    if files.is_empty() {
        println!("No Parquet files under {}", loader.base_path().display());
        return Ok(());
    }

    let opt = |v: Option<u32>| v.map_or_else(|| "-".to_string(), |v| format!("{:02}", v));
    for f in &files {
        println!(
            "{}-{}-{}  {:>8.2} MB  {}  {}",
            f.year.map_or_else(|| "----".to_string(), |y| y.to_string()),
            opt(f.month),
            opt(f.day),
            f.size_mb,
            f.modified_at.format("%Y-%m-%d %H:%M"),
            f.filename
        );
    }
    println!("Total: {} file(s), {:.2} MB", files.len(), total_size_mb(&files));
    if let Some(latest) = latest_partition_file(loader.base_path())? {
        println!("Latest: {}", latest.display());
    }
    Ok(())
}

fn check(config: &WarehouseConfig) -> Result<()> {
    let mut db = get_database("duckdb", config.db_config())?;
    let first = |row: Option<Vec<Value>>| {
        row.and_then(|r| r.into_iter().next())
            .unwrap_or(Value::Null)
    };

    let (greeting, version, rows, exists) = with_connection(db.as_mut(), |db| {
        let greeting = first(db.fetch_one("SELECT 'Connection successful!' AS message", &[])?);
        let version = first(db.fetch_one("SELECT version()", &[])?);
        let rows = db.fetch_df("SELECT 1 AS id, 'test' AS name", &[])?.pretty()?;
        let exists = db.table_exists("nonexistent_table")?;
        Ok((greeting, version, rows, exists))
    })?;

    println!("{}", greeting);
    println!("Database version: {}", version);
    println!("Arrow results:\n{}", rows);
    println!("Table existence check: {}", exists);
    info!(path = %config.db_path.display(), "connection check passed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_accepts_csv_dialect_flags() {
        let cli = Cli::try_parse_from([
            "rrhh-dwh",
            "load",
            "extract.csv",
            "--date",
            "2025-02-11",
            "--delimiter",
            ";",
            "--no-header",
        ])
        .unwrap();
        match cli.command {
            Command::Load {
                date,
                delimiter,
                no_header,
                sheet,
                ..
            } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2025, 2, 11));
                assert_eq!(delimiter, ';');
                assert!(no_header);
                assert_eq!(sheet, Sheet::Index(0));
            }
            _ => panic!("expected load"),
        }

        let cli = Cli::try_parse_from(["rrhh-dwh", "load", "x.csv", "--sheet", "Cases"]).unwrap();
        match cli.command {
            Command::Load {
                delimiter,
                no_header,
                sheet,
                ..
            } => {
                assert_eq!(delimiter, ',');
                assert!(!no_header);
                assert_eq!(sheet, Sheet::Name("Cases".into()));
            }
            _ => panic!("expected load"),
        }

        assert!(Cli::try_parse_from(["rrhh-dwh", "load", "x.csv", "--delimiter", ";;"]).is_err());
    }
}
