//! Opening the crash and person files as [`Table`]s.
//!
//! Every backend goes through the same steps: scan the raw file with all
//! columns as strings, coerce the typed columns (unparseable values become
//! null), derive the calendar columns, and keep only the configured year
//! range. The memory and sampled backends then collect the result once; the
//! lazy backend keeps the plan and re-runs it per query.

use crate::cli::{BackendKind, CompressionFormat, FileFormat};
use crate::config::{AppConfig, YearRangeConfig};
use crate::schema::*;
use crate::table::{Backend, Table};
use color_eyre::eyre::eyre;
use color_eyre::Result;
use polars::prelude::*;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;

/// Time-of-day formats tried in order for `CRASH TIME`
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];
/// Date formats tried in order for `CRASH DATE`. Matched non-exactly, so
/// ISO timestamps such as `2021-09-11T00:00:00.000` yield their date part.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Person columns read from the source; the rest of the file is skipped
const PERSON_COLUMNS: &[&str] = &[
    COLLISION_ID,
    CRASH_DATE,
    CRASH_TIME,
    BOROUGH,
    PERSON_TYPE,
    PERSON_AGE,
    PERSON_SEX,
    PERSON_INJURY,
];

/// Which of the two collision tables a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Crash,
    Person,
}

impl TableKind {
    pub fn name(&self) -> &'static str {
        match self {
            TableKind::Crash => "crash",
            TableKind::Person => "person",
        }
    }
}

/// How to open and hold a table
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub backend: Backend,
    pub compression: Option<CompressionFormat>,
    pub delimiter: Option<u8>,
    pub years: YearRangeConfig,
    /// Seed for the sampled backend's row selection
    pub seed: Option<u64>,
    /// Directory for decompressed copies used by lazy scans (default: system temp)
    pub temp_dir: Option<PathBuf>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            compression: None,
            delimiter: None,
            years: YearRangeConfig::default(),
            seed: Some(42),
            temp_dir: None,
        }
    }
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_compression(mut self, compression: CompressionFormat) -> Self {
        self.compression = Some(compression);
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = Some(delimiter);
        self
    }

    pub fn with_years(mut self, years: YearRangeConfig) -> Self {
        self.years = years;
        self
    }

    /// Options from a validated configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let backend = match config.backend()? {
            BackendKind::Memory => Backend::Memory,
            BackendKind::Lazy => Backend::Lazy,
            BackendKind::Sampled => Backend::Sampled {
                rows: config.data.sample_rows,
            },
        };
        let compression = match &config.data.compression {
            Some(name) => Some(
                CompressionFormat::from_name(name)
                    .ok_or_else(|| eyre!("unknown compression: {name}"))?,
            ),
            None => None,
        };
        Ok(Self {
            backend,
            compression,
            delimiter: config.data.delimiter,
            years: config.years,
            seed: config.sample_seed(),
            temp_dir: None,
        })
    }
}

/// A raw scan of a source file before type coercion
pub struct RawScan {
    pub frame: LazyFrame,
    pub columns: Vec<String>,
    pub spill: Option<NamedTempFile>,
}

/// Scan a file without reading it. Compressed CSV is first decompressed to a
/// temp file, which is returned so the caller can keep it alive.
pub fn scan_file(path: &Path, options: &OpenOptions) -> Result<RawScan> {
    if !path.exists() {
        return Err(eyre!("data file not found: {}", path.display()));
    }
    let compression = options
        .compression
        .or_else(|| CompressionFormat::from_extension(path));
    let format = FileFormat::from_path(path).unwrap_or(FileFormat::Csv);

    let (mut frame, spill) = match (format, compression) {
        (FileFormat::Parquet, None) => {
            let pl_path = PlPath::Local(Arc::from(path));
            (LazyFrame::scan_parquet(pl_path, Default::default())?, None)
        }
        (FileFormat::Parquet, Some(_)) => {
            return Err(eyre!(
                "compressed parquet is not supported: {}",
                path.display()
            ))
        }
        (FileFormat::Csv, None) => (scan_csv(path, options)?, None),
        (FileFormat::Csv, Some(compression)) => {
            let temp_dir = options.temp_dir.clone().unwrap_or_else(std::env::temp_dir);
            let temp = decompress_to_temp(path, compression, &temp_dir)?;
            log::debug!(
                "decompressed {} to {}",
                path.display(),
                temp.path().display()
            );
            (scan_csv(temp.path(), options)?, Some(temp))
        }
    };

    let columns = frame
        .collect_schema()?
        .iter_names()
        .map(|n| n.to_string())
        .collect();
    Ok(RawScan {
        frame,
        columns,
        spill,
    })
}

fn scan_csv(path: &Path, options: &OpenOptions) -> Result<LazyFrame> {
    let pl_path = PlPath::Local(Arc::from(path));
    // All columns are read as strings and coerced afterwards, so a stray
    // value deep in the file cannot break schema inference.
    let mut reader = LazyCsvReader::new(pl_path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0));
    if let Some(delimiter) = options.delimiter {
        reader = reader.with_separator(delimiter);
    }
    Ok(reader.finish()?)
}

/// Decompress a compressed file to a temp file for lazy CSV scan.
fn decompress_to_temp(
    path: &Path,
    compression: CompressionFormat,
    temp_dir: &Path,
) -> Result<NamedTempFile> {
    let mut temp = NamedTempFile::new_in(temp_dir)?;
    let out = temp.as_file_mut();
    let f = File::open(path)?;
    let mut reader: Box<dyn Read> = match compression {
        CompressionFormat::Gzip => Box::new(flate2::read::MultiGzDecoder::new(BufReader::new(f))),
        CompressionFormat::Zstd => Box::new(zstd::Decoder::new(BufReader::new(f))?),
        CompressionFormat::Bzip2 => Box::new(bzip2::read::BzDecoder::new(BufReader::new(f))),
        CompressionFormat::Xz => Box::new(xz2::read::XzDecoder::new(BufReader::new(f))),
    };
    std::io::copy(&mut reader, out)?;
    out.sync_all()?;
    Ok(temp)
}

/// Coerce types, derive calendar columns and restrict to the year range.
///
/// `schema` is the raw frame's schema; it decides how each column is parsed
/// (strings from CSV, native types from Parquet).
pub fn prepare(
    frame: LazyFrame,
    schema: &Schema,
    kind: TableKind,
    years: YearRangeConfig,
) -> Result<LazyFrame> {
    let (mut frame, schema) = match kind {
        TableKind::Crash => (frame, schema.clone()),
        TableKind::Person => {
            // Person columns are matched case-insensitively and renamed to
            // their canonical spelling.
            let keep: Vec<Expr> = PERSON_COLUMNS
                .iter()
                .filter_map(|canonical| {
                    schema
                        .iter_names()
                        .find(|n| n.eq_ignore_ascii_case(canonical))
                        .map(|raw| col(raw.as_str()).alias(*canonical))
                })
                .collect();
            let mut projected = frame.select(keep);
            let schema = projected.collect_schema()?.as_ref().clone();
            (projected, schema)
        }
    };
    let present = |name: &str| schema.get(name).is_some();

    let mut typed = vec![date_expr(schema.get(CRASH_DATE)).alias(CRASH_DATE)];
    if present(CRASH_TIME) {
        typed.push(time_expr(schema.get(CRASH_TIME)).alias(CRASH_TIME));
    }
    for name in [PERSONS_INJURED, PERSONS_KILLED, PERSON_AGE] {
        if present(name) {
            typed.push(integer_expr(name));
        }
    }
    for name in [LATITUDE, LONGITUDE] {
        if present(name) {
            typed.push(col(name).cast(DataType::Float64).alias(name));
        }
    }
    for name in category_columns(&schema) {
        if matches!(schema.get(&name), Some(DataType::String)) {
            typed.push(blank_to_null(&name).alias(name.as_str()));
        }
    }
    frame = frame.with_columns(typed);

    let mut derived = vec![
        col(CRASH_DATE)
            .dt()
            .year()
            .cast(DataType::Int32)
            .alias(YEAR),
    ];
    if kind == TableKind::Crash {
        derived.push(
            col(CRASH_DATE)
                .dt()
                .month()
                .cast(DataType::Int32)
                .alias(MONTH),
        );
        derived.push(
            col(CRASH_DATE)
                .dt()
                .weekday()
                .cast(DataType::Int32)
                .alias(WEEKDAY),
        );
        derived.push(
            col(CRASH_TIME)
                .dt()
                .hour()
                .cast(DataType::Int32)
                .alias(HOUR),
        );
    }
    frame = frame.with_columns(derived);

    if kind == TableKind::Crash {
        frame = frame.with_column(season_expr(col(MONTH)).alias(SEASON));
    }

    Ok(frame.filter(
        col(YEAR)
            .gt_eq(lit(years.min))
            .and(col(YEAR).lt_eq(lit(years.max))),
    ))
}

/// Columns whose values are category labels: borough, person type and the
/// vehicle and factor families
fn category_columns(schema: &Schema) -> Vec<String> {
    schema
        .iter_names()
        .filter(|name| {
            let upper = name.to_uppercase();
            name.as_str() == BOROUGH
                || name.as_str() == PERSON_TYPE
                || upper.contains(VEHICLE_TYPE_PATTERN)
                || upper.contains(CONTRIBUTING_FACTOR_PATTERN)
        })
        .map(|name| name.to_string())
        .collect()
}

/// Person column names with known columns respelled the way `prepare`
/// renames them
fn canonical_person_columns(columns: &[String]) -> Vec<String> {
    columns
        .iter()
        .map(|raw| {
            PERSON_COLUMNS
                .iter()
                .find(|canonical| raw.eq_ignore_ascii_case(canonical))
                .map_or_else(|| raw.clone(), |canonical| canonical.to_string())
        })
        .collect()
}

/// Blank strings are treated as missing
fn blank_to_null(name: &str) -> Expr {
    let trimmed = col(name).str().strip_chars(lit(NULL));
    when(trimmed.clone().eq(lit("")))
        .then(lit(NULL).cast(DataType::String))
        .otherwise(trimmed)
}

fn date_expr(dtype: Option<&DataType>) -> Expr {
    match dtype {
        Some(DataType::Date) => col(CRASH_DATE),
        Some(DataType::Datetime(_, _)) => col(CRASH_DATE).dt().date(),
        Some(DataType::String) => {
            let attempts: Vec<Expr> = DATE_FORMATS
                .iter()
                .map(|fmt| {
                    blank_to_null(CRASH_DATE).str().to_date(StrptimeOptions {
                        format: Some((*fmt).into()),
                        strict: false,
                        exact: false,
                        cache: true,
                    })
                })
                .collect();
            coalesce(&attempts)
        }
        _ => lit(NULL).cast(DataType::Date),
    }
}

fn time_expr(dtype: Option<&DataType>) -> Expr {
    match dtype {
        Some(DataType::Time) => col(CRASH_TIME),
        Some(DataType::Datetime(_, _)) => col(CRASH_TIME).dt().time(),
        Some(DataType::String) => {
            let attempts: Vec<Expr> = TIME_FORMATS
                .iter()
                .map(|fmt| {
                    blank_to_null(CRASH_TIME).str().to_time(StrptimeOptions {
                        format: Some((*fmt).into()),
                        strict: false,
                        exact: true,
                        cache: true,
                    })
                })
                .collect();
            coalesce(&attempts)
        }
        _ => lit(NULL).cast(DataType::Time),
    }
}

/// Counts and ages may arrive as "3" or "3.0"; anything else becomes null
fn integer_expr(name: &str) -> Expr {
    col(name)
        .cast(DataType::Float64)
        .cast(DataType::Int64)
        .alias(name)
}

/// Month (1-12) to meteorological season; null month maps to "Unknown"
pub fn season_expr(month: Expr) -> Expr {
    when(month.clone().is_null())
        .then(lit("Unknown"))
        .when(month.clone().eq(lit(12)).or(month.clone().lt_eq(lit(2))))
        .then(lit("Winter"))
        .when(month.clone().lt_eq(lit(5)))
        .then(lit("Spring"))
        .when(month.clone().lt_eq(lit(8)))
        .then(lit("Summer"))
        .when(month.lt_eq(lit(11)))
        .then(lit("Fall"))
        .otherwise(lit("Unknown"))
}

/// The crash and person tables plus the column catalog discovered from them
pub struct Dataset {
    pub crash: Table,
    pub person: Table,
    pub catalog: SchemaCatalog,
}

impl Dataset {
    /// Open both tables from files. Fails before any data is read when a
    /// required column is missing.
    pub fn open(crash_path: &Path, person_path: &Path, options: &OpenOptions) -> Result<Self> {
        let started = Instant::now();
        let crash = scan_file(crash_path, options)?;
        let person = scan_file(person_path, options)?;
        let dataset = Self::from_scans(crash, person, options)?;
        log::info!(
            "opened {} and {} ({} backend) in {:.2?}",
            crash_path.display(),
            person_path.display(),
            options.backend,
            started.elapsed()
        );
        Ok(dataset)
    }

    /// Build a dataset from in-memory frames holding raw source columns
    pub fn from_frames(crash: DataFrame, person: DataFrame, options: &OpenOptions) -> Result<Self> {
        let raw = |df: DataFrame| RawScan {
            columns: df
                .get_column_names()
                .iter()
                .map(|n| n.to_string())
                .collect(),
            frame: df.lazy(),
            spill: None,
        };
        Self::from_scans(raw(crash), raw(person), options)
    }

    fn from_scans(crash: RawScan, person: RawScan, options: &OpenOptions) -> Result<Self> {
        SchemaCatalog::discover(&crash.columns, canonical_person_columns(&person.columns))?;
        let crash = load_table(crash, TableKind::Crash, options)?;
        let person = load_table(person, TableKind::Person, options)?;
        let catalog = SchemaCatalog::discover(crash.columns(), person.columns())?;
        log::debug!(
            "catalog: {} vehicle column(s), {} factor column(s), person type {}, person age {}",
            catalog.vehicle_type_columns().len(),
            catalog.contributing_factor_columns().len(),
            catalog.has_person_type(),
            catalog.has_person_age()
        );
        Ok(Self {
            crash,
            person,
            catalog,
        })
    }
}

fn load_table(raw: RawScan, kind: TableKind, options: &OpenOptions) -> Result<Table> {
    let RawScan {
        mut frame, spill, ..
    } = raw;
    let schema = frame.collect_schema()?;
    let prepared = prepare(frame, &schema, kind, options.years)?;
    materialize(kind, prepared, spill, options)
}

/// Turn a prepared plan into a table for the configured backend
pub fn materialize(
    kind: TableKind,
    prepared: LazyFrame,
    spill: Option<NamedTempFile>,
    options: &OpenOptions,
) -> Result<Table> {
    match options.backend {
        Backend::Memory => {
            let df = prepared.collect()?;
            log::debug!("{} table holds {} rows in memory", kind.name(), df.height());
            Table::new(kind.name(), Backend::Memory, df.lazy(), None)
        }
        Backend::Lazy => Table::new(kind.name(), Backend::Lazy, prepared, spill),
        Backend::Sampled { rows } => {
            let df = prepared.collect()?;
            let total = df.height();
            let df = if total > rows {
                df.sample_n_literal(rows, false, false, options.seed)?
            } else {
                df
            };
            log::info!(
                "{} table sampled to {} of {} rows",
                kind.name(),
                df.height(),
                total
            );
            Table::new(kind.name(), Backend::Sampled { rows }, df.lazy(), None)
        }
    }
}
