//! Shared CLI definitions for collision-dash.
//!
//! Used by the main application and by the build script (manpage) and
//! gen_docs binary (command-line-options markdown).

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// File format for data files. Detected from the extension, after any
/// compression extension has been stripped (`crashes.csv.gz` is CSV).
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FileFormat {
    /// Comma-separated values
    Csv,
    /// Parquet columnar format
    Parquet,
}

impl FileFormat {
    /// Detect file format from path extension. Returns None when extension is missing or unknown.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name().and_then(|n| n.to_str())?;
        let mut parts = name.rsplit('.');
        let last = parts.next()?;
        let ext = if CompressionFormat::from_extension(path).is_some() {
            parts.next()?
        } else {
            last
        };
        Self::from_extension(ext)
    }

    /// Parse format from extension string (e.g. "parquet", "csv").
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "parquet" => Some(Self::Parquet),
            _ => None,
        }
    }
}

/// Compression format for data files
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum CompressionFormat {
    /// Gzip compression (.gz) - Most common, good balance of speed and compression
    Gzip,
    /// Zstandard compression (.zst) - Modern, fast compression with good ratios
    Zstd,
    /// Bzip2 compression (.bz2) - Good compression ratio, slower than gzip
    Bzip2,
    /// XZ compression (.xz) - Excellent compression ratio, slower than bzip2
    Xz,
}

impl CompressionFormat {
    /// Detect compression format from file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            Self::from_name(ext)
        } else {
            None
        }
    }

    /// Parse a format from its config/extension spelling ("gzip", "gz", "zstd", ...)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "gz" | "gzip" => Some(Self::Gzip),
            "zst" | "zstd" => Some(Self::Zstd),
            "bz2" | "bz" | "bzip2" => Some(Self::Bzip2),
            "xz" => Some(Self::Xz),
            _ => None,
        }
    }

    /// Get file extension for this compression format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Gzip => "gz",
            Self::Zstd => "zst",
            Self::Bzip2 => "bz2",
            Self::Xz => "xz",
        }
    }
}

/// How the crash and person tables are held in the process
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum BackendKind {
    /// Read each file once into memory and query the in-memory frame
    Memory,
    /// Scan the files lazily on every query (bounded memory, slower queries)
    Lazy,
    /// Load a bounded random subset of each file (approximate results)
    Sampled,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Lazy => "lazy",
            Self::Sampled => "sampled",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "lazy" => Some(Self::Lazy),
            "sampled" => Some(Self::Sampled),
            _ => None,
        }
    }
}

/// Command-line arguments for collision-dash
#[derive(Clone, Parser, Debug)]
#[command(
    name = "collision-dash",
    version,
    about = "Filter and aggregate traffic collision data for dashboards",
    long_about = include_str!("../long_about.txt")
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Crash-level data file (CSV, compressed CSV, or Parquet)
    #[arg(long = "crash", global = true, value_name = "PATH")]
    pub crash_path: Option<PathBuf>,

    /// Person-level data file (CSV, compressed CSV, or Parquet)
    #[arg(long = "person", global = true, value_name = "PATH")]
    pub person_path: Option<PathBuf>,

    /// How tables are held: memory, lazy, or sampled
    #[arg(long = "backend", global = true, value_enum)]
    pub backend: Option<BackendKind>,

    /// Rows kept per table by the sampled backend
    #[arg(long = "sample-rows", global = true, value_name = "N")]
    pub sample_rows: Option<usize>,

    /// Specify the compression format explicitly (gzip, zstd, bzip2, xz)
    /// If not specified, compression is auto-detected from file extension.
    #[arg(long = "compression", global = true, value_enum)]
    pub compression: Option<CompressionFormat>,

    /// Specify the delimiter to use when reading a CSV file
    #[arg(long = "delimiter", global = true)]
    pub delimiter: Option<u8>,

    /// Maximum number of points in the map sample
    #[arg(long = "map-sample-max", global = true, value_name = "N")]
    pub map_sample_max: Option<usize>,

    /// Maximum number of person ages returned by the age view
    #[arg(long = "age-row-max", global = true, value_name = "N")]
    pub age_row_max: Option<usize>,

    /// First year (inclusive) kept when loading
    #[arg(long = "year-min", global = true, value_name = "YEAR")]
    pub year_min: Option<i32>,

    /// Last year (inclusive) kept when loading
    #[arg(long = "year-max", global = true, value_name = "YEAR")]
    pub year_max: Option<i32>,

    /// Seed for the map sample; omit in config for a fresh sample per request
    #[arg(long = "seed", global = true)]
    pub seed: Option<u64>,

    /// Enable debug logging
    #[arg(long = "debug", global = true, action)]
    pub debug: bool,
}

#[derive(Clone, Subcommand, Debug)]
pub enum Command {
    /// Compute the summary and all chart views for a filter selection
    Report(ReportArgs),

    /// Print the filter option catalogs (boroughs, years, vehicle and person types)
    Options,

    /// Parse a free-text query and show the filters it resolves to
    Search {
        /// Text such as "Brooklyn 2022 pedestrian crashes"
        text: String,
    },

    /// Compress data files for storage or distribution
    Compress {
        /// Files to compress
        #[arg(required = true, num_args = 1.., value_name = "PATH")]
        paths: Vec<PathBuf>,

        /// Output compression format
        #[arg(long = "format", value_enum, default_value = "gzip")]
        format: CompressionFormat,

        /// Overwrite existing output files
        #[arg(long = "force", action)]
        force: bool,
    },

    /// Generate default configuration file at ~/.config/collision-dash/config.toml
    InitConfig {
        /// Force overwrite existing config file
        #[arg(long = "force", action)]
        force: bool,
    },
}

#[derive(Clone, clap::Args, Debug, Default)]
pub struct ReportArgs {
    /// Borough to include (repeatable, or ALL)
    #[arg(long = "borough", value_name = "NAME")]
    pub boroughs: Vec<String>,

    /// Year to include (repeatable, or ALL)
    #[arg(long = "year", value_name = "YEAR")]
    pub years: Vec<String>,

    /// Vehicle type to include (repeatable, or ALL)
    #[arg(long = "vehicle", value_name = "TYPE")]
    pub vehicle_types: Vec<String>,

    /// Person type to include (repeatable, or ALL)
    #[arg(long = "person-type", value_name = "TYPE")]
    pub person_types: Vec<String>,

    /// Free-text search merged over the explicit filters
    #[arg(long = "search", value_name = "TEXT")]
    pub search: Option<String>,

    /// Reset borough, year, vehicle and person filters to ALL before searching
    #[arg(long = "clear", action)]
    pub clear: bool,

    /// Pretty-print the JSON report
    #[arg(long = "pretty", action)]
    pub pretty: bool,
}

/// Escape `|` and newlines for use in markdown table cells.
fn escape_table_cell(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}

fn option_string(arg: &clap::Arg) -> String {
    let placeholder: String = arg
        .get_value_names()
        .map(|names| {
            names
                .iter()
                .map(|n: &clap::builder::Str| format!("<{}>", n.as_ref() as &str))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    if arg.is_positional() {
        return if arg.is_required_set() {
            placeholder
        } else {
            format!("[{placeholder}]")
        };
    }

    let mut parts = Vec::new();
    if let Some(s) = arg.get_short() {
        parts.push(format!("-{s}"));
    }
    if let Some(l) = arg.get_long() {
        parts.push(format!("--{l}"));
    }
    let op = parts.join(", ");
    if !arg.get_action().takes_values() || placeholder.is_empty() {
        op
    } else {
        format!("{op} {placeholder}")
    }
}

fn push_arguments(out: &mut String, cmd: &clap::Command) {
    out.push_str("| Option | Description |\n");
    out.push_str("|--------|-------------|\n");
    for arg in cmd.get_arguments() {
        let id = arg.get_id().as_ref().to_string();
        if id == "help" || id == "version" || (arg.is_global_set() && cmd.get_name() != "collision-dash")
        {
            continue;
        }
        let help = arg
            .get_help()
            .map(|h| escape_table_cell(&h.to_string()))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("| `{}` | {help} |\n", option_string(arg)));
    }
    out.push('\n');
}

/// Render command-line options as markdown, one table for the global
/// options and one per subcommand.
pub fn render_options_markdown() -> String {
    let mut cmd = Args::command();
    cmd.build();

    let mut out = String::from("# Command Line Options\n\n");

    out.push_str("## Usage\n\n```\n");
    let usage = cmd.render_usage();
    out.push_str(&usage.to_string());
    out.push_str("\n```\n\n");

    out.push_str("## Global Options\n\n");
    push_arguments(&mut out, &cmd);

    for sub in cmd.get_subcommands() {
        if sub.get_name() == "help" {
            continue;
        }
        out.push_str(&format!("## `{}`\n\n", sub.get_name()));
        if let Some(about) = sub.get_about() {
            out.push_str(&format!("{about}\n\n"));
        }
        push_arguments(&mut out, sub);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_detection() {
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv.gz")),
            Some(CompressionFormat::Gzip)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv.zst")),
            Some(CompressionFormat::Zstd)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv.bz2")),
            Some(CompressionFormat::Bzip2)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv.xz")),
            Some(CompressionFormat::Xz)
        );
        assert_eq!(
            CompressionFormat::from_extension(Path::new("file.csv")),
            None
        );
        assert_eq!(CompressionFormat::from_extension(Path::new("file")), None);
    }

    #[test]
    fn test_compression_names() {
        assert_eq!(CompressionFormat::from_name("gzip"), Some(CompressionFormat::Gzip));
        assert_eq!(CompressionFormat::from_name("BZIP2"), Some(CompressionFormat::Bzip2));
        assert_eq!(CompressionFormat::from_name("lz4"), None);
        assert_eq!(CompressionFormat::Gzip.extension(), "gz");
        assert_eq!(CompressionFormat::Zstd.extension(), "zst");
    }

    #[test]
    fn test_file_format_from_path() {
        assert_eq!(
            FileFormat::from_path(Path::new("crashes.parquet")),
            Some(FileFormat::Parquet)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("crashes.csv")),
            Some(FileFormat::Csv)
        );
        assert_eq!(
            FileFormat::from_path(Path::new("crashes.CSV.gz")),
            Some(FileFormat::Csv)
        );
        assert_eq!(FileFormat::from_path(Path::new("noext")), None);
        assert_eq!(FileFormat::from_path(Path::new("data.gz")), None);
    }

    #[test]
    fn test_backend_names() {
        for kind in [BackendKind::Memory, BackendKind::Lazy, BackendKind::Sampled] {
            assert_eq!(BackendKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(BackendKind::from_name("sql"), None);
    }

    #[test]
    fn test_parse_report_args() {
        let args = Args::try_parse_from([
            "collision-dash",
            "--crash",
            "crashes.csv",
            "report",
            "--borough",
            "BRONX",
            "--borough",
            "QUEENS",
            "--year",
            "2020",
            "--search",
            "pedestrian",
        ])
        .unwrap();
        assert_eq!(args.crash_path, Some(PathBuf::from("crashes.csv")));
        match args.command {
            Command::Report(report) => {
                assert_eq!(report.boroughs, vec!["BRONX", "QUEENS"]);
                assert_eq!(report.years, vec!["2020"]);
                assert!(report.vehicle_types.is_empty());
                assert_eq!(report.search.as_deref(), Some("pedestrian"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_markdown_lists_subcommands() {
        let md = render_options_markdown();
        assert!(md.contains("## `report`"));
        assert!(md.contains("## `compress`"));
        assert!(md.contains("--map-sample-max"));
    }
}
