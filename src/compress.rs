//! Re-encode data files for storage and report what was saved.

use crate::cli::CompressionFormat;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

const MB: f64 = 1024.0 * 1024.0;
/// Total compressed size that fits comfortably in a source repository
pub const REPOSITORY_LIMIT_MB: f64 = 100.0;
/// Above this even large-file storage is a poor fit
pub const LARGE_FILE_LIMIT_MB: f64 = 500.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub format: &'static str,
    pub original_bytes: u64,
    pub compressed_bytes: u64,
}

impl CompressionReport {
    pub fn saved_percent(&self) -> f64 {
        if self.original_bytes == 0 {
            return 0.0;
        }
        (1.0 - self.compressed_bytes as f64 / self.original_bytes as f64) * 100.0
    }
}

/// Where compressed files of a given total size can reasonably live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageAdvice {
    /// Small enough to commit directly
    Repository,
    /// Needs large-file storage or release assets
    LargeFileStorage,
    /// Too large; keep a sampled extract or external storage
    External,
}

impl StorageAdvice {
    pub fn for_total(compressed_bytes: u64) -> Self {
        let mb = compressed_bytes as f64 / MB;
        if mb < REPOSITORY_LIMIT_MB {
            StorageAdvice::Repository
        } else if mb < LARGE_FILE_LIMIT_MB {
            StorageAdvice::LargeFileStorage
        } else {
            StorageAdvice::External
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            StorageAdvice::Repository => "small enough to commit directly",
            StorageAdvice::LargeFileStorage => {
                "large; use large-file storage or attach the files to a release"
            }
            StorageAdvice::External => {
                "too large for a repository; use a sampled extract or external storage"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionSummary {
    pub files: Vec<CompressionReport>,
    pub total_compressed_bytes: u64,
    pub advice: StorageAdvice,
}

impl CompressionSummary {
    pub fn new(files: Vec<CompressionReport>) -> Self {
        let total_compressed_bytes = files.iter().map(|f| f.compressed_bytes).sum();
        Self {
            files,
            total_compressed_bytes,
            advice: StorageAdvice::for_total(total_compressed_bytes),
        }
    }
}

/// Output path: the source path with the format's extension appended
pub fn output_path(source: &Path, format: CompressionFormat) -> PathBuf {
    let mut name = source.as_os_str().to_os_string();
    name.push(".");
    name.push(format.extension());
    PathBuf::from(name)
}

/// Compress `source` next to itself. Refuses to overwrite unless `force`.
pub fn compress_file(source: &Path, format: CompressionFormat, force: bool) -> Result<CompressionReport> {
    if !source.is_file() {
        return Err(eyre!("{} not found", source.display()));
    }
    if CompressionFormat::from_extension(source).is_some() {
        return Err(eyre!("{} is already compressed", source.display()));
    }
    let output = output_path(source, format);
    if output.exists() && !force {
        return Err(eyre!(
            "{} already exists. Use --force to overwrite.",
            output.display()
        ));
    }

    let mut reader = BufReader::new(File::open(source)?);
    let writer = BufWriter::new(File::create(&output)?);
    match format {
        CompressionFormat::Gzip => {
            let mut encoder = flate2::write::GzEncoder::new(writer, flate2::Compression::default());
            std::io::copy(&mut reader, &mut encoder)?;
            encoder.finish()?.flush()?;
        }
        CompressionFormat::Zstd => {
            let mut encoder = zstd::Encoder::new(writer, 0)?;
            std::io::copy(&mut reader, &mut encoder)?;
            encoder.finish()?.flush()?;
        }
        CompressionFormat::Bzip2 => {
            let mut encoder = bzip2::write::BzEncoder::new(writer, bzip2::Compression::default());
            std::io::copy(&mut reader, &mut encoder)?;
            encoder.finish()?.flush()?;
        }
        CompressionFormat::Xz => {
            let mut encoder = xz2::write::XzEncoder::new(writer, 6);
            std::io::copy(&mut reader, &mut encoder)?;
            encoder.finish()?.flush()?;
        }
    }

    let report = CompressionReport {
        source: source.to_path_buf(),
        format: format.extension(),
        original_bytes: std::fs::metadata(source)?.len(),
        compressed_bytes: std::fs::metadata(&output)?.len(),
        output,
    };
    log::info!(
        "{} -> {}: {:.1} MB -> {:.1} MB ({:.1}% saved)",
        report.source.display(),
        report.output.display(),
        report.original_bytes as f64 / MB,
        report.compressed_bytes as f64 / MB,
        report.saved_percent()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn write_csv(dir: &Path) -> PathBuf {
        let path = dir.join("crashes.csv");
        let mut body = String::from("CRASH DATE,BOROUGH\n");
        for i in 0..500 {
            body.push_str(&format!("2021-01-{:02},BROOKLYN\n", i % 28 + 1));
        }
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn gzip_round_trips_and_shrinks() {
        let dir = TempDir::new().unwrap();
        let source = write_csv(dir.path());
        let report = compress_file(&source, CompressionFormat::Gzip, false).unwrap();
        assert_eq!(report.output, dir.path().join("crashes.csv.gz"));
        assert!(report.compressed_bytes < report.original_bytes);
        assert!(report.saved_percent() > 0.0);

        let mut decoded = String::new();
        flate2::read::GzDecoder::new(File::open(&report.output).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, std::fs::read_to_string(&source).unwrap());
    }

    #[test]
    fn existing_output_needs_force() {
        let dir = TempDir::new().unwrap();
        let source = write_csv(dir.path());
        compress_file(&source, CompressionFormat::Zstd, false).unwrap();
        let err = compress_file(&source, CompressionFormat::Zstd, false).unwrap_err();
        assert!(err.to_string().contains("--force"));
        assert!(compress_file(&source, CompressionFormat::Zstd, true).is_ok());
    }

    #[test]
    fn compressed_input_is_rejected() {
        let dir = TempDir::new().unwrap();
        let source = write_csv(dir.path());
        let report = compress_file(&source, CompressionFormat::Xz, false).unwrap();
        assert!(compress_file(&report.output, CompressionFormat::Gzip, false).is_err());
    }

    #[test]
    fn storage_advice_tiers() {
        let mb = MB as u64;
        assert_eq!(StorageAdvice::for_total(99 * mb), StorageAdvice::Repository);
        assert_eq!(StorageAdvice::for_total(100 * mb), StorageAdvice::LargeFileStorage);
        assert_eq!(StorageAdvice::for_total(499 * mb), StorageAdvice::LargeFileStorage);
        assert_eq!(StorageAdvice::for_total(500 * mb), StorageAdvice::External);
    }

    #[test]
    fn summary_totals_files() {
        let report = |compressed| CompressionReport {
            source: PathBuf::from("a.csv"),
            output: PathBuf::from("a.csv.gz"),
            format: "gz",
            original_bytes: 10,
            compressed_bytes: compressed,
        };
        let summary = CompressionSummary::new(vec![report(3), report(4)]);
        assert_eq!(summary.total_compressed_bytes, 7);
        assert_eq!(summary.advice, StorageAdvice::Repository);
        assert!((summary.files[0].saved_percent() - 70.0).abs() < 1e-9);
    }
}
