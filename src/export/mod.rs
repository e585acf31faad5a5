use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod csv_exporter;
pub mod json_exporter;
pub mod table;

pub use table::{aggregate, OutputTable, TableAggregator, URL_COLUMN};

use crate::config::ExportConfig;
use crate::error::{HarvestError, HarvestResult};

/// Export manager for the supported output formats
pub struct ExportManager {
    compress: bool,
}

/// Export format enumeration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    /// Infer the format from a file extension, ignoring a trailing `.gz`
    pub fn from_path(path: &Path) -> Option<Self> {
        let path = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => path.with_extension(""),
            _ => path.to_path_buf(),
        };
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = HarvestError;

    fn from_str(s: &str) -> HarvestResult<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            _ => Err(HarvestError::export(format!("Invalid export format: {}", s))),
        }
    }
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Export statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportStats {
    pub format: ExportFormat,
    pub file_path: PathBuf,
    pub record_count: usize,
    pub column_count: usize,
    pub file_size_bytes: u64,
    pub export_duration_ms: u64,
    pub compression_ratio: Option<f64>,
}

/// Internal export result
#[derive(Debug)]
pub(crate) struct InternalExportStats {
    pub file_size_bytes: u64,
}

impl ExportManager {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            compress: config.compress,
        }
    }

    /// Write `table` to `output_path`, creating parent directories, then
    /// gzip the file when compression is enabled
    pub async fn export(
        &self,
        table: &OutputTable,
        output_path: &Path,
        format: ExportFormat,
    ) -> HarvestResult<ExportStats> {
        info!(
            "Exporting {} records ({} columns) to {} as {}",
            table.len(),
            table.columns.len(),
            output_path.display(),
            format
        );

        let start_time = std::time::Instant::now();

        if let Some(parent) = output_path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let stats = match format {
            ExportFormat::Csv => csv_exporter::export_csv(table, output_path).await?,
            ExportFormat::Json => json_exporter::export_json(table, output_path).await?,
        };

        let (file_path, file_size_bytes, compression_ratio) = if self.compress {
            let compressed = self.compress_file(output_path).await?;
            let compressed_size = tokio::fs::metadata(&compressed).await?.len();
            let ratio = (stats.file_size_bytes > 0)
                .then(|| compressed_size as f64 / stats.file_size_bytes as f64);
            (compressed, compressed_size, ratio)
        } else {
            (output_path.to_path_buf(), stats.file_size_bytes, None)
        };

        let final_stats = ExportStats {
            format,
            file_path,
            record_count: table.len(),
            column_count: table.columns.len(),
            file_size_bytes,
            export_duration_ms: start_time.elapsed().as_millis() as u64,
            compression_ratio,
        };

        info!(
            "Export completed: {} records in {}ms, file size: {} bytes",
            final_stats.record_count, final_stats.export_duration_ms, final_stats.file_size_bytes
        );

        Ok(final_stats)
    }

    /// `Headphones.csv` -> `Headphones_20240601_153000.csv`
    pub fn timestamped_path(path: &Path, at: DateTime<Utc>) -> PathBuf {
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "export".to_string());
        let mut name = format!("{}_{}", stem, at.format("%Y%m%d_%H%M%S"));
        if let Some(ext) = path.extension() {
            name.push('.');
            name.push_str(&ext.to_string_lossy());
        }
        path.with_file_name(name)
    }

    /// Replace `file_path` with a gzip-compressed `<file_path>.gz`
    pub async fn compress_file(&self, file_path: &Path) -> HarvestResult<PathBuf> {
        let mut compressed_path = file_path.as_os_str().to_owned();
        compressed_path.push(".gz");
        let compressed_path = PathBuf::from(compressed_path);

        let data = tokio::fs::read(file_path).await?;
        let compressed_data = compress_data(&data)?;
        tokio::fs::write(&compressed_path, compressed_data).await?;
        tokio::fs::remove_file(file_path).await?;

        info!("File compressed: {} -> {}", file_path.display(), compressed_path.display());
        Ok(compressed_path)
    }
}

/// Compress data using gzip
fn compress_data(data: &[u8]) -> HarvestResult<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
