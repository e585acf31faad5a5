use csv::WriterBuilder;
use std::path::Path;
use tracing::{debug, info};

use super::table::OutputTable;
use super::InternalExportStats;
use crate::error::HarvestResult;

/// Write the table as CSV: a header row, then one row per record with
/// missing cells left empty
pub async fn export_csv(
    table: &OutputTable,
    output_path: &Path,
) -> HarvestResult<InternalExportStats> {
    debug!("Exporting {} records to CSV: {}", table.len(), output_path.display());

    let file = std::fs::File::create(output_path)?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);

    if !table.columns.is_empty() {
        writer.write_record(&table.columns)?;
    }

    for row in &table.rows {
        writer.write_record(row.iter().map(|cell| cell.to_cell()))?;
    }

    writer.flush()?;
    drop(writer);

    let file_size = tokio::fs::metadata(output_path).await?.len();

    info!("CSV export completed: {} records, {} bytes", table.len(), file_size);

    Ok(InternalExportStats {
        file_size_bytes: file_size,
    })
}
