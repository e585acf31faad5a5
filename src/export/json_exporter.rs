use serde_json::{Map, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, info};

use super::table::OutputTable;
use super::InternalExportStats;
use crate::error::HarvestResult;

/// One JSON object per row, keys in column order, `null` for missing cells
pub fn table_to_json(table: &OutputTable) -> Value {
    let rows = table
        .rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = table
                .columns
                .iter()
                .zip(row)
                .map(|(column, cell)| {
                    let value = cell
                        .as_text()
                        .map(|text| Value::String(text.to_string()))
                        .unwrap_or(Value::Null);
                    (column.clone(), value)
                })
                .collect();
            Value::Object(object)
        })
        .collect();

    Value::Array(rows)
}

/// Export the table as a pretty-printed JSON array
pub async fn export_json(
    table: &OutputTable,
    output_path: &Path,
) -> HarvestResult<InternalExportStats> {
    debug!("Exporting {} records to JSON: {}", table.len(), output_path.display());

    let file = File::create(output_path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &table_to_json(table))?;
    writer.flush()?;
    drop(writer);

    let file_size = tokio::fs::metadata(output_path).await?.len();

    info!("JSON export completed: {} records, {} bytes", table.len(), file_size);

    Ok(InternalExportStats {
        file_size_bytes: file_size,
    })
}
