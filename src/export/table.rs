//! Merges heterogeneous product records into one rectangular table.

use indexmap::IndexSet;
use serde::Serialize;

use crate::extract::field::FieldValue;
use crate::extract::record::{ProductRecord, ERROR_COLUMN};

pub const URL_COLUMN: &str = "URL";

/// Rectangular output: the union of every record's keys as columns, one row
/// per record, `Missing` where a record lacks a column
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OutputTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<FieldValue>>,
}

impl OutputTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Cell at `row`/`column`, if both exist
    pub fn cell(&self, row: usize, column: &str) -> Option<&FieldValue> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|cells| cells.get(index))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TableAggregator {
    /// Put the product URL in a leading `URL` column
    pub include_source_url: bool,
    /// Keep the `Error` column carrying failure reasons
    pub include_status: bool,
}

impl Default for TableAggregator {
    fn default() -> Self {
        Self {
            include_source_url: false,
            include_status: true,
        }
    }
}

impl TableAggregator {
    pub fn new(include_source_url: bool, include_status: bool) -> Self {
        Self {
            include_source_url,
            include_status,
        }
    }

    fn record_cells(&self, record: &ProductRecord) -> Vec<(String, FieldValue)> {
        let mut cells = Vec::new();
        if self.include_source_url {
            cells.push((URL_COLUMN.to_string(), FieldValue::text(record.url.clone())));
        }
        cells.extend(record.data_cells());
        if self.include_status {
            if let Some(reason) = record.failure_reason() {
                cells.push((ERROR_COLUMN.to_string(), FieldValue::text(reason)));
            }
        }
        cells
    }

    pub fn aggregate(&self, records: &[ProductRecord]) -> OutputTable {
        let per_record: Vec<Vec<(String, FieldValue)>> =
            records.iter().map(|record| self.record_cells(record)).collect();

        let mut columns: IndexSet<String> = IndexSet::new();
        for cells in &per_record {
            for (key, _) in cells {
                if !columns.contains(key) {
                    columns.insert(key.clone());
                }
            }
        }

        let rows = per_record
            .into_iter()
            .map(|cells| {
                let mut row = vec![FieldValue::Missing; columns.len()];
                for (key, value) in cells {
                    if let Some(index) = columns.get_index_of(&key) {
                        row[index] = value;
                    }
                }
                row
            })
            .collect();

        OutputTable {
            columns: columns.into_iter().collect(),
            rows,
        }
    }
}

/// Aggregate with default options
pub fn aggregate(records: &[ProductRecord]) -> OutputTable {
    TableAggregator::default().aggregate(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::reviews::ReviewEntry;

    #[test]
    fn test_schema_is_first_seen_union() {
        let records = vec![
            ProductRecord::from_fields("https://shop.test/1", [("x", Some("1".to_string()))]),
            ProductRecord::from_fields("https://shop.test/2", [("y", Some("2".to_string()))]),
        ];

        let table = aggregate(&records);

        assert_eq!(table.columns, vec!["x", "y"]);
        assert_eq!(
            table.rows,
            vec![
                vec![FieldValue::text("1"), FieldValue::Missing],
                vec![FieldValue::Missing, FieldValue::text("2")],
            ]
        );
    }

    #[test]
    fn test_empty_string_is_not_missing() {
        let records = vec![ProductRecord::from_fields(
            "https://shop.test/1",
            [("a", Some(String::new())), ("b", None)],
        )];
        let table = aggregate(&records);
        assert_eq!(table.cell(0, "a"), Some(&FieldValue::text("")));
        assert_eq!(table.cell(0, "b"), Some(&FieldValue::Missing));
    }

    #[test]
    fn test_reviews_error_and_url_columns() {
        let mut ok =
            ProductRecord::from_fields("https://shop.test/1", [("Title", Some("A".to_string()))]);
        ok.reviews = Some(vec![ReviewEntry {
            reviewer: FieldValue::text("Ann"),
            rating: FieldValue::text("5.0"),
            date: FieldValue::Missing,
            body: FieldValue::text("Nice"),
        }]);
        let failed = ProductRecord::failed("https://shop.test/2", ["Title"], "Page load failed");

        let table = TableAggregator::new(true, true).aggregate(&[ok.clone(), failed.clone()]);
        assert_eq!(table.columns, vec!["URL", "Title", "reviews", "Error"]);
        assert_eq!(table.cell(1, "URL"), Some(&FieldValue::text("https://shop.test/2")));
        assert_eq!(table.cell(0, "Error"), Some(&FieldValue::Missing));
        assert!(table.cell(0, "reviews").unwrap().to_cell().contains(r#""Reviewer":"Ann""#));
        assert_eq!(table.cell(1, "reviews"), Some(&FieldValue::Missing));

        let table = TableAggregator::new(false, false).aggregate(&[ok, failed]);
        assert_eq!(table.columns, vec!["Title", "reviews"]);
    }

    #[test]
    fn test_specification_named_error_survives_without_status_column() {
        let mut record =
            ProductRecord::from_fields("https://shop.test/1", [("Title", Some("A".to_string()))]);
        record.merge_specifications([("Error".to_string(), "±0.5 dB".to_string())]);
        let failed = ProductRecord::failed("https://shop.test/2", ["Title"], "Page load failed");

        let table = TableAggregator::new(false, false).aggregate(&[record, failed]);

        assert_eq!(table.columns, vec!["Title", "Error"]);
        assert_eq!(table.cell(0, "Error"), Some(&FieldValue::text("±0.5 dB")));
        assert_eq!(table.cell(1, "Error"), Some(&FieldValue::Missing));
    }

    #[test]
    fn test_no_records_gives_empty_table() {
        let table = aggregate(&[]);
        assert!(table.is_empty());
        assert!(table.columns.is_empty());
    }
}
