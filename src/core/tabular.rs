use crate::domain::model::{Fields, FlatRecord};
use crate::domain::ports::TabularLoader;
use crate::utils::error::{HarvestError, Result};
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;

/// Rows rendered as text, ready for a delimited writer.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Columns first seen outside the sample window.
    pub dropped_columns: Vec<String>,
}

/// Turns flat records into a delimited file.
///
/// Column order follows the first record; columns first seen in later
/// records of the sample window are appended in first-seen order. Columns
/// that only show up beyond the window are dropped with a warning.
#[derive(Debug, Clone)]
pub struct TabularExporter {
    field_delimiter: u8,
    sample_window: Option<usize>,
}

impl Default for TabularExporter {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl TabularExporter {
    pub fn new(field_delimiter: u8) -> Self {
        Self {
            field_delimiter,
            sample_window: None,
        }
    }

    pub fn with_sample_window(mut self, window: Option<usize>) -> Self {
        self.sample_window = window.map(|w| w.max(1));
        self
    }

    /// Returns `(columns, dropped_columns)`.
    pub fn columns(&self, records: &[FlatRecord]) -> (Vec<String>, Vec<String>) {
        let window = self.sample_window.unwrap_or(records.len()).min(records.len());
        let mut seen = HashSet::new();
        let mut columns = Vec::new();

        for record in &records[..window] {
            for key in record.columns() {
                if seen.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }

        let mut dropped = Vec::new();
        for record in &records[window..] {
            for key in record.columns() {
                if seen.insert(key.as_str()) {
                    dropped.push(key.clone());
                }
            }
        }

        if !dropped.is_empty() {
            tracing::warn!(
                "⚠️ {} column(s) outside the sample window of {} record(s) were dropped: {}",
                dropped.len(),
                window,
                dropped.join(", ")
            );
        }

        (columns, dropped)
    }

    pub fn to_table(&self, records: &[FlatRecord]) -> Table {
        let (columns, dropped_columns) = self.columns(records);
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| record.get(column).map(cell_text).unwrap_or_default())
                    .collect()
            })
            .collect();

        Table {
            columns,
            rows,
            dropped_columns,
        }
    }

    pub fn to_csv_string(&self, records: &[FlatRecord]) -> Result<String> {
        let table = self.to_table(records);
        let bytes = self.write_table(&table, Vec::new())?;
        String::from_utf8(bytes).map_err(|e| HarvestError::processing(e.to_string()))
    }

    /// Writes `records` to `path`, returning the table that was written.
    pub fn write_csv_file(&self, records: &[FlatRecord], path: &Path) -> Result<Table> {
        let table = self.to_table(records);
        let file = std::fs::File::create(path)?;
        self.write_table(&table, file)?;
        tracing::debug!(
            "Wrote {} rows x {} columns to {}",
            table.rows.len(),
            table.columns.len(),
            path.display()
        );
        Ok(table)
    }

    fn write_table<W: std::io::Write>(&self, table: &Table, sink: W) -> Result<W> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.field_delimiter)
            .from_writer(sink);

        // 沒有欄位時不寫任何列
        if !table.columns.is_empty() {
            writer.write_record(&table.columns)?;
            for row in &table.rows {
                writer.write_record(row)?;
            }
        }
        writer
            .into_inner()
            .map_err(|e| HarvestError::IoError(e.into_error()))
    }
}

/// Text form of a single cell; null becomes an empty string.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        nested => nested.to_string(),
    }
}

/// Reads delimited files back as flat records of strings.
#[derive(Debug, Clone)]
pub struct CsvLoader {
    field_delimiter: u8,
}

impl Default for CsvLoader {
    fn default() -> Self {
        Self { field_delimiter: b',' }
    }
}

impl CsvLoader {
    pub fn new(field_delimiter: u8) -> Self {
        Self { field_delimiter }
    }
}

impl TabularLoader for CsvLoader {
    fn load(&self, path: &Path) -> Result<Vec<FlatRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(self.field_delimiter)
            .from_path(path)?;

        let headers = reader.headers()?.clone();
        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let fields: Fields = headers
                .iter()
                .zip(row.iter())
                .map(|(column, cell)| (column.to_string(), Value::String(cell.to_string())))
                .collect();
            records.push(FlatRecord::new(fields));
        }

        tracing::debug!("Loaded {} rows from {}", records.len(), path.display());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn flat(value: Value) -> FlatRecord {
        FlatRecord::new(value.as_object().cloned().unwrap())
    }

    #[test]
    fn test_columns_from_representative_then_union() {
        let records = vec![
            flat(json!({"id": 1, "title": "A"})),
            flat(json!({"id": 2, "doi": "10.1/x"})),
        ];

        let table = TabularExporter::default().to_table(&records);

        assert_eq!(table.columns, vec!["id", "title", "doi"]);
        assert_eq!(table.rows[0], vec!["1", "A", ""]);
        assert_eq!(table.rows[1], vec!["2", "", "10.1/x"]);
        assert!(table.dropped_columns.is_empty());
    }

    #[test]
    fn test_columns_beyond_window_are_dropped() {
        let records = vec![
            flat(json!({"id": 1})),
            flat(json!({"id": 2, "late": true})),
        ];

        let table = TabularExporter::default()
            .with_sample_window(Some(1))
            .to_table(&records);

        assert_eq!(table.columns, vec!["id"]);
        assert_eq!(table.dropped_columns, vec!["late"]);
        assert_eq!(table.rows[1], vec!["2"]);
    }

    #[test]
    fn test_csv_rendering_of_values() {
        let records = vec![flat(json!({
            "name": "Smith, J.",
            "charged": false,
            "amount": 1.5,
            "missing": null,
            "tags": ["a", "b"]
        }))];

        let csv = TabularExporter::default().to_csv_string(&records).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "name,charged,amount,missing,tags");
        assert_eq!(lines[1], r#""Smith, J.",false,1.5,,"[""a"",""b""]""#);
    }

    #[test]
    fn test_empty_collection_writes_empty_header() {
        let csv = TabularExporter::default().to_csv_string(&[]).unwrap();
        assert_eq!(csv.trim(), "");
    }

    #[test]
    fn test_tab_delimited_file_round_trip_through_loader() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("report.tsv");
        let records = vec![
            flat(json!({"header.id": "m1", "data.doi": "10.1/a"})),
            flat(json!({"header.id": "m2"})),
        ];

        TabularExporter::new(b'\t')
            .write_csv_file(&records, &path)
            .unwrap();
        let loaded = CsvLoader::new(b'\t').load(&path).unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].get("data.doi"), Some(&json!("10.1/a")));
        assert_eq!(loaded[1].get("data.doi"), Some(&json!("")));
    }
}
