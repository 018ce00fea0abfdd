use crate::error::{EtlError, Result};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;
use tracing::info;

/// A raw tabular record set read from a source file. Rows are JSON objects
/// keyed by column name; CSV cells arrive as strings (empty cells as null),
/// JSON files keep their native scalar types.
#[derive(Debug, Clone)]
pub struct RawTable {
    /// Column names in file order (union of keys for JSON sources)
    pub columns: Vec<String>,
    pub rows: Vec<Map<String, Value>>,
}

/// Reads a source file into a [`RawTable`], dispatching on the file extension.
/// Only `.csv` and `.json` sources are supported.
pub fn read_table(path: &Path) -> Result<RawTable> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match extension.as_str() {
        "csv" => read_csv(path)?,
        "json" => read_json(path)?,
        other => {
            return Err(EtlError::Config(format!(
                "File extension '{}' not supported for source '{}'",
                other,
                path.display()
            )))
        }
    };

    info!(
        "Extracted {} records ({} columns) from {}",
        table.rows.len(),
        table.columns.len(),
        path.display()
    );
    Ok(table)
}

fn read_csv(path: &Path) -> Result<RawTable> {
    let mut reader = csv::Reader::from_path(path)?;

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut row = Map::new();
        for (column, cell) in columns.iter().zip(record.iter()) {
            // Empty cells are missing values, not empty strings
            let value = if cell.is_empty() {
                Value::Null
            } else {
                Value::String(cell.to_string())
            };
            row.insert(column.clone(), value);
        }
        rows.push(row);
    }

    Ok(RawTable { columns, rows })
}

fn read_json(path: &Path) -> Result<RawTable> {
    let content = fs::read_to_string(path)?;
    let rows: Vec<Map<String, Value>> = serde_json::from_str(&content)?;

    // JSON rows may omit keys; the column set is the union in first-seen order
    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
    }

    Ok(RawTable { columns, rows })
}
