// src/extracts.rs
//
// Data-loader boundary. The engine itself only sees already-materialized
// rows; this module supplies them from an extract directory holding one
// CSV or JSON file per mirrored Gripp table. Anything that can produce
// `RawRow`s (a live database, a cache, a test fixture) can stand in via
// the `TableSource` trait.

use serde_json::Value;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::normalize::RawRow;

pub const TABLE_TIME_ENTRIES: &str = "urenregistratie";
pub const TABLE_PROJECT_LINES: &str = "projectlines";
pub const TABLE_PROJECTS: &str = "projects";
pub const TABLE_COMPANIES: &str = "companies";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("File I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV parsing failed for {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("JSON parsing failed for {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON extract {path} is not an array of objects")]
    JsonShape { path: PathBuf },
    #[error("No extract found for table '{table}' in {dir} (expected {table}.json or {table}.csv)")]
    MissingTable { table: String, dir: PathBuf },
}

pub trait TableSource {
    fn load_table(&self, table: &str) -> Result<Vec<RawRow>, ExtractError>;
}

/// Loads tables from `<dir>/<table>.json` or `<dir>/<table>.csv`,
/// preferring JSON when both exist (it preserves value types).
pub struct ExtractDir {
    dir: PathBuf,
}

impl ExtractDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl TableSource for ExtractDir {
    fn load_table(&self, table: &str) -> Result<Vec<RawRow>, ExtractError> {
        let json_path = self.dir.join(format!("{}.json", table));
        if json_path.is_file() {
            debug!("Loading table '{}' from {}", table, json_path.display());
            let rows = load_json_rows(&json_path)?;
            info!("Loaded {} rows for table '{}' (json)", rows.len(), table);
            return Ok(rows);
        }
        let csv_path = self.dir.join(format!("{}.csv", table));
        if csv_path.is_file() {
            debug!("Loading table '{}' from {}", table, csv_path.display());
            let file = File::open(&csv_path).map_err(|source| ExtractError::Io {
                path: csv_path.clone(),
                source,
            })?;
            let rows = rows_from_csv(file, &csv_path)?;
            info!("Loaded {} rows for table '{}' (csv)", rows.len(), table);
            return Ok(rows);
        }
        Err(ExtractError::MissingTable {
            table: table.to_string(),
            dir: self.dir.clone(),
        })
    }
}

fn load_json_rows(path: &Path) -> Result<Vec<RawRow>, ExtractError> {
    let mut raw = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut raw))
        .map_err(|source| ExtractError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let value: Value = serde_json::from_str(&raw).map_err(|source| ExtractError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let Value::Array(items) = value else {
        return Err(ExtractError::JsonShape {
            path: path.to_path_buf(),
        });
    };
    items
        .into_iter()
        .map(|item| match item {
            Value::Object(row) => Ok(row),
            _ => Err(ExtractError::JsonShape {
                path: path.to_path_buf(),
            }),
        })
        .collect()
}

/// CSV rows become maps of header -> string value; empty cells become
/// nulls so the normalizer treats them as absent rather than "".
fn rows_from_csv<R: Read>(reader: R, path: &Path) -> Result<Vec<RawRow>, ExtractError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader
        .headers()
        .map_err(|source| ExtractError::Csv {
            path: path.to_path_buf(),
            source,
        })?
        .clone();

    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(|source| ExtractError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let mut row = RawRow::new();
        for (header, field) in headers.iter().zip(record.iter()) {
            let value = if field.is_empty() {
                Value::Null
            } else {
                Value::String(field.to_string())
            };
            row.insert(header.to_string(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csv_rows_keep_strings_and_null_out_empties() {
        let data = "id,amount,unit\n1,12.5,Uur\n2,,stuk\n";
        let rows = rows_from_csv(data.as_bytes(), Path::new("test.csv")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], Value::String("1".to_string()));
        assert_eq!(rows[0]["amount"], Value::String("12.5".to_string()));
        assert_eq!(rows[1]["amount"], Value::Null, "empty cell must be null");
        assert_eq!(rows[1]["unit"], Value::String("stuk".to_string()));
    }

    #[test]
    fn test_missing_table_is_a_descriptive_error() {
        let source = ExtractDir::new("/nonexistent-extract-dir");
        let err = source.load_table("urenregistratie").unwrap_err();
        assert!(matches!(err, ExtractError::MissingTable { .. }));
        assert!(err.to_string().contains("urenregistratie"));
    }
}
