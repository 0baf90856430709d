// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Bulk-import jobs and file decoding
//!
//! A file set is either one row-based JSON file (`{"rows": [...]}`) or one
//! column file per field, named `<field>.json` (a JSON array) or
//! `<field>.cbor` (a CBOR array).

use crate::core::error::{DbError, DbResult};
use crate::core::mutation::columns_to_rows;
use crate::core::types::Row;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason")]
pub enum ImportState {
    Pending,
    Importing,
    Completed,
    Failed(String),
}

impl ImportState {
    pub fn is_finished(&self) -> bool {
        matches!(self, ImportState::Completed | ImportState::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: String,
    pub collection_name: String,
    #[serde(default)]
    pub partition_name: Option<String>,
    pub files: Vec<Vec<String>>,
    pub state: ImportState,
    /// Percent of file sets processed.
    pub progress: u32,
    pub imported_rows: usize,
    pub created_at: DateTime<Utc>,
}

impl ImportJob {
    pub fn new(collection_name: &str, partition_name: Option<String>, files: Vec<Vec<String>>) -> Self {
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            collection_name: collection_name.to_string(),
            partition_name,
            files,
            state: ImportState::Pending,
            progress: 0,
            imported_rows: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Json,
    Cbor,
}

/// Split `path/to/field.ext` into (`field`, format).
fn classify(key: &str) -> DbResult<(&str, FileFormat)> {
    let file = key.rsplit('/').next().unwrap_or(key);
    let (stem, ext) = file.rsplit_once('.').ok_or_else(|| {
        DbError::Validation(format!("import file '{}' has no extension", key))
    })?;
    let format = match ext.to_ascii_lowercase().as_str() {
        "json" => FileFormat::Json,
        "cbor" => FileFormat::Cbor,
        other => {
            return Err(DbError::UnsupportedOperation(format!(
                "import file '{}': unsupported format '.{}'",
                key, other
            )))
        }
    };
    Ok((stem, format))
}

fn decode(key: &str, format: FileFormat, bytes: &[u8]) -> DbResult<Value> {
    match format {
        FileFormat::Json => serde_json::from_slice(bytes)
            .map_err(|e| DbError::Validation(format!("import file '{}': {}", key, e))),
        FileFormat::Cbor => serde_cbor::from_slice(bytes)
            .map_err(|e| DbError::Validation(format!("import file '{}': {}", key, e))),
    }
}

/// Decode one file set into rows.
pub fn decode_file_set(files: &[(String, Vec<u8>)]) -> DbResult<Vec<Row>> {
    if let [(key, bytes)] = files {
        let (_, format) = classify(key)?;
        let value = decode(key, format, bytes)?;
        if let Some(rows) = value.get("rows") {
            return rows_from_value(key, rows);
        }
    }

    let mut columns = Map::new();
    for (key, bytes) in files {
        let (field, format) = classify(key)?;
        let value = decode(key, format, bytes)?;
        if !value.is_array() {
            return Err(DbError::Validation(format!(
                "import file '{}' must hold an array of values",
                key
            )));
        }
        columns.insert(field.to_string(), value);
    }
    columns_to_rows(&columns)
}

fn rows_from_value(key: &str, rows: &Value) -> DbResult<Vec<Row>> {
    let items = rows.as_array().ok_or_else(|| {
        DbError::Validation(format!("import file '{}': \"rows\" must be an array", key))
    })?;
    items
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row.as_object().cloned().ok_or_else(|| {
                DbError::Validation(format!("import file '{}': row {} is not an object", key, i))
            })
        })
        .collect()
}
