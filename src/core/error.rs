// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Error kinds shared by the engine, the REST layer and the client.
//!
//! Every variant carries a message that names the offending field, filter or
//! collection. The enum is serde-serializable so the HTTP API can ship it to
//! the client unchanged.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DbError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Unknown field: {0}")]
    UnknownField(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not loaded: {0}")]
    NotLoaded(String),

    #[error("Dimension mismatch for field '{field}': expected {expected}, got {actual}")]
    DimensionMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Closed: {0}")]
    Closed(String),

    #[error("Missing index: {0}")]
    MissingIndex(String),

    #[error("Duplicate field: {0}")]
    DuplicateField(String),

    #[error("Invalid constraint: {0}")]
    InvalidConstraint(String),

    #[error("Incompatible metric: {0}")]
    IncompatibleMetric(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DbError {
    /// Stable numeric code used on the wire.
    pub fn code(&self) -> u16 {
        match self {
            DbError::Validation(_) => 1100,
            DbError::Schema(_) => 1101,
            DbError::UnknownField(_) => 1102,
            DbError::UnknownCollection(_) => 1103,
            DbError::NotFound(_) => 1104,
            DbError::AlreadyExists(_) => 1105,
            DbError::NotLoaded(_) => 1106,
            DbError::DimensionMismatch { .. } => 1107,
            DbError::PermissionDenied(_) => 1108,
            DbError::Unavailable(_) => 1109,
            DbError::UnsupportedOperation(_) => 1110,
            DbError::Closed(_) => 1111,
            DbError::MissingIndex(_) => 1112,
            DbError::DuplicateField(_) => 1113,
            DbError::InvalidConstraint(_) => 1114,
            DbError::IncompatibleMetric(_) => 1115,
            DbError::InvalidState(_) => 1116,
            DbError::Internal(_) => 1199,
        }
    }

    pub fn unknown_collection(name: &str) -> Self {
        DbError::UnknownCollection(format!("collection '{}' does not exist", name))
    }

    /// True for errors the transport may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::Unavailable(_))
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Validation(format!("malformed JSON payload: {}", e))
    }
}
