// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Index descriptors
//!
//! The engine searches exhaustively, so an index here is a declaration: it
//! fixes the metric used for a vector field and gates `load()`.

use crate::core::error::{DbError, DbResult};
use crate::core::schema::CollectionSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IndexType {
    #[serde(rename = "AUTOINDEX")]
    AutoIndex,
    Flat,
    IvfFlat,
    IvfSq8,
    IvfPq,
    Hnsw,
    #[serde(rename = "DISKANN")]
    DiskAnn,
    StlSort,
    Trie,
    Inverted,
}

impl IndexType {
    pub fn is_vector_index(&self) -> bool {
        matches!(
            self,
            IndexType::AutoIndex
                | IndexType::Flat
                | IndexType::IvfFlat
                | IndexType::IvfSq8
                | IndexType::IvfPq
                | IndexType::Hnsw
                | IndexType::DiskAnn
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricType {
    L2,
    IP,
    Cosine,
}

impl MetricType {
    /// Smaller distance is better for L2, larger score for IP/COSINE.
    pub fn higher_is_better(&self) -> bool {
        !matches!(self, MetricType::L2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub field_name: String,
    pub index_name: String,
    pub index_type: IndexType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_type: Option<MetricType>,
    #[serde(default)]
    pub params: Value,
}

impl IndexDescriptor {
    /// Check this descriptor against a schema.
    pub fn validate(&self, schema: &CollectionSchema) -> DbResult<()> {
        let field = schema.field(&self.field_name).ok_or_else(|| {
            DbError::UnknownField(format!(
                "cannot index '{}': field is not declared",
                self.field_name
            ))
        })?;

        let is_vector = field.data_type.is_vector();
        match (is_vector, self.metric_type) {
            (true, None) => Err(DbError::IncompatibleMetric(format!(
                "vector field '{}' requires a metric type",
                self.field_name
            ))),
            (false, Some(metric)) => Err(DbError::IncompatibleMetric(format!(
                "metric {:?} given for scalar field '{}'",
                metric, self.field_name
            ))),
            _ if is_vector != self.index_type.is_vector_index() => {
                Err(DbError::InvalidConstraint(format!(
                    "index type {:?} cannot be built on field '{}' ({})",
                    self.index_type,
                    self.field_name,
                    field.data_type.type_name()
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Pending index descriptors, one per field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexParams {
    pub indexes: Vec<IndexDescriptor>,
}

impl IndexParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the descriptor for `field_name`.
    pub fn add_index(
        mut self,
        field_name: &str,
        index_type: IndexType,
        metric_type: Option<MetricType>,
        params: Option<Value>,
    ) -> Self {
        self.indexes.retain(|d| d.field_name != field_name);
        self.indexes.push(IndexDescriptor {
            field_name: field_name.to_string(),
            index_name: field_name.to_string(),
            index_type,
            metric_type,
            params: params.unwrap_or_else(|| Value::Object(Default::default())),
        });
        self
    }

    /// Name the index most recently added for `field_name`.
    pub fn with_name(mut self, field_name: &str, index_name: &str) -> Self {
        if let Some(descriptor) = self.indexes.iter_mut().find(|d| d.field_name == field_name) {
            descriptor.index_name = index_name.to_string();
        }
        self
    }

    pub fn validate(&self, schema: &CollectionSchema) -> DbResult<()> {
        for descriptor in &self.indexes {
            descriptor.validate(schema)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexState {
    Pending,
    InProgress,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDescription {
    #[serde(flatten)]
    pub descriptor: IndexDescriptor,
    pub state: IndexState,
    pub total_rows: usize,
    pub indexed_rows: usize,
    pub pending_index_rows: usize,
}
