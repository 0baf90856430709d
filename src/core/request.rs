// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Request payloads shared by the backend trait, the REST API and the client

use crate::core::index::{IndexParams, MetricType};
use crate::core::schema::{CollectionOptions, CollectionSchema};
use crate::core::types::{PrimaryKey, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCollectionRequest {
    pub collection_name: String,
    pub schema: CollectionSchema,
    #[serde(default)]
    pub index_params: Option<IndexParams>,
    #[serde(default)]
    pub options: CollectionOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertRequest {
    pub collection_name: String,
    pub data: Vec<Row>,
    #[serde(default)]
    pub partition_name: Option<String>,
}

impl InsertRequest {
    pub fn new(collection_name: &str, data: Vec<Row>) -> Self {
        Self {
            collection_name: collection_name.to_string(),
            data,
            partition_name: None,
        }
    }

    pub fn partition(mut self, partition_name: &str) -> Self {
        self.partition_name = Some(partition_name.to_string());
        self
    }
}

/// Delete by primary keys or by filter; exactly one must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub collection_name: String,
    #[serde(default)]
    pub ids: Option<Vec<PrimaryKey>>,
    #[serde(default)]
    pub filter: Option<String>,
    #[serde(default)]
    pub partition_name: Option<String>,
}

impl DeleteRequest {
    pub fn by_ids(collection_name: &str, ids: Vec<PrimaryKey>) -> Self {
        Self {
            collection_name: collection_name.to_string(),
            ids: Some(ids),
            filter: None,
            partition_name: None,
        }
    }

    pub fn by_filter(collection_name: &str, filter: &str) -> Self {
        Self {
            collection_name: collection_name.to_string(),
            ids: None,
            filter: Some(filter.to_string()),
            partition_name: None,
        }
    }

    pub fn partition(mut self, partition_name: &str) -> Self {
        self.partition_name = Some(partition_name.to_string());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub metric_type: Option<MetricType>,
    #[serde(default)]
    pub radius: Option<f32>,
    #[serde(default)]
    pub range_filter: Option<f32>,
    /// Index-specific knobs (`nprobe`, `ef`, ...). Accepted and ignored by
    /// the exhaustive engine.
    #[serde(default)]
    pub params: Value,
}

/// Position of the last hit returned by a search iterator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchCursor {
    pub distance: f32,
    pub id: PrimaryKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub collection_name: String,
    pub data: Vec<Vec<f32>>,
    #[serde(default)]
    pub anns_field: Option<String>,
    /// top-k
    pub limit: usize,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub output_fields: Vec<String>,
    #[serde(default)]
    pub partition_names: Vec<String>,
    #[serde(default)]
    pub group_by_field: Option<String>,
    #[serde(default)]
    pub search_params: SearchParams,
    #[serde(default)]
    pub after: Option<SearchCursor>,
}

impl SearchRequest {
    pub fn new(collection_name: &str, data: Vec<Vec<f32>>, limit: usize) -> Self {
        Self {
            collection_name: collection_name.to_string(),
            data,
            anns_field: None,
            limit,
            filter: String::new(),
            output_fields: Vec::new(),
            partition_names: Vec::new(),
            group_by_field: None,
            search_params: SearchParams::default(),
            after: None,
        }
    }

    pub fn filter(mut self, filter: &str) -> Self {
        self.filter = filter.to_string();
        self
    }

    pub fn output_fields(mut self, fields: &[&str]) -> Self {
        self.output_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn partition_names(mut self, names: &[&str]) -> Self {
        self.partition_names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn anns_field(mut self, field: &str) -> Self {
        self.anns_field = Some(field.to_string());
        self
    }

    pub fn group_by(mut self, field: &str) -> Self {
        self.group_by_field = Some(field.to_string());
        self
    }

    pub fn metric(mut self, metric: MetricType) -> Self {
        self.search_params.metric_type = Some(metric);
        self
    }

    pub fn range(mut self, radius: f32, range_filter: Option<f32>) -> Self {
        self.search_params.radius = Some(radius);
        self.search_params.range_filter = range_filter;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub collection_name: String,
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub output_fields: Vec<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub partition_names: Vec<String>,
    /// Only entities with a primary key greater than this.
    #[serde(default)]
    pub after: Option<PrimaryKey>,
}

impl QueryRequest {
    pub fn new(collection_name: &str, filter: &str) -> Self {
        Self {
            collection_name: collection_name.to_string(),
            filter: filter.to_string(),
            output_fields: Vec::new(),
            limit: None,
            offset: 0,
            partition_names: Vec::new(),
            after: None,
        }
    }

    pub fn output_fields(mut self, fields: &[&str]) -> Self {
        self.output_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn partition_names(mut self, names: &[&str]) -> Self {
        self.partition_names = names.iter().map(|n| n.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetRequest {
    pub collection_name: String,
    pub ids: Vec<PrimaryKey>,
    #[serde(default)]
    pub output_fields: Vec<String>,
    #[serde(default)]
    pub partition_names: Vec<String>,
}

impl GetRequest {
    pub fn new(collection_name: &str, ids: Vec<PrimaryKey>) -> Self {
        Self {
            collection_name: collection_name.to_string(),
            ids,
            output_fields: Vec::new(),
            partition_names: Vec::new(),
        }
    }

    pub fn output_fields(mut self, fields: &[&str]) -> Self {
        self.output_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }
}

/// One bulk-import job: each inner list is one file set (a row-based JSON
/// file, or one column file per field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRequest {
    pub collection_name: String,
    #[serde(default)]
    pub partition_name: Option<String>,
    pub files: Vec<Vec<String>>,
}
