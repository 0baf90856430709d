// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

pub mod collection;
pub mod config;
pub mod distance;
pub mod error;
pub mod filter;
pub mod import;
pub mod index;
pub mod mutation;
pub mod partition;
pub mod query;
pub mod rbac;
pub mod request;
pub mod schema;
pub mod search;
pub mod types;

pub use config::{DbConfig, TieBreak};
pub use error::{DbError, DbResult};
pub use index::{IndexParams, IndexType, MetricType};
pub use schema::{CollectionSchema, DataType, FieldOptions, SchemaBuilder};
pub use types::{DeleteResult, Entity, Hit, LoadState, MutationResult, PrimaryKey, Row};
