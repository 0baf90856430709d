// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Scalar query, get-by-id and output-field projection

use crate::core::collection::{Collection, StoredEntity};
use crate::core::config::DbConfig;
use crate::core::error::{DbError, DbResult};
use crate::core::filter::{Filter, ParseOptions};
use crate::core::request::{GetRequest, QueryRequest};
use crate::core::schema::CollectionSchema;
use crate::core::types::{vector_to_value, Entity, Row};
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const COUNT_STAR: &str = "count(*)";
const ALL_FIELDS: &str = "*";
const META: &str = "$meta";

/// Resolved `output_fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputFields {
    fields: Vec<String>,
    all: bool,
    meta: bool,
    count: bool,
}

impl OutputFields {
    /// Empty means primary key only. `*` selects every declared field plus
    /// dynamic keys; `$meta` selects every dynamic key.
    pub fn resolve(schema: &CollectionSchema, requested: &[String]) -> DbResult<Self> {
        let mut out = Self {
            fields: Vec::new(),
            all: false,
            meta: false,
            count: false,
        };
        for name in requested {
            match name.as_str() {
                ALL_FIELDS => out.all = true,
                COUNT_STAR => out.count = true,
                META if schema.enable_dynamic_field => out.meta = true,
                other if schema.field(other).is_some() || schema.enable_dynamic_field => {
                    if !out.fields.iter().any(|f| f == other) {
                        out.fields.push(other.to_string());
                    }
                }
                other => {
                    return Err(DbError::UnknownField(format!(
                        "output field '{}' does not exist",
                        other
                    )))
                }
            }
        }
        if out.count && requested.len() > 1 {
            return Err(DbError::Validation(format!(
                "{} cannot be combined with other output fields",
                COUNT_STAR
            )));
        }
        Ok(out)
    }

    pub fn is_count(&self) -> bool {
        self.count
    }

    pub fn project(&self, schema: &CollectionSchema, entity: &Entity) -> Row {
        let mut row = Map::new();
        let pk_name = &schema.primary_field().name;
        row.insert(pk_name.clone(), entity.pk.to_value());

        if self.all {
            for field in &schema.fields {
                if let Some(value) = declared_value(entity, &field.name) {
                    row.insert(field.name.clone(), value);
                }
            }
        }
        if self.all || self.meta {
            for (key, value) in &entity.dynamic {
                row.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        for name in &self.fields {
            let value = if schema.field(name).is_some() {
                declared_value(entity, name)
            } else {
                entity.dynamic.get(name).cloned()
            };
            if let Some(value) = value {
                row.insert(name.clone(), value);
            }
        }
        row
    }
}

fn declared_value(entity: &Entity, name: &str) -> Option<Value> {
    entity
        .scalars
        .get(name)
        .cloned()
        .or_else(|| entity.vector(name).map(vector_to_value))
}

pub(crate) fn parse_options(config: &DbConfig) -> ParseOptions {
    ParseOptions {
        allow_infix_like: config.allow_infix_like,
        max_depth: config.max_filter_depth,
    }
}

pub fn query(collection: &Collection, request: &QueryRequest, config: &DbConfig) -> DbResult<Vec<Row>> {
    let partitions = collection.readable_partitions(&request.partition_names)?;
    let filter = Filter::compile(&request.filter, &collection.schema, parse_options(config))?;
    let output = OutputFields::resolve(&collection.schema, &request.output_fields)?;

    let limit = request.limit.unwrap_or(0);
    match request.offset.checked_add(limit) {
        Some(window) if window <= config.max_query_window => {}
        _ => {
            return Err(DbError::Validation(format!(
                "offset ({}) + limit ({}) exceeds the query window of {}",
                request.offset, limit, config.max_query_window
            )))
        }
    }

    let matching = collection.store.visible().filter(|stored| {
        partitions.contains(&stored.partition)
            && request.after.as_ref().map_or(true, |after| &stored.entity.pk > after)
            && filter.matches(&stored.entity)
    });

    if output.is_count() {
        let count = matching.count();
        let mut row = Map::new();
        row.insert(COUNT_STAR.to_string(), Value::from(count as u64));
        return Ok(vec![row]);
    }

    let rows = matching
        .skip(request.offset)
        .take(request.limit.unwrap_or(usize::MAX))
        .map(|stored| output.project(&collection.schema, &stored.entity))
        .collect();
    Ok(rows)
}

/// Fetch by primary key in input order; missing keys are skipped.
pub fn get(collection: &Collection, request: &GetRequest) -> DbResult<Vec<Row>> {
    let partitions = collection.readable_partitions(&request.partition_names)?;
    let output = OutputFields::resolve(&collection.schema, &request.output_fields)?;
    if output.is_count() {
        return Err(DbError::Validation(format!("{} is not valid for get", COUNT_STAR)));
    }

    let mut seen = HashSet::new();
    let rows = request
        .ids
        .iter()
        .filter(|pk| seen.insert((*pk).clone()))
        .filter_map(|pk| collection.store.get_visible(pk))
        .filter(|stored: &&StoredEntity| partitions.contains(&stored.partition))
        .map(|stored| output.project(&collection.schema, &stored.entity))
        .collect();
    Ok(rows)
}
