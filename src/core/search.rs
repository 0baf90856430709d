// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Exact vector search
//!
//! Candidates are the visible entities of the readable partitions that
//! pass the filter. Each is scored against every query vector, optionally
//! range-restricted, ranked best first with a primary-key tie-break, then
//! cut to `limit` hits or `limit` groups.

use crate::core::collection::{Collection, StoredEntity};
use crate::core::config::{DbConfig, TieBreak};
use crate::core::distance::{compare_scores, score, within_range};
use crate::core::error::{DbError, DbResult};
use crate::core::filter::Filter;
use crate::core::index::MetricType;
use crate::core::query::{parse_options, OutputFields};
use crate::core::request::{SearchCursor, SearchRequest};
use crate::core::schema::FieldSchema;
use crate::core::types::{Hit, PrimaryKey};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Ordering of two scored candidates, best first.
pub fn rank(
    metric: MetricType,
    tie_break: TieBreak,
    a: (f32, &PrimaryKey),
    b: (f32, &PrimaryKey),
) -> Ordering {
    compare_scores(metric, a.0, b.0).then_with(|| match tie_break {
        TieBreak::AscendingPrimaryKey => a.1.cmp(b.1),
        TieBreak::DescendingPrimaryKey => b.1.cmp(a.1),
    })
}

fn vector_field<'a>(collection: &'a Collection, request: &SearchRequest) -> DbResult<&'a FieldSchema> {
    let schema = &collection.schema;
    match &request.anns_field {
        Some(name) => {
            let field = schema.field(name).ok_or_else(|| {
                DbError::UnknownField(format!("anns field '{}' does not exist", name))
            })?;
            if !field.data_type.is_vector() {
                return Err(DbError::Validation(format!(
                    "anns field '{}' is not a vector field",
                    name
                )));
            }
            Ok(field)
        }
        None => {
            let mut vectors = schema.vector_fields();
            match (vectors.next(), vectors.next()) {
                (Some(field), None) => Ok(field),
                (Some(_), Some(_)) => Err(DbError::Validation(format!(
                    "collection '{}' has several vector fields; anns_field is required",
                    collection.name
                ))),
                (None, _) => Err(DbError::Schema(format!(
                    "collection '{}' has no vector field",
                    collection.name
                ))),
            }
        }
    }
}

fn check_range(metric: MetricType, radius: Option<f32>, range_filter: Option<f32>) -> DbResult<()> {
    match (radius, range_filter) {
        (None, Some(_)) => Err(DbError::Validation(
            "range_filter requires radius".to_string(),
        )),
        (Some(radius), Some(bound)) => {
            let ordered = if metric.higher_is_better() {
                bound > radius
            } else {
                bound < radius
            };
            if ordered {
                Ok(())
            } else {
                Err(DbError::Validation(format!(
                    "range_filter {} and radius {} are inverted for metric {:?}",
                    bound, radius, metric
                )))
            }
        }
        _ => Ok(()),
    }
}

pub fn search(
    collection: &Collection,
    request: &SearchRequest,
    config: &DbConfig,
) -> DbResult<Vec<Vec<Hit>>> {
    if request.limit == 0 || request.limit > config.max_top_k {
        return Err(DbError::Validation(format!(
            "limit {} is outside 1..={}",
            request.limit, config.max_top_k
        )));
    }
    if request.data.is_empty() {
        return Err(DbError::Validation("search needs at least one query vector".to_string()));
    }

    let schema = &collection.schema;
    let field = vector_field(collection, request)?;
    let index = collection.index_for_field(&field.name).ok_or_else(|| {
        DbError::MissingIndex(format!("vector field '{}' has no index", field.name))
    })?;
    let metric = index.metric_type.unwrap_or(MetricType::L2);
    if let Some(requested) = request.search_params.metric_type {
        if requested != metric {
            return Err(DbError::IncompatibleMetric(format!(
                "search metric {:?} does not match index metric {:?} on '{}'",
                requested, metric, field.name
            )));
        }
    }
    for vector in &request.data {
        schema.check_query_vector(field, vector)?;
    }
    let radius = request.search_params.radius;
    let range_filter = request.search_params.range_filter;
    check_range(metric, radius, range_filter)?;

    if let Some(group) = &request.group_by_field {
        match schema.field(group) {
            Some(f) if f.data_type.is_vector() => {
                return Err(DbError::Validation(format!(
                    "cannot group by vector field '{}'",
                    group
                )))
            }
            None if !schema.enable_dynamic_field => {
                return Err(DbError::UnknownField(format!(
                    "group-by field '{}' does not exist",
                    group
                )))
            }
            _ => {}
        }
    }

    let partitions = collection.readable_partitions(&request.partition_names)?;
    let filter = Filter::compile(&request.filter, schema, parse_options(config))?;
    let output = OutputFields::resolve(schema, &request.output_fields)?;
    if output.is_count() {
        return Err(DbError::Validation("count(*) is only valid for query".to_string()));
    }

    let candidates: Vec<(&StoredEntity, &[f32])> = collection
        .store
        .visible()
        .filter(|stored| partitions.contains(&stored.partition))
        .filter(|stored| filter.matches(&stored.entity))
        .filter_map(|stored| stored.entity.vector(&field.name).map(|v| (stored, v)))
        .collect();

    let results: Vec<Vec<Hit>> = request
        .data
        .iter()
        .map(|query| {
            let mut scored: Vec<(f32, &StoredEntity)> = candidates
                .iter()
                .map(|(stored, v)| (score(metric, query, v), *stored))
                .filter(|(s, _)| radius.map_or(true, |r| within_range(metric, *s, r, range_filter)))
                .filter(|(s, stored)| {
                    after_cursor(metric, config.tie_break, request.after.as_ref(), *s, &stored.entity.pk)
                })
                .collect();
            scored.sort_by(|a, b| rank(metric, config.tie_break, (a.0, &a.1.entity.pk), (b.0, &b.1.entity.pk)));

            let kept = match &request.group_by_field {
                Some(group) => best_per_group(scored, group, request.limit),
                None => {
                    scored.truncate(request.limit);
                    scored
                }
            };

            kept.into_iter()
                .map(|(distance, stored)| Hit {
                    id: stored.entity.pk.clone(),
                    distance,
                    entity: output.project(schema, &stored.entity),
                })
                .collect::<Vec<Hit>>()
        })
        .collect();

    Ok(results)
}

fn after_cursor(
    metric: MetricType,
    tie_break: TieBreak,
    cursor: Option<&SearchCursor>,
    distance: f32,
    pk: &PrimaryKey,
) -> bool {
    cursor.map_or(true, |c| {
        rank(metric, tie_break, (distance, pk), (c.distance, &c.id)) == Ordering::Greater
    })
}

/// Keep the first (best) hit of each distinct group value, up to `limit`
/// groups. Entities without the field form a single `null` group.
fn best_per_group<'a>(
    ranked: Vec<(f32, &'a StoredEntity)>,
    group: &str,
    limit: usize,
) -> Vec<(f32, &'a StoredEntity)> {
    let mut seen = HashSet::new();
    let mut kept = Vec::new();
    for (distance, stored) in ranked {
        let key = stored
            .entity
            .value(group)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "null".to_string());
        if seen.insert(key) {
            kept.push((distance, stored));
            if kept.len() == limit {
                break;
            }
        }
    }
    kept
}
