// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Insert, upsert and delete
//!
//! Every batch is validated in full before anything is committed: first
//! types and required fields, then vector dimensions, then primary-key
//! uniqueness and partition routing.

use crate::core::collection::{Collection, StoredEntity};
use crate::core::error::{DbError, DbResult};
use crate::core::filter::Filter;
use crate::core::schema::{RowMode, ValidatedRow};
use crate::core::types::{DeleteResult, Entity, MutationResult, PrimaryKey, Row};
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Which entities a delete removes.
#[derive(Debug, Clone)]
pub enum DeleteSelector {
    Ids(Vec<PrimaryKey>),
    Filter(Filter),
}

/// Turn column-oriented input (`{"field": [v0, v1, ...]}`) into rows.
pub fn columns_to_rows(columns: &Map<String, Value>) -> DbResult<Vec<Row>> {
    let mut len: Option<(usize, &str)> = None;
    for (name, column) in columns {
        let values = column.as_array().ok_or_else(|| {
            DbError::Validation(format!("column '{}' must be an array", name))
        })?;
        match len {
            None => len = Some((values.len(), name)),
            Some((expected, first)) if expected != values.len() => {
                return Err(DbError::Validation(format!(
                    "column '{}' has {} values but column '{}' has {}",
                    name,
                    values.len(),
                    first,
                    expected
                )))
            }
            Some(_) => {}
        }
    }

    let rows = len.map(|(n, _)| n).unwrap_or(0);
    let mut out = vec![Map::new(); rows];
    for (name, column) in columns {
        if let Some(values) = column.as_array() {
            for (row, value) in out.iter_mut().zip(values) {
                row.insert(name.clone(), value.clone());
            }
        }
    }
    Ok(out)
}

/// Validate a whole batch: types first, then dimensions.
fn prepare(collection: &Collection, rows: &[Row], mode: RowMode) -> DbResult<Vec<ValidatedRow>> {
    if rows.is_empty() {
        return Err(DbError::Validation(format!(
            "collection '{}': no rows to write",
            collection.name
        )));
    }
    let mut validated = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let row = collection
            .schema
            .validate_row(row, mode)
            .map_err(|e| annotate_row(e, index))?;
        validated.push(row);
    }
    for (index, row) in validated.iter().enumerate() {
        collection
            .schema
            .check_dimensions(row)
            .map_err(|e| annotate_row(e, index))?;
    }
    Ok(validated)
}

fn annotate_row(error: DbError, index: usize) -> DbError {
    match error {
        DbError::Validation(msg) => DbError::Validation(format!("row {}: {}", index, msg)),
        other => other,
    }
}

fn into_entity(collection: &Collection, row: ValidatedRow, pk: PrimaryKey) -> Entity {
    let mut scalars = row.scalars;
    scalars.insert(collection.schema.primary_field().name.clone(), pk.to_value());
    Entity {
        pk,
        scalars,
        vectors: row.vectors,
        dynamic: row.dynamic,
    }
}

pub fn insert(
    collection: &mut Collection,
    rows: &[Row],
    partition_name: Option<&str>,
) -> DbResult<MutationResult> {
    let validated = prepare(collection, rows, RowMode::Insert)?;

    let mut seen = HashSet::new();
    let mut staged = Vec::with_capacity(validated.len());
    for row in validated {
        let partition = collection.write_partition(partition_name, &row)?;
        let pk = match &row.pk {
            Some(pk) => {
                if collection.store.contains(pk) || !seen.insert(pk.clone()) {
                    return Err(DbError::Validation(format!(
                        "collection '{}': primary key {} already exists",
                        collection.name, pk
                    )));
                }
                Some(pk.clone())
            }
            None => None,
        };
        staged.push((row, pk, partition));
    }

    let mut ids = Vec::with_capacity(staged.len());
    for (row, pk, partition) in staged {
        let pk = pk.unwrap_or_else(|| PrimaryKey::Int(collection.allocate_id()));
        let entity = into_entity(collection, row, pk.clone());
        collection.store.put(StoredEntity { entity, partition });
        ids.push(pk);
    }

    Ok(MutationResult {
        insert_count: ids.len(),
        ids,
    })
}

/// Replace-or-insert by primary key. Later rows win within one batch.
pub fn upsert(
    collection: &mut Collection,
    rows: &[Row],
    partition_name: Option<&str>,
) -> DbResult<MutationResult> {
    let validated = prepare(collection, rows, RowMode::Upsert)?;

    let mut staged = Vec::with_capacity(validated.len());
    for row in validated {
        let partition = collection.write_partition(partition_name, &row)?;
        let pk = row.pk.clone().ok_or_else(|| {
            DbError::Validation(format!(
                "collection '{}': upsert requires a primary key on every row",
                collection.name
            ))
        })?;
        staged.push((row, pk, partition));
    }

    let mut ids = Vec::with_capacity(staged.len());
    for (row, pk, partition) in staged {
        let entity = into_entity(collection, row, pk.clone());
        collection.store.remove(&pk);
        collection.store.put(StoredEntity { entity, partition });
        ids.push(pk);
    }

    Ok(MutationResult {
        insert_count: ids.len(),
        ids,
    })
}

pub fn delete(
    collection: &mut Collection,
    selector: &DeleteSelector,
    partition_name: Option<&str>,
) -> DbResult<DeleteResult> {
    if let Some(name) = partition_name {
        if !collection.has_partition(name) {
            return Err(DbError::NotFound(format!(
                "partition '{}' does not exist in collection '{}'",
                name, collection.name
            )));
        }
    }
    let in_partition = |stored: &StoredEntity| partition_name.map_or(true, |p| stored.partition == p);

    let targets: Vec<PrimaryKey> = match selector {
        DeleteSelector::Ids(ids) => {
            let wanted: HashSet<&PrimaryKey> = ids.iter().collect();
            collection
                .store
                .latest()
                .filter(|s| wanted.contains(&s.entity.pk) && in_partition(s))
                .map(|s| s.entity.pk.clone())
                .collect()
        }
        DeleteSelector::Filter(filter) => collection
            .store
            .latest()
            .filter(|s| in_partition(s) && filter.matches(&s.entity))
            .map(|s| s.entity.pk.clone())
            .collect(),
    };

    let mut delete_count = 0;
    for pk in &targets {
        if collection.store.remove(pk) {
            delete_count += 1;
        }
    }
    Ok(DeleteResult { delete_count })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DbConfig;
    use crate::core::filter::ParseOptions;
    use crate::core::schema::{CollectionOptions, CollectionSchema, DataType, FieldOptions, SchemaBuilder};
    use serde_json::json;

    fn rows(values: Value) -> Vec<Row> {
        values
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn collection() -> Collection {
        Collection::new(
            1,
            "demo",
            CollectionSchema::quick(2).unwrap(),
            &CollectionOptions::default(),
            &DbConfig::immediate(),
        )
        .unwrap()
    }

    fn auto_id_collection() -> Collection {
        let schema = SchemaBuilder::new()
            .add_field("pk", DataType::Int64, FieldOptions::new().primary().auto_id(true))
            .unwrap()
            .add_field("vector", DataType::FloatVector, FieldOptions::new().dim(2))
            .unwrap()
            .build()
            .unwrap();
        Collection::new(2, "auto", schema, &CollectionOptions::default(), &DbConfig::immediate())
            .unwrap()
    }

    #[test]
    fn test_insert_returns_ids_in_input_order() {
        let mut c = collection();
        let result = insert(
            &mut c,
            &rows(json!([
                {"id": 5, "vector": [0.1, 0.2]},
                {"id": 2, "vector": [0.3, 0.4], "color": "red"}
            ])),
            None,
        )
        .unwrap();
        assert_eq!(result.insert_count, 2);
        assert_eq!(result.ids, vec![PrimaryKey::Int(5), PrimaryKey::Int(2)]);
    }

    #[test]
    fn test_bad_row_commits_nothing() {
        let mut c = collection();
        let err = insert(
            &mut c,
            &rows(json!([
                {"id": 1, "vector": [0.1, 0.2]},
                {"id": 2, "vector": [0.1, 0.2, 0.3]}
            ])),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::DimensionMismatch { expected: 2, actual: 3, .. }));
        assert!(c.store.is_empty());
    }

    #[test]
    fn test_duplicate_primary_key_is_rejected() {
        let mut c = collection();
        insert(&mut c, &rows(json!([{"id": 1, "vector": [0.0, 0.0]}])), None).unwrap();
        assert!(matches!(
            insert(&mut c, &rows(json!([{"id": 1, "vector": [0.0, 0.0]}])), None),
            Err(DbError::Validation(_))
        ));
        assert!(matches!(
            insert(
                &mut c,
                &rows(json!([{"id": 7, "vector": [0.0, 0.0]}, {"id": 7, "vector": [0.0, 0.0]}])),
                None
            ),
            Err(DbError::Validation(_))
        ));
        assert_eq!(c.store.len(), 1);
    }

    #[test]
    fn test_auto_ids_are_unique_and_increasing() {
        let mut c = auto_id_collection();
        let batch = rows(json!([{"vector": [0.0, 0.0]}, {"vector": [1.0, 1.0]}]));
        let first = insert(&mut c, &batch, None).unwrap();
        let second = insert(&mut c, &batch, None).unwrap();
        let all: Vec<PrimaryKey> = first.ids.into_iter().chain(second.ids).collect();
        let mut sorted = all.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, all);
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut c = collection();
        insert(&mut c, &rows(json!([{"id": 1, "vector": [0.0, 0.0], "n": 1}])), None).unwrap();
        let result = upsert(&mut c, &rows(json!([{"id": 1, "vector": [1.0, 1.0], "n": 2}])), None).unwrap();
        assert_eq!(result.insert_count, 1);
        let stored = c.store.get_visible(&PrimaryKey::Int(1)).unwrap();
        assert_eq!(stored.entity.dynamic.get("n"), Some(&json!(2)));
        assert_eq!(c.store.len(), 1);
    }

    #[test]
    fn test_upsert_requires_primary_key_with_auto_id() {
        let mut c = auto_id_collection();
        assert!(matches!(
            upsert(&mut c, &rows(json!([{"vector": [0.0, 0.0]}])), None),
            Err(DbError::Validation(_))
        ));
    }

    #[test]
    fn test_delete_by_ids_and_filter() {
        let mut c = collection();
        insert(
            &mut c,
            &rows(json!([
                {"id": 1, "vector": [0.0, 0.0], "color": "red"},
                {"id": 2, "vector": [0.0, 0.0], "color": "blue"},
                {"id": 3, "vector": [0.0, 0.0], "color": "red"}
            ])),
            None,
        )
        .unwrap();

        let removed = delete(&mut c, &DeleteSelector::Ids(vec![PrimaryKey::Int(2)]), None).unwrap();
        assert_eq!(removed.delete_count, 1);
        let again = delete(&mut c, &DeleteSelector::Ids(vec![PrimaryKey::Int(2)]), None).unwrap();
        assert_eq!(again.delete_count, 0);

        let filter = Filter::compile(r#"color == "red""#, &c.schema, ParseOptions::default()).unwrap();
        let removed = delete(&mut c, &DeleteSelector::Filter(filter), None).unwrap();
        assert_eq!(removed.delete_count, 2);
        assert!(c.store.is_empty());
    }

    #[test]
    fn test_columns_to_rows() {
        let columns = json!({"id": [1, 2], "vector": [[0.0, 1.0], [1.0, 0.0]]});
        let rows = columns_to_rows(columns.as_object().unwrap()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("id"), Some(&json!(2)));

        let ragged = json!({"id": [1, 2], "vector": [[0.0, 1.0]]});
        assert!(matches!(
            columns_to_rows(ragged.as_object().unwrap()),
            Err(DbError::Validation(_))
        ));
    }
}
