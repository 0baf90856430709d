// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Batch iterators over query and search results
//!
//! Both iterators are restartable cursors: the server keeps no state, each
//! `next` call asks for the entities strictly after the last one returned.
//! Query iteration walks primary keys in ascending order; search iteration
//! walks hits in decreasing relevance, keyed by `(distance, id)`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::core::error::{DbError, DbResult};
use crate::core::query::COUNT_STAR;
use crate::core::request::{QueryRequest, SearchCursor, SearchRequest};
use crate::core::types::{Hit, PrimaryKey, Row};
use crate::storage::backend::StorageBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IterState {
    Open,
    Exhausted,
    Closed,
}

/// Errors about the collection disappearing surface as `NotFound`.
pub(crate) fn collection_gone(e: DbError) -> DbError {
    match e {
        DbError::UnknownCollection(msg) => DbError::NotFound(msg),
        other => other,
    }
}

fn check_open(state: IterState, dropped: &AtomicBool, collection: &str) -> DbResult<()> {
    if dropped.load(Ordering::Acquire) {
        return Err(DbError::NotFound(format!(
            "collection '{}' was dropped",
            collection
        )));
    }
    if state == IterState::Closed {
        return Err(DbError::Closed(format!(
            "iterator over '{}' is closed",
            collection
        )));
    }
    Ok(())
}

/// Fails with `NotFound` once `name` no longer resolves to collection `id`.
/// A mismatch is remembered in `dropped`, so the binding never comes back.
pub(crate) async fn ensure_bound(
    backend: &dyn StorageBackend,
    name: &str,
    id: i64,
    dropped: &AtomicBool,
) -> DbResult<()> {
    let current = match backend.collection_id(name).await.map_err(collection_gone) {
        Ok(current) => current,
        Err(DbError::NotFound(msg)) => {
            dropped.store(true, Ordering::Release);
            return Err(DbError::NotFound(msg));
        }
        Err(e) => return Err(e),
    };
    if current != id {
        dropped.store(true, Ordering::Release);
        return Err(DbError::NotFound(format!(
            "collection '{}' (id {}) was dropped; the name now refers to collection {}",
            name, id, current
        )));
    }
    Ok(())
}

/// Entries still allowed by the overall limit.
fn batch_len(batch_size: usize, remaining: Option<usize>) -> DbResult<usize> {
    if batch_size == 0 {
        return Err(DbError::Validation("batch_size must be positive".to_string()));
    }
    Ok(remaining.map_or(batch_size, |r| r.min(batch_size)))
}

pub struct QueryIterator {
    backend: Arc<dyn StorageBackend>,
    collection_id: i64,
    request: QueryRequest,
    pk_field: String,
    cursor: Option<PrimaryKey>,
    remaining: Option<usize>,
    state: IterState,
    dropped: Arc<AtomicBool>,
}

impl QueryIterator {
    pub(crate) fn new(
        backend: Arc<dyn StorageBackend>,
        collection_id: i64,
        mut request: QueryRequest,
        pk_field: &str,
        dropped: Arc<AtomicBool>,
    ) -> DbResult<Self> {
        if request.output_fields.iter().any(|f| f == COUNT_STAR) {
            return Err(DbError::Validation(format!(
                "{} cannot be iterated over",
                COUNT_STAR
            )));
        }
        let remaining = request.limit.take();
        request.after = None;
        Ok(Self {
            backend,
            collection_id,
            request,
            pk_field: pk_field.to_string(),
            cursor: None,
            remaining,
            state: IterState::Open,
            dropped,
        })
    }

    /// Next batch of at most `batch_size` rows; empty once exhausted.
    pub async fn next(&mut self, batch_size: usize) -> DbResult<Vec<Row>> {
        check_open(self.state, &self.dropped, &self.request.collection_name)?;
        let take = batch_len(batch_size, self.remaining)?;
        ensure_bound(
            self.backend.as_ref(),
            &self.request.collection_name,
            self.collection_id,
            &self.dropped,
        )
        .await?;
        if self.state == IterState::Exhausted || take == 0 {
            self.state = IterState::Exhausted;
            return Ok(Vec::new());
        }

        let mut request = self.request.clone();
        request.limit = Some(take);
        request.after = self.cursor.clone();
        if self.cursor.is_some() {
            request.offset = 0;
        }
        let rows = self.backend.query(request).await.map_err(collection_gone)?;

        if let Some(last) = rows.last() {
            let pk = last
                .get(&self.pk_field)
                .and_then(PrimaryKey::from_value)
                .ok_or_else(|| {
                    DbError::Internal(format!("row is missing primary key '{}'", self.pk_field))
                })?;
            self.cursor = Some(pk);
        }
        if rows.len() < take {
            self.state = IterState::Exhausted;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= rows.len();
        }
        debug!("Query iterator over {} returned {} rows", self.request.collection_name, rows.len());
        Ok(rows)
    }

    /// Further `next` calls fail with `Closed`.
    pub fn close(&mut self) {
        self.state = IterState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == IterState::Closed
    }
}

pub struct SearchIterator {
    backend: Arc<dyn StorageBackend>,
    collection_id: i64,
    request: SearchRequest,
    cursor: Option<SearchCursor>,
    remaining: Option<usize>,
    state: IterState,
    dropped: Arc<AtomicBool>,
}

impl SearchIterator {
    pub(crate) fn new(
        backend: Arc<dyn StorageBackend>,
        collection_id: i64,
        mut request: SearchRequest,
        limit: Option<usize>,
        dropped: Arc<AtomicBool>,
    ) -> DbResult<Self> {
        if request.data.len() != 1 {
            return Err(DbError::Validation(format!(
                "search iterator takes exactly one query vector, got {}",
                request.data.len()
            )));
        }
        if request.group_by_field.is_some() {
            return Err(DbError::UnsupportedOperation(
                "search iterator does not support group_by_field".to_string(),
            ));
        }
        request.after = None;
        Ok(Self {
            backend,
            collection_id,
            request,
            cursor: None,
            remaining: limit,
            state: IterState::Open,
            dropped,
        })
    }

    /// Next batch of at most `batch_size` hits; empty once exhausted.
    pub async fn next(&mut self, batch_size: usize) -> DbResult<Vec<Hit>> {
        check_open(self.state, &self.dropped, &self.request.collection_name)?;
        let take = batch_len(batch_size, self.remaining)?;
        ensure_bound(
            self.backend.as_ref(),
            &self.request.collection_name,
            self.collection_id,
            &self.dropped,
        )
        .await?;
        if self.state == IterState::Exhausted || take == 0 {
            self.state = IterState::Exhausted;
            return Ok(Vec::new());
        }

        let mut request = self.request.clone();
        request.limit = take;
        request.after = self.cursor.clone();
        let hits = self
            .backend
            .search(request)
            .await
            .map_err(collection_gone)?
            .into_iter()
            .next()
            .unwrap_or_default();

        if let Some(last) = hits.last() {
            self.cursor = Some(SearchCursor {
                distance: last.distance,
                id: last.id.clone(),
            });
        }
        if hits.len() < take {
            self.state = IterState::Exhausted;
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= hits.len();
        }
        Ok(hits)
    }

    pub fn close(&mut self) {
        self.state = IterState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == IterState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::DbConfig;
    use crate::core::index::{IndexParams, IndexType, MetricType};
    use crate::core::request::{CreateCollectionRequest, InsertRequest};
    use crate::core::schema::{CollectionOptions, CollectionSchema};
    use crate::storage::InMemoryBackend;
    use serde_json::json;

    fn items_request() -> CreateCollectionRequest {
        CreateCollectionRequest {
            collection_name: "items".to_string(),
            schema: CollectionSchema::quick(2).unwrap(),
            index_params: Some(IndexParams::new().add_index(
                "vector",
                IndexType::Flat,
                Some(MetricType::L2),
                None,
            )),
            options: CollectionOptions::default(),
        }
    }

    async fn backend_with_rows(n: i64) -> (Arc<dyn StorageBackend>, i64) {
        let backend = InMemoryBackend::new(DbConfig::immediate());
        backend.create_collection(items_request()).await.unwrap();
        let rows = (0..n)
            .map(|i| {
                json!({"id": i, "vector": [i as f32, 0.0]})
                    .as_object()
                    .unwrap()
                    .clone()
            })
            .collect();
        backend.insert(InsertRequest::new("items", rows)).await.unwrap();
        let id = backend.collection_id("items").await.unwrap();
        (Arc::new(backend), id)
    }

    #[tokio::test]
    async fn test_query_iterator_pages_by_primary_key() {
        let (backend, id) = backend_with_rows(25).await;
        let mut iter = QueryIterator::new(
            backend,
            id,
            QueryRequest::new("items", "id >= 3"),
            "id",
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();

        let mut seen = Vec::new();
        loop {
            let batch = iter.next(7).await.unwrap();
            if batch.is_empty() {
                break;
            }
            seen.extend(batch.iter().map(|r| r["id"].as_i64().unwrap()));
        }
        assert_eq!(seen, (3..25).collect::<Vec<_>>());
        assert!(iter.next(7).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overall_limit_and_close() {
        let (backend, id) = backend_with_rows(10).await;
        let mut iter = SearchIterator::new(
            backend,
            id,
            SearchRequest::new("items", vec![vec![0.0, 0.0]], 1),
            Some(5),
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();

        assert_eq!(iter.next(3).await.unwrap().len(), 3);
        assert_eq!(iter.next(3).await.unwrap().len(), 2);
        assert!(iter.next(3).await.unwrap().is_empty());
        iter.close();
        assert!(matches!(iter.next(3).await, Err(DbError::Closed(_))));
    }

    #[tokio::test]
    async fn test_dropped_collection_is_not_found() {
        let (backend, id) = backend_with_rows(3).await;
        let dropped = Arc::new(AtomicBool::new(false));
        let mut iter = QueryIterator::new(
            Arc::clone(&backend),
            id,
            QueryRequest::new("items", ""),
            "id",
            Arc::clone(&dropped),
        )
        .unwrap();
        backend.drop_collection("items").await.unwrap();
        assert!(matches!(iter.next(2).await, Err(DbError::NotFound(_))));
        assert!(dropped.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_recreated_name_is_not_followed() {
        let (backend, id) = backend_with_rows(3).await;
        let dropped = Arc::new(AtomicBool::new(false));
        let mut iter = SearchIterator::new(
            Arc::clone(&backend),
            id,
            SearchRequest::new("items", vec![vec![0.0, 0.0]], 1),
            None,
            Arc::clone(&dropped),
        )
        .unwrap();
        assert_eq!(iter.next(2).await.unwrap().len(), 2);

        backend.drop_collection("items").await.unwrap();
        backend.create_collection(items_request()).await.unwrap();
        assert!(matches!(iter.next(2).await, Err(DbError::NotFound(_))));
        assert!(dropped.load(Ordering::Acquire));
    }
}
