// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

use crate::client::iterator::{collection_gone, ensure_bound, QueryIterator, SearchIterator};
use crate::core::collection::CollectionDescription;
use crate::core::error::{DbError, DbResult};
use crate::core::index::{IndexDescription, IndexParams};
use crate::core::mutation::columns_to_rows;
use crate::core::request::{DeleteRequest, GetRequest, InsertRequest, QueryRequest, SearchRequest};
use crate::core::schema::CollectionSchema;
use crate::core::types::{DeleteResult, Hit, LoadState, MutationResult, PrimaryKey, Row};
use crate::storage::backend::StorageBackend;

/// A named collection bound to a backend.
///
/// The handle is tied to the collection its name resolved to when it was
/// opened. Once that collection is dropped (through this handle or any
/// other way) every call on the handle, and on the iterators it produced,
/// fails with `NotFound`, even if the name is reused later.
pub struct CollectionHandle {
    backend: Arc<dyn StorageBackend>,
    name: String,
    id: i64,
    schema: CollectionSchema,
    dropped: Arc<AtomicBool>,
}

impl std::fmt::Debug for CollectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("schema", &self.schema)
            .field("dropped", &self.dropped)
            .finish_non_exhaustive()
    }
}

impl CollectionHandle {
    pub(crate) async fn open(backend: Arc<dyn StorageBackend>, name: &str) -> DbResult<Self> {
        let description = backend.describe_collection(name).await?;
        Ok(Self {
            backend,
            name: name.to_string(),
            id: description.collection_id,
            schema: description.schema,
            dropped: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    fn check_dropped(&self) -> DbResult<()> {
        if self.dropped.load(Ordering::Acquire) {
            return Err(DbError::NotFound(format!(
                "collection '{}' was dropped",
                self.name
            )));
        }
        Ok(())
    }

    async fn live(&self) -> DbResult<&dyn StorageBackend> {
        self.check_dropped()?;
        ensure_bound(self.backend.as_ref(), &self.name, self.id, &self.dropped).await?;
        Ok(self.backend.as_ref())
    }

    pub async fn describe(&self) -> DbResult<CollectionDescription> {
        self.live().await?
            .describe_collection(&self.name)
            .await
            .map_err(collection_gone)
    }

    pub async fn load(&self) -> DbResult<()> {
        self.live().await?.load_collection(&self.name).await.map_err(collection_gone)
    }

    pub async fn release(&self) -> DbResult<()> {
        self.live().await?.release_collection(&self.name).await.map_err(collection_gone)
    }

    pub async fn load_state(&self) -> DbResult<LoadState> {
        self.live().await?
            .get_load_state(&self.name, None)
            .await
            .map_err(collection_gone)
    }

    pub async fn loading_progress(&self) -> DbResult<u32> {
        self.live().await?.loading_progress(&self.name).await.map_err(collection_gone)
    }

    /// Make every acknowledged write visible to search and query.
    pub async fn flush(&self) -> DbResult<()> {
        self.live().await?.flush(&self.name).await.map_err(collection_gone)
    }

    /// Drop the collection. Terminal for this handle.
    pub async fn drop(&self) -> DbResult<()> {
        self.live().await?.drop_collection(&self.name).await.map_err(collection_gone)?;
        self.dropped.store(true, Ordering::Release);
        info!("Dropped collection {} through its handle", self.name);
        Ok(())
    }

    pub async fn create_partition(&self, partition: &str) -> DbResult<()> {
        self.live().await?
            .create_partition(&self.name, partition)
            .await
            .map_err(collection_gone)
    }

    pub async fn drop_partition(&self, partition: &str) -> DbResult<()> {
        self.live().await?
            .drop_partition(&self.name, partition)
            .await
            .map_err(collection_gone)
    }

    pub async fn has_partition(&self, partition: &str) -> DbResult<bool> {
        self.live().await?
            .has_partition(&self.name, partition)
            .await
            .map_err(collection_gone)
    }

    pub async fn partitions(&self) -> DbResult<Vec<String>> {
        self.live().await?.list_partitions(&self.name).await.map_err(collection_gone)
    }

    pub async fn load_partitions(&self, partitions: &[&str]) -> DbResult<()> {
        let names: Vec<String> = partitions.iter().map(|p| p.to_string()).collect();
        self.live().await?
            .load_partitions(&self.name, &names)
            .await
            .map_err(collection_gone)
    }

    pub async fn release_partitions(&self, partitions: &[&str]) -> DbResult<()> {
        let names: Vec<String> = partitions.iter().map(|p| p.to_string()).collect();
        self.live().await?
            .release_partitions(&self.name, &names)
            .await
            .map_err(collection_gone)
    }

    pub async fn partition_load_state(&self, partition: &str) -> DbResult<LoadState> {
        self.live().await?
            .get_load_state(&self.name, Some(partition))
            .await
            .map_err(collection_gone)
    }

    pub async fn create_index(&self, params: IndexParams) -> DbResult<()> {
        self.live().await?
            .create_index(&self.name, params)
            .await
            .map_err(collection_gone)
    }

    pub async fn describe_index(&self, index: &str) -> DbResult<IndexDescription> {
        self.live().await?
            .describe_index(&self.name, index)
            .await
            .map_err(collection_gone)
    }

    pub async fn list_indexes(&self) -> DbResult<Vec<String>> {
        self.live().await?.list_indexes(&self.name).await.map_err(collection_gone)
    }

    pub async fn drop_index(&self, index: &str) -> DbResult<()> {
        self.live().await?
            .drop_index(&self.name, index)
            .await
            .map_err(collection_gone)
    }

    pub async fn insert(&self, rows: Vec<Row>) -> DbResult<MutationResult> {
        self.live().await?
            .insert(InsertRequest::new(&self.name, rows))
            .await
            .map_err(collection_gone)
    }

    pub async fn insert_into(&self, partition: &str, rows: Vec<Row>) -> DbResult<MutationResult> {
        self.live().await?
            .insert(InsertRequest::new(&self.name, rows).partition(partition))
            .await
            .map_err(collection_gone)
    }

    /// Insert column-oriented data: field name to an array of values.
    pub async fn insert_columns(&self, columns: &Map<String, Value>) -> DbResult<MutationResult> {
        let rows = columns_to_rows(columns)?;
        self.insert(rows).await
    }

    pub async fn upsert(&self, rows: Vec<Row>) -> DbResult<MutationResult> {
        self.live().await?
            .upsert(InsertRequest::new(&self.name, rows))
            .await
            .map_err(collection_gone)
    }

    pub async fn delete(&self, ids: Vec<PrimaryKey>) -> DbResult<DeleteResult> {
        self.live().await?
            .delete(DeleteRequest::by_ids(&self.name, ids))
            .await
            .map_err(collection_gone)
    }

    pub async fn delete_where(&self, filter: &str) -> DbResult<DeleteResult> {
        self.live().await?
            .delete(DeleteRequest::by_filter(&self.name, filter))
            .await
            .map_err(collection_gone)
    }

    /// `request.collection_name` is replaced by this handle's name.
    pub async fn search(&self, mut request: SearchRequest) -> DbResult<Vec<Vec<Hit>>> {
        request.collection_name = self.name.clone();
        self.live().await?.search(request).await.map_err(collection_gone)
    }

    pub async fn query(&self, mut request: QueryRequest) -> DbResult<Vec<Row>> {
        request.collection_name = self.name.clone();
        self.live().await?.query(request).await.map_err(collection_gone)
    }

    pub async fn get(&self, ids: Vec<PrimaryKey>, output_fields: &[&str]) -> DbResult<Vec<Row>> {
        self.live().await?
            .get(GetRequest::new(&self.name, ids).output_fields(output_fields))
            .await
            .map_err(collection_gone)
    }

    /// `request.limit` becomes the overall cap across batches.
    pub fn query_iterator(&self, mut request: QueryRequest) -> DbResult<QueryIterator> {
        self.check_dropped()?;
        request.collection_name = self.name.clone();
        QueryIterator::new(
            Arc::clone(&self.backend),
            self.id,
            request,
            &self.schema.primary_field().name,
            Arc::clone(&self.dropped),
        )
    }

    pub fn search_iterator(&self, mut request: SearchRequest, limit: Option<usize>) -> DbResult<SearchIterator> {
        self.check_dropped()?;
        request.collection_name = self.name.clone();
        SearchIterator::new(
            Arc::clone(&self.backend),
            self.id,
            request,
            limit,
            Arc::clone(&self.dropped),
        )
    }
}
