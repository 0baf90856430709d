// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

use crate::client::collection::CollectionHandle;
use crate::client::config::ClientConfig;
use crate::client::http::HttpBackend;
use crate::core::config::DbConfig;
use crate::core::error::{DbError, DbResult};
use crate::core::import::ImportJob;
use crate::core::index::{IndexParams, IndexType, MetricType};
use crate::core::request::CreateCollectionRequest;
use crate::core::schema::{CollectionOptions, CollectionSchema};
use crate::storage::backend::StorageBackend;
use crate::storage::memory::InMemoryBackend;

/// Entry point for applications.
///
/// Wraps any [`StorageBackend`]. Backend operations without a dedicated
/// wrapper (users, roles, aliases, imports) are reachable through `Deref`.
#[derive(Clone)]
pub struct VectorClient {
    backend: Arc<dyn StorageBackend>,
}

impl Deref for VectorClient {
    type Target = dyn StorageBackend;

    fn deref(&self) -> &Self::Target {
        self.backend.as_ref()
    }
}

impl VectorClient {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Embedded engine, acting as root.
    pub fn in_memory(config: DbConfig) -> Self {
        Self::new(Arc::new(InMemoryBackend::new(config)))
    }

    /// Connect to a REST server. Fails with `PermissionDenied` when the
    /// credentials are rejected and `Unavailable` when the server cannot be
    /// reached.
    pub async fn connect(config: ClientConfig) -> DbResult<Self> {
        let backend = HttpBackend::new(&config)?;
        backend.list_collections().await?;
        info!("Connected to {}", backend.base_url());
        Ok(Self::new(Arc::new(backend)))
    }

    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        Arc::clone(&self.backend)
    }

    pub async fn create_collection(&self, request: CreateCollectionRequest) -> DbResult<CollectionHandle> {
        let name = request.collection_name.clone();
        self.backend.create_collection(request).await?;
        CollectionHandle::open(self.backend(), &name).await
    }

    /// Create `name` with an `id` primary key, a `vector` field of
    /// `dimension` and dynamic fields on, indexed AUTOINDEX/COSINE and loaded.
    pub async fn create_collection_quick(&self, name: &str, dimension: usize) -> DbResult<CollectionHandle> {
        let schema = CollectionSchema::quick(dimension)?;
        let index_params = IndexParams::new().add_index(
            "vector",
            IndexType::AutoIndex,
            Some(MetricType::Cosine),
            None,
        );
        self.create_collection(CreateCollectionRequest {
            collection_name: name.to_string(),
            schema,
            index_params: Some(index_params),
            options: CollectionOptions {
                metric_type: Some(MetricType::Cosine),
                ..CollectionOptions::default()
            },
        })
        .await
    }

    /// Handle to an existing collection or alias.
    pub async fn collection(&self, name: &str) -> DbResult<CollectionHandle> {
        CollectionHandle::open(self.backend(), name).await
    }

    /// Poll an import job until it completes or fails.
    pub async fn wait_for_import(&self, job_id: &str, timeout: Duration) -> DbResult<ImportJob> {
        let deadline = Instant::now() + timeout;
        loop {
            let job = self.backend.get_import_progress(job_id).await?;
            if job.state.is_finished() {
                return Ok(job);
            }
            if Instant::now() >= deadline {
                return Err(DbError::Unavailable(format!(
                    "import job '{}' still running after {:?}",
                    job_id, timeout
                )));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_quick_setup_is_searchable() {
        let client = VectorClient::in_memory(DbConfig::immediate());
        let handle = client.create_collection_quick("quick", 3).await.unwrap();
        assert_eq!(handle.load_state().await.unwrap(), crate::core::LoadState::Loaded);

        let rows = vec![json!({"id": 1, "vector": [1.0, 0.0, 0.0], "color": "red"})
            .as_object()
            .unwrap()
            .clone()];
        handle.insert(rows).await.unwrap();
        let hits = handle
            .search(crate::core::request::SearchRequest::new("quick", vec![vec![1.0, 0.0, 0.0]], 5))
            .await
            .unwrap();
        assert_eq!(hits[0].len(), 1);
        assert!(client.has_collection("quick").await.unwrap());
    }

    #[tokio::test]
    async fn test_dropped_handle_reports_not_found() {
        let client = VectorClient::in_memory(DbConfig::immediate());
        let handle = client.create_collection_quick("temp", 2).await.unwrap();
        handle.drop().await.unwrap();
        assert!(matches!(handle.load().await, Err(DbError::NotFound(_))));
        assert!(matches!(handle.drop().await, Err(DbError::NotFound(_))));
    }
}
