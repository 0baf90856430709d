// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Object storage seam used by bulk import.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::error::DbError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ObjectStoreError {
    #[error("Object not found: {0}")]
    NotFound(String),
    #[error("Network error: {0}")]
    NetworkError(String),
}

impl From<ObjectStoreError> for DbError {
    fn from(e: ObjectStoreError) -> Self {
        match e {
            ObjectStoreError::NotFound(key) => {
                DbError::NotFound(format!("object '{}' does not exist", key))
            }
            ObjectStoreError::NetworkError(msg) => DbError::Unavailable(msg),
        }
    }
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError>;
    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), ObjectStoreError>;
    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;
}

/// Bucket kept in memory, for tests and the reference server.
#[derive(Clone, Default)]
pub struct InMemoryObjectStore {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, ObjectStoreError> {
        let data = self.data.read().await;
        data.get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), ObjectStoreError> {
        let mut storage = self.data.write().await;
        storage.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let mut storage = self.data.write().await;
        storage.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        let data = self.data.read().await;
        Ok(data
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
