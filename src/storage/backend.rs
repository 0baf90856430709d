// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! The service boundary.
//!
//! Everything the client can ask of a vector database goes through
//! [`StorageBackend`]. The in-memory engine implements it directly; the
//! HTTP client implements it by forwarding each call to the REST API.

use async_trait::async_trait;

use crate::core::collection::{AliasDescription, CollectionDescription};
use crate::core::error::DbResult;
use crate::core::import::ImportJob;
use crate::core::index::{IndexDescription, IndexParams};
use crate::core::rbac::{Grant, RoleDescription, UserDescription};
use crate::core::request::{
    CreateCollectionRequest, DeleteRequest, GetRequest, ImportRequest, InsertRequest,
    QueryRequest, SearchRequest,
};
use crate::core::types::{DeleteResult, Hit, LoadState, MutationResult, Row};

#[async_trait]
pub trait StorageBackend: Send + Sync {
    // collections
    async fn create_collection(&self, request: CreateCollectionRequest) -> DbResult<()>;
    async fn drop_collection(&self, collection: &str) -> DbResult<()>;
    async fn has_collection(&self, collection: &str) -> DbResult<bool>;
    async fn list_collections(&self) -> DbResult<Vec<String>>;
    async fn describe_collection(&self, collection: &str) -> DbResult<CollectionDescription>;

    /// Id of the collection `collection` currently resolves to.
    async fn collection_id(&self, collection: &str) -> DbResult<i64> {
        Ok(self.describe_collection(collection).await?.collection_id)
    }

    async fn load_collection(&self, collection: &str) -> DbResult<()>;
    async fn release_collection(&self, collection: &str) -> DbResult<()>;
    async fn get_load_state(&self, collection: &str, partition: Option<&str>) -> DbResult<LoadState>;
    async fn loading_progress(&self, collection: &str) -> DbResult<u32>;
    async fn flush(&self, collection: &str) -> DbResult<()>;

    // partitions
    async fn create_partition(&self, collection: &str, partition: &str) -> DbResult<()>;
    async fn drop_partition(&self, collection: &str, partition: &str) -> DbResult<()>;
    async fn has_partition(&self, collection: &str, partition: &str) -> DbResult<bool>;
    async fn list_partitions(&self, collection: &str) -> DbResult<Vec<String>>;
    async fn load_partitions(&self, collection: &str, partitions: &[String]) -> DbResult<()>;
    async fn release_partitions(&self, collection: &str, partitions: &[String]) -> DbResult<()>;

    // indexes
    async fn create_index(&self, collection: &str, params: IndexParams) -> DbResult<()>;
    async fn describe_index(&self, collection: &str, index: &str) -> DbResult<IndexDescription>;
    async fn list_indexes(&self, collection: &str) -> DbResult<Vec<String>>;
    async fn drop_index(&self, collection: &str, index: &str) -> DbResult<()>;

    // aliases
    async fn create_alias(&self, collection: &str, alias: &str) -> DbResult<()>;
    async fn drop_alias(&self, alias: &str) -> DbResult<()>;
    async fn alter_alias(&self, collection: &str, alias: &str) -> DbResult<()>;
    async fn describe_alias(&self, alias: &str) -> DbResult<AliasDescription>;
    async fn list_aliases(&self, collection: &str) -> DbResult<Vec<String>>;

    // data
    async fn insert(&self, request: InsertRequest) -> DbResult<MutationResult>;
    async fn upsert(&self, request: InsertRequest) -> DbResult<MutationResult>;
    async fn delete(&self, request: DeleteRequest) -> DbResult<DeleteResult>;
    async fn search(&self, request: SearchRequest) -> DbResult<Vec<Vec<Hit>>>;
    async fn query(&self, request: QueryRequest) -> DbResult<Vec<Row>>;
    async fn get(&self, request: GetRequest) -> DbResult<Vec<Row>>;

    // users and roles
    async fn create_user(&self, user: &str, password: &str) -> DbResult<()>;
    async fn drop_user(&self, user: &str) -> DbResult<()>;
    async fn update_password(&self, user: &str, old_password: &str, new_password: &str) -> DbResult<()>;
    async fn list_users(&self) -> DbResult<Vec<String>>;
    async fn describe_user(&self, user: &str) -> DbResult<UserDescription>;
    async fn create_role(&self, role: &str) -> DbResult<()>;
    async fn drop_role(&self, role: &str) -> DbResult<()>;
    async fn list_roles(&self) -> DbResult<Vec<String>>;
    async fn describe_role(&self, role: &str) -> DbResult<RoleDescription>;
    async fn grant_role(&self, user: &str, role: &str) -> DbResult<()>;
    async fn revoke_role(&self, user: &str, role: &str) -> DbResult<()>;
    async fn grant_privilege(&self, role: &str, grant: Grant) -> DbResult<()>;
    async fn revoke_privilege(&self, role: &str, grant: Grant) -> DbResult<()>;

    // bulk import
    async fn create_import_job(&self, request: ImportRequest) -> DbResult<String>;
    async fn get_import_progress(&self, job_id: &str) -> DbResult<ImportJob>;
    async fn list_import_jobs(&self, collection: Option<&str>) -> DbResult<Vec<ImportJob>>;
}
