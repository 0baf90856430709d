// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! [`StorageBackend`] over the REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::client::config::ClientConfig;
use crate::client::transport::{retry_with_backoff, RetryConfig, TransportError};
use crate::core::collection::{AliasDescription, CollectionDescription};
use crate::core::error::{DbError, DbResult};
use crate::core::import::ImportJob;
use crate::core::index::{IndexDescription, IndexParams};
use crate::core::rbac::{Grant, RoleDescription, UserDescription};
use crate::core::request::{
    CreateCollectionRequest, DeleteRequest, GetRequest, ImportRequest, InsertRequest,
    QueryRequest, SearchRequest,
};
use crate::core::types::{DeleteResult, Hit, LoadState, MutationResult, Row};
use crate::storage::backend::StorageBackend;

#[derive(Debug, Deserialize)]
struct Envelope {
    code: u16,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<DbError>,
}

#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    bearer: Option<String>,
    retry: RetryConfig,
}

fn to_body<T: Serialize>(value: &T) -> DbResult<Value> {
    serde_json::to_value(value).map_err(|e| DbError::Internal(format!("encoding request: {}", e)))
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> DbResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| DbError::Internal(format!("building HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: config.uri.trim_end_matches('/').to_string(),
            bearer: config.bearer(),
            retry: RetryConfig::with_max_attempts(config.max_retries),
        })
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, url: &str, body: &Value) -> Result<Envelope, TransportError> {
        let mut request = self.client.post(url).json(body);
        if let Some(bearer) = &self.bearer {
            request = request.bearer_auth(bearer);
        }
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        match serde_json::from_str::<Envelope>(&text) {
            Ok(envelope) => Ok(envelope),
            Err(e) if status.is_success() => Err(TransportError::Decode(e.to_string())),
            Err(_) => Err(TransportError::Server {
                status: status.as_u16(),
                body: text,
            }),
        }
    }

    /// POST `body` to `/v2/vectordb/{group}/{action}` and decode `data`.
    pub async fn call<T: DeserializeOwned>(&self, group: &str, action: &str, body: Value) -> DbResult<T> {
        let url = format!("{}/v2/vectordb/{}/{}", self.base_url, group, action);
        debug!("POST {}", url);
        let envelope = retry_with_backoff(&self.retry, || self.send(&url, &body)).await?;

        if envelope.code == 0 {
            return serde_json::from_value(envelope.data).map_err(|e| {
                DbError::Internal(format!("decoding {}/{} response: {}", group, action, e))
            });
        }
        Err(envelope.error.unwrap_or_else(|| {
            DbError::Internal(
                envelope
                    .message
                    .unwrap_or_else(|| format!("server returned code {}", envelope.code)),
            )
        }))
    }
}

#[async_trait]
impl StorageBackend for HttpBackend {
    async fn create_collection(&self, request: CreateCollectionRequest) -> DbResult<()> {
        self.call("collections", "create", to_body(&request)?).await
    }

    async fn drop_collection(&self, collection: &str) -> DbResult<()> {
        self.call("collections", "drop", json!({"collection_name": collection}))
            .await
    }

    async fn has_collection(&self, collection: &str) -> DbResult<bool> {
        self.call("collections", "has", json!({"collection_name": collection}))
            .await
    }

    async fn list_collections(&self) -> DbResult<Vec<String>> {
        self.call("collections", "list", json!({})).await
    }

    async fn describe_collection(&self, collection: &str) -> DbResult<CollectionDescription> {
        self.call("collections", "describe", json!({"collection_name": collection}))
            .await
    }

    async fn load_collection(&self, collection: &str) -> DbResult<()> {
        self.call("collections", "load", json!({"collection_name": collection}))
            .await
    }

    async fn release_collection(&self, collection: &str) -> DbResult<()> {
        self.call("collections", "release", json!({"collection_name": collection}))
            .await
    }

    async fn get_load_state(&self, collection: &str, partition: Option<&str>) -> DbResult<LoadState> {
        self.call(
            "collections",
            "get_load_state",
            json!({"collection_name": collection, "partition_name": partition}),
        )
        .await
    }

    async fn loading_progress(&self, collection: &str) -> DbResult<u32> {
        self.call("collections", "get_load_progress", json!({"collection_name": collection}))
            .await
    }

    async fn flush(&self, collection: &str) -> DbResult<()> {
        self.call("collections", "flush", json!({"collection_name": collection}))
            .await
    }

    async fn create_partition(&self, collection: &str, partition: &str) -> DbResult<()> {
        self.call(
            "partitions",
            "create",
            json!({"collection_name": collection, "partition_name": partition}),
        )
        .await
    }

    async fn drop_partition(&self, collection: &str, partition: &str) -> DbResult<()> {
        self.call(
            "partitions",
            "drop",
            json!({"collection_name": collection, "partition_name": partition}),
        )
        .await
    }

    async fn has_partition(&self, collection: &str, partition: &str) -> DbResult<bool> {
        self.call(
            "partitions",
            "has",
            json!({"collection_name": collection, "partition_name": partition}),
        )
        .await
    }

    async fn list_partitions(&self, collection: &str) -> DbResult<Vec<String>> {
        self.call("partitions", "list", json!({"collection_name": collection}))
            .await
    }

    async fn load_partitions(&self, collection: &str, partitions: &[String]) -> DbResult<()> {
        self.call(
            "partitions",
            "load",
            json!({"collection_name": collection, "partition_names": partitions}),
        )
        .await
    }

    async fn release_partitions(&self, collection: &str, partitions: &[String]) -> DbResult<()> {
        self.call(
            "partitions",
            "release",
            json!({"collection_name": collection, "partition_names": partitions}),
        )
        .await
    }

    async fn create_index(&self, collection: &str, params: IndexParams) -> DbResult<()> {
        self.call(
            "indexes",
            "create",
            json!({"collection_name": collection, "index_params": to_body(&params)?}),
        )
        .await
    }

    async fn describe_index(&self, collection: &str, index: &str) -> DbResult<IndexDescription> {
        self.call(
            "indexes",
            "describe",
            json!({"collection_name": collection, "index_name": index}),
        )
        .await
    }

    async fn list_indexes(&self, collection: &str) -> DbResult<Vec<String>> {
        self.call("indexes", "list", json!({"collection_name": collection}))
            .await
    }

    async fn drop_index(&self, collection: &str, index: &str) -> DbResult<()> {
        self.call(
            "indexes",
            "drop",
            json!({"collection_name": collection, "index_name": index}),
        )
        .await
    }

    async fn create_alias(&self, collection: &str, alias: &str) -> DbResult<()> {
        self.call(
            "aliases",
            "create",
            json!({"collection_name": collection, "alias": alias}),
        )
        .await
    }

    async fn drop_alias(&self, alias: &str) -> DbResult<()> {
        self.call("aliases", "drop", json!({"alias": alias})).await
    }

    async fn alter_alias(&self, collection: &str, alias: &str) -> DbResult<()> {
        self.call(
            "aliases",
            "alter",
            json!({"collection_name": collection, "alias": alias}),
        )
        .await
    }

    async fn describe_alias(&self, alias: &str) -> DbResult<AliasDescription> {
        self.call("aliases", "describe", json!({"alias": alias})).await
    }

    async fn list_aliases(&self, collection: &str) -> DbResult<Vec<String>> {
        self.call("aliases", "list", json!({"collection_name": collection}))
            .await
    }

    async fn insert(&self, request: InsertRequest) -> DbResult<MutationResult> {
        self.call("entities", "insert", to_body(&request)?).await
    }

    async fn upsert(&self, request: InsertRequest) -> DbResult<MutationResult> {
        self.call("entities", "upsert", to_body(&request)?).await
    }

    async fn delete(&self, request: DeleteRequest) -> DbResult<DeleteResult> {
        self.call("entities", "delete", to_body(&request)?).await
    }

    async fn search(&self, request: SearchRequest) -> DbResult<Vec<Vec<Hit>>> {
        self.call("entities", "search", to_body(&request)?).await
    }

    async fn query(&self, request: QueryRequest) -> DbResult<Vec<Row>> {
        self.call("entities", "query", to_body(&request)?).await
    }

    async fn get(&self, request: GetRequest) -> DbResult<Vec<Row>> {
        self.call("entities", "get", to_body(&request)?).await
    }

    async fn create_user(&self, user: &str, password: &str) -> DbResult<()> {
        self.call(
            "users",
            "create",
            json!({"user_name": user, "password": password}),
        )
        .await
    }

    async fn drop_user(&self, user: &str) -> DbResult<()> {
        self.call("users", "drop", json!({"user_name": user})).await
    }

    async fn update_password(&self, user: &str, old_password: &str, new_password: &str) -> DbResult<()> {
        self.call(
            "users",
            "update_password",
            json!({
                "user_name": user,
                "old_password": old_password,
                "new_password": new_password,
            }),
        )
        .await
    }

    async fn list_users(&self) -> DbResult<Vec<String>> {
        self.call("users", "list", json!({})).await
    }

    async fn describe_user(&self, user: &str) -> DbResult<UserDescription> {
        self.call("users", "describe", json!({"user_name": user})).await
    }

    async fn create_role(&self, role: &str) -> DbResult<()> {
        self.call("roles", "create", json!({"role_name": role})).await
    }

    async fn drop_role(&self, role: &str) -> DbResult<()> {
        self.call("roles", "drop", json!({"role_name": role})).await
    }

    async fn list_roles(&self) -> DbResult<Vec<String>> {
        self.call("roles", "list", json!({})).await
    }

    async fn describe_role(&self, role: &str) -> DbResult<RoleDescription> {
        self.call("roles", "describe", json!({"role_name": role})).await
    }

    async fn grant_role(&self, user: &str, role: &str) -> DbResult<()> {
        self.call(
            "users",
            "grant_role",
            json!({"user_name": user, "role_name": role}),
        )
        .await
    }

    async fn revoke_role(&self, user: &str, role: &str) -> DbResult<()> {
        self.call(
            "users",
            "revoke_role",
            json!({"user_name": user, "role_name": role}),
        )
        .await
    }

    async fn grant_privilege(&self, role: &str, grant: Grant) -> DbResult<()> {
        self.call(
            "roles",
            "grant_privilege",
            json!({"role_name": role, "grant": to_body(&grant)?}),
        )
        .await
    }

    async fn revoke_privilege(&self, role: &str, grant: Grant) -> DbResult<()> {
        self.call(
            "roles",
            "revoke_privilege",
            json!({"role_name": role, "grant": to_body(&grant)?}),
        )
        .await
    }

    async fn create_import_job(&self, request: ImportRequest) -> DbResult<String> {
        self.call("jobs", "create_import", to_body(&request)?).await
    }

    async fn get_import_progress(&self, job_id: &str) -> DbResult<ImportJob> {
        self.call("jobs", "get_import_progress", json!({"job_id": job_id}))
            .await
    }

    async fn list_import_jobs(&self, collection: Option<&str>) -> DbResult<Vec<ImportJob>> {
        self.call("jobs", "list_import", json!({"collection_name": collection}))
            .await
    }
}
