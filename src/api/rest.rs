// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! RPC-style HTTP front end for the in-memory engine.
//!
//! Every operation is `POST /v2/vectordb/{group}/{action}` with a JSON body.
//! Success is `{"code": 0, "data": ...}`; failure is
//! `{"code": n, "message": ..., "error": <DbError>}` with an HTTP status
//! derived from the error kind.

use crate::core::config::DbConfig;
use crate::core::error::{DbError, DbResult};
use crate::core::index::IndexParams;
use crate::core::rbac::Grant;
use crate::core::request::{
    CreateCollectionRequest, DeleteRequest, GetRequest, ImportRequest, InsertRequest,
    QueryRequest, SearchRequest,
};
use crate::storage::{InMemoryBackend, StorageBackend};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub max_request_size: usize,
    #[serde(with = "crate::core::config::duration_millis")]
    pub timeout: Duration,
    pub cors_origins: Vec<String>,
    /// Bearer token accepted as root, in addition to `user:password`.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub db: DbConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 19530,
            max_request_size: 10 * 1024 * 1024, // 10MB
            timeout: Duration::from_secs(30),
            cors_origins: vec!["*".to_string()],
            api_key: None,
            db: DbConfig::default(),
        }
    }
}

impl ApiConfig {
    /// Read `VECTOR_DB_*` overrides on top of the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("VECTOR_DB_HOST").unwrap_or(defaults.host),
            port: std::env::var("VECTOR_DB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            max_request_size: std::env::var("VECTOR_DB_MAX_REQUEST_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_request_size),
            timeout: std::env::var("VECTOR_DB_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            cors_origins: std::env::var("VECTOR_DB_CORS_ORIGINS")
                .ok()
                .map(|origins| origins.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
            api_key: std::env::var("VECTOR_DB_API_KEY").ok(),
            db: DbConfig::from_env(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub backend: InMemoryBackend,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub collections: usize,
}

// Error handling
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    pub error: DbError,
    #[serde(skip)]
    pub status_code: StatusCode,
}

/// HTTP status for an error kind.
pub fn status_for(error: &DbError) -> StatusCode {
    match error {
        DbError::UnknownCollection(_) | DbError::NotFound(_) => StatusCode::NOT_FOUND,
        DbError::AlreadyExists(_)
        | DbError::NotLoaded(_)
        | DbError::InvalidState(_)
        | DbError::Closed(_) => StatusCode::CONFLICT,
        DbError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        DbError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DbError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

impl From<DbError> for ErrorResponse {
    fn from(error: DbError) -> Self {
        Self {
            code: error.code(),
            message: error.to_string(),
            status_code: status_for(&error),
            error,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status_code, Json(self)).into_response()
    }
}

pub async fn create_app(config: ApiConfig) -> Result<Router, anyhow::Error> {
    anyhow::ensure!(config.db.is_valid(), "invalid database configuration: {:?}", config.db);
    let backend = InMemoryBackend::new(config.db.clone());
    Ok(create_app_with_backend(&config, backend))
}

/// Build the router around an existing engine, e.g. one sharing an object
/// store with the caller.
pub fn create_app_with_backend(config: &ApiConfig, backend: InMemoryBackend) -> Router {
    let state = AppState {
        backend,
        api_key: config.api_key.clone(),
        timeout: config.timeout,
    };

    Router::new()
        .route("/health", get(health_handler))
        .route("/v2/vectordb/:group/:action", post(dispatch))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&config.cors_origins))
                .map_response(IntoResponse::into_response)
                .layer(RequestBodyLimitLayer::new(config.max_request_size)),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|o| HeaderValue::from_str(o).ok()))
    };
    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_handler(State(state): State<AppState>) -> Result<Json<HealthResponse>, ErrorResponse> {
    let collections = state.backend.list_collections().await?.len();
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        collections,
    }))
}

async fn session(state: &AppState, headers: &HeaderMap) -> DbResult<InMemoryBackend> {
    if !state.backend.config().authorization_enabled {
        return Ok(state.backend.clone());
    }
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| DbError::PermissionDenied("missing bearer token".to_string()))?;
    if state.api_key.as_deref() == Some(token) {
        return Ok(state.backend.clone());
    }
    let (user, password) = token.split_once(':').ok_or_else(|| {
        DbError::PermissionDenied("bearer token must be 'user:password' or the API key".to_string())
    })?;
    state.backend.authenticate(user, password).await
}

async fn dispatch(
    State(state): State<AppState>,
    Path((group, action)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ErrorResponse> {
    let body: Value = if body.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&body).map_err(DbError::from)?
    };
    let backend = session(&state, &headers).await?;

    let data = tokio::time::timeout(state.timeout, route(&backend, &group, &action, body))
        .await
        .map_err(|_| DbError::Unavailable(format!("{}/{} timed out", group, action)))?;
    match data {
        Ok(data) => {
            debug!("{}/{} ok", group, action);
            Ok(Json(json!({"code": 0, "data": data})))
        }
        Err(e) => {
            debug!("{}/{} failed: {}", group, action, e);
            Err(e.into())
        }
    }
}

/// Plain string arguments shared by most actions.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Args {
    collection_name: Option<String>,
    partition_name: Option<String>,
    partition_names: Vec<String>,
    index_name: Option<String>,
    alias: Option<String>,
    user_name: Option<String>,
    role_name: Option<String>,
    password: Option<String>,
    old_password: Option<String>,
    new_password: Option<String>,
    job_id: Option<String>,
}

fn required<'a>(value: &'a Option<String>, key: &str) -> DbResult<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| DbError::Validation(format!("missing '{}' in request body", key)))
}

fn field<T: DeserializeOwned>(body: &Value, key: &str) -> DbResult<T> {
    let value = body
        .get(key)
        .cloned()
        .ok_or_else(|| DbError::Validation(format!("missing '{}' in request body", key)))?;
    Ok(serde_json::from_value(value)?)
}

fn parse<T: DeserializeOwned>(body: Value) -> DbResult<T> {
    Ok(serde_json::from_value(body)?)
}

fn to_data<T: Serialize>(value: T) -> DbResult<Value> {
    serde_json::to_value(value).map_err(|e| DbError::Internal(format!("encoding response: {}", e)))
}

async fn route(backend: &InMemoryBackend, group: &str, action: &str, body: Value) -> DbResult<Value> {
    let args: Args = serde_json::from_value(body.clone())?;
    let collection = || required(&args.collection_name, "collection_name");
    let partition = || required(&args.partition_name, "partition_name");
    let index = || required(&args.index_name, "index_name");
    let alias = || required(&args.alias, "alias");
    let user = || required(&args.user_name, "user_name");
    let role = || required(&args.role_name, "role_name");

    match (group, action) {
        ("collections", "create") => {
            let request: CreateCollectionRequest = parse(body)?;
            info!("REST create collection {}", request.collection_name);
            to_data(backend.create_collection(request).await?)
        }
        ("collections", "drop") => to_data(backend.drop_collection(collection()?).await?),
        ("collections", "has") => to_data(backend.has_collection(collection()?).await?),
        ("collections", "list") => to_data(backend.list_collections().await?),
        ("collections", "describe") => to_data(backend.describe_collection(collection()?).await?),
        ("collections", "load") => to_data(backend.load_collection(collection()?).await?),
        ("collections", "release") => to_data(backend.release_collection(collection()?).await?),
        ("collections", "get_load_state") => to_data(
            backend
                .get_load_state(collection()?, args.partition_name.as_deref())
                .await?,
        ),
        ("collections", "get_load_progress") => {
            to_data(backend.loading_progress(collection()?).await?)
        }
        ("collections", "flush") => to_data(backend.flush(collection()?).await?),

        ("partitions", "create") => {
            to_data(backend.create_partition(collection()?, partition()?).await?)
        }
        ("partitions", "drop") => to_data(backend.drop_partition(collection()?, partition()?).await?),
        ("partitions", "has") => to_data(backend.has_partition(collection()?, partition()?).await?),
        ("partitions", "list") => to_data(backend.list_partitions(collection()?).await?),
        ("partitions", "load") => {
            to_data(backend.load_partitions(collection()?, &args.partition_names).await?)
        }
        ("partitions", "release") => {
            to_data(backend.release_partitions(collection()?, &args.partition_names).await?)
        }

        ("indexes", "create") => {
            let params: IndexParams = field(&body, "index_params")?;
            to_data(backend.create_index(collection()?, params).await?)
        }
        ("indexes", "describe") => to_data(backend.describe_index(collection()?, index()?).await?),
        ("indexes", "list") => to_data(backend.list_indexes(collection()?).await?),
        ("indexes", "drop") => to_data(backend.drop_index(collection()?, index()?).await?),

        ("aliases", "create") => to_data(backend.create_alias(collection()?, alias()?).await?),
        ("aliases", "drop") => to_data(backend.drop_alias(alias()?).await?),
        ("aliases", "alter") => to_data(backend.alter_alias(collection()?, alias()?).await?),
        ("aliases", "describe") => to_data(backend.describe_alias(alias()?).await?),
        ("aliases", "list") => to_data(backend.list_aliases(collection()?).await?),

        ("entities", "insert") => to_data(backend.insert(parse::<InsertRequest>(body)?).await?),
        ("entities", "upsert") => to_data(backend.upsert(parse::<InsertRequest>(body)?).await?),
        ("entities", "delete") => to_data(backend.delete(parse::<DeleteRequest>(body)?).await?),
        ("entities", "search") => to_data(backend.search(parse::<SearchRequest>(body)?).await?),
        ("entities", "query") => to_data(backend.query(parse::<QueryRequest>(body)?).await?),
        ("entities", "get") => to_data(backend.get(parse::<GetRequest>(body)?).await?),

        ("users", "create") => {
            to_data(backend.create_user(user()?, required(&args.password, "password")?).await?)
        }
        ("users", "drop") => to_data(backend.drop_user(user()?).await?),
        ("users", "update_password") => to_data(
            backend
                .update_password(
                    user()?,
                    required(&args.old_password, "old_password")?,
                    required(&args.new_password, "new_password")?,
                )
                .await?,
        ),
        ("users", "list") => to_data(backend.list_users().await?),
        ("users", "describe") => to_data(backend.describe_user(user()?).await?),
        ("users", "grant_role") => to_data(backend.grant_role(user()?, role()?).await?),
        ("users", "revoke_role") => to_data(backend.revoke_role(user()?, role()?).await?),

        ("roles", "create") => to_data(backend.create_role(role()?).await?),
        ("roles", "drop") => to_data(backend.drop_role(role()?).await?),
        ("roles", "list") => to_data(backend.list_roles().await?),
        ("roles", "describe") => to_data(backend.describe_role(role()?).await?),
        ("roles", "grant_privilege") => {
            let grant: Grant = field(&body, "grant")?;
            to_data(backend.grant_privilege(role()?, grant).await?)
        }
        ("roles", "revoke_privilege") => {
            let grant: Grant = field(&body, "grant")?;
            to_data(backend.revoke_privilege(role()?, grant).await?)
        }

        ("jobs", "create_import") => {
            to_data(backend.create_import_job(parse::<ImportRequest>(body)?).await?)
        }
        ("jobs", "get_import_progress") => {
            to_data(backend.get_import_progress(required(&args.job_id, "job_id")?).await?)
        }
        ("jobs", "list_import") => {
            to_data(backend.list_import_jobs(args.collection_name.as_deref()).await?)
        }

        _ => Err(DbError::UnsupportedOperation(format!(
            "unknown endpoint '{}/{}'",
            group, action
        ))),
    }
}
