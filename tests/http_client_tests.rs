// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

mod common;

use common::{index, product_row, product_schema};
use std::sync::Arc;
use std::time::Duration;
use vector_client::api::rest::{create_app, ApiConfig};
use vector_client::client::{HttpBackend, RetryConfig};
use vector_client::core::index::MetricType;
use vector_client::core::request::{CreateCollectionRequest, QueryRequest, SearchRequest};
use vector_client::core::schema::CollectionOptions;
use vector_client::core::types::PrimaryKey;
use vector_client::storage::StorageBackend;
use vector_client::{ClientConfig, DbConfig, DbError, VectorClient};

fn fast_retry(max_attempts: usize) -> RetryConfig {
    RetryConfig {
        max_attempts,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential_base: 2.0,
    }
}

fn backend(url: &str) -> HttpBackend {
    HttpBackend::new(&ClientConfig::new(url)).unwrap().with_retry(fast_retry(3))
}

#[cfg(test)]
mod mock_server_tests {
    use super::*;

    #[tokio::test]
    async fn test_envelope_data_is_decoded() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v2/vectordb/collections/list")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"code":0,"data":["alpha","beta"]}"#)
            .create_async()
            .await;

        let names = backend(&server.url()).list_collections().await.unwrap();
        assert_eq!(names, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_envelope_error_is_decoded() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v2/vectordb/collections/describe")
            .with_status(404)
            .with_body(
                r#"{"code":1103,"message":"Unknown collection: collection 'ghost' does not exist",
                    "error":{"kind":"unknown_collection","detail":"collection 'ghost' does not exist"}}"#,
            )
            .create_async()
            .await;

        let err = backend(&server.url())
            .describe_collection("ghost")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DbError::UnknownCollection("collection 'ghost' does not exist".to_string())
        );
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_then_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/v2/vectordb/collections/has")
            .with_status(503)
            .with_body("overloaded")
            .expect(3)
            .create_async()
            .await;

        let err = backend(&server.url()).has_collection("any").await.unwrap_err();
        assert!(matches!(err, DbError::Unavailable(_)));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/v2/vectordb/collections/has")
            .with_status(413)
            .with_body("too large")
            .expect(1)
            .create_async()
            .await;

        let err = backend(&server.url()).has_collection("any").await.unwrap_err();
        assert!(matches!(err, DbError::Validation(_)));
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_bearer_token_is_sent() {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/v2/vectordb/users/list")
            .match_header("authorization", "Bearer alice:pw")
            .with_status(200)
            .with_body(r#"{"code":0,"data":["alice","root"]}"#)
            .create_async()
            .await;

        let config = ClientConfig::new(&server.url()).with_credentials("alice", "pw");
        let users = HttpBackend::new(&config).unwrap().list_users().await.unwrap();
        assert_eq!(users, vec!["alice", "root"]);
        m.assert_async().await;
    }

    #[tokio::test]
    async fn test_garbage_success_body_is_internal() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/v2/vectordb/collections/list")
            .with_status(200)
            .with_body("<html>proxy</html>")
            .create_async()
            .await;

        let err = backend(&server.url()).list_collections().await.unwrap_err();
        assert!(matches!(err, DbError::Internal(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_unavailable() {
        let err = backend("http://127.0.0.1:9").list_collections().await.unwrap_err();
        assert!(matches!(err, DbError::Unavailable(_)));
    }
}

#[cfg(test)]
mod live_server_tests {
    use super::*;

    async fn serve(config: ApiConfig) -> String {
        let app = create_app(config).await.unwrap();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_client_against_rest_server() {
        let url = serve(ApiConfig {
            db: DbConfig::immediate(),
            ..ApiConfig::default()
        })
        .await;
        let client = VectorClient::connect(ClientConfig::new(&url)).await.unwrap();

        let handle = client
            .create_collection(CreateCollectionRequest {
                collection_name: "remote".to_string(),
                schema: product_schema(),
                index_params: Some(index(MetricType::L2)),
                options: CollectionOptions::default(),
            })
            .await
            .unwrap();
        handle.insert((0..30).map(product_row).collect()).await.unwrap();

        let hits = handle
            .search(SearchRequest::new("", vec![vec![4.0, 0.0, 0.0, 1.0]], 1).output_fields(&["color"]))
            .await
            .unwrap();
        assert_eq!(hits[0][0].id, PrimaryKey::Int(4));
        assert_eq!(hits[0][0].entity["color"], "red");

        let mut iter = handle
            .query_iterator(QueryRequest::new("", r#"color == "blue""#))
            .unwrap();
        let mut seen = 0;
        loop {
            let batch = iter.next(3).await.unwrap();
            if batch.is_empty() {
                break;
            }
            seen += batch.len();
        }
        assert_eq!(seen, 7);

        handle.drop().await.unwrap();
        assert!(!client.has_collection("remote").await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_checks_credentials() {
        let url = serve(ApiConfig {
            db: DbConfig {
                authorization_enabled: true,
                ..DbConfig::immediate()
            },
            ..ApiConfig::default()
        })
        .await;

        let denied = VectorClient::connect(ClientConfig::new(&url).with_credentials("root", "nope")).await;
        assert!(matches!(denied, Err(DbError::PermissionDenied(_))));

        let client = VectorClient::connect(ClientConfig::new(&url).with_credentials("root", "Milvus"))
            .await
            .unwrap();
        client.create_user("remote_user", "pw_123").await.unwrap();
        let backend: Arc<dyn StorageBackend> = client.backend();
        assert!(backend
            .list_users()
            .await
            .unwrap()
            .contains(&"remote_user".to_string()));
    }
}
