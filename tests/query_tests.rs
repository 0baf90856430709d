// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

mod common;

use common::products;
use serde_json::json;
use vector_client::core::index::MetricType;
use vector_client::core::request::QueryRequest;
use vector_client::core::types::{PrimaryKey, Row};
use vector_client::DbError;

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter().map(|row| row["id"].as_i64().unwrap()).collect()
}

#[cfg(test)]
mod paging_tests {
    use super::*;

    #[tokio::test]
    async fn test_rows_come_back_in_key_order() {
        let (_client, handle) = products(30, MetricType::L2).await;
        let rows = handle.query(QueryRequest::new("", "id >= 25")).await.unwrap();
        assert_eq!(ids(&rows), vec![25, 26, 27, 28, 29]);
    }

    #[tokio::test]
    async fn test_limit_and_offset() {
        let (_client, handle) = products(30, MetricType::L2).await;
        let rows = handle
            .query(QueryRequest::new("", r#"color == "green""#).offset(2).limit(3))
            .await
            .unwrap();
        // green ids are 1, 5, 9, 13, 17, ...
        assert_eq!(ids(&rows), vec![9, 13, 17]);

        let rows = handle
            .query(QueryRequest::new("", "").offset(28).limit(10))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![28, 29]);
    }

    #[tokio::test]
    async fn test_query_window_is_bounded() {
        let (_client, handle) = products(1, MetricType::L2).await;
        let request = QueryRequest::new("", "").offset(16000).limit(1000);
        assert!(matches!(handle.query(request).await, Err(DbError::Validation(_))));
    }

    #[tokio::test]
    async fn test_overflowing_window_is_rejected() {
        let (_client, handle) = products(3, MetricType::L2).await;
        let request = QueryRequest::new("", "").offset(usize::MAX).limit(2);
        assert!(matches!(handle.query(request).await, Err(DbError::Validation(_))));
        let request = QueryRequest::new("", "").offset(1).limit(usize::MAX);
        assert!(matches!(handle.query(request).await, Err(DbError::Validation(_))));
    }
}

#[cfg(test)]
mod projection_tests {
    use super::*;

    #[tokio::test]
    async fn test_count_star() {
        let (_client, handle) = products(25, MetricType::L2).await;
        let rows = handle
            .query(QueryRequest::new("", "price > 30").output_fields(&["count(*)"]))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        // price = 1.5 * id, so ids 21..=24
        assert_eq!(rows[0]["count(*)"], 4);

        assert!(matches!(
            handle
                .query(QueryRequest::new("", "").output_fields(&["count(*)", "color"]))
                .await,
            Err(DbError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_star_selects_declared_and_dynamic() {
        let (_client, handle) = products(2, MetricType::L2).await;
        let rows = handle
            .query(QueryRequest::new("", "id == 1").output_fields(&["*"]))
            .await
            .unwrap();
        let row = &rows[0];
        for field in ["id", "color", "color_tag", "price", "tags", "meta", "vector", "batch"] {
            assert!(row.contains_key(field), "missing {}", field);
        }
        assert_eq!(row["vector"], json!([1.0, 0.0, 0.0, 1.0]));
    }

    #[tokio::test]
    async fn test_meta_selects_dynamic_only() {
        let (_client, handle) = products(2, MetricType::L2).await;
        let rows = handle
            .query(QueryRequest::new("", "id == 0").output_fields(&["$meta"]))
            .await
            .unwrap();
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["batch", "id"]);
    }

    #[tokio::test]
    async fn test_named_fields_and_unknown_dynamic_key() {
        let (_client, handle) = products(2, MetricType::L2).await;
        let rows = handle
            .query(QueryRequest::new("", "id == 1").output_fields(&["price", "unknown_key"]))
            .await
            .unwrap();
        assert_eq!(rows[0]["price"], 1.5);
        assert!(rows[0].get("unknown_key").is_none());
    }
}

#[cfg(test)]
mod get_tests {
    use super::*;

    #[tokio::test]
    async fn test_get_keeps_input_order_and_skips_missing() {
        let (_client, handle) = products(10, MetricType::L2).await;
        let rows = handle
            .get(
                vec![PrimaryKey::Int(7), PrimaryKey::Int(99), PrimaryKey::Int(2), PrimaryKey::Int(7)],
                &["color"],
            )
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![7, 2]);
        assert_eq!(rows[0]["color"], "yellow");
        assert_eq!(rows[1]["color"], "blue");
    }

    #[tokio::test]
    async fn test_get_rejects_count() {
        let (_client, handle) = products(1, MetricType::L2).await;
        assert!(matches!(
            handle.get(vec![PrimaryKey::Int(0)], &["count(*)"]).await,
            Err(DbError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_get_on_released_collection() {
        let (_client, handle) = products(1, MetricType::L2).await;
        handle.release().await.unwrap();
        assert!(matches!(
            handle.get(vec![PrimaryKey::Int(0)], &[]).await,
            Err(DbError::NotLoaded(_))
        ));
    }
}
