// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

#![allow(dead_code)]

use serde_json::{json, Value};
use vector_client::core::index::{IndexParams, IndexType, MetricType};
use vector_client::core::request::CreateCollectionRequest;
use vector_client::core::schema::{CollectionOptions, CollectionSchema, DataType, FieldOptions, SchemaBuilder};
use vector_client::core::types::Row;
use vector_client::{CollectionHandle, DbConfig, VectorClient};

pub const DIM: usize = 4;
pub const COLORS: [&str; 4] = ["red", "green", "blue", "yellow"];

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("row literal must be an object")
}

/// id, color, color_tag, price, tags, meta, vector.
pub fn product_schema() -> CollectionSchema {
    SchemaBuilder::new()
        .enable_dynamic_field(true)
        .add_field("id", DataType::Int64, FieldOptions::new().primary())
        .unwrap()
        .add_field("color", DataType::VarChar, FieldOptions::new().max_length(32))
        .unwrap()
        .add_field("color_tag", DataType::VarChar, FieldOptions::new().max_length(64))
        .unwrap()
        .add_field("price", DataType::Double, FieldOptions::new())
        .unwrap()
        .add_field(
            "tags",
            DataType::Array,
            FieldOptions::new().element(DataType::Int64, 16),
        )
        .unwrap()
        .add_field("meta", DataType::Json, FieldOptions::new())
        .unwrap()
        .add_field("vector", DataType::FloatVector, FieldOptions::new().dim(DIM))
        .unwrap()
        .build()
        .unwrap()
}

pub fn index(metric: MetricType) -> IndexParams {
    IndexParams::new().add_index("vector", IndexType::AutoIndex, Some(metric), None)
}

/// Row `i`: color cycles through COLORS, color_tag is `<color>_<i>`.
pub fn product_row(i: i64) -> Row {
    let color = COLORS[(i as usize) % COLORS.len()];
    row(json!({
        "id": i,
        "color": color,
        "color_tag": format!("{}_{}", color, i),
        "price": i as f64 * 1.5,
        "tags": [i % 3, i % 5],
        "meta": {"rank": i % 10, "labels": [format!("l{}", i % 2), "all"]},
        "vector": [i as f32, 0.0, 0.0, 1.0],
        "batch": i / 100,
    }))
}

pub async fn products(n: i64, metric: MetricType) -> (VectorClient, CollectionHandle) {
    let client = VectorClient::in_memory(DbConfig::immediate());
    let handle = client
        .create_collection(CreateCollectionRequest {
            collection_name: "products".to_string(),
            schema: product_schema(),
            index_params: Some(index(metric)),
            options: CollectionOptions::default(),
        })
        .await
        .unwrap();
    if n > 0 {
        handle
            .insert((0..n).map(product_row).collect())
            .await
            .unwrap();
    }
    (client, handle)
}
