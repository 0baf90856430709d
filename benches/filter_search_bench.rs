// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

/// Benchmarks for filtered search, scalar query and filter compilation
/// against the in-memory engine.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use std::time::Duration;
use tokio::runtime::Runtime;

use vector_client::core::filter::{Filter, ParseOptions};
use vector_client::core::index::{IndexParams, IndexType, MetricType};
use vector_client::core::request::{CreateCollectionRequest, QueryRequest, SearchRequest};
use vector_client::core::schema::{CollectionOptions, CollectionSchema, DataType, FieldOptions, SchemaBuilder};
use vector_client::core::types::Row;
use vector_client::{CollectionHandle, DbConfig, VectorClient};

// ============================================================================
// Constants
// ============================================================================

const DIMENSIONS: usize = 128;
const COLORS: [&str; 4] = ["red", "green", "blue", "yellow"];

// ============================================================================
// Helper Functions
// ============================================================================

fn bench_schema() -> CollectionSchema {
    SchemaBuilder::new()
        .enable_dynamic_field(true)
        .add_field("id", DataType::Int64, FieldOptions::new().primary())
        .and_then(|b| b.add_field("color", DataType::VarChar, FieldOptions::new().max_length(16)))
        .and_then(|b| b.add_field("price", DataType::Double, FieldOptions::new()))
        .and_then(|b| b.add_field("vector", DataType::FloatVector, FieldOptions::new().dim(DIMENSIONS)))
        .and_then(|b| b.build())
        .expect("benchmark schema")
}

/// Deterministic rows spread over four colors.
fn create_rows(count: usize) -> Vec<Row> {
    (0..count)
        .map(|i| {
            let base = (i as f32 * 0.001) % 1.0;
            let vector: Vec<f32> = (0..DIMENSIONS).map(|d| base + d as f32 * 0.0001).collect();
            json!({
                "id": i,
                "color": COLORS[i % COLORS.len()],
                "price": i as f64 * 0.5,
                "vector": vector,
                "meta": {"rank": i % 10},
            })
            .as_object()
            .cloned()
            .expect("row literal")
        })
        .collect()
}

/// Loaded collection of `count` rows (synchronous wrapper for async setup)
fn setup_collection(rt: &Runtime, count: usize) -> CollectionHandle {
    rt.block_on(async {
        let client = VectorClient::in_memory(DbConfig::immediate());
        let handle = client
            .create_collection(CreateCollectionRequest {
                collection_name: "bench".to_string(),
                schema: bench_schema(),
                index_params: Some(IndexParams::new().add_index(
                    "vector",
                    IndexType::Flat,
                    Some(MetricType::L2),
                    None,
                )),
                options: CollectionOptions::default(),
            })
            .await
            .expect("create collection");
        handle.insert(create_rows(count)).await.expect("insert rows");
        handle
    })
}

fn query_vector() -> Vec<f32> {
    (0..DIMENSIONS).map(|d| 0.5 + d as f32 * 0.0001).collect()
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_filter_compile(c: &mut Criterion) {
    let schema = bench_schema();
    c.bench_function("filter_compile", |b| {
        b.iter(|| {
            Filter::compile(
                black_box(r#"(color in ["red", "blue"] and price >= 10.5) or meta["rank"] == 3"#),
                &schema,
                ParseOptions::default(),
            )
            .expect("filter compiles")
        })
    });
}

fn bench_search(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("search");
    group.measurement_time(Duration::from_secs(10));

    for size in [1_000usize, 10_000] {
        let handle = setup_collection(&rt, size);
        group.bench_with_input(BenchmarkId::new("unfiltered_top10", size), &size, |b, _| {
            b.iter(|| {
                rt.block_on(handle.search(SearchRequest::new("bench", vec![query_vector()], 10)))
                    .expect("search")
            })
        });
        group.bench_with_input(BenchmarkId::new("filtered_top10", size), &size, |b, _| {
            b.iter(|| {
                let request = SearchRequest::new("bench", vec![query_vector()], 10)
                    .filter(r#"color == "blue" and price > 100"#);
                rt.block_on(handle.search(request)).expect("search")
            })
        });
    }
    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let rt = Runtime::new().expect("runtime");
    let handle = setup_collection(&rt, 10_000);

    c.bench_function("query_count_star_10000", |b| {
        b.iter(|| {
            let request = QueryRequest::new("bench", r#"meta["rank"] < 5"#).output_fields(&["count(*)"]);
            rt.block_on(handle.query(request)).expect("query")
        })
    });

    c.bench_function("query_page_100_10000", |b| {
        b.iter(|| {
            let request = QueryRequest::new("bench", "price > 1000").offset(200).limit(100);
            rt.block_on(handle.query(request)).expect("query")
        })
    });
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    name = benches;
    config = Criterion::default()
        .sample_size(10)
        .measurement_time(Duration::from_secs(10))
        .warm_up_time(Duration::from_secs(3));
    targets =
        bench_filter_compile,
        bench_search,
        bench_query
);

criterion_main!(benches);
