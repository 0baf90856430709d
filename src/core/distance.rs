// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use crate::core::index::MetricType;
use std::cmp::Ordering;

pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

pub fn magnitude(a: &[f32]) -> f32 {
    a.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Squared Euclidean distance, which is what the service reports for L2.
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mag_a = magnitude(a);
    let mag_b = magnitude(b);
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot_product(a, b) / (mag_a * mag_b)
}

pub fn score(metric: MetricType, query: &[f32], candidate: &[f32]) -> f32 {
    match metric {
        MetricType::L2 => l2_squared(query, candidate),
        MetricType::IP => dot_product(query, candidate),
        MetricType::Cosine => cosine_similarity(query, candidate),
    }
}

/// Orders two scores best first for the given metric. NaN sorts last.
pub fn compare_scores(metric: MetricType, a: f32, b: f32) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => return Ordering::Equal,
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        _ => {}
    }
    let ord = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    if metric.higher_is_better() {
        ord.reverse()
    } else {
        ord
    }
}

/// Range-search acceptance.
///
/// L2 keeps `range_filter < d <= radius`; similarity metrics mirror the
/// bounds and keep `radius <= s < range_filter`.
pub fn within_range(metric: MetricType, value: f32, radius: f32, range_filter: Option<f32>) -> bool {
    if metric.higher_is_better() {
        value >= radius && range_filter.map_or(true, |upper| value < upper)
    } else {
        value <= radius && range_filter.map_or(true, |lower| value > lower)
    }
}
