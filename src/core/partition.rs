// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Partitions and partition-key routing

use crate::core::types::PrimaryKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_PARTITION: &str = "_default";

/// Name of the `index`-th hidden partition of a partition-key collection.
pub fn hidden_partition_name(index: usize) -> String {
    format!("{}_{}", DEFAULT_PARTITION, index)
}

/// Map a partition-key value onto one of `num_partitions` hidden partitions.
///
/// The key is hashed with blake3 over its canonical bytes (little-endian
/// `i64` for integers, UTF-8 for strings); the first eight bytes of the
/// digest, read little-endian, are reduced modulo the partition count.
pub fn route(key: &PrimaryKey, num_partitions: usize) -> usize {
    if num_partitions <= 1 {
        return 0;
    }
    let digest = blake3::hash(&key.canonical_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    (u64::from_le_bytes(prefix) % num_partitions as u64) as usize
}

/// Route a raw JSON partition-key value. Values that are neither integers
/// nor strings land in partition 0.
pub fn route_value(value: &Value, num_partitions: usize) -> usize {
    PrimaryKey::from_value(value)
        .map(|key| route(&key, num_partitions))
        .unwrap_or(0)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    pub name: String,
    pub loaded: bool,
}

impl Partition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            loaded: false,
        }
    }
}
