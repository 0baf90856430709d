// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Engine configuration.
//!
//! Defaults follow the hosted service's documented behaviour. Every value
//! can be overridden from `VECTOR_DB_*` environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Order applied to hits whose distances are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    AscendingPrimaryKey,
    DescendingPrimaryKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbConfig {
    /// Delay before an acknowledged write becomes visible to reads.
    #[serde(with = "duration_millis")]
    pub visibility_delay: Duration,
    /// Hidden partition count used when a schema declares a partition key.
    pub default_num_partitions: usize,
    pub tie_break: TieBreak,
    /// Accept `like "%substr%"` patterns.
    pub allow_infix_like: bool,
    pub authorization_enabled: bool,
    pub root_password: String,
    pub max_top_k: usize,
    /// Upper bound for `offset + limit` in a query.
    pub max_query_window: usize,
    /// Deepest allowed nesting of parentheses and `not` in a filter.
    #[serde(default = "default_max_filter_depth")]
    pub max_filter_depth: usize,
    /// Import jobs kept for progress lookups. Finished jobs beyond this are
    /// forgotten oldest first.
    #[serde(default = "default_max_import_jobs")]
    pub max_import_jobs: usize,
}

fn default_max_filter_depth() -> usize {
    128
}

fn default_max_import_jobs() -> usize {
    1024
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            visibility_delay: Duration::from_secs(1),
            default_num_partitions: 16,
            tie_break: TieBreak::AscendingPrimaryKey,
            allow_infix_like: true,
            authorization_enabled: false,
            root_password: "Milvus".to_string(),
            max_top_k: 16384,
            max_query_window: 16384,
            max_filter_depth: default_max_filter_depth(),
            max_import_jobs: default_max_import_jobs(),
        }
    }
}

impl DbConfig {
    /// Read overrides from `VECTOR_DB_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            visibility_delay: std::env::var("VECTOR_DB_VISIBILITY_DELAY_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.visibility_delay),
            default_num_partitions: std::env::var("VECTOR_DB_NUM_PARTITIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.default_num_partitions),
            tie_break: match std::env::var("VECTOR_DB_TIE_BREAK").ok().as_deref() {
                Some("desc") | Some("descending") => TieBreak::DescendingPrimaryKey,
                _ => defaults.tie_break,
            },
            allow_infix_like: std::env::var("VECTOR_DB_ALLOW_INFIX_LIKE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.allow_infix_like),
            authorization_enabled: std::env::var("VECTOR_DB_AUTHORIZATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.authorization_enabled),
            root_password: std::env::var("VECTOR_DB_ROOT_PASSWORD")
                .unwrap_or(defaults.root_password),
            max_top_k: std::env::var("VECTOR_DB_MAX_TOP_K")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_top_k),
            max_query_window: std::env::var("VECTOR_DB_MAX_QUERY_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_query_window),
            max_filter_depth: std::env::var("VECTOR_DB_MAX_FILTER_DEPTH")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_filter_depth),
            max_import_jobs: std::env::var("VECTOR_DB_MAX_IMPORT_JOBS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_import_jobs),
        }
    }

    /// Configuration with writes visible immediately. Handy in tests.
    pub fn immediate() -> Self {
        Self {
            visibility_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.default_num_partitions > 0
            && self.max_top_k > 0
            && self.max_query_window > 0
            && self.max_filter_depth > 0
            && self.max_import_jobs > 0
    }
}
