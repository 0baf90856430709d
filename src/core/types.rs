// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// One output record: field name to value, dynamic keys flattened in.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int(i64),
    VarChar(String),
}

impl PrimaryKey {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(PrimaryKey::Int),
            Value::String(s) => Some(PrimaryKey::VarChar(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            PrimaryKey::Int(i) => Value::from(*i),
            PrimaryKey::VarChar(s) => Value::from(s.clone()),
        }
    }

    /// Canonical bytes used for partition-key hashing.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        match self {
            PrimaryKey::Int(i) => i.to_le_bytes().to_vec(),
            PrimaryKey::VarChar(s) => s.as_bytes().to_vec(),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(i) => write!(f, "{}", i),
            PrimaryKey::VarChar(s) => write!(f, "\"{}\"", s),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        PrimaryKey::Int(value)
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        PrimaryKey::VarChar(value.to_string())
    }
}

/// A stored row.
///
/// Declared scalar, JSON and array values live in `scalars` (the primary
/// key included), vectors are kept decoded in `vectors`, and undeclared
/// keys of a dynamic schema sit in `dynamic`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub pk: PrimaryKey,
    pub scalars: BTreeMap<String, Value>,
    pub vectors: BTreeMap<String, Vec<f32>>,
    pub dynamic: BTreeMap<String, Value>,
}

impl Entity {
    /// Declared fields first, then the dynamic map.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.scalars.get(name).or_else(|| self.dynamic.get(name))
    }

    pub fn vector(&self, name: &str) -> Option<&[f32]> {
        self.vectors.get(name).map(|v| v.as_slice())
    }

    /// Full row, as it was inserted.
    pub fn to_row(&self) -> Row {
        let mut row = Map::new();
        for (name, value) in &self.scalars {
            row.insert(name.clone(), value.clone());
        }
        for (name, vector) in &self.vectors {
            row.insert(name.clone(), vector_to_value(vector));
        }
        for (name, value) in &self.dynamic {
            row.entry(name.clone()).or_insert_with(|| value.clone());
        }
        row
    }
}

/// Encode a vector the way serde_json prints `f32`: shortest round-trip
/// decimal, so `0.1f32` comes back as `0.1` rather than `0.10000000149`.
pub fn vector_to_value(vector: &[f32]) -> Value {
    Value::Array(
        vector
            .iter()
            .map(|x| {
                x.to_string()
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null)
            })
            .collect(),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadState {
    NotLoad,
    Loading,
    Loaded,
}

impl LoadState {
    pub fn as_u8(self) -> u8 {
        match self {
            LoadState::NotLoad => 0,
            LoadState::Loading => 1,
            LoadState::Loaded => 2,
        }
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LoadState::Loading,
            2 => LoadState::Loaded,
            _ => LoadState::NotLoad,
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: PrimaryKey,
    pub distance: f32,
    pub entity: Row,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationResult {
    pub insert_count: usize,
    pub ids: Vec<PrimaryKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteResult {
    pub delete_count: usize,
}
