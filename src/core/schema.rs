// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Collection schema definition and row validation
//!
//! A schema is assembled with [`SchemaBuilder`], checked once in
//! [`SchemaBuilder::build`], and is immutable afterwards.

use crate::core::error::{DbError, DbResult};
use crate::core::index::MetricType;
use crate::core::types::PrimaryKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Field data types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    VarChar,
    #[serde(rename = "JSON")]
    Json,
    Array,
    FloatVector,
}

impl DataType {
    /// Get type name as string for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            DataType::Bool => "Bool",
            DataType::Int8 => "Int8",
            DataType::Int16 => "Int16",
            DataType::Int32 => "Int32",
            DataType::Int64 => "Int64",
            DataType::Float => "Float",
            DataType::Double => "Double",
            DataType::VarChar => "VarChar",
            DataType::Json => "JSON",
            DataType::Array => "Array",
            DataType::FloatVector => "FloatVector",
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, DataType::FloatVector)
    }

    fn integer_bounds(&self) -> Option<(i64, i64)> {
        match self {
            DataType::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            DataType::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            DataType::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            DataType::Int64 => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }

    fn is_array_element(&self) -> bool {
        !matches!(self, DataType::Json | DataType::Array | DataType::FloatVector)
    }
}

/// Per-field options for [`SchemaBuilder::add_field`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldOptions {
    pub is_primary: bool,
    pub auto_id: bool,
    pub is_partition_key: bool,
    pub max_length: Option<usize>,
    pub dim: Option<usize>,
    pub element_type: Option<DataType>,
    pub max_capacity: Option<usize>,
    pub description: Option<String>,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    pub fn auto_id(mut self, auto_id: bool) -> Self {
        self.auto_id = auto_id;
        self
    }

    pub fn partition_key(mut self) -> Self {
        self.is_partition_key = true;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn dim(mut self, dim: usize) -> Self {
        self.dim = Some(dim);
        self
    }

    pub fn element(mut self, element_type: DataType, max_capacity: usize) -> Self {
        self.element_type = Some(element_type);
        self.max_capacity = Some(max_capacity);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub auto_id: bool,
    #[serde(default)]
    pub is_partition_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_capacity: Option<usize>,
    #[serde(default)]
    pub description: String,
}

impl FieldSchema {
    fn from_options(name: &str, data_type: DataType, options: FieldOptions) -> DbResult<Self> {
        let constraint = |msg: &str| {
            Err(DbError::InvalidConstraint(format!(
                "field '{}' ({}): {}",
                name,
                data_type.type_name(),
                msg
            )))
        };

        if name.is_empty() {
            return Err(DbError::InvalidConstraint("field name must not be empty".to_string()));
        }

        match data_type {
            DataType::VarChar => match options.max_length {
                None => return constraint("max_length is required"),
                Some(0) => return constraint("max_length must be positive"),
                Some(_) => {}
            },
            DataType::Array if options.element_type == Some(DataType::VarChar) => {}
            _ if options.max_length.is_some() => {
                return constraint("max_length only applies to VarChar fields")
            }
            _ => {}
        }

        match data_type {
            DataType::FloatVector => match options.dim {
                None => return constraint("dim is required"),
                Some(0) => return constraint("dim must be positive"),
                Some(_) => {}
            },
            _ if options.dim.is_some() => {
                return constraint("dim only applies to vector fields")
            }
            _ => {}
        }

        match data_type {
            DataType::Array => {
                match options.element_type {
                    None => return constraint("element_type is required"),
                    Some(element) if !element.is_array_element() => {
                        return constraint("element_type must be a scalar type")
                    }
                    Some(_) => {}
                }
                match options.max_capacity {
                    None => return constraint("max_capacity is required"),
                    Some(0) => return constraint("max_capacity must be positive"),
                    Some(_) => {}
                }
            }
            _ if options.element_type.is_some() || options.max_capacity.is_some() => {
                return constraint("element_type/max_capacity only apply to Array fields")
            }
            _ => {}
        }

        if options.is_primary && !matches!(data_type, DataType::Int64 | DataType::VarChar) {
            return constraint("primary key must be Int64 or VarChar");
        }
        if options.auto_id && !(options.is_primary && data_type == DataType::Int64) {
            return constraint("auto_id requires an Int64 primary key");
        }
        if options.is_partition_key {
            if options.is_primary {
                return constraint("the primary key cannot be the partition key");
            }
            if !matches!(data_type, DataType::Int64 | DataType::VarChar) {
                return constraint("partition key must be Int64 or VarChar");
            }
        }

        Ok(Self {
            name: name.to_string(),
            data_type,
            is_primary: options.is_primary,
            auto_id: options.auto_id,
            is_partition_key: options.is_partition_key,
            max_length: options.max_length,
            dim: options.dim,
            element_type: options.element_type,
            max_capacity: options.max_capacity,
            description: options.description.unwrap_or_default(),
        })
    }

    /// Validate a value against this field
    pub fn validate_value(&self, value: &Value) -> DbResult<()> {
        match self.data_type {
            DataType::Json => Ok(()),
            DataType::Array => {
                let items = value.as_array().ok_or_else(|| self.type_error(value))?;
                let capacity = self.max_capacity.unwrap_or(usize::MAX);
                if items.len() > capacity {
                    return Err(DbError::Validation(format!(
                        "field '{}': array has {} elements, max_capacity is {}",
                        self.name,
                        items.len(),
                        capacity
                    )));
                }
                let element = self.element_type.unwrap_or(DataType::Json);
                for (index, item) in items.iter().enumerate() {
                    if !scalar_matches(element, item, self.max_length) {
                        return Err(DbError::Validation(format!(
                            "field '{}': element {} expected {}, found {}",
                            self.name,
                            index,
                            element.type_name(),
                            get_value_type_name(item)
                        )));
                    }
                }
                Ok(())
            }
            DataType::FloatVector => {
                let items = value.as_array().ok_or_else(|| self.type_error(value))?;
                if items.iter().all(|v| v.is_number()) {
                    Ok(())
                } else {
                    Err(self.type_error(value))
                }
            }
            DataType::VarChar => {
                let s = value.as_str().ok_or_else(|| self.type_error(value))?;
                let max = self.max_length.unwrap_or(usize::MAX);
                if s.len() > max {
                    return Err(DbError::Validation(format!(
                        "field '{}': length {} exceeds max_length {}",
                        self.name,
                        s.len(),
                        max
                    )));
                }
                Ok(())
            }
            scalar => {
                if scalar_matches(scalar, value, None) {
                    Ok(())
                } else {
                    Err(self.type_error(value))
                }
            }
        }
    }

    fn type_error(&self, value: &Value) -> DbError {
        DbError::Validation(format!(
            "field '{}': expected {}, found {}",
            self.name,
            self.data_type.type_name(),
            get_value_type_name(value)
        ))
    }
}

fn scalar_matches(data_type: DataType, value: &Value, max_length: Option<usize>) -> bool {
    match data_type {
        DataType::Bool => value.is_boolean(),
        DataType::Float | DataType::Double => value.is_number(),
        DataType::VarChar => value
            .as_str()
            .map(|s| s.len() <= max_length.unwrap_or(usize::MAX))
            .unwrap_or(false),
        DataType::Json => true,
        other => match (other.integer_bounds(), value.as_i64()) {
            (Some((lo, hi)), Some(i)) => i >= lo && i <= hi,
            _ => false,
        },
    }
}

/// Immutable collection schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub fields: Vec<FieldSchema>,
    #[serde(default)]
    pub enable_dynamic_field: bool,
    #[serde(default)]
    pub description: String,
}

/// Whether a row is headed for `insert` or `upsert`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowMode {
    Insert,
    Upsert,
}

/// A row split into its typed parts, before primary-key assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    pub pk: Option<PrimaryKey>,
    pub scalars: BTreeMap<String, Value>,
    pub vectors: BTreeMap<String, Vec<f32>>,
    pub dynamic: BTreeMap<String, Value>,
}

impl CollectionSchema {
    /// The "quick setup" schema: `id` Int64 primary key, `vector` of the
    /// given dimension, dynamic fields on.
    pub fn quick(dimension: usize) -> DbResult<Self> {
        SchemaBuilder::new()
            .enable_dynamic_field(true)
            .add_field("id", DataType::Int64, FieldOptions::new().primary())?
            .add_field("vector", DataType::FloatVector, FieldOptions::new().dim(dimension))?
            .build()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_field(&self) -> &FieldSchema {
        // build() guarantees exactly one
        self.fields
            .iter()
            .find(|f| f.is_primary)
            .unwrap_or(&self.fields[0])
    }

    pub fn partition_key_field(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.is_partition_key)
    }

    pub fn vector_fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.fields.iter().filter(|f| f.data_type.is_vector())
    }

    /// Re-run the builder checks, for schemas that arrive deserialized.
    pub fn validate(&self) -> DbResult<()> {
        let mut builder = SchemaBuilder::new()
            .enable_dynamic_field(self.enable_dynamic_field)
            .description(self.description.clone());
        for field in &self.fields {
            builder = builder.add_field(
                &field.name,
                field.data_type,
                FieldOptions {
                    is_primary: field.is_primary,
                    auto_id: field.auto_id,
                    is_partition_key: field.is_partition_key,
                    max_length: field.max_length,
                    dim: field.dim,
                    element_type: field.element_type,
                    max_capacity: field.max_capacity,
                    description: Some(field.description.clone()),
                },
            )?;
        }
        builder.build().map(|_| ())
    }

    /// Type and required-field checks for one input row. Vector lengths are
    /// checked separately by [`CollectionSchema::check_dimensions`].
    pub fn validate_row(&self, row: &Map<String, Value>, mode: RowMode) -> DbResult<ValidatedRow> {
        let mut validated = ValidatedRow {
            pk: None,
            scalars: BTreeMap::new(),
            vectors: BTreeMap::new(),
            dynamic: BTreeMap::new(),
        };

        for field in &self.fields {
            let value = row.get(&field.name);

            if field.is_primary && field.auto_id {
                match (mode, value) {
                    (RowMode::Insert, Some(_)) => {
                        return Err(DbError::Validation(format!(
                            "field '{}': value must not be provided for an auto_id primary key",
                            field.name
                        )))
                    }
                    (RowMode::Insert, None) => continue,
                    (RowMode::Upsert, None) => {
                        return Err(DbError::Validation(format!(
                            "field '{}': upsert requires the primary key",
                            field.name
                        )))
                    }
                    (RowMode::Upsert, Some(_)) => {}
                }
            }

            let value = match value {
                Some(Value::Null) | None => {
                    return Err(DbError::Validation(format!(
                        "missing required field '{}'",
                        field.name
                    )))
                }
                Some(v) => v,
            };

            field.validate_value(value)?;

            if field.data_type.is_vector() {
                let vector = value
                    .as_array()
                    .map(|items| {
                        items
                            .iter()
                            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                            .collect::<Vec<f32>>()
                    })
                    .unwrap_or_default();
                validated.vectors.insert(field.name.clone(), vector);
            } else {
                if field.is_primary {
                    validated.pk = PrimaryKey::from_value(value);
                }
                validated.scalars.insert(field.name.clone(), value.clone());
            }
        }

        for (key, value) in row {
            if self.field(key).is_some() {
                continue;
            }
            if key == "$meta" {
                if let (true, Value::Object(meta)) = (self.enable_dynamic_field, value) {
                    for (k, v) in meta {
                        validated.dynamic.insert(k.clone(), v.clone());
                    }
                    continue;
                }
            }
            if !self.enable_dynamic_field {
                return Err(DbError::Validation(format!(
                    "field '{}' is not declared and dynamic fields are disabled",
                    key
                )));
            }
            validated.dynamic.insert(key.clone(), value.clone());
        }

        Ok(validated)
    }

    pub fn check_dimensions(&self, row: &ValidatedRow) -> DbResult<()> {
        for field in self.vector_fields() {
            let expected = field.dim.unwrap_or(0);
            if let Some(vector) = row.vectors.get(&field.name) {
                if vector.len() != expected {
                    return Err(DbError::DimensionMismatch {
                        field: field.name.clone(),
                        expected,
                        actual: vector.len(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Check a query vector against the dimension of `field`.
    pub fn check_query_vector(&self, field: &FieldSchema, vector: &[f32]) -> DbResult<()> {
        let expected = field.dim.unwrap_or(0);
        if vector.len() != expected {
            return Err(DbError::DimensionMismatch {
                field: field.name.clone(),
                expected,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

/// Incremental schema construction
#[derive(Debug, Clone, Default)]
pub struct SchemaBuilder {
    fields: Vec<FieldSchema>,
    enable_dynamic_field: bool,
    description: String,
    partition_key: Option<String>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable_dynamic_field(mut self, enabled: bool) -> Self {
        self.enable_dynamic_field = enabled;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Name the partition-key field; checked at `build()`.
    pub fn partition_key_field(mut self, name: impl Into<String>) -> Self {
        self.partition_key = Some(name.into());
        self
    }

    /// Add a field to the schema
    pub fn add_field(
        mut self,
        name: &str,
        data_type: DataType,
        options: FieldOptions,
    ) -> DbResult<Self> {
        if self.fields.iter().any(|f| f.name == name) {
            return Err(DbError::DuplicateField(format!(
                "field '{}' is already declared",
                name
            )));
        }
        let field = FieldSchema::from_options(name, data_type, options)?;
        self.fields.push(field);
        Ok(self)
    }

    pub fn build(self) -> DbResult<CollectionSchema> {
        let primaries: Vec<&str> = self
            .fields
            .iter()
            .filter(|f| f.is_primary)
            .map(|f| f.name.as_str())
            .collect();
        match primaries.len() {
            0 => return Err(DbError::Schema("schema has no primary key field".to_string())),
            1 => {}
            _ => {
                return Err(DbError::Schema(format!(
                    "schema declares more than one primary key: {}",
                    primaries.join(", ")
                )))
            }
        }

        let mut fields = self.fields;

        if let Some(name) = &self.partition_key {
            let field = fields.iter_mut().find(|f| &f.name == name).ok_or_else(|| {
                DbError::Schema(format!("partition key field '{}' is not declared", name))
            })?;
            if field.is_primary || !matches!(field.data_type, DataType::Int64 | DataType::VarChar) {
                return Err(DbError::Schema(format!(
                    "field '{}' cannot be used as the partition key",
                    name
                )));
            }
            field.is_partition_key = true;
        }

        let partition_keys: HashSet<&str> = fields
            .iter()
            .filter(|f| f.is_partition_key)
            .map(|f| f.name.as_str())
            .collect();
        if partition_keys.len() > 1 {
            return Err(DbError::Schema(
                "schema declares more than one partition key".to_string(),
            ));
        }

        Ok(CollectionSchema {
            fields,
            enable_dynamic_field: self.enable_dynamic_field,
            description: self.description,
        })
    }
}

/// Options for creating a collection, beyond its schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectionOptions {
    /// Hidden partition count for partition-key collections.
    #[serde(default)]
    pub num_partitions: Option<usize>,
    /// Metric used by quick setup.
    #[serde(default)]
    pub metric_type: Option<MetricType>,
}

/// Get type name of a JSON value for error messages
pub fn get_value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "Null",
        Value::Bool(_) => "Boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "Integer",
        Value::Number(_) => "Float",
        Value::String(_) => "String",
        Value::Array(_) => "Array",
        Value::Object(_) => "Object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn article_schema() -> CollectionSchema {
        SchemaBuilder::new()
            .add_field("id", DataType::Int64, FieldOptions::new().primary())
            .unwrap()
            .add_field("title", DataType::VarChar, FieldOptions::new().max_length(16))
            .unwrap()
            .add_field("vector", DataType::FloatVector, FieldOptions::new().dim(3))
            .unwrap()
            .add_field(
                "tags",
                DataType::Array,
                FieldOptions::new().element(DataType::Int64, 4),
            )
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_field_type_name() {
        assert_eq!(DataType::VarChar.type_name(), "VarChar");
        assert_eq!(DataType::Json.type_name(), "JSON");
        assert_eq!(DataType::FloatVector.type_name(), "FloatVector");
    }

    #[test]
    fn test_vector_without_dim_is_rejected() {
        let result = SchemaBuilder::new().add_field("v", DataType::FloatVector, FieldOptions::new());
        assert!(matches!(result, Err(DbError::InvalidConstraint(_))));
    }

    #[test]
    fn test_varchar_needs_positive_max_length() {
        let result =
            SchemaBuilder::new().add_field("s", DataType::VarChar, FieldOptions::new().max_length(0));
        assert!(matches!(result, Err(DbError::InvalidConstraint(_))));
    }

    #[test]
    fn test_array_element_type_must_be_scalar() {
        let result = SchemaBuilder::new().add_field(
            "a",
            DataType::Array,
            FieldOptions::new().element(DataType::Json, 3),
        );
        assert!(matches!(result, Err(DbError::InvalidConstraint(_))));
    }

    #[test]
    fn test_validate_int_bounds() {
        let field = FieldSchema::from_options("small", DataType::Int8, FieldOptions::new()).unwrap();
        assert!(field.validate_value(&json!(127)).is_ok());
        assert!(field.validate_value(&json!(128)).is_err());
        assert!(field.validate_value(&json!(1.5)).is_err());
    }

    #[test]
    fn test_validate_row_splits_parts() {
        let schema = article_schema();
        let row = json!({"id": 1, "title": "hi", "vector": [0.1, 0.2, 0.3], "tags": [1, 2]});
        let validated = schema
            .validate_row(row.as_object().unwrap(), RowMode::Insert)
            .unwrap();
        assert_eq!(validated.pk, Some(PrimaryKey::Int(1)));
        assert_eq!(validated.vectors["vector"].len(), 3);
        assert!(validated.dynamic.is_empty());
    }

    #[test]
    fn test_array_capacity_enforced() {
        let schema = article_schema();
        let row = json!({"id": 1, "title": "hi", "vector": [0.1, 0.2, 0.3], "tags": [1, 2, 3, 4, 5]});
        let result = schema.validate_row(row.as_object().unwrap(), RowMode::Insert);
        assert!(matches!(result, Err(DbError::Validation(msg)) if msg.contains("tags")));
    }

    #[test]
    fn test_unknown_key_without_dynamic_field() {
        let schema = article_schema();
        let row = json!({"id": 1, "title": "hi", "vector": [0.1, 0.2, 0.3], "tags": [], "color": "red"});
        let result = schema.validate_row(row.as_object().unwrap(), RowMode::Insert);
        assert!(matches!(result, Err(DbError::Validation(msg)) if msg.contains("color")));
    }

    #[test]
    fn test_dimension_check_is_separate() {
        let schema = article_schema();
        let row = json!({"id": 1, "title": "hi", "vector": [0.1, 0.2], "tags": []});
        let validated = schema
            .validate_row(row.as_object().unwrap(), RowMode::Insert)
            .unwrap();
        assert!(matches!(
            schema.check_dimensions(&validated),
            Err(DbError::DimensionMismatch { expected: 3, actual: 2, .. })
        ));
    }
}
