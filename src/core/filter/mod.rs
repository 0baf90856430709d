// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Boolean filter expressions for search, query and delete
//!
//! A filter string is tokenized, parsed into an [`ast::Expr`], and then
//! compiled against a [`CollectionSchema`]. Compilation rejects references
//! that can never resolve (undeclared fields without dynamic fields, vector
//! fields, paths into scalar fields). What survives is evaluated per entity.
//!
//! ```
//! use vector_client::core::filter::Filter;
//! use vector_client::core::schema::CollectionSchema;
//!
//! let schema = CollectionSchema::quick(4).unwrap();
//! let filter = Filter::compile(r#"color like "red%" and id in [1, 2]"#, &schema, Default::default()).unwrap();
//! assert!(!filter.is_empty());
//! ```

pub mod ast;
pub mod eval;
pub mod lexer;
pub mod parser;

use crate::core::error::DbError;
use crate::core::schema::{CollectionSchema, DataType};
use crate::core::types::Entity;
use ast::{ContainsFamily, Expr, FieldPath, PathSegment};
pub use eval::EvalError;
pub use parser::ParseOptions;
use thiserror::Error;

/// Errors raised while turning filter text into an expression tree
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Invalid filter syntax at position {pos}: {message}")]
    InvalidSyntax { pos: usize, message: String },

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("count(*) is only valid as an output field")]
    CountInPredicate,
}

impl FilterError {
    fn into_db_error(self, filter: &str) -> DbError {
        match self {
            FilterError::UnsupportedOperator(op) => {
                DbError::UnsupportedOperation(format!("filter '{}': {}", filter, op))
            }
            other => DbError::Schema(format!("filter '{}': {}", filter, other)),
        }
    }
}

/// A filter compiled against a collection schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    text: String,
    expr: Option<Expr>,
}

impl Filter {
    /// Filter that matches every entity.
    pub fn all() -> Self {
        Self {
            text: String::new(),
            expr: None,
        }
    }

    pub fn compile(
        text: &str,
        schema: &CollectionSchema,
        options: ParseOptions,
    ) -> Result<Self, DbError> {
        let expr = parser::parse(text, options).map_err(|e| e.into_db_error(text))?;
        if let Some(expr) = &expr {
            for path in expr.field_paths() {
                check_path(path, schema, text)?;
            }
            for (family, path) in expr.contains_targets() {
                check_contains(family, path, schema, text)?;
            }
        }
        Ok(Self {
            text: text.to_string(),
            expr,
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.expr.is_none()
    }

    pub fn expr(&self) -> Option<&Expr> {
        self.expr.as_ref()
    }

    /// Evaluate against one entity, surfacing runtime type errors.
    pub fn evaluate(&self, entity: &Entity) -> Result<bool, EvalError> {
        match &self.expr {
            None => Ok(true),
            Some(expr) => eval::evaluate(expr, entity),
        }
    }

    /// Entities whose evaluation errors are treated as non-matching.
    pub fn matches(&self, entity: &Entity) -> bool {
        self.evaluate(entity).unwrap_or(false)
    }
}

fn check_path(path: &FieldPath, schema: &CollectionSchema, filter: &str) -> Result<(), DbError> {
    if path.is_meta() {
        if !schema.enable_dynamic_field {
            return Err(DbError::UnknownField(format!(
                "filter '{}': $meta requires dynamic fields to be enabled",
                filter
            )));
        }
        if !matches!(path.segments.first(), Some(PathSegment::Key(_))) {
            return Err(DbError::Schema(format!(
                "filter '{}': $meta must be followed by a [\"key\"] segment",
                filter
            )));
        }
        return Ok(());
    }

    let field = match schema.field(&path.root) {
        Some(field) => field,
        None if schema.enable_dynamic_field => return Ok(()),
        None => {
            return Err(DbError::UnknownField(format!(
                "filter '{}': field '{}' does not exist",
                filter, path.root
            )))
        }
    };

    if field.data_type.is_vector() {
        return Err(DbError::Schema(format!(
            "filter '{}': vector field '{}' cannot be used in a filter",
            filter, field.name
        )));
    }

    let allows_segments = match field.data_type {
        DataType::Json => true,
        DataType::Array => path
            .segments
            .iter()
            .all(|s| matches!(s, PathSegment::Index(_))),
        _ => path.segments.is_empty(),
    };
    if !allows_segments {
        return Err(DbError::Schema(format!(
            "filter '{}': field '{}' of type {} cannot be indexed into",
            filter,
            field.name,
            field.data_type.type_name()
        )));
    }
    Ok(())
}

/// `ARRAY_CONTAINS*` takes a whole Array field; `JSON_CONTAINS*` takes a
/// JSON field, a path into one, or a dynamic key.
fn check_contains(
    family: ContainsFamily,
    path: &FieldPath,
    schema: &CollectionSchema,
    filter: &str,
) -> Result<(), DbError> {
    let declared = if path.is_meta() {
        None
    } else {
        schema.field(&path.root).map(|f| f.data_type)
    };
    let whole_array = declared == Some(DataType::Array) && path.segments.is_empty();
    let accepted = match family {
        ContainsFamily::Array => whole_array,
        ContainsFamily::Json => matches!(declared, None | Some(DataType::Json)),
    };
    if accepted {
        return Ok(());
    }
    let (function, expected) = match family {
        ContainsFamily::Array => ("ARRAY_CONTAINS", "an Array field"),
        ContainsFamily::Json => ("JSON_CONTAINS", "a JSON field or dynamic key"),
    };
    Err(DbError::Schema(format!(
        "filter '{}': {} expects {}, '{}' is not one",
        filter, function, expected, path.root
    )))
}
