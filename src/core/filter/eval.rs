// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Per-entity evaluation.
//!
//! Evaluation returns `Err` for runtime type errors (ordering a string
//! against a number, a missing JSON key, an array function applied to a
//! scalar). Callers exclude such entities instead of failing the request.

use super::ast::{CompareOp, ContainsMode, Expr, FieldPath, Operand, PathSegment};
use crate::core::types::Entity;
use serde_json::Value;
use std::borrow::Cow;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    Missing(String),
    TypeMismatch(String),
}

type EvalResult<T> = Result<T, EvalError>;

pub fn evaluate(expr: &Expr, entity: &Entity) -> EvalResult<bool> {
    match expr {
        Expr::Const(b) => Ok(*b),
        Expr::And(children) => {
            for child in children {
                if !evaluate(child, entity)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Expr::Or(children) => {
            for child in children {
                if evaluate(child, entity)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Expr::Not(inner) => evaluate(inner, entity).map(|b| !b),
        Expr::Compare { left, op, right } => {
            let l = resolve_operand(left, entity)?;
            let r = resolve_operand(right, entity)?;
            compare(&l, *op, &r)
        }
        Expr::In {
            operand,
            values,
            negated,
        } => {
            let value = resolve_operand(operand, entity)?;
            if value.is_null() {
                return Err(EvalError::TypeMismatch("null operand for in".to_string()));
            }
            let found = values.iter().any(|candidate| loose_eq(&value, candidate));
            Ok(found != *negated)
        }
        Expr::Like { operand, pattern } => {
            let value = resolve_operand(operand, entity)?;
            match value.as_str() {
                Some(s) => Ok(pattern.matches(s)),
                None => Err(EvalError::TypeMismatch(format!(
                    "like applied to non-string value {}",
                    value
                ))),
            }
        }
        Expr::Contains {
            mode, field, value, ..
        } => {
            let resolved = resolve_path(field, entity)?;
            let items = resolved.as_array().ok_or_else(|| {
                EvalError::TypeMismatch(format!("'{}' is not an array", field.root))
            })?;
            let has = |needle: &Value| items.iter().any(|item| loose_eq(item, needle));
            match mode {
                ContainsMode::One => Ok(has(value)),
                ContainsMode::All => Ok(value
                    .as_array()
                    .map(|needles| needles.iter().all(|n| has(n)))
                    .unwrap_or(false)),
                ContainsMode::Any => Ok(value
                    .as_array()
                    .map(|needles| needles.iter().any(|n| has(n)))
                    .unwrap_or(false)),
            }
        }
        Expr::Truthy(path) => {
            let value = resolve_path(path, entity)?;
            value.as_bool().ok_or_else(|| {
                EvalError::TypeMismatch(format!("'{}' is not a boolean", path.root))
            })
        }
    }
}

fn resolve_operand<'a>(operand: &'a Operand, entity: &'a Entity) -> EvalResult<Cow<'a, Value>> {
    match operand {
        Operand::Literal(value) => Ok(Cow::Borrowed(value)),
        Operand::Field(path) => resolve_path(path, entity).map(Cow::Borrowed),
        Operand::ArrayLength(path) => {
            let value = resolve_path(path, entity)?;
            value
                .as_array()
                .map(|items| Cow::Owned(Value::from(items.len() as u64)))
                .ok_or_else(|| {
                    EvalError::TypeMismatch(format!("ARRAY_LENGTH of non-array '{}'", path.root))
                })
        }
    }
}

/// Declared fields first, then the dynamic map; `$meta` addresses the
/// dynamic map directly.
fn resolve_path<'a>(path: &FieldPath, entity: &'a Entity) -> EvalResult<&'a Value> {
    let missing = || EvalError::Missing(path.root.clone());

    let (mut current, rest) = if path.is_meta() {
        match path.segments.first() {
            Some(PathSegment::Key(key)) => {
                (entity.dynamic.get(key).ok_or_else(missing)?, &path.segments[1..])
            }
            _ => return Err(missing()),
        }
    } else {
        (entity.value(&path.root).ok_or_else(missing)?, &path.segments[..])
    };

    for segment in rest {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key).ok_or_else(missing)?,
            (PathSegment::Index(i), Value::Array(items)) => items.get(*i).ok_or_else(missing)?,
            _ => return Err(missing()),
        };
    }
    Ok(current)
}

/// Equality that treats mismatched kinds as "not equal".
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => {
            numeric_cmp(a, b).map_or(false, |o| o == Ordering::Equal)
        }
        _ => a == b,
    }
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> EvalResult<bool> {
    let ordering = match (left, right) {
        (Value::Number(_), Value::Number(_)) => match numeric_cmp(left, right) {
            Some(o) => o,
            // NaN: every comparison except != is false
            None => return Ok(op == CompareOp::Ne),
        },
        (Value::String(a), Value::String(b)) => a.as_bytes().cmp(b.as_bytes()),
        (Value::Bool(a), Value::Bool(b)) if matches!(op, CompareOp::Eq | CompareOp::Ne) => {
            a.cmp(b)
        }
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_))
            if matches!(op, CompareOp::Eq | CompareOp::Ne) =>
        {
            return Ok((left == right) == (op == CompareOp::Eq));
        }
        _ => {
            return Err(EvalError::TypeMismatch(format!(
                "cannot compare {} with {} using {:?}",
                left, right, op
            )))
        }
    };

    Ok(match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::Ne => ordering != Ordering::Equal,
        CompareOp::Lt => ordering == Ordering::Less,
        CompareOp::Le => ordering != Ordering::Greater,
        CompareOp::Gt => ordering == Ordering::Greater,
        CompareOp::Ge => ordering != Ordering::Less,
    })
}
