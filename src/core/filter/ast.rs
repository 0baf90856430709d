// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Filter AST
//!
//! Schema-agnostic representation of a parsed filter. Field resolution
//! and type checks happen when the filter is compiled against a schema.

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

/// `field`, `field["key"][0]`, or `$meta["key"]`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldPath {
    pub root: String,
    pub segments: Vec<PathSegment>,
}

impl FieldPath {
    pub const META: &'static str = "$meta";

    pub fn is_meta(&self) -> bool {
        self.root == Self::META
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Field(FieldPath),
    Literal(Value),
    ArrayLength(FieldPath),
}

impl Operand {
    fn path(&self) -> Option<&FieldPath> {
        match self {
            Operand::Field(path) | Operand::ArrayLength(path) => Some(path),
            Operand::Literal(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LikePattern {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Infix(String),
}

impl LikePattern {
    pub fn matches(&self, s: &str) -> bool {
        match self {
            LikePattern::Exact(p) => s == p,
            LikePattern::Prefix(p) => s.starts_with(p.as_str()),
            LikePattern::Suffix(p) => s.ends_with(p.as_str()),
            LikePattern::Infix(p) => s.contains(p.as_str()),
        }
    }
}

/// `JSON_CONTAINS*` or `ARRAY_CONTAINS*`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainsFamily {
    Json,
    Array,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainsMode {
    One,
    All,
    Any,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Const(bool),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    In {
        operand: Operand,
        values: Vec<Value>,
        negated: bool,
    },
    Like {
        operand: Operand,
        pattern: LikePattern,
    },
    Contains {
        family: ContainsFamily,
        mode: ContainsMode,
        field: FieldPath,
        value: Value,
    },
    /// A bare boolean field used as a predicate.
    Truthy(FieldPath),
}

impl Expr {
    /// Every field path the expression references.
    pub fn field_paths(&self) -> Vec<&FieldPath> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a FieldPath>) {
        match self {
            Expr::Const(_) => {}
            Expr::And(children) | Expr::Or(children) => {
                for child in children {
                    child.collect_paths(out);
                }
            }
            Expr::Not(inner) => inner.collect_paths(out),
            Expr::Compare { left, right, .. } => {
                out.extend(left.path());
                out.extend(right.path());
            }
            Expr::In { operand, .. } | Expr::Like { operand, .. } => out.extend(operand.path()),
            Expr::Contains { field, .. } | Expr::Truthy(field) => out.push(field),
        }
    }

    /// Target of every `*_CONTAINS*` call, with its function family.
    pub fn contains_targets(&self) -> Vec<(ContainsFamily, &FieldPath)> {
        let mut out = Vec::new();
        self.collect_contains(&mut out);
        out
    }

    fn collect_contains<'a>(&'a self, out: &mut Vec<(ContainsFamily, &'a FieldPath)>) {
        match self {
            Expr::And(children) | Expr::Or(children) => {
                for child in children {
                    child.collect_contains(out);
                }
            }
            Expr::Not(inner) => inner.collect_contains(out),
            Expr::Contains { family, field, .. } => out.push((*family, field)),
            _ => {}
        }
    }
}
