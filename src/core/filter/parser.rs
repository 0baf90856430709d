// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Recursive-descent parser for filter expressions.
//!
//! ```text
//! expr     := and ( ("or" | "||") and )*
//! and      := unary ( ("and" | "&&") unary )*
//! unary    := ("not" | "!") unary | primary
//! primary  := "(" expr ")"
//!           | CONTAINS_FN "(" path "," literal ")"
//!           | operand ( cmp operand )+
//!           | operand ["not"] "in" list
//!           | operand "like" string
//!           | operand
//! operand  := path | literal | "ARRAY_LENGTH" "(" path ")"
//! path     := ident ( "[" (string | int) "]" )*
//! ```

use super::ast::{
    CompareOp, ContainsFamily, ContainsMode, Expr, FieldPath, LikePattern, Operand, PathSegment,
};
use super::lexer::{tokenize, Spanned, Token};
use super::FilterError;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub allow_infix_like: bool,
    /// Deepest nesting of `(` and `not` accepted before the parser gives up.
    pub max_depth: usize,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            allow_infix_like: true,
            max_depth: 128,
        }
    }
}

/// Parse a filter string. Blank input yields `None` (match everything).
pub fn parse(input: &str, options: ParseOptions) -> Result<Option<Expr>, FilterError> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        cursor: 0,
        end: input.len(),
        depth: 0,
        options,
    };
    let expr = parser.parse_or()?;
    if let Some(extra) = parser.peek() {
        return Err(parser.syntax(format!("unexpected {}", extra.describe())));
    }
    Ok(Some(expr))
}

struct Parser {
    tokens: Vec<Spanned>,
    cursor: usize,
    end: usize,
    depth: usize,
    options: ParseOptions,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|s| &s.token)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.cursor + offset).map(|s| &s.token)
    }

    fn pos(&self) -> usize {
        self.tokens
            .get(self.cursor)
            .map(|s| s.pos)
            .unwrap_or(self.end)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.cursor).map(|s| s.token.clone());
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn syntax(&self, message: String) -> FilterError {
        FilterError::InvalidSyntax {
            pos: self.pos(),
            message,
        }
    }

    fn descend(&mut self) -> Result<(), FilterError> {
        if self.depth >= self.options.max_depth {
            return Err(self.syntax(format!(
                "expression nests deeper than {} levels",
                self.options.max_depth
            )));
        }
        self.depth += 1;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> Result<(), FilterError> {
        match self.peek() {
            Some(t) if *t == expected => {
                self.cursor += 1;
                Ok(())
            }
            Some(t) => Err(self.syntax(format!(
                "expected {}, found {}",
                expected.describe(),
                t.describe()
            ))),
            None => Err(self.syntax(format!(
                "expected {}, found end of expression",
                expected.describe()
            ))),
        }
    }

    fn parse_or(&mut self) -> Result<Expr, FilterError> {
        let mut children = vec![self.parse_and()?];
        while self.peek() == Some(&Token::Or) {
            self.cursor += 1;
            children.push(self.parse_and()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Expr::Or(children)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, FilterError> {
        let mut children = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::And) {
            self.cursor += 1;
            children.push(self.parse_unary()?);
        }
        Ok(if children.len() == 1 {
            children.remove(0)
        } else {
            Expr::And(children)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, FilterError> {
        if self.peek() == Some(&Token::Not) {
            self.descend()?;
            self.cursor += 1;
            let inner = self.parse_unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, FilterError> {
        match self.peek() {
            Some(Token::LParen) => {
                self.descend()?;
                self.cursor += 1;
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                return Ok(inner);
            }
            Some(Token::Ident(name)) if self.peek_at(1) == Some(&Token::LParen) => {
                let upper = name.to_ascii_uppercase();
                if upper == "COUNT" {
                    return Err(FilterError::CountInPredicate);
                }
                if let Some((family, mode)) = contains_function(&upper) {
                    return self.parse_contains(family, mode);
                }
                if upper != "ARRAY_LENGTH" {
                    return Err(FilterError::UnsupportedOperator(name.clone()));
                }
            }
            None => return Err(self.syntax("unexpected end of expression".to_string())),
            _ => {}
        }

        let operand = self.parse_operand()?;

        match self.peek() {
            Some(Token::In) => {
                self.cursor += 1;
                let values = self.parse_list()?;
                Ok(Expr::In {
                    operand,
                    values,
                    negated: false,
                })
            }
            Some(Token::Not) if self.peek_at(1) == Some(&Token::In) => {
                self.cursor += 2;
                let values = self.parse_list()?;
                Ok(Expr::In {
                    operand,
                    values,
                    negated: true,
                })
            }
            Some(Token::Like) => {
                self.cursor += 1;
                match self.advance() {
                    Some(Token::Str(raw)) => Ok(Expr::Like {
                        operand,
                        pattern: self.like_pattern(&raw)?,
                    }),
                    _ => Err(self.syntax("like expects a string pattern".to_string())),
                }
            }
            Some(t) if compare_op(t).is_some() => self.parse_comparison_chain(operand),
            _ => match operand {
                Operand::Literal(Value::Bool(b)) => Ok(Expr::Const(b)),
                Operand::Field(path) => Ok(Expr::Truthy(path)),
                _ => Err(self.syntax("expected a comparison".to_string())),
            },
        }
    }

    /// `a < b <= c` becomes `a < b and b <= c`.
    fn parse_comparison_chain(&mut self, first: Operand) -> Result<Expr, FilterError> {
        let mut operands = vec![first];
        let mut ops = Vec::new();
        while let Some(op) = self.peek().and_then(compare_op) {
            self.cursor += 1;
            ops.push(op);
            operands.push(self.parse_operand()?);
        }

        let mut comparisons: Vec<Expr> = ops
            .into_iter()
            .enumerate()
            .map(|(i, op)| Expr::Compare {
                left: operands[i].clone(),
                op,
                right: operands[i + 1].clone(),
            })
            .collect();

        Ok(if comparisons.len() == 1 {
            comparisons.remove(0)
        } else {
            Expr::And(comparisons)
        })
    }

    fn parse_contains(
        &mut self,
        family: ContainsFamily,
        mode: ContainsMode,
    ) -> Result<Expr, FilterError> {
        // function name and "("
        self.cursor += 2;
        let field = self.parse_path()?;
        self.expect(Token::Comma)?;
        let value = self.parse_literal()?;
        self.expect(Token::RParen)?;

        if mode != ContainsMode::One && !value.is_array() {
            return Err(self.syntax(
                "CONTAINS_ALL / CONTAINS_ANY expect a list as second argument".to_string(),
            ));
        }

        Ok(Expr::Contains {
            family,
            mode,
            field,
            value,
        })
    }

    fn parse_operand(&mut self) -> Result<Operand, FilterError> {
        match self.peek() {
            Some(Token::Ident(name))
                if name.eq_ignore_ascii_case("ARRAY_LENGTH")
                    && self.peek_at(1) == Some(&Token::LParen) =>
            {
                self.cursor += 2;
                let path = self.parse_path()?;
                self.expect(Token::RParen)?;
                Ok(Operand::ArrayLength(path))
            }
            Some(Token::Ident(_)) => Ok(Operand::Field(self.parse_path()?)),
            Some(_) => Ok(Operand::Literal(self.parse_literal()?)),
            None => Err(self.syntax("expected an operand".to_string())),
        }
    }

    fn parse_path(&mut self) -> Result<FieldPath, FilterError> {
        let root = match self.advance() {
            Some(Token::Ident(name)) => name,
            Some(other) => {
                self.cursor -= 1;
                return Err(self.syntax(format!("expected a field name, found {}", other.describe())));
            }
            None => return Err(self.syntax("expected a field name".to_string())),
        };

        let mut segments = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.cursor += 1;
            let segment = match self.advance() {
                Some(Token::Str(key)) => PathSegment::Key(key),
                Some(Token::Int(i)) if i >= 0 => PathSegment::Index(i as usize),
                _ => {
                    return Err(self.syntax(
                        "path segment must be a string key or a non-negative index".to_string(),
                    ))
                }
            };
            self.expect(Token::RBracket)?;
            segments.push(segment);
        }

        Ok(FieldPath { root, segments })
    }

    fn parse_literal(&mut self) -> Result<Value, FilterError> {
        match self.advance() {
            Some(Token::Int(i)) => Ok(Value::from(i)),
            Some(Token::Float(f)) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| self.syntax(format!("invalid number {}", f))),
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::True) => Ok(Value::Bool(true)),
            Some(Token::False) => Ok(Value::Bool(false)),
            Some(Token::LBracket) => {
                self.cursor -= 1;
                Ok(Value::Array(self.parse_list()?))
            }
            Some(other) => {
                self.cursor -= 1;
                Err(self.syntax(format!("expected a literal, found {}", other.describe())))
            }
            None => Err(self.syntax("expected a literal".to_string())),
        }
    }

    fn parse_list(&mut self) -> Result<Vec<Value>, FilterError> {
        self.expect(Token::LBracket)?;
        let mut values = Vec::new();
        loop {
            if self.peek() == Some(&Token::RBracket) {
                self.cursor += 1;
                return Ok(values);
            }
            values.push(self.parse_literal()?);
            match self.peek() {
                Some(Token::Comma) => self.cursor += 1,
                Some(Token::RBracket) => {}
                _ => return Err(self.syntax("expected ',' or ']' in list".to_string())),
            }
        }
    }

    fn like_pattern(&self, raw: &str) -> Result<LikePattern, FilterError> {
        let leading = raw.starts_with('%');
        let body = raw.strip_prefix('%').unwrap_or(raw);
        let trailing = body.ends_with('%') && !body.ends_with("\\%");
        let body = if trailing { &body[..body.len() - 1] } else { body };

        let mut literal = String::new();
        let mut chars = body.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' if chars.peek() == Some(&'%') => {
                    literal.push('%');
                    chars.next();
                }
                '%' => {
                    return Err(FilterError::UnsupportedOperator(format!(
                        "like pattern \"{}\": '%' is only supported at the start or end",
                        raw
                    )))
                }
                other => literal.push(other),
            }
        }

        match (leading, trailing) {
            (false, false) => Ok(LikePattern::Exact(literal)),
            (false, true) => Ok(LikePattern::Prefix(literal)),
            (true, false) if literal.is_empty() => Ok(LikePattern::Prefix(literal)),
            (true, false) => Ok(LikePattern::Suffix(literal)),
            (true, true) if !self.options.allow_infix_like => {
                Err(FilterError::UnsupportedOperator(format!(
                    "like pattern \"{}\": infix matching is disabled",
                    raw
                )))
            }
            (true, true) => Ok(LikePattern::Infix(literal)),
        }
    }
}

fn compare_op(token: &Token) -> Option<CompareOp> {
    match token {
        Token::Eq => Some(CompareOp::Eq),
        Token::Ne => Some(CompareOp::Ne),
        Token::Lt => Some(CompareOp::Lt),
        Token::Le => Some(CompareOp::Le),
        Token::Gt => Some(CompareOp::Gt),
        Token::Ge => Some(CompareOp::Ge),
        _ => None,
    }
}

fn contains_function(upper: &str) -> Option<(ContainsFamily, ContainsMode)> {
    match upper {
        "JSON_CONTAINS" => Some((ContainsFamily::Json, ContainsMode::One)),
        "JSON_CONTAINS_ALL" => Some((ContainsFamily::Json, ContainsMode::All)),
        "JSON_CONTAINS_ANY" => Some((ContainsFamily::Json, ContainsMode::Any)),
        "ARRAY_CONTAINS" => Some((ContainsFamily::Array, ContainsMode::One)),
        "ARRAY_CONTAINS_ALL" => Some((ContainsFamily::Array, ContainsMode::All)),
        "ARRAY_CONTAINS_ANY" => Some((ContainsFamily::Array, ContainsMode::Any)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse_ok(input: &str) -> Expr {
        parse(input, ParseOptions::default()).unwrap().unwrap()
    }

    fn field(root: &str) -> Operand {
        Operand::Field(FieldPath {
            root: root.to_string(),
            segments: Vec::new(),
        })
    }

    #[test]
    fn test_empty_filter_is_none() {
        assert_eq!(parse("   ", ParseOptions::default()).unwrap(), None);
    }

    #[test]
    fn test_chained_range() {
        let expr = parse_ok("10 < reading_time < 15");
        assert_eq!(
            expr,
            Expr::And(vec![
                Expr::Compare {
                    left: Operand::Literal(json!(10)),
                    op: CompareOp::Lt,
                    right: field("reading_time"),
                },
                Expr::Compare {
                    left: field("reading_time"),
                    op: CompareOp::Lt,
                    right: Operand::Literal(json!(15)),
                },
            ])
        );
    }

    #[test]
    fn test_precedence_and_binds_tighter() {
        let expr = parse_ok("a == 1 or b == 2 and c == 3");
        match expr {
            Expr::Or(children) => {
                assert_eq!(children.len(), 2);
                assert!(matches!(children[1], Expr::And(_)));
            }
            other => panic!("expected Or, got {:?}", other),
        }
    }

    #[test]
    fn test_not_in() {
        let expr = parse_ok(r#"publication not in ["Towards Data Science", "Personal Growth"]"#);
        assert_eq!(
            expr,
            Expr::In {
                operand: field("publication"),
                values: vec![json!("Towards Data Science"), json!("Personal Growth")],
                negated: true,
            }
        );
    }

    #[test]
    fn test_json_path_and_array_index() {
        let expr = parse_ok(r#"article_meta["claps"] > 30 and color_coord[0] < 10"#);
        let paths = expr.field_paths();
        assert_eq!(paths[0].segments, vec![PathSegment::Key("claps".to_string())]);
        assert_eq!(paths[1].segments, vec![PathSegment::Index(0)]);
    }

    #[test]
    fn test_contains_functions() {
        let expr = parse_ok(r#"JSON_CONTAINS_ALL(color["coord"], [4, 5])"#);
        assert!(matches!(
            expr,
            Expr::Contains {
                family: ContainsFamily::Json,
                mode: ContainsMode::All,
                ..
            }
        ));
        let expr = parse_ok("array_contains(color_coord, 10)");
        assert!(matches!(
            expr,
            Expr::Contains {
                family: ContainsFamily::Array,
                mode: ContainsMode::One,
                ..
            }
        ));
        assert!(parse("ARRAY_CONTAINS_ANY(color_coord, 7)", ParseOptions::default()).is_err());
    }

    #[test]
    fn test_array_length() {
        let expr = parse_ok("ARRAY_LENGTH(color_coord) == 4");
        assert!(matches!(
            expr,
            Expr::Compare {
                left: Operand::ArrayLength(_),
                op: CompareOp::Eq,
                ..
            }
        ));
    }

    #[test]
    fn test_like_patterns() {
        assert!(matches!(
            parse_ok(r#"title like "Top%""#),
            Expr::Like { pattern: LikePattern::Prefix(ref p), .. } if p == "Top"
        ));
        assert!(matches!(
            parse_ok(r#"color_tag like "%_4%""#),
            Expr::Like { pattern: LikePattern::Infix(ref p), .. } if p == "_4"
        ));
        assert!(matches!(
            parse_ok(r#"color_tag like "%_4""#),
            Expr::Like { pattern: LikePattern::Suffix(ref p), .. } if p == "_4"
        ));
        assert!(matches!(
            parse(r#"color_tag like "re%d""#, ParseOptions::default()),
            Err(FilterError::UnsupportedOperator(_))
        ));
    }

    #[test]
    fn test_infix_can_be_disabled() {
        let options = ParseOptions {
            allow_infix_like: false,
            ..ParseOptions::default()
        };
        assert!(matches!(
            parse(r#"color_tag like "%_4%""#, options),
            Err(FilterError::UnsupportedOperator(_))
        ));
        assert!(parse(r#"color_tag like "red%""#, options).is_ok());
    }

    #[test]
    fn test_count_star_rejected() {
        assert!(matches!(
            parse("count(*) > 1", ParseOptions::default()),
            Err(FilterError::CountInPredicate)
        ));
    }

    #[test]
    fn test_bare_boolean_field_and_literal() {
        assert_eq!(
            parse_ok("is_active"),
            Expr::Truthy(FieldPath {
                root: "is_active".to_string(),
                segments: Vec::new()
            })
        );
        assert_eq!(parse_ok("true"), Expr::Const(true));
    }

    #[test]
    fn test_syntax_errors_report_position() {
        match parse("(a == 1", ParseOptions::default()) {
            Err(FilterError::InvalidSyntax { pos, .. }) => assert_eq!(pos, 7),
            other => panic!("unexpected {:?}", other),
        }
        assert!(parse("a == ", ParseOptions::default()).is_err());
        assert!(parse("a == 1 b", ParseOptions::default()).is_err());
        assert!(parse("a in 1", ParseOptions::default()).is_err());
    }
}
