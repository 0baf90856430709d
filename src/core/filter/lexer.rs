// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Tokenizer for filter expressions.

use super::FilterError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    True,
    False,
    And,
    Or,
    Not,
    In,
    Like,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Star,
}

impl Token {
    pub fn describe(&self) -> String {
        match self {
            Token::Ident(name) => format!("identifier '{}'", name),
            Token::Int(i) => format!("integer {}", i),
            Token::Float(f) => format!("number {}", f),
            Token::Str(s) => format!("string \"{}\"", s),
            other => format!("{:?}", other),
        }
    }
}

/// A token and its byte offset in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

pub fn tokenize(input: &str) -> Result<Vec<Spanned>, FilterError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let (token, consumed) = match c {
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            ',' => (Token::Comma, 1),
            '*' => (Token::Star, 1),
            '<' if next == Some('=') => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if next == Some('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '=' if next == Some('=') => (Token::Eq, 2),
            '!' if next == Some('=') => (Token::Ne, 2),
            '!' => (Token::Not, 1),
            '&' if next == Some('&') => (Token::And, 2),
            '|' if next == Some('|') => (Token::Or, 2),
            '"' | '\'' => {
                let (s, consumed) = lex_string(&chars[i..], c, pos)?;
                (Token::Str(s), consumed)
            }
            '-' if next.map_or(false, |n| n.is_ascii_digit()) => lex_number(&chars[i..], pos)?,
            d if d.is_ascii_digit() => lex_number(&chars[i..], pos)?,
            a if a.is_alphabetic() || a == '_' || a == '$' => {
                let mut end = i;
                while end < chars.len() {
                    let ch = chars[end].1;
                    if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                        end += 1;
                    } else {
                        break;
                    }
                }
                let word: String = chars[i..end].iter().map(|(_, ch)| *ch).collect();
                (keyword_or_ident(word), end - i)
            }
            other => {
                return Err(FilterError::InvalidSyntax {
                    pos,
                    message: format!("unexpected character '{}'", other),
                })
            }
        };

        tokens.push(Spanned { token, pos });
        i += consumed;
    }

    Ok(tokens)
}

fn keyword_or_ident(word: String) -> Token {
    match word.to_ascii_lowercase().as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "in" => Token::In,
        "like" => Token::Like,
        "true" => Token::True,
        "false" => Token::False,
        _ => Token::Ident(word),
    }
}

fn lex_string(chars: &[(usize, char)], quote: char, pos: usize) -> Result<(String, usize), FilterError> {
    let mut out = String::new();
    let mut i = 1;
    while i < chars.len() {
        let c = chars[i].1;
        if c == quote {
            return Ok((out, i + 1));
        }
        if c == '\\' {
            match chars.get(i + 1).map(|(_, c)| *c) {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some(e @ ('"' | '\'' | '\\')) => out.push(e),
                // keep unknown escapes (e.g. `\%` in like patterns) verbatim
                Some(e) => {
                    out.push('\\');
                    out.push(e);
                }
                None => break,
            }
            i += 2;
            continue;
        }
        out.push(c);
        i += 1;
    }
    Err(FilterError::InvalidSyntax {
        pos,
        message: "unterminated string literal".to_string(),
    })
}

fn lex_number(chars: &[(usize, char)], pos: usize) -> Result<(Token, usize), FilterError> {
    let mut i = 0;
    let mut is_float = false;
    if chars[0].1 == '-' {
        i += 1;
    }
    while i < chars.len() {
        let c = chars[i].1;
        if c.is_ascii_digit() {
            i += 1;
        } else if c == '.' && !is_float {
            is_float = true;
            i += 1;
        } else if (c == 'e' || c == 'E')
            && chars
                .get(i + 1)
                .map_or(false, |(_, n)| n.is_ascii_digit() || *n == '-' || *n == '+')
        {
            is_float = true;
            i += 2;
        } else {
            break;
        }
    }
    let text: String = chars[..i].iter().map(|(_, c)| *c).collect();
    let bad = |_| FilterError::InvalidSyntax {
        pos,
        message: format!("invalid number '{}'", text),
    };
    if is_float {
        text.parse::<f64>().map(|f| (Token::Float(f), i)).map_err(bad)
    } else {
        match text.parse::<i64>() {
            Ok(v) => Ok((Token::Int(v), i)),
            Err(_) => text.parse::<f64>().map(|f| (Token::Float(f), i)).map_err(bad),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<Token> {
        tokenize(input).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn test_chained_comparison_tokens() {
        assert_eq!(
            kinds("10 < reading_time <= 15.5"),
            vec![
                Token::Int(10),
                Token::Lt,
                Token::Ident("reading_time".to_string()),
                Token::Le,
                Token::Float(15.5),
            ]
        );
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            kinds("a AND b Or NOT c && d || !e"),
            vec![
                Token::Ident("a".to_string()),
                Token::And,
                Token::Ident("b".to_string()),
                Token::Or,
                Token::Not,
                Token::Ident("c".to_string()),
                Token::And,
                Token::Ident("d".to_string()),
                Token::Or,
                Token::Not,
                Token::Ident("e".to_string()),
            ]
        );
    }

    #[test]
    fn test_strings_with_both_quotes() {
        assert_eq!(
            kinds(r#"color == 'green' or title == "say \"hi\"""#),
            vec![
                Token::Ident("color".to_string()),
                Token::Eq,
                Token::Str("green".to_string()),
                Token::Or,
                Token::Ident("title".to_string()),
                Token::Eq,
                Token::Str("say \"hi\"".to_string()),
            ]
        );
    }

    #[test]
    fn test_meta_and_negative_numbers() {
        assert_eq!(
            kinds(r#"$meta["x"] > -3"#),
            vec![
                Token::Ident("$meta".to_string()),
                Token::LBracket,
                Token::Str("x".to_string()),
                Token::RBracket,
                Token::Gt,
                Token::Int(-3),
            ]
        );
    }

    #[test]
    fn test_unterminated_string() {
        assert!(matches!(
            tokenize("title like \"Top%"),
            Err(FilterError::InvalidSyntax { pos: 11, .. })
        ));
    }

    #[test]
    fn test_stray_character() {
        assert!(tokenize("a = 1").is_err());
        assert!(tokenize("a # 1").is_err());
    }
}
