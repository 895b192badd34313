//! Condition tokenizer.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use super::ExpressionError;

static VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\w+(?:\.\w+)*").expect("valid variable regex"));

static STRING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^"([^"]*)""#).expect("valid string regex"));

/// A lexical token of the condition language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Dotted variable reference, e.g. `inputs.env`
    Variable(String),
    /// Double-quoted literal (quotes stripped, no escapes)
    Str(String),
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `&&`
    And,
    /// `||`
    Or,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => f.write_str(name),
            Self::Str(value) => write!(f, "\"{value}\""),
            Self::Eq => f.write_str("=="),
            Self::Ne => f.write_str("!="),
            Self::And => f.write_str("&&"),
            Self::Or => f.write_str("||"),
        }
    }
}

const OPERATORS: [(&str, Token); 4] =
    [("==", Token::Eq), ("!=", Token::Ne), ("&&", Token::And), ("||", Token::Or)];

/// Split a condition into tokens. Whitespace separates tokens and is dropped.
pub fn tokenize(expression: &str) -> Result<Vec<Token>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut rest = expression.trim_start();

    while !rest.is_empty() {
        let (token, len) = next_token(rest).ok_or_else(|| ExpressionError::Lex {
            expression: expression.to_string(),
            position: expression.len() - rest.len(),
        })?;
        tokens.push(token);
        rest = rest[len..].trim_start();
    }

    Ok(tokens)
}

fn next_token(input: &str) -> Option<(Token, usize)> {
    if let Some(m) = VARIABLE.find(input) {
        return Some((Token::Variable(m.as_str().to_string()), m.end()));
    }
    if let Some(caps) = STRING.captures(input) {
        let whole = caps.get(0)?;
        return Some((Token::Str(caps[1].to_string()), whole.end()));
    }
    OPERATORS
        .iter()
        .find(|(op, _)| input.starts_with(op))
        .map(|(op, token)| (token.clone(), op.len()))
}
