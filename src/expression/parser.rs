//! Recursive-descent parser and tree evaluator for conditions.
//!
//! Grammar, lowest precedence first:
//!
//! ```text
//! or   := and ( "||" and )*
//! and  := eq ( "&&" eq )*
//! eq   := atom ( ("==" | "!=") atom )?
//! atom := VARIABLE | STRING
//! ```

use std::fmt;
use std::iter::Peekable;
use std::vec::IntoIter;

use super::lexer::Token;
use super::ExpressionError;

/// Equality operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
}

/// Boolean connective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

impl CompareOp {
    /// Get the string representation of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
        }
    }
}

impl LogicalOp {
    /// Get the string representation of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "&&",
            Self::Or => "||",
        }
    }
}

/// A parsed condition tree.
///
/// `Display` renders the tree as a fully parenthesized prefix form, e.g.
/// `(|| p (&& q r))`, which is stable and cheap to compare in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Variable(String),
    Str(String),
    Compare { left: Box<Node>, op: CompareOp, right: Box<Node> },
    Logical { left: Box<Node>, op: LogicalOp, right: Box<Node> },
}

/// Result of evaluating a node: atoms yield strings, operators yield booleans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluated {
    Str(String),
    Bool(bool),
}

impl Evaluated {
    /// Non-empty strings and `true` are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Str(s) => !s.is_empty(),
            Self::Bool(b) => *b,
        }
    }

    fn into_string(self) -> String {
        match self {
            Self::Str(s) => s,
            Self::Bool(b) => b.to_string(),
        }
    }
}

impl Node {
    /// Evaluate the tree left to right, resolving variables through `resolve`.
    pub fn evaluate<F>(&self, resolve: &F) -> Result<Evaluated, ExpressionError>
    where
        F: Fn(&str) -> Result<String, ExpressionError>,
    {
        match self {
            Self::Variable(name) => resolve(name).map(Evaluated::Str),
            Self::Str(value) => Ok(Evaluated::Str(value.clone())),
            Self::Compare { left, op, right } => {
                let left = left.evaluate(resolve)?.into_string();
                let right = right.evaluate(resolve)?.into_string();
                Ok(Evaluated::Bool(match op {
                    CompareOp::Eq => left == right,
                    CompareOp::Ne => left != right,
                }))
            }
            Self::Logical { left, op, right } => {
                let left = left.evaluate(resolve)?.is_truthy();
                let right = right.evaluate(resolve)?.is_truthy();
                Ok(Evaluated::Bool(match op {
                    LogicalOp::And => left && right,
                    LogicalOp::Or => left || right,
                }))
            }
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Variable(name) => f.write_str(name),
            Self::Str(value) => write!(f, "\"{value}\""),
            Self::Compare { left, op, right } => write!(f, "({} {left} {right})", op.as_str()),
            Self::Logical { left, op, right } => write!(f, "({} {left} {right})", op.as_str()),
        }
    }
}

/// Parse a token list into a tree. All tokens must be consumed.
pub fn parse(tokens: Vec<Token>) -> Result<Node, ExpressionError> {
    let mut parser = Parser { tokens: tokens.into_iter().peekable() };
    let node = parser.parse_or()?;
    match parser.tokens.next() {
        None => Ok(node),
        Some(token) => Err(ExpressionError::UnexpectedToken(token.to_string())),
    }
}

struct Parser {
    tokens: Peekable<IntoIter<Token>>,
}

impl Parser {
    fn parse_or(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.parse_and()?;
        while self.tokens.next_if_eq(&Token::Or).is_some() {
            let right = self.parse_and()?;
            node = Node::Logical { left: Box::new(node), op: LogicalOp::Or, right: Box::new(right) };
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Node, ExpressionError> {
        let mut node = self.parse_eq()?;
        while self.tokens.next_if_eq(&Token::And).is_some() {
            let right = self.parse_eq()?;
            node =
                Node::Logical { left: Box::new(node), op: LogicalOp::And, right: Box::new(right) };
        }
        Ok(node)
    }

    fn parse_eq(&mut self) -> Result<Node, ExpressionError> {
        let left = self.parse_atom()?;
        let op = match self.tokens.peek() {
            Some(Token::Eq) => CompareOp::Eq,
            Some(Token::Ne) => CompareOp::Ne,
            _ => return Ok(left),
        };
        self.tokens.next();
        let right = self.parse_atom()?;
        Ok(Node::Compare { left: Box::new(left), op, right: Box::new(right) })
    }

    fn parse_atom(&mut self) -> Result<Node, ExpressionError> {
        match self.tokens.next() {
            Some(Token::Variable(name)) => Ok(Node::Variable(name)),
            Some(Token::Str(value)) => Ok(Node::Str(value)),
            Some(token) => Err(ExpressionError::UnexpectedToken(token.to_string())),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::lexer::tokenize;

    fn tree(expression: &str) -> String {
        parse(tokenize(expression).unwrap()).unwrap().to_string()
    }

    #[test]
    fn test_single_atoms() {
        assert_eq!(tree("a.b"), "a.b");
        assert_eq!(tree(r#""x""#), r#""x""#);
    }

    #[test]
    fn test_equality_binds_tighter_than_and() {
        assert_eq!(tree(r#""a" == "b" && "c" != "d""#), r#"(&& (== "a" "b") (!= "c" "d"))"#);
    }

    #[test]
    fn test_and_binds_tighter_than_or() {
        assert_eq!(tree("p || q && r"), "(|| p (&& q r))");
        assert_eq!(tree("p && q || r"), "(|| (&& p q) r)");
    }

    #[test]
    fn test_chains_are_left_associative() {
        assert_eq!(tree("a || b || c"), "(|| (|| a b) c)");
        assert_eq!(tree("a && b && c"), "(&& (&& a b) c)");
    }

    #[test]
    fn test_mixed_expression_shape() {
        assert_eq!(
            tree(r#"foo.bar == "dummy" && "xy" != x.y || a.b == "ab" && u.v != "uv""#),
            r#"(|| (&& (== foo.bar "dummy") (!= "xy" x.y)) (&& (== a.b "ab") (!= u.v "uv")))"#
        );
    }

    #[test]
    fn test_parse_is_deterministic() {
        let text = r#"a == "1" || b != "2" && c"#;
        let first = parse(tokenize(text).unwrap()).unwrap();
        let second = parse(tokenize(text).unwrap()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_string(), second.to_string());
    }

    #[test]
    fn test_grammar_errors() {
        let cases = [
            ("", ExpressionError::UnexpectedEnd),
            ("a ==", ExpressionError::UnexpectedEnd),
            ("a &&", ExpressionError::UnexpectedEnd),
            ("== a", ExpressionError::UnexpectedToken("==".into())),
            ("a || && b", ExpressionError::UnexpectedToken("&&".into())),
            ("a b", ExpressionError::UnexpectedToken("b".into())),
            (r#"a == "b" == c"#, ExpressionError::UnexpectedToken("==".into())),
        ];
        for (text, expected) in cases {
            let err = parse(tokenize(text).unwrap()).unwrap_err();
            assert_eq!(err, expected, "for {text:?}");
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(Evaluated::Str("false".into()).is_truthy());
        assert!(!Evaluated::Str(String::new()).is_truthy());
        assert!(Evaluated::Bool(true).is_truthy());
        assert!(!Evaluated::Bool(false).is_truthy());
    }
}
