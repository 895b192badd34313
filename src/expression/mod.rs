//! Condition expressions for `if:` on job steps.
//!
//! A deliberately small language: dotted variables, double-quoted strings,
//! `==`/`!=`, `&&` and `||`. No grouping, no arithmetic. Evaluation is a pure
//! function of the text and the variable resolver.
//!
//! ```
//! use slowhand::expression::{evaluate, ExpressionError};
//!
//! let env = |path: &str| {
//!     Ok::<_, ExpressionError>(if path == "inputs.env" { "prod".to_string() } else { String::new() })
//! };
//! assert!(evaluate(r#"inputs.env == "prod" && inputs.env != "dev""#, &env).unwrap());
//! assert!(!evaluate("inputs.missing", &env).unwrap());
//! ```

mod lexer;
mod parser;

use thiserror::Error;

pub use lexer::{tokenize, Token};
pub use parser::{parse, CompareOp, Evaluated, LogicalOp, Node};

/// Errors raised while tokenizing, parsing or evaluating a condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExpressionError {
    /// No token matches the input at `position`.
    #[error("Invalid token at position {position} in: {expression}")]
    Lex { expression: String, position: usize },

    /// A token appeared where the grammar does not allow it.
    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),

    /// The expression ended in the middle of a rule.
    #[error("Unexpected end of expression")]
    UnexpectedEnd,

    /// A parse error, with the text it came from.
    #[error("Invalid condition `{expression}`: {source}")]
    Invalid {
        expression: String,
        #[source]
        source: Box<ExpressionError>,
    },

    /// The resolver rejected a variable reference.
    #[error("Variable `{path}` cannot be resolved: {reason}")]
    Variable { path: String, reason: String },
}

/// A condition that has been tokenized and parsed once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    text: String,
    root: Node,
}

impl Condition {
    /// Tokenize and parse a condition.
    pub fn compile(text: &str) -> Result<Self, ExpressionError> {
        let root = tokenize(text).and_then(parse).map_err(|e| match e {
            ExpressionError::Lex { .. } => e,
            other => {
                ExpressionError::Invalid { expression: text.to_string(), source: Box::new(other) }
            }
        })?;
        Ok(Self { text: text.to_string(), root })
    }

    /// The source text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The parsed tree.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Evaluate to a boolean using the truthiness of the root value.
    pub fn evaluate<F>(&self, resolve: &F) -> Result<bool, ExpressionError>
    where
        F: Fn(&str) -> Result<String, ExpressionError>,
    {
        Ok(self.root.evaluate(resolve)?.is_truthy())
    }
}

/// Compile and evaluate a condition in one go.
///
/// `resolve` maps a dotted path to its value, returning an empty string for
/// unset variables.
pub fn evaluate<F>(text: &str, resolve: &F) -> Result<bool, ExpressionError>
where
    F: Fn(&str) -> Result<String, ExpressionError>,
{
    Condition::compile(text)?.evaluate(resolve)
}
