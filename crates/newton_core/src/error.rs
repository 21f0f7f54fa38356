//! Typed errors of the expression layer.
//!
//! - [`ParseError`]  : the text is not an expression over the designated variable.
//!   Raised at setup, before any iteration.
//! - [`DomainError`] : an evaluation is undefined at a specific point.
//!   Captured by the iterator as a terminal state, never propagated past it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty expression")]
    Empty,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedCharacter { ch: char, pos: usize },

    #[error("invalid number literal '{literal}' at position {pos}")]
    InvalidNumber { literal: String, pos: usize },

    #[error("unknown variable '{name}'; expressions may only use '{expected}'")]
    UnknownVariable { name: String, expected: String },

    #[error("unsupported function '{name}'; expected one of sqrt, exp, log, sin, cos, tan")]
    UnsupportedFunction { name: String },

    #[error("function '{name}' must be called with a parenthesised argument")]
    MissingArgument { name: String },

    #[error("expected {expected}, found {found}")]
    UnexpectedToken { expected: &'static str, found: String },

    #[error("unexpected end of expression; expected {expected}")]
    UnexpectedEnd { expected: &'static str },

    #[error("expression nests deeper than {limit} levels")]
    TooDeep { limit: usize },

    #[error("expression has more than {limit} tokens")]
    TooLong { limit: usize },
}

/// Reasons an expression has no real value at a point.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("log of non-positive argument {arg}")]
    LogOfNonPositive { arg: f64 },

    #[error("sqrt of negative argument {arg}")]
    SqrtOfNegative { arg: f64 },

    #[error("negative base {base} raised to non-integer power {exponent}")]
    ComplexPower { base: f64, exponent: f64 },

    #[error("{operation} is not finite at argument {arg}")]
    Overflow { operation: String, arg: f64 },
}

impl DomainError {
    pub(crate) fn overflow(operation: impl Into<String>, arg: f64) -> Self {
        Self::Overflow {
            operation: operation.into(),
            arg,
        }
    }
}
