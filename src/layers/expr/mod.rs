//! Small arithmetic language evaluated once per stitch by program and yarn layers.
//!
//! ```text
//! (row + col) % 2 == 0 ? purl : knit
//! ```

mod eval;
mod lexer;
mod parser;

pub use eval::{Env, eval};
pub use parser::{BinaryOp, Expr, UnaryOp, parse_expr};

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExprError {
    pub offset: usize,
    pub message: String,
}

impl ExprError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expr error at byte {}: {}", self.offset, self.message)
    }
}

impl std::error::Error for ExprError {}

impl From<ExprError> for crate::foundation::error::KnitError {
    fn from(e: ExprError) -> Self {
        Self::validation(e.to_string())
    }
}

#[cfg(test)]
#[path = "../../../tests/unit/layers/expr.rs"]
mod tests;
