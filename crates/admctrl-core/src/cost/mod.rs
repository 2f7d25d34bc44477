//! Variable-cost arithmetic.
//!
//! A consumption record carries a formula template such as `"%1$d * 4 + 100"`.
//! The template is rendered against one function instance's arguments
//! ([`formula::render`]) and the resulting text is evaluated as an infix
//! expression over IEEE doubles ([`eval::eval_infix`]).
//!
//! The tokenizer owns its cursor, so any number of evaluations may run
//! side by side.

pub mod eval;
pub mod formula;
pub mod token;

use thiserror::Error;

pub use eval::{eval_infix, eval_postfix};
pub use formula::{render, CostArg};
pub use token::{Notation, Operator, Token, Tokenizer};

use crate::limits::MAX_NUMBER_LEN;

/// Expression and formula failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("invalid character {ch:?} at offset {offset}")]
    InvalidCharacter { ch: char, offset: usize },
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
    #[error("number longer than {} characters", MAX_NUMBER_LEN)]
    NumberTooLong,
    #[error("operator {0} is missing an operand")]
    MissingOperand(Operator),
    #[error("operand without operator")]
    DanglingOperand,
    #[error("expression ends where an operand is expected")]
    Incomplete,
    #[error("unbalanced parentheses")]
    UnbalancedParens,
    #[error("parenthesis in postfix expression")]
    ParenInPostfix,
    #[error("division by zero")]
    DivisionByZero,
    #[error("non-finite intermediate result")]
    NonFinite,
    #[error("unsupported formula directive {0:?}")]
    BadDirective(String),
    #[error("formula references argument {index} but the instance has {available}")]
    MissingArgument { index: usize, available: usize },
    #[error("cost {0} is negative")]
    Negative(f64),
    #[error("cost {0} does not fit in 32 bits")]
    Overflow(f64),
}

/// Render `formula` against `args`, evaluate it and round to the nearest unit.
///
/// An empty formula costs nothing. Negative results and results of `2^32` or
/// more are rejected.
pub fn variable_cost(formula: &str, args: &[CostArg]) -> Result<u32, ExprError> {
    let text = render(formula, args)?;
    let value = eval_infix(&text)?;
    if value < 0.0 {
        return Err(ExprError::Negative(value));
    }
    if value >= 4_294_967_296.0 {
        return Err(ExprError::Overflow(value));
    }
    let rounded = value.round();
    // 4294967295.5 rounds up past the range.
    if rounded > f64::from(u32::MAX) {
        return Err(ExprError::Overflow(value));
    }
    Ok(rounded as u32)
}
