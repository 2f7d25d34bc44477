//! Postfix stack machine and infix (shunting-yard) front end.

use super::token::{Notation, Operator, Token, Tokenizer};
use super::ExprError;

/// Evaluate a space-separated postfix expression.
///
/// Empty (or blank) input evaluates to `0.0`.
pub fn eval_postfix(s: &str) -> Result<f64, ExprError> {
    if s.trim().is_empty() {
        return Ok(0.0);
    }
    let mut stack = Vec::new();
    for tok in Tokenizer::new(s, Notation::Postfix) {
        match tok? {
            Token::Number(v) => stack.push(v),
            Token::Op(op) => apply(&mut stack, op)?,
            Token::LParen | Token::RParen => return Err(ExprError::ParenInPostfix),
        }
    }
    finish(stack)
}

/// Evaluate an infix expression with the usual precedence (`*`, `/` bind
/// tighter than `+`, `-`; all left associative; parentheses override).
///
/// Empty (or blank) input evaluates to `0.0`.
pub fn eval_infix(s: &str) -> Result<f64, ExprError> {
    if s.trim().is_empty() {
        return Ok(0.0);
    }
    let postfix = to_postfix(s)?;

    let mut stack = Vec::with_capacity(postfix.len());
    for tok in postfix {
        match tok {
            Token::Number(v) => stack.push(v),
            Token::Op(op) => apply(&mut stack, op)?,
            Token::LParen | Token::RParen => return Err(ExprError::UnbalancedParens),
        }
    }
    finish(stack)
}

fn apply(stack: &mut Vec<f64>, op: Operator) -> Result<(), ExprError> {
    let right = stack.pop().ok_or(ExprError::MissingOperand(op))?;
    let left = stack.pop().ok_or(ExprError::MissingOperand(op))?;
    stack.push(op.apply(left, right)?);
    Ok(())
}

fn finish(mut stack: Vec<f64>) -> Result<f64, ExprError> {
    match (stack.pop(), stack.is_empty()) {
        (Some(v), true) => Ok(v),
        (Some(_), false) => Err(ExprError::DanglingOperand),
        (None, _) => Err(ExprError::Incomplete),
    }
}

/// Shunting-yard conversion. Also checks that operands and operators alternate.
fn to_postfix(s: &str) -> Result<Vec<Token>, ExprError> {
    let mut out = Vec::new();
    let mut ops: Vec<Token> = Vec::new();
    let mut operand_expected = true;

    for tok in Tokenizer::new(s, Notation::Infix) {
        let tok = tok?;
        match tok {
            Token::Number(_) => {
                if !operand_expected {
                    return Err(ExprError::DanglingOperand);
                }
                out.push(tok);
                operand_expected = false;
            }
            Token::Op(op) => {
                if operand_expected {
                    return Err(ExprError::MissingOperand(op));
                }
                while let Some(&Token::Op(top)) = ops.last() {
                    if top.precedence() < op.precedence() {
                        break;
                    }
                    out.push(Token::Op(top));
                    ops.pop();
                }
                ops.push(tok);
                operand_expected = true;
            }
            Token::LParen => {
                if !operand_expected {
                    return Err(ExprError::DanglingOperand);
                }
                ops.push(tok);
            }
            Token::RParen => {
                if operand_expected {
                    return Err(ExprError::Incomplete);
                }
                loop {
                    match ops.pop() {
                        Some(Token::LParen) => break,
                        Some(t) => out.push(t),
                        None => return Err(ExprError::UnbalancedParens),
                    }
                }
            }
        }
    }

    if operand_expected {
        return Err(ExprError::Incomplete);
    }
    while let Some(t) = ops.pop() {
        if t == Token::LParen {
            return Err(ExprError::UnbalancedParens);
        }
        out.push(t);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn infix_precedence_and_grouping() {
        assert_eq!(eval_infix("2 + 3 * 4").unwrap(), 14.0);
        assert_eq!(eval_infix("(2 + 3) * 4").unwrap(), 20.0);
        assert_eq!(eval_infix("8 / 2 / 2").unwrap(), 2.0);
        assert_eq!(eval_infix("10 - 4 - 3").unwrap(), 3.0);
        assert_eq!(eval_infix("1 -2").unwrap(), -1.0);
        assert_eq!(eval_infix("-1.5 * -2").unwrap(), 3.0);
        assert_eq!(eval_infix("2 - 2").unwrap(), 0.0);
    }

    #[test]
    fn postfix_stack_machine() {
        assert_eq!(eval_postfix("2 3 4 * +").unwrap(), 14.0);
        assert_eq!(eval_postfix("10 2 /").unwrap(), 5.0);
        assert_eq!(eval_postfix("5 -3 +").unwrap(), 2.0);
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(eval_infix("").unwrap(), 0.0);
        assert_eq!(eval_infix("   ").unwrap(), 0.0);
        assert_eq!(eval_postfix("").unwrap(), 0.0);
    }

    #[test]
    fn evaluation_errors() {
        assert_eq!(eval_infix("1 / 0").unwrap_err(), ExprError::DivisionByZero);
        assert_eq!(eval_infix("(1 + 2").unwrap_err(), ExprError::UnbalancedParens);
        assert_eq!(eval_infix("1 + 2)").unwrap_err(), ExprError::UnbalancedParens);
        assert_eq!(eval_infix("1 +").unwrap_err(), ExprError::Incomplete);
        assert_eq!(eval_infix("()").unwrap_err(), ExprError::Incomplete);
        assert_eq!(eval_infix("2 3").unwrap_err(), ExprError::DanglingOperand);
        assert_eq!(eval_postfix("1 +").unwrap_err(), ExprError::MissingOperand(Operator::Add));
        assert_eq!(eval_postfix("1 2").unwrap_err(), ExprError::DanglingOperand);
        assert_eq!(eval_postfix("( 1 )").unwrap_err(), ExprError::ParenInPostfix);
    }

    #[test]
    fn overflow_to_infinity_is_rejected() {
        let big = "1".repeat(60);
        let expr = format!("{big} * {big} * {big} * {big} * {big} * {big}");
        assert_eq!(eval_infix(&expr).unwrap_err(), ExprError::NonFinite);
    }
}
