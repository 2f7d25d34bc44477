//! Expression tokenizer.

use std::fmt;

use super::ExprError;
use crate::limits::MAX_NUMBER_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operator {
    pub fn precedence(self) -> u8 {
        match self {
            Operator::Add | Operator::Sub => 1,
            Operator::Mul | Operator::Div => 2,
        }
    }

    pub fn apply(self, left: f64, right: f64) -> Result<f64, ExprError> {
        let v = match self {
            Operator::Add => left + right,
            Operator::Sub => left - right,
            Operator::Mul => left * right,
            Operator::Div => {
                if right == 0.0 {
                    return Err(ExprError::DivisionByZero);
                }
                left / right
            }
        };
        if !v.is_finite() {
            return Err(ExprError::NonFinite);
        }
        Ok(v)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
        };
        write!(f, "{c}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token {
    Number(f64),
    Op(Operator),
    LParen,
    RParen,
}

/// Decides how a `+`/`-` directly followed by a digit is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notation {
    /// Sign only where an operand is expected, so `1 -2` is a subtraction.
    Infix,
    /// Always a sign: operands may follow operands.
    Postfix,
}

/// Tokenizer owning its cursor over one expression.
pub struct Tokenizer<'a> {
    src: &'a [u8],
    pos: usize,
    notation: Notation,
    operand_expected: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(src: &'a str, notation: Notation) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            notation,
            operand_expected: true,
        }
    }

    fn peek_at(&self, at: usize) -> Option<u8> {
        self.src.get(at).copied()
    }

    fn sign_starts_number(&self) -> bool {
        let next_is_digit = self.peek_at(self.pos + 1).is_some_and(|b| b.is_ascii_digit());
        next_is_digit && (self.notation == Notation::Postfix || self.operand_expected)
    }

    fn number(&mut self) -> Result<Token, ExprError> {
        let start = self.pos;
        if matches!(self.peek_at(self.pos), Some(b'+' | b'-')) {
            self.pos += 1;
        }
        while let Some(b) = self.peek_at(self.pos) {
            if !(b.is_ascii_digit() || b == b'.') {
                break;
            }
            self.pos += 1;
        }
        if self.pos - start > MAX_NUMBER_LEN {
            return Err(ExprError::NumberTooLong);
        }
        let text = self
            .src
            .get(start..self.pos)
            .and_then(|b| std::str::from_utf8(b).ok())
            .unwrap_or_default();
        let v: f64 = text
            .parse()
            .map_err(|_| ExprError::InvalidNumber(text.to_string()))?;
        Ok(Token::Number(v))
    }

    fn invalid_at(&self) -> ExprError {
        let ch = self
            .src
            .get(self.pos..)
            .and_then(|rest| String::from_utf8_lossy(rest).chars().next())
            .unwrap_or('\0');
        ExprError::InvalidCharacter { ch, offset: self.pos }
    }
}

impl Iterator for Tokenizer<'_> {
    type Item = Result<Token, ExprError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.peek_at(self.pos).is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        let b = self.peek_at(self.pos)?;

        let tok = match b {
            b'0'..=b'9' | b'.' => self.number(),
            b'+' | b'-' if self.sign_starts_number() => self.number(),
            b'+' | b'-' | b'*' | b'/' | b'(' | b')' => {
                self.pos += 1;
                Ok(match b {
                    b'+' => Token::Op(Operator::Add),
                    b'-' => Token::Op(Operator::Sub),
                    b'*' => Token::Op(Operator::Mul),
                    b'/' => Token::Op(Operator::Div),
                    b'(' => Token::LParen,
                    _ => Token::RParen,
                })
            }
            _ => Err(self.invalid_at()),
        };

        match &tok {
            Ok(Token::Number(_)) | Ok(Token::RParen) => self.operand_expected = false,
            Ok(Token::Op(_)) | Ok(Token::LParen) => self.operand_expected = true,
            // Stop after the first error.
            Err(_) => self.pos = self.src.len(),
        }
        Some(tok)
    }
}
