//! Condition compilation and matching.
//!
//! A condition is a list of `attr op literal` clauses joined by `&&`, e.g.
//! `filter.num <= 4 && app_domain == "monitor"`. Literals may be quoted.

use std::collections::HashMap;

use super::evaluator::EvaluatorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    // Two-character operators first so `<=` is not read as `<`.
    const TABLE: [(&'static str, CompareOp); 6] = [
        ("==", CompareOp::Eq),
        ("!=", CompareOp::Ne),
        ("<=", CompareOp::Le),
        (">=", CompareOp::Ge),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ];

    fn is_ordering(self) -> bool {
        !matches!(self, CompareOp::Eq | CompareOp::Ne)
    }

    fn holds(self, ord: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ord == Equal,
            CompareOp::Ne => ord != Equal,
            CompareOp::Lt => ord == Less,
            CompareOp::Le => ord != Greater,
            CompareOp::Gt => ord == Greater,
            CompareOp::Ge => ord != Less,
        }
    }
}

/// Compiled `attr op literal` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    pub attr: String,
    pub op: CompareOp,
    pub literal: String,
}

/// A clause compared a number against a non-number with an ordering operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeMismatch;

pub fn compile_conditions(raw: &str) -> Result<Vec<Clause>, EvaluatorError> {
    let mut out = Vec::new();
    for part in split_clauses(raw)? {
        let part = part.trim();
        if part.is_empty() {
            return Err(EvaluatorError::Syntax(format!("empty clause in {raw:?}")));
        }
        out.push(compile_clause(part)?);
    }
    Ok(out)
}

fn compile_clause(s: &str) -> Result<Clause, EvaluatorError> {
    let (at, op_str, op) = CompareOp::TABLE
        .iter()
        .filter_map(|(text, op)| s.find(text).map(|at| (at, *text, *op)))
        .min_by_key(|(at, text, _)| (*at, std::cmp::Reverse(text.len())))
        .ok_or_else(|| EvaluatorError::Syntax(format!("no comparison in {s:?}")))?;

    let attr = s[..at].trim();
    if !is_attribute(attr) {
        return Err(EvaluatorError::Syntax(format!("invalid attribute {attr:?}")));
    }
    let literal = unquote(s[at + op_str.len()..].trim())?;
    Ok(Clause {
        attr: attr.to_string(),
        op,
        literal,
    })
}

/// Split on `&&` outside double quotes. An empty condition has no clauses.
fn split_clauses(raw: &str) -> Result<Vec<&str>, EvaluatorError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    let bytes = raw.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => quoted = !quoted,
            b'&' if !quoted && bytes.get(i + 1) == Some(&b'&') => {
                out.push(&raw[start..i]);
                i += 2;
                start = i;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    if quoted {
        return Err(EvaluatorError::Syntax(format!("unterminated quote in {raw:?}")));
    }
    out.push(&raw[start..]);
    Ok(out)
}

fn is_attribute(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Strip one pair of surrounding double quotes.
pub fn unquote(s: &str) -> Result<String, EvaluatorError> {
    match s.strip_prefix('"') {
        Some(rest) => rest
            .strip_suffix('"')
            .filter(|inner| !inner.contains('"'))
            .map(str::to_string)
            .ok_or_else(|| EvaluatorError::Syntax(format!("bad quoting in {s:?}"))),
        None if s.contains('"') || s.is_empty() => {
            Err(EvaluatorError::Syntax(format!("bad literal {s:?}")))
        }
        None => Ok(s.to_string()),
    }
}

/// Whether every clause holds over `facts`. Unknown attributes read as empty.
pub fn conditions_hold(
    clauses: &[Clause],
    facts: &HashMap<String, String>,
) -> Result<bool, TypeMismatch> {
    for c in clauses {
        let value = facts.get(&c.attr).map(String::as_str).unwrap_or("");
        let ord = match (value.parse::<f64>(), c.literal.parse::<f64>()) {
            (Ok(a), Ok(b)) => match a.partial_cmp(&b) {
                Some(ord) => ord,
                None => return Err(TypeMismatch),
            },
            _ if c.op.is_ordering() => return Err(TypeMismatch),
            _ => value.cmp(c.literal.as_str()),
        };
        if !c.op.holds(ord) {
            return Ok(false);
        }
    }
    Ok(true)
}
