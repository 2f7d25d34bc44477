//! printf-style formula templates over instance arguments.
//!
//! Supported directives: `%%`, and `%[N$][.P][l|ll]conv` with `conv` one of
//! `d i u f e g`. `N` is a 1-based argument index; without it directives
//! consume arguments in order. `e` and `g` render like `f` so the result stays
//! inside the expression grammar.

use super::ExprError;
use crate::catalog::FunctionArgument;
use crate::limits::MAX_FORMAT_PRECISION;

/// Numeric view of one argument, as seen by a cost formula.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CostArg {
    Int(i64),
    UInt(u64),
    Double(f64),
}

impl From<&FunctionArgument> for CostArg {
    fn from(arg: &FunctionArgument) -> Self {
        match arg {
            FunctionArgument::Int32(v) => CostArg::Int(i64::from(*v)),
            FunctionArgument::Double(v) => CostArg::Double(*v),
            FunctionArgument::UInt64(v) => CostArg::UInt(*v),
            FunctionArgument::Str(s) => CostArg::Int(i64::try_from(s.len()).unwrap_or(i64::MAX)),
            FunctionArgument::Function(_) => CostArg::Int(0),
        }
    }
}

impl CostArg {
    fn render_integer(self) -> String {
        match self {
            CostArg::Int(v) => v.to_string(),
            CostArg::UInt(v) => v.to_string(),
            CostArg::Double(v) => (v.trunc() as i64).to_string(),
        }
    }

    fn render_float(self, precision: usize) -> String {
        let v = match self {
            CostArg::Int(v) => v as f64,
            CostArg::UInt(v) => v as f64,
            CostArg::Double(v) => v,
        };
        format!("{v:.precision$}")
    }
}

/// Substitute `args` into `template`.
pub fn render(template: &str, args: &[CostArg]) -> Result<String, ExprError> {
    let mut out = String::with_capacity(template.len() + 16);
    let mut chars = template.char_indices().peekable();
    let mut next_seq = 0usize;

    while let Some((start, c)) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.next_if(|&(_, c)| c == '%').is_some() {
            out.push('%');
            continue;
        }

        // Optional `N$` or `.P`; both start with digits only for N.
        let mut digits = String::new();
        while let Some((_, d)) = chars.next_if(|&(_, c)| c.is_ascii_digit()) {
            digits.push(d);
        }
        let position = if digits.is_empty() {
            None
        } else if chars.next_if(|&(_, c)| c == '$').is_some() {
            digits.parse::<usize>().ok().filter(|&n| n > 0)
        } else {
            return Err(bad_directive(template, start, &chars));
        };

        let mut precision = None;
        if chars.next_if(|&(_, c)| c == '.').is_some() {
            let mut p = String::new();
            while let Some((_, d)) = chars.next_if(|&(_, c)| c.is_ascii_digit()) {
                p.push(d);
            }
            // Digits past usize are still a (clamped) precision.
            let p = if p.is_empty() { 0 } else { p.parse::<usize>().unwrap_or(usize::MAX) };
            precision = Some(p.min(MAX_FORMAT_PRECISION));
        }

        let mut longs = 0;
        while chars.next_if(|&(_, c)| c == 'l').is_some() {
            longs += 1;
        }
        let conv = chars.next().map(|(_, c)| c);
        if longs > 2 || !digits.is_empty() && position.is_none() {
            return Err(bad_directive(template, start, &chars));
        }

        let index = match position {
            Some(n) => n - 1,
            None => {
                next_seq += 1;
                next_seq - 1
            }
        };
        let arg = args.get(index).copied().ok_or(ExprError::MissingArgument {
            index: index + 1,
            available: args.len(),
        })?;

        match conv {
            Some('d' | 'i' | 'u') => out.push_str(&arg.render_integer()),
            Some('f' | 'e' | 'g') => out.push_str(&arg.render_float(precision.unwrap_or(6))),
            _ => return Err(bad_directive(template, start, &chars)),
        }
    }
    Ok(out)
}

fn bad_directive<I>(template: &str, start: usize, rest: &std::iter::Peekable<I>) -> ExprError
where
    I: Iterator<Item = (usize, char)> + Clone,
{
    let end = rest
        .clone()
        .peek()
        .map(|&(i, _)| i)
        .unwrap_or(template.len());
    ExprError::BadDirective(template.get(start..end).unwrap_or(template).to_string())
}
