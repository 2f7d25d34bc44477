//! Trust-evaluator seam.
//!
//! The authorization engine only talks to a [`TrustEvaluator`] through these
//! traits, so the shipped [`super::RuleEvaluator`] can be swapped for a full
//! trust-management engine.

use std::ops::{Deref, DerefMut};

use admctrl_core::AdmCtrlError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluatorError {
    #[error("syntax: {0}")]
    Syntax(String),
    #[error("evaluator out of memory")]
    Memory,
    #[error("{0}")]
    Other(String),
}

impl EvaluatorError {
    /// Unified error for a failed call; `rejected` wraps syntax rejections.
    pub fn into_admctrl(self, rejected: impl FnOnce(String) -> AdmCtrlError) -> AdmCtrlError {
        match self {
            EvaluatorError::Memory => AdmCtrlError::Memory("trust evaluator".into()),
            EvaluatorError::Syntax(msg) => rejected(msg),
            EvaluatorError::Other(msg) => AdmCtrlError::Internal(msg),
        }
    }
}

/// Why the last query did not reach the top compliance value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Signature,
    Syntax,
}

/// Anything that accepts `name = value` facts.
pub trait FactSink {
    fn add_fact(&mut self, name: &str, value: &str) -> Result<(), EvaluatorError>;
}

pub trait EvaluatorSession: FactSink {
    fn add_policy_assertion(&mut self, text: &str) -> Result<(), EvaluatorError>;
    fn add_credential_assertion(&mut self, text: &str) -> Result<(), EvaluatorError>;
    /// Principal on whose behalf the query runs.
    fn add_authorizer(&mut self, key: &str) -> Result<(), EvaluatorError>;

    /// Index into `values` (ordered lowest to highest) of the compliance value
    /// reached.
    fn query(&mut self, values: &[&str]) -> Result<usize, EvaluatorError>;

    fn failure_reason(&self) -> Option<FailureReason>;

    /// Release the session. Further calls are no-ops.
    fn close(&mut self);
}

pub trait TrustEvaluator {
    type Session: EvaluatorSession;

    fn open_session(&self) -> Result<Self::Session, EvaluatorError>;
}

/// Open session that is closed when dropped.
pub struct SessionGuard<S: EvaluatorSession> {
    session: S,
}

impl<S: EvaluatorSession> SessionGuard<S> {
    pub fn new(session: S) -> Self {
        Self { session }
    }
}

impl<S: EvaluatorSession> Deref for SessionGuard<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: EvaluatorSession> DerefMut for SessionGuard<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl<S: EvaluatorSession> Drop for SessionGuard<S> {
    fn drop(&mut self) {
        self.session.close();
    }
}

/// Split a credential block into assertions separated by blank lines.
pub fn split_assertions(block: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut cur = String::new();
    for line in block.lines() {
        if line.trim().is_empty() {
            if !cur.is_empty() {
                out.push(std::mem::take(&mut cur));
            }
            continue;
        }
        cur.push_str(line);
        cur.push('\n');
    }
    if !cur.is_empty() {
        out.push(cur);
    }
    out
}
