//! Policy layer: the trust-evaluator seam and the built-in rule evaluator.
//!
//! Assertions are compiled once when added to a session, then matched against
//! the facts emitted for a request.

pub mod condition;
pub mod evaluator;
pub mod rules;

pub use evaluator::{
    split_assertions, EvaluatorError, EvaluatorSession, FactSink, FailureReason, SessionGuard,
    TrustEvaluator,
};
pub use rules::{Assertion, RuleEvaluator, RuleSession, SignedText, POLICY_AUTHORIZER};
