//! Built-in rule evaluator.
//!
//! Assertions are blocks of `Field: value` lines; a line starting with
//! whitespace continues the previous field.
//!
//! ```text
//! Authorizer: POLICY
//! Licensees: "rsa-hex:3082..." || "rsa-hex:3081..."
//! Conditions: filter.num <= 4 && app_domain == "monitor"
//! ```
//!
//! A query complies when a policy assertion whose conditions hold licenses the
//! requester (or `*`), or licenses the authorizer of a signed credential that
//! licenses the requester and whose own conditions hold. Delegation stops
//! after that one hop.
//!
//! A credential's `Signature` must be its last field and covers every byte of
//! the assertion before that line. It is checked against the authorizer's key
//! when the credential is added; unsigned credentials and credentials whose
//! signature does not verify never take part in a query.

use std::collections::HashMap;

use super::condition::{compile_conditions, conditions_hold, unquote, Clause};
use super::evaluator::{EvaluatorError, EvaluatorSession, FactSink, FailureReason, TrustEvaluator};
use crate::crypto::{verify_assertion, PublicKeyCrypto, RsaCrypto};

/// Authorizer of every policy assertion.
pub const POLICY_AUTHORIZER: &str = "POLICY";

const DEFAULT_MAX_FACTS: usize = 1 << 16;

/// `Signature` field of an assertion and the text it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedText {
    pub body: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assertion {
    pub authorizer: String,
    pub licensees: Vec<String>,
    pub conditions: Vec<Clause>,
    pub signature: Option<SignedText>,
}

impl Assertion {
    pub fn parse(text: &str) -> Result<Self, EvaluatorError> {
        let mut fields: Vec<(String, String)> = Vec::new();
        let mut body_len = None;
        let mut offset = 0;
        for raw in text.split_inclusive('\n') {
            let start = offset;
            offset += raw.len();
            let line = raw.trim_end_matches(['\n', '\r']);
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with([' ', '\t']) {
                let (_, value) = fields.last_mut().ok_or_else(|| {
                    EvaluatorError::Syntax("continuation line before any field".into())
                })?;
                value.push(' ');
                value.push_str(line.trim());
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| EvaluatorError::Syntax(format!("expected `Field: value`, got {line:?}")))?;
            let name = name.trim().to_ascii_lowercase();
            if body_len.is_some() {
                return Err(EvaluatorError::Syntax(format!("field {name} after Signature")));
            }
            if fields.iter().any(|(n, _)| *n == name) {
                return Err(EvaluatorError::Syntax(format!("duplicate field {name}")));
            }
            if name == "signature" {
                body_len = Some(start);
            }
            fields.push((name, value.trim().to_string()));
        }

        let mut authorizer = None;
        let mut licensees = Vec::new();
        let mut conditions = Vec::new();
        let mut signature = None;
        for (name, value) in fields {
            match name.as_str() {
                "authorizer" => authorizer = Some(unquote(&value)?),
                "licensees" => licensees = parse_licensees(&value)?,
                "conditions" => conditions = compile_conditions(&value)?,
                "signature" if value.is_empty() => {}
                "signature" => {
                    let body = text[..body_len.unwrap_or(0)].to_string();
                    signature = Some(SignedText { body, signature: unquote(&value)? });
                }
                "comment" | "keynote-version" => {}
                other => return Err(EvaluatorError::Syntax(format!("unknown field {other}"))),
            }
        }
        let authorizer =
            authorizer.ok_or_else(|| EvaluatorError::Syntax("missing Authorizer field".into()))?;

        Ok(Self {
            authorizer,
            licensees,
            conditions,
            signature,
        })
    }

    fn licenses(&self, principals: &[String]) -> bool {
        self.licensees
            .iter()
            .any(|l| l == "*" || principals.iter().any(|p| p == l))
    }
}

fn parse_licensees(raw: &str) -> Result<Vec<String>, EvaluatorError> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    raw.split("||").map(|p| unquote(p.trim())).collect()
}

/// Shipped [`TrustEvaluator`]; `C` checks credential signatures.
#[derive(Debug, Clone)]
pub struct RuleEvaluator<C = RsaCrypto> {
    crypto: C,
    max_facts: usize,
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::with_crypto(RsaCrypto)
    }
}

impl RuleEvaluator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C> RuleEvaluator<C> {
    pub fn with_crypto(crypto: C) -> Self {
        Self {
            crypto,
            max_facts: DEFAULT_MAX_FACTS,
        }
    }

    /// Sessions refuse facts past `max_facts` with an out-of-memory error.
    pub fn with_fact_limit(mut self, max_facts: usize) -> Self {
        self.max_facts = max_facts;
        self
    }
}

impl<C: PublicKeyCrypto + Clone> TrustEvaluator for RuleEvaluator<C> {
    type Session = RuleSession<C>;

    fn open_session(&self) -> Result<RuleSession<C>, EvaluatorError> {
        Ok(RuleSession {
            crypto: self.crypto.clone(),
            policies: Vec::new(),
            credentials: Vec::new(),
            authorizers: Vec::new(),
            facts: HashMap::new(),
            max_facts: self.max_facts,
            unsigned: 0,
            forged: 0,
            failure: None,
            closed: false,
        })
    }
}

#[derive(Debug)]
pub struct RuleSession<C = RsaCrypto> {
    crypto: C,
    policies: Vec<Assertion>,
    credentials: Vec<Assertion>,
    authorizers: Vec<String>,
    facts: HashMap<String, String>,
    max_facts: usize,
    unsigned: usize,
    forged: usize,
    failure: Option<FailureReason>,
    closed: bool,
}

impl<C> RuleSession<C> {
    fn ensure_open(&self) -> Result<(), EvaluatorError> {
        if self.closed {
            return Err(EvaluatorError::Other("session closed".into()));
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn fact(&self, name: &str) -> Option<&str> {
        self.facts.get(name).map(String::as_str)
    }
}

impl<C> FactSink for RuleSession<C> {
    fn add_fact(&mut self, name: &str, value: &str) -> Result<(), EvaluatorError> {
        self.ensure_open()?;
        if name.is_empty() || name.contains(char::is_whitespace) {
            return Err(EvaluatorError::Syntax(format!("bad fact name {name:?}")));
        }
        if self.facts.len() >= self.max_facts && !self.facts.contains_key(name) {
            return Err(EvaluatorError::Memory);
        }
        self.facts.insert(name.to_string(), value.to_string());
        Ok(())
    }
}

impl<C: PublicKeyCrypto> EvaluatorSession for RuleSession<C> {
    fn add_policy_assertion(&mut self, text: &str) -> Result<(), EvaluatorError> {
        self.ensure_open()?;
        let a = Assertion::parse(text)?;
        if a.authorizer != POLICY_AUTHORIZER {
            return Err(EvaluatorError::Syntax(format!(
                "policy assertion authorized by {:?}",
                a.authorizer
            )));
        }
        self.policies.push(a);
        Ok(())
    }

    fn add_credential_assertion(&mut self, text: &str) -> Result<(), EvaluatorError> {
        self.ensure_open()?;
        let a = Assertion::parse(text)?;
        if a.authorizer == POLICY_AUTHORIZER {
            return Err(EvaluatorError::Syntax("credential authorized by POLICY".into()));
        }
        let Some(signed) = &a.signature else {
            tracing::debug!(authorizer = %a.authorizer, "unsigned credential ignored");
            self.unsigned += 1;
            return Ok(());
        };
        if let Err(e) = verify_assertion(&self.crypto, &a.authorizer, &signed.body, &signed.signature) {
            tracing::warn!(authorizer = %a.authorizer, error = %e, "credential signature rejected");
            self.forged += 1;
            return Ok(());
        }
        self.credentials.push(a);
        Ok(())
    }

    fn add_authorizer(&mut self, key: &str) -> Result<(), EvaluatorError> {
        self.ensure_open()?;
        let key = unquote(key.trim())?;
        self.authorizers.push(key);
        Ok(())
    }

    fn query(&mut self, values: &[&str]) -> Result<usize, EvaluatorError> {
        self.ensure_open()?;
        let top = values
            .len()
            .checked_sub(1)
            .ok_or_else(|| EvaluatorError::Other("empty compliance lattice".into()))?;

        let mut mismatch = false;
        let mut holds = |clauses: &[Clause]| match conditions_hold(clauses, &self.facts) {
            Ok(v) => v,
            Err(_) => {
                mismatch = true;
                false
            }
        };

        let mut compliant = false;
        for p in &self.policies {
            if !holds(&p.conditions) {
                continue;
            }
            if p.licenses(&self.authorizers) {
                compliant = true;
                break;
            }
            let delegated = self.credentials.iter().any(|c| {
                p.licenses(std::slice::from_ref(&c.authorizer))
                    && c.licenses(&self.authorizers)
                    && holds(&c.conditions)
            });
            if delegated {
                compliant = true;
                break;
            }
        }

        self.failure = match (compliant, self.unsigned + self.forged > 0, mismatch) {
            (true, ..) => None,
            (false, true, _) => Some(FailureReason::Signature),
            (false, false, true) => Some(FailureReason::Syntax),
            (false, false, false) => None,
        };
        Ok(if compliant { top } else { 0 })
    }

    fn failure_reason(&self) -> Option<FailureReason> {
        self.failure
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.facts.clear();
            self.policies.clear();
            self.credentials.clear();
        }
    }
}
