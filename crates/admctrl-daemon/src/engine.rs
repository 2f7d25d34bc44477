//! Authorization pipeline.
//!
//! `Authenticate -> BuildAssertions -> EvaluatePolicy -> CheckResources -> Done`
//!
//! Every failure is folded into the returned [`AuthResult`]; the evaluator
//! session is closed on every path by its guard.

use std::time::SystemTime;

use tracing::Instrument;

use admctrl_core::protocol::{decode_function_list, AuthResult, Request, Verdict};
use admctrl_core::{AdmCtrlError, ErrorCode, Result};

use crate::assertions::{
    check_pair_collisions, emit_catalog, emit_pairs, emit_requirements, emit_timestamp,
};
use crate::crypto::{authenticate, PublicKeyCrypto};
use crate::ledger::{CheckOutcome, ResourceLedger, TransactionalStore};
use crate::policy::{
    split_assertions, EvaluatorSession, FailureReason, SessionGuard, TrustEvaluator,
};

/// Compliance values queried, lowest first.
pub const COMPLIANCE_VALUES: [&str; 2] = ["false", "true"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authenticate,
    BuildAssertions,
    EvaluatePolicy,
    CheckResources,
    Done,
}

pub struct Authorizer<E, C, S> {
    policy: Vec<String>,
    evaluator: E,
    crypto: C,
    ledger: Option<ResourceLedger<S>>,
    allocate_on_grant: bool,
}

impl<E, C, S> Authorizer<E, C, S>
where
    E: TrustEvaluator,
    C: PublicKeyCrypto,
    S: TransactionalStore,
{
    /// `policy` holds one or more assertions separated by blank lines.
    pub fn new(policy: &str, evaluator: E, crypto: C) -> Self {
        Self {
            policy: split_assertions(policy),
            evaluator,
            crypto,
            ledger: None,
            allocate_on_grant: false,
        }
    }

    /// Enable resource control. With `allocate_on_grant` a compliant request
    /// also takes its resources from the ledger.
    pub fn with_resource_control(mut self, ledger: ResourceLedger<S>, allocate_on_grant: bool) -> Self {
        self.ledger = Some(ledger);
        self.allocate_on_grant = allocate_on_grant;
        self
    }

    pub fn policy_assertions(&self) -> usize {
        self.policy.len()
    }

    pub fn ledger(&self) -> Option<&ResourceLedger<S>> {
        self.ledger.as_ref()
    }

    pub async fn authorize(&self, req: &Request) -> AuthResult {
        self.authorize_with_stage(req).await.0
    }

    /// Decide `req` and report the stage the pipeline stopped in: `Done` for
    /// every decision the policy and ledger reached, the failing stage
    /// otherwise.
    pub async fn authorize_with_stage(&self, req: &Request) -> (AuthResult, Stage) {
        let span = tracing::info_span!(
            "authorize",
            nonce = req.nonce,
            pairs = req.pairs.len(),
            functions = req.functions_num
        );
        self.decide(req).instrument(span).await
    }

    async fn decide(&self, req: &Request) -> (AuthResult, Stage) {
        let mut result = AuthResult::default();
        let mut stage = Stage::Authenticate;
        if let Err(e) = self.run(req, &mut result, &mut stage).await {
            let code = e.code();
            if code.is_fault() {
                tracing::error!(?stage, code = code.as_str(), error = %e, "authorization fault");
            } else {
                tracing::info!(?stage, code = code.as_str(), error = %e, "request denied");
            }
            result.fail(&e);
        }
        tracing::debug!(?stage, verdict = ?result.verdict, "done");
        (result, stage)
    }

    async fn run(&self, req: &Request, result: &mut AuthResult, stage: &mut Stage) -> Result<()> {
        authenticate(&self.crypto, &req.pubkey, req.nonce, &req.encrypted_nonce)
            .map_err(|e| AdmCtrlError::Authentication(e.to_string()))?;

        *stage = Stage::BuildAssertions;
        tracing::debug!(?stage);
        let session = self
            .evaluator
            .open_session()
            .map_err(|e| e.into_admctrl(AdmCtrlError::Internal))?;
        let mut session = SessionGuard::new(session);

        for a in &self.policy {
            session
                .add_policy_assertion(a)
                .map_err(|e| e.into_admctrl(AdmCtrlError::Policy))?;
        }
        for a in split_assertions(&req.credentials) {
            session
                .add_credential_assertion(&a)
                .map_err(|e| e.into_admctrl(AdmCtrlError::Creds))?;
        }
        session
            .add_authorizer(&req.pubkey)
            .map_err(|e| e.into_admctrl(AdmCtrlError::Pubkey))?;
        emit_pairs(&mut *session, &req.pairs)?;

        let catalog = decode_function_list(&req.function_list, req.functions_num)?;
        check_pair_collisions(&req.pairs, &catalog)?;
        emit_catalog(&mut *session, &catalog)?;

        if let Some(ledger) = &self.ledger {
            result.required = ledger.requirements_for(&catalog).await?;
            emit_requirements(&mut *session, &result.required)?;
        }
        emit_timestamp(&mut *session, SystemTime::now())?;

        *stage = Stage::EvaluatePolicy;
        tracing::debug!(?stage);
        let pcv = session
            .query(&COMPLIANCE_VALUES)
            .map_err(|e| e.into_admctrl(AdmCtrlError::Internal))?;
        if pcv + 1 < COMPLIANCE_VALUES.len() {
            result.verdict = Verdict::NonCompliant;
            result.error = session.failure_reason().map(|r| match r {
                FailureReason::Signature => ErrorCode::Signature,
                FailureReason::Syntax => ErrorCode::Syntax,
            });
            tracing::info!(pcv, reason = ?session.failure_reason(), "policy not satisfied");
            *stage = Stage::Done;
            return Ok(());
        }

        *stage = Stage::CheckResources;
        tracing::debug!(?stage);
        if let Some(ledger) = &self.ledger {
            if let CheckOutcome::Insufficient(s) = ledger.check(&result.required).await? {
                return Err(AdmCtrlError::ResourceCtrlFail {
                    index: s.index as usize,
                    key: s.key,
                    required: s.required,
                    available: s.available,
                });
            }
            if self.allocate_on_grant {
                ledger.allocate(&result.required).await?;
            }
        }

        *stage = Stage::Done;
        result.verdict = Verdict::Compliant;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use admctrl_core::protocol::{ArgValue, FunctionCall, FunctionListBuilder, ResourceRequirement};

    use super::*;
    use crate::crypto::CryptoError;
    use crate::ledger::{Resource, ResourceConsumption, SqliteStore};
    use crate::policy::{EvaluatorError, FactSink, RuleEvaluator, RuleSession};

    /// Accepts a blob equal to the expected bytes.
    struct PlainCrypto;

    impl PublicKeyCrypto for PlainCrypto {
        type Key = ();

        fn decode_key(&self, _: &str) -> std::result::Result<(), CryptoError> {
            Ok(())
        }

        fn verify_blob(&self, _: &(), expected: &[u8], blob: &[u8]) -> std::result::Result<(), CryptoError> {
            if expected == blob {
                Ok(())
            } else {
                Err(CryptoError::Mismatch)
            }
        }

        fn verify_signature(&self, _: &(), _: &[u8], _: &[u8]) -> std::result::Result<(), CryptoError> {
            Err(CryptoError::Mismatch)
        }
    }

    #[derive(Clone, Default)]
    struct Counters {
        opened: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    impl Counters {
        fn balanced(&self) -> bool {
            self.opened.load(Ordering::SeqCst) == self.closed.load(Ordering::SeqCst)
        }
    }

    struct CountingEvaluator {
        inner: RuleEvaluator,
        counters: Counters,
    }

    struct CountingSession {
        inner: RuleSession,
        closed: Arc<AtomicUsize>,
    }

    impl TrustEvaluator for CountingEvaluator {
        type Session = CountingSession;

        fn open_session(&self) -> std::result::Result<CountingSession, EvaluatorError> {
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(CountingSession {
                inner: self.inner.open_session()?,
                closed: Arc::clone(&self.counters.closed),
            })
        }
    }

    impl FactSink for CountingSession {
        fn add_fact(&mut self, name: &str, value: &str) -> std::result::Result<(), EvaluatorError> {
            self.inner.add_fact(name, value)
        }
    }

    impl EvaluatorSession for CountingSession {
        fn add_policy_assertion(&mut self, text: &str) -> std::result::Result<(), EvaluatorError> {
            self.inner.add_policy_assertion(text)
        }
        fn add_credential_assertion(&mut self, text: &str) -> std::result::Result<(), EvaluatorError> {
            self.inner.add_credential_assertion(text)
        }
        fn add_authorizer(&mut self, key: &str) -> std::result::Result<(), EvaluatorError> {
            self.inner.add_authorizer(key)
        }
        fn query(&mut self, values: &[&str]) -> std::result::Result<usize, EvaluatorError> {
            self.inner.query(values)
        }
        fn failure_reason(&self) -> Option<FailureReason> {
            self.inner.failure_reason()
        }
        fn close(&mut self) {
            if !self.inner.is_closed() {
                self.closed.fetch_add(1, Ordering::SeqCst);
            }
            self.inner.close();
        }
    }

    const POLICY: &str = "Authorizer: POLICY\nLicensees: \"alice\"\nConditions: filter.num <= 2\n";

    type TestAuthorizer = Authorizer<CountingEvaluator, PlainCrypto, SqliteStore>;

    fn authorizer_with(policy: &str, evaluator: RuleEvaluator) -> (TestAuthorizer, Counters) {
        let counters = Counters::default();
        let eval = CountingEvaluator {
            inner: evaluator,
            counters: counters.clone(),
        };
        (Authorizer::new(policy, eval, PlainCrypto), counters)
    }

    fn authorizer() -> (TestAuthorizer, Counters) {
        authorizer_with(POLICY, RuleEvaluator::new())
    }

    fn request(filters: usize) -> Request {
        let nonce = 0x1234_5678u32;
        let mut req = Request::new("alice", "", nonce, nonce.to_le_bytes().to_vec());
        let mut b = FunctionListBuilder::new();
        for i in 0..filters {
            b.add(&FunctionCall::new("filter", "libpcap").arg(ArgValue::Int32(i as i32 + 1)))
                .unwrap();
        }
        req.set_functions(b);
        req
    }

    async fn ledger(available: u32) -> ResourceLedger<SqliteStore> {
        let l = ResourceLedger::new(SqliteStore::in_memory().await.unwrap());
        l.add_function("filter", 1, false).await.unwrap();
        l.add_library("libpcap", 1).await.unwrap();
        l.add_resource(7, &Resource { available, description: "cpu".into() }).await.unwrap();
        l.add_consumption(
            0x0001_0001,
            &ResourceConsumption { resource: 7, fixed_cost: 1, formula: "%d * 10".into() },
        )
        .await
        .unwrap();
        l
    }

    async fn available(a: &TestAuthorizer) -> u32 {
        a.ledger().unwrap().resource(7).await.unwrap().unwrap().available
    }

    #[tokio::test]
    async fn compliant_request() {
        let (a, counters) = authorizer();
        let r = a.authorize(&request(2)).await;
        assert_eq!(r.verdict, Verdict::Compliant);
        assert_eq!(r.error, None);
        assert_eq!(counters.opened.load(Ordering::SeqCst), 1);
        assert!(counters.balanced());
    }

    #[tokio::test]
    async fn policy_conditions_can_deny() {
        let (a, counters) = authorizer();
        let r = a.authorize(&request(3)).await;
        assert_eq!(r.verdict, Verdict::NonCompliant);
        assert_eq!(r.error, None);
        assert!(counters.balanced());
    }

    #[tokio::test]
    async fn wrong_nonce_stops_before_any_session() {
        let (a, counters) = authorizer();
        let mut req = request(1);
        req.encrypted_nonce = vec![0, 0, 0, 0];
        let r = a.authorize(&req).await;
        assert_eq!(r.verdict, Verdict::NonCompliant);
        assert_eq!(r.error, Some(ErrorCode::Authentication));
        assert_eq!(counters.opened.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn every_failure_closes_the_session() {
        let (a, counters) = authorizer();

        let mut bad_pair = request(1);
        bad_pair.pairs.push(admctrl_core::protocol::Pair { name: "9x".into(), value: "v".into() });
        assert_eq!(a.authorize(&bad_pair).await.error, Some(ErrorCode::Pair));

        let mut truncated = request(1);
        truncated.function_list = truncated.function_list.slice(..truncated.function_list.len() - 2);
        assert_eq!(a.authorize(&truncated).await.error, Some(ErrorCode::TruncatedField));

        let mut bad_creds = request(1);
        bad_creds.credentials = "not an assertion\n".into();
        assert_eq!(a.authorize(&bad_creds).await.error, Some(ErrorCode::Creds));

        assert_eq!(counters.opened.load(Ordering::SeqCst), 3);
        assert!(counters.balanced());
    }

    #[tokio::test]
    async fn bad_policy_is_a_policy_error() {
        let (a, counters) = authorizer_with("Authorizer: \"mallory\"\n", RuleEvaluator::new());
        assert_eq!(a.authorize(&request(1)).await.error, Some(ErrorCode::Policy));
        assert!(counters.balanced());
    }

    #[tokio::test]
    async fn unsigned_credential_reports_signature() {
        let (a, _) = authorizer_with("Authorizer: POLICY\nLicensees: \"admin\"\n", RuleEvaluator::new());
        let mut req = request(1);
        req.credentials = "Authorizer: \"admin\"\nLicensees: \"alice\"\n".into();
        let r = a.authorize(&req).await;
        assert_eq!(r.verdict, Verdict::NonCompliant);
        assert_eq!(r.error, Some(ErrorCode::Signature));
    }

    #[tokio::test]
    async fn evaluator_exhaustion_is_an_error_verdict() {
        let (a, counters) = authorizer_with(POLICY, RuleEvaluator::new().with_fact_limit(3));
        let r = a.authorize(&request(1)).await;
        assert_eq!(r.verdict, Verdict::Error);
        assert_eq!(r.error, Some(ErrorCode::Memory));
        assert!(counters.balanced());
    }

    #[tokio::test]
    async fn resource_shortfall_denies_with_diagnostics() {
        let (a, _) = authorizer();
        // filter 1 and 2: (1 + 10) + (1 + 20)
        let a = a.with_resource_control(ledger(31).await, false);
        let r = a.authorize(&request(2)).await;
        assert_eq!(r.verdict, Verdict::NonCompliant);
        assert_eq!(r.error, Some(ErrorCode::ResourceCtrlFail));
        assert_eq!(r.required, vec![ResourceRequirement { key: 7, required: 32 }]);
        let s = r.shortfall.unwrap();
        assert_eq!((s.index, s.key, s.required, s.available), (0, 7, 32, 31));
    }

    #[tokio::test]
    async fn allocation_on_grant_consumes_resources() {
        let (a, _) = authorizer();
        let a = a.with_resource_control(ledger(40).await, true);

        assert!(a.authorize(&request(2)).await.is_compliant());
        assert_eq!(available(&a).await, 8);

        let r = a.authorize(&request(2)).await;
        assert_eq!(r.error, Some(ErrorCode::ResourceCtrlFail));
        assert_eq!(available(&a).await, 8);
    }

    #[tokio::test]
    async fn broken_formula_is_a_resource_control_error() {
        let (a, counters) = authorizer();
        let l = ledger(100).await;
        l.add_consumption(
            0x0001_0001,
            &ResourceConsumption { resource: 7, fixed_cost: 0, formula: "%d / 0".into() },
        )
        .await
        .unwrap();
        let a = a.with_resource_control(l, false);
        let r = a.authorize(&request(1)).await;
        assert_eq!(r.verdict, Verdict::NonCompliant);
        assert_eq!(r.error, Some(ErrorCode::ResourceCtrlError));
        assert!(counters.balanced());
    }

    #[tokio::test]
    async fn every_reached_decision_ends_in_done() {
        let (a, _) = authorizer();
        let (r, stage) = a.authorize_with_stage(&request(2)).await;
        assert!(r.is_compliant());
        assert_eq!(stage, Stage::Done);

        // policy says no: still a completed decision
        let (r, stage) = a.authorize_with_stage(&request(3)).await;
        assert_eq!((r.verdict, r.error), (Verdict::NonCompliant, None));
        assert_eq!(stage, Stage::Done);

        let mut forged = request(1);
        forged.encrypted_nonce = vec![0; 4];
        assert_eq!(a.authorize_with_stage(&forged).await.1, Stage::Authenticate);

        let a = a.with_resource_control(ledger(5).await, false);
        let (r, stage) = a.authorize_with_stage(&request(1)).await;
        assert_eq!(r.error, Some(ErrorCode::ResourceCtrlFail));
        assert_eq!(stage, Stage::CheckResources);
    }

    #[tokio::test]
    async fn pairs_cannot_shadow_derived_facts() {
        let (a, counters) = authorizer();

        // would lift the filter.num <= 2 limit if it overrode the catalog fact
        let mut req = request(3);
        req.add_pair("filter.num", "1").unwrap();
        let r = a.authorize(&req).await;
        assert_eq!(r.error, Some(ErrorCode::Pair));

        let mut req = request(1);
        req.add_pair("TIMESTAMP", "0").unwrap();
        assert_eq!(a.authorize(&req).await.error, Some(ErrorCode::Pair));
        assert!(counters.balanced());
    }
}
