//! Shared daemon state: configuration plus the authorizer behind an async mutex.
//!
//! Nothing under the mutex blocks the runtime: the ledger is an async SQLite
//! pool.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use admctrl_core::error::{AdmCtrlError, Result};
use admctrl_core::protocol::{decode_request, AuthResult};

use crate::config::DaemonConfig;
use crate::crypto::RsaCrypto;
use crate::engine::Authorizer;
use crate::ledger::{ResourceLedger, SqliteStore};
use crate::policy::{split_assertions, EvaluatorSession, RuleEvaluator, SessionGuard, TrustEvaluator};

pub type DaemonAuthorizer = Authorizer<RuleEvaluator, RsaCrypto, SqliteStore>;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: DaemonConfig,
    authorizer: Mutex<DaemonAuthorizer>,
}

impl AppState {
    /// Build state from `cfg`, reading the policy from `daemon.policy_file`.
    pub async fn new(cfg: DaemonConfig) -> Result<Self> {
        let path = &cfg.daemon.policy_file;
        let policy = tokio::fs::read_to_string(path).await.map_err(|e| {
            AdmCtrlError::Policy(format!("read policy {} failed: {e}", path.display()))
        })?;
        Self::with_policy(cfg, &policy).await
    }

    /// Build state with the policy given inline. The policy is checked up
    /// front so a broken file fails startup instead of every request.
    pub async fn with_policy(cfg: DaemonConfig, policy: &str) -> Result<Self> {
        let evaluator = RuleEvaluator::new();
        check_policy(&evaluator, policy)?;

        let mut authorizer = Authorizer::new(policy, evaluator, RsaCrypto);
        if cfg.resource_control.enabled {
            let store = SqliteStore::open(&cfg.resource_control.store).await?;
            authorizer = authorizer.with_resource_control(
                ResourceLedger::new(store),
                cfg.resource_control.allocate_on_grant,
            );
            tracing::info!(
                store = %cfg.resource_control.store.display(),
                allocate_on_grant = cfg.resource_control.allocate_on_grant,
                "resource control enabled"
            );
        }
        tracing::info!(assertions = authorizer.policy_assertions(), "policy loaded");

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                authorizer: Mutex::new(authorizer),
            }),
        })
    }

    pub fn cfg(&self) -> &DaemonConfig {
        &self.inner.cfg
    }

    /// Decode one raw request and decide it. Requests run one at a time.
    pub async fn handle_request(&self, raw: Bytes) -> AuthResult {
        let req = match decode_request(raw) {
            Ok(req) => req,
            Err(e) => {
                tracing::warn!(code = e.code().as_str(), error = %e, "undecodable request");
                return AuthResult::from_error(&e);
            }
        };
        self.inner.authorizer.lock().await.authorize(&req).await
    }
}

fn check_policy(evaluator: &RuleEvaluator, policy: &str) -> Result<()> {
    let assertions = split_assertions(policy);
    if assertions.is_empty() {
        return Err(AdmCtrlError::Policy("policy holds no assertions".into()));
    }
    let session = evaluator
        .open_session()
        .map_err(|e| e.into_admctrl(AdmCtrlError::Internal))?;
    let mut session = SessionGuard::new(session);
    for (i, a) in assertions.iter().enumerate() {
        session
            .add_policy_assertion(a)
            .map_err(|e| e.into_admctrl(|msg| AdmCtrlError::Policy(format!("assertion {i}: {msg}"))))?;
    }
    Ok(())
}
