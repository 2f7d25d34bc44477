//! `authd.yaml` loading.
//!
//! Unknown keys are rejected at every level and the parsed tree goes through
//! [`DaemonConfig::validate`] before anyone sees it. Errors name where the
//! text came from.

pub mod schema;

use std::path::Path;

use admctrl_core::error::{AdmCtrlError, Result};

pub use schema::{DaemonConfig, DaemonSection, ResourceControlSection};

/// Configuration read by `authd` when started without an argument.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/authd/authd.yaml";

pub fn load_from_file(path: impl AsRef<Path>) -> Result<DaemonConfig> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .map_err(|e| AdmCtrlError::Internal(format!("{}: {e}", path.display())))?;
    parse(&text, &path.display().to_string())
}

pub fn load_from_str(text: &str) -> Result<DaemonConfig> {
    parse(text, "inline config")
}

fn parse(text: &str, origin: &str) -> Result<DaemonConfig> {
    let cfg: DaemonConfig = serde_yaml::from_str(text)
        .map_err(|e| AdmCtrlError::BadRequest(format!("{origin}: {e}")))?;
    cfg.validate().map_err(|e| match e {
        AdmCtrlError::BadRequest(msg) => AdmCtrlError::BadRequest(format!("{origin}: {msg}")),
        other => other,
    })?;
    tracing::debug!(
        origin,
        socket = %cfg.daemon.socket.display(),
        resource_control = cfg.resource_control.enabled,
        "configuration loaded"
    );
    Ok(cfg)
}
