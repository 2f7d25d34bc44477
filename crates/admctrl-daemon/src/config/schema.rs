use std::path::PathBuf;

use admctrl_core::error::{AdmCtrlError, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    pub version: u32,

    #[serde(default)]
    pub daemon: DaemonSection,

    #[serde(default)]
    pub resource_control: ResourceControlSection,
}

impl DaemonConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(AdmCtrlError::BadRequest(format!(
                "unsupported config version {}",
                self.version
            )));
        }
        self.daemon.validate()?;
        self.resource_control.validate()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonSection {
    #[serde(default = "default_socket")]
    pub socket: PathBuf,

    #[serde(default = "default_policy_file")]
    pub policy_file: PathBuf,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Debug-level logging when `RUST_LOG` is unset.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for DaemonSection {
    fn default() -> Self {
        Self {
            socket: default_socket(),
            policy_file: default_policy_file(),
            read_timeout_ms: default_read_timeout_ms(),
            verbose: false,
        }
    }
}

impl DaemonSection {
    pub fn validate(&self) -> Result<()> {
        if !(100..=600_000).contains(&self.read_timeout_ms) {
            return Err(AdmCtrlError::BadRequest(
                "daemon.read_timeout_ms must be between 100 and 600000".into(),
            ));
        }
        if self.socket.as_os_str().is_empty() {
            return Err(AdmCtrlError::BadRequest("daemon.socket must not be empty".into()));
        }
        if self.policy_file.as_os_str().is_empty() {
            return Err(AdmCtrlError::BadRequest(
                "daemon.policy_file must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_socket() -> PathBuf {
    PathBuf::from("/tmp/.authd.sock")
}
fn default_policy_file() -> PathBuf {
    PathBuf::from("/etc/authd/policy")
}
fn default_read_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceControlSection {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_store")]
    pub store: PathBuf,

    #[serde(default)]
    pub allocate_on_grant: bool,
}

impl Default for ResourceControlSection {
    fn default() -> Self {
        Self {
            enabled: false,
            store: default_store(),
            allocate_on_grant: false,
        }
    }
}

impl ResourceControlSection {
    pub fn validate(&self) -> Result<()> {
        if self.allocate_on_grant && !self.enabled {
            return Err(AdmCtrlError::BadRequest(
                "resource_control.allocate_on_grant requires resource_control.enabled".into(),
            ));
        }
        if self.enabled && self.store.as_os_str().is_empty() {
            return Err(AdmCtrlError::BadRequest(
                "resource_control.store must not be empty".into(),
            ));
        }
        Ok(())
    }
}

fn default_store() -> PathBuf {
    PathBuf::from("/etc/authd/resourcectrl/resource.db")
}
