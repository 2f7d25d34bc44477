//! admctrl daemon library entry.
//!
//! Wires the nonce challenge, the trust evaluator, the resource ledger and the
//! socket transport into the `authd` daemon. Consumed by the binaries
//! (`authd`, `authdb`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod assertions;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod ledger;
pub mod policy;
pub mod transport;
