//! admctrl core: transport-agnostic request primitives, error types, the
//! function catalog and the cost expression evaluator.
//!
//! This crate defines the wire-level contracts and error surface shared by the
//! daemon, its administration tool and request-building clients. It carries no async
//! runtime dependency so it can be linked into any of them.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Everything in a request is attacker controlled; all fallible paths must
//! surface as `AdmCtrlError`/`Result`.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod catalog;
pub mod cost;
pub mod error;
pub mod limits;
pub mod protocol;

/// Shared result type.
pub use error::{AdmCtrlError, DecodeError, ErrorCode, Result};
