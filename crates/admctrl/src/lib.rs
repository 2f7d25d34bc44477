//! Top-level facade crate for admctrl.
//!
//! Re-exports the core primitives and the daemon library so clients and
//! tooling can depend on a single crate.

pub mod core {
    pub use admctrl_core::*;
}

pub mod daemon {
    pub use admctrl_daemon::*;
}
