//! Transport layer (Unix stream socket).
//!
//! Frames are decoded once here before they reach the authorizer.

pub mod codec;
pub mod unix;

pub use unix::serve;
