//! Shared vocabulary of the catraca pipeline: swipe direction markers,
//! card numbers, format constants and the base error type. Everything
//! here is plain data; IO lives in the crates that depend on this one.

pub mod constants;
pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;

/// Crate version, surfaced in startup logs.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
