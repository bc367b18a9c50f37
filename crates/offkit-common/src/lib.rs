//! # OffKit Common
//!
//! Shared utilities for the OffKit offline cache engine.
//!
//! Currently this is the logging configuration used by binaries and
//! tests; the engine crates only emit `tracing` events and never
//! install a subscriber themselves.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};
