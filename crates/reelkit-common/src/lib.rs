//! # ReelKit Common
//!
//! Logging configuration shared by the ReelKit crates.
//!
//! Library crates emit `tracing` events and never install a subscriber;
//! binaries (the smoke harness, host shells) call [`init_logging`] once at
//! startup. Tests that want log output use [`try_init_logging`], which
//! tolerates losing the race to another test.

pub mod logging;

pub use logging::{init_logging, try_init_logging, LogConfig, LogFormat};
