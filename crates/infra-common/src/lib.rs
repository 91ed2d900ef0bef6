//! # rphone infra-common
//!
//! Shared plumbing for the rphone crates:
//!
//! - `logging`: tracing subscriber setup used by the composition root
//! - `errors`: the common error type and context helpers
//! - `config`: TOML configuration loading and duration (de)serialization helpers

pub mod config;
pub mod errors;
pub mod logging;

pub use errors::types::{Error, Result};
pub use logging::setup::{setup_logging, LogFormat, LoggingConfig};
