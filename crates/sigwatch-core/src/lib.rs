//! # sigwatch-core
//!
//! Shared foundation for the sigwatch workspace: the TOML configuration
//! layer and the error taxonomy every other crate builds on.

pub mod config;
pub mod error;

pub use config::SigwatchConfig;
pub use error::{Result, SigwatchError};
