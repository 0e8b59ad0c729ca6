//! Error taxonomy for the whole workspace.
//!
//! Failures are contained at the smallest useful scope: a failing check
//! stays inside its check/deliver cycle, a failing reconciliation stays
//! inside its pass. Only `Storage` and `Check` errors reach the developer
//! escalation path.

use std::time::Duration;

pub type Result<T> = std::result::Result<T, SigwatchError>;

#[derive(Debug, thiserror::Error)]
pub enum SigwatchError {
    #[error("Config error: {0}")]
    Config(String),

    /// Persistence layer failure (definitions read, subscriber resolution).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Driver construction or check failure, before it is tied to a
    /// scheduled listener identity.
    #[error("Listener error: {0}")]
    Listener(String),

    /// A scheduled listener's `check()` raised. Carries the listener
    /// identity and, for force-triggered runs, the chat that asked.
    #[error("Listener '{name}' [{id}] check failed: {source}")]
    Check {
        id: i64,
        name: String,
        caller: Option<i64>,
        #[source]
        source: Box<SigwatchError>,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SigwatchError {
    /// Wrap a check failure with the listener identity it belongs to.
    pub fn check_failed(id: i64, name: &str, caller: Option<i64>, source: SigwatchError) -> Self {
        Self::Check {
            id,
            name: name.to_string(),
            caller,
            source: Box::new(source),
        }
    }
}
