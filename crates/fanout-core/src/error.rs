//! Error types
//!
//! Per-item failures are never errors here: they travel as
//! [`Outcome::Failure`](crate::Outcome::Failure) values. Only configuration
//! misuse and pulling from a cancelled stream surface as `Err`.

use std::fmt;

/// Invalid run configuration, reported before anything is launched
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Bounded mode with a limit of zero
    #[error("concurrency limit must be at least 1")]
    ZeroConcurrency,

    /// Batch mode with a batch size of zero
    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    /// Deadline of zero length
    #[error("deadline must be greater than zero")]
    ZeroDeadline,

    /// Unparseable concurrency setting
    #[error("invalid concurrency setting: {0:?} (expected `unbounded`, `N` or `batch:N`)")]
    InvalidConcurrency(String),

    /// Unparseable environment variable
    #[error("invalid value for {var}: {value:?}")]
    Env { var: &'static str, value: String },
}

/// Why a stream stopped before producing every outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The cancellation token was triggered
    Token,
    /// The run deadline elapsed
    Deadline,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Token => write!(f, "cancelled"),
            Self::Deadline => write!(f, "deadline elapsed"),
        }
    }
}

/// Errors returned by [`CompletionStream::next_outcome`](crate::CompletionStream::next_outcome)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// Pulled from a stream that had already been cancelled
    #[error("stream already stopped: {0}")]
    Cancelled(CancelReason),
}
