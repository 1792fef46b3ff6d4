//! Outcomes of executed work items

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::duration_millis;
use crate::item::WorkItem;

/// Timing recorded for one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Wall-clock time the execution started
    pub started_at: DateTime<Utc>,

    /// Time from start to settle, including any synthetic delay
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

/// Measures one execution
///
/// Elapsed time uses the tokio clock so paused-time tests see exact durations.
#[derive(Debug, Clone, Copy)]
pub struct Stopwatch {
    started_at: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl Stopwatch {
    /// Start measuring now
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            start: tokio::time::Instant::now(),
        }
    }

    /// Stop measuring
    pub fn finish(&self) -> Metrics {
        Metrics {
            started_at: self.started_at,
            elapsed: self.start.elapsed(),
        }
    }
}

/// Result of executing one [`WorkItem`]
///
/// Exactly one outcome is produced per submitted item. A failure is a normal
/// terminal result, not an error of the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<P> {
    /// The operation produced a payload
    Success {
        id: String,
        position: usize,
        payload: P,
        metrics: Metrics,
    },
    /// The operation failed; `error` is its description
    Failure {
        id: String,
        position: usize,
        error: String,
        metrics: Metrics,
    },
}

impl<P> Outcome<P> {
    /// Successful outcome for `item`
    pub fn success(item: &WorkItem, payload: P, metrics: Metrics) -> Self {
        Self::Success {
            id: item.id().to_string(),
            position: item.position(),
            payload,
            metrics,
        }
    }

    /// Failed outcome for `item`
    pub fn failure(item: &WorkItem, error: impl Into<String>, metrics: Metrics) -> Self {
        Self::Failure {
            id: item.id().to_string(),
            position: item.position(),
            error: error.into(),
            metrics,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Success { id, .. } | Self::Failure { id, .. } => id,
        }
    }

    pub fn position(&self) -> usize {
        match self {
            Self::Success { position, .. } | Self::Failure { position, .. } => *position,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        match self {
            Self::Success { metrics, .. } | Self::Failure { metrics, .. } => metrics,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn payload(&self) -> Option<&P> {
        match self {
            Self::Success { payload, .. } => Some(payload),
            Self::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(error),
        }
    }

    /// Convert into a `Result`, dropping identity and metrics
    pub fn into_result(self) -> Result<P, String> {
        match self {
            Self::Success { payload, .. } => Ok(payload),
            Self::Failure { error, .. } => Err(error),
        }
    }
}
