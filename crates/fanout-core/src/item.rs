//! Work items submitted to a completion stream

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::option_duration_millis;

/// One unit of independent asynchronous work.
///
/// A work item is an opaque identifier (an index, a URL, a job name) plus an
/// optional synthetic delay that executors apply before doing the real work.
/// Items are immutable once created; the submission position is assigned by
/// [`RunConfig`](crate::RunConfig) so callers can reconstruct input order from
/// completion-ordered outcomes.
///
/// # Example
///
/// ```
/// use fanout_core::WorkItem;
/// use std::time::Duration;
///
/// let item = WorkItem::new("https://example.com/").with_delay(Duration::from_millis(100));
/// assert_eq!(item.id(), "https://example.com/");
/// assert_eq!(item.delay(), Some(Duration::from_millis(100)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    #[serde(default)]
    position: usize,
    id: String,
    #[serde(default, with = "option_duration_millis")]
    delay: Option<Duration>,
}

impl WorkItem {
    /// Create a work item with no delay
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            position: 0,
            id: id.into(),
            delay: None,
        }
    }

    /// Set the synthetic delay applied before execution
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = if delay.is_zero() { None } else { Some(delay) };
        self
    }

    pub(crate) fn at_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Identifier given at creation
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Zero-based position in the submitted sequence
    pub fn position(&self) -> usize {
        self.position
    }

    /// Synthetic delay, if any
    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    /// Sleep for the item's synthetic delay (no-op when there is none)
    pub async fn apply_delay(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

impl From<&str> for WorkItem {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for WorkItem {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{} {}", self.position, self.id)
    }
}
