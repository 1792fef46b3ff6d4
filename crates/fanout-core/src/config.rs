//! Run configuration
//!
//! A [`RunConfig`] pairs the ordered work items with an admission policy
//! ([`Concurrency`]) and an optional deadline.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::item::WorkItem;

/// How many operations may be in flight, and how freed slots are refilled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", content = "limit", rename_all = "snake_case")]
pub enum Concurrency {
    /// Launch every item immediately
    #[default]
    Unbounded,
    /// Sliding window: at most `n` in flight, each completion admits the next item
    Limited(usize),
    /// Fixed-size groups of `n`; the next group starts only once the current one drains
    Batched(usize),
}

impl Concurrency {
    /// One operation at a time
    pub fn sequential() -> Self {
        Self::Limited(1)
    }

    /// Validate the policy
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Limited(0) => Err(ConfigError::ZeroConcurrency),
            Self::Batched(0) => Err(ConfigError::ZeroBatchSize),
            _ => Ok(()),
        }
    }

    /// Number of new operations that may be launched given the current in-flight count
    pub fn available_credits(&self, in_flight: usize) -> usize {
        match *self {
            Self::Unbounded => usize::MAX,
            Self::Limited(limit) => limit.saturating_sub(in_flight),
            Self::Batched(size) if in_flight == 0 => size,
            Self::Batched(_) => 0,
        }
    }

    /// Upper bound on simultaneously active operations, `None` when unbounded
    pub fn limit(&self) -> Option<usize> {
        match *self {
            Self::Unbounded => None,
            Self::Limited(n) | Self::Batched(n) => Some(n),
        }
    }
}

impl fmt::Display for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unbounded => write!(f, "unbounded"),
            Self::Limited(n) => write!(f, "{n}"),
            Self::Batched(n) => write!(f, "batch:{n}"),
        }
    }
}

/// Parses `unbounded`, `N` (sliding window) or `batch:N`
impl FromStr for Concurrency {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let parse = |n: &str| {
            n.trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidConcurrency(s.to_string()))
        };

        let concurrency = match s.to_ascii_lowercase().as_str() {
            "unbounded" | "all" => Self::Unbounded,
            "sequential" => Self::sequential(),
            lower => match lower.strip_prefix("batch:") {
                Some(size) => Self::Batched(parse(size)?),
                None => Self::Limited(parse(lower)?),
            },
        };
        concurrency.validate()?;
        Ok(concurrency)
    }
}

/// Configuration for a single streaming run
///
/// # Example
///
/// ```
/// use fanout_core::{Concurrency, RunConfig, WorkItem};
/// use std::time::Duration;
///
/// let config = RunConfig::new(["a", "b", "c"].map(WorkItem::from))
///     .with_limit(2)
///     .with_deadline(Duration::from_secs(30));
///
/// assert_eq!(config.concurrency, Concurrency::Limited(2));
/// assert_eq!(config.items[2].position(), 2);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Admission policy
    #[serde(default)]
    pub concurrency: Concurrency,

    /// Ordered work items (positions are assigned on construction)
    #[serde(default)]
    pub items: Vec<WorkItem>,

    /// Stop the run once this much time has passed since the first pull
    #[serde(default, with = "option_duration_millis")]
    pub deadline: Option<Duration>,
}

impl RunConfig {
    /// Create an unbounded run over `items`
    pub fn new(items: impl IntoIterator<Item = WorkItem>) -> Self {
        Self::default().with_items(items)
    }

    /// Create a configuration from environment variables, with no items
    ///
    /// - `FANOUT_CONCURRENCY`: `unbounded`, `sequential`, `N` or `batch:N`
    /// - `FANOUT_DEADLINE_MS`: optional run deadline in milliseconds
    pub fn from_env() -> Result<Self, ConfigError> {
        let concurrency = match std::env::var("FANOUT_CONCURRENCY") {
            Ok(value) => value.parse()?,
            Err(_) => Concurrency::default(),
        };

        let deadline = match std::env::var("FANOUT_DEADLINE_MS") {
            Ok(value) => {
                let millis = value.trim().parse::<u64>().map_err(|_| ConfigError::Env {
                    var: "FANOUT_DEADLINE_MS",
                    value: value.clone(),
                })?;
                Some(Duration::from_millis(millis))
            }
            Err(_) => None,
        };

        let config = Self {
            concurrency,
            items: Vec::new(),
            deadline,
        };
        config.validate()?;
        Ok(config)
    }

    /// Replace the items, assigning submission positions in order
    pub fn with_items(mut self, items: impl IntoIterator<Item = WorkItem>) -> Self {
        self.items = items
            .into_iter()
            .enumerate()
            .map(|(position, item)| item.at_position(position))
            .collect();
        self
    }

    /// Set the admission policy
    pub fn with_concurrency(mut self, concurrency: Concurrency) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Sliding window of at most `limit` operations
    pub fn with_limit(self, limit: usize) -> Self {
        self.with_concurrency(Concurrency::Limited(limit))
    }

    /// Fixed batches of `size` operations
    pub fn with_batch_size(self, size: usize) -> Self {
        self.with_concurrency(Concurrency::Batched(size))
    }

    /// Set the run deadline
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.concurrency.validate()?;
        if self.deadline.is_some_and(|d| d.is_zero()) {
            return Err(ConfigError::ZeroDeadline);
        }
        Ok(())
    }
}

/// Serde support for Option<Duration> as milliseconds
pub(crate) mod option_duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => d.as_millis().serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

/// Serde support for Duration as milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
