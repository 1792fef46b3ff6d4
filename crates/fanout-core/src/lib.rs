//! # Fanout Core
//!
//! Bounded-concurrency result streaming: run N independent asynchronous
//! operations, cap how many are in flight at once, and receive their results
//! in the order they finish.
//!
//! ## Features
//!
//! - **Completion order**: whichever operation settles first is yielded first
//! - **Credit-based admission**: a sliding window refills one slot per completion
//! - **Batch admission**: fixed groups, each fully drained before the next starts
//! - **Failures as data**: executor errors (and panics) become [`Outcome::Failure`]
//! - **Cancellation**: drop the stream, trigger its token, or set a deadline
//!
//! ## Example
//!
//! ```ignore
//! use fanout_core::prelude::*;
//! use futures::StreamExt;
//!
//! let executor = Arc::new(from_fn(|item: WorkItem| async move {
//!     Ok::<_, String>(item.id().len())
//! }));
//!
//! let config = RunConfig::new(urls.into_iter().map(WorkItem::new)).with_limit(4);
//! let mut outcomes = stream(config, executor)?;
//!
//! while let Some(outcome) = outcomes.next().await {
//!     println!("{} -> {:?}", outcome.id(), outcome.payload());
//! }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod item;
pub mod outcome;
pub mod stream;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::{Concurrency, RunConfig};
    pub use crate::error::{CancelReason, ConfigError, StreamError};
    pub use crate::executor::{from_fn, Executor, FnExecutor};
    pub use crate::item::WorkItem;
    pub use crate::outcome::{Metrics, Outcome, Stopwatch};
    pub use crate::stream::{collect_outcomes, stream, CompletionStream, StreamStats};
    pub use std::sync::Arc;
}

// Re-export key types at crate root
pub use config::{Concurrency, RunConfig};
pub use error::{CancelReason, ConfigError, StreamError};
pub use executor::{from_fn, Executor, FnExecutor};
pub use item::WorkItem;
pub use outcome::{Metrics, Outcome, Stopwatch};
pub use stream::{collect_outcomes, stream, CompletionStream, StreamStats};

// Executors implement the trait with the same macro.
pub use async_trait::async_trait;
