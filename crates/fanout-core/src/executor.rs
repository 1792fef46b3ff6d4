//! Work executors
//!
//! An [`Executor`] turns a [`WorkItem`] into an [`Outcome`]. Executors never
//! fail: operation errors must be reported as [`Outcome::Failure`]. The
//! streamer shares one executor across all concurrently dispatched operations
//! behind an `Arc`, so implementations take `&self`.

use std::fmt::Display;
use std::future::Future;

use async_trait::async_trait;

use crate::item::WorkItem;
use crate::outcome::{Outcome, Stopwatch};

/// Executes one work item
///
/// # Example
///
/// ```ignore
/// struct Echo;
///
/// #[async_trait]
/// impl Executor for Echo {
///     type Payload = String;
///
///     async fn execute(&self, item: WorkItem) -> Outcome<String> {
///         let watch = Stopwatch::start();
///         item.apply_delay().await;
///         Outcome::success(&item, item.id().to_uppercase(), watch.finish())
///     }
/// }
/// ```
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Value carried by successful outcomes
    type Payload: Send + 'static;

    /// Run the operation for `item`, capturing any failure in the outcome
    async fn execute(&self, item: WorkItem) -> Outcome<Self::Payload>;
}

/// Executor built from an async closure
///
/// The closure returns `Result<P, E>`; the adapter applies the item's synthetic
/// delay, times the call and stringifies `Err` into a failure outcome.
pub struct FnExecutor<F> {
    f: F,
}

impl<F> FnExecutor<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> std::fmt::Debug for FnExecutor<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnExecutor").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut, P, E> Executor for FnExecutor<F>
where
    F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P, E>> + Send + 'static,
    P: Send + 'static,
    E: Display + Send + 'static,
{
    type Payload = P;

    async fn execute(&self, item: WorkItem) -> Outcome<P> {
        let watch = Stopwatch::start();
        item.apply_delay().await;

        match (self.f)(item.clone()).await {
            Ok(payload) => Outcome::success(&item, payload, watch.finish()),
            Err(e) => Outcome::failure(&item, e.to_string(), watch.finish()),
        }
    }
}

/// Shorthand for [`FnExecutor::new`]
pub fn from_fn<F, Fut, P, E>(f: F) -> FnExecutor<F>
where
    F: Fn(WorkItem) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P, E>> + Send + 'static,
{
    FnExecutor::new(f)
}
