//! Bounded completion streaming
//!
//! [`stream`] launches work items as tokio tasks, bounded by the run's
//! [`Concurrency`] policy, and yields their outcomes in completion order.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────── driver task ─────────────────────────────┐
//! │                                                                        │
//! │  pending ──credit──▶ JoinSet (in flight) ──settled──▶ outcome channel ─┼──▶ consumer
//! │  [item 4]            [task 1] [task 2] [task 3]                        │
//! │  [item 5]                 ▲                │                           │
//! │                           └──── refill ◀───┘                           │
//! └────────────────────────────────────────────────────────────────────────┘
//!   cancel token / deadline / drop ──▶ abort driver and in-flight tasks
//! ```
//!
//! Nothing runs until the first pull. From then on the driver task refills
//! the window as soon as an item settles, whether or not the consumer has
//! pulled it yet. Dropping the stream aborts the driver, and with it every
//! in-flight task.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::{FutureExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Sleep};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, error, info, trace, warn, Instrument};

use crate::config::{Concurrency, RunConfig};
use crate::error::{CancelReason, ConfigError, StreamError};
use crate::executor::Executor;
use crate::item::WorkItem;
use crate::outcome::{Outcome, Stopwatch};

/// Start a bounded completion stream over `config.items`
///
/// Fails fast on an invalid configuration, before anything is launched. The
/// returned stream is lazy: work begins on the first poll.
pub fn stream<E: Executor>(
    config: RunConfig,
    executor: Arc<E>,
) -> Result<CompletionStream<E>, ConfigError> {
    config.validate()?;
    Ok(CompletionStream::new(config, executor))
}

/// Run `config` to completion and collect every outcome in completion order
pub async fn collect_outcomes<E: Executor>(
    config: RunConfig,
    executor: Arc<E>,
) -> Result<Vec<Outcome<E::Payload>>, ConfigError> {
    Ok(stream(config, executor)?.collect().await)
}

/// Counters describing a stream's progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Items submitted
    pub total: usize,
    /// Items handed to the runtime
    pub launched: usize,
    /// Items whose execution settled, pulled or not
    pub completed: usize,
    /// Items yielded to the consumer
    pub yielded: usize,
    /// Items currently running
    pub in_flight: usize,
    /// Highest number of items running at once
    pub peak_in_flight: usize,
    /// Items never launched because the stream was cancelled
    pub revoked: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Not polled yet
    Idle,
    Running,
    Finished,
    Cancelled(CancelReason),
}

/// Lazy stream of [`Outcome`]s in completion order
///
/// Implements [`futures::Stream`]; once cancelled the stream simply ends. Use
/// [`next_outcome`](Self::next_outcome) to distinguish "exhausted" from
/// "pulled after cancellation".
pub struct CompletionStream<E: Executor> {
    executor: Arc<E>,
    concurrency: Concurrency,
    pending: VecDeque<WorkItem>,
    deadline: Option<Duration>,
    deadline_timer: Option<Pin<Box<Sleep>>>,
    cancel: CancellationToken,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    outcomes: Option<mpsc::UnboundedReceiver<Outcome<E::Payload>>>,
    driver: Option<JoinHandle<()>>,
    state: State,
    stats: Arc<Mutex<StreamStats>>,
}

impl<E: Executor> CompletionStream<E> {
    fn new(config: RunConfig, executor: Arc<E>) -> Self {
        let cancel = CancellationToken::new();
        let cancelled = Box::pin(cancel.clone().cancelled_owned());

        Self {
            executor,
            concurrency: config.concurrency,
            stats: Arc::new(Mutex::new(StreamStats {
                total: config.items.len(),
                ..Default::default()
            })),
            pending: config.items.into(),
            deadline: config.deadline,
            deadline_timer: None,
            cancel,
            cancelled,
            outcomes: None,
            driver: None,
            state: State::Idle,
        }
    }

    /// Tie this stream to an external token
    ///
    /// The stream stops when `parent` is cancelled. Dropping or finishing the
    /// stream never cancels `parent` itself.
    pub fn with_cancellation(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self.cancelled = Box::pin(self.cancel.clone().cancelled_owned());
        self
    }

    /// Token that stops this stream when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation
    ///
    /// Running work stops right away; the next pull reports the cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Progress counters
    pub fn stats(&self) -> StreamStats {
        *self.stats.lock()
    }

    /// Admission policy in effect
    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Whether the stream stopped through cancellation or deadline
    pub fn is_cancelled(&self) -> bool {
        matches!(self.state, State::Cancelled(_))
    }

    /// Pull the next outcome
    ///
    /// Returns `Ok(None)` once every outcome has been yielded, or when the
    /// cancellation or deadline fires while this pull is waiting. Pulling a
    /// stream that was already cancelled, or whose deadline already passed,
    /// returns [`StreamError::Cancelled`].
    pub async fn next_outcome(&mut self) -> Result<Option<Outcome<E::Payload>>, StreamError> {
        if matches!(self.state, State::Idle | State::Running) {
            if let Some(reason) = self.stop_requested() {
                self.shutdown(reason);
            }
        }
        if let State::Cancelled(reason) = self.state {
            return Err(StreamError::Cancelled(reason));
        }
        Ok(self.next().await)
    }

    fn start(&mut self) {
        debug!(
            total = self.stats.lock().total,
            concurrency = %self.concurrency,
            deadline_ms = self.deadline.map(millis),
            "Starting completion stream"
        );

        let deadline = self.deadline.map(|d| Instant::now() + d);
        self.deadline_timer = deadline.map(|at| Box::pin(tokio::time::sleep_until(at)));

        let (tx, rx) = mpsc::unbounded_channel();
        let driver = Driver {
            executor: Arc::clone(&self.executor),
            concurrency: self.concurrency,
            pending: std::mem::take(&mut self.pending),
            in_flight: JoinSet::new(),
            outcomes: tx,
            cancel: self.cancel.clone(),
            deadline,
            stats: Arc::clone(&self.stats),
        };
        self.driver = Some(tokio::spawn(driver.run().in_current_span()));
        self.outcomes = Some(rx);
        self.state = State::Running;
    }

    /// Cancellation or deadline that has already happened
    fn stop_requested(&self) -> Option<CancelReason> {
        if self.cancel.is_cancelled() {
            return Some(CancelReason::Token);
        }
        match self.deadline_timer.as_ref() {
            Some(timer) if Instant::now() >= timer.deadline() => Some(CancelReason::Deadline),
            _ => None,
        }
    }

    fn poll_stop(&mut self, cx: &mut Context<'_>) -> Option<CancelReason> {
        if self.cancelled.as_mut().poll(cx).is_ready() {
            return Some(CancelReason::Token);
        }
        match self.deadline_timer.as_mut() {
            Some(timer) => timer
                .as_mut()
                .poll(cx)
                .is_ready()
                .then_some(CancelReason::Deadline),
            None => None,
        }
    }

    /// Revoke pending items and abort in-flight ones
    fn shutdown(&mut self, reason: CancelReason) {
        let (aborted, revoked) = {
            let mut stats = self.stats.lock();
            // Under the lock so the driver cannot launch past this point.
            self.cancel.cancel();
            let aborted = stats.in_flight;
            let revoked = stats.total - stats.launched;
            stats.revoked = revoked;
            stats.in_flight = 0;
            (aborted, revoked)
        };

        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
        self.pending.clear();
        self.outcomes = None;
        self.deadline_timer = None;
        self.state = State::Cancelled(reason);

        info!(
            %reason,
            yielded = self.stats.lock().yielded,
            aborted,
            revoked,
            "Completion stream stopped early"
        );
    }
}

impl<E: Executor> Stream for CompletionStream<E> {
    type Item = Outcome<E::Payload>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match this.state {
            State::Finished | State::Cancelled(_) => return Poll::Ready(None),
            State::Idle if this.cancel.is_cancelled() => {
                this.shutdown(CancelReason::Token);
                return Poll::Ready(None);
            }
            State::Idle => this.start(),
            State::Running => {}
        }

        // Polled after `start` so the deadline timer registers this waker.
        if let Some(reason) = this.poll_stop(cx) {
            this.shutdown(reason);
            return Poll::Ready(None);
        }

        let polled = match this.outcomes.as_mut() {
            Some(outcomes) => outcomes.poll_recv(cx),
            None => Poll::Ready(None),
        };
        match polled {
            Poll::Ready(Some(outcome)) => {
                this.stats.lock().yielded += 1;
                trace!(
                    id = %outcome.id(),
                    success = outcome.is_success(),
                    "Work item yielded"
                );
                Poll::Ready(Some(outcome))
            }
            Poll::Ready(None) => {
                // The driver also stops on cancellation or deadline.
                if let Some(reason) = this.stop_requested() {
                    this.shutdown(reason);
                    return Poll::Ready(None);
                }
                debug!(
                    yielded = this.stats.lock().yielded,
                    "Completion stream exhausted"
                );
                this.state = State::Finished;
                this.outcomes = None;
                this.driver = None;
                this.deadline_timer = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.state {
            State::Finished | State::Cancelled(_) => (0, Some(0)),
            _ => {
                let stats = self.stats.lock();
                (0, Some(stats.total - stats.yielded))
            }
        }
    }
}

impl<E: Executor> futures::stream::FusedStream for CompletionStream<E> {
    fn is_terminated(&self) -> bool {
        matches!(self.state, State::Finished | State::Cancelled(_))
    }
}

impl<E: Executor> Drop for CompletionStream<E> {
    fn drop(&mut self) {
        if self.state == State::Running {
            let stats = self.stats.lock();
            if stats.yielded < stats.total {
                debug!(
                    in_flight = stats.in_flight,
                    unyielded = stats.total - stats.yielded,
                    "Completion stream abandoned, aborting in-flight work"
                );
            }
        }
        // Child tokens never propagate upwards, so a parent passed to
        // `with_cancellation` stays live.
        self.cancel.cancel();
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

impl<E: Executor> std::fmt::Debug for CompletionStream<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionStream")
            .field("concurrency", &self.concurrency)
            .field("state", &self.state)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Owns the in-flight set and keeps the admission window full
///
/// Settled outcomes go to the consumer through an unbounded channel, so a
/// slot frees up when its item completes, not when the consumer pulls it.
struct Driver<E: Executor> {
    executor: Arc<E>,
    concurrency: Concurrency,
    pending: VecDeque<WorkItem>,
    in_flight: JoinSet<Outcome<E::Payload>>,
    outcomes: mpsc::UnboundedSender<Outcome<E::Payload>>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    stats: Arc<Mutex<StreamStats>>,
}

impl<E: Executor> Driver<E> {
    async fn run(mut self) {
        let cancel = self.cancel.clone();
        let deadline = self.deadline;
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => futures::future::pending().await,
            }
        };
        tokio::pin!(expired);

        self.refill();
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = &mut expired => break,
                joined = self.in_flight.join_next() => joined,
            };

            match joined {
                Some(Ok(outcome)) => {
                    self.stats.lock().completed += 1;
                    self.refill();
                    if self.outcomes.send(outcome).is_err() {
                        // Receiver gone: the stream was shut down.
                        break;
                    }
                }
                Some(Err(e)) => {
                    // Panics are caught inside the task, so this is an abort from outside.
                    error!(error = %e, "Work item task did not complete");
                    self.refill();
                }
                None => break,
            }
        }
        // Dropping `self` aborts whatever is still in flight.
    }

    /// Launch as many pending items as the admission policy allows
    fn refill(&mut self) {
        let stats = Arc::clone(&self.stats);
        let mut stats = stats.lock();
        if self.cancel.is_cancelled() {
            return;
        }

        let credits = self.concurrency.available_credits(self.in_flight.len());
        for _ in 0..credits {
            let Some(item) = self.pending.pop_front() else {
                break;
            };
            self.launch(item);
            stats.launched += 1;
        }

        stats.in_flight = self.in_flight.len();
        stats.peak_in_flight = stats.peak_in_flight.max(stats.in_flight);
    }

    fn launch(&mut self, item: WorkItem) {
        trace!(id = %item.id(), position = item.position(), "Launching work item");

        let executor = Arc::clone(&self.executor);
        self.in_flight.spawn(async move {
            let watch = Stopwatch::start();
            let failed = item.clone();
            match AssertUnwindSafe(executor.execute(item)).catch_unwind().await {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(id = %failed.id(), %message, "Executor panicked");
                    Outcome::failure(
                        &failed,
                        format!("executor panicked: {message}"),
                        watch.finish(),
                    )
                }
            }
        });
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
