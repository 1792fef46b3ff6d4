//! Shared test helpers: an instrumented executor

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fanout_core::{async_trait, Executor, Outcome, Stopwatch, WorkItem};

/// Lifecycle events recorded by [`ProbeExecutor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start(usize),
    End(usize),
}

/// Executor that sleeps for each item's delay and records concurrency
///
/// `active` is decremented by a drop guard, so aborted calls are released too.
#[derive(Default)]
pub struct ProbeExecutor {
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
    events: Mutex<Vec<Event>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
}

impl ProbeExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Items whose id is in `ids` fail with "simulated failure"
    pub fn failing(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    /// Items whose id is in `ids` panic mid-flight
    pub fn panicking(ids: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            panicking: ids.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

struct ActiveGuard<'a> {
    probe: &'a ProbeExecutor,
    position: usize,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.probe.active.fetch_sub(1, Ordering::SeqCst);
        self.probe
            .events
            .lock()
            .unwrap()
            .push(Event::End(self.position));
    }
}

#[async_trait]
impl Executor for ProbeExecutor {
    type Payload = usize;

    async fn execute(&self, item: WorkItem) -> Outcome<usize> {
        let watch = Stopwatch::start();
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.events
            .lock()
            .unwrap()
            .push(Event::Start(item.position()));
        let _guard = ActiveGuard {
            probe: self,
            position: item.position(),
        };

        item.apply_delay().await;

        if self.panicking.contains(item.id()) {
            panic!("probe exploded on {}", item.id());
        }
        if self.failing.contains(item.id()) {
            return Outcome::failure(&item, "simulated failure", watch.finish());
        }
        Outcome::success(&item, item.position(), watch.finish())
    }
}

/// Items named `item-{i}` with the given delays in milliseconds
pub fn items_with_delays(delays_ms: &[u64]) -> Vec<WorkItem> {
    delays_ms
        .iter()
        .enumerate()
        .map(|(i, ms)| WorkItem::new(format!("item-{i}")).with_delay(Duration::from_millis(*ms)))
        .collect()
}
