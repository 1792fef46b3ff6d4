// Runs one workload under one admission policy and reports how it went

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fanout_core::{stream, Concurrency, Executor, Outcome, RunConfig, WorkItem};
use futures::StreamExt;
use serde::Serialize;
use tracing::{info, instrument};

/// Result of running one mode
#[derive(Debug, Clone, Serialize)]
pub struct ModeReport {
    pub mode: String,
    pub concurrency: String,
    #[serde(serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    pub succeeded: usize,
    pub failed: usize,
    pub peak_in_flight: usize,
    /// Submission positions in the order they completed
    pub completion_order: Vec<usize>,
}

impl ModeReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Stream `items` through `executor` under `concurrency`
///
/// `on_outcome` sees every outcome as it is yielded.
#[instrument(skip(items, executor, on_outcome), fields(items = items.len()))]
pub async fn run_mode<E, F>(
    mode: &str,
    concurrency: Concurrency,
    items: Vec<WorkItem>,
    executor: Arc<E>,
    mut on_outcome: F,
) -> Result<ModeReport>
where
    E: Executor,
    F: FnMut(&Outcome<E::Payload>),
{
    let config = RunConfig::new(items).with_concurrency(concurrency);
    let start = tokio::time::Instant::now();

    let mut outcomes = stream(config, executor)
        .with_context(|| format!("invalid configuration for {mode} run"))?;

    let mut succeeded = 0;
    let mut failed = 0;
    let mut completion_order = Vec::new();

    while let Some(outcome) = outcomes.next().await {
        if outcome.is_success() {
            succeeded += 1;
        } else {
            failed += 1;
        }
        completion_order.push(outcome.position());
        on_outcome(&outcome);
    }

    let report = ModeReport {
        mode: mode.to_string(),
        concurrency: concurrency.to_string(),
        elapsed: start.elapsed(),
        succeeded,
        failed,
        peak_in_flight: outcomes.stats().peak_in_flight,
        completion_order,
    };

    info!(
        mode,
        elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
        succeeded,
        failed,
        "Run finished"
    );

    Ok(report)
}

/// Demo delay pattern: 0, 100, 200 ms repeating by position
pub fn demo_delay(position: usize) -> Duration {
    Duration::from_millis(100 * (position % 3) as u64)
}

/// Speedup of `candidate` relative to `baseline`
pub fn speedup(baseline: &ModeReport, candidate: &ModeReport) -> Option<f64> {
    let candidate_secs = candidate.elapsed.as_secs_f64();
    (candidate_secs > 0.0).then(|| baseline.elapsed.as_secs_f64() / candidate_secs)
}

fn serialize_secs<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}
