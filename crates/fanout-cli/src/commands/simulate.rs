// Simulated workload: identical sleeping tasks, sequential vs concurrent

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use fanout_core::{from_fn, Concurrency, WorkItem};

use crate::output::{print_heading, OutputFormat, Summary};
use crate::runner::run_mode;

fn tasks(count: usize, delay: Duration) -> Vec<WorkItem> {
    (0..count)
        .map(|i| WorkItem::new(format!("task-{i}")).with_delay(delay))
        .collect()
}

pub async fn run(
    output: OutputFormat,
    quiet: bool,
    count: usize,
    delay_ms: u64,
    concurrency: Concurrency,
) -> Result<()> {
    let delay = Duration::from_millis(delay_ms);
    let executor = Arc::new(from_fn(|item: WorkItem| async move {
        Ok::<_, Infallible>(format!("Task {} done", item.position()))
    }));
    let verbose = output.is_text() && !quiet;

    let mut runs = Vec::new();
    for (mode, policy) in [
        ("sequential", Concurrency::sequential()),
        ("concurrent", concurrency),
    ] {
        if output.is_text() {
            print_heading(&format!("Running {count} tasks ({mode}, concurrency {policy}):"));
        }
        let report = run_mode(mode, policy, tasks(count, delay), executor.clone(), |outcome| {
            if verbose {
                if let Some(message) = outcome.payload() {
                    println!("  {message}");
                }
            }
        })
        .await?;
        if output.is_text() {
            println!("⏱️  {mode} time: {:.2}s", report.elapsed.as_secs_f64());
        }
        runs.push(report);
    }

    let summary = Summary::new(runs);
    if output.is_text() {
        summary.print_text();
    } else {
        output.print_value(&summary)?;
    }
    Ok(())
}
