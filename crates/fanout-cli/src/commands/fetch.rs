// HTTP workload: sequential, concurrent and batched GETs

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fanout_core::{Concurrency, Outcome, WorkItem};
use fanout_http::{HttpExecutor, HttpExecutorConfig, HttpResponse};

use crate::output::{print_heading, status_marker, OutputFormat, Summary};
use crate::runner::{demo_delay, run_mode};

/// Used when no URLs are given on the command line
pub const DEFAULT_URLS: &[&str] = &[
    "https://httpbin.org/delay/0",
    "https://httpbin.org/status/200",
    "https://httpbin.org/json",
    "https://httpbin.org/uuid",
    "https://httpbin.org/base64/SFRUUEJJTiBpcyBhd2Vzb21l",
    "https://httpbin.org/status/201",
    "https://httpbin.org/headers",
    "https://httpbin.org/ip",
];

/// Fixed delay applied to every request in batch mode
const BATCH_DELAY: Duration = Duration::from_millis(50);

/// Items carrying the staggered demo delays
fn staggered(urls: &[String]) -> Vec<WorkItem> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| WorkItem::new(url.clone()).with_delay(demo_delay(i)))
        .collect()
}

fn uniform(urls: &[String], delay: Duration) -> Vec<WorkItem> {
    urls.iter()
        .map(|url| WorkItem::new(url.clone()).with_delay(delay))
        .collect()
}

fn result_line(outcome: &Outcome<HttpResponse>) -> String {
    match outcome {
        Outcome::Success { payload, .. } => format!(
            "  {} {} -> {} ({} bytes)",
            status_marker(true),
            payload.url,
            payload.status,
            payload.length
        ),
        Outcome::Failure { id, error, .. } => {
            format!("  {} {} -> {}", status_marker(false), id, error)
        }
    }
}

pub async fn run(
    output: OutputFormat,
    quiet: bool,
    urls: Vec<String>,
    limit: Option<usize>,
    batch_size: usize,
    timeout_secs: Option<f64>,
) -> Result<()> {
    let urls: Vec<String> = if urls.is_empty() {
        DEFAULT_URLS.iter().map(|u| u.to_string()).collect()
    } else {
        urls
    };

    let mut config = HttpExecutorConfig::from_env();
    if let Some(secs) = timeout_secs {
        let timeout = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid timeout: {secs}"))?;
        config = config.with_timeout(timeout);
    }
    let executor = Arc::new(HttpExecutor::new(config).context("Failed to build HTTP client")?);

    let concurrent = limit.map_or(Concurrency::Unbounded, Concurrency::Limited);
    let modes = [
        (
            "sequential",
            "📋 Sequential Pattern (one at a time):",
            Concurrency::sequential(),
            staggered(&urls),
        ),
        (
            "concurrent",
            "⚡ Concurrent Pattern (all at once):",
            concurrent,
            staggered(&urls),
        ),
        (
            "batch",
            "📦 Batch Pattern (controlled concurrency):",
            Concurrency::Batched(batch_size),
            uniform(&urls, BATCH_DELAY),
        ),
    ];

    let verbose = output.is_text() && !quiet;
    let mut runs = Vec::new();
    for (mode, heading, policy, items) in modes {
        if output.is_text() {
            print_heading(heading);
        }
        let report = run_mode(mode, policy, items, executor.clone(), |outcome| {
            if verbose {
                println!("{}", result_line(outcome));
            }
        })
        .await?;
        if output.is_text() {
            println!("⏱️  {} time: {:.2}s", mode, report.elapsed.as_secs_f64());
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
