// Lazy counter: one value per pull, each after a short sleep

use std::time::Duration;

use anyhow::Result;
use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::output::{print_heading, OutputFormat};

#[derive(Debug, Serialize)]
struct CountOutput {
    counts: Vec<String>,
}

/// Yields `Count: 1` .. `Count: n`, sleeping `delay` before each
fn count_stream(n: usize, delay: Duration) -> impl Stream<Item = String> {
    futures::stream::iter(1..=n).then(move |i| async move {
        tokio::time::sleep(delay).await;
        format!("Count: {i}")
    })
}

pub async fn run(output: OutputFormat, n: usize, delay_ms: u64) -> Result<()> {
    let counts = count_stream(n, Duration::from_millis(delay_ms));
    futures::pin_mut!(counts);

    if output.is_text() {
        print_heading("🔄 Counting asynchronously:");
        while let Some(line) = counts.next().await {
            println!("  {line}");
        }
        return Ok(());
    }

    let counts = counts.collect().await;
    output.print_value(&CountOutput { counts })
}
