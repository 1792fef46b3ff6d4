// Fanout CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Every mode shares one executor and one runner; only the admission policy changes.
// Design Decision: Logs go to stderr, results to stdout (text or json).

mod commands;
mod output;
mod runner;
mod telemetry;

use clap::{Parser, Subcommand};
use fanout_core::Concurrency;

#[derive(Parser)]
#[command(name = "fanout")]
#[command(about = "Fanout CLI - Compare sequential, concurrent and batched async execution")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, short, default_value = "text", value_parser = ["text", "json"])]
    pub output: String,

    /// Suppress per-result lines
    #[arg(long, short)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run identical sleeping tasks sequentially, then concurrently
    Simulate {
        /// Number of tasks
        #[arg(long, short = 'n', default_value = "50")]
        tasks: usize,

        /// Simulated work per task in milliseconds
        #[arg(long, default_value = "100")]
        delay_ms: u64,

        /// Policy for the concurrent run: `unbounded`, `N` or `batch:N`
        #[arg(long, env = "FANOUT_CONCURRENCY", default_value = "unbounded")]
        concurrency: Concurrency,
    },

    /// Fetch URLs sequentially, concurrently and in batches
    Fetch {
        /// URLs to fetch (defaults to a set of httpbin.org endpoints)
        urls: Vec<String>,

        /// Cap the concurrent run at this many requests in flight
        #[arg(long)]
        limit: Option<usize>,

        /// Batch size for the batch run
        #[arg(long, default_value = "3")]
        batch_size: usize,

        /// Per-request timeout in seconds (default 10)
        #[arg(long, env = "FANOUT_HTTP_TIMEOUT_SECS")]
        timeout_secs: Option<f64>,
    },

    /// Count lazily, one value per pull
    Count {
        /// How far to count
        #[arg(default_value = "5")]
        n: usize,

        /// Delay before each value in milliseconds
        #[arg(long, default_value = "100")]
        delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_telemetry(telemetry::TelemetryConfig::from_env());

    let cli = Cli::parse();
    let output_format = output::OutputFormat::parse(&cli.output);

    match cli.command {
        Commands::Simulate {
            tasks,
            delay_ms,
            concurrency,
        } => commands::simulate::run(output_format, cli.quiet, tasks, delay_ms, concurrency).await,
        Commands::Fetch {
            urls,
            limit,
            batch_size,
            timeout_secs,
        } => {
            commands::fetch::run(
                output_format,
                cli.quiet,
                urls,
                limit,
                batch_size,
                timeout_secs,
            )
            .await
        }
        Commands::Count { n, delay_ms } => commands::count::run(output_format, n, delay_ms).await,
    }
}
