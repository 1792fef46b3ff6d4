// Output formatting for CLI

use anyhow::Result;
use serde::Serialize;

use crate::runner::{speedup, ModeReport};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Text,
        }
    }

    pub fn print_value<T: Serialize>(&self, value: &T) -> Result<()> {
        if let OutputFormat::Json = self {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Print a section heading
pub fn print_heading(title: &str) {
    println!("\n{title}");
}

/// Marker for a result line
pub fn status_marker(success: bool) -> &'static str {
    if success {
        "✅"
    } else {
        "❌"
    }
}

/// Comparison of several modes, baseline first
#[derive(Debug, Serialize)]
pub struct Summary {
    pub runs: Vec<ModeReport>,
    pub speedups: Vec<SpeedupEntry>,
}

#[derive(Debug, Serialize)]
pub struct SpeedupEntry {
    pub mode: String,
    pub versus: String,
    pub factor: Option<f64>,
}

impl Summary {
    pub fn new(runs: Vec<ModeReport>) -> Self {
        let speedups = match runs.split_first() {
            Some((baseline, rest)) => rest
                .iter()
                .map(|run| SpeedupEntry {
                    mode: run.mode.clone(),
                    versus: baseline.mode.clone(),
                    factor: speedup(baseline, run),
                })
                .collect(),
            None => Vec::new(),
        };
        Self { runs, speedups }
    }

    pub fn print_text(&self) {
        print_heading("📊 Performance Summary:");
        let width = self.runs.iter().map(|r| r.mode.len()).max().unwrap_or(0) + 1;
        for run in &self.runs {
            println!(
                "  {:<width$} {:.2}s  ({}/{} ok, peak {} in flight)",
                format!("{}:", capitalize(&run.mode)),
                run.elapsed.as_secs_f64(),
                run.succeeded,
                run.total(),
                run.peak_in_flight,
                width = width
            );
        }
        for entry in &self.speedups {
            match entry.factor {
                Some(factor) => println!("  Speedup ({}): {:.1}x", entry.mode, factor),
                None => println!("  Speedup ({}): n/a", entry.mode),
            }
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
