//! Batch report output: colored summary on stderr, or JSON lines on stdout

use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use umi_batch_core::BatchReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// One JSON report per stage on stdout
    Jsonl,
}

pub fn progress_bar(format: OutputFormat, verbose: bool) -> ProgressBar {
    if format != OutputFormat::Text || verbose {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("#>-"),
    );
    pb
}

pub fn print_report(report: &BatchReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Jsonl => {
            println!("{}", serde_json::to_string(report)?);
        }
        OutputFormat::Text => print_summary(report),
    }
    Ok(())
}

/// Red when non-zero
fn count(n: usize) -> colored::ColoredString {
    if n > 0 {
        n.to_string().red()
    } else {
        n.to_string().normal()
    }
}

fn print_summary(report: &BatchReport) {
    let summary = report.summary();

    eprintln!(
        "\n{}",
        format!("=== Stage {} Summary ===", report.stage).bold()
    );
    eprintln!("{:<16} {}", "Succeeded:", summary.succeeded.to_string().green());
    eprintln!("{:<16} {}", "Failed:", count(summary.failed));
    eprintln!("{:<16} {}", "Timed out:", count(summary.timed_out));
    eprintln!("{:<16} {}", "Launch failed:", count(summary.launch_failed));
    if summary.aborted > 0 {
        eprintln!("{:<16} {}", "Aborted:", count(summary.aborted));
    }
    eprintln!("{:<16} {}", "Skipped:", summary.skipped.to_string().yellow());
    if summary.not_started > 0 {
        eprintln!("{:<16} {}", "Not started:", count(summary.not_started));
    }
    eprintln!("{:<16} {}", "Peak workers:", report.peak_concurrency);
    eprintln!("{:<16} {:.2}s", "Total time:", report.elapsed.as_secs_f64());

    let failures: Vec<_> = report
        .sorted_by_unit()
        .into_iter()
        .filter(|o| !o.is_success())
        .collect();
    if !failures.is_empty() {
        eprintln!("\n{}", "Failures:".red().bold());
        for outcome in failures {
            eprintln!("  {} {}: {}", "✗".red().bold(), outcome.unit, outcome.kind);
        }
    }
    for unit in &report.not_started {
        eprintln!("  {} {}: not started", "-".yellow(), unit);
    }
}
