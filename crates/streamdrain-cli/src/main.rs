//! streamdrain
//!
//! Throughput benchmark for resumable stream sources.
//!
//! ## Overview
//!
//! A run opens the source, reads one record to confirm a resume cursor,
//! closes it, asks the workload generator for N new records, reopens at the
//! cursor and drains exactly those records in batches, printing progress and
//! a final performance summary.
//!
//! ## Quick Start
//!
//! ```bash
//! # Benchmark the default Postgres table with 1,000,000 records
//! streamdrain
//!
//! # Smaller run
//! streamdrain 50000
//!
//! # Self-contained run against the in-memory source
//! streamdrain --config memory.toml 100000
//! ```
//!
//! ## Configuration
//!
//! - `--config` / `STREAMDRAIN_CONFIG`: TOML config file (see `config.rs`)
//! - `RUST_LOG`: log filter (default: info). Logs go to stderr; the report goes to stdout.
//!
//! ## Exit codes
//!
//! 0 when every record was drained and reported, 1 on any fatal error.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use streamdrain_core::{
    parse_record_count, shutdown_signal, BenchReport, Harness, RunError, ShutdownHandle,
    WorkloadReport,
};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "streamdrain")]
#[command(about = "Throughput benchmark for resumable stream sources", long_about = None)]
#[command(version)]
struct Cli {
    /// Number of records to generate and drain [default: 1000000]
    record_count: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long, env = "STREAMDRAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum records per read (overrides the config file)
    #[arg(short, long)]
    batch_size: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let record_count =
        parse_record_count(cli.record_count.as_deref()).context("Invalid record count argument")?;

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(batch_size) = cli.batch_size {
        config.drain.max_batch_size = batch_size;
    }
    let collaborators = config.build()?;

    let shutdown = ShutdownHandle::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        tracing::warn!(signal = %signal, "shutdown requested, closing stream");
        trigger.trigger(signal);
    });

    println!("Benchmarking {} records...", record_count);

    let mut harness = Harness::new(
        collaborators.source,
        collaborators.generator,
        config.harness_config(record_count),
    )
    .with_shutdown(shutdown)
    .on_progress(|sample| println!("{}", sample));

    match harness.run().await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(err) => {
            print_failure(&err);
            Err(err.into())
        }
    }
}

fn print_workload(label: &str, report: &WorkloadReport) {
    match report.rate() {
        Some(rate) => println!(
            "{} completed in {:.3}s ({:.2} records/second)",
            label,
            report.elapsed.as_secs_f64(),
            rate
        ),
        None => println!("{} completed in {:.3}s", label, report.elapsed.as_secs_f64()),
    }
    if !report.output.trim().is_empty() {
        println!("Script output:\n{}", report.output.trim_end());
    }
}

fn print_report(report: &BenchReport) {
    println!();
    if let Some(warmup) = &report.warmup {
        print_workload("Warm-up insertion", warmup);
    }
    println!("Resumed at position {}", report.confirmed_position);
    print_workload("Insertion", &report.workload);
    println!();
    println!("{}", report.summary);
    if report.summary.total < report.workload.requested {
        println!(
            "Drain ended ({}) after {} of {} records",
            report.drain_end, report.summary.total, report.workload.requested
        );
    }
}

fn print_failure(err: &RunError) {
    if let Some(partial) = &err.partial {
        println!();
        println!("{}", partial);
    }
}
