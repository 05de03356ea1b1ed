//! uwal-sim: drive adaptation layer nodes over a simulated acoustic link.
//!
//! Run with no arguments for randomized (but printed and reproducible)
//! defaults, or pass `--seed` for a deterministic run. Log verbosity follows
//! `RUST_LOG` (default `info`).

mod config;
mod input_gen;
mod sim;

use clap::Parser;
use config::{Args, Config};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(2);
        }
    };

    if config.print_config {
        config.print();
    }

    match sim::run(&config) {
        Ok(report) => {
            sim::print_summary(&report, config.print_metrics);
            if report.delivered_mismatched > 0 {
                eprintln!("error: {} packets were delivered corrupted", report.delivered_mismatched);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
