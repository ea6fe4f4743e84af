// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streams one or more trace files through the analyzer and prints the
//! resulting grouped metrics as JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use dftracer_utils::analyzer::analyze_trace;
use dftracer_utils::config::AnalyzerConfig;
use dftracer_utils::executor::{Executor, ThreadPoolExecutor};

#[derive(Parser, Debug)]
#[command(name = "dft-analyze", about = "Aggregate Chrome-tracing trace files into high-level metrics")]
struct Args {
    /// Trace files to analyze.
    files: Vec<PathBuf>,
    /// View-type fields to include in the grouping key (e.g. `proc_name`, `file_name`).
    #[arg(long = "view-type")]
    view_types: Vec<String>,
    /// Time bucket width in microseconds.
    #[arg(long, default_value_t = 1_000_000.0)]
    time_granularity: f64,
    /// Cache results keyed by (files, view_types, time_granularity).
    #[arg(long)]
    checkpoint: bool,
    /// Directory for checkpoint files. Defaults to `.dft_checkpoints`.
    #[arg(long)]
    checkpoint_dir: Option<PathBuf>,
    /// Worker threads for the execution pool. Defaults to available parallelism.
    #[arg(long)]
    threads: Option<usize>,
}

fn main() -> ExitCode {
    dftracer_utils::logging::init();
    let args = Args::parse();

    if args.files.is_empty() {
        error!("at least one trace file is required");
        return ExitCode::from(1);
    }

    let config = AnalyzerConfig {
        files: args.files,
        view_types: args.view_types,
        time_granularity: args.time_granularity,
        checkpoint: args.checkpoint,
        checkpoint_dir: args.checkpoint_dir,
    };

    let executor = match args.threads {
        Some(threads) => ThreadPoolExecutor::with_threads(threads),
        None => ThreadPoolExecutor::new(),
    };
    let groups = analyze_trace(
        &executor as &dyn Executor,
        &config.files,
        &config.view_types,
        config.time_granularity,
        config.resolved_checkpoint_dir().as_deref(),
    );

    match groups {
        Ok(groups) => match serde_json::to_string_pretty(&groups) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "failed to serialize results");
                ExitCode::from(1)
            }
        },
        Err(e) => {
            error!(error = %e, "analysis failed");
            ExitCode::from(1)
        }
    }
}
