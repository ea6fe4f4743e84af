// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Builds (or rebuilds) the sidecar checkpoint index for a gzip file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use dftracer_utils::config::IndexerConfig;
use dftracer_utils::Indexer;

#[derive(Parser, Debug)]
#[command(name = "dft-index", about = "Build a sidecar checkpoint index for a gzip trace file")]
struct Args {
    /// Gzip file to index.
    file: PathBuf,
    /// Sidecar index path. Defaults to `<file>.dftidx`.
    #[arg(long)]
    index_file: Option<PathBuf>,
    /// Bytes of uncompressed data between checkpoints.
    #[arg(long, default_value_t = 1)]
    chunk_size_mb: u64,
    /// Rebuild even if an up-to-date index already exists.
    #[arg(long)]
    force: bool,
}

fn main() -> ExitCode {
    dftracer_utils::logging::init();
    let args = Args::parse();

    let config = IndexerConfig {
        file: args.file,
        index_file: args.index_file,
        checkpoint_stride_bytes: args.chunk_size_mb.max(1) * 1024 * 1024,
        force: args.force,
    };
    let index_path = config.resolved_index_path();

    let indexer = match Indexer::new(
        &config.file,
        &index_path,
        config.checkpoint_stride_bytes,
        config.force,
    ) {
        Ok(indexer) => indexer,
        Err(e) => {
            error!(error = %e, "invalid indexer arguments");
            return ExitCode::from(1);
        }
    };

    match indexer.build() {
        Ok(outcome) => {
            info!(?outcome, index_path = %index_path.display(), "index build complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "index build failed");
            ExitCode::from(1)
        }
    }
}
