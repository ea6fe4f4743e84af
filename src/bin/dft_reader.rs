// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ad hoc byte/line reads against an existing (or freshly built) index, for
//! operational debugging.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use dftracer_utils::config::IndexerConfig;
use dftracer_utils::Reader;

#[derive(Parser, Debug)]
#[command(name = "dft-reader", about = "Read a byte or line range out of an indexed gzip trace file")]
struct Args {
    /// Gzip file to read from.
    file: PathBuf,
    /// Sidecar index path. Defaults to `<file>.dftidx`, built on demand.
    #[arg(long)]
    index_file: Option<PathBuf>,
    /// Bytes of uncompressed data between checkpoints, used only if the
    /// index doesn't exist yet.
    #[arg(long, default_value_t = 1)]
    chunk_size_mb: u64,
    /// Rebuild the index even if it's already valid.
    #[arg(long)]
    force: bool,
    /// Range start (byte offset, or 1-based line number with `--by-line`).
    #[arg(long, default_value_t = 0)]
    start: u64,
    /// Range end, exclusive for bytes / inclusive for lines. Defaults to EOF.
    #[arg(long)]
    end: Option<u64>,
    /// Interpret `start`/`end` as line numbers instead of byte offsets.
    #[arg(long)]
    by_line: bool,
}

fn main() -> ExitCode {
    dftracer_utils::logging::init();
    let args = Args::parse();

    let config = IndexerConfig {
        file: args.file.clone(),
        index_file: args.index_file.clone(),
        checkpoint_stride_bytes: args.chunk_size_mb.max(1) * 1024 * 1024,
        force: args.force,
    };
    let index_path = config.resolved_index_path();

    let mut reader = match Reader::open(&args.file, &index_path, config.checkpoint_stride_bytes) {
        Ok(reader) => reader,
        Err(e) => {
            error!(error = %e, "failed to open reader");
            return ExitCode::from(1);
        }
    };

    let result = if args.by_line {
        let end_line = args.end.unwrap_or_else(|| reader.get_num_lines());
        reader.read_lines(args.start.max(1), end_line)
    } else {
        let end = args.end.unwrap_or_else(|| reader.get_max_bytes());
        let mut buf = vec![0u8; (end.saturating_sub(args.start)) as usize];
        match reader.read(args.start, end, &mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) => Err(e),
        }
    };

    match result {
        Ok(bytes) => {
            let _ = std::io::stdout().write_all(&bytes);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "read failed");
            ExitCode::from(1)
        }
    }
}
