// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `dftracer-utils` provides indexed random access over gzip-compressed
//! Chrome-tracing-format I/O traces, a typed task-DAG execution engine, and
//! a trace analyzer built on top of both.
//!
//! The crate is organized around three subsystems:
//!
//! - [`inflater`] + [`checkpoint`] + [`indexer`] + [`reader`]: build and
//!   consume a sidecar index of gzip decoder checkpoints so that byte- or
//!   line-ranged reads don't require re-decompressing a file from the start.
//! - [`pipeline`] + [`executor`] + [`transport`]: a typed dependency graph of
//!   tasks, executed by interchangeable schedulers (sequential, work-stealing
//!   thread pool, or distributed multi-process).
//! - [`analyzer`]: composes the above to stream trace records out of indexed
//!   files and aggregate them into high-level metrics.

pub mod analyzer;
pub mod checkpoint;
pub mod config;
pub mod error;
pub mod executor;
pub mod indexer;
pub mod inflater;
pub mod logging;
pub mod pipeline;
pub mod reader;
pub mod transport;

pub use error::{
    AnalyzerError, IndexerError, InflaterError, PipelineError, ReaderError, StoreError,
    TransportError,
};
pub use indexer::Indexer;
pub use pipeline::Pipeline;
pub use reader::Reader;
