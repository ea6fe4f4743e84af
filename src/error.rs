// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared across the crate, following the per-component
//! `thiserror` enum pattern (each component gets its own error type with
//! `#[from]` conversions from the lower layers it depends on).

use thiserror::Error;

use crate::pipeline::{TaskId, ValueKind};

/// Errors raised by the [`crate::inflater::Inflater`].
#[derive(Debug, Error)]
pub enum InflaterError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("decoder rejected the stream: {0}")]
    Decoder(String),
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the [`crate::checkpoint::store::CheckpointStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("index schema is not valid")]
    InvalidSchema,
    #[error("no such file record: {0}")]
    UnknownFile(String),
    #[error("{0}")]
    Other(String),
}

/// Errors raised while building a gzip index.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("file I/O error: {0}")]
    FileIo(#[from] std::io::Error),
    #[error("decoder error: {0}")]
    Decoder(#[from] InflaterError),
    #[error("checkpoint store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised while reading from an indexed gzip file.
#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("decoder error: {0}")]
    Decoder(#[from] InflaterError),
    #[error("checkpoint store error: {0}")]
    Store(#[from] StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while validating a pipeline graph, before any task runs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("pipeline has no tasks")]
    Empty,
    #[error("cycle detected in pipeline graph")]
    Cycle,
    #[error(
        "type mismatch on edge {parent:?} -> {child:?}: expected input {expected:?}, found output {found:?}"
    )]
    TypeMismatch {
        parent: TaskId,
        child: TaskId,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("task {0:?} has an unknown parent {1:?}")]
    UnknownParent(TaskId, TaskId),
}

/// Error observed by a single task, surfaced through its [`crate::pipeline::TaskResult`].
#[derive(Debug, Error, Clone)]
pub enum TaskError {
    #[error("{0}")]
    Failed(String),
    #[error("aborted: a dependency or sibling task failed")]
    Aborted,
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors raised by a [`crate::executor`] while executing a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("task {0:?} failed: {1}")]
    TaskFailure(TaskId, TaskError),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Errors raised by a [`crate::transport::Transport`] implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("payload type is not supported by the distributed transport")]
    UnsupportedPayload,
    #[error("channel closed unexpectedly")]
    ChannelClosed,
    #[error("rank {0} is out of range for world size {1}")]
    RankOutOfRange(usize, usize),
    #[error("collective aborted: {0}")]
    CollectiveAborted(String),
}

/// Errors raised by the analyzer, composing all the layers beneath it.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("indexer error: {0}")]
    Indexer(#[from] IndexerError),
    #[error("reader error: {0}")]
    Reader(#[from] ReaderError),
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
    #[error("trace record JSON parse error: {0}")]
    Json(String),
    #[error("checkpoint cache error: {0}")]
    Checkpoint(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
