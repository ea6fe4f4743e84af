// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streams Chrome-tracing JSON records out of indexed gzip files and
//! aggregates them into [`metrics::HighLevelMetrics`] grouped by the
//! caller's requested view types plus the derived `io_cat`/`acc_pat`/
//! `func_name`/`time_range` fields.

pub mod checkpoint;
pub mod constants;
pub mod metadata;
pub mod metrics;
pub mod parse;
pub mod record;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, instrument};

use crate::error::{AnalyzerError, PipelineError, TaskError};
use crate::executor::Executor;
use crate::pipeline::{Dyn, Pipeline, Task, TaskContext, TaskId, TypedValue};
use crate::reader::Reader;
use metadata::MetadataTable;
use metrics::{fold_into, grouping_key, merge_groups, HighLevelMetrics};
use parse::{parse_trace_line, RawEvent};
use record::TraceRecord;

/// Uncompressed bytes per chunk handed to one dynamically emitted task.
pub const DEFAULT_PARTITION_SIZE: u64 = 128 * 1024 * 1024;

/// Default checkpoint stride used when an index must be built on the fly.
const DEFAULT_CHECKPOINT_STRIDE: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
struct ChunkSpec {
    gz_path: PathBuf,
    idx_path: PathBuf,
    start: u64,
    end: u64,
    view_types: Vec<String>,
    time_granularity: f64,
}

struct ChunkTask;

impl Task for ChunkTask {
    type Input = Dyn<ChunkSpec>;
    type Output = Dyn<HashMap<String, HighLevelMetrics>>;

    fn run(&self, input: Dyn<ChunkSpec>, _ctx: &TaskContext) -> Result<Self::Output, TaskError> {
        let spec = &*input.0;
        let groups = process_chunk(spec).map_err(|e| TaskError::Failed(e.to_string()))?;
        Ok(Dyn(Arc::new(groups)))
    }
}

struct DispatchTask {
    trace_paths: Vec<PathBuf>,
    view_types: Vec<String>,
    time_granularity: f64,
    partition_size: u64,
}

impl Task for DispatchTask {
    type Input = ();
    type Output = Dyn<Vec<HighLevelMetrics>>;

    fn run(&self, _input: (), ctx: &TaskContext) -> Result<Self::Output, TaskError> {
        let mut futures = Vec::new();
        for gz_path in &self.trace_paths {
            let idx_path = index_path_for(gz_path);
            let chunks = plan_chunks(gz_path, &idx_path, self.partition_size)
                .map_err(|e| TaskError::Failed(e.to_string()))?;
            for (start, end) in chunks {
                let spec = ChunkSpec {
                    gz_path: gz_path.clone(),
                    idx_path: idx_path.clone(),
                    start,
                    end,
                    view_types: self.view_types.clone(),
                    time_granularity: self.time_granularity,
                };
                let fut = ctx.emit(ChunkTask, Dyn(Arc::new(spec)), &[])?;
                futures.push(fut);
            }
        }

        let mut groups: HashMap<String, HighLevelMetrics> = HashMap::new();
        for fut in futures {
            let Dyn(partial) = fut.get()?;
            merge_groups(&mut groups, &partial);
        }
        Ok(Dyn(Arc::new(groups.into_values().collect())))
    }
}

fn index_path_for(gz_path: &Path) -> PathBuf {
    let mut path = gz_path.as_os_str().to_owned();
    path.push(".dftidx");
    PathBuf::from(path)
}

fn plan_chunks(gz_path: &Path, idx_path: &Path, partition_size: u64) -> Result<Vec<(u64, u64)>, AnalyzerError> {
    let reader = Reader::open(gz_path, idx_path, DEFAULT_CHECKPOINT_STRIDE)?;
    let max_bytes = reader.get_max_bytes();
    if max_bytes == 0 {
        return Ok(Vec::new());
    }
    let mut chunks = Vec::new();
    let mut start = 0u64;
    while start < max_bytes {
        let end = (start + partition_size).min(max_bytes);
        chunks.push((start, end));
        start = end;
    }
    Ok(chunks)
}

/// Reads `[spec.start, spec.end)` line by line, parses and filters each
/// record, derives its fields, and folds it into a per-chunk group map.
fn process_chunk(spec: &ChunkSpec) -> Result<HashMap<String, HighLevelMetrics>, AnalyzerError> {
    let mut reader = Reader::open(&spec.gz_path, &spec.idx_path, DEFAULT_CHECKPOINT_STRIDE)?;
    let mut groups = HashMap::new();
    let mut metadata = MetadataTable::new();
    let mut buf = Vec::new();
    let mut cursor = spec.start;

    while cursor < spec.end {
        let produced = reader.read_line_bytes(cursor, spec.end, &mut buf)?;
        if produced == 0 {
            break;
        }
        cursor += produced as u64;
        for line in buf.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let event = match parse_trace_line(line) {
                Ok(event) => event,
                Err(e) => {
                    debug!(error = %e, "skipping unparseable trace line");
                    continue;
                }
            };
            metadata.observe(&event);
            if event.ph == "M" {
                continue;
            }
            if constants::is_ignored(&event.name) {
                continue;
            }
            let record = derive_record(&event, &metadata, spec.time_granularity);
            let key = grouping_key(&record, &spec.view_types);
            fold_into(&mut groups, key, &record, &spec.view_types);
        }
    }
    Ok(groups)
}

fn derive_record(event: &RawEvent, metadata: &MetadataTable, time_granularity: f64) -> TraceRecord {
    let io_cat = constants::io_cat(&event.name);
    let mut view_fields = HashMap::new();
    if let Some(args) = &event.args {
        if let Some(fhash) = args.fhash {
            if let Some(name) = metadata.file_name(fhash) {
                view_fields.insert("file_name".to_string(), name.to_string());
            }
        }
    }
    if let Some(name) = metadata.process_name(event.pid) {
        view_fields.insert("proc_name".to_string(), name.to_string());
    }

    let size = if io_cat == "read" || io_cat == "write" {
        event
            .args
            .as_ref()
            .and_then(|a| a.ret)
            .filter(|&r| r > 0)
            .map(|r| r as f64)
            .unwrap_or(0.0)
    } else {
        0.0
    };
    let mut bin_fields = HashMap::new();
    if let Some(bin) = constants::size_bin(size) {
        bin_fields.insert(bin, 1u64);
    }

    TraceRecord {
        cat: event.cat.to_lowercase(),
        func_name: event.name.clone(),
        phase: event.ph.clone(),
        pid: event.pid,
        tid: event.tid,
        io_cat,
        acc_pat: "0",
        time: event.dur,
        count: 1,
        size,
        time_range: (event.ts / time_granularity).floor() as i64,
        view_fields,
        bin_fields,
    }
}

/// Streams and aggregates `trace_paths` into one `HighLevelMetrics` per
/// group. Optionally consults/populates a columnar checkpoint under
/// `checkpoint_dir` keyed by `(trace_paths, view_types, time_granularity)`.
#[instrument(skip(executor))]
pub fn analyze_trace(
    executor: &dyn Executor,
    trace_paths: &[PathBuf],
    view_types: &[String],
    time_granularity: f64,
    checkpoint_dir: Option<&Path>,
) -> Result<Vec<HighLevelMetrics>, AnalyzerError> {
    if let Some(dir) = checkpoint_dir {
        let key = checkpoint::checkpoint_key(trace_paths, view_types, time_granularity);
        if checkpoint::exists(dir, &key) {
            return checkpoint::read(dir, &key);
        }
    }

    let mut pipeline = Pipeline::new();
    let (_id, result) = pipeline.add_task(DispatchTask {
        trace_paths: trace_paths.to_vec(),
        view_types: view_types.to_vec(),
        time_granularity,
        partition_size: DEFAULT_PARTITION_SIZE,
    });

    executor
        .execute(&mut pipeline, ().into_value())
        .map_err(AnalyzerError::Pipeline)?;

    let Dyn(groups) = result.get().map_err(|e| {
        AnalyzerError::Pipeline(PipelineError::TaskFailure(TaskId::from_raw(0), e))
    })?;
    let groups = (*groups).clone();

    if let Some(dir) = checkpoint_dir {
        let key = checkpoint::checkpoint_key(trace_paths, view_types, time_granularity);
        checkpoint::write(dir, &key, &groups)?;
    }

    Ok(groups)
}
