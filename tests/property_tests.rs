// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;
use tempfile::TempDir;

use dftracer_utils::checkpoint::CheckpointStore;
use dftracer_utils::indexer::{BuildOutcome, Indexer};
use dftracer_utils::pipeline::{Task, TaskContext, TypedValue};
use dftracer_utils::Reader;

/// A small batch of newline-terminated lines, bounded so each quickcheck
/// case stays fast to compress, index, and re-decompress.
#[derive(Debug, Clone)]
struct LineBatch(Vec<String>);

impl Arbitrary for LineBatch {
    fn arbitrary(g: &mut Gen) -> Self {
        let count = usize::arbitrary(g) % 30;
        let lines = (0..count)
            .map(|i| format!("row-{i}-{}", u32::arbitrary(g)))
            .collect();
        LineBatch(lines)
    }
}

/// One of a handful of small checkpoint strides, so the index actually
/// contains more than one checkpoint some of the time.
#[derive(Debug, Clone, Copy)]
struct SmallStride(u64);

impl Arbitrary for SmallStride {
    fn arbitrary(g: &mut Gen) -> Self {
        let choices = [16u64, 64, 256, 1024];
        SmallStride(*g.choose(&choices).unwrap())
    }
}

fn write_gz(dir: &TempDir, name: &str, lines: &[String]) -> (std::path::PathBuf, String) {
    let path = dir.path().join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    let mut expected = String::new();
    for line in lines {
        writeln!(encoder, "{line}").unwrap();
        expected.push_str(line);
        expected.push('\n');
    }
    encoder.finish().unwrap();
    (path, expected)
}

// Property 1/3: a byte range read back through the Reader, on a fresh
// index built from scratch, matches the same slice of a linear
// decompression, for any stride and any in-bounds range.
#[quickcheck]
fn byte_range_matches_linear_decompression(batch: LineBatch, stride: SmallStride) -> bool {
    let dir = TempDir::new().unwrap();
    let (gz_path, expected) = write_gz(&dir, "trace.pfw.gz", &batch.0);
    let idx_path = dir.path().join("trace.pfw.gz.dftidx");

    let mut reader = match Reader::open(&gz_path, &idx_path, stride.0) {
        Ok(r) => r,
        Err(_) => return false,
    };
    let max_bytes = reader.get_max_bytes();
    if max_bytes != expected.len() as u64 {
        return false;
    }

    let mut out = Vec::new();
    let mut cursor = 0u64;
    let mut buf = vec![0u8; 256];
    while cursor < max_bytes {
        let n = match reader.read(cursor, max_bytes, &mut buf) {
            Ok(n) => n,
            Err(_) => return false,
        };
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
        cursor += n as u64;
    }
    out == expected.as_bytes()
}

// Property 2: read_lines(sl, el) equals the concatenation of lines sl..el
// of a linear decompression, for any in-bounds 1-based line range.
#[quickcheck]
fn line_range_matches_linear_decompression(batch: LineBatch, stride: SmallStride) -> bool {
    if batch.0.is_empty() {
        return true;
    }
    let dir = TempDir::new().unwrap();
    let (gz_path, _) = write_gz(&dir, "trace.pfw.gz", &batch.0);
    let idx_path = dir.path().join("trace.pfw.gz.dftidx");

    let mut reader = match Reader::open(&gz_path, &idx_path, stride.0) {
        Ok(r) => r,
        Err(_) => return false,
    };
    let n = batch.0.len() as u64;
    // Deterministic but non-trivial sub-range derived from the batch itself.
    let sl = 1 + (batch.0.len() as u64 % n);
    let el = sl + (n - sl) / 2;

    let actual = match reader.read_lines(sl, el) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    let expected: String = batch.0[(sl - 1) as usize..el as usize]
        .iter()
        .map(|l| format!("{l}\n"))
        .collect();
    actual == expected.as_bytes()
}

// Properties 4/5: the index's recorded totals agree with an independent
// count over the decompressed content, and the per-checkpoint sums agree
// with those totals.
#[quickcheck]
fn checkpoint_sums_match_totals(batch: LineBatch, stride: SmallStride) -> bool {
    let dir = TempDir::new().unwrap();
    let (gz_path, expected) = write_gz(&dir, "trace.pfw.gz", &batch.0);
    let idx_path = dir.path().join("trace.pfw.gz.dftidx");

    let indexer = match Indexer::new(&gz_path, &idx_path, stride.0, false) {
        Ok(i) => i,
        Err(_) => return false,
    };
    let outcome = match indexer.build() {
        Ok(o) => o,
        Err(_) => return false,
    };
    let total_lines = match outcome {
        BuildOutcome::Built { total_lines, .. } => total_lines,
        BuildOutcome::AlreadyValid => return false,
    };
    if total_lines != expected.matches('\n').count() as u64 {
        return false;
    }

    let store = match CheckpointStore::open(&idx_path) {
        Ok(s) => s,
        Err(_) => return false,
    };
    let file_record = match store.get_file(&gz_path.to_string_lossy()) {
        Ok(Some(f)) => f,
        _ => return false,
    };
    let metadata = match store.get_metadata(file_record.id) {
        Ok(Some(m)) => m,
        _ => return false,
    };
    if metadata.total_uc_size != expected.len() as u64 {
        return false;
    }
    if metadata.total_lines != total_lines {
        return false;
    }

    let checkpoints = match store.get_checkpoints_by_line_range(file_record.id, 0, u64::MAX) {
        Ok(c) => c,
        Err(_) => return false,
    };
    let uc_sum: u64 = checkpoints.iter().map(|c| c.uc_size).sum();
    let line_sum: u64 = checkpoints.iter().map(|c| c.num_lines).sum();
    uc_sum == metadata.total_uc_size && line_sum == metadata.total_lines
}

// Property 11: rebuilding an unchanged index performs no work, regardless
// of content or stride.
#[quickcheck]
fn rebuild_is_idempotent_for_any_content(batch: LineBatch, stride: SmallStride) -> bool {
    let dir = TempDir::new().unwrap();
    let (gz_path, _) = write_gz(&dir, "trace.pfw.gz", &batch.0);
    let idx_path = dir.path().join("trace.pfw.gz.dftidx");

    let indexer = match Indexer::new(&gz_path, &idx_path, stride.0, false) {
        Ok(i) => i,
        Err(_) => return false,
    };
    if indexer.build().is_err() {
        return false;
    }
    matches!(indexer.build(), Ok(BuildOutcome::AlreadyValid))
}

struct AddOne;

impl Task for AddOne {
    type Input = i64;
    type Output = i64;

    fn run(&self, input: i64, _ctx: &TaskContext) -> Result<i64, dftracer_utils::error::TaskError> {
        Ok(input + 1)
    }
}

struct Negate;

impl Task for Negate {
    type Input = i64;
    type Output = i64;

    fn run(&self, input: i64, _ctx: &TaskContext) -> Result<i64, dftracer_utils::error::TaskError> {
        Ok(-input)
    }
}

// Properties 7/8: for a small randomized chain of deterministic integer
// tasks, the sequential and thread-pool executors agree with each other
// and with calling the same chain directly as plain functions.
#[quickcheck]
fn sequential_and_thread_pool_match_direct_call(ops: Vec<bool>, seed: i64) -> bool {
    let ops: Vec<bool> = ops.into_iter().take(20).collect();
    let direct = ops.iter().fold(seed, |acc, &add| if add { acc + 1 } else { -acc });

    let mut seq_pipeline = dftracer_utils::Pipeline::new();
    let mut pool_pipeline = dftracer_utils::Pipeline::new();
    let mut last_seq = None;
    let mut last_pool = None;
    let mut prev_seq: Vec<dftracer_utils::pipeline::TaskId> = Vec::new();
    let mut prev_pool: Vec<dftracer_utils::pipeline::TaskId> = Vec::new();
    for &add in &ops {
        let (id, result) = if add {
            seq_pipeline.add_task_with_parents(AddOne, prev_seq.as_slice())
        } else {
            seq_pipeline.add_task_with_parents(Negate, prev_seq.as_slice())
        };
        prev_seq = vec![id];
        last_seq = Some(result);

        let (id, result) = if add {
            pool_pipeline.add_task_with_parents(AddOne, prev_pool.as_slice())
        } else {
            pool_pipeline.add_task_with_parents(Negate, prev_pool.as_slice())
        };
        prev_pool = vec![id];
        last_pool = Some(result);
    }

    if ops.is_empty() {
        return true;
    }

    use dftracer_utils::executor::{Executor, SequentialExecutor, ThreadPoolExecutor};
    if SequentialExecutor::new()
        .execute(&mut seq_pipeline, seed.into_value())
        .is_err()
    {
        return false;
    }
    if ThreadPoolExecutor::with_threads(4)
        .execute(&mut pool_pipeline, seed.into_value())
        .is_err()
    {
        return false;
    }

    let seq_value = last_seq.unwrap().get().unwrap();
    let pool_value = last_pool.unwrap().get().unwrap();
    seq_value == direct && pool_value == direct && seq_value == pool_value
}
