// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use dftracer_utils::indexer::{BuildOutcome, Indexer};
use dftracer_utils::Reader;

const STRIDE: u64 = 4096;

fn write_gz_lines(dir: &TempDir, name: &str, lines: &[&str]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    for line in lines {
        writeln!(encoder, "{line}").unwrap();
    }
    encoder.finish().unwrap();
    path
}

fn many_lines(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("line-{i:05}-payload")).collect()
}

#[test]
fn read_byte_range_matches_linear_decompression() {
    let dir = TempDir::new().unwrap();
    let lines = many_lines(2000);
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let gz_path = write_gz_lines(&dir, "trace.pfw.gz", &refs);
    let idx_path = dir.path().join("trace.pfw.gz.dftidx");

    let expected: String = refs.iter().map(|l| format!("{l}\n")).collect();

    let mut reader = Reader::open(&gz_path, &idx_path, STRIDE).unwrap();
    let max_bytes = reader.get_max_bytes();
    assert_eq!(max_bytes, expected.len() as u64);

    let mut out = Vec::new();
    let mut cursor = 0u64;
    let mut buf = vec![0u8; 1024];
    while cursor < max_bytes {
        let n = reader.read(cursor, max_bytes, &mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
        cursor += n as u64;
    }
    assert_eq!(out, expected.as_bytes());
}

#[test]
fn read_lines_returns_exact_inclusive_range() {
    let dir = TempDir::new().unwrap();
    let lines = many_lines(100);
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let gz_path = write_gz_lines(&dir, "trace.pfw.gz", &refs);
    let idx_path = dir.path().join("trace.pfw.gz.dftidx");

    let mut reader = Reader::open(&gz_path, &idx_path, STRIDE).unwrap();

    let full = reader.read_lines(1, 100).unwrap();
    let expected_full: String = refs.iter().map(|l| format!("{l}\n")).collect();
    assert_eq!(full, expected_full.as_bytes());

    let single = reader.read_lines(50, 50).unwrap();
    assert_eq!(single, format!("{}\n", refs[49]).as_bytes());
}

#[test]
fn rebuilding_index_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let lines = many_lines(500);
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let gz_path = write_gz_lines(&dir, "trace.pfw.gz", &refs);
    let idx_path = dir.path().join("trace.pfw.gz.dftidx");

    let indexer = Indexer::new(&gz_path, &idx_path, STRIDE, false).unwrap();
    let first = indexer.build().unwrap();
    assert!(matches!(first, BuildOutcome::Built { .. }));

    let mtime_before = std::fs::metadata(&idx_path).unwrap().modified().unwrap();
    let second = indexer.build().unwrap();
    assert_eq!(second, BuildOutcome::AlreadyValid);
    let mtime_after = std::fs::metadata(&idx_path).unwrap().modified().unwrap();
    assert_eq!(mtime_before, mtime_after);
}

#[test]
fn reopening_index_reads_identical_bytes() {
    let dir = TempDir::new().unwrap();
    let lines = many_lines(800);
    let refs: Vec<&str> = lines.iter().map(String::as_str).collect();
    let gz_path = write_gz_lines(&dir, "trace.pfw.gz", &refs);
    let idx_path = dir.path().join("trace.pfw.gz.dftidx");

    let before = {
        let mut reader = Reader::open(&gz_path, &idx_path, STRIDE).unwrap();
        reader.read_lines(1, 800).unwrap()
    };

    // Drop and reopen against the same on-disk index.
    let after = {
        let mut reader = Reader::open(&gz_path, &idx_path, STRIDE).unwrap();
        reader.read_lines(1, 800).unwrap()
    };

    assert_eq!(before, after);
}

#[test]
fn empty_file_has_zero_totals_and_no_checkpoints() {
    let dir = TempDir::new().unwrap();
    let gz_path = write_gz_lines(&dir, "empty.pfw.gz", &[]);
    let idx_path = dir.path().join("empty.pfw.gz.dftidx");

    let indexer = Indexer::new(&gz_path, &idx_path, STRIDE, false).unwrap();
    let outcome = indexer.build().unwrap();
    assert_eq!(
        outcome,
        BuildOutcome::Built {
            checkpoints: 0,
            total_lines: 0
        }
    );

    let mut reader = Reader::open(&gz_path, &idx_path, STRIDE).unwrap();
    assert_eq!(reader.get_max_bytes(), 0);
    assert_eq!(reader.get_num_lines(), 0);
}
