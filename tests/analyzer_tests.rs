// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use dftracer_utils::analyzer::analyze_trace;
use dftracer_utils::executor::{Executor, SequentialExecutor};

fn write_trace(dir: &TempDir, name: &str, lines: &[String]) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let file = std::fs::File::create(&path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    for line in lines {
        writeln!(encoder, "{line}").unwrap();
    }
    encoder.finish().unwrap();
    path
}

fn metadata_lines() -> Vec<String> {
    vec![
        r#"{"name":"PR","ph":"M","pid":1,"tid":0,"args":{"name":{"name":"proc-A"}}}"#.to_string(),
        r#"{"name":"FH","ph":"M","pid":1,"tid":0,"args":{"fhash":7,"value":"/data/input.bin"}}"#
            .to_string(),
    ]
}

fn read_event(ts: f64, dur: f64, fhash: i64) -> String {
    format!(
        r#"{{"name":"read","ph":"X","cat":"POSIX","ts":{ts},"dur":{dur},"pid":1,"tid":0,"args":{{"fhash":{fhash},"ret":4096}}}}"#
    )
}

// Scenario F: groups by (proc_name, file_name, cat, io_cat, func_name, time_range)
// with count_sum/time_sum matching the matching records.
#[test]
fn scenario_f_groups_read_events_by_view_types() {
    let dir = TempDir::new().unwrap();
    let mut lines = metadata_lines();
    lines.push(read_event(100.0, 10.0, 7));
    lines.push(read_event(200.0, 20.0, 7));
    lines.push(read_event(1_000_100.0, 5.0, 7));
    let gz_path = write_trace(&dir, "trace.pfw.gz", &lines);

    let executor = SequentialExecutor::new();
    let groups = analyze_trace(
        &executor,
        &[gz_path],
        &["proc_name".to_string(), "file_name".to_string()],
        1_000_000.0,
        None,
    )
    .unwrap();

    let bucket0 = groups
        .iter()
        .find(|g| g.group_values.get("time_range").map(String::as_str) == Some("0"))
        .expect("time_range=0 bucket present");
    assert_eq!(bucket0.count_sum, 2);
    assert_eq!(bucket0.time_sum, 30.0);
    assert_eq!(
        bucket0.group_values.get("proc_name").map(String::as_str),
        Some("proc-A")
    );
    assert_eq!(
        bucket0.group_values.get("file_name").map(String::as_str),
        Some("/data/input.bin")
    );
    assert_eq!(bucket0.group_values.get("io_cat").map(String::as_str), Some("read"));

    let bucket1 = groups
        .iter()
        .find(|g| g.group_values.get("time_range").map(String::as_str) == Some("1"))
        .expect("time_range=1 bucket present");
    assert_eq!(bucket1.count_sum, 1);
    assert_eq!(bucket1.time_sum, 5.0);
}

#[test]
fn ignored_functions_are_excluded_from_groups() {
    let dir = TempDir::new().unwrap();
    let mut lines = metadata_lines();
    lines.push(
        r#"{"name":"TFReader.next","ph":"X","cat":"POSIX","ts":0,"dur":1,"pid":1,"tid":0}"#
            .to_string(),
    );
    lines.push(read_event(0.0, 5.0, 7));
    let gz_path = write_trace(&dir, "trace.pfw.gz", &lines);

    let executor = SequentialExecutor::new();
    let groups = analyze_trace(&executor, &[gz_path], &[], 1_000_000.0, None).unwrap();

    assert!(groups
        .iter()
        .all(|g| g.group_values.get("func_name").map(String::as_str) != Some("TFReader.next")));
    assert_eq!(groups.iter().map(|g| g.count_sum).sum::<u64>(), 1);
}

// A metadata-classified event (e.g. lseek) can still carry a positive `ret`,
// but only read/write events contribute that ret to size_sum.
#[test]
fn metadata_event_ret_does_not_contribute_to_size() {
    let dir = TempDir::new().unwrap();
    let mut lines = metadata_lines();
    lines.push(
        r#"{"name":"lseek","ph":"X","cat":"POSIX","ts":0,"dur":1,"pid":1,"tid":0,"args":{"fhash":7,"ret":4096}}"#
            .to_string(),
    );
    let gz_path = write_trace(&dir, "trace.pfw.gz", &lines);

    let executor = SequentialExecutor::new();
    let groups = analyze_trace(&executor, &[gz_path], &[], 1_000_000.0, None).unwrap();

    let lseek_group = groups
        .iter()
        .find(|g| g.group_values.get("io_cat").map(String::as_str) == Some("metadata"))
        .expect("metadata group present");
    assert_eq!(lseek_group.size_sum, 0.0);
}

#[test]
fn checkpointed_run_is_reused_on_second_call() {
    let dir = TempDir::new().unwrap();
    let mut lines = metadata_lines();
    lines.push(read_event(0.0, 10.0, 7));
    let gz_path = write_trace(&dir, "trace.pfw.gz", &lines);
    let checkpoint_dir = dir.path().join("checkpoints");

    let executor = SequentialExecutor::new();
    let view_types = vec!["proc_name".to_string()];

    let first = analyze_trace(
        &executor,
        &[gz_path.clone()],
        &view_types,
        1_000_000.0,
        Some(checkpoint_dir.as_path()),
    )
    .unwrap();

    // Remove the source trace and its sidecar index; a correct checkpoint
    // hit must not need either.
    let mut idx_path = gz_path.as_os_str().to_owned();
    idx_path.push(".dftidx");
    std::fs::remove_file(&gz_path).unwrap();
    std::fs::remove_file(idx_path).ok();

    let second = analyze_trace(
        &executor,
        &[gz_path],
        &view_types,
        1_000_000.0,
        Some(checkpoint_dir.as_path()),
    )
    .unwrap();

    assert_eq!(first.len(), second.len());
    let first_count: u64 = first.iter().map(|g| g.count_sum).sum();
    let second_count: u64 = second.iter().map(|g| g.count_sum).sum();
    assert_eq!(first_count, second_count);
}
