// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON trace-line parsing. Wraps `sonic-rs` behind a narrow adapter that
//! only extracts the fields the analyzer actually consumes, rather than
//! materializing a full generic DOM per line.

use serde::Deserialize;

use crate::error::AnalyzerError;

#[derive(Debug, Deserialize)]
pub struct RawEvent {
    pub name: String,
    pub ph: String,
    #[serde(default)]
    pub ts: f64,
    #[serde(default)]
    pub dur: f64,
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub tid: i64,
    #[serde(default)]
    pub cat: String,
    #[serde(default)]
    pub args: Option<RawArgs>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawArgs {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default)]
    pub fhash: Option<i64>,
    #[serde(default)]
    pub hhash: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
    #[serde(rename = "ret", default)]
    pub ret: Option<i64>,
}

/// Parses one newline-terminated JSON trace line. Malformed/partial lines
/// (e.g. a trailing comma from an unterminated JSON-array-style trace file)
/// are reported as [`AnalyzerError::Json`] so the caller can skip them.
pub fn parse_trace_line(line: &[u8]) -> Result<RawEvent, AnalyzerError> {
    let trimmed = trim_trace_line(line);
    if trimmed.is_empty() {
        return Err(AnalyzerError::Json("empty line".into()));
    }
    sonic_rs::from_slice(trimmed).map_err(|e| AnalyzerError::Json(e.to_string()))
}

/// Chrome-tracing files are sometimes wrapped in a top-level `[...]` array
/// with one object per line and a trailing comma; strip that framing so each
/// line parses as a standalone JSON object.
fn trim_trace_line(line: &[u8]) -> &[u8] {
    let mut start = 0;
    let mut end = line.len();
    while start < end && (line[start] as char).is_whitespace() {
        start += 1;
    }
    while end > start && (line[end - 1] as char).is_whitespace() {
        end -= 1;
    }
    let mut slice = &line[start..end];
    if slice.first() == Some(&b'[') {
        slice = &slice[1..];
    }
    if slice.last() == Some(&b',') {
        slice = &slice[..slice.len() - 1];
    }
    if slice.last() == Some(&b']') {
        slice = &slice[..slice.len() - 1];
    }
    slice
}
