// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The canonical, de-duplicated `TraceRecord` — one entry per parsed and
//! derived Chrome-tracing event.

use std::collections::HashMap;

/// One parsed and field-derived JSON trace event.
#[derive(Debug, Clone)]
pub struct TraceRecord {
    pub cat: String,
    pub func_name: String,
    pub phase: String,
    pub pid: i64,
    pub tid: i64,
    pub io_cat: &'static str,
    /// "0" until access-pattern derivation from consecutive offsets ships.
    pub acc_pat: &'static str,
    pub time: f64,
    pub count: u64,
    pub size: f64,
    pub time_range: i64,
    pub view_fields: HashMap<String, String>,
    pub bin_fields: HashMap<&'static str, u64>,
}
