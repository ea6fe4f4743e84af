// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The metadata side-table: `ph == "M"` events carry a `name` discriminator
//! (`FH`/`HH`/`SH`/`PR`) that populates hash -> name lookups consulted when
//! deriving `view_fields` like `proc_name`/`file_name` for regular events.
//! Rebuilt per [`super::analyze_trace`] call; never persisted.

use std::collections::HashMap;

use super::parse::RawEvent;

#[derive(Debug, Default)]
pub struct MetadataTable {
    file_hash_to_name: HashMap<i64, String>,
    host_hash_to_name: HashMap<i64, String>,
    string_hash_to_value: HashMap<i64, String>,
    pid_to_process_name: HashMap<i64, String>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes one event; metadata events (`ph == "M"`) update the table,
    /// everything else is ignored.
    pub fn observe(&mut self, event: &RawEvent) {
        if event.ph != "M" {
            return;
        }
        let Some(args) = &event.args else { return };
        let Some(value) = args.value.as_ref().and_then(|v| v.as_str()) else {
            // `PR` carries an object, not a bare string; handle separately.
            if event.name == "PR" {
                if let Some(value) = &args.value {
                    if let Some(name) = value.get("name").and_then(|v| v.as_str()) {
                        self.pid_to_process_name.insert(event.pid, name.to_string());
                    }
                }
            }
            return;
        };
        match event.name.as_str() {
            "FH" => {
                if let Some(hash) = args.fhash.or(args.ret) {
                    self.file_hash_to_name.insert(hash, value.to_string());
                }
            }
            "HH" => {
                if let Some(hash) = args.hhash.or(args.ret) {
                    self.host_hash_to_name.insert(hash, value.to_string());
                }
            }
            "SH" => {
                if let Some(hash) = args.ret {
                    self.string_hash_to_value.insert(hash, value.to_string());
                }
            }
            _ => {}
        }
    }

    pub fn file_name(&self, hash: i64) -> Option<&str> {
        self.file_hash_to_name.get(&hash).map(String::as_str)
    }

    pub fn host_name(&self, hash: i64) -> Option<&str> {
        self.host_hash_to_name.get(&hash).map(String::as_str)
    }

    pub fn string(&self, hash: i64) -> Option<&str> {
        self.string_hash_to_value.get(&hash).map(String::as_str)
    }

    pub fn process_name(&self, pid: i64) -> Option<&str> {
        self.pid_to_process_name.get(&pid).map(String::as_str)
    }
}
