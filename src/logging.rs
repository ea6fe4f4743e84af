// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Global logging setup for the `dft-*` binaries. Installs a single
//! `tracing_subscriber` once per process; calling it more than once is a
//! no-op rather than a panic, so tests and library embedders can call it
//! freely.

use tracing_subscriber::EnvFilter;

/// Default level when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info";

/// Installs the global tracing subscriber. `RUST_LOG` (standard
/// `tracing_subscriber::EnvFilter` syntax, e.g. `dftracer_utils=debug`)
/// overrides [`DEFAULT_FILTER`] when set.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// As [`init`], but emits newline-delimited JSON records instead of the
/// human-readable default, for log aggregation in distributed runs.
pub fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init();
}
