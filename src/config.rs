// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI-facing configuration structures, serializable for on-disk config
//! files and mirroring the argument shapes the `dft-*` binaries expose.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Checkpoint stride used when an index must be (re)built, in bytes.
const DEFAULT_CHECKPOINT_STRIDE_BYTES: u64 = 1024 * 1024;

/// Arguments shared by `dft-index` and `dft-reader`: which file, which
/// sidecar index, and whether to force a rebuild.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexerConfig {
    pub file: PathBuf,
    pub index_file: Option<PathBuf>,
    pub checkpoint_stride_bytes: u64,
    pub force: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            file: PathBuf::new(),
            index_file: None,
            checkpoint_stride_bytes: DEFAULT_CHECKPOINT_STRIDE_BYTES,
            force: false,
        }
    }
}

impl IndexerConfig {
    /// Resolves the sidecar index path: the configured override, or
    /// `<file>.dftidx` next to the traced file.
    pub fn resolved_index_path(&self) -> PathBuf {
        match &self.index_file {
            Some(path) => path.clone(),
            None => {
                let mut path = self.file.as_os_str().to_owned();
                path.push(".dftidx");
                PathBuf::from(path)
            }
        }
    }
}

/// `dft-reader`'s ad hoc read request: a byte or line range against an
/// already-built index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReadRequest {
    pub start: u64,
    pub end: Option<u64>,
    pub by_line: bool,
}

/// `dft-analyze`'s argument shape: which files, which view types, the
/// time-bucket granularity, and optional checkpoint caching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub files: Vec<PathBuf>,
    pub view_types: Vec<String>,
    pub time_granularity: f64,
    pub checkpoint: bool,
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            view_types: Vec::new(),
            time_granularity: 1_000_000.0,
            checkpoint: false,
            checkpoint_dir: None,
        }
    }
}

impl AnalyzerConfig {
    /// The directory to consult/populate for a cached run, if checkpointing
    /// is enabled; defaults to `.dft_checkpoints` in the working directory.
    pub fn resolved_checkpoint_dir(&self) -> Option<PathBuf> {
        if !self.checkpoint {
            return None;
        }
        Some(
            self.checkpoint_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(".dft_checkpoints")),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexer_config_defaults_to_sidecar_path() {
        let config = IndexerConfig {
            file: PathBuf::from("/traces/rank0.pfw.gz"),
            ..Default::default()
        };
        assert_eq!(
            config.resolved_index_path(),
            PathBuf::from("/traces/rank0.pfw.gz.dftidx")
        );
    }

    #[test]
    fn analyzer_config_checkpoint_dir_is_none_unless_enabled() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.resolved_checkpoint_dir(), None);

        let config = AnalyzerConfig {
            checkpoint: true,
            ..Default::default()
        };
        assert_eq!(
            config.resolved_checkpoint_dir(),
            Some(PathBuf::from(".dft_checkpoints"))
        );
    }
}
