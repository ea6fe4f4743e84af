// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data model for the on-disk sidecar index: file identity, per-file
//! summary metadata, and the checkpoints themselves.

pub mod store;

pub use store::CheckpointStore;

/// One row of the `files` table: identity of an indexed gzip file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub logical_name: String,
    pub byte_size: u64,
    pub mtime: i64,
    pub sha256: String,
}

/// One row of the `metadata` table: exactly one per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadataRecord {
    pub file_id: i64,
    pub checkpoint_size: u64,
    pub total_lines: u64,
    pub total_uc_size: u64,
}

/// One row of the `checkpoints` table: a saved decoder state.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub file_id: i64,
    pub checkpoint_idx: u64,
    pub uc_offset: u64,
    pub uc_size: u64,
    pub c_offset: u64,
    pub c_size: u64,
    pub bits: u8,
    /// The 32 KiB sliding-window dictionary, stored deflate-compressed.
    pub dict_compressed: Vec<u8>,
    pub num_lines: u64,
    pub last_line_num: u64,
}
