// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scans a gzip file once and builds its sidecar checkpoint index.

use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::checkpoint::store::{compress_window, CheckpointStore};
use crate::checkpoint::{Checkpoint, FileMetadataRecord};
use crate::error::IndexerError;
use crate::inflater::{Framing, Inflater};

const DECODE_BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of a [`Indexer::build`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// An up-to-date index already existed; no work was performed.
    AlreadyValid,
    /// A new index was built (and any stale one replaced).
    Built { checkpoints: u64, total_lines: u64 },
}

/// Builds (or reuses) the sidecar index for one gzip file.
pub struct Indexer {
    gz_path: PathBuf,
    idx_path: PathBuf,
    checkpoint_stride_bytes: u64,
    force_rebuild: bool,
}

impl Indexer {
    pub fn new(
        gz_path: impl Into<PathBuf>,
        idx_path: impl Into<PathBuf>,
        checkpoint_stride_bytes: u64,
        force_rebuild: bool,
    ) -> Result<Self, IndexerError> {
        if checkpoint_stride_bytes == 0 {
            return Err(IndexerError::InvalidArgument(
                "checkpoint_stride_bytes must be non-zero".into(),
            ));
        }
        let gz_path = gz_path.into();
        if !gz_path.is_file() {
            return Err(IndexerError::InvalidArgument(format!(
                "{} is not a file",
                gz_path.display()
            )));
        }
        Ok(Self {
            gz_path,
            idx_path: idx_path.into(),
            checkpoint_stride_bytes,
            force_rebuild,
        })
    }

    fn logical_name(&self) -> String {
        self.gz_path.to_string_lossy().into_owned()
    }

    fn file_identity(path: &Path) -> Result<(u64, i64, String), IndexerError> {
        let meta = std::fs::metadata(path)?;
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        let mut file = File::open(path)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok((meta.len(), mtime, hex::encode(hasher.finalize())))
    }

    /// Runs the build algorithm described in the crate's component design:
    /// skip if already valid, otherwise scan the file once emitting
    /// best-effort checkpoints at each safe block boundary past the
    /// configured stride, and commit metadata atomically at the end.
    #[instrument(skip(self), fields(gz_path = %self.gz_path.display()))]
    pub fn build(&self) -> Result<BuildOutcome, IndexerError> {
        let (byte_size, mtime, sha256) = Self::file_identity(&self.gz_path)?;
        let logical_name = self.logical_name();

        let mut store = CheckpointStore::open(&self.idx_path)?;
        if !self.force_rebuild
            && store.is_schema_valid()?
            && store.file_matches(&logical_name, byte_size, mtime, &sha256)?
        {
            return Ok(BuildOutcome::AlreadyValid);
        }

        if let Some(existing) = store.get_file(&logical_name)? {
            store.cleanup(existing.id)?;
        }

        let file = File::open(&self.gz_path)?;
        let mut inflater = Inflater::initialize(file, 0, Framing::Gzip)?;

        let tx = store.begin()?;
        let file_id = CheckpointStore::insert_file(&tx, &logical_name, byte_size, mtime, &sha256)?;

        // Edge case (a): an empty file gets a files/metadata row with zero
        // totals and no checkpoints at all.
        if byte_size == 0 {
            CheckpointStore::insert_metadata(
                &tx,
                FileMetadataRecord {
                    file_id,
                    checkpoint_size: self.checkpoint_stride_bytes,
                    total_lines: 0,
                    total_uc_size: 0,
                },
            )?;
            tx.commit()?;
            return Ok(BuildOutcome::Built {
                checkpoints: 0,
                total_lines: 0,
            });
        }

        let mut checkpoints: Vec<Checkpoint> = Vec::new();
        let mut checkpoint_idx: u64 = 0;
        let mut uc_offset: u64 = 0;
        let mut total_lines: u64 = 0;
        let mut pending_lines: u64 = 0;
        let mut pending_last_line: u64 = 0;
        let mut last_checkpoint_uc_offset: Option<u64> = None;
        let mut out = vec![0u8; DECODE_BUFFER_SIZE];

        // First checkpoint always taken at the very start of the stream.
        {
            let c_offset = inflater.compressed_offset()?;
            checkpoints.push(Checkpoint {
                file_id,
                checkpoint_idx,
                uc_offset: 0,
                uc_size: 0,
                c_offset,
                c_size: 0,
                bits: 0,
                dict_compressed: Vec::new(),
                num_lines: 0,
                last_line_num: 0,
            });
            last_checkpoint_uc_offset = Some(0);
            checkpoint_idx += 1;
        }

        loop {
            let step = inflater.read_and_count_lines_with_blocks(&mut out)?;
            uc_offset += step.bytes_produced as u64;
            pending_lines += step.newlines as u64;
            total_lines += step.newlines as u64;
            pending_last_line += step.newlines as u64;

            if step.stream_end {
                break;
            }

            let far_enough = match last_checkpoint_uc_offset {
                Some(prev) => uc_offset.saturating_sub(prev) >= self.checkpoint_stride_bytes,
                None => true,
            };

            if step.at_block_boundary && far_enough {
                match (inflater.get_dictionary(), inflater.compressed_offset()) {
                    (Ok(window), Ok(c_offset)) => {
                        let bits = inflater.leftover_bits();
                        let dict_compressed = compress_window(&window)
                            .map_err(|e| IndexerError::InvalidArgument(e.to_string()))?;
                        if let Some(prev) = checkpoints.last_mut() {
                            prev.num_lines = pending_lines;
                            prev.last_line_num = pending_last_line;
                        }
                        checkpoints.push(Checkpoint {
                            file_id,
                            checkpoint_idx,
                            uc_offset,
                            uc_size: 0,
                            c_offset,
                            c_size: 0,
                            bits,
                            dict_compressed,
                            num_lines: 0,
                            last_line_num: pending_last_line,
                        });
                        checkpoint_idx += 1;
                        last_checkpoint_uc_offset = Some(uc_offset);
                        pending_lines = 0;
                    }
                    _ => {
                        // Decoder state wasn't stable enough to extract a
                        // dictionary at this boundary; best-effort, so we
                        // simply try again at the next one.
                        debug!(uc_offset, "skipping checkpoint: dictionary unavailable");
                    }
                }
            }
        }

        if let Some(last) = checkpoints.last_mut() {
            last.uc_size = uc_offset - last.uc_offset;
            last.num_lines = pending_lines;
            last.last_line_num = pending_last_line;
        }
        for i in 0..checkpoints.len().saturating_sub(1) {
            checkpoints[i].uc_size = checkpoints[i + 1].uc_offset - checkpoints[i].uc_offset;
        }

        for checkpoint in &checkpoints {
            CheckpointStore::insert_checkpoint(&tx, checkpoint)?;
        }
        CheckpointStore::insert_metadata(
            &tx,
            FileMetadataRecord {
                file_id,
                checkpoint_size: self.checkpoint_stride_bytes,
                total_lines,
                total_uc_size: uc_offset,
            },
        )?;
        tx.commit()?;

        Ok(BuildOutcome::Built {
            checkpoints: checkpoints.len() as u64,
            total_lines,
        })
    }
}
