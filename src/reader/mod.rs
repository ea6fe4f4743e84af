// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Indexed random access over a gzip file: byte ranges, line-bounded byte
//! ranges, and whole-line ranges, all resuming from the nearest checkpoint
//! instead of decompressing from the start.

use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::instrument;

use crate::checkpoint::store::{decompress_window, CheckpointStore};
use crate::checkpoint::Checkpoint;
use crate::error::ReaderError;
use crate::indexer::Indexer;
use crate::inflater::{Framing, Inflater};

/// Bytes scanned backward from a line-read's start to snap to the previous
/// newline when no checkpoint boundary is available.
const LINE_LOOKBACK: u64 = 512;

/// An open byte-stream session resuming decompression from a checkpoint.
/// Not shared across [`Reader`] instances or threads (each `Reader` owns
/// its own `Inflater` and file handle). The checkpoint's dictionary window
/// is decompressed once, in [`Reader::open_session_at`], and held for the
/// rest of the session rather than being re-decompressed per read.
struct ByteStreamSession {
    inflater: Inflater,
    /// Uncompressed-stream position of the next byte the session will
    /// produce.
    cursor: u64,
    /// Any line-read trailing partial line carried over to the next call.
    carry: Vec<u8>,
}

/// Reads byte or line ranges out of an indexed gzip file.
pub struct Reader {
    gz_path: PathBuf,
    store: CheckpointStore,
    file_id: i64,
    max_bytes: u64,
    num_lines: u64,
    session: Option<ByteStreamSession>,
}

impl Reader {
    /// Opens a reader against `gz_path`/`idx_path`, building the index first
    /// if it doesn't exist or is stale.
    pub fn open(
        gz_path: impl Into<PathBuf>,
        idx_path: impl AsRef<Path>,
        checkpoint_stride_bytes: u64,
    ) -> Result<Self, ReaderError> {
        let gz_path = gz_path.into();
        let indexer = Indexer::new(&gz_path, idx_path.as_ref(), checkpoint_stride_bytes, false)
            .map_err(|e| ReaderError::InvalidArgument(e.to_string()))?;
        indexer
            .build()
            .map_err(|e| ReaderError::InvalidArgument(e.to_string()))?;

        let store = CheckpointStore::open(idx_path.as_ref())?;
        let logical_name = gz_path.to_string_lossy().into_owned();
        let file = store
            .get_file(&logical_name)?
            .ok_or_else(|| ReaderError::InvalidArgument("no index entry for file".into()))?;
        let max_bytes = store.query_max_uc_bytes(file.id)?;
        let num_lines = store
            .get_metadata(file.id)?
            .map(|m| m.total_lines)
            .unwrap_or(0);

        Ok(Self {
            gz_path,
            store,
            file_id: file.id,
            max_bytes,
            num_lines,
            session: None,
        })
    }

    pub fn get_max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn get_num_lines(&self) -> u64 {
        self.num_lines
    }

    /// Discards any in-flight stream state; the next read re-seeks from a
    /// checkpoint.
    pub fn reset(&mut self) {
        self.session = None;
    }

    fn load_checkpoint(&self, target_uc_offset: u64) -> Result<Checkpoint, ReaderError> {
        self.store
            .find_checkpoint(self.file_id, target_uc_offset)?
            .ok_or(ReaderError::InvalidArgument(
                "no checkpoint covers this offset".into(),
            ))
    }

    fn open_session_at(&mut self, start: u64) -> Result<(), ReaderError> {
        let checkpoint = self.load_checkpoint(start)?;
        let file = File::open(&self.gz_path)?;
        // Checkpoint 0 sits at the gzip header itself (no dictionary yet);
        // every later checkpoint resumes mid-deflate-stream, which requires
        // raw framing primed with the saved bit/dictionary state.
        let mut inflater = if checkpoint.checkpoint_idx == 0 {
            Inflater::initialize(file, checkpoint.c_offset, Framing::Gzip)?
        } else {
            let mut inflater = Inflater::initialize(file, checkpoint.c_offset, Framing::Raw)?;
            if checkpoint.bits > 0 {
                inflater.prime(checkpoint.bits, 0)?;
            }
            if !checkpoint.dict_compressed.is_empty() {
                let window = decompress_window(&checkpoint.dict_compressed)?;
                inflater.set_dictionary(&window)?;
            }
            inflater
        };
        let skip = start.saturating_sub(checkpoint.uc_offset);
        inflater.skip(skip)?;
        self.session = Some(ByteStreamSession {
            inflater,
            cursor: start,
            carry: Vec::new(),
        });
        Ok(())
    }

    /// Raw byte-range streaming read: may be called repeatedly with a
    /// growing `start` until it returns 0. Ranges are clamped to
    /// `[0, get_max_bytes())`; `start >= end` is rejected.
    #[instrument(skip(self, buf))]
    pub fn read(&mut self, start: u64, end: u64, buf: &mut [u8]) -> Result<usize, ReaderError> {
        if start >= end {
            return Err(ReaderError::InvalidArgument(
                "start must be less than end".into(),
            ));
        }
        let end = end.min(self.max_bytes);
        if start >= end {
            return Ok(0);
        }
        let need_new_session = match &self.session {
            Some(s) => s.cursor != start,
            None => true,
        };
        if need_new_session {
            self.open_session_at(start)?;
        }
        let session = self.session.as_mut().expect("just opened");
        let want = (end - start).min(buf.len() as u64) as usize;
        let produced = session.inflater.read(&mut buf[..want])?;
        session.cursor += produced as u64;
        Ok(produced)
    }

    /// As [`read`](Self::read), but the returned data always ends on a
    /// `'\n'`; any trailing partial line is buffered for the next call. The
    /// first call additionally performs a lookback to snap `start` onto a
    /// line boundary.
    pub fn read_line_bytes(
        &mut self,
        start: u64,
        end: u64,
        buf: &mut Vec<u8>,
    ) -> Result<usize, ReaderError> {
        if start >= end {
            return Err(ReaderError::InvalidArgument(
                "start must be less than end".into(),
            ));
        }
        let end = end.min(self.max_bytes);
        if start >= end {
            return Ok(0);
        }

        let aligned_start = self.snap_to_line_start(start)?;
        let need_new_session = match &self.session {
            Some(s) => s.cursor != aligned_start,
            None => true,
        };
        if need_new_session {
            self.open_session_at(aligned_start)?;
        }

        let session = self.session.as_mut().expect("just opened");
        let mut carry = std::mem::take(&mut session.carry);
        let mut scratch = vec![0u8; (end - aligned_start).min(256 * 1024) as u64 as usize];
        let mut total = 0usize;
        buf.clear();
        buf.append(&mut carry);

        loop {
            let remaining = end.saturating_sub(session.cursor);
            if remaining == 0 {
                break;
            }
            let want = remaining.min(scratch.len() as u64) as usize;
            let produced = session.inflater.read(&mut scratch[..want])?;
            if produced == 0 {
                break;
            }
            session.cursor += produced as u64;
            buf.extend_from_slice(&scratch[..produced]);
            total += produced;
        }

        match buf.iter().rposition(|&b| b == b'\n') {
            Some(pos) => {
                let trailing = buf.split_off(pos + 1);
                session.carry = trailing;
            }
            None => {
                // No newline at all in this chunk: everything is a partial
                // line, carried entirely to the next call.
                session.carry = std::mem::take(buf);
            }
        }
        Ok(total)
    }

    fn snap_to_line_start(&mut self, start: u64) -> Result<u64, ReaderError> {
        if start == 0 {
            return Ok(0);
        }
        let lookback_start = start.saturating_sub(LINE_LOOKBACK);
        let mut probe = vec![0u8; (start - lookback_start) as usize];
        let produced = self.read(lookback_start, start, &mut probe)?;
        self.reset();
        match probe[..produced].iter().rposition(|&b| b == b'\n') {
            Some(pos) => Ok(lookback_start + pos as u64 + 1),
            None => Ok(lookback_start),
        }
    }

    /// Returns exactly the concatenation of complete lines
    /// `[start_line, end_line]` (1-based, inclusive), newline terminators
    /// included.
    #[instrument(skip(self))]
    pub fn read_lines(&mut self, start_line: u64, end_line: u64) -> Result<Vec<u8>, ReaderError> {
        if start_line == 0 || start_line > end_line {
            return Err(ReaderError::InvalidArgument(
                "start_line must be >= 1 and <= end_line".into(),
            ));
        }
        let checkpoints = self
            .store
            .get_checkpoints_by_line_range(self.file_id, start_line, end_line)?;

        let (byte_start, first_line_of_range) = match checkpoints.first() {
            Some(first) if first.checkpoint_idx > 0 => {
                let prev = self
                    .store
                    .find_checkpoint(self.file_id, first.uc_offset.saturating_sub(1))?
                    .ok_or(ReaderError::InvalidArgument(
                        "missing predecessor checkpoint".into(),
                    ))?;
                (prev.uc_offset, prev.last_line_num + 1)
            }
            Some(first) => (first.uc_offset, 1),
            None => (0, 1),
        };

        let byte_end = match checkpoints.last() {
            Some(last) => (last.uc_offset + last.uc_size).min(self.max_bytes),
            None => self.max_bytes,
        };

        self.reset();
        self.open_session_at(byte_start)?;
        let mut raw = Vec::with_capacity((byte_end - byte_start) as usize);
        let mut scratch = vec![0u8; 256 * 1024];
        loop {
            let session = self.session.as_mut().expect("just opened");
            if session.cursor >= byte_end {
                break;
            }
            let want = (byte_end - session.cursor).min(scratch.len() as u64) as usize;
            let produced = session.inflater.read(&mut scratch[..want])?;
            if produced == 0 {
                break;
            }
            session.cursor += produced as u64;
            raw.extend_from_slice(&scratch[..produced]);
        }
        self.reset();

        let mut line_no = first_line_of_range;
        let mut line_start_byte = 0usize;
        let mut out_start: Option<usize> = None;
        let mut out_end: Option<usize> = None;
        for (i, &b) in raw.iter().enumerate() {
            if b != b'\n' {
                continue;
            }
            if line_no == start_line && out_start.is_none() {
                out_start = Some(line_start_byte);
            }
            if line_no == end_line {
                out_end = Some(i + 1);
                break;
            }
            line_no += 1;
            line_start_byte = i + 1;
        }

        match (out_start, out_end) {
            (Some(s), Some(e)) => Ok(raw[s..e].to_vec()),
            (Some(s), None) => Ok(raw[s..].to_vec()),
            _ => Ok(Vec::new()),
        }
    }
}
