// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Stateful streaming gzip/deflate decoder with the extra primitives the
//! checkpoint technique needs (priming, dictionary save/restore, block
//! boundary detection). See [`raw`] for the `unsafe` zlib FFI underneath;
//! everything here is safe.

pub(crate) mod raw;

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};

use raw::{FlushMode, RawInflater};

use crate::error::InflaterError;

/// Selects the expected framing of the compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Gzip,
    Zlib,
    Raw,
    /// Detect gzip vs. zlib from the stream's first byte (magic `0x1f`).
    Auto,
}

impl Framing {
    fn window_bits(self) -> i32 {
        match self {
            Framing::Gzip => raw::GZIP_WINDOW_BITS,
            Framing::Zlib => raw::ZLIB_WINDOW_BITS,
            Framing::Raw => raw::RAW_WINDOW_BITS,
            Framing::Auto => raw::AUTO_DETECT_WINDOW_BITS,
        }
    }
}

const INPUT_BUFFER_SIZE: usize = 64 * 1024;

/// Outcome of a single decode step, including indexer-relevant bookkeeping.
pub struct ReadOutcome {
    pub bytes_produced: usize,
    pub newlines: usize,
    pub stream_end: bool,
    /// Set only when the call was made with block-boundary awareness
    /// requested; true iff the decoder can be safely checkpointed right now.
    pub at_block_boundary: bool,
}

/// A decode session positioned within one open file. Owns its own input
/// buffer and file handle; never shared across [`crate::reader::Reader`]
/// instances (see the crate's shared-resources rule).
pub struct Inflater {
    file: File,
    raw: RawInflater,
    input_buf: Box<[u8]>,
    input_len: usize,
    input_pos: usize,
}

impl Inflater {
    /// Opens `file` positioned at `compressed_offset` and initializes a
    /// decode session with the given framing.
    pub fn initialize(
        mut file: File,
        compressed_offset: u64,
        framing: Framing,
    ) -> Result<Self, InflaterError> {
        file.seek(SeekFrom::Start(compressed_offset))?;
        let raw = RawInflater::new(framing.window_bits())?;
        Ok(Self {
            file,
            raw,
            input_buf: vec![0u8; INPUT_BUFFER_SIZE].into_boxed_slice(),
            input_len: 0,
            input_pos: 0,
        })
    }

    fn refill(&mut self) -> Result<bool, InflaterError> {
        if self.input_pos < self.input_len {
            return Ok(true);
        }
        let n = self.file.read(&mut self.input_buf)?;
        self.input_len = n;
        self.input_pos = 0;
        Ok(n > 0)
    }

    fn step(&mut self, out: &mut [u8], flush: FlushMode) -> Result<raw::StepOutcome, InflaterError> {
        self.refill()?;
        let input = &self.input_buf[self.input_pos..self.input_len];
        let outcome = self.raw.step(input, out, flush)?;
        self.input_pos += outcome.bytes_in;
        Ok(outcome)
    }

    /// Decompresses into `out`, returning the number of bytes written.
    /// Returns 0 once the stream has ended.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize, InflaterError> {
        Ok(self.read_and_count_lines(out)?.bytes_produced)
    }

    /// As [`read`](Self::read), also counting `'\n'` bytes produced.
    pub fn read_and_count_lines(&mut self, out: &mut [u8]) -> Result<ReadOutcome, InflaterError> {
        let outcome = self.step(out, FlushMode::NoFlush)?;
        let newlines = out[..outcome.bytes_out].iter().filter(|&&b| b == b'\n').count();
        Ok(ReadOutcome {
            bytes_produced: outcome.bytes_out,
            newlines,
            stream_end: outcome.stream_end,
            at_block_boundary: false,
        })
    }

    /// As [`read_and_count_lines`](Self::read_and_count_lines), additionally
    /// instructing the decoder to stop at deflate block boundaries so the
    /// caller can test [`ReadOutcome::at_block_boundary`] before attempting
    /// to extract a checkpoint.
    pub fn read_and_count_lines_with_blocks(
        &mut self,
        out: &mut [u8],
    ) -> Result<ReadOutcome, InflaterError> {
        let outcome = self.step(out, FlushMode::Block)?;
        let newlines = out[..outcome.bytes_out].iter().filter(|&&b| b == b'\n').count();
        Ok(ReadOutcome {
            bytes_produced: outcome.bytes_out,
            newlines,
            stream_end: outcome.stream_end,
            at_block_boundary: outcome.at_block_boundary,
        })
    }

    /// Decompresses and discards `n` bytes.
    pub fn skip(&mut self, mut n: u64) -> Result<(), InflaterError> {
        let mut scratch = vec![0u8; 64 * 1024];
        while n > 0 {
            let chunk = n.min(scratch.len() as u64) as usize;
            let produced = self.read(&mut scratch[..chunk])?;
            if produced == 0 {
                break;
            }
            n -= produced as u64;
        }
        Ok(())
    }

    /// Re-primes the decoder with `bits` leftover bits at the resume point.
    pub fn prime(&mut self, bits: u8, value: i32) -> Result<(), InflaterError> {
        self.raw.prime(bits, value)
    }

    /// Installs the 32 KiB sliding-window dictionary from a checkpoint.
    pub fn set_dictionary(&mut self, window: &[u8]) -> Result<(), InflaterError> {
        self.raw.set_dictionary(window)
    }

    /// Extracts the current sliding-window dictionary, for saving into a
    /// new checkpoint. Only meaningful right after a block-boundary step.
    pub fn get_dictionary(&mut self) -> Result<Vec<u8>, InflaterError> {
        self.raw.get_dictionary()
    }

    /// Leftover input bits not yet consumed — the `bits` value to persist
    /// alongside a checkpoint's compressed offset.
    pub fn leftover_bits(&self) -> u8 {
        self.raw.leftover_bits()
    }

    /// Absolute compressed-file offset of the next unconsumed input byte,
    /// i.e. the `c_offset` to persist for a checkpoint taken right now.
    pub fn compressed_offset(&mut self) -> Result<u64, InflaterError> {
        let pos = self.file.stream_position()?;
        Ok(pos - (self.input_len - self.input_pos) as u64)
    }

    pub fn total_uncompressed(&self) -> u64 {
        self.raw.total_out()
    }
}
