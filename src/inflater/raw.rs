// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Direct, `unsafe`-isolated wrapper over zlib's `z_stream` C API.
//!
//! The safe subset of `flate2` does not expose `inflatePrime`,
//! `inflateGetDictionary`/`inflateSetDictionary`, or `Z_BLOCK` flush, all of
//! which the checkpoint technique in [`super`] needs. Everything `unsafe`
//! lives in this module; `RawInflater` itself is safe to construct, drive,
//! and drop.

use std::mem::MaybeUninit;
use std::os::raw::{c_int, c_uint};

use libz_sys as zlib;

use crate::error::InflaterError;

/// `windowBits` value requesting zlib auto-detect gzip vs. zlib framing from
/// the stream's first byte.
pub const AUTO_DETECT_WINDOW_BITS: i32 = 47; // 15 | 32, per zlib convention

/// Plain zlib/deflate framing, 32 KiB window.
pub const RAW_WINDOW_BITS: i32 = -15;

/// zlib-wrapped framing, 32 KiB window.
pub const ZLIB_WINDOW_BITS: i32 = 15;

/// Gzip framing, 32 KiB window.
pub const GZIP_WINDOW_BITS: i32 = 15 + 16;

/// Size of the sliding-window dictionary zlib maintains internally.
pub const WINDOW_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    NoFlush,
    /// Stop as soon as possible at a point where output can be flushed and
    /// the current deflate block boundary is known (`data_type` low bits).
    Block,
}

impl FlushMode {
    fn as_raw(self) -> c_int {
        match self {
            FlushMode::NoFlush => zlib::Z_NO_FLUSH,
            FlushMode::Block => zlib::Z_BLOCK,
        }
    }
}

/// Outcome of a single `inflate()` call.
pub struct StepOutcome {
    pub bytes_in: usize,
    pub bytes_out: usize,
    pub stream_end: bool,
    /// True iff zlib reports it is sitting at the end of a deflate block
    /// (not the final one) with no output pending — the only point at
    /// which priming/dictionary extraction are well-defined.
    pub at_block_boundary: bool,
}

/// Safe-to-hold wrapper around a zlib `z_stream` configured for inflate.
pub struct RawInflater {
    stream: Box<zlib::z_stream>,
}

// zlib streams don't reference thread-local state; ownership is exclusive
// via `&mut self` on every call that touches `stream`.
unsafe impl Send for RawInflater {}

impl RawInflater {
    pub fn new(window_bits: i32) -> Result<Self, InflaterError> {
        // SAFETY: `z_stream` is zero-initialized per zlib's documented
        // contract for fields not touched before `inflateInit2_`; zalloc/
        // zfree/opaque being null tells zlib to use its default allocator.
        let mut stream: Box<zlib::z_stream> =
            unsafe { Box::new(MaybeUninit::zeroed().assume_init()) };
        let rc = unsafe {
            zlib::inflateInit2_(
                stream.as_mut(),
                window_bits as c_int,
                zlib::zlibVersion(),
                std::mem::size_of::<zlib::z_stream>() as c_int,
            )
        };
        if rc != zlib::Z_OK {
            return Err(InflaterError::Decoder(format!(
                "inflateInit2_ failed with code {rc}"
            )));
        }
        Ok(Self { stream })
    }

    /// Runs one `inflate()` step. `input`/`output` define the buffers for
    /// this call only; the stream keeps no references beyond the call.
    pub fn step(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<StepOutcome, InflaterError> {
        self.stream.next_in = input.as_ptr() as *mut u8;
        self.stream.avail_in = input.len() as c_uint;
        self.stream.next_out = output.as_mut_ptr();
        self.stream.avail_out = output.len() as c_uint;

        // SAFETY: next_in/avail_in and next_out/avail_out are set above to
        // valid, appropriately sized slices that outlive this call.
        let rc = unsafe { zlib::inflate(self.stream.as_mut(), flush.as_raw()) };

        let bytes_in = input.len() - self.stream.avail_in as usize;
        let bytes_out = output.len() - self.stream.avail_out as usize;

        match rc {
            zlib::Z_OK | zlib::Z_BUF_ERR => {
                // data_type bit 7 (0x80): at end of a block. Bit 6 (0x40):
                // inside a gzip header/trailer, not a data block boundary.
                let data_type = self.stream.data_type;
                let at_block_boundary =
                    bytes_out == 0 && (data_type & 0x80) != 0 && (data_type & 0x40) == 0;
                Ok(StepOutcome {
                    bytes_in,
                    bytes_out,
                    stream_end: false,
                    at_block_boundary,
                })
            }
            zlib::Z_STREAM_END => Ok(StepOutcome {
                bytes_in,
                bytes_out,
                stream_end: true,
                at_block_boundary: false,
            }),
            other => Err(InflaterError::Decoder(format!(
                "inflate failed with code {other}"
            ))),
        }
    }

    /// Re-primes the decoder with `bits` leftover bits from the previous
    /// byte, as saved in a checkpoint.
    pub fn prime(&mut self, bits: u8, value: i32) -> Result<(), InflaterError> {
        if bits == 0 {
            return Ok(());
        }
        // SAFETY: `self.stream` is a live, initialized z_stream.
        let rc = unsafe { zlib::inflatePrime(self.stream.as_mut(), bits as c_int, value) };
        if rc != zlib::Z_OK {
            return Err(InflaterError::Decoder(format!(
                "inflatePrime failed with code {rc}"
            )));
        }
        Ok(())
    }

    /// Installs `dict` (up to [`WINDOW_SIZE`] bytes) as the decoder's
    /// sliding-window history, as saved in a checkpoint.
    pub fn set_dictionary(&mut self, dict: &[u8]) -> Result<(), InflaterError> {
        // SAFETY: `dict` outlives the call; zlib copies the bytes it needs.
        let rc = unsafe {
            zlib::inflateSetDictionary(self.stream.as_mut(), dict.as_ptr(), dict.len() as c_uint)
        };
        if rc != zlib::Z_OK {
            return Err(InflaterError::Decoder(format!(
                "inflateSetDictionary failed with code {rc}"
            )));
        }
        Ok(())
    }

    /// Retrieves up to [`WINDOW_SIZE`] bytes of the decoder's current
    /// sliding-window history, for saving into a checkpoint.
    pub fn get_dictionary(&mut self) -> Result<Vec<u8>, InflaterError> {
        let mut buf = vec![0u8; WINDOW_SIZE];
        let mut len: c_uint = 0;
        // SAFETY: `buf` has capacity WINDOW_SIZE, matching zlib's documented
        // maximum dictionary size; `len` receives the actual length used.
        let rc = unsafe {
            zlib::inflateGetDictionary(self.stream.as_mut(), buf.as_mut_ptr(), &mut len)
        };
        if rc != zlib::Z_OK {
            return Err(InflaterError::Decoder(format!(
                "inflateGetDictionary failed with code {rc}"
            )));
        }
        buf.truncate(len as usize);
        Ok(buf)
    }

    /// Number of leftover input bits not yet consumed by `inflate`, i.e.
    /// the `bits` value to save alongside a checkpoint's `c_offset`.
    pub fn leftover_bits(&self) -> u8 {
        // data_type's low 6 bits hold the number of unused input bits.
        (self.stream.data_type & 0x3f) as u8
    }

    pub fn total_in(&self) -> u64 {
        self.stream.total_in as u64
    }

    pub fn total_out(&self) -> u64 {
        self.stream.total_out as u64
    }
}

impl Drop for RawInflater {
    fn drop(&mut self) {
        // SAFETY: `self.stream` was initialized by `inflateInit2_` in `new`
        // and is not used after this call.
        unsafe {
            zlib::inflateEnd(self.stream.as_mut());
        }
    }
}
