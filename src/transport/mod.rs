// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Blocking point-to-point and collective transport for the distributed
//! executor. Process bootstrap (spawning ranks, wiring up a real MPI
//! communicator) is out of scope; [`LoopbackTransport`] models ranks as
//! in-process threads over bounded channels, enough to exercise and test
//! [`crate::executor::DistributedExecutor`] deterministically.

mod loopback;
mod payload;

pub use loopback::{LoopbackHub, LoopbackTransport};
pub use payload::Payload;

use crate::error::TransportError;

/// A rank's view of a communicator: point-to-point `send`/`recv` tagged by
/// destination/source and an opaque `tag` (the distributed executor uses the
/// producing task's id), plus `barrier`/`broadcast` collectives.
pub trait Transport: Send + Sync {
    /// This process's rank, in `0..size()`.
    fn rank(&self) -> usize;

    /// The total number of ranks in the communicator.
    fn size(&self) -> usize;

    /// Blocks until every rank has called `barrier`.
    fn barrier(&self);

    /// Sends `payload` to `dest`, tagged `tag`. Non-blocking for the caller
    /// once the message is handed to the transport.
    fn send(&self, payload: &Payload, dest: usize, tag: u64) -> Result<(), TransportError>;

    /// Blocks until a message tagged `tag` from `src` is available, then
    /// returns it. Messages with other tags arriving first are buffered.
    fn recv(&self, src: usize, tag: u64) -> Result<Payload, TransportError>;

    /// Every rank calls `broadcast` with the same `root`; the value supplied
    /// by `root` is returned to all ranks, `root` included.
    fn broadcast(&self, payload: Payload, root: usize) -> Result<Payload, TransportError>;

    /// Signals every rank that the collective has failed. Ranks blocked in
    /// `recv` wake with `TransportError::CollectiveAborted` instead of
    /// hanging forever on a message that will never arrive.
    fn abort(&self);
}
