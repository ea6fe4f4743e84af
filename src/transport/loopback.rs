// Copyright 2019-2025 DFTracer-Utils Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process stand-in for a real MPI/socket transport: every rank is a
//! thread, every rank's inbox is a `flume::unbounded` channel, and `barrier`
//! is a `std::sync::Barrier`. Sufficient to exercise and test
//! `DistributedExecutor` deterministically without bootstrapping real
//! processes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use parking_lot::Mutex;

use super::{Payload, Transport};
use crate::error::TransportError;

/// Reserved tag used internally by [`LoopbackTransport::broadcast`]. Task ids
/// used as tags by the distributed executor are always `< u64::MAX`, so this
/// never collides with a real send/recv pair.
const BROADCAST_TAG: u64 = u64::MAX;

/// How often a blocked `recv` wakes to check whether the collective has
/// been aborted by another rank.
const ABORT_POLL_INTERVAL: Duration = Duration::from_millis(20);

struct Envelope {
    src: usize,
    tag: u64,
    payload: Payload,
}

/// Shared mailbox state for one `LoopbackTransport` communicator. Construct
/// once per simulated run and hand each rank its [`Transport`] via
/// [`LoopbackHub::transport`].
pub struct LoopbackHub {
    size: usize,
    inboxes: Vec<(flume::Sender<Envelope>, flume::Receiver<Envelope>)>,
    barrier: Barrier,
    aborted: AtomicBool,
}

impl LoopbackHub {
    pub fn new(size: usize) -> Arc<Self> {
        let inboxes = (0..size).map(|_| flume::unbounded()).collect();
        Arc::new(Self {
            size,
            inboxes,
            barrier: Barrier::new(size),
            aborted: AtomicBool::new(false),
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns the `Transport` handle for `rank`. Each rank's handle must be
    /// moved into the thread that drives it; the hub itself is shared via
    /// `Arc`.
    pub fn transport(self: &Arc<Self>, rank: usize) -> LoopbackTransport {
        LoopbackTransport {
            hub: self.clone(),
            rank,
            pending: Mutex::new(Vec::new()),
        }
    }
}

pub struct LoopbackTransport {
    hub: Arc<LoopbackHub>,
    rank: usize,
    /// Envelopes received out of tag order, buffered until a matching
    /// `recv(src, tag)` call claims them.
    pending: Mutex<Vec<Envelope>>,
}

impl Transport for LoopbackTransport {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.hub.size
    }

    fn barrier(&self) {
        self.hub.barrier.wait();
    }

    fn send(&self, payload: &Payload, dest: usize, tag: u64) -> Result<(), TransportError> {
        if dest >= self.hub.size {
            return Err(TransportError::RankOutOfRange(dest, self.hub.size));
        }
        let envelope = Envelope {
            src: self.rank,
            tag,
            payload: payload.clone(),
        };
        self.hub.inboxes[dest]
            .0
            .send(envelope)
            .map_err(|_| TransportError::ChannelClosed)
    }

    fn recv(&self, src: usize, tag: u64) -> Result<Payload, TransportError> {
        {
            let mut pending = self.pending.lock();
            if let Some(pos) = pending.iter().position(|e| e.src == src && e.tag == tag) {
                return Ok(pending.remove(pos).payload);
            }
        }
        loop {
            if self.hub.aborted.load(Ordering::Acquire) {
                return Err(TransportError::CollectiveAborted(
                    "another rank reported a task failure".into(),
                ));
            }
            let envelope = match self.hub.inboxes[self.rank].1.recv_timeout(ABORT_POLL_INTERVAL) {
                Ok(envelope) => envelope,
                Err(flume::RecvTimeoutError::Timeout) => continue,
                Err(flume::RecvTimeoutError::Disconnected) => {
                    return Err(TransportError::ChannelClosed)
                }
            };
            if envelope.src == src && envelope.tag == tag {
                return Ok(envelope.payload);
            }
            self.pending.lock().push(envelope);
        }
    }

    fn broadcast(&self, payload: Payload, root: usize) -> Result<Payload, TransportError> {
        if root >= self.hub.size {
            return Err(TransportError::RankOutOfRange(root, self.hub.size));
        }
        if self.rank == root {
            for dest in 0..self.hub.size {
                if dest != root {
                    self.send(&payload, dest, BROADCAST_TAG)?;
                }
            }
            Ok(payload)
        } else {
            self.recv(root, BROADCAST_TAG)
        }
    }

    fn abort(&self) {
        self.hub.aborted.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_to_point_round_trip() {
        let hub = LoopbackHub::new(2);
        let a = hub.transport(0);
        let b = hub.transport(1);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                a.send(&Payload::I64(7), 1, 42).unwrap();
            });
            scope.spawn(|| {
                let got = b.recv(0, 42).unwrap();
                assert!(matches!(got, Payload::I64(7)));
            });
        });
    }

    #[test]
    fn broadcast_reaches_every_rank() {
        let hub = LoopbackHub::new(3);
        let transports: Vec<_> = (0..3).map(|r| hub.transport(r)).collect();
        std::thread::scope(|scope| {
            for t in &transports {
                scope.spawn(move || {
                    let got = t.broadcast(Payload::Str("hello".into()), 0).unwrap();
                    assert!(matches!(got, Payload::Str(ref s) if s == "hello"));
                });
            }
        });
    }

    #[test]
    fn barrier_releases_all_ranks() {
        let hub = LoopbackHub::new(4);
        let transports: Vec<_> = (0..4).map(|r| hub.transport(r)).collect();
        std::thread::scope(|scope| {
            for t in &transports {
                scope.spawn(move || t.barrier());
            }
        });
    }
}
