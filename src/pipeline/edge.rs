//! Backpressure-gated connection between two stages.
//!
//! An [`Edge`] is the only object touched by two stages: the producer calls
//! [`Edge::offer`], the consumer pulls with [`Edge::recv`] and reports progress
//! with [`Edge::acknowledge`]. A chunk counts against the high-water mark from
//! the moment it is offered until it is acknowledged, so "buffered" covers
//! both queued chunks and the one the consumer is working on. An empty chunk
//! still weighs one unit: a flood of blank lines has to block too.
//!
//! ```text
//!            offer ──► [ queue | in flight ] ──► recv / acknowledge
//!   producer ◄── ready (resume) ─────────────────────┘
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;

use crate::chunk::{Chunk, Payload};
use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::stage::StageId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) usize);

impl EdgeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "edge#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeState {
    Open,
    Blocked,
    Closed,
}

/// Counters collected over the lifetime of one edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeStats {
    pub id: EdgeId,
    pub upstream: StageId,
    pub downstream: StageId,
    pub high_water_mark: usize,
    pub state: EdgeState,
    pub buffered: usize,
    pub offered: u64,
    pub acknowledged: u64,
    /// Open → Blocked transitions.
    pub blocked: u64,
    /// Blocked → Open transitions; equals `blocked` unless the edge closed
    /// while blocked.
    pub resumed: u64,
    pub peak_buffered: usize,
    pub largest_chunk: usize,
}

struct Gate<T> {
    queue: VecDeque<Chunk<T>>,
    state: EdgeState,
    ended: bool,
    next_sequence: u64,
    stats: EdgeStats,
}

pub struct Edge<T> {
    gate: Mutex<Gate<T>>,
    /// Wakes the consumer: new chunk, end of stream or close.
    readable: Notify,
    /// Wakes the producer: resume after a block, or close.
    writable: Notify,
    /// Wakes a producer waiting for the consumer to catch up completely.
    progress: Notify,
}

impl<T: Payload> Edge<T> {
    pub(crate) fn new(
        id: EdgeId,
        upstream: StageId,
        downstream: StageId,
        high_water_mark: usize,
    ) -> Self {
        Self {
            gate: Mutex::new(Gate {
                queue: VecDeque::new(),
                state: EdgeState::Open,
                ended: false,
                next_sequence: 0,
                stats: EdgeStats {
                    id,
                    upstream,
                    downstream,
                    high_water_mark,
                    state: EdgeState::Open,
                    buffered: 0,
                    offered: 0,
                    acknowledged: 0,
                    blocked: 0,
                    resumed: 0,
                    peak_buffered: 0,
                    largest_chunk: 0,
                },
            }),
            readable: Notify::new(),
            writable: Notify::new(),
            progress: Notify::new(),
        }
    }

    /// An edge owned by no pipeline, for driving stages by hand.
    pub fn detached(high_water_mark: usize) -> Self {
        Self::new(EdgeId(0), StageId(0), StageId(0), high_water_mark.max(1))
    }

    /// Counters as of now.
    pub fn stats(&self) -> EdgeStats {
        self.lock().stats.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Gate<T>> {
        self.gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn id(&self) -> EdgeId {
        self.lock().stats.id
    }

    pub fn state(&self) -> EdgeState {
        self.lock().state
    }

    pub fn buffered(&self) -> usize {
        self.lock().stats.buffered
    }

    pub fn high_water_mark(&self) -> usize {
        self.lock().stats.high_water_mark
    }

    /// Hand a chunk to the consumer side.
    ///
    /// The chunk is always accepted while the edge is writable. The returned
    /// flag is `false` when this offer pushed the edge to its high-water mark:
    /// the producer should wait for [`Edge::ready`] before offering again.
    pub fn offer(&self, chunk: Chunk<T>) -> Result<bool> {
        let mut guard = self.lock();
        let gate = &mut *guard;
        if gate.state == EdgeState::Closed || gate.ended {
            return Err(Error::EdgeClosed { edge: gate.stats.id });
        }

        let size = chunk.size();
        gate.queue.push_back(chunk.stamp(gate.next_sequence));
        gate.next_sequence += 1;

        let stats = &mut gate.stats;
        stats.offered += 1;
        stats.buffered += weight(size);
        stats.peak_buffered = stats.peak_buffered.max(stats.buffered);
        stats.largest_chunk = stats.largest_chunk.max(weight(size));

        let keep_going = stats.buffered < stats.high_water_mark;
        if !keep_going && gate.state == EdgeState::Open {
            gate.state = EdgeState::Blocked;
            stats.blocked += 1;

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::TRACE,
                event = "chunkflow.edge.blocked",
                edge = stats.id.0,
                buffered = stats.buffered,
                high_water_mark = stats.high_water_mark,
                "chunkflow.edge.blocked"
            );
        }
        stats.state = gate.state;
        drop(guard);

        self.readable.notify_one();
        Ok(keep_going)
    }

    /// Consumer finished with a chunk of `size` units.
    ///
    /// Fires the resume notification when this drops the edge back below its
    /// high-water mark, once per block.
    pub fn acknowledge(&self, size: usize) -> Result<()> {
        let mut gate = self.lock();
        if gate.state == EdgeState::Closed {
            return Err(Error::EdgeClosed { edge: gate.stats.id });
        }

        gate.stats.buffered = gate.stats.buffered.saturating_sub(weight(size));
        gate.stats.acknowledged += 1;

        let resumed =
            gate.state == EdgeState::Blocked && gate.stats.buffered < gate.stats.high_water_mark;
        if resumed {
            gate.state = EdgeState::Open;
            gate.stats.resumed += 1;
            gate.stats.state = EdgeState::Open;

            #[cfg(feature = "tracing")]
            tracing::event!(
                tracing::Level::TRACE,
                event = "chunkflow.edge.resumed",
                edge = gate.stats.id.0,
                buffered = gate.stats.buffered,
                "chunkflow.edge.resumed"
            );
        }
        drop(gate);

        if resumed {
            self.writable.notify_one();
        }
        self.progress.notify_one();
        Ok(())
    }

    /// Producer side: no more chunks will be offered.
    pub fn end(&self) {
        self.lock().ended = true;
        self.readable.notify_one();
    }

    /// Idempotent; wakes both sides.
    pub fn close(&self) {
        let mut gate = self.lock();
        if gate.state == EdgeState::Closed {
            return;
        }
        gate.state = EdgeState::Closed;
        gate.stats.state = EdgeState::Closed;
        drop(gate);

        self.readable.notify_one();
        self.writable.notify_one();
        self.progress.notify_one();
    }

    /// Next chunk in offer order, or `None` once the producer ended and the
    /// queue is empty, or the edge was closed.
    pub async fn recv(&self) -> Option<Chunk<T>> {
        loop {
            let notified = self.readable.notified();
            {
                let mut gate = self.lock();
                if gate.state == EdgeState::Closed {
                    return None;
                }
                if let Some(chunk) = gate.queue.pop_front() {
                    return Some(chunk);
                }
                if gate.ended {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Wait until the producer may offer again.
    ///
    /// `Ok(true)` when open, `Ok(false)` when `cancel` fired first.
    pub async fn ready(&self, cancel: &CancelToken) -> Result<bool> {
        loop {
            let notified = self.writable.notified();
            match self.state() {
                EdgeState::Open => return Ok(true),
                EdgeState::Closed => return Err(Error::EdgeClosed { edge: self.id() }),
                EdgeState::Blocked => {}
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(false),
                _ = notified => {}
            }
        }
    }

    /// Wait until every offered chunk has been acknowledged.
    ///
    /// A closed edge counts as settled: its consumer is gone either way.
    pub async fn drained(&self, cancel: &CancelToken) -> Result<bool> {
        loop {
            let notified = self.progress.notified();
            {
                let gate = self.lock();
                if gate.state == EdgeState::Closed
                    || gate.stats.acknowledged >= gate.stats.offered
                {
                    return Ok(true);
                }
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(false),
                _ = notified => {}
            }
        }
    }
}

fn weight(size: usize) -> usize {
    size.max(1)
}

/// Type-erased view the driver keeps of every edge.
pub(crate) trait EdgeControl: Send + Sync {
    fn close(&self);
    fn stats(&self) -> EdgeStats;
}

impl<T: Payload> EdgeControl for Edge<T> {
    fn close(&self) {
        Edge::close(self);
    }

    fn stats(&self) -> EdgeStats {
        Edge::stats(self)
    }
}

impl<T: Payload> fmt::Debug for Edge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let gate = self.lock();
        f.debug_struct("Edge")
            .field("id", &gate.stats.id)
            .field("state", &gate.state)
            .field("buffered", &gate.stats.buffered)
            .field("high_water_mark", &gate.stats.high_water_mark)
            .field("queued", &gate.queue.len())
            .finish()
    }
}
