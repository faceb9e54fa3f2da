use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;

use crate::chunk::{Chunk, Payload};
use crate::error::Result;

/// Produces chunks. Only polled while its outbound edge is open.
#[async_trait]
pub trait Source<O: Payload>: Send {
    /// Next payload, or `None` at end of stream.
    async fn produce(&mut self) -> Result<Option<O>>;

    /// Asked right after a successful `produce`. Returning `true` marks the
    /// chunk just produced as the last one and ends the stream without
    /// polling again.
    fn is_exhausted(&mut self) -> bool {
        false
    }
}

/// Turns each input into zero or more outputs.
#[async_trait]
pub trait Transform<I: Payload, O: Payload>: Send {
    async fn process(&mut self, input: I) -> Result<Vec<O>>;

    /// Called once after the upstream edge ended, to emit buffered state.
    async fn flush(&mut self) -> Result<Vec<O>> {
        Ok(Vec::new())
    }
}

/// Consumes chunks.
///
/// Whatever a sink has already written stays written if the run fails or
/// is aborted; a sink that needs atomic output has to arrange it itself
/// (e.g. write to a temporary path and rename in `finish`).
#[async_trait]
pub trait Sink<I: Payload>: Send {
    async fn consume(&mut self, chunk: Chunk<I>) -> Result<()>;

    /// Called once after the inbound edge delivered its last chunk. Never
    /// called on a failed or aborted run.
    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(pub(crate) usize);

impl StageId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Source,
    Transform,
    Sink,
    Tee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Idle,
    Running,
    Draining,
    Completed,
    Failed,
    Aborted,
}

impl StageState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }
}

/// How a stage loop ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StageExit {
    Completed,
    Cancelled,
}

/// Typed reference to a registered stage; `I` is what it consumes, `O` what
/// it emits. Sources consume `()` and sinks emit `()`.
pub struct StageHandle<I, O> {
    pub(crate) id: StageId,
    _types: PhantomData<fn(I) -> O>,
}

impl<I, O> StageHandle<I, O> {
    pub(crate) fn new(id: StageId) -> Self {
        Self {
            id,
            _types: PhantomData,
        }
    }

    pub fn id(&self) -> StageId {
        self.id
    }
}

impl<I, O> Clone for StageHandle<I, O> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<I, O> Copy for StageHandle<I, O> {}

impl<I, O> fmt::Debug for StageHandle<I, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StageHandle").field(&self.id).finish()
    }
}
