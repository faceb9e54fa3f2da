//! Per-stage run loops behind a type-erased [`Node`].
//!
//! Every loop checks the run's cancel token before pulling the next chunk;
//! `produce` and the edge waits race against it, while `process`, `consume`
//! and `finish` calls already in flight are left to complete.

use std::any::Any;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::chunk::{Chunk, Payload};
use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::edge::Edge;
use crate::pipeline::monitor::StageCell;
use crate::pipeline::stage::{Sink, Source, StageExit, StageKind, StageState, Transform};

pub(crate) type StageFuture = BoxFuture<'static, Result<StageExit>>;

pub(crate) struct StageContext {
    pub(crate) cancel: CancelToken,
    pub(crate) cell: Arc<StageCell>,
}

impl StageContext {
    pub(crate) fn cancelled(&self, where_: &'static str) -> StageExit {
        #[cfg(feature = "tracing")]
        tracing::event!(
            tracing::Level::DEBUG,
            event = "chunkflow.cancelled",
            stage = self.cell.name.as_str(),
            where_ = where_,
            "chunkflow.cancelled"
        );
        #[cfg(not(feature = "tracing"))]
        let _ = where_;
        StageExit::Cancelled
    }
}

pub(crate) trait Node: Send {
    fn name(&self) -> &str;

    fn kind(&self) -> StageKind;

    /// Err when this stage cannot take (another) inbound edge.
    fn accepts_input(&self) -> Result<()>;

    /// Err when this stage cannot take (another) outbound edge.
    fn accepts_output(&self) -> Result<()>;

    fn attach_input(&mut self, edge: Box<dyn Any + Send>) -> Result<()>;

    fn attach_output(&mut self, edge: Box<dyn Any + Send>) -> Result<()>;

    /// All required edges are wired.
    fn validate(&self) -> Result<()>;

    fn launch(self: Box<Self>, cx: StageContext) -> StageFuture;
}

pub(crate) fn downcast_edge<T: Payload>(
    edge: Box<dyn Any + Send>,
    stage: &str,
) -> Result<Arc<Edge<T>>> {
    edge.downcast::<Arc<Edge<T>>>()
        .map(|edge| *edge)
        .map_err(|_| Error::graph(format!("edge payload type does not match stage `{stage}`")))
}

fn unwired(stage: &str, side: &str) -> Error {
    Error::graph(format!("stage `{stage}` has no {side} edge"))
}

fn no_input(stage: &str) -> Error {
    Error::graph(format!("source `{stage}` cannot have an inbound edge"))
}

fn no_output(stage: &str) -> Error {
    Error::graph(format!("sink `{stage}` cannot have an outbound edge"))
}

fn taken(stage: &str, side: &str) -> Error {
    if side == "outbound" {
        Error::graph(format!(
            "stage `{stage}` already has an outbound edge; fan out through a tee"
        ))
    } else {
        Error::graph(format!("stage `{stage}` already has an inbound edge"))
    }
}

/// Offer `outputs` in order, waiting for the edge to reopen between offers.
/// `Ok(false)` means cancellation was observed.
pub(crate) async fn emit_all<O: Payload>(
    output: &Edge<O>,
    outputs: Vec<O>,
    mark_last: bool,
    cancel: &CancelToken,
) -> Result<bool> {
    let count = outputs.len();
    for (i, payload) in outputs.into_iter().enumerate() {
        if cancel.is_cancelled() || !output.ready(cancel).await? {
            return Ok(false);
        }
        let is_last = mark_last && i + 1 == count;
        output.offer(Chunk::new(payload).with_last(is_last))?;
    }
    Ok(true)
}

pub(crate) struct SourceNode<S, O> {
    name: String,
    source: S,
    output: Option<Arc<Edge<O>>>,
}

impl<S, O> SourceNode<S, O> {
    pub(crate) fn new(name: String, source: S) -> Self {
        Self {
            name,
            source,
            output: None,
        }
    }
}

impl<S, O> Node for SourceNode<S, O>
where
    S: Source<O> + 'static,
    O: Payload,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Source
    }

    fn accepts_input(&self) -> Result<()> {
        Err(no_input(&self.name))
    }

    fn accepts_output(&self) -> Result<()> {
        match self.output {
            Some(_) => Err(taken(&self.name, "outbound")),
            None => Ok(()),
        }
    }

    fn attach_input(&mut self, _edge: Box<dyn Any + Send>) -> Result<()> {
        Err(no_input(&self.name))
    }

    fn attach_output(&mut self, edge: Box<dyn Any + Send>) -> Result<()> {
        self.accepts_output()?;
        self.output = Some(downcast_edge(edge, &self.name)?);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        match self.output {
            Some(_) => Ok(()),
            None => Err(unwired(&self.name, "outbound")),
        }
    }

    fn launch(self: Box<Self>, cx: StageContext) -> StageFuture {
        let SourceNode { name, source, output } = *self;
        match output {
            Some(output) => run_source(source, output, cx).boxed(),
            None => futures_util::future::ready(Err(unwired(&name, "outbound"))).boxed(),
        }
    }
}

async fn run_source<S, O>(
    mut source: S,
    output: Arc<Edge<O>>,
    cx: StageContext,
) -> Result<StageExit>
where
    S: Source<O>,
    O: Payload,
{
    let cancel = &cx.cancel;

    loop {
        if cancel.is_cancelled() || !output.ready(cancel).await? {
            return Ok(cx.cancelled("ready"));
        }

        let produced = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cx.cancelled("produce")),
            produced = source.produce() => produced?,
        };

        let Some(payload) = produced else {
            output.end();
            return Ok(StageExit::Completed);
        };

        let last = source.is_exhausted();
        output.offer(Chunk::new(payload).with_last(last))?;
        if last {
            output.end();
            return Ok(StageExit::Completed);
        }
    }
}

pub(crate) struct TransformNode<X, I, O> {
    name: String,
    transform: X,
    input: Option<Arc<Edge<I>>>,
    output: Option<Arc<Edge<O>>>,
}

impl<X, I, O> TransformNode<X, I, O> {
    pub(crate) fn new(name: String, transform: X) -> Self {
        Self {
            name,
            transform,
            input: None,
            output: None,
        }
    }
}

impl<X, I, O> Node for TransformNode<X, I, O>
where
    X: Transform<I, O> + 'static,
    I: Payload,
    O: Payload,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Transform
    }

    fn accepts_input(&self) -> Result<()> {
        match self.input {
            Some(_) => Err(taken(&self.name, "inbound")),
            None => Ok(()),
        }
    }

    fn accepts_output(&self) -> Result<()> {
        match self.output {
            Some(_) => Err(taken(&self.name, "outbound")),
            None => Ok(()),
        }
    }

    fn attach_input(&mut self, edge: Box<dyn Any + Send>) -> Result<()> {
        self.accepts_input()?;
        self.input = Some(downcast_edge(edge, &self.name)?);
        Ok(())
    }

    fn attach_output(&mut self, edge: Box<dyn Any + Send>) -> Result<()> {
        self.accepts_output()?;
        self.output = Some(downcast_edge(edge, &self.name)?);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.input.is_none() {
            return Err(unwired(&self.name, "inbound"));
        }
        if self.output.is_none() {
            return Err(unwired(&self.name, "outbound"));
        }
        Ok(())
    }

    fn launch(self: Box<Self>, cx: StageContext) -> StageFuture {
        let TransformNode {
            name,
            transform,
            input,
            output,
        } = *self;
        match (input, output) {
            (Some(input), Some(output)) => run_transform(transform, input, output, cx).boxed(),
            (None, _) => futures_util::future::ready(Err(unwired(&name, "inbound"))).boxed(),
            (_, None) => futures_util::future::ready(Err(unwired(&name, "outbound"))).boxed(),
        }
    }
}

async fn run_transform<X, I, O>(
    mut transform: X,
    input: Arc<Edge<I>>,
    output: Arc<Edge<O>>,
    cx: StageContext,
) -> Result<StageExit>
where
    X: Transform<I, O>,
    I: Payload,
    O: Payload,
{
    let cancel = &cx.cancel;
    let mut flushed = false;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cx.cancelled("recv")),
            next = input.recv() => next,
        };
        let Some(chunk) = next else { break };

        let size = chunk.size();
        let is_last = chunk.is_last();
        let mut outputs = transform.process(chunk.into_payload()).await?;
        if is_last {
            cx.cell.set(StageState::Draining);
            outputs.extend(transform.flush().await?);
            flushed = true;
        }

        if !emit_all(&output, outputs, is_last, cancel).await? {
            return Ok(cx.cancelled("send"));
        }
        input.acknowledge(size)?;
    }

    if cancel.is_cancelled() {
        return Ok(cx.cancelled("recv"));
    }

    if !flushed {
        cx.cell.set(StageState::Draining);
        let outputs = transform.flush().await?;
        if !emit_all(&output, outputs, true, cancel).await? {
            return Ok(cx.cancelled("flush"));
        }
    }

    output.end();
    Ok(StageExit::Completed)
}

pub(crate) struct SinkNode<K, I> {
    name: String,
    sink: K,
    input: Option<Arc<Edge<I>>>,
}

impl<K, I> SinkNode<K, I> {
    pub(crate) fn new(name: String, sink: K) -> Self {
        Self {
            name,
            sink,
            input: None,
        }
    }
}

impl<K, I> Node for SinkNode<K, I>
where
    K: Sink<I> + 'static,
    I: Payload,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    fn accepts_input(&self) -> Result<()> {
        match self.input {
            Some(_) => Err(taken(&self.name, "inbound")),
            None => Ok(()),
        }
    }

    fn accepts_output(&self) -> Result<()> {
        Err(no_output(&self.name))
    }

    fn attach_input(&mut self, edge: Box<dyn Any + Send>) -> Result<()> {
        self.accepts_input()?;
        self.input = Some(downcast_edge(edge, &self.name)?);
        Ok(())
    }

    fn attach_output(&mut self, _edge: Box<dyn Any + Send>) -> Result<()> {
        Err(no_output(&self.name))
    }

    fn validate(&self) -> Result<()> {
        match self.input {
            Some(_) => Ok(()),
            None => Err(unwired(&self.name, "inbound")),
        }
    }

    fn launch(self: Box<Self>, cx: StageContext) -> StageFuture {
        let SinkNode { name, sink, input } = *self;
        match input {
            Some(input) => run_sink(sink, input, cx).boxed(),
            None => futures_util::future::ready(Err(unwired(&name, "inbound"))).boxed(),
        }
    }
}

async fn run_sink<K, I>(mut sink: K, input: Arc<Edge<I>>, cx: StageContext) -> Result<StageExit>
where
    K: Sink<I>,
    I: Payload,
{
    let cancel = &cx.cancel;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cx.cancelled("recv")),
            next = input.recv() => next,
        };
        let Some(chunk) = next else { break };

        let size = chunk.size();
        sink.consume(chunk).await?;
        input.acknowledge(size)?;
    }

    if cancel.is_cancelled() {
        return Ok(cx.cancelled("finish"));
    }

    cx.cell.set(StageState::Draining);
    sink.finish().await?;
    Ok(StageExit::Completed)
}
