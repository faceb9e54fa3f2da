//! Fan-out: one inbound stream duplicated to every attached branch.
//!
//! The tee pulls the next chunk only once every branch is open again, so
//! the slowest branch sets the pace and no branch ever holds more than one
//! chunk beyond its high-water mark. Branches keep their own FIFO order;
//! nothing is ordered across branches.

use std::any::Any;
use std::sync::Arc;

use futures_util::FutureExt;

use crate::chunk::{Chunk, Payload};
use crate::error::{Error, Result};
use crate::pipeline::edge::Edge;
use crate::pipeline::node::{downcast_edge, Node, StageContext, StageFuture};
use crate::pipeline::stage::{StageExit, StageKind, StageState};

pub(crate) struct TeeNode<T> {
    name: String,
    input: Option<Arc<Edge<T>>>,
    branches: Vec<Arc<Edge<T>>>,
}

impl<T> TeeNode<T> {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            input: None,
            branches: Vec::new(),
        }
    }
}

impl<T> Node for TeeNode<T>
where
    T: Payload + Clone,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StageKind {
        StageKind::Tee
    }

    fn accepts_input(&self) -> Result<()> {
        match self.input {
            Some(_) => Err(Error::graph(format!(
                "tee `{}` already has an inbound edge",
                self.name
            ))),
            None => Ok(()),
        }
    }

    fn accepts_output(&self) -> Result<()> {
        Ok(())
    }

    fn attach_input(&mut self, edge: Box<dyn Any + Send>) -> Result<()> {
        self.accepts_input()?;
        self.input = Some(downcast_edge(edge, &self.name)?);
        Ok(())
    }

    fn attach_output(&mut self, edge: Box<dyn Any + Send>) -> Result<()> {
        self.branches.push(downcast_edge(edge, &self.name)?);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.input.is_none() {
            return Err(Error::graph(format!("tee `{}` has no inbound edge", self.name)));
        }
        if self.branches.is_empty() {
            return Err(Error::graph(format!("tee `{}` has no branches", self.name)));
        }
        Ok(())
    }

    fn launch(self: Box<Self>, cx: StageContext) -> StageFuture {
        let TeeNode {
            name,
            input,
            branches,
        } = *self;
        match input {
            Some(input) if !branches.is_empty() => run_tee(input, branches, cx).boxed(),
            _ => futures_util::future::ready(Err(Error::graph(format!(
                "tee `{name}` is not fully wired"
            ))))
            .boxed(),
        }
    }
}

async fn run_tee<T>(
    input: Arc<Edge<T>>,
    branches: Vec<Arc<Edge<T>>>,
    cx: StageContext,
) -> Result<StageExit>
where
    T: Payload + Clone,
{
    let cancel = &cx.cancel;

    loop {
        for branch in &branches {
            if cancel.is_cancelled() || !branch.ready(cancel).await? {
                return Ok(cx.cancelled("ready"));
            }
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(cx.cancelled("recv")),
            next = input.recv() => next,
        };
        let Some(chunk) = next else { break };

        let size = chunk.size();
        let is_last = chunk.is_last();
        let payload = chunk.into_payload();

        let (last_branch, rest) = branches
            .split_last()
            .ok_or_else(|| Error::graph("tee has no branches"))?;
        for branch in rest {
            branch.offer(Chunk::new(payload.clone()).with_last(is_last))?;
        }
        last_branch.offer(Chunk::new(payload).with_last(is_last))?;

        input.acknowledge(size)?;
    }

    if cancel.is_cancelled() {
        return Ok(cx.cancelled("recv"));
    }

    cx.cell.set(StageState::Draining);
    for branch in &branches {
        branch.end();
    }
    for branch in &branches {
        if !branch.drained(cancel).await? {
            return Ok(cx.cancelled("drain"));
        }
    }

    Ok(StageExit::Completed)
}
