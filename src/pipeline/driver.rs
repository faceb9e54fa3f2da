//! Builds a stage graph and runs it to a single terminal outcome.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use tokio::time::Instant;

use crate::chunk::Payload;
use crate::error::{Error, Result};
use crate::pipeline::cancel::CancelToken;
use crate::pipeline::config::PipelineConfig;
use crate::pipeline::edge::{Edge, EdgeControl, EdgeId};
use crate::pipeline::monitor::{Monitor, StageCell};
use crate::pipeline::node::{Node, SinkNode, SourceNode, StageContext, TransformNode};
use crate::pipeline::outcome::{Outcome, PipelineState, RunReport, StageReport};
use crate::pipeline::stage::{
    Sink, Source, StageExit, StageHandle, StageId, StageKind, StageState, Transform,
};
use crate::pipeline::tee::TeeNode;

/// A graph of stages joined by backpressure-gated edges.
///
/// ```no_run
/// use chunkflow::prelude::*;
/// use chunkflow::ndjson::LineSplitter;
/// use chunkflow::sink::CollectSink;
/// use chunkflow::source::IterSource;
///
/// # async fn demo() -> chunkflow::error::Result<()> {
/// let lines = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
///
/// let mut pipeline = Pipeline::new();
/// let src = pipeline.add_source("chunks", IterSource::from_vec(vec![
///     bytes::Bytes::from_static(b"a\nb"),
///     bytes::Bytes::from_static(b"c\n"),
/// ]))?;
/// let split = pipeline.add_transform("split", LineSplitter::new())?;
/// let sink = pipeline.add_sink("collect", CollectSink::new(lines.clone()))?;
/// pipeline.link(&src, &split)?;
/// pipeline.link(&split, &sink)?;
///
/// let report = pipeline.run(CancelToken::new()).await?;
/// report.into_result()?;
/// # Ok(())
/// # }
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    nodes: Vec<Option<Box<dyn Node>>>,
    links: Vec<(StageId, StageId)>,
    monitor: Monitor,
    state: PipelineState,
    disposed: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::with_config(PipelineConfig::default())
    }

    pub fn with_config(config: PipelineConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            links: Vec::new(),
            monitor: Monitor::default(),
            state: PipelineState::Building,
            disposed: false,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// A handle for watching stage states and edge stats while `run` is
    /// in progress.
    pub fn monitor(&self) -> Monitor {
        self.monitor.clone()
    }

    fn ensure_building(&self) -> Result<()> {
        if self.disposed {
            return Err(Error::pipeline("pipeline has been disposed"));
        }
        if self.state != PipelineState::Building {
            return Err(Error::pipeline("pipeline has already been started"));
        }
        Ok(())
    }

    fn register(&mut self, node: Box<dyn Node>) -> Result<StageId> {
        self.ensure_building()?;
        let id = StageId(self.nodes.len());
        let cell = StageCell::new(id, node.name().to_owned(), node.kind());
        self.monitor.register_stage(Arc::new(cell));
        self.nodes.push(Some(node));
        Ok(id)
    }

    pub fn add_source<O, S>(
        &mut self,
        name: impl Into<String>,
        source: S,
    ) -> Result<StageHandle<(), O>>
    where
        O: Payload,
        S: Source<O> + 'static,
    {
        let node = SourceNode::<S, O>::new(name.into(), source);
        self.register(Box::new(node)).map(StageHandle::new)
    }

    pub fn add_transform<I, O, X>(
        &mut self,
        name: impl Into<String>,
        transform: X,
    ) -> Result<StageHandle<I, O>>
    where
        I: Payload,
        O: Payload,
        X: Transform<I, O> + 'static,
    {
        let node = TransformNode::<X, I, O>::new(name.into(), transform);
        self.register(Box::new(node)).map(StageHandle::new)
    }

    pub fn add_sink<I, K>(&mut self, name: impl Into<String>, sink: K) -> Result<StageHandle<I, ()>>
    where
        I: Payload,
        K: Sink<I> + 'static,
    {
        let node = SinkNode::<K, I>::new(name.into(), sink);
        self.register(Box::new(node)).map(StageHandle::new)
    }

    /// A fan-out stage; every edge connected downstream of it becomes a branch.
    pub fn add_tee<T>(&mut self, name: impl Into<String>) -> Result<StageHandle<T, T>>
    where
        T: Payload + Clone,
    {
        let node = TeeNode::<T>::new(name.into());
        self.register(Box::new(node)).map(StageHandle::new)
    }

    /// Join two stages with an edge blocking at `high_water_mark` units.
    pub fn connect<A, T, B>(
        &mut self,
        upstream: &StageHandle<A, T>,
        downstream: &StageHandle<T, B>,
        high_water_mark: usize,
    ) -> Result<EdgeId>
    where
        T: Payload,
    {
        self.ensure_building()?;
        let (up, down) = (upstream.id, downstream.id);

        if high_water_mark == 0 {
            return Err(Error::graph("high-water mark must be at least 1"));
        }
        if up == down {
            return Err(Error::graph(format!("cannot connect {up} to itself")));
        }
        if self.links.contains(&(up, down)) {
            return Err(Error::graph(format!("{up} and {down} are already connected")));
        }
        self.node(up)?.accepts_output()?;
        self.node(down)?.accepts_input()?;

        let id = EdgeId(self.links.len());
        let edge = Arc::new(Edge::<T>::new(id, up, down, high_water_mark));
        self.node_mut(up)?.attach_output(Box::new(edge.clone()))?;
        self.node_mut(down)?.attach_input(Box::new(edge.clone()))?;

        let control: Arc<dyn EdgeControl> = edge;
        self.monitor.register_edge(control);
        self.links.push((up, down));
        Ok(id)
    }

    /// [`connect`](Self::connect) with the configured default high-water mark.
    pub fn link<A, T, B>(
        &mut self,
        upstream: &StageHandle<A, T>,
        downstream: &StageHandle<T, B>,
    ) -> Result<EdgeId>
    where
        T: Payload,
    {
        let high_water_mark = self.config.default_high_water_mark();
        self.connect(upstream, downstream, high_water_mark)
    }

    fn node(&self, id: StageId) -> Result<&dyn Node> {
        self.nodes
            .get(id.0)
            .and_then(|slot| slot.as_deref())
            .ok_or_else(|| Error::graph(format!("unknown {id}")))
    }

    fn node_mut(&mut self, id: StageId) -> Result<&mut Box<dyn Node>> {
        self.nodes
            .get_mut(id.0)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| Error::graph(format!("unknown {id}")))
    }

    fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::graph("pipeline has no stages"));
        }
        for node in self.nodes.iter().flatten() {
            node.validate()?;
        }

        // One inbound edge per stage means any cycle lacks a source; walking
        // from the sources therefore rejects cycles and orphans alike.
        let mut seen = HashSet::new();
        let mut queue: VecDeque<StageId> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| matches!(slot, Some(node) if node.kind() == StageKind::Source))
            .map(|(index, _)| StageId(index))
            .collect();
        while let Some(id) = queue.pop_front() {
            if seen.insert(id) {
                queue.extend(self.links.iter().filter(|(up, _)| *up == id).map(|(_, down)| *down));
            }
        }
        for (index, slot) in self.nodes.iter().enumerate() {
            if let Some(node) = slot {
                if !seen.contains(&StageId(index)) {
                    return Err(Error::graph(format!(
                        "stage `{}` is not reachable from any source",
                        node.name()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Run every stage until the graph settles.
    ///
    /// `Err` is reserved for misuse (invalid graph, second run). Any run that
    /// starts ends in `Ok(report)`, whose `outcome` is exactly one of
    /// success, the first stage failure, or abort by `cancel`.
    pub async fn run(&mut self, cancel: CancelToken) -> Result<RunReport> {
        self.ensure_building()?;
        self.validate()?;
        self.state = PipelineState::Running;

        #[cfg(feature = "tracing")]
        let report = {
            use tracing::Instrument;
            let span = tracing::info_span!(
                "chunkflow.pipeline",
                stages = self.nodes.len(),
                edges = self.links.len()
            );
            self.drive(cancel).instrument(span).await
        };

        #[cfg(not(feature = "tracing"))]
        let report = self.drive(cancel).await;

        self.state = report.outcome.state();
        Ok(report)
    }

    async fn drive(&mut self, cancel: CancelToken) -> RunReport {
        let teardown = cancel.child();
        let cells = self.monitor.stage_cells();
        let grace = self.config.teardown_grace();

        let mut running = FuturesUnordered::new();
        for (slot, cell) in self.nodes.iter_mut().zip(cells.iter()) {
            let Some(node) = slot.take() else { continue };
            cell.set(StageState::Running);
            let id = cell.id;
            let cx = StageContext {
                cancel: teardown.clone(),
                cell: cell.clone(),
            };
            running.push(node.launch(cx).map(move |res| (id, res)));
        }

        let mut outcome: Option<Outcome> = None;
        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                biased;
                // Once every stage has returned, a late cancel changes nothing.
                _ = cancel.cancelled(), if outcome.is_none() && !running.is_empty() => {
                    let reason = cancel.reason().unwrap_or("cancelled by caller").to_owned();

                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::INFO,
                        event = "chunkflow.aborted",
                        reason = reason.as_str(),
                        "chunkflow.aborted"
                    );

                    self.begin_teardown(&teardown, &reason);
                    outcome = Some(Outcome::Aborted { reason });
                    deadline = Some(Instant::now() + grace);
                }
                next = running.next() => {
                    let Some((id, res)) = next else { break };
                    let Some(cell) = cells.get(id.0) else { continue };
                    if let Some(failed) = self.settle(cell, res, &teardown, outcome.is_some()) {
                        outcome = Some(failed);
                        deadline = Some(Instant::now() + grace);
                    }
                }
                _ = grace_elapsed(deadline) => {
                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::WARN,
                        event = "chunkflow.teardown.grace_elapsed",
                        remaining = running.len(),
                        grace_ms = grace.as_millis() as u64,
                        "chunkflow.teardown.grace_elapsed"
                    );
                    break;
                }
            }
        }
        drop(running);

        for cell in &cells {
            if !cell.state().is_terminal() {
                cell.set(StageState::Aborted);
            }
        }
        self.close_edges();

        RunReport {
            outcome: outcome.unwrap_or(Outcome::Succeeded),
            stages: cells
                .iter()
                .map(|cell| StageReport {
                    id: cell.id,
                    name: cell.name.clone(),
                    kind: cell.kind,
                    state: cell.state(),
                })
                .collect(),
            edges: self.monitor.all_edge_stats(),
        }
    }

    /// Record how one stage ended. Returns the run outcome when this is the
    /// first failure.
    fn settle(
        &self,
        cell: &StageCell,
        res: Result<StageExit>,
        teardown: &CancelToken,
        settled: bool,
    ) -> Option<Outcome> {
        match res {
            Ok(StageExit::Completed) => {
                cell.set(StageState::Completed);
                self.close_inbound(cell.id);
                None
            }
            Ok(StageExit::Cancelled) => {
                cell.set(StageState::Aborted);
                None
            }
            Err(err) if teardown.is_cancelled() && err.is_edge_closed() => {
                cell.set(StageState::Aborted);
                None
            }
            Err(err) if settled => {
                cell.set(StageState::Failed);

                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::WARN,
                    event = "chunkflow.failure.discarded",
                    stage = cell.name.as_str(),
                    error = %err,
                    "chunkflow.failure.discarded"
                );
                #[cfg(not(feature = "tracing"))]
                drop(err);
                None
            }
            Err(err) => {
                cell.set(StageState::Failed);

                #[cfg(feature = "tracing")]
                tracing::event!(
                    tracing::Level::ERROR,
                    event = "chunkflow.stage.failed",
                    stage = cell.name.as_str(),
                    error = %err,
                    "chunkflow.stage.failed"
                );

                self.begin_teardown(teardown, &format!("stage `{}` failed", cell.name));
                Some(Outcome::Failed {
                    stage: cell.id,
                    name: cell.name.clone(),
                    cause: err,
                })
            }
        }
    }

    fn begin_teardown(&self, teardown: &CancelToken, reason: &str) {
        teardown.cancel_with(reason);
        self.close_edges();
    }

    fn close_inbound(&self, id: StageId) {
        let edges = self.monitor.edge_controls();
        for (index, (_, down)) in self.links.iter().enumerate() {
            if *down == id {
                if let Some(edge) = edges.get(index) {
                    edge.close();
                }
            }
        }
    }

    fn close_edges(&self) {
        for edge in self.monitor.edge_controls() {
            edge.close();
        }
    }

    /// Close every edge and drop every stage that has not run. Safe to call
    /// any number of times.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.close_edges();
        self.nodes.clear();
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn grace_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("stages", &self.nodes.len())
            .field("edges", &self.links.len())
            .field("grace_period", &self.config.teardown_grace())
            .finish()
    }
}
