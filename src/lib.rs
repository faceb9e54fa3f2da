//! # chunkflow
//!
//! **Chunked stream pipelines with explicit backpressure.**
//!
//! `chunkflow` wires sources, transforms and sinks into a graph whose edges
//! carry [`Chunk`]s under a high-water mark. A run always settles into exactly
//! one outcome: success, the first stage failure, or an abort requested by the
//! caller.
//!
//! - bounded buffering on every edge, in bytes or in records
//! - strict FIFO per edge
//! - fan-out through a tee paced by its slowest branch
//! - cooperative cancellation with a bounded teardown
//!
//! ---
//!
//! ## Core Model
//!
//! ```text
//! Source → Transform → … → Sink
//!                  ↘ Tee → Sink
//!                        → Sink
//! ```
//!
//! Each stage implements [`Source`], [`Transform`] or [`Sink`]. Stages are
//! joined by an [`Edge`], which counts the size of what is buffered on it and
//! tells the producer to pause once the high-water mark is reached. The
//! consumer acknowledges every chunk once it is done with it, reopening the
//! edge.
//!
//! All stages of one pipeline are polled by a single driver future, so a
//! stage that blocks the thread stalls the whole run. Hand CPU-heavy work to
//! a worker and await it.
//!
//! ---
//!
//! ## Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use chunkflow::ndjson::{LineSplitter, RecordParser};
//! use chunkflow::prelude::*;
//! use chunkflow::sink::CollectSink;
//! use chunkflow::source::IterSource;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> chunkflow::error::Result<()> {
//!     let (sink, lines) = CollectSink::<String>::shared();
//!
//!     let mut pipeline = Pipeline::new();
//!     let src = pipeline.add_source("chunks", IterSource::from_vec(vec![
//!         Bytes::from_static(b"ab"),
//!         Bytes::from_static(b"c\nde"),
//!         Bytes::from_static(b"f\n"),
//!     ]))?;
//!     let split = pipeline.add_transform("split", LineSplitter::new())?;
//!     let parse = pipeline.add_transform("parse", RecordParser::utf8())?;
//!     let sink = pipeline.add_sink("collect", sink)?;
//!
//!     pipeline.connect(&src, &split, 16)?;
//!     pipeline.link(&split, &parse)?;
//!     pipeline.link(&parse, &sink)?;
//!
//!     pipeline.run(CancelToken::new()).await?.into_result()?;
//!     assert_eq!(*lines.lock().unwrap(), vec!["abc", "def"]);
//!     Ok(())
//! }
//! ```
//!
//! ---
//!
//! ## Outcomes
//!
//! [`Pipeline::run`] returns `Err` only when the pipeline cannot start (an
//! invalid graph, a second run). Otherwise it returns a [`RunReport`] whose
//! [`Outcome`] is one of:
//!
//! - `Succeeded`: every stage completed and every sink finished
//! - `Failed { stage, name, cause }`: the first stage error; later errors are
//!   logged and discarded
//! - `Aborted { reason }`: the caller's token was cancelled first
//!
//! Nothing is retried and nothing is rolled back. Records a sink already
//! wrote stay written.
//!
//! ---
//!
//! ## Cancellation
//!
//! ```no_run
//! use std::time::Duration;
//! use chunkflow::prelude::*;
//!
//! # async fn demo(mut pipeline: Pipeline) -> chunkflow::error::Result<()> {
//! let cancel = CancelToken::new();
//! let _deadline = cancel.cancel_after(Duration::from_secs(30));
//!
//! let report = pipeline.run(cancel).await?;
//! if report.outcome.is_aborted() {
//!     println!("stopped early");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Cancellation is observed between chunks. A `produce` call is raced against
//! the token; `process`, `consume` and `finish` calls already running are
//! allowed to return. Stages still running when the grace period
//! ([`PipelineConfig::grace_period`]) runs out are dropped.
//!
//! ---
//!
//! ## Observability
//!
//! ```ignore
//! use tracing_subscriber::fmt;
//!
//! fn main() {
//!     fmt()
//!         .with_target(false)
//!         .with_env_filter("chunkflow=debug")
//!         .init();
//! }
//! ```
//!
//! Each run is wrapped in a `chunkflow.pipeline` span. Events include
//! `chunkflow.edge.blocked`, `chunkflow.edge.resumed`,
//! `chunkflow.stage.failed`, `chunkflow.failure.discarded`,
//! `chunkflow.aborted`, `chunkflow.cancelled`, `chunkflow.record.skipped` and
//! `chunkflow.teardown.grace_elapsed`.
//!
//! ---
//!
//! ## Feature Flags
//!
//! - `tracing` *(default)*: structured events and spans.
//! - `ndjson` *(default)*: JSON line decoding and encoding via `serde_json`.
//!
//! [`Chunk`]: chunk::Chunk
//! [`Source`]: pipeline::stage::Source
//! [`Transform`]: pipeline::stage::Transform
//! [`Sink`]: pipeline::stage::Sink
//! [`Edge`]: pipeline::edge::Edge
//! [`Pipeline::run`]: pipeline::driver::Pipeline::run
//! [`RunReport`]: pipeline::outcome::RunReport
//! [`Outcome`]: pipeline::outcome::Outcome
//! [`PipelineConfig::grace_period`]: pipeline::config::PipelineConfig::grace_period

// Public modules
pub mod chunk;
pub mod error;
pub mod ndjson;
pub mod pipeline;
pub mod sink;
pub mod source;

pub mod prelude {
    //! Convenient imports for most `chunkflow` users.

    pub use crate::chunk::{Chunk, Payload};
    pub use crate::pipeline::cancel::CancelToken;
    pub use crate::pipeline::config::PipelineConfig;
    pub use crate::pipeline::driver::Pipeline;
    pub use crate::pipeline::outcome::{Outcome, RunReport};
    pub use crate::pipeline::stage::{Sink, Source, Transform};
}
