//! NDJSON fan-out
//!
//! Run with:
//!   cargo run --example ndjson_fanout
//!   ABORT_MS=5 cargo run --example ndjson_fanout
//!
//! Writes a generated event log as NDJSON, then streams it back:
//! split into lines, decode, and tee into three files: every event, only the
//! errors, and a one-record summary (totals per level, score sum/min/max/avg)
//! written when the stream ends. `ABORT_MS` sets a deadline after which the
//! second run is cancelled.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chunkflow::chunk::Payload;
use chunkflow::error::Result;
use chunkflow::ndjson::{LineSplitter, NdjsonDecoder, NdjsonEncoder};
use chunkflow::pipeline::adapters::Filter;
use chunkflow::pipeline::outcome::Outcome;
use chunkflow::prelude::*;
use chunkflow::sink::FileSink;
use chunkflow::source::{FileSource, IterSource};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Event {
    id: u64,
    level: String,
    score: f64,
    message: String,
}

impl Payload for Event {}

const LEVELS: [&str; 4] = ["debug", "info", "warn", "error"];

fn dataset(count: u64) -> impl Iterator<Item = Event> + Send {
    (0..count).map(|id| Event {
        id,
        level: LEVELS[(id * 7 % 11 % 4) as usize].to_owned(),
        score: (id * 37 % 1000) as f64 / 10.0,
        message: format!("event number {id}"),
    })
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    total: u64,
    by_level: BTreeMap<String, u64>,
    score_sum: f64,
    score_min: Option<f64>,
    score_max: Option<f64>,
    score_avg: Option<f64>,
}

/// Folds every event into a [`Summary`] and emits it as JSON on flush.
#[derive(Default)]
struct Summarize {
    summary: Summary,
}

#[async_trait]
impl Transform<Event, Bytes> for Summarize {
    async fn process(&mut self, event: Event) -> Result<Vec<Bytes>> {
        let summary = &mut self.summary;
        summary.total += 1;
        *summary.by_level.entry(event.level).or_default() += 1;
        summary.score_sum += event.score;
        summary.score_min = Some(summary.score_min.map_or(event.score, |m| m.min(event.score)));
        summary.score_max = Some(summary.score_max.map_or(event.score, |m| m.max(event.score)));
        Ok(Vec::new())
    }

    async fn flush(&mut self) -> Result<Vec<Bytes>> {
        let summary = &mut self.summary;
        if summary.total > 0 {
            summary.score_avg = Some(summary.score_sum / summary.total as f64);
        }
        let mut json = serde_json::to_vec_pretty(summary)?;
        json.push(b'\n');
        Ok(vec![Bytes::from(json)])
    }
}

async fn write_dataset(path: &PathBuf, count: u64) -> Result<()> {
    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source("generate", IterSource::new(dataset(count)))?;
    let encode = pipeline.add_transform("encode", NdjsonEncoder::<Event>::new())?;
    let sink = pipeline.add_sink("dataset", FileSink::<Bytes>::new(path))?;
    pipeline.link(&src, &encode)?;
    pipeline.link(&encode, &sink)?;

    pipeline.run(CancelToken::new()).await?.into_result()?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("chunkflow=info,info")),
        )
        .init();

    let dir = std::env::temp_dir();
    let input = dir.join("chunkflow-events.ndjson");
    let all = dir.join("chunkflow-events-all.ndjson");
    let errors = dir.join("chunkflow-events-errors.ndjson");
    let summary = dir.join("chunkflow-events-stats.json");

    write_dataset(&input, 20_000).await?;

    let decoder = NdjsonDecoder::<Event>::json();
    let stats = decoder.stats();

    let mut pipeline = Pipeline::with_config(PipelineConfig::new().high_water_mark(64));
    let src = pipeline.add_source("read", FileSource::new(&input))?;
    let split = pipeline.add_transform("split", LineSplitter::new())?;
    let parse = pipeline.add_transform("parse", decoder)?;
    let tee = pipeline.add_tee::<Event>("tee")?;
    let encode_all = pipeline.add_transform("encode_all", NdjsonEncoder::<Event>::new())?;
    let write_all = pipeline.add_sink("write_all", FileSink::<Bytes>::new(&all))?;
    let only_errors =
        pipeline.add_transform("only_errors", Filter(|event: &Event| event.level == "error"))?;
    let encode_errors = pipeline.add_transform("encode_errors", NdjsonEncoder::<Event>::new())?;
    let write_errors = pipeline.add_sink("write_errors", FileSink::<Bytes>::new(&errors))?;
    let summarize = pipeline.add_transform("summarize", Summarize::default())?;
    let write_summary = pipeline.add_sink("write_summary", FileSink::<Bytes>::new(&summary))?;

    pipeline.connect(&src, &split, 64 * 1024)?;
    pipeline.link(&split, &parse)?;
    pipeline.link(&parse, &tee)?;
    pipeline.link(&tee, &encode_all)?;
    pipeline.link(&encode_all, &write_all)?;
    pipeline.link(&tee, &only_errors)?;
    pipeline.link(&only_errors, &encode_errors)?;
    pipeline.link(&encode_errors, &write_errors)?;
    pipeline.link(&tee, &summarize)?;
    pipeline.link(&summarize, &write_summary)?;

    let cancel = CancelToken::new();
    let _deadline = std::env::var("ABORT_MS")
        .ok()
        .and_then(|ms| ms.parse::<u64>().ok())
        .map(|ms| cancel.cancel_after(Duration::from_millis(ms)));

    let report = pipeline.run(cancel).await?;

    match &report.outcome {
        Outcome::Succeeded => println!("✅ done"),
        Outcome::Failed { name, cause, .. } => println!("❌ stage `{name}` failed: {cause}"),
        Outcome::Aborted { reason } => println!("⏹️  aborted: {reason}"),
    }
    println!("  decoded={} skipped={}", stats.decoded(), stats.skipped());
    for stage in &report.stages {
        println!("  {:<14} {:?}", stage.name, stage.state);
    }
    println!("  all events:   {}", all.display());
    println!("  errors only:  {}", errors.display());
    if report.outcome.is_success() {
        print!("{}", tokio::fs::read_to_string(&summary).await?);
    }

    report.into_result()?;
    Ok(())
}
