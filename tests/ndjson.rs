#![cfg(feature = "ndjson")]

use bytes::Bytes;
use chunkflow::chunk::Payload;
use chunkflow::error::{Error, Result};
use chunkflow::ndjson::{DecodePolicy, LineSplitter, NdjsonDecoder, NdjsonEncoder};
use chunkflow::pipeline::outcome::Outcome;
use chunkflow::prelude::*;
use chunkflow::sink::{CollectSink, FileSink};
use chunkflow::source::{FileSource, IterSource};
use serde::{Deserialize, Serialize};
use serde_json::Value;

mod common;
use common::run;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct Row {
    id: u32,
}

impl Payload for Row {}

async fn decode(
    decoder: NdjsonDecoder<Row>,
    chunks: Vec<&'static str>,
) -> (Outcome, Vec<Row>) {
    let (sink, rows) = CollectSink::<Row>::shared();

    let mut pipeline = Pipeline::new();
    let chunks = chunks.into_iter().map(|s| Bytes::from_static(s.as_bytes()));
    let src = pipeline.add_source("chunks", IterSource::new(chunks)).unwrap();
    let split = pipeline.add_transform("split", LineSplitter::new()).unwrap();
    let parse = pipeline.add_transform("parse", decoder).unwrap();
    let sink = pipeline.add_sink("collect", sink).unwrap();
    pipeline.link(&src, &split).unwrap();
    pipeline.link(&split, &parse).unwrap();
    pipeline.link(&parse, &sink).unwrap();

    let report = run(&mut pipeline, CancelToken::new()).await;
    let rows = rows.lock().unwrap().clone();
    (report.outcome, rows)
}

#[tokio::test]
async fn decodes_across_boundaries() {
    let (outcome, rows) = decode(
        NdjsonDecoder::json(),
        vec![r#"{"id":"#, "1}\n", r#"{"id":2}"#, "\n", r#"{"id":3}"#],
    )
    .await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(rows, vec![Row { id: 1 }, Row { id: 2 }, Row { id: 3 }]);
}

#[tokio::test]
async fn malformed_lines_are_skipped_and_counted() {
    let decoder = NdjsonDecoder::<Row>::json();
    let stats = decoder.stats();

    let (outcome, rows) = decode(
        decoder,
        vec!["{\"id\":1}\nnot json\r\n{\"id\":2}\n\n{\"id\":\"x\"}\n{\"id\":3}\r\n"],
    )
    .await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(rows, vec![Row { id: 1 }, Row { id: 2 }, Row { id: 3 }]);
    assert_eq!(stats.decoded(), 3);
    assert_eq!(stats.skipped(), 2, "blank lines are not counted");
}

#[tokio::test]
async fn fail_policy_fails_the_run() {
    let (outcome, rows) = decode(
        NdjsonDecoder::json().policy(DecodePolicy::Fail),
        vec!["{\"id\":1}\n{oops}\n{\"id\":2}\n"],
    )
    .await;

    let Outcome::Failed { name, cause, .. } = outcome else {
        panic!("expected failure");
    };
    assert_eq!(name, "parse");
    assert!(cause.to_string().contains("{oops}"), "{cause}");
    // Row 1 may or may not reach the sink before teardown; row 2 never does.
    assert!(rows.len() <= 1);
}

#[tokio::test]
async fn untyped_values() -> Result<()> {
    let (sink, values) = CollectSink::<Value>::shared();

    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source(
        "chunks",
        IterSource::from_vec(vec![Bytes::from_static(b"[1,2]\n\"s\"\n{\"k\":null}")]),
    )?;
    let split = pipeline.add_transform("split", LineSplitter::new())?;
    let parse = pipeline.add_transform("parse", NdjsonDecoder::<Value>::json())?;
    let sink = pipeline.add_sink("collect", sink)?;
    pipeline.link(&src, &split)?;
    pipeline.link(&split, &parse)?;
    pipeline.link(&parse, &sink)?;

    run(&mut pipeline, CancelToken::new()).await.into_result()?;
    assert_eq!(
        *values.lock().unwrap(),
        vec![serde_json::json!([1, 2]), serde_json::json!("s"), serde_json::json!({"k": null})]
    );
    Ok(())
}

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("chunkflow-{}-{name}.ndjson", std::process::id()))
}

#[tokio::test]
async fn encode_to_file_then_read_back() -> Result<()> {
    let path = temp_path("roundtrip");
    let rows = (0..50).map(|id| Row { id }).collect::<Vec<_>>();

    let mut write = Pipeline::new();
    let src = write.add_source("rows", IterSource::from_vec(rows.clone()))?;
    let encode = write.add_transform("encode", NdjsonEncoder::<Row>::new())?;
    let sink = write.add_sink("file", FileSink::<Bytes>::new(&path))?;
    write.link(&src, &encode)?;
    write.link(&encode, &sink)?;
    run(&mut write, CancelToken::new()).await.into_result()?;

    let text = tokio::fs::read_to_string(&path).await?;
    assert_eq!(text.lines().next(), Some(r#"{"id":0}"#));
    assert!(text.ends_with('\n'));

    let (sink, back) = CollectSink::<Row>::shared();
    let mut read = Pipeline::new();
    let src = read.add_source("file", FileSource::new(&path).read_chunk_bytes(7))?;
    let split = read.add_transform("split", LineSplitter::new())?;
    let parse = read.add_transform("parse", NdjsonDecoder::<Row>::json())?;
    let sink = read.add_sink("collect", sink)?;
    read.link(&src, &split)?;
    read.link(&split, &parse)?;
    read.link(&parse, &sink)?;
    run(&mut read, CancelToken::new()).await.into_result()?;

    assert_eq!(*back.lock().unwrap(), rows);
    tokio::fs::remove_file(&path).await?;
    Ok(())
}

#[tokio::test]
async fn missing_file_is_a_stage_failure() -> Result<()> {
    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source("file", FileSource::new(temp_path("does-not-exist")))?;
    let sink = pipeline.add_sink("collect", CollectSink::<Bytes>::shared().0)?;
    pipeline.link(&src, &sink)?;

    let report = run(&mut pipeline, CancelToken::new()).await;
    assert!(matches!(
        report.outcome,
        Outcome::Failed { cause: Error::Io(_), .. }
    ));
    Ok(())
}
