use bytes::Bytes;
use chunkflow::error::{Error, Result};
use chunkflow::ndjson::{DecodePolicy, LineSplitter, RecordParser};
use chunkflow::pipeline::stage::Transform;
use chunkflow::prelude::*;
use chunkflow::sink::CollectSink;
use chunkflow::source::IterSource;

mod common;
use common::run;

#[tokio::test]
async fn lines_across_chunk_boundaries() -> Result<()> {
    let parser = RecordParser::utf8();
    let stats = parser.stats();
    let (sink, lines) = CollectSink::<String>::shared();

    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source(
        "chunks",
        IterSource::from_vec(vec![
            Bytes::from_static(b"ab"),
            Bytes::from_static(b"c\nde"),
            Bytes::from_static(b"f\n"),
        ]),
    )?;
    let split = pipeline.add_transform("split", LineSplitter::new())?;
    let parse = pipeline.add_transform("parse", parser)?;
    let sink = pipeline.add_sink("collect", sink)?;
    pipeline.link(&src, &split)?;
    pipeline.link(&split, &parse)?;
    pipeline.link(&parse, &sink)?;

    run(&mut pipeline, CancelToken::new()).await.into_result()?;

    assert_eq!(*lines.lock().unwrap(), vec!["abc", "def"]);
    assert_eq!(stats.decoded(), 2);
    assert_eq!(stats.skipped(), 0);
    Ok(())
}

#[tokio::test]
async fn splitter_carries_only_the_tail() -> Result<()> {
    let mut splitter = LineSplitter::new();

    assert!(splitter.process(Bytes::from_static(b"ab")).await?.is_empty());
    assert_eq!(splitter.pending(), 2);

    let lines = splitter.process(Bytes::from_static(b"c\nde")).await?;
    assert_eq!(lines, vec![Bytes::from_static(b"abc")]);
    assert_eq!(splitter.pending(), 2);

    let lines = splitter.process(Bytes::from_static(b"f\n")).await?;
    assert_eq!(lines, vec![Bytes::from_static(b"def")]);
    assert_eq!(splitter.pending(), 0);
    assert!(splitter.flush().await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn splitter_keeps_empty_lines_and_flushes_tail() -> Result<()> {
    let mut splitter = LineSplitter::new();

    let lines = splitter.process(Bytes::from_static(b"\n\nx\ny")).await?;
    assert_eq!(lines, vec![Bytes::new(), Bytes::new(), Bytes::from_static(b"x")]);
    assert_eq!(splitter.flush().await?, vec![Bytes::from_static(b"y")]);
    Ok(())
}

#[tokio::test]
async fn overlong_line_fails_the_stage() -> Result<()> {
    let mut splitter = LineSplitter::new().max_line_bytes(4);

    assert_eq!(splitter.process(Bytes::from_static(b"ok\n1234")).await?.len(), 1);
    let err = splitter.process(Bytes::from_static(b"5")).await.unwrap_err();
    assert!(matches!(err, Error::Stage { .. }));
    Ok(())
}

#[tokio::test]
async fn parser_skips_bad_utf8_by_default() -> Result<()> {
    let mut parser = RecordParser::utf8();
    let stats = parser.stats();

    assert_eq!(parser.process(Bytes::from_static(b"fine\r")).await?, vec!["fine"]);
    assert!(parser.process(Bytes::from_static(b"\xff\xfe")).await?.is_empty());
    assert!(parser.process(Bytes::new()).await?.is_empty());

    assert_eq!(stats.decoded(), 1);
    assert_eq!(stats.skipped(), 1);
    Ok(())
}

#[tokio::test]
async fn parser_fail_policy_escalates() -> Result<()> {
    let mut parser = RecordParser::utf8().policy(DecodePolicy::Fail);
    let err = parser.process(Bytes::from_static(b"\xff")).await.unwrap_err();
    assert!(err.to_string().contains("record_parser"), "{err}");
    Ok(())
}

#[tokio::test]
async fn closure_decoder() -> Result<()> {
    let mut parser = RecordParser::from_fn(|line: &[u8]| {
        std::str::from_utf8(line)
            .ok()
            .and_then(|s| s.trim().parse::<u64>().ok())
            .ok_or_else(|| Error::stage("numbers", "not a number"))
    })
    .allow_empty_lines(false);
    let stats = parser.stats();

    assert_eq!(parser.process(Bytes::from_static(b" 42 ")).await?, vec![42]);
    assert!(parser.process(Bytes::new()).await?.is_empty());
    assert_eq!(stats.skipped(), 1, "empty line reaches the decoder");
    Ok(())
}
