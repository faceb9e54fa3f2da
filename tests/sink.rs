use bytes::Bytes;
use chunkflow::chunk::Chunk;
use chunkflow::error::Result;
use chunkflow::pipeline::stage::Sink;
use chunkflow::sink::WriterSink;

#[tokio::test]
async fn writer_sink_counts_and_hands_back_its_writer() -> Result<()> {
    let mut sink = WriterSink::<Vec<u8>, Bytes>::new(Vec::new());

    sink.consume(Chunk::new(Bytes::from_static(b"{\"a\":1}\n"))).await?;
    sink.consume(Chunk::new(Bytes::new())).await?;
    sink.consume(Chunk::last(Bytes::from_static(b"{\"a\":2}\n"))).await?;
    sink.finish().await?;

    assert_eq!(sink.bytes_written(), 16);
    assert_eq!(sink.into_inner(), b"{\"a\":1}\n{\"a\":2}\n".to_vec());
    Ok(())
}
