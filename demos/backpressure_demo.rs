//! Backpressure Demonstration
//!
//! Run with:
//!   cargo run --example backpressure_demo
//!
//! A fast source pushes 8-byte chunks at a sink that needs a few
//! milliseconds per chunk. The same run is repeated with different
//! high-water marks to show how often the edge blocks and how much it ever
//! holds at once.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use chunkflow::chunk::Chunk;
use chunkflow::error::Result;
use chunkflow::prelude::*;
use chunkflow::source::IterSource;

/// Slow consumer that takes time to process each chunk
struct SlowSink {
    delay: Duration,
    bytes: usize,
}

#[async_trait]
impl Sink<Bytes> for SlowSink {
    async fn consume(&mut self, chunk: Chunk<Bytes>) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        self.bytes += chunk.size();
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        tracing::info!(bytes = self.bytes, "slow sink finished");
        Ok(())
    }
}

async fn run_with_mark(high_water_mark: usize, chunk_count: usize, delay: Duration) -> Result<()> {
    let chunks = (0..chunk_count)
        .map(|i| Bytes::from((i as u64).to_be_bytes().to_vec()))
        .collect::<Vec<_>>();

    let mut pipeline = Pipeline::new();
    let src = pipeline.add_source("fast_source", IterSource::from_vec(chunks))?;
    let sink = pipeline.add_sink("slow_sink", SlowSink { delay, bytes: 0 })?;
    let edge = pipeline.connect(&src, &sink, high_water_mark)?;

    let start = Instant::now();
    let report = pipeline.run(CancelToken::new()).await?.into_result()?;
    let elapsed = start.elapsed();

    if let Some(stats) = report.edge(edge) {
        println!(
            "  HWM: {:>4} bytes | blocked={:>3} resumed={:>3} peak={:>4} bytes | {:>4}ms",
            high_water_mark,
            stats.blocked,
            stats.resumed,
            stats.peak_buffered,
            elapsed.as_millis()
        );
    }
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

    let chunk_count = 50;
    let delay = Duration::from_millis(5);

    println!("🌊 Backpressure Demonstration\n");
    println!("  - Chunks: {chunk_count} x 8 bytes");
    println!("  - Sink delay: {}ms per chunk\n", delay.as_millis());

    for high_water_mark in [8, 16, 64, 1024] {
        run_with_mark(high_water_mark, chunk_count, delay).await?;
    }

    println!("\n💡 A small mark blocks the source often and keeps the peak low;");
    println!("   a mark larger than the whole stream never blocks at all.");
    Ok(())
}
