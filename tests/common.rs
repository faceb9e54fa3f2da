#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chunkflow::chunk::{Chunk, Payload};
use chunkflow::error::{Error, Result};
use chunkflow::pipeline::driver::Pipeline;
use chunkflow::pipeline::outcome::RunReport;
use chunkflow::pipeline::cancel::CancelToken;
use chunkflow::pipeline::stage::{Sink, Source, Transform};

/// Emits `0..count`, optionally sleeping before each item.
pub struct CountingSource {
    next: u64,
    count: u64,
    delay: Option<Duration>,
    produced: Arc<AtomicUsize>,
}

impl CountingSource {
    pub fn new(count: u64) -> Self {
        Self {
            next: 0,
            count,
            delay: None,
            produced: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn produced(&self) -> Arc<AtomicUsize> {
        self.produced.clone()
    }
}

#[async_trait]
impl Source<u64> for CountingSource {
    async fn produce(&mut self) -> Result<Option<u64>> {
        if self.next >= self.count {
            return Ok(None);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let item = self.next;
        self.next += 1;
        self.produced.fetch_add(1, Ordering::SeqCst);
        Ok(Some(item))
    }
}

/// Records what it receives; can be slowed down or told to fail.
pub struct RecordingSink<T> {
    pub items: Arc<Mutex<Vec<T>>>,
    pub sequences: Arc<Mutex<Vec<u64>>>,
    pub finished: Arc<AtomicBool>,
    delay: Option<Duration>,
    fail_at: Option<usize>,
    fail_finish: bool,
    seen: usize,
}

impl<T> RecordingSink<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(Vec::new())),
            sequences: Arc::new(Mutex::new(Vec::new())),
            finished: Arc::new(AtomicBool::new(false)),
            delay: None,
            fail_at: None,
            fail_finish: false,
            seen: 0,
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail on the `n`th chunk (0-based).
    pub fn fail_at(mut self, n: usize) -> Self {
        self.fail_at = Some(n);
        self
    }

    pub fn fail_finish(mut self) -> Self {
        self.fail_finish = true;
        self
    }
}

#[async_trait]
impl<T: Payload> Sink<T> for RecordingSink<T> {
    async fn consume(&mut self, chunk: Chunk<T>) -> Result<()> {
        if self.fail_at == Some(self.seen) {
            return Err(Error::stage("recording_sink", format!("refused chunk {}", self.seen)));
        }
        self.seen += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.sequences.lock().unwrap().push(chunk.sequence());
        self.items.lock().unwrap().push(chunk.into_payload());
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        if self.fail_finish {
            return Err(Error::stage("recording_sink", "finish failed"));
        }
        self.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Passes items through and fails on the `n`th one.
pub struct FailAt {
    pub at: usize,
    seen: usize,
}

impl FailAt {
    pub fn new(at: usize) -> Self {
        Self { at, seen: 0 }
    }
}

#[async_trait]
impl Transform<u64, u64> for FailAt {
    async fn process(&mut self, input: u64) -> Result<Vec<u64>> {
        if self.seen == self.at {
            return Err(Error::stage("fail_at", format!("item {input} rejected")));
        }
        self.seen += 1;
        Ok(vec![input])
    }
}

/// Run with a hang guard.
pub async fn run(pipeline: &mut Pipeline, cancel: CancelToken) -> RunReport {
    tokio::time::timeout(Duration::from_secs(10), pipeline.run(cancel))
        .await
        .expect("pipeline hung")
        .expect("pipeline failed to start")
}
