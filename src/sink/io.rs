use std::marker::PhantomData;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::chunk::{Chunk, Payload};
use crate::error::Result;
use crate::pipeline::stage::Sink;

/// Writes byte payloads to an [`AsyncWrite`]; `finish` flushes and shuts it
/// down. Bytes already written stay written if the run fails.
pub struct WriterSink<W, T> {
    writer: W,
    written: u64,
    _marker: PhantomData<fn(T)>,
}

impl<W, T> WriterSink<W, T> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            _marker: PhantomData,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W, T> Sink<T> for WriterSink<W, T>
where
    W: AsyncWrite + Unpin + Send,
    T: Payload + AsRef<[u8]>,
{
    async fn consume(&mut self, chunk: Chunk<T>) -> Result<()> {
        let payload = chunk.into_payload();
        self.writer.write_all(payload.as_ref()).await?;
        self.written += payload.as_ref().len() as u64;
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

/// A buffered [`WriterSink`] over a file created (or truncated) on the first
/// chunk. A run that delivers nothing still creates the file in `finish`.
pub struct FileSink<T> {
    path: PathBuf,
    inner: Option<WriterSink<BufWriter<File>, T>>,
}

impl<T> FileSink<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: None,
        }
    }

    async fn open(&mut self) -> Result<&mut WriterSink<BufWriter<File>, T>> {
        let inner = match self.inner.take() {
            Some(inner) => inner,
            None => WriterSink::new(BufWriter::new(File::create(&self.path).await?)),
        };
        Ok(self.inner.insert(inner))
    }
}

#[async_trait]
impl<T> Sink<T> for FileSink<T>
where
    T: Payload + AsRef<[u8]>,
{
    async fn consume(&mut self, chunk: Chunk<T>) -> Result<()> {
        self.open().await?.consume(chunk).await
    }

    async fn finish(&mut self) -> Result<()> {
        self.open().await?.finish().await
    }
}
