use std::path::PathBuf;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::Result;
use crate::pipeline::stage::Source;

const DEFAULT_READ_CHUNK_BYTES: usize = 8 * 1024;

/// Reads an [`AsyncRead`] in fixed-size chunks until EOF.
pub struct ReaderSource<R> {
    reader: R,
    read_chunk_bytes: usize,
    eof: bool,
}

impl<R> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
            eof: false,
        }
    }

    /// Upper bound on the size of each emitted chunk.
    pub fn read_chunk_bytes(mut self, n: usize) -> Self {
        self.read_chunk_bytes = n.max(1);
        self
    }
}

#[async_trait]
impl<R> Source<Bytes> for ReaderSource<R>
where
    R: AsyncRead + Unpin + Send,
{
    async fn produce(&mut self) -> Result<Option<Bytes>> {
        if self.eof {
            return Ok(None);
        }
        let mut buf = BytesMut::with_capacity(self.read_chunk_bytes);
        if self.reader.read_buf(&mut buf).await? == 0 {
            self.eof = true;
            return Ok(None);
        }
        Ok(Some(buf.freeze()))
    }
}

/// A [`ReaderSource`] over a file that is opened on the first `produce`.
pub struct FileSource {
    path: PathBuf,
    read_chunk_bytes: usize,
    reader: Option<ReaderSource<File>>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
            reader: None,
        }
    }

    pub fn read_chunk_bytes(mut self, n: usize) -> Self {
        self.read_chunk_bytes = n.max(1);
        self
    }
}

#[async_trait]
impl Source<Bytes> for FileSource {
    async fn produce(&mut self) -> Result<Option<Bytes>> {
        if self.reader.is_none() {
            let file = File::open(&self.path).await?;
            self.reader = Some(ReaderSource::new(file).read_chunk_bytes(self.read_chunk_bytes));
        }
        match self.reader.as_mut() {
            Some(reader) => reader.produce().await,
            None => Ok(None),
        }
    }
}
