use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::pipeline::stage::Transform;

pub(crate) const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Splits a byte stream on `\n`.
///
/// Only the unterminated tail is carried between chunks. Every complete line
/// is emitted without its delimiter, empty lines included, in the order the
/// delimiters appear. `flush` emits the tail as a final line when the stream
/// does not end with `\n`.
pub struct LineSplitter {
    carry: BytesMut,
    scanned: usize,
    max_line_bytes: usize,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self {
            carry: BytesMut::new(),
            scanned: 0,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Maximum number of bytes an unterminated line may accumulate.
    pub fn max_line_bytes(mut self, n: usize) -> Self {
        self.max_line_bytes = n.max(1);
        self
    }

    /// Bytes currently held back waiting for a delimiter.
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    fn split_lines(&mut self) -> Vec<Bytes> {
        let mut lines = Vec::new();
        while let Some(pos) = self.carry[self.scanned..].iter().position(|&b| b == b'\n') {
            let end = self.scanned + pos;
            let mut line = self.carry.split_to(end + 1);
            line.truncate(end);
            lines.push(line.freeze());
            self.scanned = 0;
        }
        // Nothing before `scanned` can hold a delimiter.
        self.scanned = self.carry.len();
        lines
    }
}

impl Default for LineSplitter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transform<Bytes, Bytes> for LineSplitter {
    async fn process(&mut self, input: Bytes) -> Result<Vec<Bytes>> {
        self.carry.extend_from_slice(&input);
        let lines = self.split_lines();

        if self.carry.len() > self.max_line_bytes {
            return Err(Error::stage(
                "line_splitter",
                format!(
                    "line exceeded max_line_bytes ({} > {})",
                    self.carry.len(),
                    self.max_line_bytes
                ),
            ));
        }
        Ok(lines)
    }

    async fn flush(&mut self) -> Result<Vec<Bytes>> {
        self.scanned = 0;
        if self.carry.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![self.carry.split().freeze()])
    }
}

