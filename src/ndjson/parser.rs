use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::chunk::Payload;
use crate::error::{Error, Result};
use crate::pipeline::stage::Transform;

/// Decodes one delimiter-free line into a record.
pub trait LineDecoder<T>: Send {
    fn decode(&mut self, line: &[u8]) -> Result<T>;
}

/// Adapts a closure into a [`LineDecoder`].
pub struct FnDecoder<F>(pub F);

impl<T, F> LineDecoder<T> for FnDecoder<F>
where
    F: FnMut(&[u8]) -> Result<T> + Send,
{
    fn decode(&mut self, line: &[u8]) -> Result<T> {
        (self.0)(line)
    }
}

/// Lines as UTF-8 text.
pub struct Utf8Line;

impl LineDecoder<String> for Utf8Line {
    fn decode(&mut self, line: &[u8]) -> Result<String> {
        std::str::from_utf8(line)
            .map(str::to_owned)
            .map_err(|err| Error::stage("record_parser", format!("invalid utf-8: {err}")))
    }
}

/// What to do with a line that fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecodePolicy {
    /// Drop the line, count it, and keep going.
    #[default]
    Skip,
    /// Fail the stage, and with it the pipeline.
    Fail,
}

/// Shared counters; clone the handle before the parser moves into a pipeline.
#[derive(Debug, Clone, Default)]
pub struct DecodeStats {
    decoded: Arc<AtomicU64>,
    skipped: Arc<AtomicU64>,
}

impl DecodeStats {
    pub fn decoded(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Turns lines into records, one record per decodable line.
///
/// Malformed lines are skipped by default: a bad record costs that record,
/// not the run. Output order is input order.
pub struct RecordParser<T, D> {
    decoder: D,
    policy: DecodePolicy,
    allow_empty_lines: bool,
    strip_cr: bool,
    stats: DecodeStats,
    _marker: PhantomData<fn() -> T>,
}

impl<T, D> RecordParser<T, D>
where
    D: LineDecoder<T>,
{
    pub fn new(decoder: D) -> Self {
        Self {
            decoder,
            policy: DecodePolicy::default(),
            allow_empty_lines: true,
            strip_cr: true,
            stats: DecodeStats::default(),
            _marker: PhantomData,
        }
    }
}

impl<T, F> RecordParser<T, FnDecoder<F>>
where
    F: FnMut(&[u8]) -> Result<T> + Send,
{
    pub fn from_fn(f: F) -> Self {
        Self::new(FnDecoder(f))
    }
}

impl RecordParser<String, Utf8Line> {
    pub fn utf8() -> Self {
        Self::new(Utf8Line)
    }
}

impl<T, D> RecordParser<T, D> {
    pub fn policy(mut self, policy: DecodePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Whether blank lines are ignored rather than handed to the decoder.
    pub fn allow_empty_lines(mut self, yes: bool) -> Self {
        self.allow_empty_lines = yes;
        self
    }

    /// Drop a trailing `\r` before decoding (CRLF input).
    pub fn strip_cr(mut self, yes: bool) -> Self {
        self.strip_cr = yes;
        self
    }

    pub fn stats(&self) -> DecodeStats {
        self.stats.clone()
    }
}

#[async_trait]
impl<T, D> Transform<Bytes, T> for RecordParser<T, D>
where
    T: Payload,
    D: LineDecoder<T>,
{
    async fn process(&mut self, input: Bytes) -> Result<Vec<T>> {
        let line = if self.strip_cr {
            strip_cr(&input)
        } else {
            &input[..]
        };

        if line.is_empty() && self.allow_empty_lines {
            return Ok(Vec::new());
        }

        match self.decoder.decode(line) {
            Ok(record) => {
                self.stats.decoded.fetch_add(1, Ordering::Relaxed);
                Ok(vec![record])
            }
            Err(err) => match self.policy {
                DecodePolicy::Skip => {
                    self.stats.skipped.fetch_add(1, Ordering::Relaxed);

                    #[cfg(feature = "tracing")]
                    tracing::event!(
                        tracing::Level::WARN,
                        event = "chunkflow.record.skipped",
                        bytes = line.len(),
                        preview = %preview(line),
                        error = %err,
                        "chunkflow.record.skipped"
                    );
                    #[cfg(not(feature = "tracing"))]
                    drop(err);

                    Ok(Vec::new())
                }
                DecodePolicy::Fail => Err(Error::stage(
                    "record_parser",
                    format!(
                        "failed to parse line ({} bytes, preview: {:?}): {}",
                        line.len(),
                        preview(line),
                        err
                    ),
                )),
            },
        }
    }
}

fn strip_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn preview(line: &[u8]) -> String {
    const PREVIEW_LEN: usize = 80;
    let text = String::from_utf8_lossy(line);
    let escaped = text.replace('\r', "\\r");
    let mut short = escaped.chars().take(PREVIEW_LEN).collect::<String>();
    if escaped.chars().count() > PREVIEW_LEN {
        short.push_str("...");
    }
    short
}
