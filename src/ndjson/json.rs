use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::chunk::Payload;
use crate::error::Result;
use crate::ndjson::parser::{LineDecoder, RecordParser};
use crate::pipeline::stage::Transform;

/// One JSON document per line.
pub struct JsonLine<T>(PhantomData<fn() -> T>);

impl<T> JsonLine<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonLine<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> LineDecoder<T> for JsonLine<T> {
    fn decode(&mut self, line: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(line)?)
    }
}

/// Streaming NDJSON decoder: feed it the lines of a
/// [`LineSplitter`](crate::ndjson::LineSplitter).
pub type NdjsonDecoder<T> = RecordParser<T, JsonLine<T>>;

impl<T: DeserializeOwned> RecordParser<T, JsonLine<T>> {
    pub fn json() -> Self {
        Self::new(JsonLine::new())
    }
}

/// Serializes each record as one `\n`-terminated JSON line.
pub struct NdjsonEncoder<T>(PhantomData<fn(T)>);

impl<T> NdjsonEncoder<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for NdjsonEncoder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T> Transform<T, Bytes> for NdjsonEncoder<T>
where
    T: Payload + Serialize,
{
    async fn process(&mut self, input: T) -> Result<Vec<Bytes>> {
        let mut line = BytesMut::new().writer();
        serde_json::to_writer(&mut line, &input)?;
        let mut line = line.into_inner();
        line.put_u8(b'\n');
        Ok(vec![line.freeze()])
    }
}
