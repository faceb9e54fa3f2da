//! The unit of data that travels along an edge.

use bytes::{Bytes, BytesMut};

/// Anything that can ride inside a [`Chunk`].
///
/// `size` is what an edge counts against its high-water mark. The default of
/// `1` gives object-mode accounting (one record = one unit); byte buffers
/// override it with their length.
///
/// ```
/// use chunkflow::chunk::Payload;
///
/// struct Row {
///     id: u64,
/// }
///
/// impl Payload for Row {}
/// ```
pub trait Payload: Send + 'static {
    fn size(&self) -> usize {
        1
    }
}

impl Payload for Bytes {
    fn size(&self) -> usize {
        self.len()
    }
}

impl Payload for BytesMut {
    fn size(&self) -> usize {
        self.len()
    }
}

impl Payload for Vec<u8> {
    fn size(&self) -> usize {
        self.len()
    }
}

impl Payload for String {
    fn size(&self) -> usize {
        self.len()
    }
}

macro_rules! unit_payload {
    ($($t:ty),* $(,)?) => {
        $(impl Payload for $t {})*
    };
}

unit_payload!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize, f32, f64, bool, char, ());

#[cfg(feature = "ndjson")]
impl Payload for serde_json::Value {}

/// One immutable unit of data on an edge.
///
/// The producing edge stamps `sequence` when the chunk is offered; after that
/// the chunk is only read or consumed whole.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk<T> {
    payload: T,
    sequence: u64,
    is_last: bool,
    size: usize,
}

impl<T: Payload> Chunk<T> {
    pub fn new(payload: T) -> Self {
        let size = payload.size();
        Self {
            payload,
            sequence: 0,
            is_last: false,
            size,
        }
    }

    /// A chunk its producer already knows to be terminal.
    pub fn last(payload: T) -> Self {
        Self::new(payload).with_last(true)
    }
}

impl<T> Chunk<T> {
    pub(crate) fn with_last(mut self, is_last: bool) -> Self {
        self.is_last = is_last;
        self
    }

    pub(crate) fn stamp(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_last(&self) -> bool {
        self.is_last
    }

    /// Size counted against the edge's high-water mark, fixed at creation.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}
