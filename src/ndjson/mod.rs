//! Newline-delimited records: a splitter for byte streams and a parser for
//! the resulting lines.

pub mod parser;
pub mod splitter;

#[cfg(feature = "ndjson")]
pub mod json;

pub use parser::{DecodePolicy, DecodeStats, FnDecoder, LineDecoder, RecordParser, Utf8Line};
pub use splitter::LineSplitter;

#[cfg(feature = "ndjson")]
pub use json::{JsonLine, NdjsonDecoder, NdjsonEncoder};
