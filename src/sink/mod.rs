//! Built-in sinks: an in-memory collector and async writers.

pub mod collect;
pub mod io;

pub use collect::CollectSink;
pub use io::{FileSink, WriterSink};
