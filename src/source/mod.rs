//! Built-in sources: in-memory iterators and async readers.

pub mod fs;
pub mod iter;

pub use fs::{FileSource, ReaderSource};
pub use iter::IterSource;
