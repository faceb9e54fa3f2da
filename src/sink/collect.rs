use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::chunk::{Chunk, Payload};
use crate::error::Result;
use crate::pipeline::stage::Sink;

/// Pushes every payload into a shared `Vec`.
pub struct CollectSink<T> {
    items: Arc<Mutex<Vec<T>>>,
}

impl<T> CollectSink<T> {
    pub fn new(items: Arc<Mutex<Vec<T>>>) -> Self {
        Self { items }
    }

    /// A sink plus the handle to read its items back.
    pub fn shared() -> (Self, Arc<Mutex<Vec<T>>>) {
        let items = Arc::new(Mutex::new(Vec::new()));
        (Self::new(items.clone()), items)
    }
}

#[async_trait]
impl<T: Payload> Sink<T> for CollectSink<T> {
    async fn consume(&mut self, chunk: Chunk<T>) -> Result<()> {
        let mut items = self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        items.push(chunk.into_payload());
        Ok(())
    }
}
