use std::iter::Peekable;

use async_trait::async_trait;

use crate::chunk::Payload;
use crate::error::Result;
use crate::pipeline::stage::Source;

/// Emits the items of an iterator, flagging the final one as last.
pub struct IterSource<I: Iterator> {
    items: Peekable<I>,
}

impl<I: Iterator> IterSource<I> {
    pub fn new(items: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            items: items.into_iter().peekable(),
        }
    }
}

impl<T> IterSource<std::vec::IntoIter<T>> {
    pub fn from_vec(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

#[async_trait]
impl<I> Source<I::Item> for IterSource<I>
where
    I: Iterator + Send,
    I::Item: Payload,
{
    async fn produce(&mut self) -> Result<Option<I::Item>> {
        Ok(self.items.next())
    }

    fn is_exhausted(&mut self) -> bool {
        self.items.peek().is_none()
    }
}
