use std::marker::PhantomData;

use async_trait::async_trait;

use crate::chunk::Payload;
use crate::error::Result;
use crate::pipeline::stage::Transform;

/// map: I -> O
pub struct Map<F, I> {
    f: F,
    _input: PhantomData<fn(I)>,
}

impl<F, I> Map<F, I> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _input: PhantomData,
        }
    }
}

#[async_trait]
impl<I, O, F> Transform<I, O> for Map<F, I>
where
    I: Payload,
    O: Payload,
    F: FnMut(I) -> O + Send + 'static,
{
    async fn process(&mut self, input: I) -> Result<Vec<O>> {
        Ok(vec![(self.f)(input)])
    }
}

/// Keeps the items the predicate accepts.
pub struct Filter<P>(pub P);

#[async_trait]
impl<T, P> Transform<T, T> for Filter<P>
where
    T: Payload,
    P: FnMut(&T) -> bool + Send + 'static,
{
    async fn process(&mut self, input: T) -> Result<Vec<T>> {
        if (self.0)(&input) {
            Ok(vec![input])
        } else {
            Ok(Vec::new())
        }
    }
}

/// Passes items through untouched after showing them to `F`; handy for
/// running aggregates.
pub struct Inspect<F>(pub F);

#[async_trait]
impl<T, F> Transform<T, T> for Inspect<F>
where
    T: Payload,
    F: FnMut(&T) + Send + 'static,
{
    async fn process(&mut self, input: T) -> Result<Vec<T>> {
        (self.0)(&input);
        Ok(vec![input])
    }
}
