pub mod memory;
pub mod retry;

pub use memory::MemoryBus;
pub use retry::{publish_with_retry, RetryPolicy};

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;

use crate::error::ChannelError;
use crate::types::{Envelope, Topic};

/// Asynchronous publish/subscribe transport addressed by topic.
///
/// Delivery guarantees are whatever the implementation provides; callers must
/// tolerate duplicates and filter messages that are not addressed to them.
#[async_trait]
pub trait Channel: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> Result<(), ChannelError>;

    async fn subscribe(&self, topics: &[Topic]) -> Result<Subscription, ChannelError>;
}

/// Inbound message stream for one subscriber.
pub struct Subscription {
    inner: Pin<Box<dyn Stream<Item = Envelope> + Send>>,
}

impl Subscription {
    pub fn new(stream: impl Stream<Item = Envelope> + Send + 'static) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for Subscription {
    type Item = Envelope;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
