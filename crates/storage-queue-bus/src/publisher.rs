//! Publishes typed messages to one storage queue.

use crate::bus::MessagePublisher;
use crate::codec::{BusMessage, MessageSerializer};
use crate::error::PublishError;
use async_trait::async_trait;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use storage_queue::{OutgoingMessage, QueueHandle, QueueName, QueueRequestOptions};
use tracing::debug;

#[cfg(test)]
#[path = "publisher_tests.rs"]
mod tests;

/// Wraps serialized bytes into the envelope that is enqueued
pub type EnvelopeFn = Arc<dyn Fn(Vec<u8>) -> OutgoingMessage + Send + Sync>;

/// Serializes messages and adds them to a queue
///
/// Each publish is a single enqueue attempt; retries, if any, belong to the
/// transport options.
pub struct StorageQueuePublisher<M, S> {
    queue: Arc<dyn QueueHandle>,
    serializer: Arc<S>,
    envelope: EnvelopeFn,
    options: Option<QueueRequestOptions>,
    _message: PhantomData<fn(&M)>,
}

impl<M, S> StorageQueuePublisher<M, S>
where
    M: BusMessage,
    S: MessageSerializer,
{
    /// Publisher that enqueues the serialized bytes unchanged
    pub fn new(queue: Arc<dyn QueueHandle>, serializer: Arc<S>) -> Self {
        Self {
            queue,
            serializer,
            envelope: Arc::new(|bytes: Vec<u8>| OutgoingMessage::new(bytes)),
            options: None,
            _message: PhantomData,
        }
    }

    /// Replace the envelope constructor, e.g. to set a time-to-live
    pub fn with_envelope(
        mut self,
        envelope: impl Fn(Vec<u8>) -> OutgoingMessage + Send + Sync + 'static,
    ) -> Self {
        self.envelope = Arc::new(envelope);
        self
    }

    /// Transport options applied to every enqueue
    pub fn with_options(mut self, options: Option<QueueRequestOptions>) -> Self {
        self.options = options;
        self
    }

    pub async fn publish(&self, message: &M) -> Result<(), PublishError> {
        let bytes = self
            .serializer
            .serialize(message)
            .map_err(PublishError::Serialization)?;
        let size = bytes.len();

        self.queue
            .add_message((self.envelope)(bytes), self.options.as_ref())
            .await
            .map_err(|source| PublishError::Transport {
                queue: self.queue.name().clone(),
                source,
            })?;

        debug!(queue = %self.queue.name(), size = size, "Message published");
        Ok(())
    }
}

#[async_trait]
impl<M, S> MessagePublisher<M> for StorageQueuePublisher<M, S>
where
    M: BusMessage,
    S: MessageSerializer,
{
    fn address(&self) -> &QueueName {
        self.queue.name()
    }

    fn options(&self) -> Option<&QueueRequestOptions> {
        self.options.as_ref()
    }

    async fn publish(&self, message: &M) -> Result<(), PublishError> {
        StorageQueuePublisher::publish(self, message).await
    }
}

impl<M, S> fmt::Debug for StorageQueuePublisher<M, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageQueuePublisher")
            .field("queue", self.queue.name())
            .field("options", &self.options)
            .finish()
    }
}
