//! Timer-driven message source over one storage queue.
//!
//! Each subscription runs its own poll loop:
//!
//! 1. wait for the next scheduler tick
//! 2. fetch up to `max_messages` messages
//! 3. for each fetched message, in the order returned: delete it from the
//!    queue, decode it, then yield it downstream
//!
//! Messages are deleted *before* they are decoded, so a payload that fails
//! to decode is gone from the queue by the time the error is yielded. The
//! error carries the raw message so callers can park it elsewhere.
//!
//! Decode failures are yielded as errors and polling continues. Transport
//! failures are yielded once and end the stream; callers resubscribe if
//! they want to keep going.

use crate::bus::MessageSource;
use crate::codec::{BusMessage, MessageDeserializer};
use crate::error::{ConfigurationError, SourceError};
use crate::scheduler::{PollScheduler, Ticker};
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use storage_queue::{QueueHandle, QueueMessage, QueueName, QueueRequestOptions};
use tracing::{debug, error, warn};

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;

// ============================================================================
// Settings
// ============================================================================

/// Polling behavior of a message source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    /// Messages requested per fetch, 1..=32
    pub max_messages: u32,

    /// Time between fetches
    pub polling_interval: Duration,

    /// How long fetched messages stay hidden; `None` uses the queue default
    pub visibility_timeout: Option<Duration>,
}

impl SourceSettings {
    pub const MIN_MESSAGES: u32 = 1;
    pub const MAX_MESSAGES: u32 = 32;
    pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(5);
    pub const MAX_POLLING_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
    /// Longest visibility timeout the queue service accepts
    pub const MAX_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_messages(mut self, max_messages: u32) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(Self::MIN_MESSAGES..=Self::MAX_MESSAGES).contains(&self.max_messages) {
            return Err(ConfigurationError::OutOfRange {
                argument: "max_messages",
                reason: format!(
                    "{} is outside {}..={}",
                    self.max_messages,
                    Self::MIN_MESSAGES,
                    Self::MAX_MESSAGES
                ),
            });
        }

        if self.polling_interval.is_zero() {
            return Err(ConfigurationError::OutOfRange {
                argument: "polling_interval",
                reason: "must be greater than zero".to_string(),
            });
        }

        if self.polling_interval > Self::MAX_POLLING_INTERVAL {
            return Err(ConfigurationError::OutOfRange {
                argument: "polling_interval",
                reason: format!(
                    "{:?} exceeds {:?}",
                    self.polling_interval,
                    Self::MAX_POLLING_INTERVAL
                ),
            });
        }

        match self.visibility_timeout {
            Some(timeout) if timeout > Self::MAX_VISIBILITY_TIMEOUT => {
                Err(ConfigurationError::OutOfRange {
                    argument: "visibility_timeout",
                    reason: format!("{:?} exceeds {:?}", timeout, Self::MAX_VISIBILITY_TIMEOUT),
                })
            }
            _ => Ok(()),
        }
    }
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            max_messages: Self::MIN_MESSAGES,
            polling_interval: Self::DEFAULT_POLLING_INTERVAL,
            visibility_timeout: None,
        }
    }
}

// ============================================================================
// Source
// ============================================================================

/// Message source polling one storage queue
pub struct StorageQueueSource<M> {
    inner: Arc<SourceInner<M>>,
}

struct SourceInner<M> {
    queue: Arc<dyn QueueHandle>,
    deserializer: Arc<dyn MessageDeserializer<M>>,
    settings: SourceSettings,
    options: Option<QueueRequestOptions>,
    scheduler: Arc<dyn PollScheduler>,
}

impl<M: BusMessage> StorageQueueSource<M> {
    /// Create a source reading from `queue`
    ///
    /// Only the first deserializer of the set is ever consulted.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `deserializers` is empty
    /// - `OutOfRange` if `settings` fail validation
    pub fn new(
        queue: Arc<dyn QueueHandle>,
        deserializers: Vec<Arc<dyn MessageDeserializer<M>>>,
        settings: SourceSettings,
        options: Option<QueueRequestOptions>,
        scheduler: Arc<dyn PollScheduler>,
    ) -> Result<Self, ConfigurationError> {
        let deserializer = deserializers.first().cloned().ok_or_else(|| {
            ConfigurationError::invalid_argument(
                "deserializers",
                "at least one deserializer is required",
            )
        })?;
        settings.validate()?;

        if deserializers.len() > 1 {
            debug!(
                queue = %queue.name(),
                count = deserializers.len(),
                "Only the first deserializer is consulted"
            );
        }

        Ok(Self {
            inner: Arc::new(SourceInner {
                queue,
                deserializer,
                settings,
                options,
                scheduler,
            }),
        })
    }

    pub fn settings(&self) -> &SourceSettings {
        &self.inner.settings
    }

    /// Start a new polling subscription
    pub fn messages(&self) -> BoxStream<'static, Result<M, SourceError>> {
        let state = PollState {
            ticker: self
                .inner
                .scheduler
                .ticker(self.inner.settings.polling_interval),
            inner: Arc::clone(&self.inner),
            pending: VecDeque::new(),
            finished: false,
        };

        stream::unfold(state, |mut state| async move {
            let item = state.next_item().await?;
            Some((item, state))
        })
        .boxed()
    }
}

impl<M: BusMessage> MessageSource<M> for StorageQueueSource<M> {
    fn address(&self) -> &QueueName {
        self.inner.queue.name()
    }

    fn options(&self) -> Option<&QueueRequestOptions> {
        self.inner.options.as_ref()
    }

    fn messages(&self) -> BoxStream<'static, Result<M, SourceError>> {
        StorageQueueSource::messages(self)
    }
}

impl<M> fmt::Debug for StorageQueueSource<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageQueueSource")
            .field("queue", self.inner.queue.name())
            .field("settings", &self.inner.settings)
            .finish()
    }
}

// ============================================================================
// Poll Loop
// ============================================================================

struct PollState<M> {
    inner: Arc<SourceInner<M>>,
    ticker: Box<dyn Ticker>,
    pending: VecDeque<QueueMessage>,
    finished: bool,
}

impl<M: BusMessage> PollState<M> {
    async fn next_item(&mut self) -> Option<Result<M, SourceError>> {
        if self.finished {
            return None;
        }

        loop {
            if let Some(message) = self.pending.pop_front() {
                return Some(self.consume(message).await);
            }

            self.ticker.tick().await;

            let inner = &self.inner;
            match inner
                .queue
                .get_messages(
                    inner.settings.max_messages,
                    inner.settings.visibility_timeout,
                    inner.options.as_ref(),
                )
                .await
            {
                Ok(batch) => {
                    debug!(queue = %inner.queue.name(), count = batch.len(), "Poll cycle completed");
                    self.pending.extend(batch);
                }
                Err(source) => {
                    error!(queue = %inner.queue.name(), error = %source, "Fetch failed; ending message stream");
                    self.finished = true;
                    return Some(Err(SourceError::Transport {
                        queue: inner.queue.name().clone(),
                        source,
                    }));
                }
            }
        }
    }

    async fn consume(&mut self, message: QueueMessage) -> Result<M, SourceError> {
        let inner = &self.inner;

        if let Err(source) = inner
            .queue
            .delete_message(&message, inner.options.as_ref())
            .await
        {
            error!(
                queue = %inner.queue.name(),
                message_id = %message.message_id,
                error = %source,
                "Delete failed; ending message stream"
            );
            self.finished = true;
            return Err(SourceError::Transport {
                queue: inner.queue.name().clone(),
                source,
            });
        }

        let decoded = inner.deserializer.deserialize(message.as_bytes());
        match decoded {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(inner.decode_failure(message, None)),
            Err(e) => Err(inner.decode_failure(message, Some(e))),
        }
    }
}

impl<M> SourceInner<M> {
    fn decode_failure(
        &self,
        message: QueueMessage,
        source: Option<crate::error::CodecError>,
    ) -> SourceError {
        let type_name = self.deserializer.type_name();
        warn!(
            queue = %self.queue.name(),
            message_id = %message.message_id,
            dequeue_count = message.dequeue_count,
            type_name = %type_name,
            "Message removed from queue could not be deserialized"
        );

        SourceError::MessageDeserialization {
            queue: self.queue.name().clone(),
            type_name,
            message: Box::new(message),
            source,
        }
    }
}
