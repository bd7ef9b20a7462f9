//! Client traits for queue operations.

use crate::error::QueueError;
use crate::message::{OutgoingMessage, QueueMessage, QueueName};
use crate::provider::{ProviderType, QueueRequestOptions};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;

/// Handle to a single named queue
///
/// Handles are cheap to create and hold no mutable state of their own, so
/// independent consumers can each own one for the same queue.
#[async_trait]
pub trait QueueHandle: Send + Sync {
    /// Name of the queue this handle addresses
    fn name(&self) -> &QueueName;

    /// Create the queue if it does not exist yet; returns `true` when created
    async fn create_if_not_exists(
        &self,
        options: Option<&QueueRequestOptions>,
    ) -> Result<bool, QueueError>;

    /// Enqueue a single message
    async fn add_message(
        &self,
        message: OutgoingMessage,
        options: Option<&QueueRequestOptions>,
    ) -> Result<(), QueueError>;

    /// Dequeue up to `max_messages` messages, hiding them for `visibility_timeout`
    ///
    /// `max_messages` must be within 1..=32. When `visibility_timeout` is
    /// `None` the service default (30 seconds) applies.
    async fn get_messages(
        &self,
        max_messages: u32,
        visibility_timeout: Option<Duration>,
        options: Option<&QueueRequestOptions>,
    ) -> Result<Vec<QueueMessage>, QueueError>;

    /// Permanently remove a previously fetched message
    async fn delete_message(
        &self,
        message: &QueueMessage,
        options: Option<&QueueRequestOptions>,
    ) -> Result<(), QueueError>;

    /// Approximate number of messages currently stored in the queue
    async fn approximate_message_count(
        &self,
        options: Option<&QueueRequestOptions>,
    ) -> Result<u32, QueueError>;
}

/// Account-level client that hands out queue handles by name
pub trait QueueClient: Send + Sync {
    /// Storage account the client is bound to
    fn account_name(&self) -> &str;

    /// Get provider type
    fn provider_type(&self) -> ProviderType;

    /// Get a fresh handle for the named queue; no network call is made
    fn queue(&self, name: &QueueName) -> Arc<dyn QueueHandle>;
}

/// Shared validation for fetch requests, applied by every provider
pub(crate) fn validate_fetch(
    provider: ProviderType,
    max_messages: u32,
    visibility_timeout: Option<Duration>,
) -> Result<(), QueueError> {
    let max = provider.max_messages_per_fetch();
    if max_messages == 0 || max_messages > max {
        return Err(QueueError::BatchTooLarge {
            size: max_messages as usize,
            max_size: max as usize,
        });
    }

    if let Some(timeout) = visibility_timeout {
        if timeout > provider.max_visibility_timeout() {
            return Err(crate::error::ValidationError::OutOfRange {
                field: "visibility_timeout".to_string(),
                message: format!("{:?} exceeds 7 days", timeout),
            }
            .into());
        }
    }

    Ok(())
}
