//! In-memory queue provider for testing and local development.
//!
//! Behaves like the storage queue service where consumers can observe it:
//! - queues must be created before use
//! - fetched messages stay invisible for the visibility timeout
//! - every fetch issues a new pop receipt; only the latest can delete
//! - dequeue counts grow with each delivery
//! - expired messages are dropped lazily
//!
//! Visibility and expiry use `tokio::time::Instant`, so tests running on a
//! paused clock control them through `tokio::time::advance`.

use crate::client::{validate_fetch, QueueClient, QueueHandle};
use crate::error::QueueError;
use crate::message::{MessageId, OutgoingMessage, PopReceipt, QueueMessage, QueueName, Timestamp};
use crate::provider::{ProviderType, QueueRequestOptions};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Visibility timeout applied when a fetch does not specify one
const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Time-to-live applied when a message does not specify one
const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

// ============================================================================
// Internal Storage Structures
// ============================================================================

#[derive(Default)]
struct AccountStorage {
    queues: HashMap<QueueName, InMemoryQueue>,
}

#[derive(Default)]
struct InMemoryQueue {
    messages: VecDeque<StoredMessage>,
}

impl InMemoryQueue {
    fn purge_expired(&mut self, now: Instant) {
        self.messages.retain(|m| m.expires_at > now);
    }
}

struct StoredMessage {
    message_id: MessageId,
    body: Bytes,
    dequeue_count: u32,
    inserted_at: Timestamp,
    expires_at: Instant,
    expires_at_timestamp: Timestamp,
    visible_at: Instant,
    pop_receipt: Option<PopReceipt>,
}

// ============================================================================
// InMemoryQueueClient
// ============================================================================

/// Process-local queue client; clones share the same storage
#[derive(Clone)]
pub struct InMemoryQueueClient {
    account_name: String,
    storage: Arc<Mutex<AccountStorage>>,
}

impl InMemoryQueueClient {
    pub fn new(account_name: impl Into<String>) -> Self {
        Self {
            account_name: account_name.into(),
            storage: Arc::new(Mutex::new(AccountStorage::default())),
        }
    }

    /// Names of all queues created so far, sorted
    pub fn queue_names(&self) -> Vec<QueueName> {
        let storage = lock(&self.storage);
        let mut names: Vec<QueueName> = storage.queues.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for InMemoryQueueClient {
    fn default() -> Self {
        Self::new("inmemory")
    }
}

impl QueueClient for InMemoryQueueClient {
    fn account_name(&self) -> &str {
        &self.account_name
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::InMemory
    }

    fn queue(&self, name: &QueueName) -> Arc<dyn QueueHandle> {
        Arc::new(InMemoryQueueHandle {
            name: name.clone(),
            storage: Arc::clone(&self.storage),
        })
    }
}

// ============================================================================
// InMemoryQueueHandle
// ============================================================================

/// Handle to one queue inside an [`InMemoryQueueClient`]
struct InMemoryQueueHandle {
    name: QueueName,
    storage: Arc<Mutex<AccountStorage>>,
}

impl InMemoryQueueHandle {
    fn with_queue<T>(
        &self,
        f: impl FnOnce(&mut InMemoryQueue) -> Result<T, QueueError>,
    ) -> Result<T, QueueError> {
        let mut storage = lock(&self.storage);
        let queue = storage
            .queues
            .get_mut(&self.name)
            .ok_or_else(|| QueueError::QueueNotFound {
                queue_name: self.name.to_string(),
            })?;
        queue.purge_expired(Instant::now());
        f(queue)
    }
}

#[async_trait]
impl QueueHandle for InMemoryQueueHandle {
    fn name(&self) -> &QueueName {
        &self.name
    }

    async fn create_if_not_exists(
        &self,
        _options: Option<&QueueRequestOptions>,
    ) -> Result<bool, QueueError> {
        let mut storage = lock(&self.storage);
        if storage.queues.contains_key(&self.name) {
            return Ok(false);
        }
        storage
            .queues
            .insert(self.name.clone(), InMemoryQueue::default());
        Ok(true)
    }

    async fn add_message(
        &self,
        message: OutgoingMessage,
        _options: Option<&QueueRequestOptions>,
    ) -> Result<(), QueueError> {
        let max_size = ProviderType::InMemory.max_message_size();
        let encoded_size = encoded_len(message.body.len());
        if encoded_size > max_size {
            return Err(QueueError::MessageTooLarge {
                size: encoded_size,
                max_size,
            });
        }

        let now = Instant::now();
        let inserted_at = Timestamp::now();
        let ttl = message.time_to_live.unwrap_or(DEFAULT_TIME_TO_LIVE);
        let delay = message.visibility_delay.unwrap_or(Duration::ZERO);

        self.with_queue(|queue| {
            queue.messages.push_back(StoredMessage {
                message_id: MessageId::new(),
                body: message.body,
                dequeue_count: 0,
                expires_at: now + ttl,
                expires_at_timestamp: inserted_at.after(ttl),
                inserted_at,
                visible_at: now + delay,
                pop_receipt: None,
            });
            Ok(())
        })
    }

    async fn get_messages(
        &self,
        max_messages: u32,
        visibility_timeout: Option<Duration>,
        _options: Option<&QueueRequestOptions>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        validate_fetch(ProviderType::InMemory, max_messages, visibility_timeout)?;
        let timeout = visibility_timeout.unwrap_or(DEFAULT_VISIBILITY_TIMEOUT);

        self.with_queue(|queue| {
            let now = Instant::now();
            let next_visible_at = Timestamp::now().after(timeout);

            let received = queue
                .messages
                .iter_mut()
                .filter(|m| m.visible_at <= now)
                .take(max_messages as usize)
                .map(|stored| {
                    let receipt = PopReceipt::generate();
                    stored.dequeue_count += 1;
                    stored.visible_at = now + timeout;
                    stored.pop_receipt = Some(receipt.clone());

                    QueueMessage {
                        message_id: stored.message_id.clone(),
                        pop_receipt: receipt,
                        body: stored.body.clone(),
                        dequeue_count: stored.dequeue_count,
                        inserted_at: stored.inserted_at.clone(),
                        expires_at: Some(stored.expires_at_timestamp.clone()),
                        next_visible_at: next_visible_at.clone(),
                    }
                })
                .collect();

            Ok(received)
        })
    }

    async fn delete_message(
        &self,
        message: &QueueMessage,
        _options: Option<&QueueRequestOptions>,
    ) -> Result<(), QueueError> {
        self.with_queue(|queue| {
            let position = queue
                .messages
                .iter()
                .position(|m| {
                    m.message_id == message.message_id
                        && m.pop_receipt.as_ref() == Some(&message.pop_receipt)
                })
                .ok_or_else(|| QueueError::MessageNotFound {
                    message_id: message.message_id.to_string(),
                })?;

            queue.messages.remove(position);
            Ok(())
        })
    }

    async fn approximate_message_count(
        &self,
        _options: Option<&QueueRequestOptions>,
    ) -> Result<u32, QueueError> {
        self.with_queue(|queue| Ok(u32::try_from(queue.messages.len()).unwrap_or(u32::MAX)))
    }
}

// A poisoned lock only means another test thread panicked mid-update; the
// queue contents are still structurally valid.
fn lock(storage: &Mutex<AccountStorage>) -> MutexGuard<'_, AccountStorage> {
    storage
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Size of `raw_len` bytes once base64 encoded, as the service stores them
pub(crate) fn encoded_len(raw_len: usize) -> usize {
    raw_len.div_ceil(3) * 4
}
