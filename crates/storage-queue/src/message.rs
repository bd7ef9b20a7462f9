//! Message types for queue operations including core domain identifiers.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Validated storage queue name
///
/// Storage queues are addressed by name inside the account URL, so the name
/// has to follow the service's DNS-compatible rules:
/// - 3-63 characters
/// - lowercase ASCII letters, digits and hyphens only
/// - first and last character must be a letter or digit
/// - no consecutive hyphens
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QueueName(String);

impl QueueName {
    pub const MIN_LENGTH: usize = 3;
    pub const MAX_LENGTH: usize = 63;

    /// Validate `name` against the service naming rules
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        match naming_violation(&name) {
            None => Ok(Self(name)),
            Some(NamingViolation::Empty) => Err(ValidationError::Required {
                field: "queue_name".to_string(),
            }),
            Some(NamingViolation::Length) => Err(ValidationError::OutOfRange {
                field: "queue_name".to_string(),
                message: format!(
                    "'{name}' must be {}-{} characters",
                    Self::MIN_LENGTH,
                    Self::MAX_LENGTH
                ),
            }),
            Some(NamingViolation::Character(c)) => Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: format!("'{name}' contains '{c}'; use lowercase letters, digits and hyphens"),
            }),
            Some(NamingViolation::Hyphen) => Err(ValidationError::InvalidFormat {
                field: "queue_name".to_string(),
                message: format!("'{name}' has a leading, trailing or doubled hyphen"),
            }),
        }
    }

    /// Create queue name as `{prefix}-{suffix}`
    pub fn with_suffix(prefix: &str, suffix: &str) -> Result<Self, ValidationError> {
        Self::new(format!("{}-{}", prefix, suffix))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

enum NamingViolation {
    Empty,
    Length,
    Character(char),
    Hyphen,
}

fn naming_violation(name: &str) -> Option<NamingViolation> {
    if name.is_empty() {
        return Some(NamingViolation::Empty);
    }
    if !(QueueName::MIN_LENGTH..=QueueName::MAX_LENGTH).contains(&name.len()) {
        return Some(NamingViolation::Length);
    }
    if let Some(c) = name
        .chars()
        .find(|c| !matches!(c, 'a'..='z' | '0'..='9' | '-'))
    {
        return Some(NamingViolation::Character(c));
    }
    if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
        return Some(NamingViolation::Hyphen);
    }
    None
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for QueueName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QueueName> for String {
    fn from(name: QueueName) -> Self {
        name.0
    }
}

/// Identifier assigned to a message by the queue service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Fresh id, as the in-memory provider assigns them
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "" => Err(ValidationError::Required {
                field: "message_id".to_string(),
            }),
            id => Ok(Self(id.to_string())),
        }
    }
}

/// Opaque token proving the holder dequeued a specific delivery of a message
///
/// A new pop receipt is issued every time a message is fetched; only the
/// latest one can delete the message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PopReceipt(String);

impl PopReceipt {
    /// Wrap a receipt issued by the service
    pub fn new(receipt: impl Into<String>) -> Self {
        Self(receipt.into())
    }

    /// Generate a fresh random receipt
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// UTC instant reported by, or sent to, the queue service
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Timestamp shifted forward by `duration`, saturating at the far future
    pub fn after(&self, duration: Duration) -> Self {
        let delta = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX);
        Self(
            self.0
                .checked_add_signed(delta)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    /// Parse an RFC 1123 timestamp as used in storage service responses
    pub fn parse_rfc1123(value: &str) -> Option<Self> {
        DateTime::parse_from_rfc2822(value)
            .ok()
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Format as RFC 1123 (`Sun, 06 Nov 1994 08:49:37 GMT`)
    pub fn to_rfc1123(&self) -> String {
        self.0.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_rfc1123())
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message to be added to a queue
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub body: Bytes,
    pub time_to_live: Option<Duration>,
    pub visibility_delay: Option<Duration>,
}

impl OutgoingMessage {
    /// Create new message carrying `body` verbatim
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            time_to_live: None,
            visibility_delay: None,
        }
    }

    /// Expire the message if it is not consumed within `ttl`
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Keep the message invisible for `delay` after it is added
    pub fn with_visibility_delay(mut self, delay: Duration) -> Self {
        self.visibility_delay = Some(delay);
        self
    }
}

/// A message fetched from a queue, together with the metadata needed to delete it
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub message_id: MessageId,
    pub pop_receipt: PopReceipt,
    pub body: Bytes,
    pub dequeue_count: u32,
    pub inserted_at: Timestamp,
    pub expires_at: Option<Timestamp>,
    pub next_visible_at: Timestamp,
}

impl QueueMessage {
    /// Raw payload bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Check whether the message has been handed out more than `max_count` times
    pub fn has_exceeded_dequeue_count(&self, max_count: u32) -> bool {
        self.dequeue_count > max_count
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
