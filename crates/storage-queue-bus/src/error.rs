//! Error types for endpoint configuration, polling and publishing.

use crate::category::MessageCategory;
use std::time::Duration;
use storage_queue::{CredentialsError, QueueError, QueueMessage, QueueName, ValidationError};
use thiserror::Error;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

/// Errors raised while assembling an endpoint
///
/// All of these surface synchronously at the builder call that caused them.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid service name '{name}': must not be empty")]
    InvalidServiceName { name: String },

    #[error("Invalid credentials configuration: {source}")]
    InvalidCredentialsConfiguration {
        #[source]
        source: CredentialsError,
    },

    #[error("Invalid queue name '{name}' for {category} messages: {source}")]
    InvalidQueueConfiguration {
        category: MessageCategory,
        name: String,
        #[source]
        source: ValidationError,
    },

    #[error("Endpoint provider cannot be created: {reason}")]
    ProviderConfiguration { reason: String },

    #[error("Invalid argument '{argument}': {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    #[error("Argument '{argument}' out of range: {reason}")]
    OutOfRange {
        argument: &'static str,
        reason: String,
    },
}

impl ConfigurationError {
    pub(crate) fn invalid_argument(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            argument,
            reason: reason.into(),
        }
    }
}

impl From<CredentialsError> for ConfigurationError {
    fn from(source: CredentialsError) -> Self {
        Self::InvalidCredentialsConfiguration { source }
    }
}

/// Errors emitted by a message source
#[derive(Debug, Error)]
pub enum SourceError {
    /// The message was fetched and removed from the queue but did not decode
    #[error(
        "Message {} on queue '{queue}' could not be deserialized as {type_name}",
        .message.message_id
    )]
    MessageDeserialization {
        queue: QueueName,
        type_name: String,
        message: Box<QueueMessage>,
        #[source]
        source: Option<CodecError>,
    },

    /// The transport failed; the stream ends after yielding this error
    #[error("Transport failure on queue '{queue}': {source}")]
    Transport {
        queue: QueueName,
        #[source]
        source: QueueError,
    },
}

impl SourceError {
    /// The raw message that failed to decode, if this is a decode failure
    pub fn message(&self) -> Option<&QueueMessage> {
        match self {
            Self::MessageDeserialization { message, .. } => Some(message),
            Self::Transport { .. } => None,
        }
    }

    /// Whether the stream keeps polling after this error
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Suggested delay before resubscribing after a terminal error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transport { source, .. } if source.is_transient() => source.retry_after(),
            _ => None,
        }
    }
}

/// Errors returned by a publisher
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Message could not be serialized: {0}")]
    Serialization(#[source] CodecError),

    /// The transport's own error, unchanged
    #[error("Transport failure on queue '{queue}': {source}")]
    Transport {
        queue: QueueName,
        #[source]
        source: QueueError,
    },
}

impl PublishError {
    /// Check if the publish may succeed when attempted again
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Serialization(_) => false,
            Self::Transport { source, .. } => source.is_transient(),
        }
    }
}

/// Errors raised by serializers and deserializers
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JSON codec failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{message}")]
    Custom { message: String },
}

impl CodecError {
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
        }
    }
}

/// Errors raised while loading or applying endpoint settings
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Setting '{field}' is required")]
    Missing { field: &'static str },

    #[error("Setting '{field}' is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Settings could not be applied: {0}")]
    Configuration(#[from] ConfigurationError),
}
