//! Error types for queue operations.
//!
//! [`QueueError`] is what every transport call returns. Whether a failure is
//! worth another attempt is decided here, in one place, and the REST retry
//! loop and callers both ask [`QueueError::is_transient`].

use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

/// Failure of a single transport call
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue does not exist; queues are never created implicitly
    #[error("Queue '{queue_name}' does not exist")]
    QueueNotFound { queue_name: String },

    /// Already deleted, or the pop receipt is stale because the message
    /// became visible again and was fetched by someone else
    #[error("Message '{message_id}' is gone or its pop receipt is stale")]
    MessageNotFound { message_id: String },

    #[error("No response from the queue service within {duration:?}")]
    Timeout { duration: Duration },

    #[error("Could not reach the queue service: {message}")]
    ConnectionFailed { message: String },

    #[error("Queue service rejected the credentials: {message}")]
    AuthenticationFailed { message: String },

    #[error("Credentials do not allow '{operation}'")]
    PermissionDenied { operation: String },

    /// Size is measured after base64 encoding, as stored by the service
    #[error("Encoded message is {size} bytes; the limit is {max_size}")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Cannot fetch {size} messages at once; allowed range is 1..={max_size}")]
    BatchTooLarge { size: usize, max_size: usize },

    /// Any other error response, with the service's error code
    #[error("{provider} answered HTTP {status} ({code}): {message}")]
    ProviderError {
        provider: String,
        status: u16,
        code: String,
        message: String,
    },

    #[error("Malformed service payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),
}

impl QueueError {
    /// Whether repeating the same call may succeed
    ///
    /// Network trouble, timeouts, throttling (429) and 5xx answers qualify;
    /// everything else would fail the same way again.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::ConnectionFailed { .. } => true,
            Self::ProviderError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Minimum pause before repeating a transient call
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Timeout { .. } => Some(Duration::from_secs(1)),
            Self::ConnectionFailed { .. } | Self::ProviderError { status: 429, .. } => {
                Some(Duration::from_secs(5))
            }
            _ => None,
        }
    }

    /// HTTP status of a service error response, if this is one
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::ProviderError { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A service response that could not be decoded
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("XML could not be parsed: {message}")]
    InvalidXml { message: String },

    #[error("Message text is not valid base64: {message}")]
    InvalidBase64 { message: String },

    #[error("Element '{field}' is missing or malformed")]
    InvalidField { field: String },
}

/// Request arguments rejected before anything is sent
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("'{field}' is required")]
    Required { field: String },

    #[error("'{field}' is malformed: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("'{field}' is out of range: {message}")]
    OutOfRange { field: String, message: String },
}
