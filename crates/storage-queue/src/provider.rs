//! Provider types, service limits, and per-request options.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Enumeration of supported queue providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderType {
    AzureStorageQueue,
    InMemory,
}

impl ProviderType {
    /// Maximum encoded message size accepted by the provider
    pub fn max_message_size(&self) -> usize {
        match self {
            Self::AzureStorageQueue => 64 * 1024,
            // Mirrors the cloud limit so tests catch oversized payloads early
            Self::InMemory => 64 * 1024,
        }
    }

    /// Maximum number of messages returned by a single fetch
    pub fn max_messages_per_fetch(&self) -> u32 {
        32
    }

    /// Longest visibility timeout the provider accepts
    pub fn max_visibility_timeout(&self) -> Duration {
        Duration::from_secs(7 * 24 * 60 * 60)
    }

    /// Provider name used in error reports
    pub fn name(&self) -> &'static str {
        match self {
            Self::AzureStorageQueue => "AzureStorageQueue",
            Self::InMemory => "InMemory",
        }
    }
}

/// Options applied to individual transport calls
///
/// Retries apply to transient failures only (see [`crate::QueueError::is_transient`]);
/// the delay doubles after each failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueRequestOptions {
    /// Timeout the service applies to the operation (`timeout` query parameter)
    #[serde(with = "optional_seconds")]
    pub server_timeout: Option<Duration>,

    /// Client-side limit for a single HTTP exchange
    #[serde(with = "optional_seconds")]
    pub maximum_execution_time: Option<Duration>,

    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Delay before the first retry
    #[serde(with = "seconds")]
    pub retry_base_delay: Duration,
}

impl Default for QueueRequestOptions {
    fn default() -> Self {
        Self {
            server_timeout: None,
            maximum_execution_time: Some(Duration::from_secs(30)),
            max_attempts: 3,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

impl QueueRequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server_timeout(mut self, timeout: Duration) -> Self {
        self.server_timeout = Some(timeout);
        self
    }

    pub fn with_maximum_execution_time(mut self, limit: Duration) -> Self {
        self.maximum_execution_time = Some(limit);
        self
    }

    /// Disable retries entirely
    pub fn without_retries(mut self) -> Self {
        self.max_attempts = 1;
        self
    }

    pub fn with_retries(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.retry_base_delay = base_delay;
        self
    }

    /// Delay to wait before attempt number `attempt` (1-based; attempt 1 has no delay)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.retry_base_delay.saturating_mul(1u32 << exponent)
    }
}

mod seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

mod optional_seconds {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;
