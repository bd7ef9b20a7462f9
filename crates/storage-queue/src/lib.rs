//! # Storage Queue
//!
//! Transport layer for cloud storage queues: validated queue names,
//! account credentials, and queue clients for the REST API and for
//! in-memory testing.
//!
//! This library provides:
//! - Queue name validation following the service naming rules
//! - Shared Key and SAS credentials, plus connection string parsing
//! - Enqueue, dequeue, delete and count operations behind async traits
//! - Retry with exponential backoff for transient failures
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Queue names, identifiers and message envelopes
//! - [`provider`] - Provider types, limits and per-request options
//! - [`client`] - Client and handle traits
//! - [`credentials`] - Storage credentials and accounts
//! - [`providers`] - REST and in-memory implementations

pub mod client;
pub mod credentials;
pub mod error;
pub mod message;
pub mod provider;
pub mod providers;

// Re-export commonly used types at crate root for convenience
pub use client::{QueueClient, QueueHandle};
pub use credentials::{CredentialsError, StorageAccount, StorageCredentials};
pub use error::{QueueError, PayloadError, ValidationError};
pub use message::{MessageId, OutgoingMessage, PopReceipt, QueueMessage, QueueName, Timestamp};
pub use provider::{ProviderType, QueueRequestOptions};
pub use providers::{AzureStorageQueueClient, InMemoryQueueClient};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
