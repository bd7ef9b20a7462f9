//! Queue provider implementations.
//!
//! This module contains concrete implementations of the `QueueClient` and
//! `QueueHandle` traits for the storage queue REST API and for process-local
//! testing.

pub mod azure;
pub mod memory;

pub use azure::{AzureStorageQueue, AzureStorageQueueClient, STORAGE_API_VERSION};
pub use memory::InMemoryQueueClient;
