//! # Storage Queue Bus
//!
//! Typed message bus endpoints over storage queues.
//!
//! A service exchanges four categories of messages (commands, events,
//! requests and responses), each over its own queue. This library wires
//! those queues into endpoints:
//!
//! - a server endpoint consumes requests and commands and publishes events
//!   and responses
//! - a client endpoint does the mirror image over the same four queues
//!
//! Consumption is timer-driven polling with at-least-once fetch and
//! delete-before-decode semantics; see [`source`].
//!
//! ## Module Organization
//!
//! - [`category`] - Message categories, queue bindings and taxonomies
//! - [`codec`] - Serializer and deserializer contracts, JSON codec
//! - [`bus`] - Sources, publishers, endpoints and the endpoint registry
//! - [`scheduler`] - Injectable polling schedulers
//! - [`publisher`] - Queue publisher
//! - [`source`] - Polling message source
//! - [`provider`] - Endpoint provider
//! - [`builder`] - Staged endpoint builder
//! - [`settings`] - File and environment configuration
//! - [`error`] - Error types
//!
//! ## Example
//!
//! ```no_run
//! use serde::{Deserialize, Serialize};
//! use storage_queue_bus::{
//!     BusConfiguration, JsonDeserializerFactory, JsonSerializer, MessageTaxonomy,
//!     StorageQueueEndpointExt,
//! };
//!
//! #[derive(Serialize, Deserialize)]
//! struct PlaceOrder { id: u32 }
//! #[derive(Serialize, Deserialize)]
//! struct OrderPlaced { id: u32 }
//!
//! struct Orders;
//!
//! impl MessageTaxonomy for Orders {
//!     type Command = PlaceOrder;
//!     type Event = OrderPlaced;
//!     type Request = ();
//!     type Response = ();
//! }
//!
//! # fn main() -> Result<(), storage_queue_bus::ConfigurationError> {
//! let bus = BusConfiguration::<Orders>::new()
//!     .with_storage_queue_endpoint()
//!     .named("orders")?
//!     .with_connection_string("UseDevelopmentStorage=true")?
//!     .with_command_queue("orders-in", None)?
//!     .serialized_with(JsonSerializer, JsonDeserializerFactory)
//!     .as_server()?;
//!
//! let endpoints = bus.create_endpoints()?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod bus;
pub mod category;
pub mod codec;
pub mod error;
pub mod provider;
pub mod publisher;
pub mod scheduler;
pub mod settings;
pub mod source;

// Re-export commonly used types at crate root for convenience
pub use builder::{
    CredentialsStage, EndpointStage, MessageConfigStage, ServiceNameStage,
    StorageQueueEndpointExt,
};
pub use bus::{
    BusConfiguration, EndpointRegistry, EndpointRole, MessagePublisher, MessageSource,
    ServiceEndpoint, ServiceEndpointClient, ServiceEndpointProvider,
};
pub use category::{MessageCategory, MessageTaxonomy, QueueBinding};
pub use codec::{
    BusMessage, JsonDeserializer, JsonDeserializerFactory, JsonSerializer, MessageDeserializer,
    MessageDeserializerFactory, MessageSerializer,
};
pub use error::{CodecError, ConfigurationError, PublishError, SettingsError, SourceError};
pub use provider::StorageQueueEndpointProvider;
pub use publisher::{EnvelopeFn, StorageQueuePublisher};
pub use scheduler::{ManualScheduler, PollScheduler, Ticker, TokioScheduler};
pub use settings::{EndpointSettings, PollingSettings, QueueNameSettings};
pub use source::{SourceSettings, StorageQueueSource};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
