//! The message bus boundary: sources, publishers, endpoints and the
//! registry endpoint providers are handed to.

use crate::category::{MessageCategory, MessageTaxonomy, QueueBinding};
use crate::error::{ConfigurationError, PublishError, SourceError};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;
use std::sync::Arc;
use storage_queue::{QueueName, QueueRequestOptions};

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;

/// Continuous supply of decoded messages from one queue
pub trait MessageSource<M>: Send + Sync {
    /// Queue the source reads from
    fn address(&self) -> &QueueName;

    /// Transport options used for fetch and delete
    fn options(&self) -> Option<&QueueRequestOptions> {
        None
    }

    /// Start a new subscription
    ///
    /// The stream is infinite: it only ends after yielding a terminal
    /// transport error. Dropping it stops polling.
    fn messages(&self) -> BoxStream<'static, Result<M, SourceError>>;
}

/// Sends messages of one type to one queue
#[async_trait]
pub trait MessagePublisher<M: Sync>: Send + Sync {
    /// Queue the publisher writes to
    fn address(&self) -> &QueueName;

    /// Transport options used for enqueue
    fn options(&self) -> Option<&QueueRequestOptions> {
        None
    }

    async fn publish(&self, message: &M) -> Result<(), PublishError>;
}

fn binding(
    category: MessageCategory,
    queue: &QueueName,
    options: Option<&QueueRequestOptions>,
) -> QueueBinding {
    QueueBinding::new(category, queue.clone()).with_options(options.cloned())
}

/// Which side of a service an endpoint registration represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointRole {
    Client,
    Server,
    ClientAndServer,
}

impl EndpointRole {
    pub fn includes_client(&self) -> bool {
        matches!(self, Self::Client | Self::ClientAndServer)
    }

    pub fn includes_server(&self) -> bool {
        matches!(self, Self::Server | Self::ClientAndServer)
    }
}

/// Server side of a service: consumes requests and commands, publishes
/// events and responses
pub struct ServiceEndpoint<T: MessageTaxonomy> {
    pub name: String,
    pub requests: Box<dyn MessageSource<T::Request>>,
    pub commands: Box<dyn MessageSource<T::Command>>,
    pub events: Box<dyn MessagePublisher<T::Event>>,
    pub responses: Box<dyn MessagePublisher<T::Response>>,
}

impl<T: MessageTaxonomy> ServiceEndpoint<T> {
    /// Queues and options this endpoint uses, one per category
    pub fn bindings(&self) -> Vec<QueueBinding> {
        vec![
            binding(MessageCategory::Request, self.requests.address(), self.requests.options()),
            binding(MessageCategory::Command, self.commands.address(), self.commands.options()),
            binding(MessageCategory::Event, self.events.address(), self.events.options()),
            binding(MessageCategory::Response, self.responses.address(), self.responses.options()),
        ]
    }
}

impl<T: MessageTaxonomy> fmt::Debug for ServiceEndpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEndpoint")
            .field("name", &self.name)
            .field("bindings", &self.bindings())
            .finish()
    }
}

/// Client side of a service: publishes requests and commands, consumes
/// events and responses
pub struct ServiceEndpointClient<T: MessageTaxonomy> {
    pub name: String,
    pub requests: Box<dyn MessagePublisher<T::Request>>,
    pub commands: Box<dyn MessagePublisher<T::Command>>,
    pub events: Box<dyn MessageSource<T::Event>>,
    pub responses: Box<dyn MessageSource<T::Response>>,
}

impl<T: MessageTaxonomy> ServiceEndpointClient<T> {
    /// Queues and options this client uses, one per category
    pub fn bindings(&self) -> Vec<QueueBinding> {
        vec![
            binding(MessageCategory::Request, self.requests.address(), self.requests.options()),
            binding(MessageCategory::Command, self.commands.address(), self.commands.options()),
            binding(MessageCategory::Event, self.events.address(), self.events.options()),
            binding(MessageCategory::Response, self.responses.address(), self.responses.options()),
        ]
    }
}

impl<T: MessageTaxonomy> fmt::Debug for ServiceEndpointClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceEndpointClient")
            .field("name", &self.name)
            .field("bindings", &self.bindings())
            .finish()
    }
}

/// Creates the endpoints of one service on demand
pub trait ServiceEndpointProvider<T: MessageTaxonomy>: Send + Sync {
    /// Service name the provider was configured with
    fn name(&self) -> &str;

    /// Build a fresh server endpoint
    fn create_endpoint(&self) -> Result<ServiceEndpoint<T>, ConfigurationError>;

    /// Build a fresh client endpoint
    fn create_endpoint_client(&self) -> Result<ServiceEndpointClient<T>, ConfigurationError>;
}

/// Anything endpoint providers can be registered with
pub trait EndpointRegistry<T: MessageTaxonomy> {
    fn register(&mut self, role: EndpointRole, provider: Arc<dyn ServiceEndpointProvider<T>>);
}

impl<T: MessageTaxonomy, R: EndpointRegistry<T>> EndpointRegistry<T> for &mut R {
    fn register(&mut self, role: EndpointRole, provider: Arc<dyn ServiceEndpointProvider<T>>) {
        (**self).register(role, provider);
    }
}

// ============================================================================
// Bus Configuration
// ============================================================================

/// Registry of endpoint providers for one message taxonomy
pub struct BusConfiguration<T: MessageTaxonomy> {
    registrations: Vec<(EndpointRole, Arc<dyn ServiceEndpointProvider<T>>)>,
}

impl<T: MessageTaxonomy> BusConfiguration<T> {
    pub fn new() -> Self {
        Self {
            registrations: Vec::new(),
        }
    }

    /// Registered providers with their roles, in registration order
    pub fn registrations(&self) -> &[(EndpointRole, Arc<dyn ServiceEndpointProvider<T>>)] {
        &self.registrations
    }

    /// Create a server endpoint for every provider registered as a server
    pub fn create_endpoints(&self) -> Result<Vec<ServiceEndpoint<T>>, ConfigurationError> {
        self.registrations
            .iter()
            .filter(|(role, _)| role.includes_server())
            .map(|(_, provider)| provider.create_endpoint())
            .collect()
    }

    /// Create a client endpoint for every provider registered as a client
    pub fn create_endpoint_clients(
        &self,
    ) -> Result<Vec<ServiceEndpointClient<T>>, ConfigurationError> {
        self.registrations
            .iter()
            .filter(|(role, _)| role.includes_client())
            .map(|(_, provider)| provider.create_endpoint_client())
            .collect()
    }
}

impl<T: MessageTaxonomy> Default for BusConfiguration<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: MessageTaxonomy> EndpointRegistry<T> for BusConfiguration<T> {
    fn register(&mut self, role: EndpointRole, provider: Arc<dyn ServiceEndpointProvider<T>>) {
        self.registrations.push((role, provider));
    }
}

impl<T: MessageTaxonomy> fmt::Debug for BusConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<(EndpointRole, &str)> = self
            .registrations
            .iter()
            .map(|(role, provider)| (*role, provider.name()))
            .collect();
        f.debug_struct("BusConfiguration")
            .field("registrations", &entries)
            .finish()
    }
}
