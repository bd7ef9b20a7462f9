//! Endpoint provider: turns a finished configuration into server and
//! client endpoints over four category queues.

use crate::bus::{ServiceEndpoint, ServiceEndpointClient, ServiceEndpointProvider};
use crate::category::{MessageCategory, MessageTaxonomy};
use crate::codec::{BusMessage, MessageDeserializerFactory, MessageSerializer};
use crate::error::ConfigurationError;
use crate::publisher::StorageQueuePublisher;
use crate::scheduler::PollScheduler;
use crate::source::{SourceSettings, StorageQueueSource};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use storage_queue::{QueueClient, QueueName, QueueRequestOptions};
use tracing::info;

#[cfg(test)]
#[path = "provider_tests.rs"]
mod tests;

/// Creates storage queue endpoints for one service
///
/// The provider is immutable. Every call to [`create_endpoint`] or
/// [`create_endpoint_client`] builds new sources and publishers with their
/// own queue handles; nothing is cached between calls.
///
/// [`create_endpoint`]: ServiceEndpointProvider::create_endpoint
/// [`create_endpoint_client`]: ServiceEndpointProvider::create_endpoint_client
pub struct StorageQueueEndpointProvider<T, S, D> {
    service_name: String,
    client: Arc<dyn QueueClient>,
    queue_names: HashMap<MessageCategory, String>,
    options: HashMap<MessageCategory, QueueRequestOptions>,
    serializer: Arc<S>,
    deserializers: Arc<D>,
    source_settings: SourceSettings,
    scheduler: Arc<dyn PollScheduler>,
    _taxonomy: PhantomData<fn() -> T>,
}

/// Everything the builder collected, handed over in one piece
pub(crate) struct ProviderParts<S, D> {
    pub service_name: String,
    pub client: Arc<dyn QueueClient>,
    pub queue_names: HashMap<MessageCategory, String>,
    pub options: HashMap<MessageCategory, QueueRequestOptions>,
    pub serializer: Arc<S>,
    pub deserializers: Arc<D>,
    pub source_settings: SourceSettings,
    pub scheduler: Arc<dyn PollScheduler>,
}

impl<T, S, D> StorageQueueEndpointProvider<T, S, D>
where
    T: MessageTaxonomy,
    S: MessageSerializer,
    D: MessageDeserializerFactory,
{
    pub(crate) fn from_parts(parts: ProviderParts<S, D>) -> Self {
        Self {
            service_name: parts.service_name,
            client: parts.client,
            queue_names: parts.queue_names,
            options: parts.options,
            serializer: parts.serializer,
            deserializers: parts.deserializers,
            source_settings: parts.source_settings,
            scheduler: parts.scheduler,
            _taxonomy: PhantomData,
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Queue name for `category`: the explicit binding if one was
    /// configured, otherwise `{service}-{suffix}`
    ///
    /// # Errors
    ///
    /// `InvalidQueueConfiguration` when the name breaks the queue naming rules.
    pub fn resolve_queue_name(&self, category: MessageCategory) -> Result<QueueName, ConfigurationError> {
        let name = match self.queue_names.get(&category) {
            Some(name) => name.clone(),
            None => category.default_queue_name(&self.service_name),
        };

        QueueName::new(name.clone()).map_err(|source| ConfigurationError::InvalidQueueConfiguration {
            category,
            name,
            source,
        })
    }

    /// Transport options bound to `category`, if any
    pub fn options_for(&self, category: MessageCategory) -> Option<&QueueRequestOptions> {
        self.options.get(&category)
    }

    /// Build a fresh source consuming the queue bound to `category`
    pub fn create_source<M: BusMessage>(
        &self,
        category: MessageCategory,
    ) -> Result<StorageQueueSource<M>, ConfigurationError> {
        let queue = self.client.queue(&self.resolve_queue_name(category)?);
        StorageQueueSource::new(
            queue,
            self.deserializers.create::<M>(category),
            self.source_settings.clone(),
            self.options_for(category).cloned(),
            Arc::clone(&self.scheduler),
        )
    }

    /// Build a fresh publisher writing to the queue bound to `category`
    pub fn create_publisher<M: BusMessage>(
        &self,
        category: MessageCategory,
    ) -> Result<StorageQueuePublisher<M, S>, ConfigurationError> {
        let queue = self.client.queue(&self.resolve_queue_name(category)?);
        Ok(StorageQueuePublisher::new(queue, Arc::clone(&self.serializer))
            .with_options(self.options_for(category).cloned()))
    }
}

impl<T, S, D> ServiceEndpointProvider<T> for StorageQueueEndpointProvider<T, S, D>
where
    T: MessageTaxonomy,
    S: MessageSerializer,
    D: MessageDeserializerFactory,
{
    fn name(&self) -> &str {
        &self.service_name
    }

    fn create_endpoint(&self) -> Result<ServiceEndpoint<T>, ConfigurationError> {
        let endpoint = ServiceEndpoint {
            name: self.service_name.clone(),
            requests: Box::new(self.create_source::<T::Request>(MessageCategory::Request)?),
            commands: Box::new(self.create_source::<T::Command>(MessageCategory::Command)?),
            events: Box::new(self.create_publisher::<T::Event>(MessageCategory::Event)?),
            responses: Box::new(self.create_publisher::<T::Response>(MessageCategory::Response)?),
        };

        info!(
            service = %self.service_name,
            account = %self.client.account_name(),
            provider = %self.client.provider_type().name(),
            "Service endpoint created"
        );
        Ok(endpoint)
    }

    fn create_endpoint_client(&self) -> Result<ServiceEndpointClient<T>, ConfigurationError> {
        let client = ServiceEndpointClient {
            name: self.service_name.clone(),
            requests: Box::new(self.create_publisher::<T::Request>(MessageCategory::Request)?),
            commands: Box::new(self.create_publisher::<T::Command>(MessageCategory::Command)?),
            events: Box::new(self.create_source::<T::Event>(MessageCategory::Event)?),
            responses: Box::new(self.create_source::<T::Response>(MessageCategory::Response)?),
        };

        info!(
            service = %self.service_name,
            account = %self.client.account_name(),
            provider = %self.client.provider_type().name(),
            "Service endpoint client created"
        );
        Ok(client)
    }
}

impl<T, S, D> fmt::Debug for StorageQueueEndpointProvider<T, S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageQueueEndpointProvider")
            .field("service_name", &self.service_name)
            .field("account", &self.client.account_name())
            .field("queue_names", &self.queue_names)
            .field("source_settings", &self.source_settings)
            .finish()
    }
}
