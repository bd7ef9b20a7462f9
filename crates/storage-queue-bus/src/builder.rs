//! Fluent, staged configuration of a storage queue endpoint.
//!
//! Each stage is its own type and only offers the calls valid at that
//! point, so an endpoint cannot be named twice or built before it has
//! credentials and a codec:
//!
//! ```text
//! ServiceNameStage --named--> CredentialsStage --with_*--> MessageConfigStage
//!     --serialized_with--> EndpointStage --as_client / as_server--> registry
//! ```
//!
//! Every call that takes input validates it immediately and returns a
//! [`ConfigurationError`] on failure.

use crate::bus::{EndpointRegistry, EndpointRole};
use crate::category::{MessageCategory, MessageTaxonomy};
use crate::codec::{MessageDeserializerFactory, MessageSerializer};
use crate::error::ConfigurationError;
use crate::provider::{ProviderParts, StorageQueueEndpointProvider};
use crate::scheduler::{PollScheduler, TokioScheduler};
use crate::source::SourceSettings;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use storage_queue::{
    CredentialsError, QueueClient, QueueRequestOptions, StorageAccount, StorageCredentials,
};
use tracing::{debug, info};

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;

/// Adds storage queue endpoints to any endpoint registry
pub trait StorageQueueEndpointExt<T: MessageTaxonomy>: EndpointRegistry<T> + Sized {
    /// Start configuring a storage queue endpoint on this registry
    fn with_storage_queue_endpoint(self) -> ServiceNameStage<T, Self> {
        ServiceNameStage::new(self)
    }
}

impl<T: MessageTaxonomy, R: EndpointRegistry<T>> StorageQueueEndpointExt<T> for R {}

// ============================================================================
// Service Name
// ============================================================================

/// First stage: the endpoint has no name yet
pub struct ServiceNameStage<T, R> {
    registry: R,
    _taxonomy: PhantomData<fn() -> T>,
}

impl<T: MessageTaxonomy, R: EndpointRegistry<T>> ServiceNameStage<T, R> {
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            _taxonomy: PhantomData,
        }
    }

    /// Name the service; the name is the prefix of every synthesized queue name
    ///
    /// # Errors
    ///
    /// `InvalidServiceName` when the name is empty or blank.
    pub fn named(self, service_name: &str) -> Result<CredentialsStage<T, R>, ConfigurationError> {
        if service_name.trim().is_empty() {
            return Err(ConfigurationError::InvalidServiceName {
                name: service_name.to_string(),
            });
        }

        Ok(CredentialsStage {
            registry: self.registry,
            service_name: service_name.to_string(),
            _taxonomy: PhantomData,
        })
    }
}

// ============================================================================
// Credentials
// ============================================================================

/// Second stage: named, waiting for credentials
///
/// All five entry points end up as one queue client.
pub struct CredentialsStage<T, R> {
    registry: R,
    service_name: String,
    _taxonomy: PhantomData<fn() -> T>,
}

impl<T: MessageTaxonomy, R: EndpointRegistry<T>> CredentialsStage<T, R> {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Authenticate with an account name and base64 account key over HTTPS
    pub fn with_account_credentials(
        self,
        account_name: &str,
        account_key: &str,
    ) -> Result<MessageConfigStage<T, R>, ConfigurationError> {
        let credentials = StorageCredentials::shared_key(account_name, account_key)?;
        self.with_storage_credentials(credentials, true)
    }

    /// Authenticate with a storage connection string
    ///
    /// Any parse failure is reported as `InvalidCredentialsConfiguration`.
    pub fn with_connection_string(
        self,
        connection_string: &str,
    ) -> Result<MessageConfigStage<T, R>, ConfigurationError> {
        let account = StorageAccount::parse(connection_string)?;
        self.with_storage_account(account)
    }

    /// Authenticate with prebuilt credentials
    pub fn with_storage_credentials(
        self,
        credentials: StorageCredentials,
        use_https: bool,
    ) -> Result<MessageConfigStage<T, R>, ConfigurationError> {
        let account = StorageAccount::new(credentials, use_https)?;
        self.with_storage_account(account)
    }

    /// Authenticate with a prebuilt account
    pub fn with_storage_account(
        self,
        account: StorageAccount,
    ) -> Result<MessageConfigStage<T, R>, ConfigurationError> {
        let client = account.create_queue_client()?;
        self.with_cloud_client(client)
    }

    /// Use an existing queue client as is
    pub fn with_cloud_client(
        self,
        client: Arc<dyn QueueClient>,
    ) -> Result<MessageConfigStage<T, R>, ConfigurationError> {
        if client.account_name().is_empty() {
            return Err(CredentialsError::MissingAccountName.into());
        }

        debug!(
            service = %self.service_name,
            account = %client.account_name(),
            provider = %client.provider_type().name(),
            "Queue client configured"
        );

        Ok(MessageConfigStage {
            registry: self.registry,
            draft: EndpointDraft::new(self.service_name, client),
            _taxonomy: PhantomData,
        })
    }
}

// ============================================================================
// Message Configuration
// ============================================================================

/// Configuration collected once credentials are known
struct EndpointDraft {
    service_name: String,
    client: Arc<dyn QueueClient>,
    default_queue: Option<String>,
    default_options: Option<QueueRequestOptions>,
    bindings: HashMap<MessageCategory, (String, Option<QueueRequestOptions>)>,
    source_settings: SourceSettings,
    scheduler: Arc<dyn PollScheduler>,
}

impl EndpointDraft {
    fn new(service_name: String, client: Arc<dyn QueueClient>) -> Self {
        Self {
            service_name,
            client,
            default_queue: None,
            default_options: None,
            bindings: HashMap::new(),
            source_settings: SourceSettings::default(),
            scheduler: Arc::new(TokioScheduler),
        }
    }
}

/// Third stage: credentials are set; queues, polling and codec come next
pub struct MessageConfigStage<T, R> {
    registry: R,
    draft: EndpointDraft,
    _taxonomy: PhantomData<fn() -> T>,
}

impl<T: MessageTaxonomy, R: EndpointRegistry<T>> MessageConfigStage<T, R> {
    /// Set the fallback queue and the fallback transport options
    ///
    /// The options apply to every category bound afterwards without options
    /// of its own, and to every category left unbound.
    pub fn with_default_config(
        mut self,
        queue_name: &str,
        options: Option<QueueRequestOptions>,
    ) -> Result<Self, ConfigurationError> {
        if queue_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_argument(
                "queue_name",
                "default queue name must not be empty",
            ));
        }

        self.draft.default_queue = Some(queue_name.to_string());
        self.draft.default_options = options;
        Ok(self)
    }

    /// Bind `category` to an explicit queue
    ///
    /// Without `options` the binding takes the default options as they are
    /// right now; a later `with_default_config` does not change it.
    pub fn with_queue(
        mut self,
        category: MessageCategory,
        queue_name: &str,
        options: Option<QueueRequestOptions>,
    ) -> Result<Self, ConfigurationError> {
        if queue_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_argument(
                "queue_name",
                format!("{} queue name must not be empty", category),
            ));
        }

        let options = options.or_else(|| self.draft.default_options.clone());
        self.draft
            .bindings
            .insert(category, (queue_name.to_string(), options));
        Ok(self)
    }

    pub fn with_command_queue(
        self,
        queue_name: &str,
        options: Option<QueueRequestOptions>,
    ) -> Result<Self, ConfigurationError> {
        self.with_queue(MessageCategory::Command, queue_name, options)
    }

    pub fn with_event_queue(
        self,
        queue_name: &str,
        options: Option<QueueRequestOptions>,
    ) -> Result<Self, ConfigurationError> {
        self.with_queue(MessageCategory::Event, queue_name, options)
    }

    pub fn with_request_queue(
        self,
        queue_name: &str,
        options: Option<QueueRequestOptions>,
    ) -> Result<Self, ConfigurationError> {
        self.with_queue(MessageCategory::Request, queue_name, options)
    }

    pub fn with_response_queue(
        self,
        queue_name: &str,
        options: Option<QueueRequestOptions>,
    ) -> Result<Self, ConfigurationError> {
        self.with_queue(MessageCategory::Response, queue_name, options)
    }

    /// Polling behavior for every source the endpoint creates
    pub fn with_source_settings(mut self, settings: SourceSettings) -> Result<Self, ConfigurationError> {
        settings.validate()?;
        self.draft.source_settings = settings;
        Ok(self)
    }

    /// Tick source for every source the endpoint creates
    pub fn with_scheduler(mut self, scheduler: Arc<dyn PollScheduler>) -> Self {
        self.draft.scheduler = scheduler;
        self
    }

    /// Set the codec; the endpoint can be built afterwards
    pub fn serialized_with<S, D>(self, serializer: S, deserializers: D) -> EndpointStage<T, R, S, D>
    where
        S: MessageSerializer,
        D: MessageDeserializerFactory,
    {
        EndpointStage {
            registry: self.registry,
            draft: self.draft,
            serializer: Arc::new(serializer),
            deserializers: Arc::new(deserializers),
            _taxonomy: PhantomData,
        }
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// Final stage: everything required is present
pub struct EndpointStage<T, R, S, D> {
    registry: R,
    draft: EndpointDraft,
    serializer: Arc<S>,
    deserializers: Arc<D>,
    _taxonomy: PhantomData<fn() -> T>,
}

impl<T, R, S, D> EndpointStage<T, R, S, D>
where
    T: MessageTaxonomy,
    R: EndpointRegistry<T>,
    S: MessageSerializer,
    D: MessageDeserializerFactory,
{
    /// Register the endpoint as a client of the service
    pub fn as_client(self) -> Result<R, ConfigurationError> {
        self.register(EndpointRole::Client)
    }

    /// Register the endpoint as the service itself
    pub fn as_server(self) -> Result<R, ConfigurationError> {
        self.register(EndpointRole::Server)
    }

    /// Register the endpoint as both sides
    pub fn as_client_and_server(self) -> Result<R, ConfigurationError> {
        self.register(EndpointRole::ClientAndServer)
    }

    /// Build the provider without registering it
    ///
    /// Returns the registry untouched alongside the provider.
    pub fn into_provider(
        self,
    ) -> Result<(R, StorageQueueEndpointProvider<T, S, D>), ConfigurationError> {
        let draft = self.draft;

        if draft.default_queue.is_none() && draft.bindings.is_empty() {
            return Err(ConfigurationError::ProviderConfiguration {
                reason: format!(
                    "endpoint '{}' has neither a default queue nor any queue binding",
                    draft.service_name
                ),
            });
        }

        let mut queue_names = HashMap::new();
        let mut options = HashMap::new();
        for category in MessageCategory::ALL {
            let bound_options = match draft.bindings.get(&category) {
                Some((name, bound)) => {
                    queue_names.insert(category, name.clone());
                    bound.clone()
                }
                None => draft.default_options.clone(),
            };
            if let Some(bound_options) = bound_options {
                options.insert(category, bound_options);
            }
        }

        let provider = StorageQueueEndpointProvider::from_parts(ProviderParts {
            service_name: draft.service_name,
            client: draft.client,
            queue_names,
            options,
            serializer: self.serializer,
            deserializers: self.deserializers,
            source_settings: draft.source_settings,
            scheduler: draft.scheduler,
        });

        // Fail here rather than on first use
        for category in MessageCategory::ALL {
            provider.resolve_queue_name(category)?;
        }

        Ok((self.registry, provider))
    }

    fn register(self, role: EndpointRole) -> Result<R, ConfigurationError> {
        let (mut registry, provider) = self.into_provider()?;

        info!(
            service = %provider.service_name(),
            role = ?role,
            "Storage queue endpoint registered"
        );
        registry.register(role, Arc::new(provider));
        Ok(registry)
    }
}

impl<T, R, S, D> fmt::Debug for EndpointStage<T, R, S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointStage")
            .field("service_name", &self.draft.service_name)
            .field("account", &self.draft.client.account_name())
            .field("default_queue", &self.draft.default_queue)
            .field("source_settings", &self.draft.source_settings)
            .finish()
    }
}
