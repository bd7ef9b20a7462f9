//! File and environment driven endpoint configuration.
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. an optional settings file (YAML, TOML or JSON, chosen by extension)
//! 2. environment variables prefixed `STORAGE_QUEUE_BUS__`, with `__`
//!    separating nested keys, e.g. `STORAGE_QUEUE_BUS__QUEUES__COMMAND=orders-in`
//!
//! Every field has a default, so a missing file only fails validation, not
//! loading.

use crate::builder::StorageQueueEndpointExt;
use crate::bus::{EndpointRegistry, EndpointRole};
use crate::category::{MessageCategory, MessageTaxonomy};
use crate::codec::{MessageDeserializerFactory, MessageSerializer};
use crate::error::{ConfigurationError, SettingsError};
use crate::source::SourceSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use storage_queue::{QueueRequestOptions, StorageCredentials};
use tracing::info;

#[cfg(test)]
#[path = "settings_tests.rs"]
mod tests;

/// Prefix of environment variables read by [`EndpointSettings::load`]
pub const ENV_PREFIX: &str = "STORAGE_QUEUE_BUS";

/// Everything needed to register a storage queue endpoint
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSettings {
    pub service_name: String,

    /// Full connection string; mutually exclusive with account name and key
    pub connection_string: Option<String>,

    pub account_name: Option<String>,

    /// Base64 account key
    pub account_key: Option<String>,

    /// Only used with account name and key
    pub use_https: bool,

    pub default_queue: Option<String>,

    pub queues: QueueNameSettings,

    pub polling: PollingSettings,

    /// Transport options for the default queue and every explicit binding
    pub request_options: Option<QueueRequestOptions>,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            connection_string: None,
            account_name: None,
            account_key: None,
            use_https: true,
            default_queue: None,
            queues: QueueNameSettings::default(),
            polling: PollingSettings::default(),
            request_options: None,
        }
    }
}

/// Explicit queue names per category
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueNameSettings {
    pub command: Option<String>,
    pub event: Option<String>,
    pub request: Option<String>,
    pub response: Option<String>,
}

impl QueueNameSettings {
    /// Configured bindings, in category order
    pub fn bindings(&self) -> Vec<(MessageCategory, &str)> {
        MessageCategory::ALL
            .into_iter()
            .filter_map(|category| {
                let name = match category {
                    MessageCategory::Command => &self.command,
                    MessageCategory::Event => &self.event,
                    MessageCategory::Request => &self.request,
                    MessageCategory::Response => &self.response,
                };
                name.as_deref().map(|name| (category, name))
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingSettings {
    pub max_messages: u32,
    pub interval_seconds: u64,
    pub visibility_timeout_seconds: Option<u64>,
}

impl Default for PollingSettings {
    fn default() -> Self {
        let defaults = SourceSettings::default();
        Self {
            max_messages: defaults.max_messages,
            interval_seconds: defaults.polling_interval.as_secs(),
            visibility_timeout_seconds: None,
        }
    }
}

impl EndpointSettings {
    /// Load settings from `path` (if given) and the environment
    ///
    /// # Errors
    ///
    /// `Load` when the file is missing or unreadable, or a value cannot be
    /// converted to its field type.
    pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading endpoint settings from file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let config = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Check required fields and value ranges
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.service_name.trim().is_empty() {
            return Err(SettingsError::Missing {
                field: "service_name",
            });
        }

        match (&self.connection_string, &self.account_name, &self.account_key) {
            (Some(_), None, None) => {}
            (Some(_), _, _) => {
                return Err(SettingsError::Invalid {
                    field: "connection_string",
                    reason: "cannot be combined with account_name or account_key".to_string(),
                })
            }
            (None, Some(_), Some(_)) => {}
            (None, Some(_), None) => return Err(SettingsError::Missing { field: "account_key" }),
            (None, None, Some(_)) => return Err(SettingsError::Missing { field: "account_name" }),
            (None, None, None) => {
                return Err(SettingsError::Missing {
                    field: "connection_string",
                })
            }
        }

        if self.default_queue.is_none() && self.queues.bindings().is_empty() {
            return Err(SettingsError::Missing {
                field: "default_queue",
            });
        }

        self.source_settings()
            .validate()
            .map_err(|e| SettingsError::Invalid {
                field: "polling",
                reason: e.to_string(),
            })
    }

    pub fn source_settings(&self) -> SourceSettings {
        let settings = SourceSettings::new()
            .with_max_messages(self.polling.max_messages)
            .with_polling_interval(Duration::from_secs(self.polling.interval_seconds));

        match self.polling.visibility_timeout_seconds {
            Some(seconds) => settings.with_visibility_timeout(Duration::from_secs(seconds)),
            None => settings,
        }
    }

    /// Validate, then register an endpoint on `registry` through the builder
    pub fn configure<T, R, S, D>(
        &self,
        registry: R,
        serializer: S,
        deserializers: D,
        role: EndpointRole,
    ) -> Result<R, SettingsError>
    where
        T: MessageTaxonomy,
        R: EndpointRegistry<T>,
        S: MessageSerializer,
        D: MessageDeserializerFactory,
    {
        self.validate()?;

        let named = registry
            .with_storage_queue_endpoint()
            .named(&self.service_name)?;

        let mut stage = match (&self.connection_string, &self.account_name, &self.account_key) {
            (Some(connection_string), _, _) => named.with_connection_string(connection_string)?,
            (None, Some(name), Some(key)) => {
                let credentials =
                    StorageCredentials::shared_key(name, key).map_err(ConfigurationError::from)?;
                named.with_storage_credentials(credentials, self.use_https)?
            }
            _ => {
                return Err(SettingsError::Missing {
                    field: "connection_string",
                })
            }
        };

        stage = stage.with_source_settings(self.source_settings())?;
        if let Some(default_queue) = &self.default_queue {
            stage = stage.with_default_config(default_queue, self.request_options.clone())?;
        }
        for (category, name) in self.queues.bindings() {
            stage = stage.with_queue(category, name, self.request_options.clone())?;
        }

        let stage = stage.serialized_with(serializer, deserializers);
        let registry = match role {
            EndpointRole::Client => stage.as_client()?,
            EndpointRole::Server => stage.as_server()?,
            EndpointRole::ClientAndServer => stage.as_client_and_server()?,
        };
        Ok(registry)
    }
}

impl fmt::Debug for EndpointSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |value: &Option<String>| value.as_ref().map(|_| "<REDACTED>");

        f.debug_struct("EndpointSettings")
            .field("service_name", &self.service_name)
            .field("connection_string", &redact(&self.connection_string))
            .field("account_name", &self.account_name)
            .field("account_key", &redact(&self.account_key))
            .field("use_https", &self.use_https)
            .field("default_queue", &self.default_queue)
            .field("queues", &self.queues)
            .field("polling", &self.polling)
            .field("request_options", &self.request_options)
            .finish()
    }
}
