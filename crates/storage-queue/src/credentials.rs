//! Storage account credentials and connection strings.
//!
//! Every way of pointing the transport at an account (raw account name and
//! key, a credentials value, a parsed connection string, the local emulator)
//! ends up as a [`StorageAccount`], which is the only thing that can create a
//! queue client. Secret material is zeroized on drop and never printed.

use crate::client::QueueClient;
use crate::providers::AzureStorageQueueClient;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;
use zeroize::Zeroizing;

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;

type HmacSha256 = Hmac<Sha256>;

/// Account name used by the local storage emulator
pub const DEVELOPMENT_ACCOUNT_NAME: &str = "devstoreaccount1";

/// Well-known, public key of the local storage emulator account
pub const DEVELOPMENT_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";

/// Queue endpoint of the local storage emulator
pub const DEVELOPMENT_QUEUE_ENDPOINT: &str = "http://127.0.0.1:10001/devstoreaccount1";

const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Errors raised while validating credentials or parsing connection strings
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("Storage account name is required")]
    MissingAccountName,

    #[error("Invalid storage account name '{name}': {reason}")]
    InvalidAccountName { name: String, reason: String },

    #[error("Storage account key is required")]
    MissingAccountKey,

    #[error("Storage account key is invalid: {reason}")]
    InvalidAccountKey { reason: String },

    #[error("Shared access signature is empty")]
    EmptySignature,

    #[error("Storage account has no credentials")]
    MissingCredentials,

    #[error("Malformed connection string: {reason}")]
    MalformedConnectionString { reason: String },

    #[error("Invalid queue endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("HTTP client could not be created: {0}")]
    HttpClient(#[source] reqwest::Error),
}

// ============================================================================
// Credentials
// ============================================================================

/// Authentication material for a storage account
#[derive(Clone)]
pub enum StorageCredentials {
    /// Account name plus the decoded account key, used for Shared Key signing
    SharedKey {
        account_name: String,
        key: Zeroizing<Vec<u8>>,
    },
    /// Pre-signed shared access signature query string (without leading `?`)
    SharedAccessSignature { token: Zeroizing<String> },
}

impl StorageCredentials {
    /// Build Shared Key credentials from an account name and base64 account key
    pub fn shared_key(account_name: &str, account_key: &str) -> Result<Self, CredentialsError> {
        validate_account_name(account_name)?;

        if account_key.is_empty() {
            return Err(CredentialsError::MissingAccountKey);
        }

        let key = STANDARD
            .decode(account_key.trim())
            .map_err(|e| CredentialsError::InvalidAccountKey {
                reason: e.to_string(),
            })?;

        if key.is_empty() {
            return Err(CredentialsError::MissingAccountKey);
        }

        Ok(Self::SharedKey {
            account_name: account_name.to_string(),
            key: Zeroizing::new(key),
        })
    }

    /// Build credentials from a shared access signature token
    pub fn shared_access_signature(token: &str) -> Result<Self, CredentialsError> {
        let token = token.trim().trim_start_matches('?');
        if token.is_empty() {
            return Err(CredentialsError::EmptySignature);
        }

        Ok(Self::SharedAccessSignature {
            token: Zeroizing::new(token.to_string()),
        })
    }

    /// Account name embedded in the credentials, if any
    pub fn account_name(&self) -> Option<&str> {
        match self {
            Self::SharedKey { account_name, .. } => Some(account_name),
            Self::SharedAccessSignature { .. } => None,
        }
    }

    /// Compute the Shared Key `Authorization` header value for `string_to_sign`
    ///
    /// Returns `Ok(None)` for SAS credentials, which authenticate through the
    /// query string instead.
    pub fn authorization(&self, string_to_sign: &str) -> Result<Option<String>, CredentialsError> {
        match self {
            Self::SharedKey { account_name, key } => {
                let mut mac = HmacSha256::new_from_slice(key).map_err(|e| {
                    CredentialsError::InvalidAccountKey {
                        reason: e.to_string(),
                    }
                })?;
                mac.update(string_to_sign.as_bytes());
                let signature = STANDARD.encode(mac.finalize().into_bytes());
                Ok(Some(format!("SharedKey {}:{}", account_name, signature)))
            }
            Self::SharedAccessSignature { .. } => Ok(None),
        }
    }

    /// SAS token to append to request URLs, if these are SAS credentials
    pub fn sas_token(&self) -> Option<&str> {
        match self {
            Self::SharedKey { .. } => None,
            Self::SharedAccessSignature { token } => Some(token.as_str()),
        }
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedKey { account_name, .. } => f
                .debug_struct("SharedKey")
                .field("account_name", account_name)
                .field("key", &"<REDACTED>")
                .finish(),
            Self::SharedAccessSignature { .. } => f
                .debug_struct("SharedAccessSignature")
                .field("token", &"<REDACTED>")
                .finish(),
        }
    }
}

fn validate_account_name(name: &str) -> Result<(), CredentialsError> {
    if name.is_empty() {
        return Err(CredentialsError::MissingAccountName);
    }

    if name.len() < 3 || name.len() > 24 {
        return Err(CredentialsError::InvalidAccountName {
            name: name.to_string(),
            reason: "must be 3-24 characters".to_string(),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
    {
        return Err(CredentialsError::InvalidAccountName {
            name: name.to_string(),
            reason: "only lowercase letters and digits allowed".to_string(),
        });
    }

    Ok(())
}

// ============================================================================
// Storage Account
// ============================================================================

/// A storage account: where the queue service lives and how to authenticate
///
/// `StorageAccount::default()` is an unconfigured account; it exists so that
/// configuration can be assembled incrementally, and is rejected by
/// [`StorageAccount::create_queue_client`].
#[derive(Debug, Clone, Default)]
pub struct StorageAccount {
    account_name: String,
    credentials: Option<StorageCredentials>,
    use_https: bool,
    endpoint_suffix: Option<String>,
    queue_endpoint: Option<Url>,
}

impl StorageAccount {
    /// Account addressed through the public endpoint derived from the account name
    pub fn new(credentials: StorageCredentials, use_https: bool) -> Result<Self, CredentialsError> {
        let account_name = credentials
            .account_name()
            .ok_or(CredentialsError::MissingAccountName)?
            .to_string();

        Ok(Self {
            account_name,
            credentials: Some(credentials),
            use_https,
            endpoint_suffix: None,
            queue_endpoint: None,
        })
    }

    /// Account addressed through an explicit queue endpoint
    pub fn with_queue_endpoint(
        account_name: &str,
        credentials: StorageCredentials,
        endpoint: &str,
    ) -> Result<Self, CredentialsError> {
        validate_account_name(account_name)?;
        let url = parse_endpoint(endpoint)?;

        Ok(Self {
            account_name: account_name.to_string(),
            credentials: Some(credentials),
            use_https: url.scheme() == "https",
            endpoint_suffix: None,
            queue_endpoint: Some(url),
        })
    }

    /// The local storage emulator account
    pub fn development() -> Result<Self, CredentialsError> {
        let credentials =
            StorageCredentials::shared_key(DEVELOPMENT_ACCOUNT_NAME, DEVELOPMENT_ACCOUNT_KEY)?;
        Self::with_queue_endpoint(
            DEVELOPMENT_ACCOUNT_NAME,
            credentials,
            DEVELOPMENT_QUEUE_ENDPOINT,
        )
    }

    /// Parse a storage connection string
    ///
    /// Recognized keys: `DefaultEndpointsProtocol`, `AccountName`,
    /// `AccountKey`, `SharedAccessSignature`, `EndpointSuffix`,
    /// `QueueEndpoint`, `UseDevelopmentStorage`. Keys are case-insensitive;
    /// unknown keys (for other services) are ignored.
    pub fn parse(connection_string: &str) -> Result<Self, CredentialsError> {
        let settings = parse_settings(connection_string)?;
        let get = |key: &str| settings.get(key).map(String::as_str);

        if let Some(flag) = get("usedevelopmentstorage") {
            if flag.eq_ignore_ascii_case("true") {
                return Self::development();
            }
            return Err(malformed("UseDevelopmentStorage only supports 'true'"));
        }

        let use_https = match get("defaultendpointsprotocol") {
            None => true,
            Some(p) if p.eq_ignore_ascii_case("https") => true,
            Some(p) if p.eq_ignore_ascii_case("http") => false,
            Some(p) => {
                return Err(malformed(&format!(
                    "unsupported DefaultEndpointsProtocol '{}'",
                    p
                )))
            }
        };

        let account_name = get("accountname").unwrap_or_default();
        let credentials = match (get("accountkey"), get("sharedaccesssignature")) {
            (Some(_), Some(_)) => {
                return Err(malformed(
                    "AccountKey and SharedAccessSignature are mutually exclusive",
                ))
            }
            (Some(key), None) => StorageCredentials::shared_key(account_name, key)?,
            (None, Some(token)) => StorageCredentials::shared_access_signature(token)?,
            (None, None) => return Err(CredentialsError::MissingCredentials),
        };

        if let Some(endpoint) = get("queueendpoint") {
            let url = parse_endpoint(endpoint)?;
            let account_name = match account_name {
                "" => url
                    .host_str()
                    .and_then(|host| host.split('.').next())
                    .unwrap_or_default()
                    .to_string(),
                name => name.to_string(),
            };
            validate_account_name(&account_name)?;

            return Ok(Self {
                account_name,
                credentials: Some(credentials),
                use_https: url.scheme() == "https",
                endpoint_suffix: None,
                queue_endpoint: Some(url),
            });
        }

        validate_account_name(account_name)?;
        Ok(Self {
            account_name: account_name.to_string(),
            credentials: Some(credentials),
            use_https,
            endpoint_suffix: get("endpointsuffix").map(str::to_string),
            queue_endpoint: None,
        })
    }

    pub fn account_name(&self) -> &str {
        &self.account_name
    }

    pub fn credentials(&self) -> Option<&StorageCredentials> {
        self.credentials.as_ref()
    }

    pub fn use_https(&self) -> bool {
        self.use_https
    }

    /// Base URL of the queue service, always ending in `/`
    pub fn queue_endpoint(&self) -> Result<Url, CredentialsError> {
        if let Some(url) = &self.queue_endpoint {
            return Ok(url.clone());
        }

        if self.account_name.is_empty() {
            return Err(CredentialsError::MissingAccountName);
        }

        let scheme = if self.use_https { "https" } else { "http" };
        let suffix = self
            .endpoint_suffix
            .as_deref()
            .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
        parse_endpoint(&format!(
            "{}://{}.queue.{}/",
            scheme, self.account_name, suffix
        ))
    }

    /// URL of a single queue: `{queue endpoint}/{queue name}`
    pub fn queue_url(&self, queue_name: &str) -> Result<Url, CredentialsError> {
        let endpoint = self.queue_endpoint()?;
        endpoint
            .join(queue_name)
            .map_err(|source| CredentialsError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                source,
            })
    }

    /// Create a REST queue client for this account
    pub fn create_queue_client(&self) -> Result<Arc<dyn QueueClient>, CredentialsError> {
        if self.account_name.is_empty() {
            return Err(CredentialsError::MissingAccountName);
        }
        if self.credentials.is_none() {
            return Err(CredentialsError::MissingCredentials);
        }

        let client = AzureStorageQueueClient::new(self.clone())?;
        Ok(Arc::new(client))
    }
}

fn malformed(reason: &str) -> CredentialsError {
    CredentialsError::MalformedConnectionString {
        reason: reason.to_string(),
    }
}

fn parse_settings(connection_string: &str) -> Result<HashMap<String, String>, CredentialsError> {
    let mut settings = HashMap::new();

    for segment in connection_string.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }

        let (key, value) = segment
            .split_once('=')
            .ok_or_else(|| malformed(&format!("segment without '=': '{}'", key_only(segment))))?;

        let key = key.trim().to_ascii_lowercase();
        if key.is_empty() {
            return Err(malformed("empty key"));
        }

        if settings.insert(key.clone(), value.trim().to_string()).is_some() {
            return Err(malformed(&format!("duplicate key '{}'", key)));
        }
    }

    if settings.is_empty() {
        return Err(malformed("no settings found"));
    }

    Ok(settings)
}

// Segments without '=' might be a pasted secret; only echo a short prefix.
fn key_only(segment: &str) -> String {
    segment.chars().take(8).collect::<String>() + "..."
}

fn parse_endpoint(endpoint: &str) -> Result<Url, CredentialsError> {
    let normalized = if endpoint.ends_with('/') {
        endpoint.to_string()
    } else {
        format!("{}/", endpoint)
    };

    Url::parse(&normalized).map_err(|source| CredentialsError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        source,
    })
}
