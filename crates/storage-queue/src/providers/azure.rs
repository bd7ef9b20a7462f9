//! Azure Storage Queue provider over the REST API.
//!
//! Requests are authenticated either with Shared Key signing (HMAC-SHA256
//! over the canonical string-to-sign) or with a shared access signature
//! appended to the query string. Message bodies travel base64 encoded inside
//! the service's XML envelope.
//!
//! Transient failures (timeouts, connection errors, 5xx and 429 responses)
//! are retried according to [`QueueRequestOptions`]; everything else is
//! mapped to a [`QueueError`] and returned immediately.

use crate::client::{validate_fetch, QueueClient, QueueHandle};
use crate::credentials::{CredentialsError, StorageAccount};
use crate::error::{QueueError, PayloadError};
use crate::message::{MessageId, OutgoingMessage, PopReceipt, QueueMessage, QueueName, Timestamp};
use crate::provider::{ProviderType, QueueRequestOptions};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Method, Response, StatusCode};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

#[cfg(test)]
#[path = "azure_tests.rs"]
mod tests;

/// REST API version sent with every request
pub const STORAGE_API_VERSION: &str = "2021-12-02";

const PROVIDER_NAME: &str = "AzureStorageQueue";
const ERROR_CODE_HEADER: &str = "x-ms-error-code";
const MESSAGE_COUNT_HEADER: &str = "x-ms-approximate-messages-count";

// ============================================================================
// Client
// ============================================================================

/// Queue client talking to the storage queue REST endpoint of one account
#[derive(Clone)]
pub struct AzureStorageQueueClient {
    context: Arc<RestContext>,
}

impl AzureStorageQueueClient {
    /// Create a client for `account`
    ///
    /// # Errors
    ///
    /// Returns `CredentialsError` if the account has no credentials or no
    /// usable queue endpoint, or the HTTP client cannot be built.
    pub fn new(account: StorageAccount) -> Result<Self, CredentialsError> {
        let endpoint = account.queue_endpoint()?;
        if account.credentials().is_none() {
            return Err(CredentialsError::MissingCredentials);
        }

        let http = reqwest::Client::builder()
            .build()
            .map_err(CredentialsError::HttpClient)?;

        Ok(Self {
            context: Arc::new(RestContext {
                account,
                endpoint,
                http,
            }),
        })
    }

    /// Base URL of the queue service
    pub fn endpoint(&self) -> &Url {
        &self.context.endpoint
    }
}

impl fmt::Debug for AzureStorageQueueClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureStorageQueueClient")
            .field("account_name", &self.context.account.account_name())
            .field("endpoint", &self.context.endpoint.as_str())
            .finish()
    }
}

impl QueueClient for AzureStorageQueueClient {
    fn account_name(&self) -> &str {
        self.context.account.account_name()
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::AzureStorageQueue
    }

    fn queue(&self, name: &QueueName) -> Arc<dyn QueueHandle> {
        Arc::new(AzureStorageQueue {
            name: name.clone(),
            context: Arc::clone(&self.context),
        })
    }
}

// ============================================================================
// Queue Handle
// ============================================================================

/// Handle to a single queue on the REST endpoint
pub struct AzureStorageQueue {
    name: QueueName,
    context: Arc<RestContext>,
}

impl AzureStorageQueue {
    fn messages_path(&self) -> String {
        format!("{}/messages", self.name)
    }
}

#[async_trait]
impl QueueHandle for AzureStorageQueue {
    fn name(&self) -> &QueueName {
        &self.name
    }

    async fn create_if_not_exists(
        &self,
        options: Option<&QueueRequestOptions>,
    ) -> Result<bool, QueueError> {
        let request = RestRequest::new(Method::PUT, self.name.to_string());
        let target = Target::queue(&self.name, "create_queue");

        match self.context.send(request, options, &target).await {
            Ok(response) => Ok(response.status() == StatusCode::CREATED),
            // Queue exists with different metadata; still usable
            Err(QueueError::ProviderError { status: 409, code, .. })
                if code == "QueueAlreadyExists" =>
            {
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn add_message(
        &self,
        message: OutgoingMessage,
        options: Option<&QueueRequestOptions>,
    ) -> Result<(), QueueError> {
        let encoded = STANDARD.encode(&message.body);
        let max_size = ProviderType::AzureStorageQueue.max_message_size();
        if encoded.len() > max_size {
            return Err(QueueError::MessageTooLarge {
                size: encoded.len(),
                max_size,
            });
        }

        let mut request = RestRequest::new(Method::POST, self.messages_path())
            .with_body(format!(
                "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
                encoded
            ));
        if let Some(ttl) = message.time_to_live {
            request = request.with_query("messagettl", ttl.as_secs().to_string());
        }
        if let Some(delay) = message.visibility_delay {
            request = request.with_query("visibilitytimeout", delay.as_secs().to_string());
        }

        let target = Target::queue(&self.name, "add_message");
        self.context.send(request, options, &target).await?;
        debug!(queue = %self.name, size = encoded.len(), "Message added");
        Ok(())
    }

    async fn get_messages(
        &self,
        max_messages: u32,
        visibility_timeout: Option<Duration>,
        options: Option<&QueueRequestOptions>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        validate_fetch(
            ProviderType::AzureStorageQueue,
            max_messages,
            visibility_timeout,
        )?;

        let mut request = RestRequest::new(Method::GET, self.messages_path())
            .with_query("numofmessages", max_messages.to_string());
        if let Some(timeout) = visibility_timeout {
            request = request.with_query("visibilitytimeout", timeout.as_secs().to_string());
        }

        let target = Target::queue(&self.name, "get_messages");
        let response = self.context.send(request, options, &target).await?;
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, options))?;

        let messages = parse_messages(&body)?;
        debug!(queue = %self.name, count = messages.len(), "Messages received");
        Ok(messages)
    }

    async fn delete_message(
        &self,
        message: &QueueMessage,
        options: Option<&QueueRequestOptions>,
    ) -> Result<(), QueueError> {
        let request = RestRequest::new(
            Method::DELETE,
            format!("{}/{}", self.messages_path(), message.message_id),
        )
        .with_query("popreceipt", message.pop_receipt.as_str().to_string());

        let target = Target::message(&self.name, &message.message_id, "delete_message");
        self.context.send(request, options, &target).await?;
        Ok(())
    }

    async fn approximate_message_count(
        &self,
        options: Option<&QueueRequestOptions>,
    ) -> Result<u32, QueueError> {
        let request = RestRequest::new(Method::GET, self.name.to_string())
            .with_query("comp", "metadata".to_string());

        let target = Target::queue(&self.name, "get_queue_metadata");
        let response = self.context.send(request, options, &target).await?;

        response
            .headers()
            .get(MESSAGE_COUNT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u32>().ok())
            .ok_or_else(|| {
                PayloadError::InvalidField {
                    field: MESSAGE_COUNT_HEADER.to_string(),
                }
                .into()
            })
    }
}

// ============================================================================
// Request Execution
// ============================================================================

struct RestContext {
    account: StorageAccount,
    endpoint: Url,
    http: reqwest::Client,
}

struct RestRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<String>,
}

impl RestRequest {
    fn new(method: Method, path: String) -> Self {
        Self {
            method,
            path,
            query: Vec::new(),
            body: None,
        }
    }

    fn with_query(mut self, name: &'static str, value: String) -> Self {
        self.query.push((name, value));
        self
    }

    fn with_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self
    }
}

/// What a request addresses, used to build precise errors
struct Target<'a> {
    queue: &'a QueueName,
    message_id: Option<&'a MessageId>,
    operation: &'static str,
}

impl<'a> Target<'a> {
    fn queue(queue: &'a QueueName, operation: &'static str) -> Self {
        Self {
            queue,
            message_id: None,
            operation,
        }
    }

    fn message(queue: &'a QueueName, message_id: &'a MessageId, operation: &'static str) -> Self {
        Self {
            queue,
            message_id: Some(message_id),
            operation,
        }
    }
}

impl RestContext {
    async fn send(
        &self,
        request: RestRequest,
        options: Option<&QueueRequestOptions>,
        target: &Target<'_>,
    ) -> Result<Response, QueueError> {
        let defaults = QueueRequestOptions::default();
        let options = options.unwrap_or(&defaults);
        let max_attempts = options.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            let delay = options.backoff_for(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.send_once(&request, options, target).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        queue = %target.queue,
                        operation = target.operation,
                        attempt = attempt,
                        error = %e,
                        "Transient storage failure, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(
        &self,
        request: &RestRequest,
        options: &QueueRequestOptions,
        target: &Target<'_>,
    ) -> Result<Response, QueueError> {
        let url = self.request_url(request, options)?;
        let date = Timestamp::now().to_rfc1123();
        let body = request.body.clone().unwrap_or_default();
        let content_type = if request.body.is_some() {
            "application/xml"
        } else {
            ""
        };

        let mut builder = self
            .http
            .request(request.method.clone(), url.clone())
            .header("x-ms-date", &date)
            .header("x-ms-version", STORAGE_API_VERSION);

        if let Some(credentials) = self.account.credentials() {
            let string_to_sign = string_to_sign(
                &request.method,
                body.len(),
                content_type,
                &date,
                &canonical_resource(self.account.account_name(), &url),
            );
            let authorization = credentials
                .authorization(&string_to_sign)
                .map_err(|e| QueueError::AuthenticationFailed {
                    message: e.to_string(),
                })?;
            if let Some(value) = authorization {
                builder = builder.header("Authorization", value);
            }
        }

        if request.body.is_some() {
            builder = builder.header("Content-Type", content_type).body(body);
        }
        if let Some(limit) = options.maximum_execution_time {
            builder = builder.timeout(limit);
        }

        debug!(
            method = %request.method,
            queue = %target.queue,
            operation = target.operation,
            "Sending storage request"
        );

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(e, Some(options)))?;

        if response.status().is_success() {
            return Ok(response);
        }

        Err(error_from_response(response, target).await)
    }

    fn request_url(
        &self,
        request: &RestRequest,
        options: &QueueRequestOptions,
    ) -> Result<Url, QueueError> {
        let mut url =
            self.endpoint
                .join(&request.path)
                .map_err(|e| QueueError::ConnectionFailed {
                    message: format!("invalid request URL for '{}': {}", request.path, e),
                })?;

        {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in &request.query {
                pairs.append_pair(name, value);
            }
            if let Some(timeout) = options.server_timeout {
                pairs.append_pair("timeout", &timeout.as_secs().to_string());
            }
        }

        if let Some(token) = self.account.credentials().and_then(|c| c.sas_token()) {
            let query = match url.query() {
                Some(existing) if !existing.is_empty() => format!("{}&{}", existing, token),
                _ => token.to_string(),
            };
            url.set_query(Some(&query));
        }

        if url.query() == Some("") {
            url.set_query(None);
        }

        Ok(url)
    }
}

// ============================================================================
// Shared Key Signing
// ============================================================================

/// Build the Shared Key string-to-sign for a request
///
/// Only `x-ms-date` and `x-ms-version` are sent as `x-ms-*` headers, so the
/// canonicalized header block is fixed. A zero content length is signed as
/// an empty string.
pub(crate) fn string_to_sign(
    method: &Method,
    content_length: usize,
    content_type: &str,
    date: &str,
    canonical_resource: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    let headers = format!("x-ms-date:{}\nx-ms-version:{}\n", date, STORAGE_API_VERSION);

    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}{}",
        method.as_str(),
        length,
        content_type,
        headers,
        canonical_resource
    )
}

/// `/{account}{path}` followed by sorted, lowercased query parameters
pub(crate) fn canonical_resource(account_name: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account_name, url.path());

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
        .collect();
    params.sort();

    for (name, value) in params {
        resource.push('\n');
        resource.push_str(&name);
        resource.push(':');
        resource.push_str(&value);
    }

    resource
}

// ============================================================================
// Error Mapping
// ============================================================================

fn transport_error(error: reqwest::Error, options: Option<&QueueRequestOptions>) -> QueueError {
    if error.is_timeout() {
        let duration = options
            .and_then(|o| o.maximum_execution_time)
            .unwrap_or_default();
        return QueueError::Timeout { duration };
    }

    QueueError::ConnectionFailed {
        message: error.to_string(),
    }
}

async fn error_from_response(response: Response, target: &Target<'_>) -> QueueError {
    let status = response.status().as_u16();
    let header_code = response
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    let (body_code, body_message) = parse_error_body(&body);

    let code = header_code.or(body_code).unwrap_or_default();
    let message = body_message.unwrap_or_else(|| format!("HTTP {}", status));

    map_error(status, code, message, target)
}

fn map_error(status: u16, code: String, message: String, target: &Target<'_>) -> QueueError {
    match (status, code.as_str()) {
        (404, "QueueNotFound") | (404, "QueueBeingDeleted") => QueueError::QueueNotFound {
            queue_name: target.queue.to_string(),
        },
        (404, "MessageNotFound") | (400, "PopReceiptMismatch") => QueueError::MessageNotFound {
            message_id: target
                .message_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
        },
        (413, _) | (_, "RequestBodyTooLarge") => QueueError::MessageTooLarge {
            size: 0,
            max_size: ProviderType::AzureStorageQueue.max_message_size(),
        },
        (401, _) | (403, "AuthenticationFailed") => QueueError::AuthenticationFailed { message },
        (403, _) => QueueError::PermissionDenied {
            operation: target.operation.to_string(),
        },
        _ => QueueError::ProviderError {
            provider: PROVIDER_NAME.to_string(),
            status,
            code,
            message,
        },
    }
}

// ============================================================================
// XML Parsing
// ============================================================================

#[derive(Default)]
struct MessageFields {
    message_id: Option<String>,
    pop_receipt: Option<String>,
    insertion_time: Option<String>,
    expiration_time: Option<String>,
    time_next_visible: Option<String>,
    dequeue_count: Option<String>,
    message_text: Option<String>,
}

impl MessageFields {
    fn set(&mut self, element: &[u8], value: String) {
        let slot = match element {
            b"MessageId" => &mut self.message_id,
            b"PopReceipt" => &mut self.pop_receipt,
            b"InsertionTime" => &mut self.insertion_time,
            b"ExpirationTime" => &mut self.expiration_time,
            b"TimeNextVisible" => &mut self.time_next_visible,
            b"DequeueCount" => &mut self.dequeue_count,
            b"MessageText" => &mut self.message_text,
            _ => return,
        };
        *slot = Some(value);
    }

    fn into_message(self) -> Result<QueueMessage, PayloadError> {
        let message_id = required(self.message_id, "MessageId")?
            .parse::<MessageId>()
            .map_err(|_| invalid_field("MessageId"))?;
        let pop_receipt = PopReceipt::new(required(self.pop_receipt, "PopReceipt")?);
        let inserted_at = timestamp(self.insertion_time, "InsertionTime")?;
        let next_visible_at = timestamp(self.time_next_visible, "TimeNextVisible")?;
        let expires_at = self
            .expiration_time
            .as_deref()
            .and_then(Timestamp::parse_rfc1123);
        let dequeue_count = required(self.dequeue_count, "DequeueCount")?
            .parse::<u32>()
            .map_err(|_| invalid_field("DequeueCount"))?;

        let text = self.message_text.unwrap_or_default();
        let body = STANDARD
            .decode(text.as_bytes())
            .map_err(|e| PayloadError::InvalidBase64 {
                message: e.to_string(),
            })?;

        Ok(QueueMessage {
            message_id,
            pop_receipt,
            body: Bytes::from(body),
            dequeue_count,
            inserted_at,
            expires_at,
            next_visible_at,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String, PayloadError> {
    value.ok_or_else(|| invalid_field(field))
}

fn timestamp(value: Option<String>, field: &str) -> Result<Timestamp, PayloadError> {
    value
        .as_deref()
        .and_then(Timestamp::parse_rfc1123)
        .ok_or_else(|| invalid_field(field))
}

fn invalid_field(field: &str) -> PayloadError {
    PayloadError::InvalidField {
        field: field.to_string(),
    }
}

fn xml_error(error: quick_xml::Error) -> PayloadError {
    PayloadError::InvalidXml {
        message: error.to_string(),
    }
}

/// Parse a `QueueMessagesList` response body
pub(crate) fn parse_messages(xml: &str) -> Result<Vec<QueueMessage>, PayloadError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut messages = Vec::new();
    let mut current: Option<MessageFields> = None;
    let mut element: Vec<u8> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) => {
                let name = e.name();
                if name.as_ref() == b"QueueMessage" {
                    current = Some(MessageFields::default());
                }
                element = name.as_ref().to_vec();
            }
            Event::Text(text) => {
                if let Some(fields) = current.as_mut() {
                    let value = text.unescape().map_err(xml_error)?;
                    fields.set(&element, value.into_owned());
                }
            }
            Event::End(e) => {
                if e.name().as_ref() == b"QueueMessage" {
                    if let Some(fields) = current.take() {
                        messages.push(fields.into_message()?);
                    }
                }
                element.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(messages)
}

/// Extract `Code` and `Message` from an error response body, if present
pub(crate) fn parse_error_body(xml: &str) -> (Option<String>, Option<String>) {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut code = None;
    let mut message = None;
    let mut element: Vec<u8> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => element = e.name().as_ref().to_vec(),
            Ok(Event::Text(text)) => {
                let value = text.unescape().map(|v| v.into_owned()).ok();
                match element.as_slice() {
                    b"Code" => code = value,
                    // Service messages carry a RequestId/Time suffix on later lines
                    b"Message" => message = value.map(|v| v.lines().next().unwrap_or("").to_string()),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => element.clear(),
            Ok(Event::Eof) | Err(_) => break,
            _ => {}
        }
    }

    (code, message)
}
