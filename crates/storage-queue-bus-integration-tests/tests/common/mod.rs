//! Common test utilities for storage-queue-bus integration tests
//!
//! This module provides:
//! - A message taxonomy shared by all scenarios
//! - A recording queue client that logs every transport call
//! - Helpers for building endpoints over the in-memory transport

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storage_queue::{
    InMemoryQueueClient, OutgoingMessage, ProviderType, QueueClient, QueueError, QueueHandle,
    QueueMessage, QueueName, QueueRequestOptions,
};
use storage_queue_bus::{
    BusConfiguration, JsonDeserializerFactory, JsonSerializer, MessageConfigStage,
    MessageTaxonomy, PollScheduler, ServiceEndpoint, ServiceEndpointClient, SourceSettings,
    StorageQueueEndpointExt,
};

// ============================================================================
// Taxonomy
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCommand1 {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestEvent1 {
    pub order_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRequest1 {
    pub order_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResponse1 {
    pub order_id: u32,
    pub status: String,
}

pub struct TestService;

impl MessageTaxonomy for TestService {
    type Command = TestCommand1;
    type Event = TestEvent1;
    type Request = TestRequest1;
    type Response = TestResponse1;
}

pub type TestBus = BusConfiguration<TestService>;

/// Queue names used when the service is called `service-name`
#[allow(dead_code)]
pub const DEFAULT_QUEUES: [&str; 4] = [
    "service-name-requests",
    "service-name-commands",
    "service-name-events",
    "service-name-responses",
];

// ============================================================================
// Recording Transport
// ============================================================================

/// One transport call, as seen by [`RecordingQueueClient`]
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub enum TransportCall {
    Add { queue: String },
    Fetch { queue: String, returned: usize },
    Delete { queue: String, body: Vec<u8> },
}

/// In-memory client that records every call made through its handles
#[derive(Clone)]
#[allow(dead_code)]
pub struct RecordingQueueClient {
    inner: InMemoryQueueClient,
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl RecordingQueueClient {
    #[allow(dead_code)]
    pub fn new(inner: InMemoryQueueClient) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    #[allow(dead_code)]
    pub fn deleted_bodies(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TransportCall::Delete { body, .. } => Some(body),
                _ => None,
            })
            .collect()
    }
}

impl QueueClient for RecordingQueueClient {
    fn account_name(&self) -> &str {
        self.inner.account_name()
    }

    fn provider_type(&self) -> ProviderType {
        self.inner.provider_type()
    }

    fn queue(&self, name: &QueueName) -> Arc<dyn QueueHandle> {
        Arc::new(RecordingHandle {
            inner: self.inner.queue(name),
            calls: Arc::clone(&self.calls),
        })
    }
}

#[allow(dead_code)]
struct RecordingHandle {
    inner: Arc<dyn QueueHandle>,
    calls: Arc<Mutex<Vec<TransportCall>>>,
}

impl RecordingHandle {
    fn record(&self, call: TransportCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl QueueHandle for RecordingHandle {
    fn name(&self) -> &QueueName {
        self.inner.name()
    }

    async fn create_if_not_exists(
        &self,
        options: Option<&QueueRequestOptions>,
    ) -> Result<bool, QueueError> {
        self.inner.create_if_not_exists(options).await
    }

    async fn add_message(
        &self,
        message: OutgoingMessage,
        options: Option<&QueueRequestOptions>,
    ) -> Result<(), QueueError> {
        self.record(TransportCall::Add {
            queue: self.name().to_string(),
        });
        self.inner.add_message(message, options).await
    }

    async fn get_messages(
        &self,
        max_messages: u32,
        visibility_timeout: Option<Duration>,
        options: Option<&QueueRequestOptions>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        let messages = self
            .inner
            .get_messages(max_messages, visibility_timeout, options)
            .await?;
        self.record(TransportCall::Fetch {
            queue: self.name().to_string(),
            returned: messages.len(),
        });
        Ok(messages)
    }

    async fn delete_message(
        &self,
        message: &QueueMessage,
        options: Option<&QueueRequestOptions>,
    ) -> Result<(), QueueError> {
        self.inner.delete_message(message, options).await?;
        self.record(TransportCall::Delete {
            queue: self.name().to_string(),
            body: message.as_bytes().to_vec(),
        });
        Ok(())
    }

    async fn approximate_message_count(
        &self,
        options: Option<&QueueRequestOptions>,
    ) -> Result<u32, QueueError> {
        self.inner.approximate_message_count(options).await
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Route library logs to the test output; `RUST_LOG` overrides the level
#[allow(dead_code)]
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // Another test in the same binary may have installed it already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

/// In-memory client with the given queues already created
#[allow(dead_code)]
pub async fn client_with_queues(names: &[&str]) -> InMemoryQueueClient {
    let client = InMemoryQueueClient::new("testaccount");
    for name in names {
        client
            .queue(&QueueName::new(*name).unwrap())
            .create_if_not_exists(None)
            .await
            .unwrap();
    }
    client
}

/// Builder for `service-name` over `client`, credentials done
#[allow(dead_code)]
pub fn configure(client: Arc<dyn QueueClient>) -> MessageConfigStage<TestService, TestBus> {
    TestBus::new()
        .with_storage_queue_endpoint()
        .named("service-name")
        .unwrap()
        .with_cloud_client(client)
        .unwrap()
}

/// Server and client endpoints for `service-name` using default queue names
#[allow(dead_code)]
pub fn endpoints(
    client: Arc<dyn QueueClient>,
    settings: SourceSettings,
    scheduler: Arc<dyn PollScheduler>,
) -> (ServiceEndpoint<TestService>, ServiceEndpointClient<TestService>) {
    let bus = configure(client)
        .with_default_config("service-name", None)
        .unwrap()
        .with_source_settings(settings)
        .unwrap()
        .with_scheduler(scheduler)
        .serialized_with(JsonSerializer, JsonDeserializerFactory)
        .as_client_and_server()
        .unwrap();

    let server = bus.create_endpoints().unwrap().remove(0);
    let client = bus.create_endpoint_clients().unwrap().remove(0);
    (server, client)
}

/// JSON body for `message`, as the default serializer would write it
#[allow(dead_code)]
pub fn encode<M: Serialize>(message: &M) -> String {
    serde_json::to_string(message).unwrap()
}

/// Put raw bodies straight onto a queue, bypassing any serializer
#[allow(dead_code)]
pub async fn enqueue_raw(client: &dyn QueueClient, queue: &str, bodies: &[&str]) {
    let handle = client.queue(&QueueName::new(queue).unwrap());
    for body in bodies {
        handle
            .add_message(OutgoingMessage::new(body.to_string()), None)
            .await
            .unwrap();
    }
}

#[allow(dead_code)]
pub async fn queue_depth(client: &dyn QueueClient, queue: &str) -> u32 {
    client
        .queue(&QueueName::new(queue).unwrap())
        .approximate_message_count(None)
        .await
        .unwrap()
}
