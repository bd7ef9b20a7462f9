//! Tests for the polling message source.

use super::*;
use crate::codec::JsonDeserializer;
use crate::error::CodecError;
use crate::scheduler::{ManualScheduler, TokioScheduler};
use async_trait::async_trait;
use mockall::mock;
use serde::{Deserialize, Serialize};
use storage_queue::{InMemoryQueueClient, OutgoingMessage, QueueClient, QueueError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct TestCommand {
    id: u32,
}

mock! {
    pub Deserializer {}

    impl MessageDeserializer<TestCommand> for Deserializer {
        fn deserialize(&self, bytes: &[u8]) -> Result<Option<TestCommand>, CodecError>;
        fn type_name(&self) -> String;
    }
}

/// Queue handle whose deletes always fail
struct FailingDelete {
    inner: Arc<dyn QueueHandle>,
}

#[async_trait]
impl QueueHandle for FailingDelete {
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
        self.inner.add_message(message, options).await
    }

    async fn get_messages(
        &self,
        max_messages: u32,
        visibility_timeout: Option<Duration>,
        options: Option<&QueueRequestOptions>,
    ) -> Result<Vec<QueueMessage>, QueueError> {
        self.inner
            .get_messages(max_messages, visibility_timeout, options)
            .await
    }

    async fn delete_message(
        &self,
        _message: &QueueMessage,
        _options: Option<&QueueRequestOptions>,
    ) -> Result<(), QueueError> {
        Err(QueueError::ConnectionFailed {
            message: "connection reset".to_string(),
        })
    }

    async fn approximate_message_count(
        &self,
        options: Option<&QueueRequestOptions>,
    ) -> Result<u32, QueueError> {
        self.inner.approximate_message_count(options).await
    }
}

fn json() -> Vec<Arc<dyn MessageDeserializer<TestCommand>>> {
    vec![Arc::new(JsonDeserializer::<TestCommand>::new())]
}

async fn queue_with(bodies: &[&str]) -> Arc<dyn QueueHandle> {
    let client = InMemoryQueueClient::default();
    let queue = client.queue(&QueueName::new("service-commands").unwrap());
    queue.create_if_not_exists(None).await.unwrap();
    for body in bodies {
        queue
            .add_message(OutgoingMessage::new(body.to_string()), None)
            .await
            .unwrap();
    }
    queue
}

fn manual_source(
    queue: Arc<dyn QueueHandle>,
    settings: SourceSettings,
    scheduler: &ManualScheduler,
) -> StorageQueueSource<TestCommand> {
    StorageQueueSource::new(queue, json(), settings, None, Arc::new(scheduler.clone())).unwrap()
}

async fn nothing_within(stream: &mut BoxStream<'static, Result<TestCommand, SourceError>>) -> bool {
    tokio::time::timeout(Duration::from_millis(50), stream.next())
        .await
        .is_err()
}

// ============================================================================
// Construction Tests
// ============================================================================

mod construction {
    use super::*;

    #[tokio::test]
    async fn test_empty_deserializer_set_is_rejected() {
        let queue = queue_with(&[]).await;
        let result = StorageQueueSource::<TestCommand>::new(
            queue,
            Vec::new(),
            SourceSettings::default(),
            None,
            Arc::new(TokioScheduler),
        );

        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidArgument {
                argument: "deserializers",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_max_messages_bounds() {
        let queue = queue_with(&[]).await;

        for valid in [1, 2, 31, 32] {
            let settings = SourceSettings::default().with_max_messages(valid);
            assert!(
                StorageQueueSource::new(queue.clone(), json(), settings, None, Arc::new(TokioScheduler))
                    .is_ok(),
                "{} should be accepted",
                valid
            );
        }

        for invalid in [0, 33, 100] {
            let settings = SourceSettings::default().with_max_messages(invalid);
            let result =
                StorageQueueSource::new(queue.clone(), json(), settings, None, Arc::new(TokioScheduler));
            assert!(
                matches!(result, Err(ConfigurationError::OutOfRange { .. })),
                "{} should be rejected",
                invalid
            );
        }
    }

    #[tokio::test]
    async fn test_zero_interval_is_rejected() {
        let queue = queue_with(&[]).await;
        let settings = SourceSettings::default().with_polling_interval(Duration::ZERO);

        assert!(matches!(
            StorageQueueSource::new(queue, json(), settings, None, Arc::new(TokioScheduler)),
            Err(ConfigurationError::OutOfRange {
                argument: "polling_interval",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_polling_interval_upper_bound() {
        let queue = queue_with(&[]).await;

        let longest = SourceSettings::default().with_polling_interval(SourceSettings::MAX_POLLING_INTERVAL);
        assert!(longest.validate().is_ok());

        let overflowing = SourceSettings::default().with_polling_interval(Duration::from_secs(u64::MAX));
        assert!(matches!(
            StorageQueueSource::new(queue, json(), overflowing, None, Arc::new(TokioScheduler)),
            Err(ConfigurationError::OutOfRange {
                argument: "polling_interval",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_visibility_timeout_upper_bound() {
        let queue = queue_with(&[]).await;

        let longest =
            SourceSettings::default().with_visibility_timeout(SourceSettings::MAX_VISIBILITY_TIMEOUT);
        assert!(longest.validate().is_ok());

        let too_long = SourceSettings::default()
            .with_visibility_timeout(SourceSettings::MAX_VISIBILITY_TIMEOUT + Duration::from_secs(1));
        assert!(matches!(
            StorageQueueSource::new(queue, json(), too_long, None, Arc::new(TokioScheduler)),
            Err(ConfigurationError::OutOfRange {
                argument: "visibility_timeout",
                ..
            })
        ));
    }

    #[test]
    fn test_default_settings() {
        let settings = SourceSettings::default();
        assert_eq!(settings.max_messages, 1);
        assert_eq!(settings.polling_interval, Duration::from_secs(5));
        assert_eq!(settings.visibility_timeout, None);
    }
}

// ============================================================================
// Polling Tests
// ============================================================================

mod polling {
    use super::*;

    #[tokio::test]
    async fn test_each_cycle_fetches_at_most_max_messages() {
        // Arrange
        let queue = queue_with(&[r#"{"id":1}"#, r#"{"id":2}"#, r#"{"id":3}"#]).await;
        let scheduler = ManualScheduler::new();
        let source = manual_source(
            queue.clone(),
            SourceSettings::default().with_max_messages(2),
            &scheduler,
        );
        let mut stream = source.messages();

        // Act / Assert: cycle 1
        scheduler.tick();
        assert_eq!(stream.next().await.unwrap().unwrap(), TestCommand { id: 1 });
        assert_eq!(stream.next().await.unwrap().unwrap(), TestCommand { id: 2 });
        assert_eq!(queue.approximate_message_count(None).await.unwrap(), 1);
        assert!(nothing_within(&mut stream).await);

        // cycle 2
        scheduler.tick();
        assert_eq!(stream.next().await.unwrap().unwrap(), TestCommand { id: 3 });
        assert_eq!(queue.approximate_message_count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_message_is_deleted_before_it_is_emitted() {
        let queue = queue_with(&[r#"{"id":1}"#, r#"{"id":2}"#]).await;
        let scheduler = ManualScheduler::new();
        let source = manual_source(
            queue.clone(),
            SourceSettings::default().with_max_messages(2),
            &scheduler,
        );
        let mut stream = source.messages();

        scheduler.tick();
        let first = stream.next().await.unwrap().unwrap();

        // Only the emitted message is gone; the second is fetched but untouched
        assert_eq!(first, TestCommand { id: 1 });
        assert_eq!(queue.approximate_message_count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_cycles_emit_nothing() {
        let queue = queue_with(&[]).await;
        let scheduler = ManualScheduler::new();
        let source = manual_source(queue.clone(), SourceSettings::default(), &scheduler);
        let mut stream = source.messages();

        scheduler.tick();
        scheduler.tick();
        assert!(nothing_within(&mut stream).await);

        queue
            .add_message(OutgoingMessage::new(r#"{"id":5}"#), None)
            .await
            .unwrap();
        scheduler.tick();
        assert_eq!(stream.next().await.unwrap().unwrap(), TestCommand { id: 5 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_on_interval_with_tokio_clock() {
        let queue = queue_with(&[r#"{"id":1}"#]).await;
        let settings = SourceSettings::default().with_polling_interval(Duration::from_secs(5));
        let source =
            StorageQueueSource::new(queue, json(), settings, None, Arc::new(TokioScheduler))
                .unwrap();
        let start = tokio::time::Instant::now();
        let mut stream = source.messages();

        let early = tokio::time::timeout(Duration::from_secs(4), stream.next()).await;
        assert!(early.is_err(), "nothing before the first interval elapses");

        let item = stream.next().await.unwrap().unwrap();
        assert_eq!(item, TestCommand { id: 1 });
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_each_subscription_gets_its_own_ticker() {
        let queue = queue_with(&[]).await;
        let scheduler = ManualScheduler::new();
        let settings = SourceSettings::default().with_polling_interval(Duration::from_secs(3));
        let source = manual_source(queue, settings, &scheduler);

        let _first = source.messages();
        let _second = source.messages();

        assert_eq!(
            scheduler.requested_intervals(),
            vec![Duration::from_secs(3), Duration::from_secs(3)]
        );
    }
}

// ============================================================================
// Failure Tests
// ============================================================================

mod failures {
    use super::*;

    #[tokio::test]
    async fn test_decode_failure_is_yielded_and_polling_continues() {
        // Arrange
        let queue = queue_with(&["not json", r#"{"id":2}"#]).await;
        let scheduler = ManualScheduler::new();
        let source = manual_source(
            queue.clone(),
            SourceSettings::default().with_max_messages(2),
            &scheduler,
        );
        let mut stream = source.messages();

        // Act
        scheduler.tick();
        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();

        // Assert
        match first {
            Err(SourceError::MessageDeserialization {
                message, source, ..
            }) => {
                assert_eq!(message.as_bytes(), b"not json");
                assert!(matches!(source, Some(CodecError::Json(_))));
            }
            other => panic!("Expected MessageDeserialization, got: {:?}", other),
        }
        assert_eq!(second.unwrap(), TestCommand { id: 2 });

        // The undecodable message was already deleted
        assert_eq!(queue.approximate_message_count(None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_no_message_result_is_a_deserialization_error() {
        let queue = queue_with(&["{}"]).await;
        let scheduler = ManualScheduler::new();

        let mut deserializer = MockDeserializer::new();
        deserializer
            .expect_deserialize()
            .times(1)
            .returning(|_| Ok(None));
        deserializer
            .expect_type_name()
            .return_const("TestCommand".to_string());

        let source = StorageQueueSource::new(
            queue,
            vec![Arc::new(deserializer) as Arc<dyn MessageDeserializer<TestCommand>>],
            SourceSettings::default(),
            None,
            Arc::new(scheduler.clone()),
        )
        .unwrap();
        let mut stream = source.messages();

        scheduler.tick();
        match stream.next().await.unwrap() {
            Err(SourceError::MessageDeserialization {
                type_name, source, ..
            }) => {
                assert_eq!(type_name, "TestCommand");
                assert!(source.is_none());
            }
            other => panic!("Expected MessageDeserialization, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_only_first_deserializer_is_consulted() {
        let queue = queue_with(&[r#"{"id":1}"#]).await;
        let scheduler = ManualScheduler::new();

        let mut first = MockDeserializer::new();
        first
            .expect_deserialize()
            .times(1)
            .returning(|_| Err(CodecError::custom("unknown shape")));
        first
            .expect_type_name()
            .return_const("First".to_string());

        let mut second = MockDeserializer::new();
        second.expect_deserialize().never();

        let source = StorageQueueSource::new(
            queue,
            vec![
                Arc::new(first) as Arc<dyn MessageDeserializer<TestCommand>>,
                Arc::new(second),
            ],
            SourceSettings::default(),
            None,
            Arc::new(scheduler.clone()),
        )
        .unwrap();
        let mut stream = source.messages();

        scheduler.tick();
        let item = stream.next().await.unwrap();
        assert!(matches!(
            item,
            Err(SourceError::MessageDeserialization { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_failure_ends_stream() {
        let client = InMemoryQueueClient::default();
        let missing = client.queue(&QueueName::new("never-created").unwrap());
        let scheduler = ManualScheduler::new();
        let source = manual_source(missing, SourceSettings::default(), &scheduler);
        let mut stream = source.messages();

        scheduler.tick();
        match stream.next().await {
            Some(Err(SourceError::Transport { source, .. })) => {
                assert!(matches!(source, QueueError::QueueNotFound { .. }));
            }
            other => panic!("Expected Transport error, got: {:?}", other),
        }

        scheduler.tick();
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_delete_failure_ends_stream_without_emitting() {
        let inner = queue_with(&[r#"{"id":1}"#]).await;
        let queue: Arc<dyn QueueHandle> = Arc::new(FailingDelete {
            inner: inner.clone(),
        });
        let scheduler = ManualScheduler::new();
        let source = manual_source(queue, SourceSettings::default(), &scheduler);
        let mut stream = source.messages();

        scheduler.tick();
        let item = stream.next().await.unwrap();

        assert!(matches!(item, Err(SourceError::Transport { .. })));
        assert!(stream.next().await.is_none());
        // Message stays in the queue and reappears after its visibility timeout
        assert_eq!(inner.approximate_message_count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_resubscribing_after_failure_polls_again() {
        let client = InMemoryQueueClient::default();
        let name = QueueName::new("late-queue").unwrap();
        let scheduler = ManualScheduler::new();
        let source = manual_source(client.queue(&name), SourceSettings::default(), &scheduler);

        let mut first = source.messages();
        scheduler.tick();
        assert!(matches!(
            first.next().await,
            Some(Err(SourceError::Transport { .. }))
        ));

        let queue = client.queue(&name);
        queue.create_if_not_exists(None).await.unwrap();
        queue
            .add_message(OutgoingMessage::new(r#"{"id":8}"#), None)
            .await
            .unwrap();

        let mut second = source.messages();
        scheduler.tick();
        assert_eq!(second.next().await.unwrap().unwrap(), TestCommand { id: 8 });
    }
}
