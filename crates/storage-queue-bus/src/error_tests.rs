//! Tests for bus error types.

use super::*;
use std::error::Error as _;
use storage_queue::{MessageId, PopReceipt, Timestamp};

fn queue_name() -> QueueName {
    QueueName::new("orders-events").unwrap()
}

fn fetched_message() -> QueueMessage {
    QueueMessage {
        message_id: "msg-1".parse::<MessageId>().unwrap(),
        pop_receipt: PopReceipt::new("r1"),
        body: "garbage".into(),
        dequeue_count: 1,
        inserted_at: Timestamp::now(),
        expires_at: None,
        next_visible_at: Timestamp::now(),
    }
}

#[test]
fn test_credentials_error_is_wrapped_with_source() {
    let error: ConfigurationError = CredentialsError::MissingAccountName.into();

    assert!(matches!(
        error,
        ConfigurationError::InvalidCredentialsConfiguration { .. }
    ));
    assert!(error.source().is_some());
}

#[test]
fn test_deserialization_error_carries_original_message() {
    let error = SourceError::MessageDeserialization {
        queue: queue_name(),
        type_name: "OrderPlaced".to_string(),
        message: Box::new(fetched_message()),
        source: None,
    };

    assert!(!error.is_terminal());
    assert_eq!(error.message().unwrap().as_bytes(), b"garbage");
    assert!(error.to_string().contains("msg-1"));
    assert!(error.to_string().contains("OrderPlaced"));
}

#[test]
fn test_transport_error_is_terminal_and_suggests_delay() {
    let error = SourceError::Transport {
        queue: queue_name(),
        source: QueueError::ConnectionFailed {
            message: "reset".to_string(),
        },
    };

    assert!(error.is_terminal());
    assert!(error.message().is_none());
    assert_eq!(error.retry_after(), Some(Duration::from_secs(5)));
}

#[test]
fn test_publish_error_transience_follows_transport() {
    let transient = PublishError::Transport {
        queue: queue_name(),
        source: QueueError::Timeout {
            duration: Duration::from_secs(30),
        },
    };
    let permanent = PublishError::Serialization(CodecError::custom("bad"));

    assert!(transient.is_transient());
    assert!(!permanent.is_transient());
}
