//! Publish on one side of a service, consume on the other.

mod common;

use common::*;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use storage_queue_bus::{
    ManualScheduler, MessagePublisher, MessageSource, SourceSettings, TokioScheduler,
};

#[tokio::test(start_paused = true)]
async fn test_command_arrives_on_next_tick() {
    // Arrange
    let client = Arc::new(client_with_queues(&DEFAULT_QUEUES).await);
    let (server, sender) = endpoints(
        client.clone(),
        SourceSettings::default(),
        Arc::new(TokioScheduler),
    );
    let start = tokio::time::Instant::now();
    let mut commands = server.commands.messages();

    // Act
    sender.commands.publish(&TestCommand1 {}).await.unwrap();
    let received = commands.next().await.unwrap().unwrap();

    // Assert
    assert_eq!(received, TestCommand1 {});
    assert_eq!(start.elapsed(), Duration::from_secs(5));
    assert_eq!(queue_depth(client.as_ref(), "service-name-commands").await, 0);
}

#[tokio::test]
async fn test_request_response_exchange() {
    // Arrange
    let client = Arc::new(client_with_queues(&DEFAULT_QUEUES).await);
    let scheduler = ManualScheduler::new();
    let (server, caller) = endpoints(
        client.clone(),
        SourceSettings::default(),
        Arc::new(scheduler.clone()),
    );
    let mut requests = server.requests.messages();
    let mut responses = caller.responses.messages();

    // Act: caller asks, server answers
    caller
        .requests
        .publish(&TestRequest1 { order_id: 17 })
        .await
        .unwrap();
    scheduler.tick();
    let request = requests.next().await.unwrap().unwrap();
    server
        .responses
        .publish(&TestResponse1 {
            order_id: request.order_id,
            status: "shipped".to_string(),
        })
        .await
        .unwrap();
    scheduler.tick();

    // Assert
    assert_eq!(
        responses.next().await.unwrap().unwrap(),
        TestResponse1 {
            order_id: 17,
            status: "shipped".to_string()
        }
    );
}

#[tokio::test]
async fn test_events_keep_publish_order_within_a_cycle() {
    let client = Arc::new(client_with_queues(&DEFAULT_QUEUES).await);
    let scheduler = ManualScheduler::new();
    let (server, listener) = endpoints(
        client.clone(),
        SourceSettings::default().with_max_messages(32),
        Arc::new(scheduler.clone()),
    );
    let mut events = listener.events.messages();

    for order_id in 1..=5 {
        server.events.publish(&TestEvent1 { order_id }).await.unwrap();
    }
    scheduler.tick();

    let mut received = Vec::new();
    for _ in 0..5 {
        received.push(events.next().await.unwrap().unwrap().order_id);
    }
    assert_eq!(received, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_categories_do_not_share_queues() {
    let client = Arc::new(client_with_queues(&DEFAULT_QUEUES).await);
    let scheduler = ManualScheduler::new();
    let (server, sender) = endpoints(
        client.clone(),
        SourceSettings::default(),
        Arc::new(scheduler.clone()),
    );

    sender.commands.publish(&TestCommand1 {}).await.unwrap();

    assert_eq!(queue_depth(client.as_ref(), "service-name-commands").await, 1);
    for queue in ["service-name-requests", "service-name-events", "service-name-responses"] {
        assert_eq!(queue_depth(client.as_ref(), queue).await, 0, "{}", queue);
    }

    // A request source never sees the command
    let mut requests = server.requests.messages();
    scheduler.tick();
    let nothing = tokio::time::timeout(Duration::from_millis(50), requests.next()).await;
    assert!(nothing.is_err());
}
