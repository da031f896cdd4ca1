// tests/managed_channels.rs

use std::time::Duration;

use futures::future::join_all;
use tokio::time::{sleep, timeout};

use rust_rabbit_tx::{
    BrokerError, ChannelSettings, Connection, DeliveryTag, Message, MessageProperties,
};

const Q: &str = "managed";

fn connection() -> Connection {
    let connection = Connection::in_memory(ChannelSettings {
        id_prefix: "managed".to_string(),
        command_buffer: 4,
    });
    connection.declare_queue(Q);
    connection
}

fn message(i: usize) -> Message {
    Message::new(format!("msg-{i}"), MessageProperties::persistent())
}

#[tokio::test]
async fn concurrent_tasks_share_one_channel() {
    let connection = connection();
    let channel = connection.open_managed_channel();
    channel.tx_select().await.unwrap();

    let publishes = (0..20).map(|i| {
        let channel = channel.clone();
        tokio::spawn(async move { channel.publish(message(i), Q).await })
    });
    for result in join_all(publishes).await {
        result.expect("task panicked").expect("publish");
    }

    assert_eq!(connection.message_count(Q), Some(0));
    let outcome = channel.commit().await.unwrap();
    assert_eq!(outcome.published, 20);
    assert_eq!(connection.message_count(Q), Some(20));
}

#[tokio::test]
async fn tags_stay_unique_across_concurrent_gets() {
    let connection = connection();
    for i in 0..10 {
        connection.store().enqueue(&Q.into(), message(i).into_shared());
    }
    let channel = connection.open_managed_channel();

    let gets = (0..10).map(|_| {
        let channel = channel.clone();
        tokio::spawn(async move { channel.basic_get(Q, false).await })
    });
    let mut tags: Vec<u64> = join_all(gets)
        .await
        .into_iter()
        .map(|result| result.expect("task panicked").expect("get").expect("message").tag.value())
        .collect();
    tags.sort_unstable();

    assert_eq!(tags, (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn dropping_every_handle_requeues_unacked() {
    let connection = connection();
    connection.store().enqueue(&Q.into(), message(0).into_shared());

    let channel = connection.open_managed_channel();
    let delivery = channel.basic_get(Q, false).await.unwrap();
    assert!(delivery.is_some());
    assert_eq!(connection.message_count(Q), Some(0));
    drop(channel);

    // the task notices the closed command queue and closes the channel
    timeout(Duration::from_secs(1), async {
        while connection.message_count(Q) != Some(1) {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("message requeued after handles dropped");
}

#[tokio::test]
async fn recover_redelivers_through_handle() {
    let connection = connection();
    connection.store().enqueue(&Q.into(), message(0).into_shared());

    let channel = connection.open_managed_channel();
    let ctag = channel.basic_consume(Q, "", false).await.unwrap();
    let delivery = channel.next_delivery(&ctag).await.unwrap().unwrap();

    let outcome = channel.recover(false).await.unwrap();
    let redelivered = outcome.redeliveries();
    assert_eq!(redelivered.len(), 1);
    assert_eq!(redelivered[0].tag, delivery.tag);
    assert_eq!(redelivered[0].consumer_tag(), Some(ctag.as_str()));

    channel.ack(DeliveryTag::ALL, true).await.unwrap();
    let closed = channel.close().await.unwrap();
    assert_eq!(closed.requeued, 0);
    assert_eq!(closed.cancelled_consumers, 1);
}

#[tokio::test]
async fn closed_handle_reports_unavailable() {
    let connection = connection();
    let channel = connection.open_managed_channel();
    let other = channel.clone();

    channel.close().await.unwrap();
    assert_eq!(other.rollback().await.unwrap_err(), BrokerError::ChannelUnavailable);
    assert!(other.is_closed());
}
