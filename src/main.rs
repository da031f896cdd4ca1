use anyhow::{Context, Result};
use futures::future::try_join_all;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rust_rabbit_tx::config::{self, EngineConfig};
use rust_rabbit_tx::env::EnvOverrides;
use rust_rabbit_tx::{Connection, DeliveryTag, Message, MessageProperties};

const DEMO_QUEUE: &str = "Transactions";

/// Loads the engine config. Without an explicit path, failing to load the
/// default file falls back to defaults and hands the error back for logging
/// once tracing is up.
fn load_engine_config(overrides: &EnvOverrides) -> Result<(EngineConfig, Option<anyhow::Error>)> {
    let (mut config, fallback) = match &overrides.config_path {
        Some(path) => (config::load_config_from(path)?, None),
        None => match config::load_config() {
            Ok(config) => (config, None),
            Err(e) => (EngineConfig::default(), Some(e)),
        },
    };

    overrides.apply(&mut config);
    config.validate()?;
    Ok((config, fallback))
}

fn init_tracing(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .context("Invalid log filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let overrides = EnvOverrides::load()?;
    let (config, fallback) = load_engine_config(&overrides)?;
    init_tracing(&config.logging.filter)?;
    if let Some(e) = fallback {
        warn!("Using default configuration: {}", e);
    }

    let connection = Connection::in_memory(config.channel.clone());
    connection.declare_queue(DEMO_QUEUE);
    for queue in &config.queues.declare {
        connection.declare_queue(queue.as_str());
    }

    // Several publishers feeding one queue concurrently.
    let publishers: Vec<_> = (0..3).map(|_| connection.open_managed_channel()).collect();
    try_join_all(publishers.iter().enumerate().map(|(i, channel)| {
        let message = Message::new(format!("order-{i}"), MessageProperties::persistent());
        channel.publish(message, DEMO_QUEUE)
    }))
    .await?;
    for publisher in &publishers {
        publisher.close().await?;
    }
    info!(queued = ?connection.message_count(DEMO_QUEUE), "Published orders");

    // Take everything inside a transaction, ack all of it, then roll back:
    // the deliveries are still ours, and closing hands them back.
    let worker = connection.open_managed_channel();
    worker.tx_select().await?;
    while let Some(delivery) = worker.basic_get(DEMO_QUEUE, false).await? {
        info!(tag = %delivery.tag, body = %String::from_utf8_lossy(delivery.payload()), "Got delivery");
    }
    worker.ack(DeliveryTag::ALL, true).await?;
    let rolled_back = worker.rollback().await?;
    info!(unacked = rolled_back.unacked, "Rolled back acks");

    let closed = worker.close().await?;
    info!(requeued = closed.requeued, queued = ?connection.message_count(DEMO_QUEUE), "Worker closed");

    // A second worker commits its acks; nothing is left afterwards.
    let worker = connection.open_managed_channel();
    worker.tx_select().await?;
    let mut taken = 0;
    while let Some(delivery) = worker.basic_get(DEMO_QUEUE, false).await? {
        taken += 1;
        worker.ack(delivery.tag, false).await?;
    }
    let committed = worker.commit().await?;
    worker.close().await?;
    info!(
        taken,
        acked = committed.acked,
        queued = ?connection.message_count(DEMO_QUEUE),
        "Committed acks"
    );

    Ok(())
}
