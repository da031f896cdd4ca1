// src/broker/channel_manager.rs

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

use crate::broker::errors::{BrokerError, Result};
use crate::channel::{
    Channel, CloseOutcome, CommitOutcome, Delivery, DeliveryTag, RecoverOutcome, RollbackOutcome,
};
use crate::message::{Message, QueueName};

type Reply<T> = oneshot::Sender<T>;

enum Command {
    TxSelect {
        reply: Reply<Result<()>>,
    },
    Publish {
        message: Message,
        target: QueueName,
        reply: Reply<Result<()>>,
    },
    Get {
        queue: QueueName,
        no_ack: bool,
        reply: Reply<Result<Option<Delivery>>>,
    },
    Consume {
        queue: QueueName,
        consumer_tag: String,
        no_ack: bool,
        reply: Reply<Result<String>>,
    },
    NextDelivery {
        consumer_tag: String,
        reply: Reply<Result<Option<Delivery>>>,
    },
    Cancel {
        consumer_tag: String,
        reply: Reply<Result<()>>,
    },
    Ack {
        tag: DeliveryTag,
        multiple: bool,
        reply: Reply<Result<()>>,
    },
    Commit {
        reply: Reply<Result<CommitOutcome>>,
    },
    Rollback {
        reply: Reply<Result<RollbackOutcome>>,
    },
    Recover {
        requeue: bool,
        reply: Reply<Result<RecoverOutcome>>,
    },
    Close {
        reply: Reply<CloseOutcome>,
    },
}

/// Owns a channel and serializes every command sent to it.
pub struct ChannelManager {
    channel: Channel,
    commands: mpsc::Receiver<Command>,
}

impl ChannelManager {
    /// Moves `channel` into a new task and returns a handle to it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(channel: Channel, command_buffer: usize) -> ChannelHandle {
        let (tx, rx) = mpsc::channel(command_buffer.max(1));
        let id: Arc<str> = Arc::from(channel.id());

        debug!(channel_id = %id, command_buffer, "Spawning channel task");
        let manager = ChannelManager {
            channel,
            commands: rx,
        };
        tokio::spawn(manager.run());

        ChannelHandle { id, commands: tx }
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            // A dropped reply receiver only means the caller stopped waiting.
            match command {
                Command::TxSelect { reply } => {
                    let _ = reply.send(self.channel.tx_select());
                }
                Command::Publish { message, target, reply } => {
                    let _ = reply.send(self.channel.publish(message, target));
                }
                Command::Get { queue, no_ack, reply } => {
                    let _ = reply.send(self.channel.basic_get(queue, no_ack));
                }
                Command::Consume {
                    queue,
                    consumer_tag,
                    no_ack,
                    reply,
                } => {
                    let _ = reply.send(self.channel.basic_consume(queue, &consumer_tag, no_ack));
                }
                Command::NextDelivery { consumer_tag, reply } => {
                    let _ = reply.send(self.channel.next_delivery(&consumer_tag));
                }
                Command::Cancel { consumer_tag, reply } => {
                    let _ = reply.send(self.channel.basic_cancel(&consumer_tag));
                }
                Command::Ack { tag, multiple, reply } => {
                    let _ = reply.send(self.channel.ack(tag, multiple));
                }
                Command::Commit { reply } => {
                    let _ = reply.send(self.channel.commit());
                }
                Command::Rollback { reply } => {
                    let _ = reply.send(self.channel.rollback());
                }
                Command::Recover { requeue, reply } => {
                    let _ = reply.send(self.channel.recover(requeue));
                }
                Command::Close { reply } => {
                    let _ = reply.send(self.channel.close());
                    break;
                }
            }
        }

        if self.channel.is_open() {
            self.channel.close();
        }
        info!(channel_id = %self.channel.id(), "Channel task stopped");
    }
}

/// Cloneable handle to a managed channel.
#[derive(Clone)]
pub struct ChannelHandle {
    id: Arc<str>,
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ChannelHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// True once the channel task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| BrokerError::ChannelUnavailable)?;
        response.await.map_err(|_| BrokerError::ChannelUnavailable)
    }

    pub async fn tx_select(&self) -> Result<()> {
        self.request(|reply| Command::TxSelect { reply }).await?
    }

    pub async fn publish(&self, message: Message, target: impl Into<QueueName>) -> Result<()> {
        let target = target.into();
        self.request(|reply| Command::Publish { message, target, reply })
            .await?
    }

    pub async fn basic_get(&self, queue: impl Into<QueueName>, no_ack: bool) -> Result<Option<Delivery>> {
        let queue = queue.into();
        self.request(|reply| Command::Get { queue, no_ack, reply }).await?
    }

    pub async fn basic_consume(
        &self,
        queue: impl Into<QueueName>,
        consumer_tag: &str,
        no_ack: bool,
    ) -> Result<String> {
        let queue = queue.into();
        let consumer_tag = consumer_tag.to_string();
        self.request(|reply| Command::Consume {
            queue,
            consumer_tag,
            no_ack,
            reply,
        })
        .await?
    }

    pub async fn next_delivery(&self, consumer_tag: &str) -> Result<Option<Delivery>> {
        let consumer_tag = consumer_tag.to_string();
        self.request(|reply| Command::NextDelivery { consumer_tag, reply })
            .await?
    }

    pub async fn basic_cancel(&self, consumer_tag: &str) -> Result<()> {
        let consumer_tag = consumer_tag.to_string();
        self.request(|reply| Command::Cancel { consumer_tag, reply }).await?
    }

    pub async fn ack(&self, tag: impl Into<DeliveryTag>, multiple: bool) -> Result<()> {
        let tag = tag.into();
        self.request(|reply| Command::Ack { tag, multiple, reply }).await?
    }

    pub async fn commit(&self) -> Result<CommitOutcome> {
        self.request(|reply| Command::Commit { reply }).await?
    }

    pub async fn rollback(&self) -> Result<RollbackOutcome> {
        self.request(|reply| Command::Rollback { reply }).await?
    }

    pub async fn recover(&self, requeue: bool) -> Result<RecoverOutcome> {
        self.request(|reply| Command::Recover { requeue, reply }).await?
    }

    /// Closes the channel and stops its task.
    pub async fn close(&self) -> Result<CloseOutcome> {
        self.request(|reply| Command::Close { reply }).await
    }
}
