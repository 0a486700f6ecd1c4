use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;

use crate::config::RedisConfig;

use super::ReconnectDelay;

/// Consumer side of one pub/sub channel.
///
/// Implementations must contain failures to the single message being handled;
/// the subscriber loop treats `handle` as infallible and moves on to the next
/// message regardless of what happened inside.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, channel: &str, payload: &str);
}

/// Supervised subscription to a single pub/sub channel.
///
/// Owns its own broker connection. On broker loss the subscription is
/// re-established with exponential backoff; messages published in between are
/// gone (at-most-once transport).
pub struct ChannelSubscriber {
    config: RedisConfig,
    channel: String,
    shutdown: broadcast::Sender<()>,
}

impl ChannelSubscriber {
    pub fn new(config: RedisConfig, channel: impl Into<String>, shutdown: broadcast::Sender<()>) -> Self {
        Self {
            config,
            channel: channel.into(),
            shutdown,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Run the subscription loop until shutdown.
    ///
    /// Broker-level errors do not terminate the loop; they trigger a
    /// reconnect after a backoff delay.
    pub async fn run(&self, handler: Arc<dyn MessageHandler>) -> anyhow::Result<()> {
        tracing::info!(channel = %self.channel, "Starting channel subscriber");

        let mut delay = ReconnectDelay::from_config(&self.config);

        loop {
            match self.subscribe_and_listen(handler.clone(), &mut delay).await {
                Ok(()) => {
                    tracing::info!(channel = %self.channel, "Channel subscriber stopped gracefully");
                    break;
                }
                Err(e) => {
                    let wait = delay.next();
                    tracing::error!(
                        channel = %self.channel,
                        error = %e,
                        attempt = delay.attempt(),
                        delay_ms = wait.as_millis() as u64,
                        "Subscription error, reconnecting after backoff"
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }

        Ok(())
    }

    async fn subscribe_and_listen(
        &self,
        handler: Arc<dyn MessageHandler>,
        delay: &mut ReconnectDelay,
    ) -> anyhow::Result<()> {
        let client = redis::Client::open(self.config.url.as_str())?;
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;

        tracing::info!(channel = %self.channel, "Subscription established");
        delay.reset();

        let mut message_stream = pubsub.on_message();
        let mut shutdown_rx = self.shutdown.subscribe();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!(channel = %self.channel, "Received shutdown signal");
                    break;
                }
                msg = message_stream.next() => {
                    match msg {
                        Some(msg) => {
                            let payload: String = match msg.get_payload() {
                                Ok(p) => p,
                                Err(e) => {
                                    tracing::warn!(
                                        channel = %self.channel,
                                        error = %e,
                                        "Failed to decode message payload"
                                    );
                                    continue;
                                }
                            };

                            // Per-message failure boundary lives inside the
                            // handler; one bad message never kills the loop.
                            handler.handle(&self.channel, &payload).await;
                        }
                        None => {
                            anyhow::bail!("message stream ended");
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
