use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::WebSocketConfig;
use crate::connections::{ConnectionRegistry, Frame};

/// Background task for keepalive pings and stale-connection cleanup
pub struct KeepaliveTask {
    config: WebSocketConfig,
    registry: Arc<ConnectionRegistry>,
    shutdown: broadcast::Receiver<()>,
}

impl KeepaliveTask {
    pub fn new(
        config: WebSocketConfig,
        registry: Arc<ConnectionRegistry>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let ping_interval = Duration::from_secs(self.config.ping_interval);
        let cleanup_interval = Duration::from_secs(self.config.cleanup_interval);
        let connection_timeout = self.config.connection_timeout;

        let mut ping_timer = tokio::time::interval(ping_interval);
        let mut cleanup_timer = tokio::time::interval(cleanup_interval);

        // Skip immediate first tick
        ping_timer.tick().await;
        cleanup_timer.tick().await;

        tracing::info!(
            ping_interval_secs = self.config.ping_interval,
            cleanup_interval_secs = self.config.cleanup_interval,
            connection_timeout_secs = connection_timeout,
            "Keepalive task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Keepalive task received shutdown signal");
                    break;
                }
                _ = ping_timer.tick() => {
                    self.send_pings().await;
                }
                _ = cleanup_timer.tick() => {
                    let removed = self.registry.cleanup_stale(connection_timeout).await;
                    if removed > 0 {
                        tracing::info!(
                            removed = removed,
                            timeout_secs = connection_timeout,
                            "Cleaned up stale connections"
                        );
                    }
                }
            }
        }

        tracing::info!("Keepalive task stopped");
    }

    async fn send_pings(&self) {
        let connections = self.registry.snapshot();
        if connections.is_empty() {
            return;
        }

        let mut sent = 0;
        let mut failed = 0;
        for conn in connections {
            match conn.send(Frame::Ping).await {
                Ok(()) => sent += 1,
                Err(_) => {
                    failed += 1;
                    tracing::debug!(
                        connection_id = %conn.id,
                        "Failed to send ping, connection may be dead"
                    );
                }
            }
        }

        tracing::debug!(sent = sent, failed = failed, "Keepalive round completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_keepalive_task_shutdown() {
        let config = WebSocketConfig::default();
        let registry = Arc::new(ConnectionRegistry::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = KeepaliveTask::new(config, registry, shutdown_rx);
        let handle = tokio::spawn(async move {
            task.run().await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_keepalive_sends_pings() {
        let config = WebSocketConfig {
            ping_interval: 1,
            connection_timeout: 60,
            cleanup_interval: 60,
        };
        let registry = Arc::new(ConnectionRegistry::new());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (tx, mut rx) = mpsc::channel::<Frame>(8);
        let _handle = registry.add(tx);

        let task = KeepaliveTask::new(config, registry, shutdown_rx);
        let task_handle = tokio::spawn(async move {
            task.run().await;
        });

        let frame = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive ping")
            .expect("Channel should not be closed");
        assert_eq!(frame, Frame::Ping);

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }
}
