use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Outbound frame for a gateway connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Relayed event payload, forwarded verbatim as a text frame
    Text(String),
    /// Keepalive ping
    Ping,
    /// Tells the gateway to close the socket and stop draining frames
    Close,
}

/// Handle for a single WebSocket connection.
///
/// The registry is the only owner of handles; other components reach a
/// connection through `broadcast` and never hold one across await points.
pub struct ConnectionHandle {
    pub id: Uuid,
    pub connected_at: DateTime<Utc>,
    sender: mpsc::Sender<Frame>,
    last_activity: RwLock<DateTime<Utc>>,
}

impl ConnectionHandle {
    fn new(sender: mpsc::Sender<Frame>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            connected_at: now,
            sender,
            last_activity: RwLock::new(now),
        }
    }

    pub async fn send(&self, frame: Frame) -> Result<(), mpsc::error::SendError<Frame>> {
        self.sender.send(frame).await
    }

    pub async fn update_activity(&self) {
        let mut last = self.last_activity.write().await;
        *last = Utc::now();
    }

    pub async fn last_activity(&self) -> DateTime<Utc> {
        *self.last_activity.read().await
    }
}

/// Outcome of one broadcast pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct BroadcastReport {
    /// Connections the payload was delivered to
    pub delivered: usize,
    /// Connections removed because their send failed
    pub removed: usize,
}

/// Set of currently-open client connections.
///
/// Safe under concurrent `add`/`remove` from the gateway and concurrent
/// `broadcast` from the fan-out listener.
pub struct ConnectionRegistry {
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection
    pub fn add(&self, sender: mpsc::Sender<Frame>) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(sender));
        self.connections.insert(handle.id, handle.clone());

        tracing::info!(connection_id = %handle.id, "Connection registered");

        handle
    }

    /// Deregister a connection; removing an absent id is a no-op
    pub fn remove(&self, connection_id: Uuid) {
        if self.connections.remove(&connection_id).is_some() {
            tracing::info!(connection_id = %connection_id, "Connection removed");
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of the current connection set.
    ///
    /// Broadcast iterates this snapshot, not the live map, so a connection
    /// closing mid-broadcast cannot affect delivery to the others.
    pub fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    /// Deliver `text` to every registered connection.
    ///
    /// A failed send means the client side of the channel is gone; that
    /// connection is removed and the broadcast continues with the rest.
    pub async fn broadcast(&self, text: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();

        for conn in self.snapshot() {
            match conn.send(Frame::Text(text.to_owned())).await {
                Ok(()) => report.delivered += 1,
                Err(_) => {
                    tracing::debug!(
                        connection_id = %conn.id,
                        "Send failed during broadcast, removing connection"
                    );
                    self.remove(conn.id);
                    report.removed += 1;
                }
            }
        }

        report
    }

    /// Find connections with no activity for longer than the timeout
    pub async fn find_stale(&self, timeout_secs: u64) -> Vec<Uuid> {
        let now = Utc::now();
        let timeout = chrono::Duration::seconds(timeout_secs as i64);
        let mut stale = Vec::new();

        for entry in self.connections.iter() {
            let last_activity = entry.value().last_activity().await;
            if now.signed_duration_since(last_activity) > timeout {
                stale.push(*entry.key());
            }
        }

        stale
    }

    /// Signal the gateway to close the socket, then drop the handle.
    ///
    /// The send is best-effort: if the frame channel is already gone the
    /// socket tasks are winding down on their own.
    pub async fn close(&self, connection_id: Uuid) {
        let handle = self
            .connections
            .get(&connection_id)
            .map(|entry| entry.value().clone());
        if let Some(conn) = handle {
            let _ = conn.send(Frame::Close).await;
        }
        self.remove(connection_id);
    }

    /// Close stale connections and return how many were dropped
    pub async fn cleanup_stale(&self, timeout_secs: u64) -> usize {
        let stale = self.find_stale(timeout_secs).await;
        let count = stale.len();

        for conn_id in stale {
            tracing::info!(connection_id = %conn_id, "Closing stale connection due to timeout");
            self.close(conn_id).await;
        }

        count
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel() -> (mpsc::Sender<Frame>, mpsc::Receiver<Frame>) {
        mpsc::channel(8)
    }

    #[tokio::test]
    async fn test_add_and_remove() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();

        let handle = registry.add(tx);
        assert_eq!(registry.len(), 1);

        registry.remove(handle.id);
        assert!(registry.is_empty());

        // Removing an absent connection is a no-op
        registry.remove(handle.id);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_all() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, mut rx2) = channel();
        registry.add(tx1);
        registry.add(tx2);

        let report = registry.broadcast("hello").await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.removed, 0);

        assert_eq!(rx1.recv().await, Some(Frame::Text("hello".to_string())));
        assert_eq!(rx2.recv().await, Some(Frame::Text("hello".to_string())));
    }

    #[tokio::test]
    async fn test_broadcast_removes_failed_connection() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = channel();
        let (tx2, rx2) = channel();
        registry.add(tx1);
        registry.add(tx2);

        // Simulate a disconnected client
        drop(rx2);

        let report = registry.broadcast("hello").await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.removed, 1);
        assert_eq!(registry.len(), 1);

        // The surviving connection got exactly one copy
        assert_eq!(rx1.recv().await, Some(Frame::Text("hello".to_string())));
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_cleanup() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = channel();
        registry.add(tx);

        // Nothing stale with a generous timeout
        assert_eq!(registry.cleanup_stale(3600).await, 0);
        assert_eq!(registry.len(), 1);

        // Everything is stale with a zero timeout after a short wait
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(registry.cleanup_stale(0).await, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_stale_cleanup_signals_the_socket_to_close() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = channel();
        registry.add(tx);

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert_eq!(registry.cleanup_stale(0).await, 1);

        // The gateway side of the channel is told to close the socket,
        // not just forgotten
        assert_eq!(rx.recv().await, Some(Frame::Close));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_close_is_a_noop_for_unknown_connection() {
        let registry = ConnectionRegistry::new();
        registry.close(Uuid::new_v4()).await;
        assert!(registry.is_empty());
    }
}
