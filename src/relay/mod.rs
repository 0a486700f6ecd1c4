//! Session fan-out listener: relays `new-session` payloads verbatim to every
//! connected client. No transformation, no payload validation.

use std::sync::Arc;

use async_trait::async_trait;

use crate::bus::MessageHandler;
use crate::connections::ConnectionRegistry;
use crate::metrics::{RELAY_SEND_FAILURES, SESSION_EVENTS_RELAYED};

pub struct SessionFanout {
    registry: Arc<ConnectionRegistry>,
}

impl SessionFanout {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MessageHandler for SessionFanout {
    async fn handle(&self, channel: &str, payload: &str) {
        let report = self.registry.broadcast(payload).await;

        SESSION_EVENTS_RELAYED.inc();
        if report.removed > 0 {
            RELAY_SEND_FAILURES.inc_by(report.removed as u64);
        }

        tracing::debug!(
            channel = %channel,
            delivered = report.delivered,
            removed = report.removed,
            "Relayed session event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::Frame;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_fanout_relays_payload_verbatim() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        registry.add(tx);

        let fanout = SessionFanout::new(registry.clone());
        fanout.handle("new-session", "{\"not\": \"validated\"}").await;

        assert_eq!(
            rx.recv().await,
            Some(Frame::Text("{\"not\": \"validated\"}".to_string()))
        );
    }
}
