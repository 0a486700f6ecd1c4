//! Round orchestrator: reacts to `new-round` events by resolving session
//! credentials and metadata, running one-time data preparation on the first
//! round, and launching the training-round runner without awaiting it.
//!
//! Every failure here is scoped to the triggering event; the listener loop
//! keeps going.

mod launch;

pub use launch::LaunchPool;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::bus::MessageHandler;
use crate::error::{AppError, Result};
use crate::metrics::{DATA_PREPARATIONS, ROUND_EVENTS_FAILED, ROUND_EVENTS_TOTAL};
use crate::sessions::SessionApi;
use crate::store::TokenStore;
use crate::training::{DataPreparer, PrepareRequest, RoundLaunch, RoundRunner};

/// Decoded `new-round` event.
///
/// `round_number` is 1-based; round 1 is the unique trigger for one-time data
/// preparation. Monotonicity per session is the publisher's business, not
/// enforced here.
#[derive(Debug, Clone, Deserialize)]
pub struct RoundEvent {
    pub session_id: u64,
    pub round_number: u32,
}

pub struct RoundOrchestrator {
    store: Arc<dyn TokenStore>,
    session_api: Arc<dyn SessionApi>,
    preparer: Arc<dyn DataPreparer>,
    runner: Arc<dyn RoundRunner>,
    pool: LaunchPool,
}

impl RoundOrchestrator {
    pub fn new(
        store: Arc<dyn TokenStore>,
        session_api: Arc<dyn SessionApi>,
        preparer: Arc<dyn DataPreparer>,
        runner: Arc<dyn RoundRunner>,
        pool: LaunchPool,
    ) -> Self {
        Self {
            store,
            session_api,
            preparer,
            runner,
            pool,
        }
    }

    /// Run one orchestration step for a round event.
    ///
    /// Steps: resolve token and file reference, fetch session metadata,
    /// prepare data iff this is round 1, then hand the launch to the pool
    /// and return its fresh `process_id` without waiting for the round.
    #[tracing::instrument(
        name = "orchestrator.round",
        skip(self),
        fields(session_id = event.session_id, round_number = event.round_number)
    )]
    pub async fn handle_round(&self, event: RoundEvent) -> Result<Uuid> {
        let token = self
            .store
            .get_token()
            .await?
            .ok_or(AppError::MissingToken)?;
        let file_ref = self
            .store
            .get_file_ref(event.session_id)
            .await?
            .ok_or(AppError::MissingFileRef(event.session_id))?;

        let metadata = self
            .session_api
            .fetch_session(event.session_id, &token)
            .await?;

        if event.round_number == 1 {
            tracing::info!(
                session_id = event.session_id,
                file_ref = %file_ref,
                "First round, running data preparation"
            );
            self.preparer
                .prepare(PrepareRequest {
                    file_ref,
                    session_id: event.session_id,
                    input_columns: metadata.federated_info.input_columns,
                    output_columns: metadata.federated_info.output_columns,
                    token: token.clone(),
                })
                .await?;
            DATA_PREPARATIONS.inc();
        }

        let process_id = Uuid::new_v4();
        self.pool.launch(
            self.runner.clone(),
            RoundLaunch {
                process_id,
                session_id: event.session_id,
                token,
            },
        );

        Ok(process_id)
    }
}

#[async_trait]
impl MessageHandler for RoundOrchestrator {
    async fn handle(&self, channel: &str, payload: &str) {
        ROUND_EVENTS_TOTAL.inc();

        let event: RoundEvent = match serde_json::from_str(payload) {
            Ok(e) => e,
            Err(e) => {
                ROUND_EVENTS_FAILED.inc();
                tracing::warn!(
                    channel = %channel,
                    error = %e,
                    payload = %payload,
                    "Undecodable round event, skipping"
                );
                return;
            }
        };

        if event.round_number == 0 {
            ROUND_EVENTS_FAILED.inc();
            tracing::warn!(
                channel = %channel,
                session_id = event.session_id,
                "Round number must be positive, skipping"
            );
            return;
        }

        match self.handle_round(event.clone()).await {
            Ok(process_id) => {
                tracing::info!(
                    session_id = event.session_id,
                    round_number = event.round_number,
                    process_id = %process_id,
                    "Round launched"
                );
            }
            Err(e) => {
                ROUND_EVENTS_FAILED.inc();
                tracing::warn!(
                    session_id = event.session_id,
                    round_number = event.round_number,
                    error = %e,
                    "Round orchestration failed"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_event() {
        let event: RoundEvent =
            serde_json::from_str(r#"{"session_id": 42, "round_number": 1}"#).unwrap();
        assert_eq!(event.session_id, 42);
        assert_eq!(event.round_number, 1);
    }

    #[test]
    fn test_parse_round_event_rejects_garbage() {
        assert!(serde_json::from_str::<RoundEvent>("not json").is_err());
        assert!(serde_json::from_str::<RoundEvent>(r#"{"session_id": "abc"}"#).is_err());
        assert!(serde_json::from_str::<RoundEvent>(r#"{"round_number": 3}"#).is_err());
    }
}
