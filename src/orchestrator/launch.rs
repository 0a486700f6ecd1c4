use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::metrics::{ROUNDS_IN_FLIGHT, ROUNDS_LAUNCHED};
use crate::training::{RoundLaunch, RoundRunner};

/// Bounded pool for fire-and-forget training-round executions.
///
/// `launch` never blocks the caller: every execution gets its own task, and
/// the semaphore bounds how many run at once rather than how many are queued.
/// Completion is observed only to log the result; rounds cannot be cancelled
/// once launched.
pub struct LaunchPool {
    permits: Arc<Semaphore>,
    launched: AtomicU64,
}

impl LaunchPool {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            launched: AtomicU64::new(0),
        }
    }

    /// Hand a round execution to the pool and return immediately.
    pub fn launch(&self, runner: Arc<dyn RoundRunner>, launch: RoundLaunch) {
        self.launched.fetch_add(1, Ordering::Relaxed);
        ROUNDS_LAUNCHED.inc();

        let permits = self.permits.clone();
        tokio::spawn(async move {
            // Closed only on process teardown
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };

            ROUNDS_IN_FLIGHT.inc();
            let process_id = launch.process_id;
            let session_id = launch.session_id;

            tracing::info!(
                process_id = %process_id,
                session_id = session_id,
                "Training round started"
            );

            match runner.run(launch).await {
                Ok(()) => {
                    tracing::info!(
                        process_id = %process_id,
                        session_id = session_id,
                        "Training round finished"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        process_id = %process_id,
                        session_id = session_id,
                        error = %e,
                        "Training round failed"
                    );
                }
            }

            ROUNDS_IN_FLIGHT.dec();
        });
    }

    /// Total rounds handed to the pool since startup
    pub fn launched(&self) -> u64 {
        self.launched.load(Ordering::Relaxed)
    }
}
