//! End-to-end tests for the relay core.
//!
//! These exercise the fan-out and orchestration paths against stub
//! collaborators, without a live Redis broker or control-plane server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use fedrelay::bus::MessageHandler;
use fedrelay::connections::{ConnectionRegistry, Frame};
use fedrelay::error::{AppError, Result};
use fedrelay::orchestrator::{LaunchPool, RoundEvent, RoundOrchestrator};
use fedrelay::relay::SessionFanout;
use fedrelay::sessions::{FederatedInfo, SessionApi, SessionMetadata};
use fedrelay::store::TokenStore;
use fedrelay::training::{DataPreparer, PrepareRequest, RoundLaunch, RoundRunner};

// =============================================================================
// Stub collaborators
// =============================================================================

struct StubTokenStore {
    token: Option<String>,
    file_ref: Option<String>,
}

impl StubTokenStore {
    fn populated() -> Self {
        Self {
            token: Some("secret-token".to_string()),
            file_ref: Some("uploads/data.parquet".to_string()),
        }
    }
}

#[async_trait]
impl TokenStore for StubTokenStore {
    async fn get_token(&self) -> Result<Option<String>> {
        Ok(self.token.clone())
    }

    async fn get_file_ref(&self, _session_id: u64) -> Result<Option<String>> {
        Ok(self.file_ref.clone())
    }
}

struct StubSessionApi {
    input_columns: Vec<String>,
    output_columns: Vec<String>,
    fail_next: AtomicBool,
    calls: Mutex<Vec<u64>>,
}

impl StubSessionApi {
    fn new(input: &[&str], output: &[&str]) -> Self {
        Self {
            input_columns: input.iter().map(|s| s.to_string()).collect(),
            output_columns: output.iter().map(|s| s.to_string()).collect(),
            fail_next: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SessionApi for StubSessionApi {
    async fn fetch_session(&self, session_id: u64, _token: &str) -> Result<SessionMetadata> {
        self.calls.lock().unwrap().push(session_id);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::SessionApi {
                session_id,
                status: 500,
            });
        }
        Ok(SessionMetadata {
            federated_info: FederatedInfo {
                input_columns: self.input_columns.clone(),
                output_columns: self.output_columns.clone(),
            },
        })
    }
}

struct RecordingPreparer {
    calls: Mutex<Vec<PrepareRequest>>,
    order: Arc<Mutex<Vec<&'static str>>>,
}

impl RecordingPreparer {
    fn new(order: Arc<Mutex<Vec<&'static str>>>) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            order,
        }
    }
}

#[async_trait]
impl DataPreparer for RecordingPreparer {
    async fn prepare(&self, request: PrepareRequest) -> Result<()> {
        self.order.lock().unwrap().push("prepare");
        self.calls.lock().unwrap().push(request);
        Ok(())
    }
}

struct RecordingRunner {
    delay: Duration,
    order: Arc<Mutex<Vec<&'static str>>>,
    finished: mpsc::Sender<RoundLaunch>,
}

#[async_trait]
impl RoundRunner for RecordingRunner {
    async fn run(&self, launch: RoundLaunch) -> Result<()> {
        self.order.lock().unwrap().push("run");
        tokio::time::sleep(self.delay).await;
        let _ = self.finished.send(launch).await;
        Ok(())
    }
}

struct Harness {
    orchestrator: RoundOrchestrator,
    api: Arc<StubSessionApi>,
    preparer: Arc<RecordingPreparer>,
    order: Arc<Mutex<Vec<&'static str>>>,
    finished: mpsc::Receiver<RoundLaunch>,
}

fn harness_with(store: StubTokenStore, runner_delay: Duration) -> Harness {
    let order = Arc::new(Mutex::new(Vec::new()));
    let api = Arc::new(StubSessionApi::new(&["a"], &["b"]));
    let preparer = Arc::new(RecordingPreparer::new(order.clone()));
    let (finished_tx, finished_rx) = mpsc::channel(16);
    let runner = Arc::new(RecordingRunner {
        delay: runner_delay,
        order: order.clone(),
        finished: finished_tx,
    });

    let orchestrator = RoundOrchestrator::new(
        Arc::new(store),
        api.clone(),
        preparer.clone(),
        runner,
        LaunchPool::new(4),
    );

    Harness {
        orchestrator,
        api,
        preparer,
        order,
        finished: finished_rx,
    }
}

fn harness() -> Harness {
    harness_with(StubTokenStore::populated(), Duration::ZERO)
}

fn round_event(session_id: u64, round_number: u32) -> RoundEvent {
    RoundEvent {
        session_id,
        round_number,
    }
}

// =============================================================================
// Fan-out scenarios
// =============================================================================

mod fanout_tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_connections() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        registry.add(tx1);
        registry.add(tx2);

        let fanout = SessionFanout::new(registry.clone());
        fanout.handle("new-session", "hello").await;

        assert_eq!(rx1.recv().await, Some(Frame::Text("hello".to_string())));
        assert_eq!(rx2.recv().await, Some(Frame::Text("hello".to_string())));
    }

    #[tokio::test]
    async fn test_disconnected_client_is_dropped_from_later_broadcasts() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, rx2) = mpsc::channel(8);
        registry.add(tx1);
        registry.add(tx2);
        assert_eq!(registry.len(), 2);

        let fanout = SessionFanout::new(registry.clone());
        fanout.handle("new-session", "hello").await;
        assert_eq!(rx1.recv().await, Some(Frame::Text("hello".to_string())));

        // One client goes away
        drop(rx2);

        fanout.handle("new-session", "hello").await;
        assert_eq!(rx1.recv().await, Some(Frame::Text("hello".to_string())));
        assert_eq!(registry.len(), 1);

        // The survivor saw exactly one copy per publish
        assert!(rx1.try_recv().is_err());
    }
}

// =============================================================================
// Orchestration scenarios
// =============================================================================

mod orchestrator_tests {
    use super::*;

    #[tokio::test]
    async fn test_first_round_prepares_once_before_launch() {
        let mut h = harness();

        let process_id = h.orchestrator.handle_round(round_event(42, 1)).await.unwrap();

        let launch = timeout(Duration::from_secs(1), h.finished.recv())
            .await
            .expect("launch should complete")
            .unwrap();
        assert_eq!(launch.process_id, process_id);
        assert_eq!(launch.session_id, 42);
        assert_eq!(launch.token, "secret-token");

        let calls = h.preparer.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].session_id, 42);
        assert_eq!(calls[0].file_ref, "uploads/data.parquet");
        assert_eq!(calls[0].input_columns, vec!["a"]);
        assert_eq!(calls[0].output_columns, vec!["b"]);

        // Preparation completed before the round started
        assert_eq!(*h.order.lock().unwrap(), vec!["prepare", "run"]);
    }

    #[tokio::test]
    async fn test_later_rounds_never_prepare() {
        let mut h = harness();

        for round in [2, 3, 7] {
            h.orchestrator.handle_round(round_event(42, round)).await.unwrap();
            timeout(Duration::from_secs(1), h.finished.recv())
                .await
                .expect("launch should complete")
                .unwrap();
        }

        assert!(h.preparer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_launch_never_blocks_the_next_event() {
        let mut h = harness_with(StubTokenStore::populated(), Duration::from_secs(1));

        let start = Instant::now();
        h.orchestrator.handle_round(round_event(1, 2)).await.unwrap();
        h.orchestrator.handle_round(round_event(1, 3)).await.unwrap();
        assert!(
            start.elapsed() < Duration::from_millis(500),
            "orchestration must not wait for the runner"
        );

        // Both slow rounds still run to completion
        for _ in 0..2 {
            timeout(Duration::from_secs(3), h.finished.recv())
                .await
                .expect("launch should complete")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_back_to_back_launches_get_distinct_process_ids() {
        let h = harness();

        let first = h.orchestrator.handle_round(round_event(5, 2)).await.unwrap();
        let second = h.orchestrator.handle_round(round_event(5, 3)).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn test_missing_token_fails_only_that_event() {
        let h = harness_with(
            StubTokenStore {
                token: None,
                file_ref: Some("uploads/data.parquet".to_string()),
            },
            Duration::ZERO,
        );

        let err = h.orchestrator.handle_round(round_event(9, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::MissingToken));
        assert!(h.preparer.calls.lock().unwrap().is_empty());
        assert!(h.api.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_ref_fails_only_that_event() {
        let h = harness_with(
            StubTokenStore {
                token: Some("secret-token".to_string()),
                file_ref: None,
            },
            Duration::ZERO,
        );

        let err = h.orchestrator.handle_round(round_event(9, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::MissingFileRef(9)));
        assert!(h.preparer.calls.lock().unwrap().is_empty());
    }
}

// =============================================================================
// Listener-loop resilience
// =============================================================================

mod loop_boundary_tests {
    use super::*;

    #[tokio::test]
    async fn test_session_api_failure_does_not_kill_the_loop() {
        let mut h = harness();
        h.api.fail_next.store(true, Ordering::SeqCst);

        // First event: API returns 500, nothing is prepared or launched
        h.orchestrator
            .handle("new-round", r#"{"session_id": 42, "round_number": 1}"#)
            .await;
        assert!(h.preparer.calls.lock().unwrap().is_empty());
        assert!(
            timeout(Duration::from_millis(200), h.finished.recv()).await.is_err(),
            "no launch after an API failure"
        );

        // A subsequent valid event is processed normally
        h.orchestrator
            .handle("new-round", r#"{"session_id": 42, "round_number": 1}"#)
            .await;
        let launch = timeout(Duration::from_secs(1), h.finished.recv())
            .await
            .expect("launch should complete")
            .unwrap();
        assert_eq!(launch.session_id, 42);
        assert_eq!(h.preparer.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_round_event_is_skipped() {
        let mut h = harness();

        h.orchestrator.handle("new-round", "not json at all").await;
        h.orchestrator
            .handle("new-round", r#"{"session_id": 42, "round_number": 0}"#)
            .await;
        assert!(
            timeout(Duration::from_millis(200), h.finished.recv()).await.is_err(),
            "malformed events never launch"
        );

        // The handler still works afterwards
        h.orchestrator
            .handle("new-round", r#"{"session_id": 42, "round_number": 2}"#)
            .await;
        timeout(Duration::from_secs(1), h.finished.recv())
            .await
            .expect("launch should complete")
            .unwrap();
    }
}
