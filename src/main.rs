use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fedrelay::bus::{ChannelSubscriber, MessageHandler, ROUND_CHANNEL, SESSION_CHANNEL};
use fedrelay::config::Settings;
use fedrelay::orchestrator::{LaunchPool, RoundOrchestrator};
use fedrelay::relay::SessionFanout;
use fedrelay::server::{create_app, AppState};
use fedrelay::sessions::HttpSessionApi;
use fedrelay::store::RedisTokenStore;
use fedrelay::tasks::KeepaliveTask;
use fedrelay::training::{CommandDataPreparer, CommandRoundRunner};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::new()?;
    tracing::info!("Configuration loaded");

    // Create application state
    let state = AppState::new(settings.clone());
    tracing::info!("Application state initialized");

    // Shared shutdown signal for all background loops
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    // Assemble the round orchestrator with its external collaborators
    let token_store = Arc::new(RedisTokenStore::connect(&settings.redis).await?);
    let session_api = Arc::new(HttpSessionApi::new(&settings.session_api)?);
    let preparer = Arc::new(CommandDataPreparer::new(
        settings.orchestrator.prepare_command.clone(),
    ));
    let runner = Arc::new(CommandRoundRunner::new(
        settings.orchestrator.run_command.clone(),
    ));
    let orchestrator: Arc<dyn MessageHandler> = Arc::new(RoundOrchestrator::new(
        token_store,
        session_api,
        preparer,
        runner,
        LaunchPool::new(settings.orchestrator.max_concurrent_rounds),
    ));

    let fanout: Arc<dyn MessageHandler> = Arc::new(SessionFanout::new(state.registry.clone()));

    // One subscriber per channel, each on its own broker connection
    let session_subscriber = ChannelSubscriber::new(
        settings.redis.clone(),
        SESSION_CHANNEL,
        shutdown_tx.clone(),
    );
    let round_subscriber =
        ChannelSubscriber::new(settings.redis.clone(), ROUND_CHANNEL, shutdown_tx.clone());

    let session_handle = tokio::spawn(async move {
        if let Err(e) = session_subscriber.run(fanout).await {
            tracing::error!(error = %e, "Session fan-out listener failed");
        }
    });
    let round_handle = tokio::spawn(async move {
        if let Err(e) = round_subscriber.run(orchestrator).await {
            tracing::error!(error = %e, "Round orchestrator listener failed");
        }
    });

    // Start keepalive task in background
    let keepalive_task = KeepaliveTask::new(
        settings.websocket.clone(),
        state.registry.clone(),
        shutdown_tx.subscribe(),
    );
    let keepalive_handle = tokio::spawn(async move {
        keepalive_task.run().await;
    });

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    // Wait for background tasks to finish
    tracing::info!("Waiting for background tasks to finish...");
    let _ = tokio::join!(session_handle, round_handle, keepalive_handle);

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    // Stop listener loops and the keepalive task
    let _ = shutdown_tx.send(());
}
