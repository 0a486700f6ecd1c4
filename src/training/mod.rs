//! Training collaborators: one-time data preparation and the per-round
//! runner. Both are external programs from this core's point of view;
//! preparation is awaited, round execution is not.

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Arguments for the one-time data preparation step
#[derive(Debug, Clone)]
pub struct PrepareRequest {
    pub file_ref: String,
    pub session_id: u64,
    pub input_columns: Vec<String>,
    pub output_columns: Vec<String>,
    pub token: String,
}

/// Arguments for one training-round execution
#[derive(Debug, Clone)]
pub struct RoundLaunch {
    pub process_id: Uuid,
    pub session_id: u64,
    pub token: String,
}

#[async_trait]
pub trait DataPreparer: Send + Sync {
    /// Run data preparation to completion. Called only for round 1.
    async fn prepare(&self, request: PrepareRequest) -> Result<()>;
}

#[async_trait]
pub trait RoundRunner: Send + Sync {
    /// Execute one training round. The orchestrator never awaits this
    /// directly; the launch pool does and logs the outcome.
    async fn run(&self, launch: RoundLaunch) -> Result<()>;
}

/// Runs the configured preparation command and waits for it to exit.
pub struct CommandDataPreparer {
    program: String,
}

impl CommandDataPreparer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DataPreparer for CommandDataPreparer {
    async fn prepare(&self, request: PrepareRequest) -> Result<()> {
        let status = Command::new(&self.program)
            .arg(&request.file_ref)
            .arg(request.session_id.to_string())
            .arg(request.input_columns.join(","))
            .arg(request.output_columns.join(","))
            .arg(&request.token)
            .status()
            .await?;

        if !status.success() {
            return Err(AppError::Prepare(format!(
                "preparation command exited with {} for session {}",
                status, request.session_id
            )));
        }

        Ok(())
    }
}

/// Spawns the configured training-round command as a child process.
pub struct CommandRoundRunner {
    program: String,
}

impl CommandRoundRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl RoundRunner for CommandRoundRunner {
    async fn run(&self, launch: RoundLaunch) -> Result<()> {
        let status = Command::new(&self.program)
            .arg(launch.process_id.to_string())
            .arg(launch.session_id.to_string())
            .arg(&launch.token)
            .status()
            .await?;

        if !status.success() {
            tracing::warn!(
                process_id = %launch.process_id,
                session_id = launch.session_id,
                exit = %status,
                "Training-round command exited with failure"
            );
        }

        Ok(())
    }
}
