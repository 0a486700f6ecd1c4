//! Ephemeral key/value store access.
//!
//! The control plane's client drops a bearer token and per-session file
//! references into a shared Redis database. This core only reads them, once
//! per orchestration step; nothing is cached locally.

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::config::RedisConfig;
use crate::error::Result;

/// Key holding the shared client token
const TOKEN_KEY: &str = "client_token";

/// Key prefix for per-session file references
const FILENAME_PREFIX: &str = "client_filename";

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fetch the shared bearer token, if one has been saved
    async fn get_token(&self) -> Result<Option<String>>;

    /// Fetch the raw input-file reference for a session, if one exists
    async fn get_file_ref(&self, session_id: u64) -> Result<Option<String>>;
}

/// Redis-backed token store using a managed multiplexed connection.
pub struct RedisTokenStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisTokenStore {
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(url = %config.url, "Connected to ephemeral store");
        Ok(Self { conn })
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn get_token(&self) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(TOKEN_KEY).await?;
        Ok(value)
    }

    async fn get_file_ref(&self, session_id: u64) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let key = format!("{}:{}", FILENAME_PREFIX, session_id);
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }
}
