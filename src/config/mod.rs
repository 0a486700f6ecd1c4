mod settings;

pub use settings::{
    OrchestratorConfig, RedisConfig, ServerConfig, SessionApiConfig, Settings, WebSocketConfig,
};
