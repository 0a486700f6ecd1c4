// Infrastructure layer (shared components)
pub mod config;
pub mod error;
pub mod metrics;

// Domain layer (event relay and round orchestration)
pub mod bus;
pub mod connections;
pub mod orchestrator;
pub mod relay;
pub mod sessions;
pub mod store;
pub mod training;

// Application layer
pub mod api;
pub mod gateway;
pub mod server;

// Supporting modules
pub mod tasks;
