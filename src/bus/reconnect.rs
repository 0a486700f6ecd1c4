use std::time::Duration;

use rand::Rng;

use crate::config::RedisConfig;

/// Spread applied around each delay so a fleet of relays does not hit the
/// broker in lockstep after an outage
const JITTER_SPREAD: f64 = 0.1;

/// Delay sequence for re-establishing a dropped broker subscription.
///
/// Doubles per attempt from the configured floor up to the configured
/// ceiling, jittered by +/-10%. `reset` after a successful resubscribe
/// starts the sequence over.
pub struct ReconnectDelay {
    floor_ms: u64,
    ceiling_ms: u64,
    attempt: u32,
}

impl ReconnectDelay {
    pub fn new(floor_ms: u64, ceiling_ms: u64) -> Self {
        let floor_ms = floor_ms.max(1);
        Self {
            floor_ms,
            ceiling_ms: ceiling_ms.max(floor_ms),
            attempt: 0,
        }
    }

    /// Floor and ceiling come from the `redis` section of the settings.
    pub fn from_config(config: &RedisConfig) -> Self {
        Self::new(config.reconnect_initial_ms, config.reconnect_max_ms)
    }

    /// Delay to wait before the next reconnect attempt.
    pub fn next(&mut self) -> Duration {
        let shift = self.attempt.min(16);
        let base_ms = self
            .floor_ms
            .saturating_mul(1u64 << shift)
            .min(self.ceiling_ms);
        self.attempt = self.attempt.saturating_add(1);

        let factor = rand::rng().random_range(1.0 - JITTER_SPREAD..1.0 + JITTER_SPREAD);
        Duration::from_millis(((base_ms as f64) * factor).max(1.0) as u64)
    }

    /// Start the sequence over after a successful resubscribe.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Attempts since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
