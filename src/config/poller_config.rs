//! Poll schedule configuration parsing from environment variables.

use super::parse_var;
use crate::domain::errors::ConfigError;
use rand::Rng;
use std::time::Duration;

/// Poll schedule environment configuration
#[derive(Debug, Clone)]
pub struct PollerEnvConfig {
    pub interval: Duration,
    pub jitter: Duration,
    pub cycle_deadline: Duration,
    pub fetch_concurrency: usize,
    pub breaker_failure_threshold: usize,
    pub breaker_cooldown: Duration,
}

impl Default for PollerEnvConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            jitter: Duration::from_millis(2000),
            cycle_deadline: Duration::from_secs(120),
            fetch_concurrency: 8,
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(60),
        }
    }
}

impl PollerEnvConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch_concurrency: usize = parse_var(lookup, "FETCH_CONCURRENCY", 8)?;
        if fetch_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "FETCH_CONCURRENCY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let cycle_deadline_secs: u64 = parse_var(lookup, "CYCLE_DEADLINE_SECS", 120)?;
        if cycle_deadline_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "CYCLE_DEADLINE_SECS",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            interval: Duration::from_secs(parse_var(lookup, "POLL_INTERVAL_SECS", 30)?),
            jitter: Duration::from_millis(parse_var(lookup, "POLL_JITTER_MS", 2000)?),
            cycle_deadline: Duration::from_secs(cycle_deadline_secs),
            fetch_concurrency,
            breaker_failure_threshold: parse_var(lookup, "BREAKER_FAILURE_THRESHOLD", 5)?,
            breaker_cooldown: Duration::from_secs(parse_var(lookup, "BREAKER_COOLDOWN_SECS", 60)?),
        })
    }

    /// Delay before the next cycle: the interval plus uniform jitter in `[0, jitter]`.
    pub fn next_delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        if jitter_ms == 0 {
            return self.interval;
        }
        let mut rng = rand::rng();
        self.interval + Duration::from_millis(rng.random_range(0..=jitter_ms))
    }
}
