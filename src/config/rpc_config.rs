//! Ledger RPC configuration parsing from environment variables.

use super::{parse_var, var};
use crate::domain::errors::ConfigError;
use std::time::Duration;
use url::Url;

/// Ledger RPC environment configuration
#[derive(Debug, Clone)]
pub struct RpcEnvConfig {
    pub endpoint: Url,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl RpcEnvConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = var(lookup, "RPC_ENDPOINT").ok_or(ConfigError::Missing {
            key: "RPC_ENDPOINT",
        })?;
        let endpoint = Url::parse(&raw).map_err(|e| ConfigError::Invalid {
            key: "RPC_ENDPOINT",
            value: raw.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                key: "RPC_ENDPOINT",
                value: raw,
                reason: "scheme must be http or https".to_string(),
            });
        }

        let timeout_secs: u64 = parse_var(lookup, "RPC_TIMEOUT_SECS", 30)?;

        Ok(Self {
            endpoint,
            timeout: Duration::from_secs(timeout_secs.max(1)),
            max_retries: parse_var(lookup, "RPC_MAX_RETRIES", 3)?,
        })
    }
}
