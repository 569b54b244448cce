//! Configuration module for the exporter.
//!
//! Configuration is read from environment variables, organised by concern:
//! ledger RPC, polling schedule and observability. Every loader takes a
//! lookup function so tests can supply variables without mutating the
//! process environment.

mod observability_config;
mod poller_config;
mod rpc_config;

pub use observability_config::ObservabilityEnvConfig;
pub use poller_config::PollerEnvConfig;
pub use rpc_config::RpcEnvConfig;

use crate::domain::errors::ConfigError;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

/// Main exporter configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment environment tag (`ENV`)
    pub environment: String,
    /// When set, only this account is polled (`MARGINFI_ACCOUNT`)
    pub account_filter: Option<String>,
    pub rpc: RpcEnvConfig,
    pub poller: PollerEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            environment: var(&lookup, "ENV").unwrap_or_else(|| "unknown".to_string()),
            account_filter: var(&lookup, "MARGINFI_ACCOUNT"),
            rpc: RpcEnvConfig::from_lookup(&lookup)?,
            poller: PollerEnvConfig::from_lookup(&lookup)?,
            observability: ObservabilityEnvConfig::from_lookup(&lookup)?,
        })
    }
}

/// Trimmed value of `key`; empty counts as unset.
pub(crate) fn var<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse `key`, falling back to `default` when unset. Unparseable values are errors.
pub(crate) fn parse_var<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    match var(lookup, key) {
        None => Ok(default),
        Some(raw) => raw.parse::<T>().map_err(|e| ConfigError::Invalid {
            key,
            value: raw,
            reason: e.to_string(),
        }),
    }
}
