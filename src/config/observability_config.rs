//! Observability configuration parsing from environment variables.
//!
//! This module handles the metrics exposition endpoint.

use super::parse_var;
use crate::domain::errors::ConfigError;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Observability environment configuration
#[derive(Debug, Clone)]
pub struct ObservabilityEnvConfig {
    pub port: u16,
    pub bind_address: IpAddr,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self {
            port: 9003,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            port: parse_var(lookup, "METRICS_PORT", defaults.port)?,
            bind_address: parse_var(lookup, "METRICS_BIND_ADDRESS", defaults.bind_address)?,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.port)
    }
}
