//! Environment-driven relay configuration.

use std::time::Duration;
use url::Url;

use crate::error::{Error, Result};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8081;

/// Relay service configuration.
///
/// Required env vars: `CONNECTION_TABLE`, `TRANSCRIPT_TABLE`,
/// `PUSH_GATEWAY_ENDPOINT`. Optional: `AWS_REGION`, `RELAY_BIND_ADDRESS`,
/// `RELAY_PORT`, `CONNECTION_TTL_SECS`.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub region: String,
    /// Table holding the live recipient connections.
    pub connection_table: String,
    /// Table holding the durable transcript records.
    pub transcript_table: String,
    /// Deployed push-gateway base URL, stage path included.
    pub push_endpoint: Url,
    pub bind_address: String,
    pub port: u16,
    /// Registry entries expire this long after registration when set.
    pub connection_ttl: Option<Duration>,
}

impl RelayConfig {
    pub fn from_env() -> Result<Self> {
        let region = env_or("AWS_REGION", DEFAULT_REGION);
        let connection_table = require("CONNECTION_TABLE")?;
        let transcript_table = require("TRANSCRIPT_TABLE")?;

        let raw_endpoint = require("PUSH_GATEWAY_ENDPOINT")?;
        let push_endpoint = Url::parse(&raw_endpoint).map_err(|e| {
            Error::config(format!("PUSH_GATEWAY_ENDPOINT is not a valid URL: {e}"))
        })?;

        let bind_address = env_or("RELAY_BIND_ADDRESS", DEFAULT_BIND_ADDRESS);
        let port = parse_env("RELAY_PORT", DEFAULT_PORT)?;
        let connection_ttl = match std::env::var("CONNECTION_TTL_SECS") {
            Ok(value) if !value.trim().is_empty() => {
                let secs: u64 = value.trim().parse().map_err(|_| {
                    Error::config(format!("CONNECTION_TTL_SECS has an invalid value: `{value}`"))
                })?;
                Some(Duration::from_secs(secs))
            }
            _ => None,
        };

        Ok(Self {
            region,
            connection_table,
            transcript_table,
            push_endpoint,
            bind_address,
            port,
            connection_ttl,
        })
    }
}

fn require(name: &'static str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::config(format!("{name} must be set"))),
    }
}

fn env_or(name: &str, default: &str) -> String {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value,
        _ => default.to_string(),
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map_err(|_| Error::config(format!("{name} has an invalid value: `{value}`"))),
        _ => Ok(default),
    }
}
