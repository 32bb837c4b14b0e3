//! Environment-driven producer configuration.

use std::time::Duration;

use crate::error::{Error, Result};

const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_COUNT_FREQUENCY: u64 = 100;
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 40;
const DEFAULT_STREAM_NAME_PREFIX: &str = "CallstreamProducer";

/// Producer service configuration.
///
/// Required env vars: `UPLOAD_ROLE_ARN`, `PIPELINE_CONFIGURATION_ARN`.
/// Optional: `AWS_REGION`, `PRODUCER_BIND_ADDRESS`, `PRODUCER_PORT`,
/// `COUNT_FREQUENCY`, `UPLOAD_TIMEOUT_SECS`, `ALLOW_INVALID_UPLOAD_CERTS`,
/// `STREAM_NAME_PREFIX`.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub region: String,
    /// Role assumed per upload attempt for stream provisioning and signing.
    pub upload_role_arn: String,
    /// Analysis pipeline configuration the orchestrator binds streams to.
    pub pipeline_configuration_arn: String,
    /// Sample rate for upload telemetry chunks: log every Nth.
    pub count_frequency: u64,
    pub bind_address: String,
    pub port: u16,
    /// Connect and read-stall budget for the streaming upload. Not a cap on
    /// total upload duration.
    pub upload_timeout: Duration,
    /// Reviewed opt-in for data-plane endpoints with untrusted certificates.
    pub allow_invalid_upload_certs: bool,
    pub stream_name_prefix: String,
}

impl ProducerConfig {
    pub fn from_env() -> Result<Self> {
        let region = env_or("AWS_REGION", DEFAULT_REGION);
        let upload_role_arn = require("UPLOAD_ROLE_ARN")?;
        let pipeline_configuration_arn = require("PIPELINE_CONFIGURATION_ARN")?;

        let count_frequency = parse_env("COUNT_FREQUENCY", DEFAULT_COUNT_FREQUENCY)?;
        if count_frequency == 0 {
            return Err(Error::config("COUNT_FREQUENCY must be nonzero"));
        }

        let bind_address = env_or("PRODUCER_BIND_ADDRESS", DEFAULT_BIND_ADDRESS);
        let port = parse_env("PRODUCER_PORT", DEFAULT_PORT)?;
        let upload_timeout =
            Duration::from_secs(parse_env("UPLOAD_TIMEOUT_SECS", DEFAULT_UPLOAD_TIMEOUT_SECS)?);
        let allow_invalid_upload_certs = flag_env("ALLOW_INVALID_UPLOAD_CERTS");
        let stream_name_prefix = env_or("STREAM_NAME_PREFIX", DEFAULT_STREAM_NAME_PREFIX);

        Ok(Self {
            region,
            upload_role_arn,
            pipeline_configuration_arn,
            count_frequency,
            bind_address,
            port,
            upload_timeout,
            allow_invalid_upload_certs,
            stream_name_prefix,
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

fn flag_env(name: &str) -> bool {
    match std::env::var(name) {
        Ok(value) => {
            let value = value.trim();
            value.eq_ignore_ascii_case("true") || value == "1"
        }
        Err(_) => false,
    }
}
