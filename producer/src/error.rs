//! Producer-wide error types.

use thiserror::Error;

/// Producer-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of an upload attempt an error surfaced in. Every stage is terminal;
/// there is no internal retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    CreateStream,
    ResolveEndpoint,
    BrokerCredentials,
    Sign,
    Open,
    FirstChunk,
    Streaming,
}

impl std::fmt::Display for UploadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UploadStage::CreateStream => "create-stream",
            UploadStage::ResolveEndpoint => "resolve-endpoint",
            UploadStage::BrokerCredentials => "broker-credentials",
            UploadStage::Sign => "sign",
            UploadStage::Open => "open",
            UploadStage::FirstChunk => "first-chunk",
            UploadStage::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("transfer failed for {bucket}/{key}: {reason}")]
    Transfer {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("channel split failed: {reason}")]
    Split { reason: String },

    #[error("upload failed at {stage}: {reason}")]
    Upload { stage: UploadStage, reason: String },

    #[error("pipeline start failed: {reason}")]
    Orchestration { reason: String },

    #[error("service call failed: {0}")]
    Service(#[from] awsio::ServiceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn transfer(
        bucket: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Transfer {
            bucket: bucket.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn split(reason: impl Into<String>) -> Self {
        Self::Split {
            reason: reason.into(),
        }
    }

    pub fn upload(stage: UploadStage, reason: impl Into<String>) -> Self {
        Self::Upload {
            stage,
            reason: reason.into(),
        }
    }

    pub fn orchestration(reason: impl Into<String>) -> Self {
        Self::Orchestration {
            reason: reason.into(),
        }
    }
}
