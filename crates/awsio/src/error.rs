use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("{operation} failed with HTTP {status}: {code}: {message}")]
    Api {
        status: StatusCode,
        operation: &'static str,
        code: String,
        message: String,
    },

    #[error("request signing failed: {source}")]
    Signing {
        #[from]
        source: sigv4::SigningError,
    },

    #[error("credential resolution failed: {reason}")]
    Credentials { reason: String },

    #[error("{operation} response missing {field}")]
    MissingField {
        operation: &'static str,
        field: &'static str,
    },

    #[error("invalid endpoint `{endpoint}`: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("{operation} request encoding failed: {source}")]
    Encode {
        operation: &'static str,
        source: serde_json::Error,
    },

    #[error("connection `{connection_id}` is gone")]
    ConnectionGone { connection_id: String },
}

impl ServiceError {
    pub fn credentials(reason: impl Into<String>) -> Self {
        Self::Credentials {
            reason: reason.into(),
        }
    }

    pub fn missing_field(operation: &'static str, field: &'static str) -> Self {
        Self::MissingField { operation, field }
    }

    pub fn invalid_endpoint(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            endpoint: endpoint.into(),
            reason: reason.into(),
        }
    }
}
