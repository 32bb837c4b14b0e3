//! Shared HTTP plumbing for the service clients.

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::credentials::SigningCredentials;
use crate::error::ServiceError;

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Build the shared control-plane client.
pub fn control_plane_client(timeout: Duration) -> Result<reqwest::Client, ServiceError> {
    install_rustls_provider();
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(ServiceError::from)
}

/// Region, client and optional endpoint override shared by every service
/// client. With an override set, all requests go to that base URL (path-style
/// for object storage); used to point the clients at local fakes.
#[derive(Debug, Clone)]
pub struct HttpHandle {
    client: reqwest::Client,
    region: String,
    endpoint_override: Option<Url>,
}

impl HttpHandle {
    pub fn new(client: reqwest::Client, region: impl Into<String>) -> Self {
        Self {
            client,
            region: region.into(),
            endpoint_override: None,
        }
    }

    pub fn with_endpoint_override(mut self, endpoint: Url) -> Self {
        self.endpoint_override = Some(endpoint);
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn has_endpoint_override(&self) -> bool {
        self.endpoint_override.is_some()
    }

    /// Resolve `path` against the service's default host, or against the
    /// override when one is configured.
    pub fn url_for(&self, default_host: &str, path: &str) -> Result<Url, ServiceError> {
        match &self.endpoint_override {
            Some(base) => base
                .join(path.trim_start_matches('/'))
                .map_err(|e| ServiceError::invalid_endpoint(base.as_str(), e.to_string())),
            None => {
                let raw = format!("https://{default_host}{path}");
                Url::parse(&raw).map_err(|e| ServiceError::invalid_endpoint(raw, e.to_string()))
            }
        }
    }

    /// Sign `body` against `url` and send it, mapping non-2xx responses to
    /// [`ServiceError::Api`].
    pub(crate) async fn send_signed(
        &self,
        service: &'static str,
        operation: &'static str,
        method: Method,
        url: Url,
        headers: &[(&str, String)],
        body: Vec<u8>,
        credentials: &SigningCredentials,
    ) -> Result<reqwest::Response, ServiceError> {
        let host = host_header(&url)?;
        let header_refs: Vec<(&str, &str)> = headers
            .iter()
            .map(|(name, value)| (*name, value.as_str()))
            .collect();
        let signable = sigv4::SignableRequest {
            method: method.as_str(),
            host: &host,
            path: url.path(),
            query: &[],
            headers: &header_refs,
            payload: sigv4::Payload::Bytes(&body),
        };
        let signature = credentials.signer(&self.region, service).sign(&signable)?;

        let mut request = self.client.request(method, url);
        for (name, value) in headers {
            request = request.header(*name, value.as_str());
        }
        for (name, value) in &signature.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.body(body).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            Err(api_error(operation, status, response).await)
        }
    }
}

/// Host header value for signing, including any non-default port.
pub(crate) fn host_header(url: &Url) -> Result<String, ServiceError> {
    let host = url
        .host_str()
        .ok_or_else(|| ServiceError::invalid_endpoint(url.as_str(), "missing host"))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// Decode an AWS error body. Services answer in one of two JSON shapes
/// (`__type` for the JSON protocols, a nested `Error` object for the query
/// protocol) plus the `x-amzn-errortype` header.
pub(crate) async fn api_error(
    operation: &'static str,
    status: StatusCode,
    response: reqwest::Response,
) -> ServiceError {
    #[derive(Deserialize)]
    struct QueryError {
        #[serde(rename = "Code")]
        code: Option<String>,
        #[serde(rename = "Message")]
        message: Option<String>,
    }

    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(rename = "__type")]
        kind: Option<String>,
        #[serde(alias = "Message")]
        message: Option<String>,
        #[serde(rename = "Error")]
        error: Option<QueryError>,
    }

    let header_type = response
        .headers()
        .get("x-amzn-errortype")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(':').next().unwrap_or(v).to_string());

    let text = response.text().await.unwrap_or_default();
    let parsed: Option<ErrorBody> = serde_json::from_str(&text).ok();

    let (code, message) = match parsed {
        Some(body) => {
            let code = body
                .kind
                .map(|k| k.rsplit('#').next().unwrap_or(&k).to_string())
                .or(body.error.as_ref().and_then(|e| e.code.clone()))
                .or(header_type);
            let message = body
                .message
                .or(body.error.and_then(|e| e.message));
            (code, message)
        }
        None => (header_type, (!text.is_empty()).then(|| text.clone())),
    };

    ServiceError::Api {
        status,
        operation,
        code: code.unwrap_or_else(|| "Unknown".to_string()),
        message: message.unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_header_includes_non_default_port() {
        let url = Url::parse("http://127.0.0.1:4650/createStream").unwrap();
        assert_eq!(host_header(&url).unwrap(), "127.0.0.1:4650");
        let url = Url::parse("https://kinesisvideo.us-east-1.amazonaws.com/").unwrap();
        assert_eq!(
            host_header(&url).unwrap(),
            "kinesisvideo.us-east-1.amazonaws.com"
        );
    }

    #[test]
    fn url_for_prefers_override() {
        install_rustls_provider();
        let handle = HttpHandle::new(reqwest::Client::new(), "us-east-1")
            .with_endpoint_override(Url::parse("http://127.0.0.1:9100/").unwrap());
        let url = handle
            .url_for("dynamodb.us-east-1.amazonaws.com", "/")
            .unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9100/");

        let handle = HttpHandle::new(reqwest::Client::new(), "us-east-1");
        let url = handle
            .url_for("dynamodb.us-east-1.amazonaws.com", "/")
            .unwrap();
        assert_eq!(url.as_str(), "https://dynamodb.us-east-1.amazonaws.com/");
    }
}
