//! Push-gateway delivery to registered recipients.

use reqwest::{Method, StatusCode};
use std::sync::Arc;
use url::Url;

use crate::credentials::ProvideCredentials;
use crate::error::ServiceError;
use crate::http::{HttpHandle, api_error, host_header};

pub struct ApiGatewayManagementClient {
    http: HttpHandle,
    credentials: Arc<dyn ProvideCredentials>,
    endpoint: Url,
}

impl ApiGatewayManagementClient {
    /// `endpoint` is the deployed gateway base URL, stage path included.
    pub fn new(
        http: HttpHandle,
        credentials: Arc<dyn ProvideCredentials>,
        endpoint: Url,
    ) -> Self {
        Self {
            http,
            credentials,
            endpoint,
        }
    }

    /// Push `data` to one connection. A recipient that has disconnected
    /// surfaces as [`ServiceError::ConnectionGone`] so callers can prune it.
    pub async fn post_to_connection(
        &self,
        connection_id: &str,
        data: &[u8],
    ) -> Result<(), ServiceError> {
        let path = format!(
            "{}/@connections/{}",
            self.endpoint.path().trim_end_matches('/'),
            urlencoding::encode(connection_id)
        );
        let mut url = self.endpoint.clone();
        url.set_path(&path);
        url.set_query(None);

        let host = host_header(&url)?;
        let signable = sigv4::SignableRequest {
            method: "POST",
            host: &host,
            path: url.path(),
            query: &[],
            headers: &[],
            payload: sigv4::Payload::Bytes(data),
        };
        let credentials = self.credentials.credentials().await?;
        let signature = credentials
            .signer(self.http.region(), "execute-api")
            .sign(&signable)?;

        let mut request = self
            .http
            .client()
            .request(Method::POST, url)
            .body(data.to_vec());
        for (name, value) in &signature.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::GONE {
            Err(ServiceError::ConnectionGone {
                connection_id: connection_id.to_string(),
            })
        } else {
            Err(api_error("PostToConnection", status, response).await)
        }
    }
}
