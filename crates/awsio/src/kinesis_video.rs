//! Ingestion-stream control plane: create, endpoint resolution, teardown.
//!
//! Only the control plane lives here. The long-lived media PUT goes through
//! the endpoint this client resolves but is driven by the caller, which owns
//! its own streaming connection.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::credentials::ProvideCredentials;
use crate::error::ServiceError;
use crate::http::HttpHandle;

pub struct KinesisVideoClient {
    http: HttpHandle,
    credentials: Arc<dyn ProvideCredentials>,
}

/// Data-plane API a resolved endpoint is scoped to.
#[derive(Debug, Clone, Copy)]
pub enum ApiName {
    PutMedia,
}

impl ApiName {
    fn as_str(&self) -> &'static str {
        match self {
            ApiName::PutMedia => "PUT_MEDIA",
        }
    }
}

#[derive(Serialize)]
struct CreateStreamRequest<'a> {
    #[serde(rename = "StreamName")]
    stream_name: &'a str,
    #[serde(rename = "DataRetentionInHours")]
    data_retention_in_hours: u32,
}

#[derive(Deserialize)]
struct CreateStreamResponse {
    #[serde(rename = "StreamARN")]
    stream_arn: Option<String>,
}

#[derive(Serialize)]
struct GetDataEndpointRequest<'a> {
    #[serde(rename = "StreamARN")]
    stream_arn: &'a str,
    #[serde(rename = "APIName")]
    api_name: &'static str,
}

#[derive(Deserialize)]
struct GetDataEndpointResponse {
    #[serde(rename = "DataEndpoint")]
    data_endpoint: Option<String>,
}

#[derive(Serialize)]
struct DeleteStreamRequest<'a> {
    #[serde(rename = "StreamARN")]
    stream_arn: &'a str,
}

impl KinesisVideoClient {
    pub fn new(http: HttpHandle, credentials: Arc<dyn ProvideCredentials>) -> Self {
        Self { http, credentials }
    }

    fn host(&self) -> String {
        format!("kinesisvideo.{}.amazonaws.com", self.http.region())
    }

    pub async fn create_stream(
        &self,
        stream_name: &str,
        retention_hours: u32,
    ) -> Result<String, ServiceError> {
        let body = serde_json::to_vec(&CreateStreamRequest {
            stream_name,
            data_retention_in_hours: retention_hours,
        })
        .map_err(|e| ServiceError::Encode {
            operation: "CreateStream",
            source: e,
        })?;

        let response = self.post("CreateStream", "/createStream", body).await?;
        let decoded: CreateStreamResponse = response.json().await?;
        let arn = decoded
            .stream_arn
            .ok_or(ServiceError::missing_field("CreateStream", "StreamARN"))?;
        debug!(stream_name, stream_arn = %arn, "created ingestion stream");
        Ok(arn)
    }

    /// Resolve the data-plane endpoint the stream's media must be PUT to.
    pub async fn data_endpoint(&self, stream_arn: &str, api: ApiName) -> Result<Url, ServiceError> {
        let body = serde_json::to_vec(&GetDataEndpointRequest {
            stream_arn,
            api_name: api.as_str(),
        })
        .map_err(|e| ServiceError::Encode {
            operation: "GetDataEndpoint",
            source: e,
        })?;

        let response = self
            .post("GetDataEndpoint", "/getDataEndpoint", body)
            .await?;
        let decoded: GetDataEndpointResponse = response.json().await?;
        let raw = decoded
            .data_endpoint
            .ok_or(ServiceError::missing_field("GetDataEndpoint", "DataEndpoint"))?;
        Url::parse(&raw).map_err(|e| ServiceError::invalid_endpoint(raw, e.to_string()))
    }

    pub async fn delete_stream(&self, stream_arn: &str) -> Result<(), ServiceError> {
        let body = serde_json::to_vec(&DeleteStreamRequest { stream_arn })
            .map_err(|e| ServiceError::Encode {
                operation: "DeleteStream",
                source: e,
            })?;

        self.post("DeleteStream", "/deleteStream", body).await?;
        debug!(stream_arn, "deleted ingestion stream");
        Ok(())
    }

    async fn post(
        &self,
        operation: &'static str,
        path: &str,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, ServiceError> {
        let url = self.http.url_for(&self.host(), path)?;
        let headers = [("content-type", "application/json".to_string())];
        let credentials = self.credentials.credentials().await?;
        self.http
            .send_signed(
                "kinesisvideo",
                operation,
                Method::POST,
                url,
                &headers,
                body,
                &credentials,
            )
            .await
    }
}
