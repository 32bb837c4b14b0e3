//! Ranged object reads from the recording bucket.

use bytes::Bytes;
use reqwest::Method;
use std::sync::Arc;

use crate::credentials::ProvideCredentials;
use crate::error::ServiceError;
use crate::http::HttpHandle;

pub struct S3Client {
    http: HttpHandle,
    credentials: Arc<dyn ProvideCredentials>,
}

/// One ranged response: the body bytes plus the raw `Content-Range` header.
/// The header is returned unparsed so callers own the failure mode when a
/// store answers with something malformed.
#[derive(Debug)]
pub struct RangedChunk {
    pub body: Bytes,
    pub content_range: String,
}

impl S3Client {
    pub fn new(http: HttpHandle, credentials: Arc<dyn ProvideCredentials>) -> Self {
        Self { http, credentials }
    }

    /// Fetch `bytes=start-end` of an object. The store may answer with fewer
    /// bytes when the range overshoots the object's length.
    pub async fn get_object_range(
        &self,
        bucket: &str,
        key: &str,
        start: u64,
        end: u64,
    ) -> Result<RangedChunk, ServiceError> {
        let encoded_key = encode_key(key);
        // Virtual-hosted addressing against the real store, path-style under
        // an endpoint override.
        let url = if self.http.has_endpoint_override() {
            self.http
                .url_for("", &format!("/{bucket}/{encoded_key}"))?
        } else {
            let host = format!("{bucket}.s3.{}.amazonaws.com", self.http.region());
            self.http.url_for(&host, &format!("/{encoded_key}"))?
        };

        let headers = [
            ("range", format!("bytes={start}-{end}")),
            (
                "x-amz-content-sha256",
                sigv4::EMPTY_PAYLOAD_HASH.to_string(),
            ),
        ];

        let credentials = self.credentials.credentials().await?;
        let response = self
            .http
            .send_signed(
                "s3",
                "GetObject",
                Method::GET,
                url,
                &headers,
                Vec::new(),
                &credentials,
            )
            .await?;

        let content_range = response
            .headers()
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or(ServiceError::missing_field("GetObject", "Content-Range"))?;
        let body = response.bytes().await?;

        Ok(RangedChunk {
            body,
            content_range,
        })
    }
}

/// Percent-encode a key for the request path, preserving `/` so the object
/// hierarchy stays visible in the path.
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
