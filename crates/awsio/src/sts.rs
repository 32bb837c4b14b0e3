//! Security token service: role assumption for brokered upload sessions.

use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::credentials::{ProvideCredentials, SigningCredentials};
use crate::error::ServiceError;
use crate::http::HttpHandle;

const API_VERSION: &str = "2011-06-15";

pub struct StsClient {
    http: HttpHandle,
    credentials: Arc<dyn ProvideCredentials>,
}

#[derive(Deserialize)]
struct AssumeRoleEnvelope {
    #[serde(rename = "AssumeRoleResponse")]
    response: AssumeRoleResponse,
}

#[derive(Deserialize)]
struct AssumeRoleResponse {
    #[serde(rename = "AssumeRoleResult")]
    result: AssumeRoleResult,
}

#[derive(Deserialize)]
struct AssumeRoleResult {
    #[serde(rename = "Credentials")]
    credentials: Option<SessionCredentials>,
}

#[derive(Deserialize)]
struct SessionCredentials {
    #[serde(rename = "AccessKeyId")]
    access_key_id: String,
    #[serde(rename = "SecretAccessKey")]
    secret_access_key: String,
    #[serde(rename = "SessionToken")]
    session_token: String,
}

impl StsClient {
    pub fn new(http: HttpHandle, credentials: Arc<dyn ProvideCredentials>) -> Self {
        Self { http, credentials }
    }

    /// Exchange the caller's credentials for a temporary session under
    /// `role_arn`. Fails closed; callers decide whether to retry.
    pub async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<SigningCredentials, ServiceError> {
        let host = format!("sts.{}.amazonaws.com", self.http.region());
        let url = self.http.url_for(&host, "/")?;

        let body = format!(
            "Action=AssumeRole&Version={API_VERSION}&RoleArn={}&RoleSessionName={}",
            urlencoding::encode(role_arn),
            urlencoding::encode(session_name),
        );
        let headers = [
            (
                "content-type",
                "application/x-www-form-urlencoded; charset=utf-8".to_string(),
            ),
            // The query protocol answers in JSON when asked to.
            ("accept", "application/json".to_string()),
        ];

        let caller = self.credentials.credentials().await?;
        let response = self
            .http
            .send_signed(
                "sts",
                "AssumeRole",
                Method::POST,
                url,
                &headers,
                body.into_bytes(),
                &caller,
            )
            .await?;

        let envelope: AssumeRoleEnvelope = response.json().await?;
        let session = envelope
            .response
            .result
            .credentials
            .ok_or(ServiceError::missing_field("AssumeRole", "Credentials"))?;

        debug!(role_arn, session_name, "assumed upload role");
        Ok(SigningCredentials {
            access_key_id: session.access_key_id,
            secret_access_key: session.secret_access_key,
            session_token: Some(session.session_token),
        })
    }
}
