//! Signing credentials and the provider seam.

use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;

use crate::error::ServiceError;

const CONTAINER_CREDENTIALS_HOST: &str = "http://169.254.170.2";

/// Key material for one SigV4 signature.
#[derive(Clone)]
pub struct SigningCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

impl SigningCredentials {
    pub fn signer<'a>(&'a self, region: &'a str, service: &'a str) -> sigv4::Signer<'a> {
        sigv4::Signer {
            access_key_id: &self.access_key_id,
            secret_access_key: &self.secret_access_key,
            session_token: self.session_token.as_deref(),
            region,
            service,
        }
    }
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Source of signing credentials. Implementations resolve fresh material on
/// every call; callers decide whether reuse is acceptable.
#[async_trait]
pub trait ProvideCredentials: Send + Sync {
    async fn credentials(&self) -> Result<SigningCredentials, ServiceError>;
}

/// Fixed credentials, for brokered sessions and tests.
#[derive(Debug, Clone)]
pub struct StaticCredentials(SigningCredentials);

impl StaticCredentials {
    pub fn new(credentials: SigningCredentials) -> Self {
        Self(credentials)
    }
}

#[async_trait]
impl ProvideCredentials for StaticCredentials {
    async fn credentials(&self) -> Result<SigningCredentials, ServiceError> {
        Ok(self.0.clone())
    }
}

/// The default chain for this deployment shape: static environment variables
/// first, then the container metadata endpoint that task-role services get.
pub struct EnvCredentials {
    client: reqwest::Client,
}

impl EnvCredentials {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn from_container_metadata(&self, relative_uri: &str) -> Result<SigningCredentials, ServiceError> {
        #[derive(Deserialize)]
        struct ContainerCredentials {
            #[serde(rename = "AccessKeyId")]
            access_key_id: String,
            #[serde(rename = "SecretAccessKey")]
            secret_access_key: String,
            #[serde(rename = "Token")]
            token: Option<String>,
        }

        let url = format!("{CONTAINER_CREDENTIALS_HOST}{relative_uri}");
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::credentials(format!(
                "container metadata endpoint returned HTTP {}",
                response.status()
            )));
        }
        let creds: ContainerCredentials = response.json().await?;
        Ok(SigningCredentials {
            access_key_id: creds.access_key_id,
            secret_access_key: creds.secret_access_key,
            session_token: creds.token,
        })
    }
}

#[async_trait]
impl ProvideCredentials for EnvCredentials {
    async fn credentials(&self) -> Result<SigningCredentials, ServiceError> {
        if let (Ok(access_key_id), Ok(secret_access_key)) = (
            std::env::var("AWS_ACCESS_KEY_ID"),
            std::env::var("AWS_SECRET_ACCESS_KEY"),
        ) && !access_key_id.is_empty()
            && !secret_access_key.is_empty()
        {
            return Ok(SigningCredentials {
                access_key_id,
                secret_access_key,
                session_token: std::env::var("AWS_SESSION_TOKEN").ok().filter(|t| !t.is_empty()),
            });
        }

        if let Ok(relative_uri) = std::env::var("AWS_CONTAINER_CREDENTIALS_RELATIVE_URI")
            && !relative_uri.is_empty()
        {
            return self.from_container_metadata(&relative_uri).await;
        }

        Err(ServiceError::credentials(
            "no credentials in environment and no container metadata endpoint configured",
        ))
    }
}
