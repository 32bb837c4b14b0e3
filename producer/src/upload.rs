//! Signed live upload of one mono channel into a fresh ingestion stream.
//!
//! Each attempt is self-contained: broker a short-lived credential set,
//! create a uniquely named stream, resolve its data endpoint, open a signed
//! streaming POST and wait for the first acknowledgement chunk to confirm the
//! fragment number the analysis pipeline must resume from. The stream is
//! deleted exactly once per attempt, whether the upload ends normally or
//! fails at any stage after creation.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use awsio::credentials::{SigningCredentials, StaticCredentials};
use awsio::kinesis_video::{ApiName, KinesisVideoClient};
use awsio::sts::StsClient;
use awsio::{HttpHandle, ServiceError};

use crate::config::ProducerConfig;
use crate::error::{Error, Result, UploadStage};
use crate::split::{ChannelRole, ChannelStream};

const STREAM_RETENTION_HOURS: u32 = 1;
const TIMECODE_ABSOLUTE: &str = "ABSOLUTE";
const UPLOAD_SESSION_NAME: &str = "kvs-stream";

/// Short-lived credentials for one upload attempt. Called once per attempt,
/// never cached across attempts.
#[async_trait]
pub trait CredentialBroker: Send + Sync {
    async fn upload_credentials(&self) -> std::result::Result<SigningCredentials, ServiceError>;
}

/// Role assumption through the token service.
pub struct StsBroker {
    sts: StsClient,
    role_arn: String,
}

impl StsBroker {
    pub fn new(sts: StsClient, role_arn: impl Into<String>) -> Self {
        Self {
            sts,
            role_arn: role_arn.into(),
        }
    }
}

#[async_trait]
impl CredentialBroker for StsBroker {
    async fn upload_credentials(&self) -> std::result::Result<SigningCredentials, ServiceError> {
        self.sts.assume_role(&self.role_arn, UPLOAD_SESSION_NAME).await
    }
}

/// Ingestion-stream control plane, signed with the attempt's credentials.
#[async_trait]
pub trait StreamControl: Send + Sync {
    async fn create_stream(
        &self,
        name: &str,
        retention_hours: u32,
        credentials: &SigningCredentials,
    ) -> std::result::Result<String, ServiceError>;

    async fn put_media_endpoint(
        &self,
        stream_arn: &str,
        credentials: &SigningCredentials,
    ) -> std::result::Result<Url, ServiceError>;

    async fn delete_stream(
        &self,
        stream_arn: &str,
        credentials: &SigningCredentials,
    ) -> std::result::Result<(), ServiceError>;
}

/// Control plane backed by the video-stream service.
pub struct KvsStreamControl {
    http: HttpHandle,
}

impl KvsStreamControl {
    pub fn new(http: HttpHandle) -> Self {
        Self { http }
    }

    fn client(&self, credentials: &SigningCredentials) -> KinesisVideoClient {
        KinesisVideoClient::new(
            self.http.clone(),
            Arc::new(StaticCredentials::new(credentials.clone())),
        )
    }
}

#[async_trait]
impl StreamControl for KvsStreamControl {
    async fn create_stream(
        &self,
        name: &str,
        retention_hours: u32,
        credentials: &SigningCredentials,
    ) -> std::result::Result<String, ServiceError> {
        self.client(credentials).create_stream(name, retention_hours).await
    }

    async fn put_media_endpoint(
        &self,
        stream_arn: &str,
        credentials: &SigningCredentials,
    ) -> std::result::Result<Url, ServiceError> {
        self.client(credentials)
            .data_endpoint(stream_arn, ApiName::PutMedia)
            .await
    }

    async fn delete_stream(
        &self,
        stream_arn: &str,
        credentials: &SigningCredentials,
    ) -> std::result::Result<(), ServiceError> {
        self.client(credentials).delete_stream(stream_arn).await
    }
}

/// Result of a confirmed upload: the stream keeps receiving media in the
/// background while the caller binds it to the analysis pipeline.
#[derive(Debug, Clone)]
pub struct UploadedStream {
    pub role: ChannelRole,
    pub stream_arn: String,
    pub start_fragment: String,
}

/// Seam for one-channel upload attempts.
#[async_trait]
pub trait ChannelUploader: Send + Sync {
    async fn upload_channel(&self, channel: ChannelStream) -> Result<UploadedStream>;
}

#[async_trait]
impl ChannelUploader for StreamUploader {
    async fn upload_channel(&self, channel: ChannelStream) -> Result<UploadedStream> {
        self.upload(channel).await
    }
}

#[derive(serde::Deserialize)]
struct Acknowledgement {
    #[serde(rename = "FragmentNumber")]
    fragment_number: Option<String>,
}

pub struct StreamUploader {
    broker: Arc<dyn CredentialBroker>,
    control: Arc<dyn StreamControl>,
    media_client: reqwest::Client,
    region: String,
    stream_name_prefix: String,
    first_chunk_timeout: Duration,
    count_frequency: u64,
}

impl StreamUploader {
    pub fn new(
        broker: Arc<dyn CredentialBroker>,
        control: Arc<dyn StreamControl>,
        config: &ProducerConfig,
    ) -> Result<Self> {
        let media_client =
            build_media_client(config.upload_timeout, config.allow_invalid_upload_certs)?;
        Ok(Self {
            broker,
            control,
            media_client,
            region: config.region.clone(),
            stream_name_prefix: config.stream_name_prefix.clone(),
            first_chunk_timeout: config.upload_timeout,
            count_frequency: config.count_frequency,
        })
    }

    /// Run one upload attempt for `channel`. Returns once the first
    /// acknowledgement confirms a fragment number; the remaining media keeps
    /// flowing in a background task that deletes the stream when the
    /// acknowledgement stream terminates.
    pub async fn upload(&self, channel: ChannelStream) -> Result<UploadedStream> {
        let ChannelStream { role, bytes } = channel;

        let credentials = self
            .broker
            .upload_credentials()
            .await
            .map_err(|e| Error::upload(UploadStage::BrokerCredentials, e.to_string()))?;

        let stream_name = format!("{}-{}", self.stream_name_prefix, Uuid::new_v4());
        let stream_arn = self
            .control
            .create_stream(&stream_name, STREAM_RETENTION_HOURS, &credentials)
            .await
            .map_err(|e| Error::upload(UploadStage::CreateStream, e.to_string()))?;
        info!(%role, stream_name, stream_arn, "created ingestion stream");

        // The stream exists now. Failure past this point must delete it
        // before surfacing; success hands the delete to the drain task.
        match self.open_and_confirm(role, &stream_arn, bytes, &credentials).await {
            Ok(start_fragment) => {
                info!(%role, stream_arn, start_fragment, "upload confirmed");
                Ok(UploadedStream {
                    role,
                    stream_arn,
                    start_fragment,
                })
            }
            Err(e) => {
                self.teardown(&stream_arn, &credentials).await;
                Err(e)
            }
        }
    }

    async fn open_and_confirm(
        &self,
        role: ChannelRole,
        stream_arn: &str,
        bytes: ReceiverStream<Bytes>,
        credentials: &SigningCredentials,
    ) -> Result<String> {
        let endpoint = self
            .control
            .put_media_endpoint(stream_arn, credentials)
            .await
            .map_err(|e| Error::upload(UploadStage::ResolveEndpoint, e.to_string()))?;
        let url = endpoint.join("putMedia").map_err(|e| {
            Error::upload(UploadStage::ResolveEndpoint, format!("bad data endpoint: {e}"))
        })?;

        let host = host_of(&url)?;
        let headers = [
            ("content-type", "application/json".to_string()),
            ("x-amzn-fragment-timecode-type", TIMECODE_ABSOLUTE.to_string()),
            ("x-amzn-stream-arn", stream_arn.to_string()),
        ];
        let header_refs: Vec<(&str, &str)> =
            headers.iter().map(|(name, value)| (*name, value.as_str())).collect();
        let signable = sigv4::SignableRequest {
            method: "POST",
            host: &host,
            path: url.path(),
            query: &[],
            headers: &header_refs,
            payload: sigv4::Payload::Unsigned,
        };
        let signature = credentials
            .signer(&self.region, "kinesisvideo")
            .sign(&signable)
            .map_err(|e| Error::upload(UploadStage::Sign, e.to_string()))?;

        let mut request = self.media_client.post(url);
        for (name, value) in &headers {
            request = request.header(*name, value.as_str());
        }
        for (name, value) in &signature.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let body = reqwest::Body::wrap_stream(bytes.map(Ok::<_, Infallible>));

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| Error::upload(UploadStage::Open, e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::upload(UploadStage::Open, format!("HTTP {status}: {text}")));
        }

        let mut acks = response.bytes_stream().boxed();
        let first = tokio::time::timeout(self.first_chunk_timeout, acks.next())
            .await
            .map_err(|_| {
                Error::upload(
                    UploadStage::FirstChunk,
                    format!("no acknowledgement within {:?}", self.first_chunk_timeout),
                )
            })?;
        let first = match first {
            Some(Ok(chunk)) => chunk,
            Some(Err(e)) => return Err(Error::upload(UploadStage::FirstChunk, e.to_string())),
            None => {
                return Err(Error::upload(
                    UploadStage::FirstChunk,
                    "acknowledgement stream closed before the first chunk",
                ));
            }
        };
        let ack: Acknowledgement = serde_json::from_slice(&first).map_err(|e| {
            Error::upload(
                UploadStage::FirstChunk,
                format!("unparsable first acknowledgement: {e}"),
            )
        })?;
        let start_fragment = ack.fragment_number.ok_or_else(|| {
            Error::upload(
                UploadStage::FirstChunk,
                "first acknowledgement carries no fragment number",
            )
        })?;

        self.spawn_drain(role, stream_arn.to_string(), credentials.clone(), acks);
        Ok(start_fragment)
    }

    /// Consume acknowledgements until the stream terminates, then delete the
    /// ingestion stream. This task owns the success-path delete, which runs
    /// whether the acknowledgements ended normally or on a read error.
    fn spawn_drain(
        &self,
        role: ChannelRole,
        stream_arn: String,
        credentials: SigningCredentials,
        acks: BoxStream<'static, reqwest::Result<Bytes>>,
    ) {
        let control = Arc::clone(&self.control);
        let count_frequency = self.count_frequency;
        tokio::spawn(async move {
            if let Err(e) = drain_acks(role, &stream_arn, acks, count_frequency).await {
                warn!(%role, stream_arn, error = %e, "acknowledgement stream failed");
            }
            if let Err(e) = control.delete_stream(&stream_arn, &credentials).await {
                warn!(stream_arn, error = %e, "failed to delete ingestion stream");
            }
        });
    }

    async fn teardown(&self, stream_arn: &str, credentials: &SigningCredentials) {
        if let Err(e) = self.control.delete_stream(stream_arn, credentials).await {
            warn!(
                stream_arn,
                error = %e,
                "failed to delete ingestion stream after aborted upload"
            );
        }
    }
}

/// Sample acknowledgements until the response stream terminates. A read
/// failure mid-stream is a streaming-stage upload error; teardown stays with
/// the caller either way.
async fn drain_acks<E: std::fmt::Display>(
    role: ChannelRole,
    stream_arn: &str,
    mut acks: BoxStream<'static, std::result::Result<Bytes, E>>,
    count_frequency: u64,
) -> Result<()> {
    let mut count: u64 = 0;
    while let Some(next) = acks.next().await {
        let chunk = next.map_err(|e| Error::upload(UploadStage::Streaming, e.to_string()))?;
        if count % count_frequency == 0 {
            debug!(
                %role,
                stream_arn,
                ack = %String::from_utf8_lossy(&chunk),
                "upload acknowledgement"
            );
        }
        count += 1;
    }
    info!(%role, stream_arn, acknowledged_chunks = count, "upload ended");
    Ok(())
}

fn build_media_client(timeout: Duration, allow_invalid_certs: bool) -> Result<reqwest::Client> {
    awsio::install_rustls_provider();
    let mut builder = reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout);
    if allow_invalid_certs {
        warn!("upload TLS verification disabled by ALLOW_INVALID_UPLOAD_CERTS");
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder
        .build()
        .map_err(|e| Error::config(format!("failed to build media client: {e}")))
}

fn host_of(url: &Url) -> Result<String> {
    let host = url
        .host_str()
        .ok_or_else(|| Error::upload(UploadStage::Sign, "data endpoint has no host"))?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}
