use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use awsio::media_pipelines::MediaPipelinesClient;
use awsio::s3::S3Client;
use awsio::sts::StsClient;
use awsio::{
    EnvCredentials, HttpHandle, ProvideCredentials, control_plane_client, install_rustls_provider,
};
use callstream_producer::config::ProducerConfig;
use callstream_producer::fetch::ChunkedFetcher;
use callstream_producer::job::JobRunner;
use callstream_producer::orchestrate::{PipelineOrchestrator, PipelineStarter};
use callstream_producer::server::{ApiServer, AppState};
use callstream_producer::split::FfmpegSplitter;
use callstream_producer::upload::{
    ChannelUploader, CredentialBroker, KvsStreamControl, StreamControl, StreamUploader, StsBroker,
};

const CONTROL_PLANE_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callstream_producer=debug,awsio=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = ProducerConfig::from_env()?;
    install_rustls_provider();

    let client = control_plane_client(CONTROL_PLANE_TIMEOUT)?;
    let handle = HttpHandle::new(client.clone(), &config.region);
    let credentials: Arc<dyn ProvideCredentials> = Arc::new(EnvCredentials::new(client));

    let splitter = FfmpegSplitter::new();
    match splitter.version() {
        Some(version) => tracing::info!(version, "transcoder available"),
        None => tracing::warn!("transcoder binary not found; jobs will fail at the split stage"),
    }

    let store = Arc::new(S3Client::new(handle.clone(), Arc::clone(&credentials)));
    let sts = StsClient::new(handle.clone(), Arc::clone(&credentials));
    let broker: Arc<dyn CredentialBroker> = Arc::new(StsBroker::new(sts, &config.upload_role_arn));
    let control: Arc<dyn StreamControl> = Arc::new(KvsStreamControl::new(handle.clone()));
    let uploader: Arc<dyn ChannelUploader> =
        Arc::new(StreamUploader::new(broker, control, &config)?);
    let pipelines = Arc::new(MediaPipelinesClient::new(handle, Arc::clone(&credentials)));
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        pipelines as Arc<dyn PipelineStarter>,
        &config.pipeline_configuration_arn,
    ));

    let jobs = JobRunner::new(
        store,
        ChunkedFetcher::new(),
        Arc::new(splitter),
        uploader,
        orchestrator,
    );

    let server = ApiServer::new(
        &config.bind_address,
        config.port,
        AppState {
            jobs: Arc::new(jobs),
        },
    );
    let cancel_token = server.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            cancel_token.cancel();
        }
    });

    server.run().await?;
    Ok(())
}
