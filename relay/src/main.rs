use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use awsio::apigateway::ApiGatewayManagementClient;
use awsio::dynamodb::DynamoDbClient;
use awsio::{
    EnvCredentials, HttpHandle, ProvideCredentials, control_plane_client, install_rustls_provider,
};
use callstream_relay::broadcast::AnnotationRelay;
use callstream_relay::config::RelayConfig;
use callstream_relay::push::RecipientPush;
use callstream_relay::registry::{ConnectionRegistry, DynamoRegistry};
use callstream_relay::server::{ApiServer, AppState};
use callstream_relay::store::{DynamoTranscriptStore, TranscriptStore};

const CONTROL_PLANE_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callstream_relay=debug,awsio=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = RelayConfig::from_env()?;
    install_rustls_provider();

    let client = control_plane_client(CONTROL_PLANE_TIMEOUT)?;
    let handle = HttpHandle::new(client.clone(), &config.region);
    let credentials: Arc<dyn ProvideCredentials> = Arc::new(EnvCredentials::new(client));

    let registry: Arc<dyn ConnectionRegistry> = Arc::new(DynamoRegistry::new(
        DynamoDbClient::new(handle.clone(), Arc::clone(&credentials)),
        &config.connection_table,
        config.connection_ttl,
    ));
    let store: Arc<dyn TranscriptStore> = Arc::new(DynamoTranscriptStore::new(
        DynamoDbClient::new(handle.clone(), Arc::clone(&credentials)),
        &config.transcript_table,
    ));
    let push: Arc<dyn RecipientPush> = Arc::new(ApiGatewayManagementClient::new(
        handle,
        Arc::clone(&credentials),
        config.push_endpoint.clone(),
    ));
    let relay = AnnotationRelay::new(registry, store, push);

    let server = ApiServer::new(
        &config.bind_address,
        config.port,
        AppState {
            relay: Arc::new(relay),
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
