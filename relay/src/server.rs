//! HTTP intake for relay events.
//!
//! `POST /events` takes both connection lifecycle notices and stream record
//! batches on one route; the body shape decides which. `GET /` is the
//! liveness probe.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{Span, error, info, warn};

use crate::broadcast::AnnotationRelay;
use crate::error::{Error, Result};
use crate::events::RelayEvent;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<AnnotationRelay>,
}

/// Build the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/events", post(handle_event))
        .with_state(state)
}

async fn liveness() -> &'static str {
    "OK"
}

async fn handle_event(State(state): State<AppState>, body: Bytes) -> Response {
    let event: RelayEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "rejecting unrecognized event");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "unrecognized event" })),
            )
                .into_response();
        }
    };

    match event {
        RelayEvent::Control(control) => match state.relay.handle_control(&control).await {
            Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response(),
            Err(e) => {
                error!(error = %e, connection_id = control.connection_id, "registry update failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "registry update failed" })),
                )
                    .into_response()
            }
        },
        RelayEvent::Batch(batch) => {
            // Record-level failures are logged and skipped inside the relay;
            // the batch as a whole always counts as processed.
            state.relay.handle_batch(&batch).await;
            (StatusCode::OK, Json(json!({ "status": "processed" }))).into_response()
        }
    }
}

/// Relay API server.
pub struct ApiServer {
    bind_address: String,
    port: u16,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(bind_address: impl Into<String>, port: u16, state: AppState) -> Self {
        Self {
            bind_address: bind_address.into(),
            port,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    fn build_router(&self) -> Router {
        create_router(self.state.clone()).layer(TraceLayer::new_for_http().make_span_with(
            |req: &Request| {
                // The liveness probe is polled constantly; keep it out of the logs.
                if req.uri().path() == "/" {
                    Span::none()
                } else {
                    let mut make_span =
                        tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO);
                    use tower_http::trace::MakeSpan;
                    make_span.make_span(req)
                }
            },
        ))
    }

    /// Start the server.
    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.bind_address, self.port)
            .parse()
            .map_err(|e| Error::config(format!("invalid bind address: {e}")))?;

        let router = self.build_router();
        let listener = TcpListener::bind(addr).await?;
        info!("relay listening on http://{addr}");

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("relay shutting down...");
            })
            .await?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
