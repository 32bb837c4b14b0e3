//! HTTP intake for processing jobs.
//!
//! `POST /processObject` accepts a `{bucketName, keyName}` pointer, spawns
//! the job and answers right away; job failures stay on the job's own log
//! and are never correlated back to the caller. `GET /` is the liveness
//! probe.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{Span, error, info};

use crate::error::{Error, Result};
use crate::job::JobRunner;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobRunner>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessObjectRequest {
    bucket_name: String,
    key_name: String,
}

/// Build the router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/processObject", post(process_object))
        .with_state(state)
}

async fn liveness() -> &'static str {
    "OK"
}

async fn process_object(State(state): State<AppState>, body: Bytes) -> Response {
    let request: ProcessObjectRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            error!(error = %e, "rejecting unparsable process request");
            return internal_error();
        }
    };

    info!(
        bucket = request.bucket_name,
        key = request.key_name,
        "accepted processing request"
    );
    let jobs = Arc::clone(&state.jobs);
    tokio::spawn(async move {
        if let Err(e) = jobs
            .process_recording(&request.bucket_name, &request.key_name)
            .await
        {
            error!(
                bucket = request.bucket_name,
                key = request.key_name,
                error = %e,
                "processing job failed"
            );
        }
    });

    (StatusCode::OK, Json(json!({ "status": "accepted" }))).into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal Server Error" })),
    )
        .into_response()
}

/// Producer API server.
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
        info!("producer listening on http://{addr}");

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("producer shutting down...");
            })
            .await?;

        Ok(())
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
    }
}
