//! HTTP serving surface

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::encode::JpegEncoder;
use crate::stream::{ChunkSink, SessionCamera, SessionConfig, SinkError};

/// Landing page served at `/`
const INDEX_HTML: &str = include_str!("../../assets/index.html");

/// Shared server state
#[derive(Clone)]
pub struct AppState {
    camera: Arc<Mutex<Box<dyn SessionCamera>>>,
    encoder: JpegEncoder,
    session: SessionConfig,
}

impl AppState {
    pub fn new(camera: Box<dyn SessionCamera>, encoder: JpegEncoder, session: SessionConfig) -> Self {
        Self {
            camera: Arc::new(Mutex::new(camera)),
            encoder,
            session,
        }
    }
}

/// Builds the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/stream", get(stream_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds the listener and serves until shutdown
pub async fn run_server(config: &Config, camera: Box<dyn SessionCamera>) -> anyhow::Result<()> {
    let encoder = JpegEncoder::new(
        config.camera.width,
        config.camera.height,
        config.camera.quality,
    );
    let state = AppState::new(camera, encoder, SessionConfig::from(&config.stream));
    let app = router(state);

    let addr = format!("{}:{}", config.server.bind_ip, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(err) => {
            warn!(error = %err, "Ctrl-c handler unavailable, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}

/// Index page handler
async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Stream handler: one multipart session per client, one client at a
/// time.
///
/// The session loop is synchronous by design, so it runs on a blocking
/// thread and hands chunks over a depth-1 channel; a full channel
/// suspends the loop exactly like a blocking socket write would. The
/// camera mutex is the single-session gate: a second request while one
/// is running is refused rather than queued, because a waiting session
/// would hold its connection open against a capture slot it may never
/// get.
async fn stream_handler(State(state): State<AppState>) -> Response {
    let Ok(mut camera) = Arc::clone(&state.camera).try_lock_owned() else {
        debug!("Stream refused, session already active");
        return (StatusCode::SERVICE_UNAVAILABLE, "stream busy\n").into_response();
    };

    let (content_type_tx, content_type_rx) = oneshot::channel();
    let (chunk_tx, chunk_rx) = mpsc::channel::<Bytes>(1);

    let encoder = state.encoder.clone();
    let config = state.session.clone();

    tokio::task::spawn_blocking(move || {
        let mut sink = ChannelSink {
            content_type: Some(content_type_tx),
            chunks: chunk_tx,
        };
        let outcome = camera.stream_session(encoder, config, &mut sink);
        info!(outcome = ?outcome, "Stream session ended");
    });

    // The session announces its content type through the sink before
    // the first part; the response waits for that announcement.
    let Ok(content_type) = content_type_rx.await else {
        return (StatusCode::INTERNAL_SERVER_ERROR, "stream unavailable\n").into_response();
    };

    let chunks = ReceiverStream::new(chunk_rx).map(Ok::<Bytes, Infallible>);

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(chunks),
    )
        .into_response()
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check handler
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Bridges the synchronous session onto the async response body.
///
/// `write` blocks the session thread until the previous chunk has been
/// consumed; a dropped response body turns the next write into an
/// error, which the session reports as a client disconnect.
struct ChannelSink {
    content_type: Option<oneshot::Sender<String>>,
    chunks: mpsc::Sender<Bytes>,
}

impl ChunkSink for ChannelSink {
    fn set_content_type(&mut self, content_type: &str) -> Result<(), SinkError> {
        match self.content_type.take() {
            Some(tx) => tx
                .send(content_type.to_string())
                .map_err(|_| SinkError("response abandoned before headers".to_string())),
            None => Err(SinkError("content type already announced".to_string())),
        }
    }

    fn write(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        self.chunks
            .blocking_send(Bytes::copy_from_slice(chunk))
            .map_err(|_| SinkError("client went away".to_string()))
    }
}
