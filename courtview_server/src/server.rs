//! Broadcast server: pipeline task plus the HTTP/websocket front.
//!
//! ```text
//!  ReplayDetector ──► PipelineOrchestrator ──► BroadcastHub
//!                            │ watch                 │
//!                            ▼                       ▼
//!                     GET /  (status)        GET /ws (one pump per viewer)
//! ```

use crate::cli::ServeArgs;
use crate::ws_sink::WsSink;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use courtview_core::{
    BroadcastHub, CalibrationStore, CoordinateTransformer, FrameHistoryBuffer, HubConfig, IdentityColorCache,
    PipelineConfig, PipelineOrchestrator, PipelineState, PipelineStatus, ReplayDetector,
};
use courtview_env::{CourtViewContext, TokioContext};
use futures_util::StreamExt;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// RNG stream for track colors.
const COLOR_STREAM: u64 = 1;

/// Shared handles for request handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub pipeline: watch::Receiver<PipelineStatus>,
}

/// Body of `GET /`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub subscribers: usize,
    pub buffered: usize,
    pub capacity: usize,
    pub pipeline: PipelineState,
    pub frames_emitted: u64,
    pub frames_skipped: u64,
    pub frames_serialized: u64,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

pub async fn status(State(state): State<AppState>) -> Json<StatusReport> {
    let pipeline = state.pipeline.borrow().clone();
    let history = state.hub.history();
    let stats = state.hub.stats();

    Json(StatusReport {
        status: "ok",
        subscribers: stats.subscribers,
        buffered: history.len(),
        capacity: history.capacity(),
        pipeline: pipeline.state,
        frames_emitted: pipeline.frames_emitted,
        frames_skipped: pipeline.frames_skipped,
        frames_serialized: stats.frames_serialized,
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, peer, state))
}

/// Replays the backlog, streams live frames, and unsubscribes on close.
async fn handle_socket(socket: WebSocket, peer: SocketAddr, state: AppState) {
    let (tx, mut rx) = socket.split();
    let pump = state.hub.on_subscribe(WsSink::new(peer, tx));
    let id = pump.id();
    let mut writer = tokio::spawn(pump.run());

    // Inbound messages carry no meaning; they only tell us the peer is alive
    let reader = async {
        while let Some(message) = rx.next().await {
            match message {
                Ok(Message::Close(_)) => break,
                Ok(other) => trace!(subscriber = %id, ?other, "Ignoring inbound message"),
                Err(e) => {
                    debug!(subscriber = %id, error = %e, "Websocket read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        result = &mut writer => {
            if let Ok(Err(e)) = result {
                debug!(subscriber = %id, error = %e, "Writer stopped");
            }
        }
        _ = reader => {
            state.hub.on_unsubscribe(id);
            let _ = writer.await;
        }
    }
}

/// Loads the stored calibration for `source`, or stays uncalibrated.
fn load_transformer(store: &CalibrationStore, source: &str) -> CoordinateTransformer {
    let mut transformer = CoordinateTransformer::new();
    if !store.exists(source) {
        warn!(
            path = %store.path_for(source).display(),
            "No calibration found, court positions will be empty (run `courtview calibrate`)"
        );
        return transformer;
    }
    if let Err(e) = store.load_into(source, &mut transformer) {
        warn!(error = %e, "Calibration rejected, court positions will be empty");
    }
    transformer
}

pub async fn serve(args: ServeArgs) -> Result<()> {
    let context = TokioContext::shared();

    let store = CalibrationStore::new(&args.calibration_dir);
    let transformer = Arc::new(load_transformer(&store, &args.source));

    let history = Arc::new(FrameHistoryBuffer::new(args.buffer_size));
    let hub = BroadcastHub::shared(
        history,
        HubConfig {
            subscriber_queue_depth: args.queue_depth,
        },
    );
    let colors = Arc::new(IdentityColorCache::new(context.derive_rng(COLOR_STREAM)));

    let detector = ReplayDetector::open(&args.detections)
        .await
        .with_context(|| format!("opening detections {}", args.detections.display()))?;

    let frame_interval = frame_interval(args.fps)?;
    let pipeline = PipelineOrchestrator::new(
        Arc::clone(&context),
        detector,
        Arc::clone(&transformer),
        colors,
        Arc::clone(&hub),
        PipelineConfig {
            name: args.source.clone(),
            frame_interval,
            allow_extrapolation: !args.no_extrapolation,
            ..PipelineConfig::default()
        },
    );
    let state = AppState {
        hub,
        pipeline: pipeline.watch_status(),
    };

    context.spawn("pipeline", async move {
        pipeline.run().await;
    });

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        %addr,
        source = %args.source,
        calibrated = transformer.is_ready(),
        buffer = args.buffer_size,
        "Serving status on / and frames on /ws"
    );

    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    info!("Server stopped");
    Ok(())
}

/// Pause between frames for `--fps`, or the default pacing without it.
fn frame_interval(fps: Option<f64>) -> Result<Duration> {
    match fps {
        Some(fps) => Duration::try_from_secs_f64(1.0 / fps).with_context(|| format!("invalid --fps {fps}")),
        None => Ok(PipelineConfig::default().frame_interval),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}
