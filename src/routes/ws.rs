// WebSocket streaming session: one pipeline per connected subscriber

use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::Mutex;
use tokio::time::{Duration, timeout};
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::config::AppConfig;
use crate::models::{HostInfo, Snapshot};
use crate::pipeline::{Pipeline, SinkError, SnapshotSink, StreamParams};
use crate::probe;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Decrements the active session count on drop (connect = +1, drop = -1).
struct SessionGuard(Arc<AtomicUsize>);

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
    }
}

/// Write half of a subscriber's socket. Cloned between the combiner and the keep-alive task.
#[derive(Clone)]
pub struct WebSocketSink {
    tx: Arc<Mutex<SplitSink<WebSocket, Message>>>,
}

impl WebSocketSink {
    pub fn new(tx: SplitSink<WebSocket, Message>) -> Self {
        Self {
            tx: Arc::new(Mutex::new(tx)),
        }
    }

    async fn send_message(&self, message: Message) -> Result<(), SinkError> {
        let mut tx = self.tx.lock().await;
        match timeout(WS_SEND_TIMEOUT, tx.send(message)).await {
            Err(_) => Err(SinkError::Timeout(WS_SEND_TIMEOUT)),
            Ok(Err(e)) => Err(SinkError::Transport(e.to_string())),
            Ok(Ok(())) => Ok(()),
        }
    }

    pub async fn send_json<T: Serialize + Sync>(&self, value: &T) -> Result<(), SinkError> {
        let json = serde_json::to_string(value)?;
        self.send_message(Message::Text(json.into())).await
    }
}

impl SnapshotSink for WebSocketSink {
    async fn send(&mut self, snapshot: Snapshot) -> Result<(), SinkError> {
        self.send_json(&snapshot).await
    }
}

/// Query parameters arrive as strings; anything unparsable counts as 0 and so takes the default.
fn query_secs(query: &HashMap<String, String>, name: &str) -> i64 {
    query
        .get(name)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .unwrap_or(0)
}

pub(super) async fn ws_stats(
    ws: WebSocketUpgrade,
    Query(query): Query<HashMap<String, String>>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let params = StreamParams::new(query_secs(&query, "interval"), query_secs(&query, "duration"));
    let config = state.config.borrow().clone();
    let host_info = state.host_info.clone();
    let active_sessions = state.active_sessions.clone();
    ws.on_upgrade(move |socket| async move {
        if let Err(e) = stream_stats(socket, params, config, host_info, active_sessions).await {
            tracing::info!("Stats stream error: {}", e);
        }
    })
}

async fn stream_stats(
    socket: WebSocket,
    params: StreamParams,
    config: Arc<AppConfig>,
    host_info: Arc<HostInfo>,
    active_sessions: Arc<AtomicUsize>,
) -> anyhow::Result<()> {
    active_sessions.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let _guard = SessionGuard(active_sessions);
    let metrics = config.metrics.clone();
    tracing::info!(
        interval_secs = params.interval.as_secs(),
        duration_secs = params.duration.as_secs(),
        max_history = params.max_history,
        metrics = ?metrics,
        "Client connected to stats stream"
    );

    let (tx, rx) = socket.split();
    let mut sink = WebSocketSink::new(tx);
    let welcome = serde_json::json!({
        "type": "info",
        "hostInfo": host_info.as_ref(),
        "interval": params.interval.as_secs(),
        "duration": params.duration.as_secs(),
    });
    sink.send_json(&welcome).await?;

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(watch_subscriber(rx, cancel.clone()));
    let pinger = tokio::spawn(keep_alive(sink.clone(), cancel.clone()));

    let mut pipeline = Pipeline::new(params, cancel.clone());
    probe::spawn_enabled(&mut pipeline, &metrics);
    let result = pipeline.run(&mut sink).await;

    cancel.cancel();
    let _ = watcher.await;
    let _ = pinger.await;

    let sent = result?;
    tracing::info!(snapshots_sent = sent, "Client disconnected from stats stream");
    Ok(())
}

/// Cancels the session when the subscriber closes, errors, or goes away.
async fn watch_subscriber(mut rx: SplitStream<WebSocket>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            message = rx.next() => match message {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "stats stream read failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
    cancel.cancel();
}

async fn keep_alive(sink: WebSocketSink, cancel: CancellationToken) {
    let mut ping_interval = tokio::time::interval(WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping_interval.tick().await;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ping_interval.tick() => {
                if let Err(e) = sink.send_message(Message::Ping(Bytes::new())).await {
                    tracing::debug!(error = %e, "keep-alive ping failed");
                    cancel.cancel();
                    return;
                }
            }
        }
    }
}
