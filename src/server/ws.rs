//! `/ws`: replays the last 50 log lines, then pushes `stats`/`log`/`share`/
//! `block`/`job` envelopes at 1 Hz (stats) or as they occur, per §6.
use {
    super::AppState,
    crate::coordinator::CoordinatorEvent,
    axum::{
        Extension,
        extract::{
            WebSocketUpgrade,
            ws::{Message, WebSocket},
        },
        response::Response,
    },
    serde::Serialize,
    serde_json::{Value, json},
    std::{
        sync::Arc,
        time::{Duration, Instant, SystemTime, UNIX_EPOCH},
    },
    tokio::sync::broadcast::error::RecvError,
};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const STATS_INTERVAL: Duration = Duration::from_secs(1);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const MAX_FRAME_SIZE: usize = 512;

pub async fn handler(ws: WebSocketUpgrade, Extension(state): Extension<Arc<AppState>>) -> Response {
    ws.max_frame_size(MAX_FRAME_SIZE)
        .max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

fn envelope(kind: &str, data: impl Serialize) -> String {
    let timestamp_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;

    serde_json::to_string(&json!({
        "type": kind,
        "data": data,
        "timestamp_ms": timestamp_ms,
    }))
    .unwrap_or_default()
}

async fn stats_envelope(state: &AppState) -> String {
    let pool = state.coordinator.pool();
    let snapshot = state.coordinator.stats().snapshot(pool.total_hash_count());
    envelope(
        "stats",
        json!({
            "hashrate": pool.total_hashrate(),
            "total_hashes": snapshot.total_hashes,
            "total_shares": snapshot.total_shares,
            "accepted_shares": snapshot.accepted_shares,
            "best_difficulty": snapshot.best_difficulty,
            "uptime_seconds": snapshot.total_mining_seconds,
        }),
    )
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    for line in state.logs.backlog() {
        if socket.send(Message::Text(envelope("log", &line).into())).await.is_err() {
            return;
        }
    }

    let mut log_rx = state.logs.subscribe();
    let mut coordinator_rx = state.coordinator.subscribe_events();
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    let mut stats_interval = tokio::time::interval(STATS_INTERVAL);
    let mut last_activity = Instant::now();

    loop {
        if last_activity.elapsed() > IDLE_TIMEOUT {
            tracing::debug!("closing idle websocket connection");
            break;
        }

        tokio::select! {
            _ = ping_interval.tick() => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
            _ = stats_interval.tick() => {
                if state.coordinator.is_running() {
                    let line = stats_envelope(&state).await;
                    if socket.send(Message::Text(line.into())).await.is_err() {
                        break;
                    }
                }
            }
            log = log_rx.recv() => {
                match log {
                    Ok(line) => {
                        if socket.send(Message::Text(envelope("log", &line).into())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
            event = coordinator_rx.recv() => {
                match event {
                    Ok(event) => {
                        if let Some(line) = coordinator_envelope(event) {
                            if socket.send(Message::Text(line.into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => last_activity = Instant::now(),
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

fn coordinator_envelope(event: CoordinatorEvent) -> Option<String> {
    let (kind, data): (&str, Value) = match event {
        CoordinatorEvent::Job(job) => ("job", json!({ "job_id": job.id, "clean_jobs": job.clean_jobs })),
        CoordinatorEvent::Share {
            worker_id,
            job_id,
            difficulty,
            accepted,
        } => (
            "share",
            json!({ "worker_id": worker_id, "job_id": job_id, "difficulty": difficulty, "accepted": accepted }),
        ),
        CoordinatorEvent::Block { job_id, difficulty } => ("block", json!({ "job_id": job_id, "difficulty": difficulty })),
    };

    Some(envelope(kind, data))
}
