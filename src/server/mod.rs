//! REST/WebSocket server (C10, added): the §6 REST surface plus `/ws`, over
//! the coordinator's shared state.
mod error;
mod ws;

use {
    crate::{config::Config, coordinator::Coordinator, logging::LogBroadcastLayer, worker::Worker},
    axum::{
        Extension, Json, Router,
        extract::{Path, Query},
        routing::{delete, get, post, put},
    },
    error::{OptionExt, ServerError, ServerResult},
    serde::Deserialize,
    serde_json::{Value, json},
    std::{path::PathBuf, sync::Arc},
    stratum::ConnectionState,
    tower_http::cors::CorsLayer,
};

pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub logs: Arc<LogBroadcastLayer>,
    pub stats_dir: PathBuf,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/stats", get(stats))
        .route("/history", get(history))
        .route("/sessions", get(sessions))
        .route("/workers", get(list_workers).post(add_worker))
        .route("/workers/{id}", get(get_worker).delete(remove_worker))
        .route("/config", get(get_config).put(put_config))
        .route("/mining/start", post(start_mining))
        .route("/mining/stop", post(stop_mining))
        .route("/ws", get(ws::handler))
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
}

fn worker_json(worker: &Worker) -> Value {
    json!({
        "id": worker.id(),
        "name": worker.name(),
        "running": worker.is_running(),
        "hashrate": worker.hashrate(),
        "hashCount": worker.hash_count(),
    })
}

async fn status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let config = state.coordinator.config();
    let connection = state.coordinator.stratum_state().await;

    Json(json!({
        "running": state.coordinator.is_running(),
        "connected": connection != ConnectionState::Disconnected,
        "authorized": connection == ConnectionState::Authorized,
        "worker_count": state.coordinator.pool().count(),
        "pool_url": config.pool_url,
        "pool_port": config.pool_port,
    }))
}

async fn stats(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let pool = state.coordinator.pool();
    let snapshot = state.coordinator.stats().snapshot(pool.total_hash_count());
    let connection = state.coordinator.stratum_state().await;

    Json(json!({
        "hashrate": pool.total_hashrate(),
        "total_hashes": snapshot.total_hashes,
        "total_shares": snapshot.total_shares,
        "accepted_shares": snapshot.accepted_shares,
        "best_difficulty": snapshot.best_difficulty,
        "uptime_seconds": snapshot.total_mining_seconds,
        "workers": pool.list().iter().map(worker_json).collect::<Vec<_>>(),
        "connected": connection != ConnectionState::Disconnected,
        "authorized": connection == ConnectionState::Authorized,
    }))
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

async fn history(Extension(state): Extension<Arc<AppState>>, Query(query): Query<LimitQuery>) -> Json<Value> {
    let limit = query.limit.unwrap_or(100);
    let stats = state.coordinator.stats();
    Json(json!({
        "shares": stats.share_history(limit),
        "blocks": stats.block_history(limit),
    }))
}

async fn sessions(Extension(state): Extension<Arc<AppState>>, Query(query): Query<LimitQuery>) -> Json<Value> {
    let limit = query.limit.unwrap_or(50);
    Json(json!(state.coordinator.stats().session_history(limit)))
}

async fn list_workers(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let workers = state.coordinator.pool().list();
    Json(json!(workers.iter().map(worker_json).collect::<Vec<_>>()))
}

#[derive(Deserialize)]
struct AddWorker {
    name: Option<String>,
}

async fn add_worker(Extension(state): Extension<Arc<AppState>>, Json(body): Json<AddWorker>) -> Json<Value> {
    let id = state.coordinator.pool().add(body.name.clone());
    let name = state.coordinator.pool().get(id).map(|w| w.name()).unwrap_or_default();
    Json(json!({ "id": id, "name": name }))
}

async fn get_worker(Extension(state): Extension<Arc<AppState>>, Path(id): Path<u64>) -> ServerResult<Json<Value>> {
    let worker = state.coordinator.pool().get(id).ok_or_not_found("worker")?;
    Ok(Json(worker_json(&worker)))
}

async fn remove_worker(Extension(state): Extension<Arc<AppState>>, Path(id): Path<u64>) -> ServerResult<Json<Value>> {
    if state.coordinator.pool().remove(id) {
        Ok(Json(json!({ "status": "deleted" })))
    } else {
        Err(ServerError::NotFound(format!("worker {id} not found")))
    }
}

async fn get_config(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let config = state.coordinator.config();
    Json(json!({
        "pool_url": config.pool_url,
        "pool_port": config.pool_port,
        "wallet_address": config.wallet_address,
        "max_cpu_percent": config.max_cpu_percent,
        "num_workers": config.num_workers,
    }))
}

#[derive(Deserialize, Default)]
struct ConfigPatch {
    pool_url: Option<String>,
    pool_port: Option<u16>,
    wallet_address: Option<String>,
    max_cpu_percent: Option<u8>,
    num_workers: Option<usize>,
}

async fn put_config(
    Extension(state): Extension<Arc<AppState>>,
    Json(patch): Json<ConfigPatch>,
) -> ServerResult<Json<Value>> {
    state.coordinator.update_config(|config: &mut Config| {
        if let Some(pool_url) = patch.pool_url {
            config.pool_url = pool_url;
        }
        if let Some(pool_port) = patch.pool_port {
            config.pool_port = pool_port;
        }
        if let Some(wallet_address) = patch.wallet_address {
            config.wallet_address = wallet_address;
        }
        if let Some(max_cpu_percent) = patch.max_cpu_percent {
            config.max_cpu_percent = max_cpu_percent.clamp(1, 100);
        }
        if let Some(num_workers) = patch.num_workers {
            config.num_workers = num_workers;
        }
    });

    let config = state.coordinator.config();
    state.coordinator.pool().set_cpu_percent(config.max_cpu_percent);

    config
        .save(&state.stats_dir)
        .map_err(|error| ServerError::Internal(error.to_string()))?;

    Ok(Json(json!({ "status": "updated" })))
}

async fn start_mining(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    match state.coordinator.start_mining().await {
        Ok(()) => Json(json!({ "status": "started" })),
        Err(error) => Json(json!({ "status": "error", "error": error.to_string() })),
    }
}

async fn stop_mining(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    if let Err(error) = state.coordinator.stop_mining().await {
        tracing::warn!(%error, "error stopping mining");
    }
    Json(json!({ "status": "stopped" }))
}
