//! HTTP request handlers.

use super::AppState;
use crate::db::{
    Collection, MetricsSnapshot, NodeHistoryRecord, NotifierConfig, SiteHistoryRecord, Target,
};
use crate::error::Error;
use crate::notify::Notification;
use crate::ordering::{reorder, Direction};
use crate::report::{ingest, MetricsReport};
use crate::scheduler::is_stale;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

/// Header carrying a node's access token.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Window served by the history endpoints.
const HISTORY_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Serialize)]
pub struct Success {
    pub success: bool,
}

const OK: Json<Success> = Json(Success { success: true });

// ============================================================================
// Ingestion
// ============================================================================

pub async fn handle_report(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: HeaderMap,
    Json(report): Json<MetricsReport>,
) -> Result<Json<Success>, Error> {
    let token = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    ingest(&state.store, id, token, report)?;
    Ok(OK)
}

// ============================================================================
// Sites
// ============================================================================

pub async fn handle_get_sites(State(state): State<AppState>) -> Result<Json<Vec<Target>>, Error> {
    Ok(Json(state.store.get_targets()?))
}

pub async fn handle_site_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<SiteHistoryRecord>>, Error> {
    state.store.get_target(id)?;
    let since = Utc::now() - ChronoDuration::hours(HISTORY_WINDOW_HOURS);
    Ok(Json(state.store.get_site_history(id, since)?))
}

// ============================================================================
// Servers
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub id: i64,
    pub name: String,
    pub sort_order: Option<i64>,
    pub last_report: Option<DateTime<Utc>>,
    pub online: bool,
}

pub async fn handle_get_servers(
    State(state): State<AppState>,
) -> Result<Json<Vec<ServerStatus>>, Error> {
    let now = Utc::now();
    let servers = state
        .store
        .get_node_liveness()?
        .into_iter()
        .map(|n| ServerStatus {
            online: !is_stale(n.last_report, now),
            id: n.id,
            name: n.name,
            sort_order: n.sort_order,
            last_report: n.last_report,
        })
        .collect();

    Ok(Json(servers))
}

pub async fn handle_server_metrics(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<MetricsSnapshot>, Error> {
    state.store.get_metrics(id)?.map(Json).ok_or(Error::NotFound)
}

pub async fn handle_server_history(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<NodeHistoryRecord>>, Error> {
    state.store.get_node(id)?;
    let since = Utc::now() - ChronoDuration::hours(HISTORY_WINDOW_HOURS);
    Ok(Json(state.store.get_node_history(id, since)?))
}

// ============================================================================
// Administration
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub direction: String,
}

pub async fn handle_reorder(
    State(state): State<AppState>,
    Path((collection, id)): Path<(String, i64)>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<Success>, Error> {
    let collection: Collection = collection.parse().map_err(Error::InvalidInput)?;
    let direction: Direction = req.direction.parse()?;

    reorder(&state.store, collection, id, direction)?;
    Ok(OK)
}

pub async fn handle_get_notifier(
    State(state): State<AppState>,
) -> Result<Json<NotifierConfig>, Error> {
    Ok(Json(state.store.get_notifier_config()?))
}

pub async fn handle_update_notifier(
    State(state): State<AppState>,
    Json(config): Json<NotifierConfig>,
) -> Result<Json<Success>, Error> {
    state.store.update_notifier_config(&config)?;
    tracing::info!("Notifier settings updated (enabled: {})", config.enabled);

    if config.is_active() {
        state
            .dispatcher
            .dispatch(Notification::info("✅ Telegram notifications activated."));
    }

    Ok(OK)
}
