//! Calendar account linking, manual sync triggers and watch channels.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use rentsync_core::subscription::CalendarSubscription;
use rentsync_core::{CalendarInfo, CalendarProvider};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/accounts/link", post(link_account))
        .route("/api/google/calendars", get(list_calendars))
        .route("/api/google/sync", post(sync_now))
        .route("/api/google/watch/start", post(start_watch))
        .route("/api/google/watch/stop", post(stop_watch))
}

/// Request body for linking a calendar account (tokens come from an OAuth
/// flow completed elsewhere)
#[derive(Deserialize)]
pub struct LinkAccountRequest {
    pub user: String,
    pub email: String,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub token_expiry: Option<DateTime<Utc>>,
}

/// Linked account info returned by the API; tokens stay server-side
#[derive(Serialize)]
pub struct LinkedAccountResponse {
    pub id: u64,
    pub user: String,
    pub email: String,
    pub provider: &'static str,
}

/// POST /api/accounts/link - Link or re-link a Google calendar account
async fn link_account(
    State(state): State<AppState>,
    Json(req): Json<LinkAccountRequest>,
) -> Json<LinkedAccountResponse> {
    let account = state.orchestrator.accounts.link(
        &req.user,
        CalendarProvider::Google,
        &req.email,
        &req.access_token,
        &req.refresh_token,
        req.token_expiry,
    );
    Json(LinkedAccountResponse {
        id: account.id,
        user: account.user,
        email: account.email,
        provider: account.provider.as_str(),
    })
}

#[derive(Deserialize)]
pub struct ListCalendarsQuery {
    pub account_id: u64,
}

/// GET /api/google/calendars?account_id=1 - Calendars the linked account can
/// see, for picking a property mapping
async fn list_calendars(
    State(state): State<AppState>,
    Query(query): Query<ListCalendarsQuery>,
) -> Result<Json<Vec<CalendarInfo>>, AppError> {
    let calendars = state.orchestrator.list_calendars(query.account_id).await?;
    Ok(Json(calendars))
}

#[derive(Deserialize)]
pub struct SyncRequest {
    pub account_id: u64,
    pub calendar_id: String,
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub received: usize,
    pub created: usize,
    pub updated: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub cursor_advanced: bool,
}

/// POST /api/google/sync - Run a sync pass for one calendar now
async fn sync_now(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    let summary = state
        .orchestrator
        .run_sync_pass(req.account_id, &req.calendar_id)
        .await?;
    Ok(Json(SyncResponse {
        received: summary.received,
        created: summary.outcome.created,
        updated: summary.outcome.updated,
        cancelled: summary.outcome.cancelled,
        skipped: summary.outcome.skipped,
        cursor_advanced: summary.cursor_advanced,
    }))
}

/// POST /api/google/watch/start - Register a push channel for a calendar
async fn start_watch(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> Result<Json<CalendarSubscription>, AppError> {
    let subscription = state
        .orchestrator
        .start_watch(req.account_id, &req.calendar_id)
        .await?;
    Ok(Json(subscription))
}

#[derive(Deserialize)]
pub struct StopWatchRequest {
    pub channel_id: String,
    pub resource_id: String,
}

/// POST /api/google/watch/stop - Stop a push channel
async fn stop_watch(
    State(state): State<AppState>,
    Json(req): Json<StopWatchRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .orchestrator
        .stop_watch(&req.channel_id, &req.resource_id)
        .await?;
    Ok(Json(serde_json::json!({ "stopped": true })))
}
