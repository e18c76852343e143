//! Property endpoints: records, calendar mapping, availability lookups and
//! iCal feed imports.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post, put},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use rentsync_core::{Booking, Property, SyncError};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/properties", get(list_properties))
        .route("/api/properties", post(create_property))
        .route("/api/properties/{id}/calendar", put(set_calendar))
        .route("/api/properties/{id}/bookings", get(list_bookings))
        .route("/api/properties/{id}/next-available", get(next_available))
        .route("/api/feeds/import", post(import_feed))
}

/// GET /api/properties - List all properties
async fn list_properties(State(state): State<AppState>) -> Json<Vec<Property>> {
    Json(state.orchestrator.properties.list())
}

#[derive(Deserialize)]
pub struct CreatePropertyRequest {
    pub name: String,
    pub calendar_id: Option<String>,
}

/// POST /api/properties - Create a property
async fn create_property(
    State(state): State<AppState>,
    Json(req): Json<CreatePropertyRequest>,
) -> Json<Property> {
    let property = state
        .orchestrator
        .properties
        .create(&req.name, req.calendar_id);
    Json(property)
}

#[derive(Deserialize)]
pub struct SetCalendarRequest {
    pub calendar_id: Option<String>,
}

/// PUT /api/properties/:id/calendar - Map (or unmap) the property's external
/// calendar
async fn set_calendar(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<SetCalendarRequest>,
) -> Result<Json<Property>, AppError> {
    let property = state
        .orchestrator
        .properties
        .set_calendar_id(id, req.calendar_id)?;
    Ok(Json(property))
}

/// GET /api/properties/:id/bookings - Bookings sorted by check-in
async fn list_bookings(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Vec<Booking>>, AppError> {
    let orchestrator = &state.orchestrator;
    orchestrator
        .properties
        .get(id)
        .ok_or(SyncError::PropertyNotFound(id))?;
    Ok(Json(orchestrator.bookings.list_for_property(id)))
}

#[derive(Deserialize)]
pub struct NextAvailableQuery {
    pub start: NaiveDate,
    pub nights: u64,
}

#[derive(Serialize)]
pub struct NextAvailableResponse {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

/// GET /api/properties/:id/next-available?start=2025-03-01&nights=3
async fn next_available(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Query(query): Query<NextAvailableQuery>,
) -> Result<Json<NextAvailableResponse>, AppError> {
    let orchestrator = &state.orchestrator;
    orchestrator
        .properties
        .get(id)
        .ok_or(SyncError::PropertyNotFound(id))?;
    let (check_in, check_out) =
        orchestrator
            .bookings
            .find_next_available(id, query.start, query.nights)?;
    Ok(Json(NextAvailableResponse {
        check_in,
        check_out,
    }))
}

#[derive(Deserialize)]
pub struct ImportFeedRequest {
    pub property_id: u64,
    pub feed_url: String,
}

#[derive(Serialize)]
pub struct ImportFeedResponse {
    pub created: usize,
    pub updated: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

/// POST /api/feeds/import - Fetch an iCal feed and reconcile it into the
/// property's bookings
async fn import_feed(
    State(state): State<AppState>,
    Json(req): Json<ImportFeedRequest>,
) -> Result<Json<ImportFeedResponse>, AppError> {
    let feed = state
        .http
        .get(&req.feed_url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    let outcome = state.orchestrator.import_feed(req.property_id, &feed)?;
    info!(
        property_id = req.property_id,
        created = outcome.created,
        updated = outcome.updated,
        cancelled = outcome.cancelled,
        skipped = outcome.skipped,
        "feed import finished"
    );
    Ok(Json(ImportFeedResponse {
        created: outcome.created,
        updated: outcome.updated,
        cancelled: outcome.cancelled,
        skipped: outcome.skipped,
    }))
}
