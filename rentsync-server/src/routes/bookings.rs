//! Booking endpoints. Every write goes through the store's validated paths,
//! so the per-property no-overlap invariant holds regardless of caller.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{patch, post},
};
use chrono::NaiveDate;
use serde::Deserialize;

use rentsync_core::store::{BookingUpdate, NewBooking};
use rentsync_core::{Booking, BookingAction, BookingSource, BookingStatus, SyncError};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/bookings", post(create_booking))
        .route("/api/bookings/{id}", patch(update_booking))
        .route("/api/bookings/{id}/cancel", post(cancel_booking))
        .route("/api/bookings/{id}/actions/{action}", post(apply_action))
}

/// Request body for creating a booking
#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub property_id: u64,
    pub customer_email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default = "default_guests")]
    pub guests: u32,
}

fn default_guests() -> u32 {
    1
}

/// POST /api/bookings - Create a draft booking
async fn create_booking(
    State(state): State<AppState>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    let orchestrator = &state.orchestrator;
    orchestrator
        .properties
        .get(req.property_id)
        .ok_or(SyncError::PropertyNotFound(req.property_id))?;

    let customer =
        orchestrator
            .customers
            .get_or_create(&req.customer_email, &req.first_name, &req.last_name);

    let booking = orchestrator.bookings.create(NewBooking {
        property_id: req.property_id,
        customer_id: customer.id,
        check_in: req.check_in,
        check_out: req.check_out,
        guests: req.guests,
        status: BookingStatus::Draft,
        source: BookingSource::Crm,
    })?;

    Ok(Json(booking))
}

/// Request body for rescheduling a booking; omitted fields keep their value
#[derive(Deserialize)]
pub struct UpdateBookingRequest {
    pub property_id: Option<u64>,
    pub check_in: Option<NaiveDate>,
    pub check_out: Option<NaiveDate>,
}

/// PATCH /api/bookings/:id - Reschedule or move a booking
async fn update_booking(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(req): Json<UpdateBookingRequest>,
) -> Result<Json<Booking>, AppError> {
    let bookings = &state.orchestrator.bookings;
    let existing = bookings.get(id).ok_or(SyncError::BookingNotFound(id))?;

    let updated = bookings.update(
        id,
        BookingUpdate {
            property_id: req.property_id.unwrap_or(existing.property_id),
            customer_id: existing.customer_id,
            check_in: req.check_in.unwrap_or(existing.check_in),
            check_out: req.check_out.unwrap_or(existing.check_out),
            source: existing.source,
        },
    )?;
    Ok(Json(updated))
}

/// POST /api/bookings/:id/cancel - Cancel a booking
async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<Booking>, AppError> {
    let booking = state
        .orchestrator
        .bookings
        .apply_action(id, BookingAction::Cancel)?;
    Ok(Json(booking))
}

/// POST /api/bookings/:id/actions/:action - Move a booking through its
/// lifecycle (confirm, cancel, check_in, check_out)
async fn apply_action(
    State(state): State<AppState>,
    Path((id, action)): Path<(u64, BookingAction)>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.orchestrator.bookings.apply_action(id, action)?;
    Ok(Json(booking))
}
