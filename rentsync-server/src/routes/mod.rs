pub mod accounts;
pub mod bookings;
pub mod properties;
pub mod webhook;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use rentsync_core::SyncError;

/// Standard API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Convert anyhow errors to HTTP responses, mapping domain errors to their
/// status codes and everything else to 500.
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self.0.downcast_ref::<SyncError>() {
            Some(
                SyncError::InvalidRange { .. }
                | SyncError::InvalidTransition { .. }
                | SyncError::StayTooLong { .. },
            ) => StatusCode::UNPROCESSABLE_ENTITY,
            Some(SyncError::OverlapConflict { .. }) => StatusCode::CONFLICT,
            Some(
                SyncError::PropertyNotFound(_)
                | SyncError::BookingNotFound(_)
                | SyncError::AccountNotFound(_)
                | SyncError::SubscriptionNotFound(_),
            ) => StatusCode::NOT_FOUND,
            Some(SyncError::Forbidden) => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
