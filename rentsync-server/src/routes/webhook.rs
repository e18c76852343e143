//! Google push-notification receiver.
//!
//! The service expects a fast 2xx; the triggered sync runs before we reply
//! but its outcome never changes the response. Only a bad channel token is
//! surfaced (403), which stops Google retrying a forged delivery.

use axum::{
    Json, Router,
    extract::State,
    http::HeaderMap,
    routing::post,
};
use serde::Serialize;

use rentsync_core::webhook::PushNotification;

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/google/webhook", post(receive_notification))
}

#[derive(Serialize)]
pub struct WebhookResponse {
    pub accepted: bool,
}

/// POST /api/google/webhook - Push notification delivery
async fn receive_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WebhookResponse>, AppError> {
    let notification = PushNotification {
        channel_id: header(&headers, "x-goog-channel-id"),
        channel_token: header(&headers, "x-goog-channel-token"),
        resource_id: header(&headers, "x-goog-resource-id"),
        message_number: header(&headers, "x-goog-message-number"),
    };

    let accepted = state.orchestrator.handle_notification(&notification).await?;
    Ok(Json(WebhookResponse { accepted }))
}

fn header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
