//! Calendar v3 REST client.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat};
use reqwest::StatusCode;
use serde_json::json;
use tracing::debug;

use rentsync_core::{
    CalendarAccount, CalendarApi, CalendarInfo, EventsPage, ProviderError, SyncCursor, TokenSet,
    WatchRegistration,
};

use crate::auth;
use crate::convert;
use crate::types::{CalendarListResponse, EventsListResponse, WatchResponse};

pub const DEFAULT_BASE_URL: &str = "https://www.googleapis.com/calendar/v3";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Delta responses stay small; full fetches want few round trips.
const MAX_RESULTS: &str = "2500";

#[derive(Debug, Clone, serde::Deserialize)]
pub struct GoogleCredentials {
    pub client_id: String,
    pub client_secret: String,
}

pub struct GoogleCalendarApi {
    http: reqwest::Client,
    credentials: GoogleCredentials,
    base_url: String,
}

impl GoogleCalendarApi {
    pub fn new(credentials: GoogleCredentials) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(GoogleCalendarApi {
            http,
            credentials,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API host. Used against local fakes.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

impl CalendarApi for GoogleCalendarApi {
    async fn list_calendars(
        &self,
        account: &CalendarAccount,
    ) -> Result<Vec<CalendarInfo>, ProviderError> {
        let url = format!("{}/users/me/calendarList", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&account.access_token)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let body: CalendarListResponse = response.json().await.map_err(transport_error)?;

        Ok(body
            .items
            .into_iter()
            .map(|entry| CalendarInfo {
                id: entry.id,
                summary: entry.summary,
                primary: entry.primary,
            })
            .collect())
    }

    async fn list_events(
        &self,
        account: &CalendarAccount,
        calendar_id: &str,
        cursor: &SyncCursor,
        page_token: Option<&str>,
    ) -> Result<EventsPage, ProviderError> {
        let url = format!("{}/calendars/{}/events", self.base_url, calendar_id);
        let mut query: Vec<(&str, String)> = vec![
            ("singleEvents", "true".to_string()),
            ("maxResults", MAX_RESULTS.to_string()),
        ];
        match cursor {
            SyncCursor::Token(token) => query.push(("syncToken", token.clone())),
            SyncCursor::TimeMin(time_min) => query.push((
                "timeMin",
                time_min.to_rfc3339_opts(SecondsFormat::Secs, true),
            )),
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.to_string()));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(&account.access_token)
            .query(&query)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let body: EventsListResponse = response.json().await.map_err(transport_error)?;

        debug!(
            calendar_id,
            items = body.items.len(),
            more = body.next_page_token.is_some(),
            "listed events page"
        );
        Ok(EventsPage {
            events: body.items.iter().map(convert::to_external_event).collect(),
            next_page_token: body.next_page_token,
            next_sync_token: body.next_sync_token,
        })
    }

    async fn watch(
        &self,
        account: &CalendarAccount,
        calendar_id: &str,
        channel_id: &str,
        callback_url: &str,
        verification_token: &str,
    ) -> Result<WatchRegistration, ProviderError> {
        let url = format!("{}/calendars/{}/events/watch", self.base_url, calendar_id);
        let body = json!({
            "id": channel_id,
            "type": "web_hook",
            "address": callback_url,
            "token": verification_token,
        });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&account.access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let watch: WatchResponse = response.json().await.map_err(transport_error)?;

        let expiration = watch
            .expiration
            .and_then(|ms| ms.parse::<i64>().ok())
            .and_then(DateTime::from_timestamp_millis);
        Ok(WatchRegistration {
            channel_id: watch.id,
            resource_id: watch.resource_id,
            expiration,
        })
    }

    async fn stop(
        &self,
        account: &CalendarAccount,
        channel_id: &str,
        resource_id: &str,
    ) -> Result<(), ProviderError> {
        let url = format!("{}/channels/stop", self.base_url);
        let body = json!({ "id": channel_id, "resourceId": resource_id });

        let response = self
            .http
            .post(&url)
            .bearer_auth(&account.access_token)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn refresh_tokens(&self, account: &CalendarAccount) -> Result<TokenSet, ProviderError> {
        auth::refresh(&self.http, &self.credentials, account).await
    }
}

/// Pass successful responses through, classify everything else.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    match status.as_u16() {
        410 => ProviderError::ExpiredSyncToken,
        401 | 403 => ProviderError::Auth(format!("{status}: {body}")),
        code if code >= 500 => ProviderError::Transient(format!("{status}: {body}")),
        _ => ProviderError::Request(format!("{status}: {body}")),
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() {
        ProviderError::Transient(err.to_string())
    } else {
        ProviderError::Request(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gone_maps_to_expired_sync_token() {
        let err = classify_status(StatusCode::GONE, "Sync token is no longer valid");
        assert!(matches!(err, ProviderError::ExpiredSyncToken));
    }

    #[test]
    fn test_auth_failures_are_terminal() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, ""),
            ProviderError::Auth(_)
        ));
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, ""),
            ProviderError::Auth(_)
        ));
        assert!(!classify_status(StatusCode::UNAUTHORIZED, "").is_retryable());
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = classify_status(StatusCode::SERVICE_UNAVAILABLE, "backendError");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_client_errors_are_requests() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "invalid timeMin"),
            ProviderError::Request(_)
        ));
    }
}
