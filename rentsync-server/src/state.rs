//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;

use rentsync_core::SyncOrchestrator;
use rentsync_google::GoogleCalendarApi;

use crate::config::ServerConfig;

const FEED_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<SyncOrchestrator<GoogleCalendarApi>>,
    /// Outbound client for iCal feed fetches.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let api = GoogleCalendarApi::new(config.google.clone())?;
        let orchestrator = Arc::new(SyncOrchestrator::new(
            api,
            &config.webhook.verification_token,
            &config.webhook.callback_url,
        ));
        let http = reqwest::Client::builder()
            .timeout(FEED_FETCH_TIMEOUT)
            .build()?;
        Ok(AppState { orchestrator, http })
    }
}
