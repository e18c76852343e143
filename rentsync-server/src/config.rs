//! Server configuration.
//!
//! Loaded from `rentsync.toml` in the working directory, with `RENTSYNC_*`
//! environment variables taking precedence (e.g. `RENTSYNC_BIND`,
//! `RENTSYNC_WEBHOOK__VERIFICATION_TOKEN`).

use anyhow::{Context, Result};
use ::config::{Config, Environment, File};
use serde::Deserialize;

use rentsync_google::GoogleCredentials;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    pub google: GoogleCredentials,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Public HTTPS URL the calendar service delivers notifications to.
    pub callback_url: String,
    /// Shared secret echoed back in every notification's channel token.
    pub verification_token: String,
}

fn default_bind() -> String {
    "127.0.0.1:4080".to_string()
}

pub fn load() -> Result<ServerConfig> {
    Config::builder()
        .add_source(File::with_name("rentsync").required(false))
        .add_source(Environment::with_prefix("RENTSYNC").separator("__"))
        .build()
        .context("Failed to read configuration")?
        .try_deserialize()
        .context("Invalid configuration")
}
