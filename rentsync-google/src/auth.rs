//! OAuth token refresh.

use chrono::{Duration, Utc};
use tracing::debug;

use rentsync_core::{CalendarAccount, ProviderError, TokenSet};

use crate::api::GoogleCredentials;
use crate::types::TokenResponse;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Exchange the stored refresh token for a fresh access token.
pub async fn refresh(
    http: &reqwest::Client,
    credentials: &GoogleCredentials,
    account: &CalendarAccount,
) -> Result<TokenSet, ProviderError> {
    debug!(account = %account.email, "refreshing access token");

    let params = [
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("refresh_token", account.refresh_token.as_str()),
        ("grant_type", "refresh_token"),
    ];
    let response = http
        .post(TOKEN_URL)
        .form(&params)
        .send()
        .await
        .map_err(|e| ProviderError::Transient(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        // A revoked or expired refresh token needs the owner to re-link
        return Err(ProviderError::Auth(format!("{status}: {body}")));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| ProviderError::Request(e.to_string()))?;

    // A new refresh token is usually not returned on refresh
    Ok(TokenSet {
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        expires_at: token
            .expires_in
            .map(|seconds| Utc::now() + Duration::seconds(seconds)),
    })
}
