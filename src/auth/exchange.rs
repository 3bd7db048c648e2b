//! OAuth2 client-credentials exchange.
//!
//! Trades a client ID/secret for a bearer token at the tenant's `/v2/token`
//! endpoint.

use super::{AuthError, Token};
use crate::credentials::ClientCredentials;
use crate::object::ApiSurface;
use chrono::{Duration, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Lifetime assumed when the token response omits `expires_in`.
/// Platform tokens are valid for roughly 20 minutes.
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 1080;

/// Client-credentials token request (JSON body)
#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    account_id: Option<&'a str>,
}

/// Token endpoint response
#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

/// Exchange client credentials for an access token
///
/// # Returns
/// * `Ok(Token)` - Bearer value and absolute expiry
/// * `Err(AuthError::Rejected)` - The endpoint refused the credentials (400/401/403)
/// * `Err(AuthError::Unavailable)` - Transport failure, other status, or bad body
pub async fn exchange_client_credentials(
    http_client: &reqwest::Client,
    surface: ApiSurface,
    credentials: &ClientCredentials,
) -> Result<Token, AuthError> {
    let token_url = credentials.endpoints().token_url;
    let request = TokenRequest {
        grant_type: "client_credentials",
        client_id: &credentials.client_id,
        client_secret: &credentials.client_secret,
        account_id: credentials.account_id.as_deref(),
    };

    tracing::debug!("Requesting {} token from {}", surface, token_url);

    let unavailable = |reason: String| AuthError::Unavailable { surface, reason };

    let response = http_client
        .post(&token_url)
        .header("Accept", "application/json")
        .json(&request)
        .send()
        .await
        .map_err(|e| unavailable(format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        return Err(match status {
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AuthError::Rejected {
                    surface,
                    status: status.as_u16(),
                    body,
                }
            }
            _ => unavailable(format!("status {}: {}", status, body)),
        });
    }

    let token_response: TokenResponse = response
        .json()
        .await
        .map_err(|e| unavailable(format!("failed to parse token response: {}", e)))?;

    tracing::debug!(
        "Token exchange successful, surface={}, expires_in={:?}, token_type={:?}, scope={:?}",
        surface,
        token_response.expires_in,
        token_response.token_type,
        token_response.scope
    );

    let lifetime = token_response
        .expires_in
        .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
    let expires_at = Duration::try_seconds(lifetime)
        .and_then(|d| Utc::now().checked_add_signed(d))
        .ok_or_else(|| unavailable(format!("expires_in out of range: {}", lifetime)))?;

    Ok(Token {
        value: token_response.access_token,
        expires_at,
        surface,
    })
}
