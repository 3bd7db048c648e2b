//! OAuth2 token management.
//!
//! [`TokenManager`] holds at most one bearer token per API surface for the
//! lifetime of a single pipeline run. Callers ask for a token before every
//! request; an expired (or nearly expired) token is replaced by a fresh
//! client-credentials exchange before it is handed out, so no request is ever
//! sent with a token past its expiry.
//!
//! ```no_run
//! use sfmc_pipeline::{ApiSurface, CredentialStore, TokenManager};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let mut tokens = TokenManager::new(CredentialStore::from_env(), reqwest::Client::new());
//! let token = tokens.get_token(ApiSurface::Soap).await?;
//! println!("expires at {}", token.expires_at);
//! # Ok(())
//! # }
//! ```

mod exchange;

pub use exchange::{exchange_client_credentials, DEFAULT_TOKEN_LIFETIME_SECS};

use crate::credentials::{CredentialStore, Endpoints};
use crate::object::ApiSurface;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use tracing::info;

/// Tokens are refreshed once they are within this many seconds of expiry.
pub const REFRESH_MARGIN_SECS: i64 = 90;

/// Authentication failures. All of them are fatal to a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("no credentials configured for the {0} API")]
    MissingCredentials(ApiSurface),

    #[error("{surface} credentials rejected by token endpoint (status {status}): {body}")]
    Rejected {
        surface: ApiSurface,
        status: u16,
        body: String,
    },

    #[error("{surface} token endpoint unavailable: {reason}")]
    Unavailable { surface: ApiSurface, reason: String },
}

/// Bearer token for one API surface.
#[derive(Clone)]
pub struct Token {
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub surface: ApiSurface,
}

impl Token {
    /// True once `now` is inside the refresh margin before expiry.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(REFRESH_MARGIN_SECS) >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("surface", &self.surface)
            .finish()
    }
}

/// Per-run token holder. Owned by the caller and passed by `&mut` into each
/// fetch; there is no process-wide cache.
pub struct TokenManager {
    credentials: CredentialStore,
    http_client: reqwest::Client,
    tokens: HashMap<ApiSurface, Token>,
    exchanges: u32,
}

impl TokenManager {
    pub fn new(credentials: CredentialStore, http_client: reqwest::Client) -> Self {
        Self {
            credentials,
            http_client,
            tokens: HashMap::new(),
            exchanges: 0,
        }
    }

    /// Returns a valid token for `surface`, exchanging credentials when no
    /// token is cached or the cached one has expired.
    pub async fn get_token(&mut self, surface: ApiSurface) -> Result<Token, AuthError> {
        if let Some(token) = self.tokens.get(&surface) {
            if !token.is_expired() {
                return Ok(token.clone());
            }
            info!(surface = %surface, expires_at = %token.expires_at, "Refreshing OAuth token");
        }

        let credentials = self
            .credentials
            .get(surface)
            .ok_or(AuthError::MissingCredentials(surface))?;
        let token = exchange_client_credentials(&self.http_client, surface, credentials).await?;
        self.exchanges += 1;
        info!(surface = %surface, expires_at = %token.expires_at, "Obtained OAuth token");

        self.tokens.insert(surface, token.clone());
        Ok(token)
    }

    /// Drops the cached token so the next [`get_token`](Self::get_token)
    /// re-authenticates. Used when the API reports expiry before our clock does.
    pub fn invalidate(&mut self, surface: ApiSurface) {
        if self.tokens.remove(&surface).is_some() {
            info!(surface = %surface, "Invalidated OAuth token");
        }
    }

    /// Endpoints for `surface`, derived from its credentials.
    pub fn endpoints(&self, surface: ApiSurface) -> Result<Endpoints, AuthError> {
        self.credentials
            .get(surface)
            .map(|c| c.endpoints())
            .ok_or(AuthError::MissingCredentials(surface))
    }

    /// Number of successful credential exchanges so far in this run.
    pub fn exchange_count(&self) -> u32 {
        self.exchanges
    }
}
