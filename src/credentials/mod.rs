//! Client credentials for the platform's API surfaces.
//!
//! Each surface (REST, SOAP) is authenticated with its own OAuth2 client.
//! Credentials come from a TOML secrets file and/or environment variables;
//! environment values win.
//!
//! # Secrets file
//!
//! ```toml
//! [rest]
//! client_id = "..."
//! client_secret = "..."
//! subdomain = "mc563885gzs27c5t9-63k636ttgm"
//!
//! [soap]
//! client_id = "..."
//! client_secret = "..."
//! subdomain = "mc563885gzs27c5t9-63k636ttgm"
//! account_id = "12345678"    # optional business unit MID
//! ```
//!
//! # Environment
//!
//! `SFMC_{REST,SOAP}_CLIENT_ID`, `SFMC_{REST,SOAP}_CLIENT_SECRET`,
//! `SFMC_{REST,SOAP}_SUBDOMAIN`, `SFMC_{REST,SOAP}_ACCOUNT_ID`,
//! `SFMC_{REST,SOAP}_BASE_URL`.

use crate::object::ApiSurface;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::debug;

/// OAuth2 client for one API surface.
#[derive(Clone, PartialEq, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    /// Tenant-specific subdomain used to build the auth, REST and SOAP hosts.
    pub subdomain: String,
    /// Business unit (MID) to scope the token to.
    #[serde(default)]
    pub account_id: Option<String>,
    /// Serve every endpoint from this base URL instead of the tenant hosts.
    #[serde(default)]
    pub base_url: Option<String>,
}

// Never print the secret.
impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subdomain", &self.subdomain)
            .field("account_id", &self.account_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Resolved URLs for one surface.
#[derive(Clone, Debug, PartialEq)]
pub struct Endpoints {
    pub token_url: String,
    pub rest_base_url: String,
    pub soap_url: String,
}

impl ClientCredentials {
    pub fn endpoints(&self) -> Endpoints {
        match &self.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                Endpoints {
                    token_url: format!("{}/v2/token", base),
                    rest_base_url: base.to_string(),
                    soap_url: format!("{}/Service.asmx", base),
                }
            }
            None => Endpoints {
                token_url: format!(
                    "https://{}.auth.marketingcloudapis.com/v2/token",
                    self.subdomain
                ),
                rest_base_url: format!("https://{}.rest.marketingcloudapis.com", self.subdomain),
                soap_url: format!(
                    "https://{}.soap.marketingcloudapis.com/Service.asmx",
                    self.subdomain
                ),
            },
        }
    }
}

/// Credentials as read from the secrets file, before environment overrides.
#[derive(Clone, Debug, Default, Deserialize)]
struct PartialCredentials {
    client_id: Option<String>,
    client_secret: Option<String>,
    subdomain: Option<String>,
    account_id: Option<String>,
    base_url: Option<String>,
}

impl PartialCredentials {
    fn apply_env(&mut self, surface: ApiSurface) {
        let prefix = surface.env_prefix();
        let var = |name: &str| std::env::var(format!("{}_{}", prefix, name)).ok();

        if let Some(v) = var("CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = var("CLIENT_SECRET") {
            self.client_secret = Some(v);
        }
        if let Some(v) = var("SUBDOMAIN") {
            self.subdomain = Some(v);
        }
        if let Some(v) = var("ACCOUNT_ID") {
            self.account_id = Some(v);
        }
        if let Some(v) = var("BASE_URL") {
            self.base_url = Some(v);
        }
    }

    /// Complete credentials, or `None` if any required field is missing.
    fn complete(self) -> Option<ClientCredentials> {
        Some(ClientCredentials {
            client_id: self.client_id?,
            client_secret: self.client_secret?,
            subdomain: self.subdomain?,
            account_id: self.account_id,
            base_url: self.base_url,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    #[serde(default)]
    rest: PartialCredentials,
    #[serde(default)]
    soap: PartialCredentials,
}

/// Client credentials keyed by API surface.
#[derive(Clone, Debug, Default)]
pub struct CredentialStore {
    rest: Option<ClientCredentials>,
    soap: Option<ClientCredentials>,
}

impl CredentialStore {
    pub fn new(rest: Option<ClientCredentials>, soap: Option<ClientCredentials>) -> Self {
        Self { rest, soap }
    }

    /// Same client for both surfaces.
    pub fn shared(credentials: ClientCredentials) -> Self {
        Self {
            rest: Some(credentials.clone()),
            soap: Some(credentials),
        }
    }

    /// Reads `path` (if it exists) and applies environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read secrets file {}", path.display()))?;
            toml::from_str::<SecretsFile>(&contents)
                .with_context(|| format!("Failed to parse secrets file {}", path.display()))?
        } else {
            debug!(path = %path.display(), "No secrets file, reading credentials from environment");
            SecretsFile::default()
        };
        Ok(Self::resolve(file))
    }

    /// Credentials from environment variables only.
    pub fn from_env() -> Self {
        Self::resolve(SecretsFile::default())
    }

    fn resolve(file: SecretsFile) -> Self {
        let SecretsFile { mut rest, mut soap } = file;
        rest.apply_env(ApiSurface::Rest);
        soap.apply_env(ApiSurface::Soap);
        Self {
            rest: rest.complete(),
            soap: soap.complete(),
        }
    }

    pub fn get(&self, surface: ApiSurface) -> Option<&ClientCredentials> {
        match surface {
            ApiSurface::Rest => self.rest.as_ref(),
            ApiSurface::Soap => self.soap.as_ref(),
        }
    }

    /// Surfaces with complete credentials.
    pub fn configured(&self) -> Vec<ApiSurface> {
        ApiSurface::ALL
            .into_iter()
            .filter(|s| self.get(*s).is_some())
            .collect()
    }
}
