use anyhow::{Context, Result};
use reqwest::Client;
use std::time::Duration;

pub const USER_AGENT: &str = "sfmc-pipeline/0.1";

/// Connection timeout for API and token requests (15 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Request timeout (120 seconds). Large SOAP retrieve pages can be slow.
pub const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Builds the HTTP client shared by the token manager and both fetchers.
pub fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .context("Failed to build HTTP client")
}
