use crate::ObjectSource;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use sfmc_pipeline::{ApiSurface, DateWindow, ObjectDefinition, Record, RestEndpoint, TokenManager};
use tracing::{debug, info, warn};

/// Attempts per page. A 401 invalidates the REST token and retries once.
const MAX_ATTEMPTS: u32 = 2;

/// Paginated REST fetcher.
///
/// Walks `$page` (1-based) with a fixed `$pagesize` until a short page, an
/// empty page, or the reported total is reached. Every run is a full
/// extraction; the date window is ignored.
pub struct RestSource {
    http_client: Client,
}

impl RestSource {
    pub fn new(http_client: Client) -> Self {
        Self { http_client }
    }

    async fn fetch_page(
        &self,
        url: &str,
        page: u32,
        page_size: u32,
        tokens: &mut TokenManager,
    ) -> Result<Value> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let token = tokens.get_token(ApiSurface::Rest).await?;
            let response = self
                .http_client
                .get(url)
                .bearer_auth(&token.value)
                .query(&[("$page", page), ("$pagesize", page_size)])
                .send()
                .await
                .with_context(|| format!("Failed to send GET {} (page {})", url, page))?;

            if response.status() == StatusCode::UNAUTHORIZED && attempt < MAX_ATTEMPTS {
                warn!(url = %url, page, "REST token rejected, re-authenticating");
                tokens.invalidate(ApiSurface::Rest);
                continue;
            }

            check_response_status(&response)?;
            return response
                .json::<Value>()
                .await
                .with_context(|| format!("Failed to parse page {} of {}", page, url));
        }
    }
}

#[async_trait]
impl ObjectSource for RestSource {
    fn surface(&self) -> ApiSurface {
        ApiSurface::Rest
    }

    async fn fetch(
        &self,
        object: &ObjectDefinition,
        _window: Option<DateWindow>,
        tokens: &mut TokenManager,
    ) -> Result<Vec<Record>> {
        let endpoint = object
            .endpoint
            .as_ref()
            .ok_or_else(|| anyhow!("REST object {} has no endpoint", object.name))?;
        let base_url = tokens.endpoints(ApiSurface::Rest)?.rest_base_url;
        let url = endpoint_url(&base_url, endpoint);

        info!(object = %object.name, url = %url, "Fetching REST object (full load)");

        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let body = self
                .fetch_page(&url, page, endpoint.page_size, tokens)
                .await?;
            let items = select(&body, &endpoint.data_selector)
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    anyhow!(
                        "page {} of {} has no array at '{}'",
                        page,
                        object.name,
                        endpoint.data_selector
                    )
                })?;
            let total = endpoint
                .total_selector
                .as_deref()
                .and_then(|sel| select(&body, sel))
                .and_then(Value::as_u64);

            let returned = items.len();
            records.extend(items.iter().cloned().map(into_record));
            debug!(object = %object.name, page, returned, ?total, "Fetched page");

            if is_last_page(returned, page, endpoint.page_size, total) {
                break;
            }
            page += 1;
        }

        info!(object = %object.name, rows = records.len(), pages = page, "Fetched REST object");
        Ok(records)
    }
}

fn endpoint_url(base_url: &str, endpoint: &RestEndpoint) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.path.trim_start_matches('/')
    )
}

/// True when no further page should be requested.
pub fn is_last_page(returned: usize, page: u32, page_size: u32, total: Option<u64>) -> bool {
    if returned == 0 || returned < page_size as usize {
        return true;
    }
    matches!(total, Some(total) if u64::from(page) * u64::from(page_size) >= total)
}

/// Resolves a dotted path (`items`, `data.items`) in a JSON document.
fn select<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|p| !p.is_empty())
        .try_fold(value, |current, key| current.get(key))
}

/// Objects are loaded as-is; scalars are wrapped in a `value` column.
fn into_record(item: Value) -> Record {
    match item {
        Value::Object(map) => map,
        other => {
            let mut record = Record::new();
            record.insert("value".to_string(), other);
            record
        }
    }
}

/// Check the response status and map known error codes to descriptive errors.
///
/// - 401 → auth error (token expired or invalid)
/// - 429 → rate limit (not retried)
/// - Other non-2xx → generic API error
fn check_response_status(response: &reqwest::Response) -> Result<()> {
    match response.status() {
        StatusCode::UNAUTHORIZED => bail!("REST auth error: token expired or invalid"),
        StatusCode::TOO_MANY_REQUESTS => {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            bail!("REST rate limit exceeded (Retry-After: {})", retry_after)
        }
        s if !s.is_success() => bail!("REST API error: {}", s),
        _ => Ok(()),
    }
}
