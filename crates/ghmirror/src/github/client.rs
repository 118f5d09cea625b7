//! Rate-aware GitHub REST client.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde_json::Value;
use url::Url;

use super::error::{GitHubError, Result};
use super::pagination::{PAGE_SIZE, page_entities, paginate, response_links};
use super::types::GitHubRateLimitResponse;
use crate::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use crate::model::{Entity, RepoId};
use crate::rate_limit::RateLimiter;
use crate::retry::{RetryConfig, with_retry};

/// Public GitHub API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const ACCEPT: &str = "application/vnd.github+json";
const USER_AGENT: &str = concat!("ghmirror/", env!("CARGO_PKG_VERSION"));

/// Extract the ETag from a response, handling both strong and weak tags.
pub fn extract_etag(response: &HttpResponse) -> Option<String> {
    response.header("etag").map(String::from)
}

/// Append query parameters to `address`.
///
/// The address is returned untouched when there are no parameters, so links
/// taken from a `Link` header are requested exactly as advertised.
pub fn build_url(address: &str, params: &[(&str, &str)]) -> Result<String> {
    if params.is_empty() {
        return Ok(address.to_string());
    }
    let mut url =
        Url::parse(address).map_err(|e| GitHubError::InvalidUrl(format!("{address}: {e}")))?;
    url.query_pairs_mut().extend_pairs(params);
    Ok(url.into())
}

/// Quota headers reported by a response.
fn parse_rate_limit_headers(response: &HttpResponse) -> Option<(u64, DateTime<Utc>)> {
    let remaining = response
        .header("x-ratelimit-remaining")
        .and_then(|v| v.trim().parse::<u64>().ok())?;
    let reset_epoch = response
        .header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())?;
    let reset_at = DateTime::from_timestamp(reset_epoch, 0).unwrap_or_else(Utc::now);
    Some((remaining, reset_at))
}

fn is_search_url(url: &str) -> bool {
    url.contains("/search/")
}

/// Authenticated client for the GitHub REST API.
///
/// Every request passes through the shared [`RateLimiter`]: it is paced
/// before sending and the quota headers are reported after the response
/// arrives. Fetch operations never fail loudly. A request that cannot be
/// completed yields `None` (or ends a stream) and is logged, so the caller
/// can skip the entity this round and pick it up on the next sync.
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    token: String,
    api_url: String,
    limiter: RateLimiter,
    retry: RetryConfig,
}

impl GitHubClient {
    /// Create a client without validating the token.
    ///
    /// Use [`GitHubClient::authenticate`] before handing the client to a sync.
    pub fn new(token: impl Into<String>, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            token: token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            limiter: RateLimiter::new(),
            retry: RetryConfig::default(),
        }
    }

    /// Point the client at a different API root (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into().trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the token, failing fast if GitHub rejects it.
    pub async fn authenticate(self) -> Result<Self> {
        self.rate_limits().await?;
        tracing::debug!(api_url = %self.api_url, "GitHub credentials accepted");
        Ok(self)
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// API address of `path` below a repository (`""` for the repository itself).
    pub fn repo_url(&self, repo: &RepoId, path: &str) -> String {
        let base = repo.api_url(&self.api_url);
        if path.is_empty() {
            base
        } else {
            format!("{base}/{path}")
        }
    }

    /// Probe `GET /rate_limit` with the configured token.
    ///
    /// Returns true on HTTP 200, after seeding the rate limiter from the body.
    pub async fn check_credentials(&self) -> bool {
        match self.rate_limits().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Credential check failed");
                false
            }
        }
    }

    /// Current quota for every resource, as reported by `GET /rate_limit`.
    pub async fn rate_limits(&self) -> Result<GitHubRateLimitResponse> {
        let url = format!("{}/rate_limit", self.api_url);
        let response = self.transport.send(self.build_request(&url, None)).await?;

        match response.status {
            200 => {
                let limits: GitHubRateLimitResponse = serde_json::from_slice(&response.body)?;
                let core = &limits.resources.core;
                self.limiter
                    .observe(core.remaining, core.reset_at(), false)
                    .await;
                Ok(limits)
            }
            401 | 403 => Err(GitHubError::AuthRequired {
                status: response.status,
            }),
            status => Err(GitHubError::UnexpectedStatus { status, url }),
        }
    }

    fn build_request(&self, url: &str, extra_header: Option<(&str, &str)>) -> HttpRequest {
        let mut request = HttpRequest::get(url)
            .header("Accept", ACCEPT)
            .header("User-Agent", USER_AGENT)
            .header("Authorization", format!("Bearer {}", self.token));
        if let Some((name, value)) = extra_header {
            request = request.header(name, value);
        }
        request
    }

    async fn observe_rate_limit(&self, url: &str, response: &HttpResponse) {
        if let Some((remaining, reset_at)) = parse_rate_limit_headers(response) {
            self.limiter
                .observe(remaining, reset_at, is_search_url(url))
                .await;
        }
    }

    /// Issue an authenticated GET.
    ///
    /// Timeouts are retried up to the configured attempt limit. Any response,
    /// whatever its status, is returned to the caller; `None` means no
    /// response could be obtained.
    pub async fn request(
        &self,
        address: &str,
        params: &[(&str, &str)],
        extra_header: Option<(&str, &str)>,
    ) -> Option<HttpResponse> {
        let url = match build_url(address, params) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping request");
                return None;
            }
        };

        self.limiter.pace().await;

        let result = with_retry(
            || self.transport.send(self.build_request(&url, extra_header)),
            HttpError::is_timeout,
            &self.retry,
            &url,
        )
        .await;

        match result {
            Ok(response) => {
                self.observe_rate_limit(&url, &response).await;
                Some(response)
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Request failed");
                None
            }
        }
    }

    /// Fetch and parse a JSON document (object or list).
    ///
    /// Objects get the response ETag attached under [`crate::model::ETAG_FIELD`].
    pub async fn fetch_json(
        &self,
        address: &str,
        params: &[(&str, &str)],
        extra_header: Option<(&str, &str)>,
    ) -> Option<Value> {
        let response = self.request(address, params, extra_header).await?;
        if !response.is_success() {
            tracing::debug!(address, status = response.status, "Fetch returned no content");
            return None;
        }
        parse_with_etag(&response)
    }

    /// Fetch a single JSON object.
    pub async fn fetch_object(
        &self,
        address: &str,
        params: &[(&str, &str)],
        extra_header: Option<(&str, &str)>,
    ) -> Option<Entity> {
        let value = self.fetch_json(address, params, extra_header).await?;
        let entity = Entity::from_value(value);
        if entity.is_none() {
            tracing::warn!(address, "Expected a JSON object");
        }
        entity
    }

    /// Re-fetch `existing` only if it changed upstream.
    ///
    /// With a stored ETag the request is conditional: 304 hands `existing`
    /// back untouched and 200 returns the fresh object. Without one, the fresh
    /// object is merged into `existing`, keeping fields upstream omits. A
    /// failed fetch always returns `existing`.
    pub async fn fetch_if_changed(
        &self,
        existing: Entity,
        address: &str,
        params: &[(&str, &str)],
    ) -> Entity {
        let Some(etag) = existing.etag().map(str::to_owned) else {
            return match self.fetch_object(address, params, None).await {
                Some(fresh) => {
                    let mut merged = existing;
                    merged.merge_from(fresh);
                    merged
                }
                None => existing,
            };
        };

        let Some(response) = self
            .request(address, params, Some(("If-None-Match", etag.as_str())))
            .await
        else {
            return existing;
        };

        match response.status {
            304 => {
                tracing::debug!(address, "Not modified");
                existing
            }
            200 => parse_with_etag(&response)
                .and_then(Entity::from_value)
                .unwrap_or(existing),
            status => {
                tracing::warn!(address, status, "Conditional fetch failed, keeping stored copy");
                existing
            }
        }
    }

    /// Lazily stream every entity of a list endpoint.
    ///
    /// Pages of [`PAGE_SIZE`] are requested on demand by following `Link:
    /// rel="next"`. The stream is single-pass; calling this again starts over
    /// with fresh requests.
    pub fn fetch_paginated<'a>(
        &'a self,
        address: &str,
        params: &[(&str, &str)],
        extra_header: Option<(&'a str, &'a str)>,
    ) -> impl Stream<Item = Entity> + use<'a> {
        let page_size = PAGE_SIZE.to_string();
        let mut all_params = params.to_vec();
        all_params.push(("per_page", page_size.as_str()));

        let first_url = match build_url(address, &all_params) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping paginated fetch");
                None
            }
        };

        paginate(self, first_url, extra_header)
    }

    /// Count the items behind a list endpoint with at most two requests.
    ///
    /// When the first page advertises `rel="last"`, the count is the full
    /// pages before it plus the length of the last page.
    pub async fn count_entities(&self, address: &str, params: &[(&str, &str)]) -> Option<u64> {
        let page_size = PAGE_SIZE.to_string();
        let mut all_params = params.to_vec();
        all_params.push(("per_page", page_size.as_str()));

        let first = self.request(address, &all_params, None).await?;
        if !first.is_success() {
            tracing::debug!(address, status = first.status, "Count probe failed");
            return None;
        }

        let links = response_links(&first);
        match (links.last.as_deref(), links.last_page()) {
            (Some(last_url), Some(last_page)) if last_page > 1 => {
                let last = self.request(last_url, &[], None).await?;
                if !last.is_success() {
                    return None;
                }
                let full_pages = u64::from(last_page - 1) * PAGE_SIZE as u64;
                Some(full_pages + page_entities(&last).len() as u64)
            }
            _ => Some(page_entities(&first).len() as u64),
        }
    }
}

fn parse_with_etag(response: &HttpResponse) -> Option<Value> {
    let mut value: Value = match serde_json::from_slice(&response.body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(status = response.status, error = %e, "Unparseable response body");
            return None;
        }
    };
    if let (Value::Object(map), Some(etag)) = (&mut value, extract_etag(response)) {
        map.insert(crate::model::ETAG_FIELD.to_string(), Value::String(etag));
    }
    Some(value)
}
