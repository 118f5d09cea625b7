//! GitHub REST client: authentication, quota handling, conditional and
//! paginated fetches.
//!
//! # Module Structure
//!
//! - [`error`] - Error types for client construction and status queries
//! - [`types`] - `GET /rate_limit` response types
//! - `client` - The rate-aware client itself
//! - `pagination` - `Link` header parsing and the lazy entity stream
//!
//! ```ignore
//! use std::sync::Arc;
//! use futures_util::StreamExt;
//! use ghmirror::github::GitHubClient;
//! use ghmirror::http::reqwest_transport::ReqwestTransport;
//!
//! let transport = Arc::new(ReqwestTransport::with_timeout(Duration::from_secs(30))?);
//! let client = GitHubClient::new(token, transport).authenticate().await?;
//! let issues = client.fetch_paginated(&url, &[("state", "all")], None);
//! futures_util::pin_mut!(issues);
//! while let Some(issue) = issues.next().await { /* ... */ }
//! ```

mod client;
pub mod error;
mod pagination;
pub mod types;

pub use client::{DEFAULT_API_URL, GitHubClient, build_url, extract_etag};
pub use error::GitHubError;
pub use pagination::{LinkPagination, PAGE_SIZE, parse_link_header, response_links};
pub use types::{GitHubRateLimitResponse, GitHubRateLimits, RateLimitResource};
