//! GitHub API data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single rate limit resource entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResource {
    /// Maximum requests allowed per period.
    pub limit: u64,
    /// Requests used in current period.
    #[serde(default)]
    pub used: u64,
    /// Remaining requests in current period.
    pub remaining: u64,
    /// Unix timestamp when the rate limit resets.
    pub reset: i64,
}

impl RateLimitResource {
    /// Get the reset time as a DateTime.
    pub fn reset_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.reset, 0).unwrap_or_else(Utc::now)
    }
}

/// Rate limit resources from `GET /rate_limit`.
///
/// Only `core` and `search` matter to the mirror; the others are kept for
/// display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRateLimits {
    /// Core API rate limit (non-search REST endpoints).
    pub core: RateLimitResource,
    /// Search API rate limit.
    pub search: RateLimitResource,
    #[serde(default)]
    pub graphql: Option<RateLimitResource>,
    #[serde(default)]
    pub code_search: Option<RateLimitResource>,
    #[serde(default)]
    pub integration_manifest: Option<RateLimitResource>,
}

/// Full rate limit response from GitHub's API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubRateLimitResponse {
    /// All rate limit resources.
    pub resources: GitHubRateLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rate_limit_body_with_optional_resources_missing() {
        let body = r#"{
            "resources": {
                "core": {"limit": 5000, "used": 1, "remaining": 4999, "reset": 1700000000},
                "search": {"limit": 30, "used": 0, "remaining": 30, "reset": 1700000060}
            },
            "rate": {"limit": 5000, "used": 1, "remaining": 4999, "reset": 1700000000}
        }"#;

        let parsed: GitHubRateLimitResponse = serde_json::from_str(body).expect("parse");
        assert_eq!(parsed.resources.core.remaining, 4999);
        assert_eq!(parsed.resources.search.limit, 30);
        assert!(parsed.resources.graphql.is_none());
        assert_eq!(parsed.resources.core.reset_at().timestamp(), 1_700_000_000);
    }
}
