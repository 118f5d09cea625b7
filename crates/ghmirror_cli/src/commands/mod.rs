pub(crate) mod limits;
pub(crate) mod sync;

use std::sync::Arc;
use std::time::Duration;

use ghmirror::github::GitHubClient;
use ghmirror::http::reqwest_transport::ReqwestTransport;
use ghmirror::rate_limit::RateLimiter;

use crate::config::Config;

/// Build an authenticated GitHub client from configuration.
///
/// Fails before any repository is touched if the token is missing or GitHub
/// rejects it.
pub(crate) async fn build_client(
    config: &Config,
) -> Result<GitHubClient, Box<dyn std::error::Error>> {
    let token = config.github.token.as_deref().ok_or(
        "No GitHub token configured. Set GHMIRROR_GITHUB__TOKEN or add `token` \
         to the [github] section of ghmirror.toml.",
    )?;

    let transport =
        ReqwestTransport::with_timeout(Duration::from_secs(config.github.timeout_secs))?;
    let limiter = RateLimiter::with_pacing(config.github.requests_per_second);

    let client = GitHubClient::new(token, Arc::new(transport))
        .with_api_url(config.github.api_url.clone())
        .with_rate_limiter(limiter)
        .authenticate()
        .await
        .map_err(|e| format!("GitHub rejected the configured credentials: {e}"))?;

    Ok(client)
}

/// Create the parent directory of a file-backed SQLite database.
pub(crate) fn ensure_sqlite_parent(database_url: &str) -> std::io::Result<()> {
    let Some(db_path) = database_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    // Strip query parameters (e.g., ?mode=rwc) before path operations
    let db_path = db_path.split('?').next().unwrap_or(db_path);
    let db_path = std::path::Path::new(db_path);

    if db_path.is_relative() && !db_path.as_os_str().is_empty() {
        tracing::warn!(
            "Database path '{}' is relative - behavior depends on current directory. \
             Consider using an absolute path.",
            db_path.display()
        );
    }

    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}
