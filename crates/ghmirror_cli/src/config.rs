//! Configuration file support for ghmirror.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `GHMIRROR_`, sections separated by
//!    `__`, e.g. `GHMIRROR_GITHUB__TOKEN` or `GHMIRROR_STORAGE__DATA_DIR`)
//! 3. Config file (./ghmirror.toml, then ~/.config/ghmirror/config.toml)
//! 4. Built-in defaults
//!
//! The database URL defaults to `sqlite://~/.local/state/ghmirror/ghmirror.db`
//! on Linux (using the XDG state directory) if not explicitly configured.
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use GHMIRROR_GITHUB__TOKEN
//! requests_per_second = 10
//!
//! [storage]
//! backend = "files"  # or "database"
//! data_dir = "data"
//! bulk_batch_size = 1000
//!
//! [sync]
//! issue_events = false
//! commits_full = false
//! source_code = true
//! verbose = 2
//!
//! [git]
//! executable = "/usr/bin/git"
//! ```

use std::path::PathBuf;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use ghmirror::WriteMode;
use ghmirror::github::DEFAULT_API_URL;
use ghmirror::store::DEFAULT_BULK_BATCH_SIZE;
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub github: GitHubConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub git: GitConfig,
}

/// GitHub API configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Personal access token. Required for syncing.
    pub token: Option<String>,
    /// API root, for GitHub Enterprise.
    pub api_url: String,
    /// Per-request timeout.
    pub timeout_secs: u64,
    /// Proactive pacing. `0` disables it.
    pub requests_per_second: u32,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 30,
            requests_per_second: ghmirror::rate_limit::thresholds::GITHUB_DEFAULT_RPS,
        }
    }
}

/// Which store backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One directory per repository, one JSON file per entity.
    #[default]
    Files,
    /// A SQLite or PostgreSQL database.
    Database,
}

impl StorageBackend {
    /// Write mode used when none is configured.
    pub fn default_write_mode(self) -> WriteMode {
        match self {
            Self::Files => WriteMode::WriteThrough,
            Self::Database => WriteMode::Buffered,
        }
    }
}

/// Storage configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Root of the file store and of source-code checkouts.
    pub data_dir: PathBuf,
    /// Supports sqlite:// and postgres:// schemes.
    pub database_url: Option<String>,
    /// Overrides the backend's default write mode.
    pub write_mode: Option<WriteMode>,
    /// Documents per bulk upsert.
    pub bulk_batch_size: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            data_dir: PathBuf::from("data"),
            database_url: None,
            write_mode: None,
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
        }
    }
}

impl StorageConfig {
    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
            .unwrap_or_else(|| self.backend.default_write_mode())
    }
}

/// What to download.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub issues: bool,
    pub issue_comments: bool,
    pub issue_events: bool,
    pub commits: bool,
    pub commit_comments: bool,
    pub contributors: bool,
    pub source_code: bool,
    /// Re-fetch every new issue individually.
    pub issues_full: bool,
    /// Re-fetch every new commit individually.
    pub commits_full: bool,
    /// 0 = warnings only, 1 = one line per phase, 2 = progress bars.
    pub verbose: u8,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            issues: true,
            issue_comments: true,
            issue_events: true,
            commits: true,
            commit_comments: true,
            contributors: true,
            source_code: false,
            issues_full: true,
            commits_full: true,
            verbose: 1,
        }
    }
}

/// Source-code mirroring.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub executable: PathBuf,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            executable: PathBuf::from("git"),
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/ghmirror/config.toml)
    /// 3. Local config file (./ghmirror.toml)
    /// 4. Environment variables with the GHMIRROR_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(proj_dirs) = ProjectDirs::from("", "", "ghmirror") {
            let xdg_config = proj_dirs.config_dir().join("config.toml");
            if xdg_config.exists() {
                tracing::debug!("Loading config from {:?}", xdg_config);
                builder = builder.add_source(
                    File::from(xdg_config)
                        .format(FileFormat::Toml)
                        .required(false),
                );
            }
        }

        let local_config = PathBuf::from("ghmirror.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./ghmirror.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // GHMIRROR_SYNC__ISSUE_EVENTS -> sync.issue_events
        builder = builder.add_source(
            Environment::with_prefix("GHMIRROR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the database URL, falling back to the default state directory path.
    ///
    /// The `mode=rwc` parameter enables read-write access and creates the file
    /// if it doesn't exist.
    pub fn database_url(&self) -> Option<String> {
        self.storage.database_url.clone().or_else(|| {
            Self::default_state_dir().map(|state_dir| {
                let db_path = state_dir.join("ghmirror.db");
                format!("sqlite://{}?mode=rwc", db_path.display())
            })
        })
    }

    /// Get the default state directory path.
    ///
    /// On Linux, this is `$XDG_STATE_HOME/ghmirror` or `~/.local/state/ghmirror`.
    /// On macOS/Windows, falls back to the data directory.
    pub fn default_state_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "ghmirror").map(|dirs| {
            // state_dir() returns None on macOS/Windows, fall back to data_dir
            dirs.state_dir()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| dirs.data_dir().to_path_buf())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(content: &str) -> Config {
        ConfigBuilder::builder()
            .add_source(config::File::from_str(content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.timeout_secs, 30);
        assert_eq!(config.storage.backend, StorageBackend::Files);
        assert_eq!(config.storage.data_dir, PathBuf::from("data"));
        assert_eq!(config.storage.bulk_batch_size, 1000);
        assert!(config.sync.issues && config.sync.contributors);
        assert!(!config.sync.source_code);
        assert_eq!(config.sync.verbose, 1);
        assert_eq!(config.git.executable, PathBuf::from("git"));
    }

    #[test]
    fn test_write_mode_follows_backend_unless_set() {
        let mut storage = StorageConfig::default();
        assert_eq!(storage.write_mode(), WriteMode::WriteThrough);

        storage.backend = StorageBackend::Database;
        assert_eq!(storage.write_mode(), WriteMode::Buffered);

        storage.write_mode = Some(WriteMode::WriteThrough);
        assert_eq!(storage.write_mode(), WriteMode::WriteThrough);
    }

    #[test]
    fn test_config_builder_with_toml_string() {
        let config = from_toml(
            r#"
            [github]
            token = "ghp_test123"
            requests_per_second = 0

            [storage]
            backend = "database"
            database_url = "sqlite:///tmp/test.db"
            write_mode = "write-through"
            bulk_batch_size = 250

            [sync]
            issue_events = false
            commits_full = false
            verbose = 2

            [git]
            executable = "/opt/git/bin/git"
        "#,
        );

        assert_eq!(config.github.token.as_deref(), Some("ghp_test123"));
        assert_eq!(config.github.requests_per_second, 0);
        assert_eq!(config.storage.backend, StorageBackend::Database);
        assert_eq!(config.database_url().as_deref(), Some("sqlite:///tmp/test.db"));
        assert_eq!(config.storage.write_mode(), WriteMode::WriteThrough);
        assert_eq!(config.storage.bulk_batch_size, 250);
        assert!(!config.sync.issue_events);
        assert!(!config.sync.commits_full);
        assert!(config.sync.issues_full);
        assert_eq!(config.sync.verbose, 2);
        assert_eq!(config.git.executable, PathBuf::from("/opt/git/bin/git"));
    }

    #[test]
    fn test_config_builder_partial_override() {
        let config = from_toml(
            r#"
            [sync]
            contributors = false
        "#,
        );

        assert!(!config.sync.contributors);
        assert!(config.sync.issues);
        assert_eq!(config.storage.backend, StorageBackend::Files);
    }

    #[test]
    fn test_database_url_defaults_to_state_dir() {
        let config = Config::default();
        if let Some(url) = config.database_url() {
            assert!(url.starts_with("sqlite://"));
            assert!(url.ends_with("ghmirror.db?mode=rwc"));
        }
    }
}
