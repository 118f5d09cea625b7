//! The `sync` command: mirror one or more repositories in turn.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use console::style;
use ghmirror::github::GitHubClient;
use ghmirror::store::{FileStore, ProjectStore};
use ghmirror::sync::{SourceMirror, SyncOptions, sync_repository};
use ghmirror::vcs::GitMirror;
use ghmirror::{RepoId, WriteMode};

use crate::config::{Config, StorageBackend};
use crate::progress::ProgressReporter;

/// Flags of `ghmirror sync`. Each one overrides the matching config value.
#[derive(Debug, Clone, Default, clap::Args)]
pub(crate) struct SyncArgs {
    /// Repositories: `owner/repo`, a GitHub URL, or a file listing one per line
    #[arg(required = true, value_name = "TARGET")]
    pub targets: Vec<String>,

    /// Store backend
    #[arg(short, long, value_enum)]
    pub backend: Option<StorageBackend>,

    /// Root directory for the file store and source checkouts
    #[arg(short = 'd', long)]
    pub data_dir: Option<PathBuf>,

    /// Database connection string (implies --backend database)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Buffer writes until the end of each repository
    #[arg(long)]
    pub buffered: bool,

    /// Skip issues
    #[arg(long)]
    pub no_issues: bool,

    /// Skip issue comments
    #[arg(long)]
    pub no_issue_comments: bool,

    /// Skip issue events
    #[arg(long)]
    pub no_issue_events: bool,

    /// Skip commits
    #[arg(long)]
    pub no_commits: bool,

    /// Skip commit comments
    #[arg(long)]
    pub no_commit_comments: bool,

    /// Skip contributors
    #[arg(long)]
    pub no_contributors: bool,

    /// Store list items as returned instead of re-fetching new issues and commits
    #[arg(long)]
    pub no_full: bool,

    /// Also clone or pull each repository's source code
    #[arg(long)]
    pub source_code: bool,

    /// More output (-v phase lines, -vv progress bars, -vvv debug logs)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Warnings and errors only
    #[arg(short, long)]
    pub quiet: bool,
}

impl SyncArgs {
    /// Fold the flags into `config`.
    pub(crate) fn apply(&self, config: &mut Config) {
        if let Some(backend) = self.backend {
            config.storage.backend = backend;
        }
        if let Some(ref dir) = self.data_dir {
            config.storage.data_dir = dir.clone();
        }
        if let Some(ref url) = self.database_url {
            config.storage.database_url = Some(url.clone());
            if self.backend.is_none() {
                config.storage.backend = StorageBackend::Database;
            }
        }
        if self.buffered {
            config.storage.write_mode = Some(WriteMode::Buffered);
        }

        let sync = &mut config.sync;
        sync.issues &= !self.no_issues;
        sync.issue_comments &= !self.no_issue_comments;
        sync.issue_events &= !self.no_issue_events;
        sync.commits &= !self.no_commits;
        sync.commit_comments &= !self.no_commit_comments;
        sync.contributors &= !self.no_contributors;
        if self.no_full {
            sync.issues_full = false;
            sync.commits_full = false;
        }
        sync.source_code |= self.source_code;

        if self.quiet {
            sync.verbose = 0;
        } else if self.verbose > 0 {
            sync.verbose = self.verbose;
        }
    }
}

/// Build the per-repository sync options from configuration.
pub(crate) fn sync_options(config: &Config) -> SyncOptions {
    let sync = &config.sync;
    let source_code = sync.source_code.then(|| {
        SourceMirror::new(
            GitMirror::new(config.git.executable.clone()),
            config.storage.data_dir.clone(),
        )
    });

    SyncOptions {
        issues: sync.issues,
        issue_comments: sync.issue_comments,
        issue_events: sync.issue_events,
        commits: sync.commits,
        commit_comments: sync.commit_comments,
        contributors: sync.contributors,
        issues_full: sync.issues_full,
        commits_full: sync.commits_full,
        source_code,
    }
}

/// Resolve command-line targets into repositories, in order, without duplicates.
///
/// A target naming an existing file is read as a list.
pub(crate) fn resolve_targets(targets: &[String]) -> Result<Vec<RepoId>, Box<dyn std::error::Error>> {
    let mut repos = Vec::new();
    for target in targets {
        let path = Path::new(target);
        if path.is_file() {
            let content = std::fs::read_to_string(path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            repos.extend(parse_target_list(&content, path)?);
        } else {
            repos.push(target.parse::<RepoId>()?);
        }
    }

    let mut seen = std::collections::HashSet::new();
    repos.retain(|repo| seen.insert(repo.clone()));
    Ok(repos)
}

/// Parse a repository list: one target per line, `#` starts a comment.
pub(crate) fn parse_target_list(
    content: &str,
    source: &Path,
) -> Result<Vec<RepoId>, String> {
    content
        .lines()
        .enumerate()
        .filter_map(|(n, line)| {
            let line = line.split('#').next().unwrap_or_default().trim();
            (!line.is_empty()).then_some((n + 1, line))
        })
        .map(|(n, line)| {
            line.parse::<RepoId>()
                .map_err(|e| format!("{}:{n}: {e}", source.display()))
        })
        .collect()
}

/// Open the configured store.
async fn open_store(config: &Config) -> Result<Box<dyn ProjectStore>, Box<dyn std::error::Error>> {
    let mode = config.storage.write_mode();
    match config.storage.backend {
        StorageBackend::Files => Ok(Box::new(
            FileStore::new(&config.storage.data_dir).with_write_mode(mode),
        )),
        StorageBackend::Database => open_database(config, mode).await,
    }
}

#[cfg(any(feature = "sqlite", feature = "postgres"))]
async fn open_database(
    config: &Config,
    mode: WriteMode,
) -> Result<Box<dyn ProjectStore>, Box<dyn std::error::Error>> {
    let database_url = config
        .database_url()
        .ok_or("Could not determine a database URL; set storage.database_url")?;
    super::ensure_sqlite_parent(&database_url)?;

    let db = ghmirror::connect_and_migrate(&database_url).await?;
    Ok(Box::new(
        ghmirror::DatabaseStore::new(db)
            .with_write_mode(mode)
            .with_batch_size(config.storage.bulk_batch_size),
    ))
}

#[cfg(not(any(feature = "sqlite", feature = "postgres")))]
async fn open_database(
    _config: &Config,
    _mode: WriteMode,
) -> Result<Box<dyn ProjectStore>, Box<dyn std::error::Error>> {
    Err("This build has no database driver; rebuild with the sqlite or postgres feature".into())
}

/// Totals over all repositories of one command.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SyncReport {
    pub succeeded: usize,
    pub failed: usize,
    pub added: usize,
}

/// Handle `ghmirror sync`.
pub(crate) async fn handle_sync(
    args: &SyncArgs,
    config: &Config,
) -> Result<SyncReport, Box<dyn std::error::Error>> {
    let repos = resolve_targets(&args.targets)?;
    let client = super::build_client(config).await?;
    let store = open_store(config).await?;
    let options = sync_options(config);

    tracing::info!(
        repositories = repos.len(),
        store = store.name(),
        mode = %store.write_mode(),
        "Starting sync"
    );

    let reporter = Arc::new(ProgressReporter::for_verbosity(config.sync.verbose));
    let report = run_all(&client, store.as_ref(), &repos, &options, &reporter).await;
    reporter.finish();

    print_summary(&report, config.sync.verbose);
    Ok(report)
}

async fn run_all(
    client: &GitHubClient,
    store: &dyn ProjectStore,
    repos: &[RepoId],
    options: &SyncOptions,
    reporter: &Arc<ProgressReporter>,
) -> SyncReport {
    let callback = reporter.as_callback();
    let mut report = SyncReport::default();

    for repo in repos {
        match sync_repository(client, store, repo, options, Some(&callback)).await {
            Ok(result) => {
                report.succeeded += 1;
                report.added += result.added();
            }
            Err(e) => {
                // Already finalized and reported through the callback.
                tracing::debug!(repo = %repo, error = %e, "Continuing after failure");
                report.failed += 1;
            }
        }
    }

    report
}

fn print_summary(report: &SyncReport, verbose: u8) {
    if report.failed > 0 {
        eprintln!(
            "{} {} of {} repositories failed",
            style("✗").red().bold(),
            report.failed,
            report.failed + report.succeeded
        );
    } else if verbose > 0 {
        println!(
            "{} {} repositories synced, {} new entities",
            style("✓").green().bold(),
            report.succeeded,
            report.added
        );
    }
}
