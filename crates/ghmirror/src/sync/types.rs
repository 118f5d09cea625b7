//! Sync options, stages and result counters.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{EntityKind, RepoId};
use crate::store::StoreError;
use crate::vcs::{GitMirror, MirrorAction, VcsError};

/// Directory below a repository's storage directory that holds its working copy.
pub const SOURCE_CODE_DIR: &str = "sourcecode";

/// Where and how to mirror source code.
#[derive(Debug, Clone)]
pub struct SourceMirror {
    pub git: GitMirror,
    /// Data directory; the working copy goes to `<root>/<owner>_<repo>/sourcecode`.
    pub root: PathBuf,
}

impl SourceMirror {
    pub fn new(git: GitMirror, root: impl Into<PathBuf>) -> Self {
        Self {
            git,
            root: root.into(),
        }
    }

    pub fn path_for(&self, repo: &RepoId) -> PathBuf {
        self.root.join(repo.storage_name()).join(SOURCE_CODE_DIR)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// What a sync downloads.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub issues: bool,
    pub issue_comments: bool,
    pub issue_events: bool,
    pub commits: bool,
    pub commit_comments: bool,
    pub contributors: bool,
    /// Re-fetch each new issue from `issues/{number}`.
    pub issues_full: bool,
    /// Re-fetch each new commit from `commits/{sha}`.
    pub commits_full: bool,
    /// Clone or pull the repository after the metadata fetch.
    pub source_code: Option<SourceMirror>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            issues: true,
            issue_comments: true,
            issue_events: true,
            commits: true,
            commit_comments: true,
            contributors: true,
            issues_full: true,
            commits_full: true,
            source_code: None,
        }
    }
}

impl SyncOptions {
    /// Whether entities of `kind` are downloaded.
    pub fn enabled(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Issue => self.issues,
            EntityKind::IssueComment => self.issue_comments,
            EntityKind::IssueEvent => self.issue_events,
            EntityKind::Commit => self.commits,
            EntityKind::CommitComment => self.commit_comments,
            EntityKind::Contributor => self.contributors,
        }
    }

    /// Whether new entities of `kind` are re-fetched individually.
    ///
    /// Only issues and commits have a richer single-object endpoint.
    pub fn full_fetch(&self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Issue => self.issues_full,
            EntityKind::Commit => self.commits_full,
            _ => false,
        }
    }

    /// Enabled kinds, in fetch order.
    pub fn enabled_kinds(&self) -> impl Iterator<Item = EntityKind> + '_ {
        EntityKind::ALL
            .into_iter()
            .filter(|kind| self.enabled(*kind))
    }
}

/// Where a repository sync is.
///
/// The terminal states are the outcome of `sync_repository`: `Ok` once the
/// flush succeeds, otherwise `Err` plus a `SyncFailed` event naming the stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    Init,
    FetchInfo,
    FetchStats,
    Fetch(EntityKind),
    SourceCode,
    Finalize,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => f.write_str("init"),
            Self::FetchInfo => f.write_str("info"),
            Self::FetchStats => f.write_str("stats"),
            Self::Fetch(kind) => f.write_str(kind.label()),
            Self::SourceCode => f.write_str("source code"),
            Self::Finalize => f.write_str("finalize"),
        }
    }
}

/// Counters for one entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindSummary {
    /// Candidates yielded by the list endpoint.
    pub seen: usize,
    /// New entities stored.
    pub added: usize,
    /// Candidates already present in the store.
    pub skipped: usize,
    /// Candidates dropped this round (failed full fetch or no identity).
    pub failed: usize,
}

/// Outcome of one repository sync.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub repo: RepoId,
    /// True when the store held no info record before this run.
    pub new_repository: bool,
    pub kinds: BTreeMap<EntityKind, KindSummary>,
    pub source: Option<MirrorAction>,
}

impl SyncResult {
    pub fn new(repo: RepoId, new_repository: bool) -> Self {
        Self {
            repo,
            new_repository,
            kinds: BTreeMap::new(),
            source: None,
        }
    }

    pub fn summary(&self, kind: EntityKind) -> KindSummary {
        self.kinds.get(&kind).copied().unwrap_or_default()
    }

    /// New entities stored across all kinds.
    pub fn added(&self) -> usize {
        self.kinds.values().map(|s| s.added).sum()
    }

    pub fn skipped(&self) -> usize {
        self.kinds.values().map(|s| s.skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.kinds.values().map(|s| s.failed).sum()
    }
}

/// Why a repository sync aborted.
///
/// Returned only after the store has been finalized.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("repository info for {repo} could not be fetched")]
    InfoUnavailable { repo: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("source mirror failed: {0}")]
    Vcs(#[from] VcsError),
}
