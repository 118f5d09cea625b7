//! Durable storage for mirrored repositories.
//!
//! A [`ProjectStore`] rebuilds a [`Project`] at the start of a sync and writes
//! it back as the sync progresses. Two backends are provided:
//!
//! - [`FileStore`]: one directory per repository, one JSON file per entity.
//! - [`DatabaseStore`]: one `documents` table shared by all repositories.
//!
//! When the writes happen is decided by the store's [`WriteMode`]. In
//! write-through mode [`ProjectStore::persist`] writes the changed record
//! immediately and [`ProjectStore::finalize`] does nothing. In buffered mode
//! `persist` does nothing and `finalize` writes the whole aggregate in one go.

mod database;
mod error;
mod files;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{EntityKey, EntityKind, RepoId};
use crate::project::Project;

pub use database::{
    DEFAULT_BULK_BATCH_SIZE, DEFAULT_UPSERT_BACKOFF_MS, DEFAULT_UPSERT_RETRIES, DatabaseStore,
    INFO_COLLECTION, STATS_COLLECTION, document_key,
};
pub use error::{Result, StoreError};
pub use files::FileStore;

/// When a store makes changes durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WriteMode {
    /// Every persisted record is written as soon as it is added.
    WriteThrough,
    /// Records are kept in memory and written when the sync finalizes.
    Buffered,
}

impl WriteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WriteThrough => "write-through",
            Self::Buffered => "buffered",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WriteMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "write-through" | "write_through" | "writethrough" => Ok(Self::WriteThrough),
            "buffered" | "bulk" => Ok(Self::Buffered),
            other => Err(StoreError::InvalidInput {
                message: format!("unknown write mode '{other}'"),
            }),
        }
    }
}

/// The record of a [`Project`] that just changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    Info,
    Stats,
    Entity(EntityKind, &'a EntityKey),
}

/// Storage backend for mirrored repositories.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    fn write_mode(&self) -> WriteMode;

    /// Rebuild the aggregate for `repo`. Unknown repositories load empty.
    async fn load(&self, repo: &RepoId) -> Result<Project>;

    /// True iff an info record for `repo` is durably stored.
    async fn exists(&self, repo: &RepoId) -> Result<bool>;

    /// Record that `record` of `project` was just added or replaced.
    ///
    /// The record is read back from `project`; a record that is missing
    /// there is skipped.
    async fn persist(&self, repo: &RepoId, project: &Project, record: Record<'_>) -> Result<()>;

    /// End-of-sync flush. Runs once per sync, whether the sync succeeded or not.
    async fn finalize(&self, repo: &RepoId, project: &Project) -> Result<()>;
}
