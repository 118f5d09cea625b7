//! Progress reporting types for repository syncs.
//!
//! The sync engine reports what it is doing through [`SyncProgress`] events so
//! frontends can render logs or progress bars without parsing log output.

use std::path::PathBuf;

use crate::model::EntityKind;
use crate::store::WriteMode;
use crate::vcs::MirrorAction;

use super::types::{KindSummary, SyncStage};

/// Progress events emitted during a repository sync.
///
/// `repo` is always the `owner/name` form.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum SyncProgress {
    /// Starting a repository.
    Starting {
        repo: String,
        /// True if the store has never seen this repository.
        new_repository: bool,
    },

    /// Repository info fetched (or confirmed unchanged).
    InfoFetched { repo: String },

    /// Statistics collected. Counts are the totals reported upstream.
    StatsCollected {
        repo: String,
        counts: Vec<(EntityKind, u64)>,
    },

    /// Starting to walk the list endpoint of `kind`.
    FetchingEntities {
        repo: String,
        kind: EntityKind,
        /// Upstream total, if the statistics probe succeeded.
        expected: Option<u64>,
    },

    /// A candidate was processed. Emitted once per list item.
    EntityProcessed {
        repo: String,
        kind: EntityKind,
        /// True if the entity was new and has been stored.
        added: bool,
    },

    /// Finished one entity kind.
    EntitiesComplete {
        repo: String,
        kind: EntityKind,
        summary: KindSummary,
    },

    /// Cloning or pulling the working copy.
    MirroringSource { repo: String, path: PathBuf },

    /// Working copy is up to date.
    SourceMirrored { repo: String, action: MirrorAction },

    /// Flushing the store.
    Finalizing { repo: String, mode: WriteMode },

    /// The repository sync finished.
    SyncComplete {
        repo: String,
        added: usize,
        skipped: usize,
        failed: usize,
    },

    /// The repository sync aborted. The store has been finalized.
    SyncFailed {
        repo: String,
        stage: SyncStage,
        error: String,
    },

    /// Warning message (non-fatal).
    Warning { message: String },
}

/// Callback type for progress events.
pub type ProgressCallback = Box<dyn Fn(SyncProgress) + Send + Sync>;

/// Emit a progress event if a callback is present.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: SyncProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}
