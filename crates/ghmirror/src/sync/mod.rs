//! Repository sync: the orchestration of client, aggregate and store.
//!
//! # Module Structure
//!
//! - [`types`] - `SyncOptions`, `SyncResult`, `SyncStage`, `SyncError`
//! - [`progress`] - Progress reporting: `SyncProgress`, `ProgressCallback`, `emit()`
//! - [`stats`] - Upstream item counts per entity kind
//! - [`engine`] - The per-repository state machine: `sync_repository()`
//!
//! # Example
//!
//! ```ignore
//! use ghmirror::store::FileStore;
//! use ghmirror::sync::{SyncOptions, sync_repository};
//!
//! let store = FileStore::new("data");
//! let result = sync_repository(&client, &store, &"rust-lang/rust".parse()?, &SyncOptions::default(), None).await?;
//! println!("{} new entities", result.added());
//! ```

pub mod engine;
mod progress;
pub mod stats;
mod types;

pub use types::{
    KindSummary, SOURCE_CODE_DIR, SourceMirror, SyncError, SyncOptions, SyncResult, SyncStage,
};

pub use progress::{ProgressCallback, SyncProgress, emit};

pub use engine::sync_repository;
pub use stats::collect_stats;
