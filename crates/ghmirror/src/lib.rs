//! ghmirror - incremental, rate-aware mirroring of GitHub repository metadata.
//!
//! A sync pulls a repository's info, statistics, issues, issue comments, issue
//! events, commits, commit comments and contributors from the GitHub REST API
//! and merges them into a local store. Entities are deduplicated by identity,
//! so running the same sync again only fetches what is new.
//!
//! The pieces, leaves first:
//!
//! - [`rate_limit::RateLimiter`] sleeps when the remaining quota drops below
//!   the threshold for the endpoint class.
//! - [`github::GitHubClient`] issues authenticated requests with bounded
//!   retries, conditional (ETag) re-fetches and lazy pagination.
//! - [`project::Project`] is the in-memory aggregate of one repository.
//! - [`store::ProjectStore`] persists it, as a file tree or in a database.
//! - [`sync::sync_repository`] drives one repository through all of the above.
//!
//! # Features
//!
//! - `sqlite` / `postgres` - Database drivers for [`store::DatabaseStore`].
//! - `migrate` - Enables database migration support. When enabled, you can use
//!   [`connect_and_migrate`] to automatically run migrations on connection.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use ghmirror::github::GitHubClient;
//! use ghmirror::http::reqwest_transport::ReqwestTransport;
//! use ghmirror::store::FileStore;
//! use ghmirror::sync::{SyncOptions, sync_repository};
//!
//! let transport = Arc::new(ReqwestTransport::with_timeout(Duration::from_secs(30))?);
//! let client = GitHubClient::new(token, transport).authenticate().await?;
//! let store = FileStore::new("data");
//! let repo = "rust-lang/rust".parse()?;
//! sync_repository(&client, &store, &repo, &SyncOptions::default(), None).await?;
//! ```

pub mod db;
pub mod entity;
pub mod github;
pub mod http;
pub mod model;
pub mod project;
pub mod rate_limit;
pub mod retry;
pub mod store;
pub mod sync;
pub mod vcs;

#[cfg(feature = "migrate")]
pub mod migration;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use model::{Entity, EntityKey, EntityKind, RepoId, RepoIdError};
pub use project::Project;
pub use store::{DatabaseStore, FileStore, ProjectStore, StoreError, WriteMode};
