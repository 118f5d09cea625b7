//! The per-repository sync state machine.
//!
//! ```text
//! Init -> FetchInfo -> FetchStats -> Fetch(kind)* -> SourceCode? -> Finalize -> Done
//!                  \_______________________________________________/
//!                                  on error: Finalize -> Aborted
//! ```
//!
//! Every stage runs sequentially on the caller's task. The store is finalized
//! exactly once after the first stage has begun, whether the run succeeded or
//! not, and only then is the outcome returned.

use futures_util::StreamExt;

use crate::github::GitHubClient;
use crate::model::{Entity, EntityKind, RepoId};
use crate::project::Project;
use crate::store::{ProjectStore, Record};

use super::progress::{ProgressCallback, SyncProgress, emit};
use super::stats::{collect_stats, stats_count};
use super::types::{KindSummary, SyncError, SyncOptions, SyncResult, SyncStage};

/// Mirror one repository into `store`.
///
/// Loads what the store already holds, fetches whatever is new and flushes
/// the store. On failure the store is still finalized before the error is
/// returned, so write-through stores keep everything added before the
/// failure.
///
/// # Errors
/// - [`SyncError::InfoUnavailable`] if the repository info could not be
///   fetched for a repository the store has never seen.
/// - [`SyncError::Store`] if loading, persisting or finalizing failed.
/// - [`SyncError::Vcs`] if the source-code mirror failed.
pub async fn sync_repository(
    client: &GitHubClient,
    store: &dyn ProjectStore,
    repo: &RepoId,
    options: &SyncOptions,
    on_progress: Option<&ProgressCallback>,
) -> Result<SyncResult, SyncError> {
    let new_repository = !store.exists(repo).await?;
    let project = store.load(repo).await?;

    tracing::info!(repo = %repo, new_repository, store = store.name(), "Syncing repository");
    emit(
        on_progress,
        SyncProgress::Starting {
            repo: repo.full_name(),
            new_repository,
        },
    );

    let mut sync = RepoSync {
        client,
        store,
        repo,
        options,
        on_progress,
        project,
        result: SyncResult::new(repo.clone(), new_repository),
        stage: SyncStage::Init,
    };

    let outcome = sync.run().await;
    let flushed = sync.finalize().await;

    let (stage, error) = match (outcome, flushed) {
        (Ok(()), Ok(())) => {
            let result = sync.result;
            tracing::info!(
                repo = %repo,
                added = result.added(),
                skipped = result.skipped(),
                failed = result.failed(),
                "Repository synced"
            );
            emit(
                on_progress,
                SyncProgress::SyncComplete {
                    repo: repo.full_name(),
                    added: result.added(),
                    skipped: result.skipped(),
                    failed: result.failed(),
                },
            );
            return Ok(result);
        }
        (Ok(()), Err(e)) => (SyncStage::Finalize, SyncError::from(e)),
        (Err(e), flushed) => {
            if let Err(flush_error) = flushed {
                tracing::warn!(repo = %repo, error = %flush_error, "Finalize after failure also failed");
            }
            (sync.stage, e)
        }
    };

    tracing::warn!(repo = %repo, stage = %stage, error = %error, "Repository sync aborted");
    emit(
        on_progress,
        SyncProgress::SyncFailed {
            repo: repo.full_name(),
            stage,
            error: error.to_string(),
        },
    );
    Err(error)
}

struct RepoSync<'a> {
    client: &'a GitHubClient,
    store: &'a dyn ProjectStore,
    repo: &'a RepoId,
    options: &'a SyncOptions,
    on_progress: Option<&'a ProgressCallback>,
    project: Project,
    result: SyncResult,
    stage: SyncStage,
}

impl RepoSync<'_> {
    async fn run(&mut self) -> Result<(), SyncError> {
        self.stage = SyncStage::FetchInfo;
        self.fetch_info().await?;

        self.stage = SyncStage::FetchStats;
        self.fetch_stats().await?;

        let options = self.options;
        for kind in options.enabled_kinds() {
            self.stage = SyncStage::Fetch(kind);
            self.fetch_entities(kind).await?;
        }

        if options.source_code.is_some() {
            self.stage = SyncStage::SourceCode;
            self.mirror_source().await?;
        }
        Ok(())
    }

    async fn finalize(&self) -> Result<(), crate::store::StoreError> {
        emit(
            self.on_progress,
            SyncProgress::Finalizing {
                repo: self.repo.full_name(),
                mode: self.store.write_mode(),
            },
        );
        self.store.finalize(self.repo, &self.project).await
    }

    /// Refresh the info record, conditionally when one is already stored.
    async fn fetch_info(&mut self) -> Result<(), SyncError> {
        let address = self.client.repo_url(self.repo, "");
        let info = match self.project.take_info() {
            Some(existing) => Some(self.client.fetch_if_changed(existing, &address, &[]).await),
            None => self.client.fetch_object(&address, &[], None).await,
        };

        let Some(info) = info else {
            return Err(SyncError::InfoUnavailable {
                repo: self.repo.full_name(),
            });
        };
        self.project.add_info(info);
        self.store
            .persist(self.repo, &self.project, Record::Info)
            .await?;

        emit(
            self.on_progress,
            SyncProgress::InfoFetched {
                repo: self.repo.full_name(),
            },
        );
        Ok(())
    }

    async fn fetch_stats(&mut self) -> Result<(), SyncError> {
        let stats = collect_stats(self.client, self.repo).await;
        let counts = EntityKind::ALL
            .into_iter()
            .filter_map(|kind| stats_count(&stats, kind).map(|count| (kind, count)))
            .collect();

        self.project.add_stats(stats);
        self.store
            .persist(self.repo, &self.project, Record::Stats)
            .await?;

        emit(
            self.on_progress,
            SyncProgress::StatsCollected {
                repo: self.repo.full_name(),
                counts,
            },
        );
        Ok(())
    }

    /// Walk the list endpoint of `kind`, storing every entity not yet known.
    async fn fetch_entities(&mut self, kind: EntityKind) -> Result<(), SyncError> {
        let client = self.client;
        let address = client.repo_url(self.repo, kind.endpoint());
        let expected = self
            .project
            .stats()
            .and_then(|stats| stats_count(stats, kind));
        let full_fetch = self.options.full_fetch(kind);

        tracing::debug!(repo = %self.repo, kind = %kind, ?expected, full_fetch, "Fetching entities");
        emit(
            self.on_progress,
            SyncProgress::FetchingEntities {
                repo: self.repo.full_name(),
                kind,
                expected,
            },
        );

        let mut summary = KindSummary::default();
        let mut candidates = std::pin::pin!(client.fetch_paginated(&address, kind.list_params(), None));

        while let Some(candidate) = candidates.next().await {
            summary.seen += 1;

            if self.project.exists(kind, &candidate) {
                summary.skipped += 1;
                self.processed(kind, false);
                continue;
            }

            let entity = if full_fetch {
                match self.fetch_full(kind, &candidate).await {
                    Some(full) => full,
                    None => {
                        summary.failed += 1;
                        self.processed(kind, false);
                        continue;
                    }
                }
            } else {
                candidate
            };

            let Some(key) = self.project.add(kind, entity) else {
                summary.failed += 1;
                self.processed(kind, false);
                continue;
            };
            self.store
                .persist(self.repo, &self.project, Record::Entity(kind, &key))
                .await?;
            summary.added += 1;
            self.processed(kind, true);
        }

        tracing::debug!(
            repo = %self.repo,
            kind = %kind,
            seen = summary.seen,
            added = summary.added,
            skipped = summary.skipped,
            failed = summary.failed,
            "Entities fetched"
        );
        self.result.kinds.insert(kind, summary);
        emit(
            self.on_progress,
            SyncProgress::EntitiesComplete {
                repo: self.repo.full_name(),
                kind,
                summary,
            },
        );
        Ok(())
    }

    /// Single-object fetch for a list summary: `issues/{number}` or `commits/{sha}`.
    async fn fetch_full(&self, kind: EntityKind, summary: &Entity) -> Option<Entity> {
        let path = match kind {
            EntityKind::Issue => format!("issues/{}", summary.number()?),
            EntityKind::Commit => format!("commits/{}", summary.sha()?),
            _ => return Some(summary.clone()),
        };
        let address = self.client.repo_url(self.repo, &path);
        let full = self.client.fetch_object(&address, &[], None).await;
        if full.is_none() {
            tracing::warn!(repo = %self.repo, kind = %kind, path = %path, "Full fetch failed, will retry next sync");
        }
        full
    }

    async fn mirror_source(&mut self) -> Result<(), SyncError> {
        let options = self.options;
        let Some(mirror) = &options.source_code else {
            return Ok(());
        };
        let path = mirror.path_for(self.repo);
        emit(
            self.on_progress,
            SyncProgress::MirroringSource {
                repo: self.repo.full_name(),
                path: path.clone(),
            },
        );

        let action = mirror.git.mirror(&self.repo.clone_url(), &path).await?;
        self.result.source = Some(action);

        emit(
            self.on_progress,
            SyncProgress::SourceMirrored {
                repo: self.repo.full_name(),
                action,
            },
        );
        Ok(())
    }

    fn processed(&self, kind: EntityKind, added: bool) {
        emit(
            self.on_progress,
            SyncProgress::EntityProcessed {
                repo: self.repo.full_name(),
                kind,
                added,
            },
        );
    }
}
