use ghmirror::sync::SyncProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: SyncProgress) {
        match event {
            SyncProgress::Starting {
                repo,
                new_repository,
            } => {
                if new_repository {
                    tracing::info!(repo = %repo, "Syncing new repository");
                } else {
                    tracing::info!(repo = %repo, "Updating repository");
                }
            }

            SyncProgress::InfoFetched { repo } => {
                tracing::debug!(repo = %repo, "Repository info fetched");
            }

            SyncProgress::StatsCollected { repo, counts } => {
                let total: u64 = counts.iter().map(|(_, count)| count).sum();
                tracing::info!(repo = %repo, total, "Statistics collected");
                for (kind, count) in counts {
                    tracing::debug!(repo = %repo, kind = %kind, count, "Upstream count");
                }
            }

            SyncProgress::FetchingEntities {
                repo,
                kind,
                expected,
            } => {
                tracing::info!(repo = %repo, kind = %kind, expected = ?expected, "Fetching {}", kind.label());
            }

            SyncProgress::EntityProcessed { repo, kind, added } => {
                tracing::trace!(repo = %repo, kind = %kind, added, "Processed");
            }

            SyncProgress::EntitiesComplete {
                repo,
                kind,
                summary,
            } => {
                tracing::info!(
                    repo = %repo,
                    kind = %kind,
                    seen = summary.seen,
                    added = summary.added,
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "Finished {}",
                    kind.label()
                );
            }

            SyncProgress::MirroringSource { repo, path } => {
                tracing::info!(repo = %repo, path = %path.display(), "Mirroring source code");
            }

            SyncProgress::SourceMirrored { repo, action } => {
                tracing::info!(repo = %repo, action = ?action, "Source code up to date");
            }

            SyncProgress::Finalizing { repo, mode } => {
                tracing::debug!(repo = %repo, mode = %mode, "Finalizing store");
            }

            SyncProgress::SyncComplete {
                repo,
                added,
                skipped,
                failed,
            } => {
                tracing::info!(repo = %repo, added, skipped, failed, "Sync complete");
            }

            SyncProgress::SyncFailed { repo, stage, error } => {
                tracing::error!(repo = %repo, stage = %stage, error = %error, "Sync failed");
            }

            SyncProgress::Warning { message } => {
                tracing::warn!(message = %message, "Warning");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
