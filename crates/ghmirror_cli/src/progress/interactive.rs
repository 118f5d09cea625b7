use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ghmirror::EntityKind;
use ghmirror::sync::{KindSummary, SyncProgress};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Bars of the repository currently being synced.
#[derive(Default)]
struct ProgressState {
    /// One bar per entity kind, created when its list walk starts.
    kind_bars: HashMap<EntityKind, ProgressBar>,
    /// Spinner for the phases outside the list walks.
    phase_bar: Option<ProgressBar>,
}

/// Interactive progress reporter using indicatif.
///
/// Each repository gets a phase spinner plus one bar per entity kind. Kinds
/// with a known upstream count get a real bar; the rest get a counter.
pub struct InteractiveReporter {
    multi: MultiProgress,
    state: Mutex<ProgressState>,
}

impl InteractiveReporter {
    pub fn new() -> Self {
        Self::with_multi(MultiProgress::new())
    }

    fn with_multi(multi: MultiProgress) -> Self {
        Self {
            multi,
            state: Mutex::new(ProgressState::default()),
        }
    }

    /// A reporter that draws nowhere.
    #[cfg(test)]
    pub fn hidden() -> Self {
        Self::with_multi(MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()))
    }

    fn state(&self) -> MutexGuard<'_, ProgressState> {
        // A panic while drawing leaves the bars usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn handle(&self, event: SyncProgress) {
        let mut state = self.state();

        match event {
            SyncProgress::Starting {
                repo,
                new_repository,
            } => {
                Self::finish_all(&mut state);
                let pb = self.multi.add(ProgressBar::new_spinner());
                pb.set_style(Self::spinner_style());
                pb.set_prefix(format!("{:16}", repo));
                pb.enable_steady_tick(Duration::from_millis(100));
                pb.set_message(if new_repository {
                    "New repository, fetching info..."
                } else {
                    "Fetching info..."
                });
                state.phase_bar = Some(pb);
            }

            SyncProgress::InfoFetched { .. } => {
                if let Some(ref pb) = state.phase_bar {
                    pb.set_message("Collecting statistics...");
                }
            }

            SyncProgress::StatsCollected { counts, .. } => {
                if let Some(ref pb) = state.phase_bar {
                    let total: u64 = counts.iter().map(|(_, count)| count).sum();
                    pb.set_message(format!("{} items upstream", total));
                }
            }

            SyncProgress::FetchingEntities { kind, expected, .. } => {
                let pb = match expected {
                    Some(total) if total > 0 => {
                        let bar = self.multi.add(ProgressBar::new(total));
                        bar.set_style(Self::bar_style());
                        bar
                    }
                    _ => {
                        let bar = self.multi.add(ProgressBar::new_spinner());
                        bar.set_style(Self::counter_style());
                        bar.enable_steady_tick(Duration::from_millis(100));
                        bar
                    }
                };
                pb.set_prefix(format!("{:16}", kind.label()));
                pb.set_message("Fetching...");
                state.kind_bars.insert(kind, pb);
            }

            SyncProgress::EntityProcessed { kind, added, .. } => {
                if let Some(pb) = state.kind_bars.get(&kind) {
                    // Upstream totals can grow while we walk.
                    if let Some(len) = pb.length()
                        && pb.position() >= len
                    {
                        pb.set_length(len + 1);
                    }
                    pb.inc(1);
                    if added {
                        pb.set_message("new");
                    }
                }
            }

            SyncProgress::EntitiesComplete { kind, summary, .. } => {
                if let Some(pb) = state.kind_bars.get(&kind) {
                    pb.disable_steady_tick();
                    pb.finish_with_message(Self::summary_message(&summary));
                }
            }

            SyncProgress::MirroringSource { path, .. } => {
                if let Some(ref pb) = state.phase_bar {
                    pb.set_message(format!("git {}", path.display()));
                }
            }

            SyncProgress::SourceMirrored { action, .. } => {
                if let Some(ref pb) = state.phase_bar {
                    pb.set_message(format!("Source {:?}", action).to_lowercase());
                }
            }

            SyncProgress::Finalizing { mode, .. } => {
                if let Some(ref pb) = state.phase_bar {
                    pb.set_message(format!("Finalizing ({})...", mode));
                }
            }

            SyncProgress::SyncComplete {
                added,
                skipped,
                failed,
                ..
            } => {
                if let Some(pb) = state.phase_bar.take() {
                    let msg = if failed > 0 {
                        format!("✓ {} new, {} known, {} failed", added, skipped, failed)
                    } else {
                        format!("✓ {} new, {} known", added, skipped)
                    };
                    pb.finish_with_message(msg);
                }
                Self::finish_all(&mut state);
            }

            SyncProgress::SyncFailed { stage, error, .. } => {
                if let Some(pb) = state.phase_bar.take() {
                    pb.abandon_with_message(format!("✗ {}: {}", stage, error));
                }
                for (_, pb) in state.kind_bars.drain() {
                    if !pb.is_finished() {
                        pb.abandon();
                    }
                }
            }

            SyncProgress::Warning { message } => {
                // Release lock before printing to avoid holding it during I/O
                drop(state);
                self.multi.println(format!("⚠ {}", message)).ok();
            }

            _ => {}
        }
    }

    /// Finish all progress bars.
    pub fn finish(&self) {
        Self::finish_all(&mut self.state());
    }

    fn finish_all(state: &mut ProgressState) {
        for (_, pb) in state.kind_bars.drain() {
            if !pb.is_finished() {
                pb.finish();
            }
        }
        if let Some(pb) = state.phase_bar.take()
            && !pb.is_finished()
        {
            pb.finish();
        }
    }

    fn summary_message(summary: &KindSummary) -> String {
        if summary.failed > 0 {
            format!(
                "✓ {} new, {} known, {} failed",
                summary.added, summary.skipped, summary.failed
            )
        } else {
            format!("✓ {} new, {} known", summary.added, summary.skipped)
        }
    }

    fn spinner_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn counter_style() -> ProgressStyle {
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.cyan} {spinner:.green} {pos:>6} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos:>6}/{len:6} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░")
    }
}

impl Default for InteractiveReporter {
    fn default() -> Self {
        Self::new()
    }
}
