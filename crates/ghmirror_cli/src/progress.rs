//! Progress reporting for sync operations.
//!
//! This module provides two modes of progress reporting:
//! - Interactive mode (TTY, verbosity 2): one progress bar per entity kind
//! - Logging mode: structured logging using tracing
//!
//! In logging mode the verbosity level is applied by the tracing filter set up
//! in `main`, so phase lines simply go quiet at verbosity 0.

mod interactive;
mod logging;

use std::sync::Arc;

use console::Term;
use ghmirror::sync::{ProgressCallback, SyncProgress};

pub use interactive::InteractiveReporter;
pub use logging::LoggingReporter;

/// Verbosity at which progress bars replace log lines.
pub const BARS_VERBOSITY: u8 = 2;

/// Progress reporter that handles both interactive and logging modes.
pub enum ProgressReporter {
    /// Interactive progress bars for TTY.
    Interactive(InteractiveReporter),
    /// Structured logging for non-TTY (CI, pipes) or lower verbosity.
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Pick a reporter for `verbose`. Only level 2 draws bars, and only when
    /// stdout is a terminal.
    pub fn for_verbosity(verbose: u8) -> Self {
        if verbose == BARS_VERBOSITY && Term::stdout().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    /// Handle a progress event.
    pub fn handle(&self, event: SyncProgress) {
        match self {
            Self::Interactive(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Convert to a ProgressCallback for the library.
    pub fn as_callback(self: &Arc<Self>) -> ProgressCallback {
        let reporter = Arc::clone(self);
        Box::new(move |event| {
            reporter.handle(event);
        })
    }

    /// Finish all progress bars (interactive mode only).
    pub fn finish(&self) {
        if let Self::Interactive(r) = self {
            r.finish();
        }
    }
}
