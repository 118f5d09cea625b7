//! Source-code mirroring through an external `git` executable.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Errors from running the VCS executable.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while reading {program} output: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {command} exited with {status}")]
    ExitStatus {
        program: String,
        command: &'static str,
        status: ExitStatus,
    },
}

pub type Result<T> = std::result::Result<T, VcsError>;

/// What [`GitMirror::mirror`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAction {
    Cloned,
    Pulled,
}

/// Clones and updates working copies with `git`.
#[derive(Debug, Clone)]
pub struct GitMirror {
    executable: PathBuf,
}

impl Default for GitMirror {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitMirror {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// True iff `path` holds a git working copy.
    pub fn repo_exists(&self, path: &Path) -> bool {
        path.join(".git").is_dir()
    }

    /// `git clone <url> <path>`.
    pub async fn clone(&self, url: &str, path: &Path) -> Result<()> {
        let mut command = Command::new(&self.executable);
        command.arg("clone").arg(url).arg(path);
        self.run("clone", command).await
    }

    /// `git pull`, run inside `path`.
    pub async fn pull(&self, path: &Path) -> Result<()> {
        let mut command = Command::new(&self.executable);
        command.arg("pull").current_dir(path);
        self.run("pull", command).await
    }

    /// Pull `path` if it is already a working copy, otherwise clone `url` into it.
    pub async fn mirror(&self, url: &str, path: &Path) -> Result<MirrorAction> {
        if self.repo_exists(path) {
            self.pull(path).await?;
            Ok(MirrorAction::Pulled)
        } else {
            self.clone(url, path).await?;
            Ok(MirrorAction::Cloned)
        }
    }

    /// Run `command`, logging each line it prints on stdout or stderr.
    async fn run(&self, name: &'static str, mut command: Command) -> Result<()> {
        let program = self.executable.display().to_string();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(program = %program, command = name, "Running VCS command");
        let mut child = command.spawn().map_err(|source| VcsError::Spawn {
            program: program.clone(),
            source,
        })?;

        let (out, err) = tokio::join!(
            log_lines(child.stdout.take(), name),
            log_lines(child.stderr.take(), name)
        );
        out.and(err).map_err(|source| VcsError::Io {
            program: program.clone(),
            source,
        })?;

        let status = child.wait().await.map_err(|source| VcsError::Io {
            program: program.clone(),
            source,
        })?;
        if status.success() {
            Ok(())
        } else {
            Err(VcsError::ExitStatus {
                program,
                command: name,
                status,
            })
        }
    }
}

async fn log_lines<R: AsyncRead + Unpin>(
    reader: Option<R>,
    command: &'static str,
) -> std::io::Result<()> {
    let Some(reader) = reader else {
        return Ok(());
    };
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end();
        if !line.is_empty() {
            tracing::info!(command, "{line}");
        }
    }
    Ok(())
}
