//! File-tree backend.
//!
//! Layout below the store root:
//!
//! ```text
//! <root>/<owner>_<repo>/info.json
//! <root>/<owner>_<repo>/stats.json
//! <root>/<owner>_<repo>/<collection>/<key>.json
//! ```
//!
//! Files hold UTF-8 JSON with keys sorted at every level, so re-writing an
//! unchanged entity produces identical bytes.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};

use super::error::{Result, StoreError};
use super::{ProjectStore, Record, WriteMode};
use crate::model::{Entity, EntityKey, EntityKind, RepoId};
use crate::project::Project;

const INFO_FILE: &str = "info.json";
const STATS_FILE: &str = "stats.json";
const JSON_EXTENSION: &str = "json";
const INDENT: &[u8] = b"   ";

/// Stores each repository as a directory of JSON files.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    mode: WriteMode,
}

impl FileStore {
    /// A write-through store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mode: WriteMode::WriteThrough,
        }
    }

    #[must_use]
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding everything stored for `repo`.
    pub fn repo_dir(&self, repo: &RepoId) -> PathBuf {
        self.root.join(repo.storage_name())
    }

    fn entity_path(&self, repo: &RepoId, kind: EntityKind, key: &EntityKey) -> PathBuf {
        self.repo_dir(repo)
            .join(kind.collection())
            .join(format!("{key}.{JSON_EXTENSION}"))
    }

    async fn write_record(&self, repo: &RepoId, project: &Project, record: Record<'_>) -> Result<()> {
        let (path, entity) = match record {
            Record::Info => (self.repo_dir(repo).join(INFO_FILE), project.info()),
            Record::Stats => (self.repo_dir(repo).join(STATS_FILE), project.stats()),
            Record::Entity(kind, key) => {
                (self.entity_path(repo, kind, key), project.get(kind, key))
            }
        };
        match entity {
            Some(entity) => write_json(&path, entity).await,
            None => {
                tracing::debug!(path = %path.display(), "Record not in project, nothing to write");
                Ok(())
            }
        }
    }

    async fn write_all(&self, repo: &RepoId, project: &Project) -> Result<usize> {
        let mut written = 0;
        if project.info_exists() {
            self.write_record(repo, project, Record::Info).await?;
            written += 1;
        }
        if project.stats_exists() {
            self.write_record(repo, project, Record::Stats).await?;
            written += 1;
        }
        for kind in EntityKind::ALL {
            for (key, entity) in project.entities(kind) {
                write_json(&self.entity_path(repo, kind, key), entity).await?;
                written += 1;
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl ProjectStore for FileStore {
    fn name(&self) -> &'static str {
        "files"
    }

    fn write_mode(&self) -> WriteMode {
        self.mode
    }

    async fn load(&self, repo: &RepoId) -> Result<Project> {
        let dir = self.repo_dir(repo);
        let mut project = Project::new();

        if let Some(info) = read_entity(&dir.join(INFO_FILE)).await? {
            project.add_info(info);
        }
        if let Some(stats) = read_entity(&dir.join(STATS_FILE)).await? {
            project.add_stats(stats);
        }

        for kind in EntityKind::ALL {
            let collection_dir = dir.join(kind.collection());
            for path in json_files(&collection_dir).await? {
                if let Some(entity) = read_entity(&path).await? {
                    project.add(kind, entity);
                }
            }
        }

        tracing::debug!(
            repo = %repo,
            dir = %dir.display(),
            info = project.info_exists(),
            "Loaded project from files"
        );
        Ok(project)
    }

    async fn exists(&self, repo: &RepoId) -> Result<bool> {
        let path = self.repo_dir(repo).join(INFO_FILE);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StoreError::io(path, e))
    }

    async fn persist(&self, repo: &RepoId, project: &Project, record: Record<'_>) -> Result<()> {
        match self.mode {
            WriteMode::WriteThrough => self.write_record(repo, project, record).await,
            WriteMode::Buffered => Ok(()),
        }
    }

    async fn finalize(&self, repo: &RepoId, project: &Project) -> Result<()> {
        if self.mode == WriteMode::WriteThrough {
            return Ok(());
        }
        let written = self.write_all(repo, project).await?;
        tracing::info!(repo = %repo, files = written, "Flushed project to disk");
        Ok(())
    }
}

/// Copy of `value` with object keys sorted at every depth.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), sorted(v)))
                    .collect::<Map<_, _>>(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        other => other.clone(),
    }
}

fn encode(entity: &Entity) -> Result<Vec<u8>> {
    let value = sorted(&Value::Object(entity.as_map().clone()));
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(INDENT));
    value.serialize(&mut ser)?;
    Ok(buf)
}

/// Write `entity` to `path` through a temporary sibling, so a crash never
/// leaves a half-written file behind.
async fn write_json(path: &Path, entity: &Entity) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    let bytes = encode(entity)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| StoreError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::io(path, e))
}

async fn read_entity(path: &Path) -> Result<Option<Entity>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(path, e)),
    };
    let value: Value = serde_json::from_slice(&bytes)?;
    let entity = Entity::from_value(value);
    if entity.is_none() {
        tracing::warn!(path = %path.display(), "Stored file is not a JSON object, ignoring");
    }
    Ok(entity)
}

/// `*.json` files directly inside `dir`, empty if `dir` does not exist.
async fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(dir, e))? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == JSON_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
