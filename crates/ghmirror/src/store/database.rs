//! Database backend.
//!
//! All repositories share the `documents` table. Each row is one JSON
//! document named by `(collection, doc_key)` and tagged with the owning
//! repository's storage name, so one database can hold many mirrors.
//!
//! Writes are batched upserts (`INSERT ... ON CONFLICT DO UPDATE`) sent in
//! groups of `batch_size`. Groups are independent: a failure part way through
//! a flush leaves the earlier groups written.
//!
//! A conflicting row is only updated when its body differs, so flushing an
//! unchanged project leaves every stored row, `fetched_at` included, as it was.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set};

use super::error::{Result, StoreError};
use super::{ProjectStore, Record, WriteMode};
use crate::entity::document::{ActiveModel, Column, Entity as Document};
use crate::model::{CONTRIBUTOR_KEY_SEPARATOR, Entity, EntityKey, EntityKind, RepoId};
use crate::project::Project;

/// Collection holding repository info records.
pub const INFO_COLLECTION: &str = "projects";

/// Collection holding repository statistics.
pub const STATS_COLLECTION: &str = "stats";

/// Default number of documents per upsert statement.
pub const DEFAULT_BULK_BATCH_SIZE: usize = 1000;

/// Default number of retry attempts for a failed upsert group.
pub const DEFAULT_UPSERT_RETRIES: u32 = 3;

/// Default initial backoff delay in milliseconds for upsert retries.
pub const DEFAULT_UPSERT_BACKOFF_MS: u64 = 100;

/// Document key for an entity of `kind` owned by `repo`.
///
/// Contributor ids are user ids and repeat across repositories, so their keys
/// carry the repository tag: contributor `42` of `a/x` is `a_x___42`.
pub fn document_key(repo: &RepoId, kind: EntityKind, key: &EntityKey) -> String {
    match kind {
        EntityKind::Contributor => {
            format!("{}{CONTRIBUTOR_KEY_SEPARATOR}{key}", repo.storage_name())
        }
        _ => key.to_string(),
    }
}

/// Stores repositories as rows of the `documents` table.
#[derive(Debug)]
pub struct DatabaseStore {
    db: DatabaseConnection,
    mode: WriteMode,
    batch_size: usize,
    max_retries: u32,
    initial_backoff_ms: u64,
}

impl DatabaseStore {
    /// A buffered store over an already migrated connection.
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            mode: WriteMode::Buffered,
            batch_size: DEFAULT_BULK_BATCH_SIZE,
            max_retries: DEFAULT_UPSERT_RETRIES,
            initial_backoff_ms: DEFAULT_UPSERT_BACKOFF_MS,
        }
    }

    #[must_use]
    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Documents per upsert statement. Zero is treated as one.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Retry policy for failed upsert groups. `max_retries = 0` disables retries.
    #[must_use]
    pub fn with_retry(mut self, max_retries: u32, initial_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn into_connection(self) -> DatabaseConnection {
        self.db
    }

    fn record_document(
        repo: &RepoId,
        project: &Project,
        record: Record<'_>,
        now: DateTime<FixedOffset>,
    ) -> Option<ActiveModel> {
        let singleton_key = || {
            project
                .info()
                .and_then(Entity::id)
                .map_or_else(|| repo.storage_name(), |id| id.to_string())
        };
        match record {
            Record::Info => project
                .info()
                .map(|info| document(repo, INFO_COLLECTION, singleton_key(), info, now)),
            Record::Stats => project
                .stats()
                .map(|stats| document(repo, STATS_COLLECTION, singleton_key(), stats, now)),
            Record::Entity(kind, key) => project.get(kind, key).map(|entity| {
                document(repo, kind.collection(), document_key(repo, kind, key), entity, now)
            }),
        }
    }

    fn project_documents(repo: &RepoId, project: &Project) -> Vec<ActiveModel> {
        let now = Utc::now().fixed_offset();
        let mut documents: Vec<ActiveModel> = [Record::Info, Record::Stats]
            .into_iter()
            .filter_map(|record| Self::record_document(repo, project, record, now))
            .collect();
        for kind in EntityKind::ALL {
            documents.extend(project.entities(kind).map(|(key, entity)| {
                document(repo, kind.collection(), document_key(repo, kind, key), entity, now)
            }));
        }
        documents
    }

    async fn upsert(&self, documents: Vec<ActiveModel>) -> Result<u64> {
        let mut written = 0;
        for group in documents.chunks(self.batch_size) {
            written += upsert_with_retry(
                &self.db,
                group.to_vec(),
                self.max_retries,
                self.initial_backoff_ms,
            )
            .await?;
        }
        Ok(written)
    }
}

fn document(
    repo: &RepoId,
    collection: &str,
    doc_key: String,
    entity: &Entity,
    now: DateTime<FixedOffset>,
) -> ActiveModel {
    ActiveModel {
        collection: Set(collection.to_string()),
        doc_key: Set(doc_key),
        repo_name: Set(repo.storage_name()),
        body: Set(entity.clone().into_value()),
        fetched_at: Set(now),
    }
}

/// Compared as text: PostgreSQL has no equality operator for `json`.
const BODY_CHANGED: &str = "CAST(documents.body AS TEXT) <> CAST(excluded.body AS TEXT)";

fn upsert_on_conflict() -> OnConflict {
    OnConflict::columns([Column::Collection, Column::DocKey])
        .update_columns([Column::RepoName, Column::Body, Column::FetchedAt])
        .action_and_where(Expr::cust(BODY_CHANGED))
        .to_owned()
}

/// Upsert one group, retrying transient errors with exponential backoff.
async fn upsert_with_retry(
    db: &DatabaseConnection,
    documents: Vec<ActiveModel>,
    max_retries: u32,
    initial_backoff_ms: u64,
) -> Result<u64> {
    if documents.is_empty() {
        return Ok(0);
    }

    let mut attempt = 0;
    let mut backoff_ms = initial_backoff_ms;

    loop {
        match Document::insert_many(documents.clone())
            .on_conflict(upsert_on_conflict())
            .exec_without_returning(db)
            .await
        {
            Ok(rows) => return Ok(rows),
            Err(e) if attempt < max_retries && is_retryable_db_error(&e) => {
                attempt += 1;
                tracing::warn!(
                    attempt,
                    max_retries,
                    backoff_ms,
                    documents = documents.len(),
                    error = %e,
                    "Upsert failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms = backoff_ms.saturating_mul(2);
            }
            Err(e) => return Err(StoreError::Database(e)),
        }
    }
}

/// Whether a database error is transient: lock contention or a dropped
/// connection.
fn is_retryable_db_error(err: &DbErr) -> bool {
    match err {
        DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
        DbErr::Exec(_) | DbErr::Query(_) => {
            let err_str = err.to_string().to_lowercase();
            err_str.contains("locked")
                || err_str.contains("busy")
                || err_str.contains("timeout")
                || err_str.contains("connection")
                || err_str.contains("temporarily unavailable")
        }
        _ => false,
    }
}

#[async_trait]
impl ProjectStore for DatabaseStore {
    fn name(&self) -> &'static str {
        "database"
    }

    fn write_mode(&self) -> WriteMode {
        self.mode
    }

    async fn load(&self, repo: &RepoId) -> Result<Project> {
        let rows = Document::find()
            .filter(Column::RepoName.eq(repo.storage_name()))
            .all(&self.db)
            .await?;

        let mut project = Project::new();
        for row in rows {
            let Some(entity) = Entity::from_value(row.body) else {
                tracing::warn!(
                    collection = %row.collection,
                    doc_key = %row.doc_key,
                    "Stored document is not a JSON object, ignoring"
                );
                continue;
            };
            match row.collection.as_str() {
                INFO_COLLECTION => project.add_info(entity),
                STATS_COLLECTION => project.add_stats(entity),
                other => match EntityKind::from_collection(other) {
                    Some(kind) => {
                        project.add(kind, entity);
                    }
                    None => {
                        tracing::warn!(collection = other, "Unknown collection, ignoring");
                    }
                },
            }
        }

        tracing::debug!(repo = %repo, info = project.info_exists(), "Loaded project from database");
        Ok(project)
    }

    async fn exists(&self, repo: &RepoId) -> Result<bool> {
        let info = Document::find()
            .filter(Column::RepoName.eq(repo.storage_name()))
            .filter(Column::Collection.eq(INFO_COLLECTION))
            .one(&self.db)
            .await?;
        Ok(info.is_some())
    }

    async fn persist(&self, repo: &RepoId, project: &Project, record: Record<'_>) -> Result<()> {
        if self.mode == WriteMode::Buffered {
            return Ok(());
        }
        let now = Utc::now().fixed_offset();
        if let Some(document) = Self::record_document(repo, project, record, now) {
            self.upsert(vec![document]).await?;
        }
        Ok(())
    }

    async fn finalize(&self, repo: &RepoId, project: &Project) -> Result<()> {
        if self.mode == WriteMode::WriteThrough {
            return Ok(());
        }
        let documents = Self::project_documents(repo, project);
        let total = documents.len();
        let written = self.upsert(documents).await?;
        tracing::info!(
            repo = %repo,
            documents = total,
            rows = written,
            batch_size = self.batch_size,
            "Flushed project to database"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, RuntimeErr};
    use serde_json::json;

    use crate::entity::document::Model;

    fn entity(value: serde_json::Value) -> Entity {
        Entity::from_value(value).expect("object")
    }

    fn exec_ok(rows: u64) -> MockExecResult {
        MockExecResult {
            rows_affected: rows,
            last_insert_id: 0,
        }
    }

    fn sample_project() -> Project {
        let mut project = Project::new();
        project.add_info(entity(json!({"id": 77, "full_name": "a/x"})));
        project.add_stats(entity(json!({"issues": 1})));
        project.add(EntityKind::Issue, entity(json!({"id": 10})));
        project.add(EntityKind::Commit, entity(json!({"sha": "abc"})));
        project.add(EntityKind::Contributor, entity(json!({"id": 42, "login": "octo"})));
        project
    }

    fn statements(db: DatabaseConnection) -> Vec<String> {
        db.into_transaction_log()
            .into_iter()
            .map(|t| format!("{t:?}"))
            .collect()
    }

    #[test]
    fn contributor_keys_carry_the_repository() {
        let key = EntityKey::Id(42);
        let a = document_key(&RepoId::new("a", "x"), EntityKind::Contributor, &key);
        let b = document_key(&RepoId::new("b", "y"), EntityKind::Contributor, &key);
        assert_eq!(a, "a_x___42");
        assert_eq!(b, "b_y___42");
        assert_ne!(a, b);

        assert_eq!(document_key(&RepoId::new("a", "x"), EntityKind::Issue, &key), "42");
        assert_eq!(
            document_key(&RepoId::new("a", "x"), EntityKind::Commit, &EntityKey::Sha("abc".into())),
            "abc"
        );
    }

    #[test]
    fn singletons_are_keyed_by_info_id() {
        let now = Utc::now().fixed_offset();
        let repo = RepoId::new("a", "x");
        let project = sample_project();

        let stats = DatabaseStore::record_document(&repo, &project, Record::Stats, now)
            .expect("stats document");
        assert_eq!(stats.collection, Set(STATS_COLLECTION.to_string()));
        assert_eq!(stats.doc_key, Set("77".to_string()));
        assert_eq!(stats.repo_name, Set("a_x".to_string()));

        let missing = DatabaseStore::record_document(
            &repo,
            &project,
            Record::Entity(EntityKind::IssueEvent, &EntityKey::Id(1)),
            now,
        );
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn buffered_persist_touches_nothing() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite).into_connection();
        let store = DatabaseStore::new(db);

        store
            .persist(&RepoId::new("a", "x"), &sample_project(), Record::Info)
            .await
            .expect("persist");
        assert!(statements(store.into_connection()).is_empty());
    }

    #[tokio::test]
    async fn finalize_upserts_in_groups() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([exec_ok(2), exec_ok(2), exec_ok(1)])
            .into_connection();
        let store = DatabaseStore::new(db).with_batch_size(2);

        store
            .finalize(&RepoId::new("a", "x"), &sample_project())
            .await
            .expect("finalize");

        let log = statements(store.into_connection());
        assert_eq!(log.len(), 3);
        assert!(log.iter().all(|s| s.contains("ON CONFLICT")));
        assert!(log.iter().any(|s| s.contains("a_x___42")));
    }

    #[tokio::test]
    async fn upsert_only_updates_changed_bodies() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([exec_ok(1)])
            .into_connection();
        let store = DatabaseStore::new(db).with_write_mode(WriteMode::WriteThrough);

        store
            .persist(&RepoId::new("a", "x"), &sample_project(), Record::Info)
            .await
            .expect("persist");

        let log = statements(store.into_connection());
        assert_eq!(log.len(), 1);
        assert!(log[0].contains(BODY_CHANGED), "{}", log[0]);
    }

    #[tokio::test]
    async fn write_through_persists_one_document() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_results([exec_ok(1)])
            .into_connection();
        let store = DatabaseStore::new(db).with_write_mode(WriteMode::WriteThrough);
        let repo = RepoId::new("a", "x");
        let project = sample_project();

        store
            .persist(&repo, &project, Record::Entity(EntityKind::Contributor, &EntityKey::Id(42)))
            .await
            .expect("persist");
        store.finalize(&repo, &project).await.expect("finalize");

        let log = statements(store.into_connection());
        assert_eq!(log.len(), 1);
        assert!(log[0].contains("contributors"));
    }

    #[tokio::test]
    async fn transient_errors_are_retried() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_errors([DbErr::Conn(RuntimeErr::Internal(
                "temporarily unavailable".to_string(),
            ))])
            .append_exec_results([exec_ok(5)])
            .into_connection();
        let store = DatabaseStore::new(db).with_retry(1, 0);

        store
            .finalize(&RepoId::new("a", "x"), &sample_project())
            .await
            .expect("should succeed after retry");
    }

    #[tokio::test]
    async fn permanent_errors_fail_the_flush() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_exec_errors([DbErr::Custom("constraint".to_string())])
            .into_connection();
        let store = DatabaseStore::new(db).with_retry(3, 0);

        let err = store
            .finalize(&RepoId::new("a", "x"), &sample_project())
            .await
            .expect_err("custom errors are not retried");
        assert!(matches!(err, StoreError::Database(_)));
    }

    #[tokio::test]
    async fn load_rebuilds_project_from_rows() {
        let now = Utc::now().fixed_offset();
        let row = |collection: &str, doc_key: &str, body: serde_json::Value| Model {
            collection: collection.to_string(),
            doc_key: doc_key.to_string(),
            repo_name: "a_x".to_string(),
            body,
            fetched_at: now,
        };
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([vec![
                row("projects", "77", json!({"id": 77})),
                row("stats", "77", json!({"issues": 1})),
                row("contributors", "a_x___42", json!({"id": 42})),
                row("commits", "abc", json!({"sha": "abc"})),
                row("wiki", "1", json!({"id": 1})),
            ]])
            .into_connection();
        let store = DatabaseStore::new(db);

        let project = store.load(&RepoId::new("a", "x")).await.expect("load");
        assert_eq!(project.info().and_then(Entity::id), Some(77));
        assert!(project.stats_exists());
        assert!(project.contains_key(EntityKind::Contributor, &EntityKey::Id(42)));
        assert!(project.contains_key(EntityKind::Commit, &EntityKey::Sha("abc".into())));
        assert_eq!(project.count(EntityKind::Issue), 0);
    }

    #[tokio::test]
    async fn exists_checks_for_an_info_document() {
        let db = MockDatabase::new(DatabaseBackend::Sqlite)
            .append_query_results([Vec::<Model>::new()])
            .into_connection();
        let store = DatabaseStore::new(db);

        assert!(!store.exists(&RepoId::new("a", "x")).await.expect("exists"));
    }

    #[test]
    fn retryable_errors_are_classified() {
        assert!(is_retryable_db_error(&DbErr::Conn(RuntimeErr::Internal(
            "reset".to_string()
        ))));
        assert!(!is_retryable_db_error(&DbErr::Custom("locked".to_string())));
    }
}
