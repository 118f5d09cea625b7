//! Integration tests for the database store.
//!
//! These tests require the `sqlite` and `migrate` features to be enabled
//! and use an in-memory SQLite database.

#![cfg(all(feature = "sqlite", feature = "migrate"))]

use ghmirror::entity::document::{Column, Entity as Document};
use ghmirror::model::{Entity, EntityKey, EntityKind, RepoId};
use ghmirror::project::Project;
use ghmirror::store::{DatabaseStore, ProjectStore, Record, WriteMode};
use ghmirror::connect_and_migrate;
use ghmirror::entity::document::Model;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use serde_json::json;

/// Create an in-memory SQLite database with migrations applied.
async fn setup_test_db() -> DatabaseConnection {
    connect_and_migrate("sqlite::memory:")
        .await
        .expect("Failed to create test database")
}

fn entity(value: serde_json::Value) -> Entity {
    Entity::from_value(value).expect("object")
}

/// A project with info, stats and one entity of every kind.
fn project(info_id: i64) -> Project {
    let mut project = Project::new();
    project.add_info(entity(json!({"id": info_id, "ETag": "\"e1\""})));
    project.add_stats(entity(json!({"issues": 1, "contributors": 1})));
    project.add(EntityKind::Issue, entity(json!({"id": 1, "number": 1, "title": "bug"})));
    project.add(EntityKind::IssueComment, entity(json!({"id": 2})));
    project.add(EntityKind::IssueEvent, entity(json!({"id": 3})));
    project.add(EntityKind::Commit, entity(json!({"sha": "abc"})));
    project.add(EntityKind::CommitComment, entity(json!({"id": 4})));
    project.add(EntityKind::Contributor, entity(json!({"id": 42, "login": "octo"})));
    project
}

async fn count(db: &DatabaseConnection, collection: &str) -> u64 {
    Document::find()
        .filter(Column::Collection.eq(collection))
        .count(db)
        .await
        .expect("count")
}

async fn rows(db: &DatabaseConnection) -> Vec<Model> {
    Document::find()
        .order_by_asc(Column::Collection)
        .order_by_asc(Column::DocKey)
        .all(db)
        .await
        .expect("rows")
}

#[tokio::test]
async fn test_finalize_then_load_round_trips() {
    let store = DatabaseStore::new(setup_test_db().await);
    let repo = RepoId::new("a", "x");
    let original = project(77);

    assert!(!store.exists(&repo).await.expect("exists"));
    store.finalize(&repo, &original).await.expect("finalize");

    assert!(store.exists(&repo).await.expect("exists"));
    let loaded = store.load(&repo).await.expect("load");
    assert_eq!(loaded, original);
}

#[tokio::test]
async fn test_contributors_do_not_collide_across_repositories() {
    let store = DatabaseStore::new(setup_test_db().await);
    let a = RepoId::new("a", "x");
    let b = RepoId::new("b", "y");

    store.finalize(&a, &project(1)).await.expect("finalize a");
    store.finalize(&b, &project(2)).await.expect("finalize b");

    let keys: Vec<String> = Document::find()
        .filter(Column::Collection.eq("contributors"))
        .all(store.connection())
        .await
        .expect("contributors")
        .into_iter()
        .map(|doc| doc.doc_key)
        .collect();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&"a_x___42".to_string()));
    assert!(keys.contains(&"b_y___42".to_string()));

    let loaded_a = store.load(&a).await.expect("load a");
    assert!(loaded_a.contains_key(EntityKind::Contributor, &EntityKey::Id(42)));
    assert_eq!(loaded_a.info().and_then(Entity::id), Some(1));
}

#[tokio::test]
async fn test_repeated_finalize_keeps_one_document_per_key() {
    let store = DatabaseStore::new(setup_test_db().await).with_batch_size(3);
    let repo = RepoId::new("a", "x");

    for _ in 0..3 {
        store.finalize(&repo, &project(77)).await.expect("finalize");
    }

    for collection in ["projects", "stats", "issues", "commits", "contributors"] {
        assert_eq!(count(store.connection(), collection).await, 1, "{collection}");
    }
}

#[tokio::test]
async fn test_refinalizing_unchanged_project_leaves_rows_untouched() {
    let store = DatabaseStore::new(setup_test_db().await).with_batch_size(3);
    let repo = RepoId::new("a", "x");

    store.finalize(&repo, &project(1)).await.expect("finalize");
    let before = rows(store.connection()).await;

    let reloaded = store.load(&repo).await.expect("load");
    store.finalize(&repo, &reloaded).await.expect("finalize again");
    let after = rows(store.connection()).await;

    assert_eq!(before.len(), 8);
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_upsert_replaces_changed_body() {
    let store = DatabaseStore::new(setup_test_db().await);
    let repo = RepoId::new("a", "x");
    let mut current = project(77);
    store.finalize(&repo, &current).await.expect("finalize");

    current.add(
        EntityKind::Issue,
        entity(json!({"id": 1, "number": 1, "title": "bug", "state": "closed"})),
    );
    store.finalize(&repo, &current).await.expect("finalize");

    let loaded = store.load(&repo).await.expect("load");
    let issue = loaded
        .get(EntityKind::Issue, &EntityKey::Id(1))
        .expect("issue");
    assert_eq!(issue.get("state"), Some(&json!("closed")));
}

#[tokio::test]
async fn test_upsert_touches_only_changed_rows() {
    let store = DatabaseStore::new(setup_test_db().await);
    let repo = RepoId::new("a", "x");
    let mut current = project(77);
    store.finalize(&repo, &current).await.expect("finalize");
    let before = rows(store.connection()).await;

    current.add(
        EntityKind::Issue,
        entity(json!({"id": 1, "number": 1, "title": "bug", "state": "closed"})),
    );
    store.finalize(&repo, &current).await.expect("finalize");
    let after = rows(store.connection()).await;

    let (changed, unchanged): (Vec<_>, Vec<_>) = before
        .iter()
        .zip(&after)
        .partition(|(old, _)| old.collection == "issues");
    assert!(changed.iter().all(|(old, new)| old.body != new.body));
    assert!(unchanged.iter().all(|(old, new)| old == new));
}

#[tokio::test]
async fn test_write_through_mode_persists_immediately() {
    let store = DatabaseStore::new(setup_test_db().await).with_write_mode(WriteMode::WriteThrough);
    let repo = RepoId::new("a", "x");
    let project = project(77);

    store.persist(&repo, &project, Record::Info).await.expect("info");
    store
        .persist(&repo, &project, Record::Entity(EntityKind::Commit, &EntityKey::Sha("abc".into())))
        .await
        .expect("commit");

    assert!(store.exists(&repo).await.expect("exists"));
    assert_eq!(count(store.connection(), "commits").await, 1);
    assert_eq!(count(store.connection(), "issues").await, 0);
}

#[tokio::test]
async fn test_unknown_repository_loads_empty() {
    let store = DatabaseStore::new(setup_test_db().await);
    store
        .finalize(&RepoId::new("a", "x"), &project(77))
        .await
        .expect("finalize");

    let other = store.load(&RepoId::new("c", "z")).await.expect("load");
    assert_eq!(other, Project::new());
}
