//! End-to-end sync tests against a scripted GitHub.
//!
//! The transport below serves canned responses keyed by URL, so whole syncs
//! run without the network. Database scenarios use an in-memory SQLite
//! database and require the `sqlite` and `migrate` features.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ghmirror::github::GitHubClient;
use ghmirror::http::{HttpError, HttpRequest, HttpResponse, HttpTransport};
use ghmirror::model::{EntityKey, EntityKind, RepoId};
use ghmirror::store::{FileStore, ProjectStore};
use ghmirror::sync::{SyncOptions, sync_repository};
use serde_json::{Value, json};
use tempfile::TempDir;

const API: &str = "https://api.github.com";

/// Maximum wall time for one sync. Exceeding it means the sync hung.
const SYNC_TIMEOUT: Duration = Duration::from_secs(10);

/// Serves the same response for a URL every time it is requested.
///
/// Unknown URLs get a 404, like a repository without that resource.
#[derive(Clone, Default)]
struct ScriptedGitHub {
    routes: Arc<Mutex<HashMap<String, HttpResponse>>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGitHub {
    fn route(&self, url: impl Into<String>, headers: &[(&str, String)], body: Value) {
        let response = HttpResponse {
            status: 200,
            headers: headers
                .iter()
                .map(|(k, v)| ((*k).to_string(), v.clone()))
                .collect(),
            body: serde_json::to_vec(&body).expect("serialize body"),
        };
        self.routes
            .lock()
            .expect("routes lock")
            .insert(url.into(), response);
    }

    /// A repository whose list endpoints return `lists` (empty otherwise).
    fn repository(&self, repo: &RepoId, id: i64, lists: &[(EntityKind, Value)]) {
        let base = repo.api_url(API);
        self.route(&base, &[], json!({"id": id, "full_name": repo.full_name()}));
        for kind in EntityKind::ALL {
            let mut url = format!("{base}/{}?", kind.endpoint());
            for (k, v) in kind.list_params() {
                url.push_str(&format!("{k}={v}&"));
            }
            url.push_str("per_page=100");
            let body = lists
                .iter()
                .find(|(k, _)| *k == kind)
                .map_or_else(|| json!([]), |(_, body)| body.clone());
            self.route(url, &[], body);
        }
    }

    fn requests(&self) -> Vec<String> {
        self.log.lock().expect("log lock").clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedGitHub {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.log
            .lock()
            .expect("log lock")
            .push(request.url.clone());
        let routes = self.routes.lock().expect("routes lock");
        Ok(routes.get(&request.url).cloned().unwrap_or_else(|| HttpResponse {
            status: 404,
            headers: Vec::new(),
            body: br#"{"message": "Not Found"}"#.to_vec(),
        }))
    }
}

fn client(github: &ScriptedGitHub) -> GitHubClient {
    GitHubClient::new("test-token", Arc::new(github.clone()))
}

fn metadata_only() -> SyncOptions {
    SyncOptions {
        issues_full: false,
        commits_full: false,
        ..SyncOptions::default()
    }
}

#[tokio::test]
async fn test_file_sync_mirrors_every_collection() {
    let github = ScriptedGitHub::default();
    let repo = RepoId::new("octo", "hello");
    github.repository(
        &repo,
        1,
        &[
            (EntityKind::Issue, json!([{"id": 11, "number": 1}])),
            (EntityKind::IssueComment, json!([{"id": 12}])),
            (EntityKind::IssueEvent, json!([{"id": 13}])),
            (EntityKind::Commit, json!([{"sha": "c0ffee"}])),
            (EntityKind::CommitComment, json!([{"id": 14}])),
            (EntityKind::Contributor, json!([{"id": 15, "login": "octo"}])),
        ],
    );
    let dir = TempDir::new().expect("tempdir");
    let store = FileStore::new(dir.path());

    let result = tokio::time::timeout(
        SYNC_TIMEOUT,
        sync_repository(&client(&github), &store, &repo, &metadata_only(), None),
    )
    .await
    .expect("sync should not hang")
    .expect("sync");

    assert_eq!(result.added(), 6);
    for path in [
        "octo_hello/info.json",
        "octo_hello/stats.json",
        "octo_hello/issues/11.json",
        "octo_hello/issueComments/12.json",
        "octo_hello/issueEvents/13.json",
        "octo_hello/commits/c0ffee.json",
        "octo_hello/commitComments/14.json",
        "octo_hello/contributors/15.json",
    ] {
        assert!(dir.path().join(path).is_file(), "{path} missing");
    }
}

#[tokio::test]
async fn test_missing_resources_count_as_empty() {
    let github = ScriptedGitHub::default();
    let repo = RepoId::new("octo", "sparse");
    github.route(repo.api_url(API), &[], json!({"id": 2}));
    let dir = TempDir::new().expect("tempdir");
    let store = FileStore::new(dir.path());

    let result = sync_repository(&client(&github), &store, &repo, &metadata_only(), None)
        .await
        .expect("404 list endpoints are not fatal");

    assert_eq!(result.added(), 0);
    let project = store.load(&repo).await.expect("load");
    let stats = project.stats().expect("stats");
    assert_eq!(stats.get("issues"), Some(&json!(0)));
    assert_eq!(stats.get("contributors"), Some(&json!(0)));
}

#[tokio::test(start_paused = true)]
async fn test_low_quota_pauses_until_reset() {
    let github = ScriptedGitHub::default();
    let repo = RepoId::new("octo", "busy");
    github.repository(&repo, 3, &[(EntityKind::Issue, json!([{"id": 1, "number": 1}]))]);
    let reset = Utc::now().timestamp() + 30;
    github.route(
        repo.api_url(API),
        &[
            ("x-ratelimit-remaining", "7".to_string()),
            ("x-ratelimit-reset", reset.to_string()),
        ],
        json!({"id": 3}),
    );
    let dir = TempDir::new().expect("tempdir");
    let store = FileStore::new(dir.path());
    let options = SyncOptions {
        issue_comments: false,
        issue_events: false,
        commits: false,
        commit_comments: false,
        contributors: false,
        ..metadata_only()
    };

    let start = tokio::time::Instant::now();
    sync_repository(&client(&github), &store, &repo, &options, None)
        .await
        .expect("sync");

    // Reset in ~30s plus the 60s safety margin before anything else is sent.
    assert!(start.elapsed() >= Duration::from_secs(85), "{:?}", start.elapsed());
    let after_info = &github.requests()[1..];
    assert!(!after_info.is_empty());
}

#[cfg(all(feature = "sqlite", feature = "migrate"))]
mod database {
    use super::*;
    use ghmirror::connect_and_migrate;
    use ghmirror::entity::document::{Column, Entity as Document, Model};
    use ghmirror::store::DatabaseStore;
    use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

    #[tokio::test]
    async fn test_shared_contributor_ids_stay_distinct() {
        let github = ScriptedGitHub::default();
        let a = RepoId::new("a", "x");
        let b = RepoId::new("b", "y");
        let contributor = json!([{"id": 42, "login": "octo"}]);
        github.repository(&a, 100, &[(EntityKind::Contributor, contributor.clone())]);
        github.repository(&b, 200, &[(EntityKind::Contributor, contributor)]);

        let db = connect_and_migrate("sqlite::memory:")
            .await
            .expect("Failed to create test database");
        let store = DatabaseStore::new(db);
        let client = client(&github);

        for repo in [&a, &b] {
            sync_repository(&client, &store, repo, &metadata_only(), None)
                .await
                .expect("sync");
        }

        let mut keys: Vec<String> = Document::find()
            .filter(Column::Collection.eq("contributors"))
            .all(store.connection())
            .await
            .expect("query")
            .into_iter()
            .map(|doc| doc.doc_key)
            .collect();
        keys.sort();
        assert_eq!(keys, ["a_x___42", "b_y___42"]);

        for repo in [&a, &b] {
            let project = store.load(repo).await.expect("load");
            assert!(project.contains_key(EntityKind::Contributor, &EntityKey::Id(42)));
        }
    }

    async fn stored_rows(store: &DatabaseStore, repo_name: &str) -> Vec<Model> {
        Document::find()
            .filter(Column::RepoName.eq(repo_name))
            .order_by_asc(Column::Collection)
            .order_by_asc(Column::DocKey)
            .all(store.connection())
            .await
            .expect("query")
    }

    #[tokio::test]
    async fn test_buffered_database_sync_is_idempotent() {
        let github = ScriptedGitHub::default();
        let repo = RepoId::new("a", "x");
        github.repository(
            &repo,
            100,
            &[
                (EntityKind::Issue, json!([{"id": 1, "number": 1}, {"id": 2, "number": 2}])),
                (EntityKind::Commit, json!([{"sha": "abc"}])),
            ],
        );
        let db = connect_and_migrate("sqlite::memory:")
            .await
            .expect("Failed to create test database");
        let store = DatabaseStore::new(db).with_batch_size(2);
        let client = client(&github);

        let first = sync_repository(&client, &store, &repo, &metadata_only(), None)
            .await
            .expect("first sync");
        let before = store.load(&repo).await.expect("load");
        let rows_before = stored_rows(&store, "a_x").await;
        let second = sync_repository(&client, &store, &repo, &metadata_only(), None)
            .await
            .expect("second sync");

        assert!(first.new_repository);
        assert!(!second.new_repository);
        assert_eq!(first.added(), 3);
        assert_eq!(second.added(), 0);
        assert_eq!(store.load(&repo).await.expect("load"), before);
        assert_eq!(rows_before.len(), 5);
        assert_eq!(stored_rows(&store, "a_x").await, rows_before);
    }
}
