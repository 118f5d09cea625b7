//! Domain records shared by the client, the aggregate and the stores.
//!
//! Upstream JSON shapes vary by endpoint and grow over time, so entities are
//! kept as ordered string-keyed maps. Only the identity field and the ETag
//! bookkeeping field are interpreted here.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field under which the response ETag is attached to a fetched entity.
pub const ETAG_FIELD: &str = "ETag";

/// Separator between the repository tag and the id in contributor keys.
pub const CONTRIBUTOR_KEY_SEPARATOR: &str = "___";

/// One JSON object returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a JSON value, returning `None` unless it is an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Integer `id` field, if present.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.0.get("id").and_then(Value::as_i64)
    }

    /// String `sha` field, if present.
    #[must_use]
    pub fn sha(&self) -> Option<&str> {
        self.0.get("sha").and_then(Value::as_str)
    }

    /// Issue `number` field, used for full issue fetches.
    #[must_use]
    pub fn number(&self) -> Option<i64> {
        self.0.get("number").and_then(Value::as_i64)
    }

    /// Identity key for an entity of `kind`, if the identity field is present.
    #[must_use]
    pub fn key(&self, kind: EntityKind) -> Option<EntityKey> {
        match kind.identity_field() {
            IdentityField::Id => self.id().map(EntityKey::Id),
            IdentityField::Sha => self.sha().map(|s| EntityKey::Sha(s.to_string())),
        }
    }

    #[must_use]
    pub fn etag(&self) -> Option<&str> {
        self.0.get(ETAG_FIELD).and_then(Value::as_str)
    }

    pub fn set_etag(&mut self, etag: impl Into<String>) {
        self.0.insert(ETAG_FIELD.to_string(), Value::String(etag.into()));
    }

    /// Overwrite fields with those from `fresh`; fields `fresh` lacks are kept.
    pub fn merge_from(&mut self, fresh: Entity) {
        for (field, value) in fresh.0 {
            self.0.insert(field, value);
        }
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Entity {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Which field names an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityField {
    Id,
    Sha,
}

impl IdentityField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Sha => "sha",
        }
    }
}

/// Stable identity of an entity within its collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKey {
    Id(i64),
    Sha(String),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Sha(sha) => f.write_str(sha),
        }
    }
}

/// The six keyed collections of a mirrored repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Issue,
    IssueComment,
    IssueEvent,
    Commit,
    CommitComment,
    Contributor,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Issue,
        EntityKind::IssueComment,
        EntityKind::IssueEvent,
        EntityKind::Commit,
        EntityKind::CommitComment,
        EntityKind::Contributor,
    ];

    #[must_use]
    pub fn identity_field(self) -> IdentityField {
        match self {
            Self::Commit => IdentityField::Sha,
            _ => IdentityField::Id,
        }
    }

    /// Collection name, used both as the directory name on disk and as the
    /// database collection.
    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            Self::Issue => "issues",
            Self::IssueComment => "issueComments",
            Self::IssueEvent => "issueEvents",
            Self::Commit => "commits",
            Self::CommitComment => "commitComments",
            Self::Contributor => "contributors",
        }
    }

    /// Inverse of [`EntityKind::collection`].
    #[must_use]
    pub fn from_collection(collection: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.collection() == collection)
    }

    /// API path below `/repos/{owner}/{repo}`.
    #[must_use]
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Issue => "issues",
            Self::IssueComment => "issues/comments",
            Self::IssueEvent => "issues/events",
            Self::Commit => "commits",
            Self::CommitComment => "comments",
            Self::Contributor => "contributors",
        }
    }

    /// Extra query parameters for the list endpoint.
    #[must_use]
    pub fn list_params(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Issue => &[("state", "all")],
            _ => &[],
        }
    }

    /// Key used in the stats record.
    #[must_use]
    pub fn stats_field(self) -> &'static str {
        match self {
            Self::Issue => "issues",
            Self::IssueComment => "issue_comments",
            Self::IssueEvent => "issue_events",
            Self::Commit => "commits",
            Self::CommitComment => "commit_comments",
            Self::Contributor => "contributors",
        }
    }

    /// Human-readable plural, for logs and progress output.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Issue => "issues",
            Self::IssueComment => "issue comments",
            Self::IssueEvent => "issue events",
            Self::Commit => "commits",
            Self::CommitComment => "commit comments",
            Self::Contributor => "contributors",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("not a GitHub repository address: {0}")]
pub struct RepoIdError(pub String);

/// A repository on GitHub, identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    #[must_use]
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// `owner/name`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// `owner_name`, the per-repository directory and database tag.
    #[must_use]
    pub fn storage_name(&self) -> String {
        format!("{}_{}", self.owner, self.name)
    }

    #[must_use]
    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.name)
    }

    /// Base API address for this repository.
    #[must_use]
    pub fn api_url(&self, api_base: &str) -> String {
        format!(
            "{}/repos/{}/{}",
            api_base.trim_end_matches('/'),
            self.owner,
            self.name
        )
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoId {
    type Err = RepoIdError;

    /// Accepts `https://github.com/owner/repo`, `github.com/owner/repo` and
    /// `owner/repo`, with an optional trailing slash or `.git`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let path = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let path = path.strip_prefix("www.").unwrap_or(path);
        let path = path.strip_prefix("github.com/").unwrap_or(path);
        let path = path.trim_end_matches('/');
        let path = path.strip_suffix(".git").unwrap_or(path);

        let segments: Vec<&str> = path.split('/').collect();
        match segments.as_slice() {
            [owner, name] if is_valid_segment(owner) && is_valid_segment(name) => {
                Ok(Self::new(*owner, *name))
            }
            _ => Err(RepoIdError(input.to_string())),
        }
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
