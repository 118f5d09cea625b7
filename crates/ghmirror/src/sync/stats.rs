//! Repository statistics: upstream item counts per entity kind.

use serde_json::Value;

use crate::github::GitHubClient;
use crate::model::{Entity, EntityKind, RepoId};

/// Count every entity kind of `repo`.
///
/// A count that cannot be obtained is recorded as `0`. Each kind costs at
/// most two requests.
pub async fn collect_stats(client: &GitHubClient, repo: &RepoId) -> Entity {
    let mut stats = Entity::new();
    for kind in EntityKind::ALL {
        let address = client.repo_url(repo, kind.endpoint());
        let count = match client.count_entities(&address, kind.list_params()).await {
            Some(count) => count,
            None => {
                tracing::warn!(repo = %repo, kind = %kind, "Could not count, recording 0");
                0
            }
        };
        stats.insert(kind.stats_field(), Value::from(count));
    }
    stats
}

/// Count recorded for `kind`, if any.
pub fn stats_count(stats: &Entity, kind: EntityKind) -> Option<u64> {
    stats.get(kind.stats_field()).and_then(Value::as_u64)
}
