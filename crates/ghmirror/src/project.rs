//! In-memory aggregate of one mirrored repository.

use std::collections::BTreeMap;

use crate::model::{Entity, EntityKey, EntityKind};

/// Everything known about one repository during a sync.
///
/// Entities are keyed by identity, so adding an entity whose key is already
/// present replaces the stored copy. That overwrite is what full re-fetches
/// rely on. No referential checks are made between collections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Project {
    info: Option<Entity>,
    stats: Option<Entity>,
    collections: BTreeMap<EntityKind, BTreeMap<EntityKey, Entity>>,
}

impl Project {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info_exists(&self) -> bool {
        self.info.is_some()
    }

    pub fn stats_exists(&self) -> bool {
        self.stats.is_some()
    }

    pub fn info(&self) -> Option<&Entity> {
        self.info.as_ref()
    }

    pub fn stats(&self) -> Option<&Entity> {
        self.stats.as_ref()
    }

    /// Remove and return the info record, e.g. to refresh it conditionally.
    pub fn take_info(&mut self) -> Option<Entity> {
        self.info.take()
    }

    pub fn add_info(&mut self, info: Entity) {
        self.info = Some(info);
    }

    pub fn add_stats(&mut self, stats: Entity) {
        self.stats = Some(stats);
    }

    /// True iff an entity with the same identity key is already stored.
    ///
    /// Entities without an identity field are never considered present.
    pub fn exists(&self, kind: EntityKind, entity: &Entity) -> bool {
        entity
            .key(kind)
            .is_some_and(|key| self.contains_key(kind, &key))
    }

    pub fn contains_key(&self, kind: EntityKind, key: &EntityKey) -> bool {
        self.collections
            .get(&kind)
            .is_some_and(|entities| entities.contains_key(key))
    }

    /// Insert or replace `entity` under its identity key.
    ///
    /// Returns the key, or `None` (and stores nothing) when the identity field
    /// is missing.
    pub fn add(&mut self, kind: EntityKind, entity: Entity) -> Option<EntityKey> {
        let Some(key) = entity.key(kind) else {
            tracing::warn!(
                kind = %kind,
                field = kind.identity_field().as_str(),
                "Entity has no identity field, not storing it"
            );
            return None;
        };
        self.collections
            .entry(kind)
            .or_default()
            .insert(key.clone(), entity);
        Some(key)
    }

    pub fn get(&self, kind: EntityKind, key: &EntityKey) -> Option<&Entity> {
        self.collections.get(&kind).and_then(|m| m.get(key))
    }

    /// Entities of `kind`, ordered by key.
    pub fn entities(&self, kind: EntityKind) -> impl Iterator<Item = (&EntityKey, &Entity)> {
        self.collections.get(&kind).into_iter().flatten()
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.collections.get(&kind).map_or(0, BTreeMap::len)
    }

    /// True when no entity of any kind is stored (info and stats aside).
    pub fn is_empty(&self) -> bool {
        EntityKind::ALL.iter().all(|kind| self.count(*kind) == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: serde_json::Value) -> Entity {
        Entity::from_value(value).expect("object")
    }

    #[test]
    fn new_project_is_empty() {
        let project = Project::new();
        assert!(!project.info_exists());
        assert!(!project.stats_exists());
        assert!(project.is_empty());
        for kind in EntityKind::ALL {
            assert_eq!(project.count(kind), 0);
        }
    }

    #[test]
    fn exists_after_add() {
        let mut project = Project::new();
        let issue = entity(json!({"id": 10, "title": "bug"}));

        assert!(!project.exists(EntityKind::Issue, &issue));
        assert_eq!(project.add(EntityKind::Issue, issue.clone()), Some(EntityKey::Id(10)));
        assert!(project.exists(EntityKind::Issue, &issue));

        // Keys are scoped to their collection.
        assert!(!project.exists(EntityKind::IssueComment, &issue));
    }

    #[test]
    fn add_overwrites_same_key() {
        let mut project = Project::new();
        project.add(EntityKind::Commit, entity(json!({"sha": "a1", "files": null})));
        project.add(EntityKind::Commit, entity(json!({"sha": "a1", "files": []})));

        assert_eq!(project.count(EntityKind::Commit), 1);
        let stored = project
            .get(EntityKind::Commit, &EntityKey::Sha("a1".into()))
            .expect("stored");
        assert_eq!(stored.get("files"), Some(&json!([])));
    }

    #[test]
    fn entities_without_identity_are_ignored() {
        let mut project = Project::new();
        let anonymous = entity(json!({"login": "ghost"}));

        assert_eq!(project.add(EntityKind::Contributor, anonymous.clone()), None);
        assert!(!project.exists(EntityKind::Contributor, &anonymous));
        assert!(project.is_empty());
    }

    #[test]
    fn dangling_references_are_accepted() {
        let mut project = Project::new();
        let comment = entity(json!({"id": 5, "issue_url": "https://api.github.com/repos/a/x/issues/999"}));
        assert!(project.add(EntityKind::IssueComment, comment).is_some());
        assert_eq!(project.count(EntityKind::IssueComment), 1);
    }

    #[test]
    fn singletons_replace_and_take() {
        let mut project = Project::new();
        project.add_info(entity(json!({"id": 1, "name": "x"})));
        project.add_stats(entity(json!({"issues": 0})));
        assert!(project.info_exists());
        assert!(project.stats_exists());

        let info = project.take_info().expect("info");
        assert_eq!(info.id(), Some(1));
        assert!(!project.info_exists());
    }
}
