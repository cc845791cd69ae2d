//! Fingerprint cache
//!
//! Maps entity type → FQN → the fingerprint last stored remotely. Filled by
//! one bulk listing per (parent scope, child type) and consulted by the
//! dispatcher before deciding whether a write is needed. Lives for a single
//! run only.

use crate::entity::SOURCE_HASH_FIELD;
use crate::error::StoreError;
use crate::store::{ListFilter, MetadataStore};
use catsync_topology::{EntityType, Stage};
use std::collections::HashMap;
use tracing::debug;

/// Per-run fingerprint cache
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FingerprintStore {
    entries: HashMap<EntityType, HashMap<String, String>>,
}

impl FingerprintStore {
    /// Empty cache
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached fingerprint for an entity
    #[must_use]
    pub fn get(&self, entity_type: &EntityType, fqn: &str) -> Option<&str> {
        self.entries
            .get(entity_type)
            .and_then(|by_fqn| by_fqn.get(fqn))
            .map(String::as_str)
    }

    /// Record the fingerprint stored for an entity, replacing any previous one
    pub fn insert(
        &mut self,
        entity_type: EntityType,
        fqn: impl Into<String>,
        fingerprint: impl Into<String>,
    ) {
        self.entries
            .entry(entity_type)
            .or_default()
            .insert(fqn.into(), fingerprint.into());
    }

    /// Number of cached fingerprints across all types
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    /// True when no type holds a fingerprint
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.values().all(HashMap::is_empty)
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Bulk-load the fingerprints of `child_stage`'s type below `scope_fqn`
    ///
    /// The listing is filtered by the child stage's scope parameter under
    /// `parent` (e.g. `service=mysql_prod`, `database=mysql_prod.sales`).
    /// Entities without a stored fingerprint are skipped so that later
    /// lookups miss and take the create path. Returns how many fingerprints
    /// were merged.
    ///
    /// # Errors
    /// Returns error if the listing fails
    pub async fn populate(
        &mut self,
        store: &dyn MetadataStore,
        parent: &EntityType,
        child_stage: &Stage,
        scope_fqn: &str,
    ) -> Result<usize, StoreError> {
        let child_type = &child_stage.entity_type;
        let filter = ListFilter::new(child_stage.scope_param_under(parent), scope_fqn);
        let listed = store
            .list_all(child_type, &filter, &[SOURCE_HASH_FIELD])
            .await?;

        let by_fqn = self.entries.entry(child_type.clone()).or_default();
        let mut merged = 0;
        for entity in listed {
            if let Some(hash) = entity.source_hash {
                by_fqn.insert(entity.fully_qualified_name, hash);
                merged += 1;
            }
        }
        debug!(
            %child_type,
            scope = scope_fqn,
            filter = %filter.key,
            merged,
            "fingerprint cache populated"
        );
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{CreateRequest, Entity, Request};
    use crate::store::{MemoryStore, Sink};
    use uuid::Uuid;

    async fn seed(store: &MemoryStore, name: &str, parent: &str, hash: Option<&str>) {
        let mut request = CreateRequest::new(EntityType::DATABASE_SCHEMA, name).with_parent(parent);
        request.source_hash = hash.map(str::to_string);
        store.write(&Request::Create(request)).await.unwrap();
    }

    #[test]
    fn insert_and_get() {
        let mut cache = FingerprintStore::new();
        assert!(cache.is_empty());
        cache.insert(EntityType::TABLE, "svc.db.s.t", "abc");
        assert_eq!(cache.get(&EntityType::TABLE, "svc.db.s.t"), Some("abc"));
        assert_eq!(cache.get(&EntityType::DATABASE, "svc.db.s.t"), None);
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn populate_skips_entities_without_hash() {
        let store = MemoryStore::new();
        seed(&store, "public", "svc.db", Some("h1")).await;
        seed(&store, "legacy", "svc.db", None).await;
        seed(&store, "elsewhere", "svc.other", Some("h2")).await;

        let stage = Stage::new(EntityType::DATABASE_SCHEMA, "yield_database_schema");
        let mut cache = FingerprintStore::new();
        let merged = cache
            .populate(&store, &EntityType::DATABASE, &stage, "svc.db")
            .await
            .unwrap();

        assert_eq!(merged, 1);
        assert_eq!(cache.get(&EntityType::DATABASE_SCHEMA, "svc.db.public"), Some("h1"));
        assert_eq!(cache.get(&EntityType::DATABASE_SCHEMA, "svc.db.legacy"), None);
        assert_eq!(cache.get(&EntityType::DATABASE_SCHEMA, "svc.other.elsewhere"), None);
        assert_eq!(store.metrics().list_all, 1);
    }

    #[tokio::test]
    async fn populate_merges_across_scopes() {
        let store = MemoryStore::new();
        store.insert(Entity {
            id: Uuid::new_v4(),
            entity_type: EntityType::DATABASE_SCHEMA,
            name: "a".into(),
            fully_qualified_name: "svc.db1.a".into(),
            source_hash: Some("x".into()),
            version: 1,
            fields: serde_json::Map::new(),
        });
        seed(&store, "b", "svc.db2", Some("y")).await;

        let stage = Stage::new(EntityType::DATABASE_SCHEMA, "yield_database_schema");
        let mut cache = FingerprintStore::new();
        cache
            .populate(&store, &EntityType::DATABASE, &stage, "svc.db1")
            .await
            .unwrap();
        cache
            .populate(&store, &EntityType::DATABASE, &stage, "svc.db2")
            .await
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn populate_propagates_store_errors() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        let stage = Stage::new(EntityType::TABLE, "yield_table");
        let mut cache = FingerprintStore::new();
        let result = cache
            .populate(&store, &EntityType::DATABASE_SCHEMA, &stage, "svc.db.s")
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
