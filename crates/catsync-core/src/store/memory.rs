//! In-process metadata store
//!
//! Implements both [`MetadataStore`] and [`Sink`] over a mutex-guarded map.
//! Creates upsert by FQN, patches bump the version, and an optional
//! visibility lag hides fresh entities from `get_by_name` for a number of
//! lookups to model an eventually consistent backend.

use super::{ListFilter, MetadataStore, Sink};
use crate::entity::{
    ClassificationRequest, CreateRequest, CustomPropertyRequest, Entity, LineageRequest,
    PatchRequest, Request, ALL_FIELDS, SOURCE_HASH_FIELD,
};
use crate::error::StoreError;
use crate::fqn;
use async_trait::async_trait;
use catsync_topology::EntityType;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::trace;
use uuid::Uuid;

/// Call counters, by operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreMetrics {
    /// Lookups by FQN, including ack polls
    pub get_by_name: usize,
    /// Bulk listings
    pub list_all: usize,
    /// Create requests
    pub creates: usize,
    /// Patch requests
    pub patches: usize,
    /// Lineage edges
    pub lineage: usize,
    /// Classification requests
    pub classifications: usize,
    /// Custom properties
    pub custom_properties: usize,
}

impl StoreMetrics {
    /// Total number of write calls
    #[must_use]
    pub fn writes(&self) -> usize {
        self.creates + self.patches + self.lineage + self.classifications + self.custom_properties
    }

    /// Total number of read calls
    #[must_use]
    pub fn reads(&self) -> usize {
        self.get_by_name + self.list_all
    }
}

#[derive(Debug)]
struct Record {
    entity: Entity,
    /// Remaining `get_by_name` calls that must miss
    hidden_for: u32,
}

#[derive(Debug, Default)]
struct Inner {
    entities: HashMap<EntityType, IndexMap<String, Record>>,
    lineage: Vec<LineageRequest>,
    classifications: IndexMap<String, ClassificationRequest>,
    custom_properties: Vec<CustomPropertyRequest>,
    metrics: StoreMetrics,
    unavailable: bool,
}

/// Metadata store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    visibility_lag: u32,
}

impl MemoryStore {
    /// Empty store, every write visible at once
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hide newly created entities from the next `lookups` name lookups
    #[must_use]
    pub fn with_visibility_lag(mut self, lookups: u32) -> Self {
        self.visibility_lag = lookups;
        self
    }

    /// Make every call fail with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.lock().unavailable = unavailable;
    }

    /// Insert an entity as-is, bypassing lag and metrics
    ///
    /// Useful for entities written before fingerprints existed.
    pub fn insert(&self, entity: Entity) {
        self.inner
            .lock()
            .entities
            .entry(entity.entity_type.clone())
            .or_default()
            .insert(
                entity.fully_qualified_name.clone(),
                Record {
                    entity,
                    hidden_for: 0,
                },
            );
    }

    /// Stored entity, ignoring visibility lag
    #[must_use]
    pub fn entity(&self, entity_type: &EntityType, fqn: &str) -> Option<Entity> {
        self.inner
            .lock()
            .entities
            .get(entity_type)
            .and_then(|by_fqn| by_fqn.get(fqn))
            .map(|record| record.entity.clone())
    }

    /// Every stored entity of a type, in first-write order
    #[must_use]
    pub fn entities(&self, entity_type: &EntityType) -> Vec<Entity> {
        self.inner
            .lock()
            .entities
            .get(entity_type)
            .map(|by_fqn| by_fqn.values().map(|r| r.entity.clone()).collect())
            .unwrap_or_default()
    }

    /// Number of stored entities across all types
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entities.values().map(IndexMap::len).sum()
    }

    /// True when no entity is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lineage edges, in write order
    #[must_use]
    pub fn lineage(&self) -> Vec<LineageRequest> {
        self.inner.lock().lineage.clone()
    }

    /// Classification tags
    #[must_use]
    pub fn classifications(&self) -> Vec<ClassificationRequest> {
        self.inner.lock().classifications.values().cloned().collect()
    }

    /// Custom properties, in write order
    #[must_use]
    pub fn custom_properties(&self) -> Vec<CustomPropertyRequest> {
        self.inner.lock().custom_properties.clone()
    }

    /// Snapshot of the call counters
    #[must_use]
    pub fn metrics(&self) -> StoreMetrics {
        self.inner.lock().metrics
    }

    /// Zero the call counters
    pub fn reset_metrics(&self) {
        self.inner.lock().metrics = StoreMetrics::default();
    }
}

impl Inner {
    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable {
            return Err(StoreError::Unavailable("memory store is offline".into()));
        }
        Ok(())
    }

    fn create(&mut self, request: &CreateRequest, lag: u32) -> Entity {
        self.metrics.creates += 1;
        let fqn = request.fqn();
        let by_fqn = self
            .entities
            .entry(request.entity_type.clone())
            .or_default();

        if let Some(record) = by_fqn.get_mut(&fqn) {
            let entity = &mut record.entity;
            entity.name.clone_from(&request.name);
            entity.fields.clone_from(&request.fields);
            entity.source_hash.clone_from(&request.source_hash);
            entity.version += 1;
            return entity.clone();
        }

        let entity = Entity {
            id: Uuid::new_v4(),
            entity_type: request.entity_type.clone(),
            name: request.name.clone(),
            fully_qualified_name: fqn.clone(),
            source_hash: request.source_hash.clone(),
            version: 1,
            fields: request.fields.clone(),
        };
        by_fqn.insert(
            fqn,
            Record {
                entity: entity.clone(),
                hidden_for: lag,
            },
        );
        entity
    }

    fn patch(&mut self, request: &PatchRequest) -> Result<Entity, StoreError> {
        self.metrics.patches += 1;
        let target = &request.updated;
        let record = self
            .entities
            .get_mut(&target.entity_type)
            .and_then(|by_fqn| by_fqn.get_mut(&target.fully_qualified_name))
            .ok_or_else(|| StoreError::NotFound {
                entity_type: target.entity_type.clone(),
                fqn: target.fully_qualified_name.clone(),
            })?;

        let entity = &mut record.entity;
        entity.fields.clone_from(&target.fields);
        entity.source_hash.clone_from(&target.source_hash);
        entity.version += 1;
        Ok(entity.clone())
    }
}

/// Keep only the requested fields
///
/// `name`, `fullyQualifiedName`, `id` and `version` always come back.
fn project(entity: &Entity, fields: &[&str]) -> Entity {
    if fields.iter().any(|f| ALL_FIELDS.contains(f)) {
        return entity.clone();
    }
    let mut out = entity.clone();
    out.fields.retain(|key, _| fields.contains(&key.as_str()));
    if !fields.contains(&SOURCE_HASH_FIELD) {
        out.source_hash = None;
    }
    out
}

#[async_trait]
impl MetadataStore for MemoryStore {
    async fn get_by_name(
        &self,
        entity_type: &EntityType,
        fqn: &str,
        fields: &[&str],
    ) -> Result<Option<Entity>, StoreError> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        inner.metrics.get_by_name += 1;

        let Some(record) = inner
            .entities
            .get_mut(entity_type)
            .and_then(|by_fqn| by_fqn.get_mut(fqn))
        else {
            trace!(%entity_type, fqn, "lookup miss");
            return Ok(None);
        };
        if record.hidden_for > 0 {
            record.hidden_for -= 1;
            trace!(%entity_type, fqn, remaining = record.hidden_for, "entity not visible yet");
            return Ok(None);
        }
        Ok(Some(project(&record.entity, fields)))
    }

    async fn list_all(
        &self,
        entity_type: &EntityType,
        filter: &ListFilter,
        fields: &[&str],
    ) -> Result<Vec<Entity>, StoreError> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        if filter.key.is_empty() {
            return Err(StoreError::InvalidRequest("empty list filter key".into()));
        }
        inner.metrics.list_all += 1;

        let listed: Vec<Entity> = inner
            .entities
            .get(entity_type)
            .map(|by_fqn| {
                by_fqn
                    .values()
                    .filter(|r| fqn::is_within(&r.entity.fully_qualified_name, &filter.value))
                    .map(|r| project(&r.entity, fields))
                    .collect()
            })
            .unwrap_or_default();
        trace!(%entity_type, key = %filter.key, scope = %filter.value, count = listed.len(), "listed");
        Ok(listed)
    }
}

#[async_trait]
impl Sink for MemoryStore {
    async fn write(&self, request: &Request) -> Result<Option<Entity>, StoreError> {
        let mut inner = self.inner.lock();
        inner.check_available()?;
        match request {
            Request::Create(create) => {
                if create.name.trim().is_empty() {
                    return Err(StoreError::InvalidRequest("entity name is empty".into()));
                }
                Ok(Some(inner.create(create, self.visibility_lag)))
            }
            Request::Patch(patch) => inner.patch(patch).map(Some),
            Request::Lineage(edge) => {
                inner.metrics.lineage += 1;
                if !inner.lineage.contains(edge) {
                    inner.lineage.push(edge.clone());
                }
                Ok(None)
            }
            Request::Classification(tag) => {
                inner.metrics.classifications += 1;
                inner.classifications.insert(tag.tag_fqn(), tag.clone());
                Ok(None)
            }
            Request::CustomProperty(property) => {
                inner.metrics.custom_properties += 1;
                inner.custom_properties.retain(|p| {
                    p.entity_type != property.entity_type || p.name != property.name
                });
                inner.custom_properties.push(property.clone());
                Ok(None)
            }
        }
    }
}
