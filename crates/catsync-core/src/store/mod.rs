//! Remote store boundary
//!
//! The engine reads the remote metadata store through [`MetadataStore`] and
//! the workflow writes through [`Sink`]. Real network clients live outside
//! this crate; [`MemoryStore`] implements both for local runs and tests.

mod memory;

pub use memory::{MemoryStore, StoreMetrics};

use crate::entity::{Entity, Request};
use crate::error::StoreError;
use async_trait::async_trait;
use catsync_topology::EntityType;
use std::sync::Arc;

/// Equality filter for bulk listings, e.g. `service=mysql_prod`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListFilter {
    /// Field to match
    pub key: String,
    /// Required value
    pub value: String,
}

impl ListFilter {
    /// Filter on `key=value`
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Read side of the remote metadata store
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch one entity by FQN, or `None` if it does not exist (yet)
    async fn get_by_name(
        &self,
        entity_type: &EntityType,
        fqn: &str,
        fields: &[&str],
    ) -> Result<Option<Entity>, StoreError>;

    /// List every entity of a type matching `filter`
    async fn list_all(
        &self,
        entity_type: &EntityType,
        filter: &ListFilter,
        fields: &[&str],
    ) -> Result<Vec<Entity>, StoreError>;
}

/// Write side of the remote metadata store
#[async_trait]
pub trait Sink: Send + Sync {
    /// Apply one request, returning the stored entity when there is one
    async fn write(&self, request: &Request) -> Result<Option<Entity>, StoreError>;
}

#[async_trait]
impl<T: MetadataStore + ?Sized> MetadataStore for Arc<T> {
    async fn get_by_name(
        &self,
        entity_type: &EntityType,
        fqn: &str,
        fields: &[&str],
    ) -> Result<Option<Entity>, StoreError> {
        (**self).get_by_name(entity_type, fqn, fields).await
    }

    async fn list_all(
        &self,
        entity_type: &EntityType,
        filter: &ListFilter,
        fields: &[&str],
    ) -> Result<Vec<Entity>, StoreError> {
        (**self).list_all(entity_type, filter, fields).await
    }
}

#[async_trait]
impl<T: Sink + ?Sized> Sink for Arc<T> {
    async fn write(&self, request: &Request) -> Result<Option<Entity>, StoreError> {
        (**self).write(request).await
    }
}
