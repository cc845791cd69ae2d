//! Testing utilities for the catsync workspace
//!
//! Shared fixtures: a sample catalog, single-pass ingestion against a
//! [`MemoryStore`], legacy entities and a recording source for hand-built
//! topologies.

#![warn(missing_docs)]

use catsync_core::source::Candidates;
use catsync_core::{
    Catalog, CatalogSource, Dispatcher, Entity, IngestionConfig, MemoryStore, RunReport, Traversal,
    Workflow,
};
use catsync_topology::{presets, EntityType, Topology};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// One service, two databases, tags, a view and a stored procedure
pub const SAMPLE_CATALOG: &str = r"
service:
  name: mysql_prod
  serviceType: Mysql
  description: Production MySQL
databases:
  - name: sales
    schemas:
      - name: public
        tags:
          - { classification: Tier, tag: Gold }
        tables:
          - name: orders
            description: Customer orders
            columns:
              - { name: id, dataType: INT }
              - { name: total, dataType: DECIMAL }
          - name: customers
            columns:
              - { name: id, dataType: INT }
          - name: tmp_orders
          - name: big_orders
            tableType: View
            viewDefinition: select * from orders where total > 100
            upstream: [orders]
        storedProcedures:
          - { name: refresh_orders, code: 'call refresh()' }
  - name: staging
    schemas:
      - name: raw
        tables:
          - name: events
";

/// [`SAMPLE_CATALOG`], parsed
#[must_use]
pub fn sample_catalog() -> Catalog {
    Catalog::from_yaml_str(SAMPLE_CATALOG).unwrap()
}

/// Standard database-service topology
#[must_use]
pub fn database_service() -> Arc<Topology> {
    Arc::new(presets::database_service().unwrap())
}

/// Dispatcher configured from `config`
#[must_use]
pub fn dispatcher(store: &Arc<MemoryStore>, config: &IngestionConfig) -> Dispatcher {
    Dispatcher::new(store.clone())
        .force_overwrite(config.source.force_entity_overwriting)
        .with_ack_attempts(config.source.ack_retries)
}

/// Run one full pass of `catalog` into `store`
pub async fn ingest(
    store: &Arc<MemoryStore>,
    catalog: &Catalog,
    config: &IngestionConfig,
) -> RunReport {
    let source = CatalogSource::new(catalog.clone(), &config.source).unwrap();
    let traversal =
        Traversal::for_source(database_service(), source, dispatcher(store, config)).unwrap();
    Workflow::new(store.clone())
        .raise_on_error(config.workflow.raise_on_error)
        .run(traversal)
        .await
        .unwrap()
}

/// Entity as written before fingerprints existed: no `sourceHash`
#[must_use]
pub fn legacy_entity(entity_type: EntityType, fqn: &str, fields: Value) -> Entity {
    let name = catsync_core::fqn::split(fqn).pop().unwrap_or_default();
    Entity {
        id: Uuid::new_v4(),
        entity_type,
        name,
        fully_qualified_name: fqn.to_string(),
        source_hash: None,
        version: 1,
        fields: fields.as_object().cloned().unwrap_or_else(Map::new),
    }
}

/// Candidates from string literals
#[must_use]
pub fn items(names: &[&str]) -> Option<Candidates<String>> {
    let owned: Vec<String> = names.iter().map(|s| (*s).to_string()).collect();
    Some(Box::new(owned.into_iter()))
}

/// Source state that just logs which handlers ran
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Recorder {
    /// Handler events, in call order
    pub events: Vec<String>,
}

impl Recorder {
    /// Append an event
    pub fn record(&mut self, event: impl Into<String>) {
        self.events.push(event.into());
    }

    /// Whether `event` was recorded
    #[must_use]
    pub fn contains(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }
}
