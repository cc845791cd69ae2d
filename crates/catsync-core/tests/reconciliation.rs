//! Create / patch / skip decisions across repeated passes

use catsync_core::{FailureKind, IngestionConfig, MemoryStore, Traversal, Workflow, WorkflowError};
use catsync_core::{CatalogSource, Request};
use catsync_test_utils::{database_service, dispatcher, ingest, legacy_entity, sample_catalog};
use catsync_topology::EntityType;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

const ORDERS: &str = "mysql_prod.sales.public.orders";

#[tokio::test]
async fn first_pass_creates_everything() {
    let store = Arc::new(MemoryStore::new());
    let report = ingest(&store, &sample_catalog(), &IngestionConfig::default()).await;

    let metrics = store.metrics();
    assert_eq!(metrics.creates, 11);
    assert_eq!(metrics.patches, 0);
    assert_eq!(metrics.classifications, 1);
    assert_eq!(metrics.lineage, 1);
    assert_eq!(report.summary.records, 13);
    assert_eq!(report.summary.unchanged, 0);
    assert!(!report.status.has_failures());

    let orders = store.entity(&EntityType::TABLE, ORDERS).unwrap();
    assert!(orders.source_hash.is_some());
    assert_eq!(orders.fields["description"], json!("Customer orders"));
    assert_eq!(store.entities(&EntityType::DATABASE).len(), 2);
    assert_eq!(store.entities(&EntityType::STORED_PROCEDURE).len(), 1);
}

#[tokio::test]
async fn second_pass_writes_no_entities() {
    let store = Arc::new(MemoryStore::new());
    let config = IngestionConfig::default();
    ingest(&store, &sample_catalog(), &config).await;
    let versions: Vec<u32> = store
        .entities(&EntityType::TABLE)
        .iter()
        .map(|e| e.version)
        .collect();

    store.reset_metrics();
    let report = ingest(&store, &sample_catalog(), &config).await;

    let metrics = store.metrics();
    assert_eq!(metrics.creates, 0);
    assert_eq!(metrics.patches, 0);
    // only the never-overwritten service is looked up by name
    assert_eq!(metrics.get_by_name, 1);
    assert_eq!(report.summary.unchanged, 11);
    // tags and lineage carry no fingerprint and are always re-sent
    assert_eq!(report.summary.records, 2);
    assert_eq!(store.lineage().len(), 1);

    let after: Vec<u32> = store
        .entities(&EntityType::TABLE)
        .iter()
        .map(|e| e.version)
        .collect();
    assert_eq!(versions, after);
}

#[tokio::test]
async fn changed_table_is_patched() {
    let store = Arc::new(MemoryStore::new());
    let config = IngestionConfig::default();
    ingest(&store, &sample_catalog(), &config).await;
    let before = store.entity(&EntityType::TABLE, ORDERS).unwrap();

    let mut catalog = sample_catalog();
    catalog.databases[0].schemas[0].tables[0].description = Some("All orders".into());
    store.reset_metrics();
    let report = ingest(&store, &catalog, &config).await;

    assert_eq!(store.metrics().patches, 1);
    assert_eq!(store.metrics().creates, 0);
    assert_eq!(report.status.updated, vec![ORDERS.to_string()]);

    let after = store.entity(&EntityType::TABLE, ORDERS).unwrap();
    assert_eq!(after.id, before.id);
    assert_eq!(after.version, before.version + 1);
    assert_eq!(after.fields["description"], json!("All orders"));
    assert_ne!(after.source_hash, before.source_hash);
}

#[tokio::test]
async fn legacy_entity_without_fingerprint_is_rewritten() {
    let store = Arc::new(MemoryStore::new());
    let customers = "mysql_prod.sales.public.customers";
    store.insert(legacy_entity(
        EntityType::TABLE,
        customers,
        json!({"description": "from an older run"}),
    ));

    ingest(&store, &sample_catalog(), &IngestionConfig::default()).await;

    let entity = store.entity(&EntityType::TABLE, customers).unwrap();
    assert_eq!(entity.version, 2);
    assert!(entity.source_hash.is_some());
    assert_eq!(store.metrics().patches, 0);
}

#[tokio::test]
async fn existing_service_is_never_rewritten() {
    let store = Arc::new(MemoryStore::new());
    let config = IngestionConfig::default();
    ingest(&store, &sample_catalog(), &config).await;

    let mut catalog = sample_catalog();
    catalog.service.description = Some("renamed in source".into());
    ingest(&store, &catalog, &config).await;

    let service = store
        .entity(&EntityType::DATABASE_SERVICE, "mysql_prod")
        .unwrap();
    assert_eq!(service.version, 1);
    assert_eq!(service.fields["description"], json!("Production MySQL"));
}

#[tokio::test]
async fn force_overwrite_rewrites_the_service() {
    let store = Arc::new(MemoryStore::new());
    ingest(&store, &sample_catalog(), &IngestionConfig::default()).await;

    let mut catalog = sample_catalog();
    catalog.service.description = Some("renamed in source".into());
    store.reset_metrics();
    ingest(&store, &catalog, &IngestionConfig::new().with_force_overwrite(true)).await;

    let service = store
        .entity(&EntityType::DATABASE_SERVICE, "mysql_prod")
        .unwrap();
    assert_eq!(service.version, 2);
    assert_eq!(service.fields["description"], json!("renamed in source"));
    // cached children still match, only the service is written
    assert_eq!(store.metrics().creates, 1);
}

#[tokio::test]
async fn missing_ack_prunes_the_service_branch() {
    let store = Arc::new(MemoryStore::new().with_visibility_lag(10));
    let report = ingest(&store, &sample_catalog(), &IngestionConfig::default()).await;

    assert_eq!(report.status.failures.len(), 1);
    let failure = &report.status.failures[0];
    assert_eq!(failure.kind, FailureKind::MissingAck);
    assert_eq!(failure.name, "mysql_prod");
    assert!(failure.error.contains("missing ack"));

    assert_eq!(store.len(), 1);
    assert!(store.entities(&EntityType::DATABASE).is_empty());
}

#[tokio::test]
async fn ack_succeeds_within_the_retry_budget() {
    let store = Arc::new(MemoryStore::new().with_visibility_lag(2));
    let report = ingest(&store, &sample_catalog(), &IngestionConfig::default()).await;

    assert!(!report.status.has_failures());
    assert_eq!(store.entities(&EntityType::TABLE).len(), 5);
}

#[tokio::test]
async fn raise_on_error_stops_at_first_failure() {
    let store = Arc::new(MemoryStore::new().with_visibility_lag(10));
    let config = IngestionConfig::new().with_ack_retries(1);
    let source = CatalogSource::new(sample_catalog(), &config.source).unwrap();
    let traversal =
        Traversal::for_source(database_service(), source, dispatcher(&store, &config)).unwrap();

    let err = Workflow::new(store.clone())
        .raise_on_error(true)
        .run(traversal)
        .await
        .unwrap_err();
    let WorkflowError::Failed(failure) = err else {
        panic!("expected a failed run, got {err:?}");
    };
    assert_eq!(failure.kind, FailureKind::MissingAck);
    assert!(failure.error.contains("after 1 lookups"));
}

#[tokio::test]
async fn unavailable_store_is_reported_not_panicked() {
    let store = Arc::new(MemoryStore::new());
    store.set_unavailable(true);
    let report = ingest(&store, &sample_catalog(), &IngestionConfig::default()).await;

    assert!(report.status.has_failures());
    assert!(report
        .status
        .failures
        .iter()
        .any(|f| f.kind == FailureKind::Store));
    assert!(store.is_empty());
}

#[tokio::test]
async fn stream_yields_requests_in_walk_order() {
    use futures::StreamExt;

    let store = Arc::new(MemoryStore::new());
    let config = IngestionConfig::default();
    let source = CatalogSource::new(sample_catalog(), &config.source).unwrap();
    let traversal =
        Traversal::for_source(database_service(), source, dispatcher(&store, &config)).unwrap();

    // nothing is written, so the service ack can never be satisfied
    let kinds: Vec<String> = traversal
        .into_stream()
        .map(|outcome| match outcome.as_request() {
            Some(Request::Create(create)) => create.entity_type.to_string(),
            Some(other) => format!("{:?}", other.kind()),
            None => "failure".to_string(),
        })
        .collect()
        .await;
    assert_eq!(kinds, vec!["databaseService", "failure"]);
}
