//! Walk order, context scoping and handler isolation on hand-built topologies

use catsync_core::{
    CreateRequest, CustomPropertyRequest, Dispatcher, EngineError, EntityOutcome, FailureKind,
    Handlers, HandlerKind, MemoryStore, RunReport, Traversal, Workflow,
};
use catsync_test_utils::{items, Recorder};
use catsync_topology::{EntityType, Stage, Topology, TopologyBuilder, TopologyNode};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn databases_and_tables(clear_tables: bool) -> Arc<Topology> {
    let mut table_stage = Stage::new(EntityType::TABLE, "yield_table").with_context("table");
    if clear_tables {
        table_stage = table_stage.clear_context();
    }
    Arc::new(
        TopologyBuilder::new()
            .node(
                TopologyNode::new("database", "get_databases")
                    .stage(Stage::new(EntityType::DATABASE, "yield_database").with_context("database"))
                    .child("table")
                    .post_process("first_hook")
                    .post_process("failing_hook")
                    .post_process("last_hook"),
            )
            .node(TopologyNode::new("table", "get_tables").stage(table_stage))
            .build()
            .unwrap(),
    )
}

fn handlers() -> Handlers<Recorder, String> {
    Handlers::new()
        .producer("get_databases", |src: &mut Recorder, _| {
            src.record("produce databases");
            Ok(items(&["db1", "db2"]))
        })
        .processor("yield_database", |src: &mut Recorder, item: &String, _| {
            src.record(format!("database {item}"));
            Ok(vec![EntityOutcome::create(CreateRequest::new(
                EntityType::DATABASE,
                item.clone(),
            ))])
        })
        .producer("get_tables", |src: &mut Recorder, scope| {
            let db = scope.context().name("database").unwrap_or("?").to_string();
            let last_table = scope.context().name("table").map(str::to_string);
            src.record(format!("tables of {db} after {last_table:?}"));
            Ok(items(&["t1", "t2"]))
        })
        .processor("yield_table", |src: &mut Recorder, item: &String, scope| {
            let db = scope.context().name("database").unwrap_or("?").to_string();
            src.record(format!("table {db}.{item}"));
            Ok(vec![EntityOutcome::create(
                CreateRequest::new(EntityType::TABLE, item.clone()).with_parent(db),
            )])
        })
        .hook("first_hook", |src: &mut Recorder, _| {
            src.record("first_hook");
            Ok(vec![EntityOutcome::custom_property(CustomPropertyRequest {
                entity_type: EntityType::TABLE,
                name: "owner".into(),
                property_type: "string".into(),
                description: None,
            })])
        })
        .hook("failing_hook", |_: &mut Recorder, _| Err(anyhow::anyhow!("boom")))
        .hook("last_hook", |src: &mut Recorder, _| {
            src.record("last_hook");
            Ok(Vec::new())
        })
}

async fn run(
    topology: Arc<Topology>,
    handlers: Handlers<Recorder, String>,
) -> (RunReport, Recorder, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let traversal = Traversal::new(
        topology,
        Recorder::default(),
        handlers,
        Dispatcher::new(store.clone()),
    )
    .unwrap();
    let (report, recorder) = Workflow::new(store.clone())
        .run_with_source(traversal)
        .await
        .unwrap();
    (report, recorder, store)
}

#[tokio::test]
async fn walks_depth_first_and_clears_sibling_context() {
    let (report, recorder, store) = run(databases_and_tables(true), handlers()).await;

    assert_eq!(
        recorder.events,
        vec![
            "produce databases",
            "database db1",
            "tables of db1 after None",
            "table db1.t1",
            "table db1.t2",
            "database db2",
            "tables of db2 after None",
            "table db2.t1",
            "table db2.t2",
            "first_hook",
            "last_hook",
        ]
    );
    assert_eq!(store.entities(&EntityType::TABLE).len(), 4);
    assert!(store.entity(&EntityType::TABLE, "db2.t1").is_some());
    assert_eq!(report.summary.records, 7);
}

#[tokio::test]
async fn context_leaks_without_clear_context() {
    let (_, recorder, _) = run(databases_and_tables(false), handlers()).await;
    assert!(recorder.contains("tables of db2 after Some(\"t2\")"));
}

#[tokio::test]
async fn failing_hook_does_not_stop_the_others() {
    let (report, recorder, store) = run(databases_and_tables(true), handlers()).await;

    assert!(recorder.contains("last_hook"));
    assert_eq!(store.custom_properties().len(), 1);
    assert_eq!(report.status.warnings, vec!["hook `failing_hook` failed: boom"]);
    assert!(!report.status.has_failures());
}

#[tokio::test]
async fn producer_without_items_still_runs_hooks() {
    let handlers = handlers().producer("get_databases", |_: &mut Recorder, _| Ok(None));
    let (report, recorder, store) = run(databases_and_tables(true), handlers).await;

    assert_eq!(recorder.events, vec!["first_hook", "last_hook"]);
    assert_eq!(store.len(), 0);
    assert_eq!(report.summary.records, 1);
}

#[tokio::test]
async fn producer_error_becomes_a_failure() {
    let handlers = handlers().producer("get_tables", |_: &mut Recorder, _| {
        Err(anyhow::anyhow!("listing tables timed out"))
    });
    let (report, _, store) = run(databases_and_tables(true), handlers).await;

    assert_eq!(report.status.failures.len(), 2);
    let failure = &report.status.failures[0];
    assert_eq!(failure.name, "get_tables");
    assert_eq!(failure.kind, FailureKind::Transform);
    assert_eq!(failure.error, "listing tables timed out");
    assert_eq!(store.entities(&EntityType::DATABASE).len(), 2);
}

#[tokio::test]
async fn processor_error_skips_only_that_item() {
    let handlers = handlers().processor("yield_table", |_: &mut Recorder, item: &String, scope| {
        if item == "t1" {
            anyhow::bail!("cannot describe {item}");
        }
        let db = scope.context().name("database").unwrap_or("?").to_string();
        Ok(vec![EntityOutcome::create(
            CreateRequest::new(EntityType::TABLE, item.clone()).with_parent(db),
        )])
    });
    let (report, _, store) = run(databases_and_tables(true), handlers).await;

    assert_eq!(report.status.failures.len(), 2);
    assert!(report.status.failures.iter().all(|f| f.name == "yield_table"));
    let tables: Vec<String> = store
        .entities(&EntityType::TABLE)
        .into_iter()
        .map(|e| e.fully_qualified_name)
        .collect();
    assert_eq!(tables, vec!["db1.t2", "db2.t2"]);
}

#[tokio::test]
async fn invalid_requests_are_skipped_with_a_warning() {
    let handlers = handlers().processor("yield_table", |_: &mut Recorder, _: &String, _| {
        Ok(vec![EntityOutcome::create(CreateRequest::new(EntityType::TABLE, "  "))])
    });
    let (report, _, store) = run(databases_and_tables(true), handlers).await;

    assert!(store.entities(&EntityType::TABLE).is_empty());
    assert!(!report.status.has_failures());
    // one per table item, plus the failing hook
    assert_eq!(report.status.warnings.len(), 5);
}

#[tokio::test]
async fn empty_non_nullable_stage_warns() {
    let handlers =
        handlers().processor("yield_table", |_: &mut Recorder, _: &String, _| Ok(Vec::new()));
    let (report, _, _) = run(databases_and_tables(true), handlers).await;

    let empty: Vec<&String> = report
        .status
        .warnings
        .iter()
        .filter(|w| w.contains("produced no table request"))
        .collect();
    assert_eq!(empty.len(), 4);
}

#[tokio::test]
async fn node_without_producer_is_skipped() {
    let topology = Arc::new(
        TopologyBuilder::new()
            .node(
                TopologyNode::without_producer("database")
                    .stage(Stage::new(EntityType::DATABASE, "yield_database"))
                    .post_process("last_hook"),
            )
            .build()
            .unwrap(),
    );
    let handlers = Handlers::new()
        .processor("yield_database", |_: &mut Recorder, _: &String, _| Ok(Vec::new()))
        .hook("last_hook", |src: &mut Recorder, _| {
            src.record("last_hook");
            Ok(Vec::new())
        });
    let (_, recorder, _) = run(topology, handlers).await;

    assert!(recorder.events.is_empty());
}

#[test]
fn unregistered_handler_is_rejected_up_front() {
    let mut handlers = Handlers::<Recorder, String>::new();
    for name in ["get_databases", "get_tables"] {
        handlers = handlers.producer(name, |_: &mut Recorder, _| Ok(None));
    }
    handlers = handlers.processor("yield_database", |_: &mut Recorder, _: &String, _| Ok(Vec::new()));

    let err = Traversal::new(
        databases_and_tables(true),
        Recorder::default(),
        handlers,
        Dispatcher::new(Arc::new(MemoryStore::new())),
    )
    .unwrap_err();

    let EngineError::UnregisteredHandler { kind, name } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(*kind, HandlerKind::Processor);
    assert_eq!(name, "yield_table");
    assert_eq!(err.to_string(), "processor `yield_table` is not registered");
}
