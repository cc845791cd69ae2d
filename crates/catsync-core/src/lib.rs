//! catsync Core - topology-driven metadata reconciliation
//!
//! Walks a source along a declarative [`Topology`](catsync_topology::Topology),
//! turns every produced item into create/patch/lineage/tag requests and
//! suppresses writes whose fingerprint already matches the store.
//!
//! - [`traversal`] drives producers, stages and post-process hooks depth-first
//! - [`dispatch`] decides between create, patch and skip for each request
//! - [`cache`] holds the fingerprints preloaded for a parent's children
//! - [`workflow`] writes what the traversal yields and keeps the run status
//!
//! # Example
//!
//! ```rust,ignore
//! use catsync_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = IngestionConfig::from_path("ingest.yaml")?;
//! let store = Arc::new(MemoryStore::new());
//! let source = CatalogSource::new(Catalog::from_path("catalog.yaml")?, &config.source)?;
//!
//! let dispatcher = Dispatcher::new(store.clone())
//!     .force_overwrite(config.source.force_entity_overwriting)
//!     .with_ack_attempts(config.source.ack_retries);
//! let topology = Arc::new(catsync_topology::presets::database_service()?);
//! let traversal = Traversal::for_source(topology, source, dispatcher)?;
//!
//! let report = Workflow::new(store).run(traversal).await?;
//! println!("{} written, {} unchanged", report.summary.records, report.summary.unchanged);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs, unreachable_pub)]

pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod entity;
pub mod error;
pub mod filter;
pub mod fqn;
pub mod logging;
pub mod source;
pub mod stage;
pub mod status;
pub mod store;
pub mod traversal;
pub mod workflow;

pub use cache::FingerprintStore;
pub use catalog::{Catalog, CatalogItem, CatalogSource};
pub use config::{IngestionConfig, LoggingConfig, SourceConfig, WorkflowConfig};
pub use context::{ContextValue, RunContext, RunState};
pub use dispatch::{
    ContextUpdate, Dispatch, Dispatcher, PatchBuilder, SelectiveMerge, Settlement, ShallowMerge,
    DEFAULT_ACK_ATTEMPTS,
};
pub use entity::{
    ClassificationRequest, CreateRequest, CustomPropertyRequest, Entity, EntityOutcome,
    EntityReference, FailureKind, FailureRecord, LineageRequest, PatchRequest, Request,
    RequestKind,
};
pub use error::{
    ConfigError, DispatchError, EngineError, HandlerKind, StoreError, WorkflowError,
};
pub use filter::{FilterPattern, NameFilter};
pub use source::{Candidates, Handlers, Source, SourceScope};
pub use stage::{StageProcessor, Sunk};
pub use status::{FilteredEntity, Status, StatusSummary};
pub use store::{ListFilter, MemoryStore, MetadataStore, Sink, StoreMetrics};
pub use traversal::Traversal;
pub use workflow::{RunReport, Workflow};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running an ingestion
    pub use crate::{
        Catalog, CatalogSource, CreateRequest, Dispatcher, EntityOutcome, Handlers,
        IngestionConfig, MemoryStore, Request, Source, SourceScope, Status, Traversal, Workflow,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
