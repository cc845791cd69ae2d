//! Standard topologies
//!
//! Handler names are exposed as constants so sources register exactly what
//! the preset refers to.

use crate::{EntityType, Stage, Topology, TopologyBuilder, TopologyError, TopologyNode};

/// Handler names used by [`database_service`]
pub mod handlers {
    /// Lists the service
    pub const GET_SERVICES: &str = "get_services";
    /// Creates the service entity
    pub const YIELD_SERVICE: &str = "yield_create_request_database_service";
    /// Lists databases
    pub const GET_DATABASE_NAMES: &str = "get_database_names";
    /// Creates a database
    pub const YIELD_DATABASE: &str = "yield_database";
    /// Lists schemas
    pub const GET_SCHEMA_NAMES: &str = "get_database_schema_names";
    /// Emits the tags for a schema
    pub const YIELD_SCHEMA_TAGS: &str = "yield_database_schema_tag_details";
    /// Creates a schema
    pub const YIELD_SCHEMA: &str = "yield_database_schema";
    /// Lists tables and views
    pub const GET_TABLES: &str = "get_tables_name_and_type";
    /// Creates a table
    pub const YIELD_TABLE: &str = "yield_table";
    /// Lists stored procedures
    pub const GET_STORED_PROCEDURES: &str = "get_stored_procedures";
    /// Creates a stored procedure
    pub const YIELD_STORED_PROCEDURE: &str = "yield_stored_procedure";
    /// Emits view lineage once all tables exist
    pub const YIELD_VIEW_LINEAGE: &str = "yield_view_lineage";
}

/// Context slot names used by [`database_service`]
pub mod slots {
    /// Current service
    pub const DATABASE_SERVICE: &str = "database_service";
    /// Current database
    pub const DATABASE: &str = "database";
    /// Tags emitted for the current schema
    pub const TAGS: &str = "tags";
    /// Current schema
    pub const DATABASE_SCHEMA: &str = "database_schema";
    /// Current table
    pub const TABLE: &str = "table";
    /// Current stored procedure
    pub const STORED_PROCEDURE: &str = "stored_procedure";
}

/// Service → database → schema → {table, stored procedure}
///
/// The service is never overwritten and must be acknowledged before its
/// databases are walked. Every container level preloads its children's
/// fingerprints. View lineage is emitted once all databases are done.
///
/// # Errors
/// Never in practice; the signature mirrors [`TopologyBuilder::build`].
pub fn database_service() -> Result<Topology, TopologyError> {
    use handlers::*;

    TopologyBuilder::new()
        .node(
            TopologyNode::new("database_service", GET_SERVICES)
                .stage(
                    Stage::new(EntityType::DATABASE_SERVICE, YIELD_SERVICE)
                        .with_context(slots::DATABASE_SERVICE)
                        .must_ack()
                        .cache_entities()
                        .no_overwrite(),
                )
                .child("database")
                .post_process(YIELD_VIEW_LINEAGE),
        )
        .node(
            TopologyNode::new("database", GET_DATABASE_NAMES)
                .stage(
                    Stage::new(EntityType::DATABASE, YIELD_DATABASE)
                        .with_context(slots::DATABASE)
                        .cache_entities()
                        .use_cache(),
                )
                .child("database_schema"),
        )
        .node(
            TopologyNode::new("database_schema", GET_SCHEMA_NAMES)
                .stage(
                    Stage::new(EntityType::CLASSIFICATION, YIELD_SCHEMA_TAGS)
                        .with_context(slots::TAGS)
                        .nullable(),
                )
                .stage(
                    Stage::new(EntityType::DATABASE_SCHEMA, YIELD_SCHEMA)
                        .with_context(slots::DATABASE_SCHEMA)
                        .cache_entities()
                        .use_cache(),
                )
                .child("table")
                .child("stored_procedure"),
        )
        .node(
            TopologyNode::new("table", GET_TABLES).stage(
                Stage::new(EntityType::TABLE, YIELD_TABLE)
                    .with_context(slots::TABLE)
                    .use_cache(),
            ),
        )
        .node(
            TopologyNode::new("stored_procedure", GET_STORED_PROCEDURES).stage(
                Stage::new(EntityType::STORED_PROCEDURE, YIELD_STORED_PROCEDURE)
                    .with_context(slots::STORED_PROCEDURE)
                    .use_cache()
                    .clear_context(),
            ),
        )
        .build()
}
