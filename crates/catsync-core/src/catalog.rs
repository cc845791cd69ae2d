//! Catalog fixture source
//!
//! A source for the standard database-service topology backed by a YAML
//! description of one service:
//!
//! ```yaml
//! service:
//!   name: mysql_prod
//!   serviceType: Mysql
//! databases:
//!   - name: sales
//!     schemas:
//!       - name: public
//!         tags:
//!           - { classification: Tier, tag: Gold }
//!         tables:
//!           - name: orders
//!             columns: [{ name: id, dataType: INT }]
//!           - name: big_orders
//!             tableType: View
//!             viewDefinition: select * from orders where total > 100
//!             upstream: [orders]
//!         storedProcedures:
//!           - { name: refresh, code: "call refresh()" }
//! ```
//!
//! Views are collected while tables are processed and turned into lineage
//! by the service's post-process hook once every database is done.

use crate::config::SourceConfig;
use crate::entity::{ClassificationRequest, CreateRequest, EntityOutcome, EntityReference, LineageRequest};
use crate::error::ConfigError;
use crate::filter::NameFilter;
use crate::fqn;
use crate::source::{Candidates, Handlers, Source, SourceScope};
use anyhow::{bail, Context as _};
use catsync_topology::presets::{handlers, slots};
use catsync_topology::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

/// Whole catalog: one service and everything below it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// The service every database belongs to
    pub service: ServiceSpec,
    /// Databases, in listing order
    #[serde(default)]
    pub databases: Vec<DatabaseSpec>,
}

/// Database service at the root of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSpec {
    /// Service name, the first FQN part
    pub name: String,
    /// Connector type, e.g. `Mysql`
    #[serde(default = "default_service_type")]
    pub service_type: String,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
}

fn default_service_type() -> String {
    "CustomDatabase".into()
}

/// One database and its schemas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Database name
    pub name: String,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
    /// Schemas, in listing order
    #[serde(default)]
    pub schemas: Vec<SchemaSpec>,
}

/// One schema with its tables, procedures and tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSpec {
    /// Schema name
    pub name: String,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
    /// Tags applied to the schema itself
    #[serde(default)]
    pub tags: Vec<TagSpec>,
    /// Tables and views
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    /// Stored procedures
    #[serde(default)]
    pub stored_procedures: Vec<ProcedureSpec>,
}

/// A `classification.tag` label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSpec {
    /// Classification the tag belongs to
    pub classification: String,
    /// Tag name within the classification
    pub tag: String,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
}

/// Kind of table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableType {
    /// Plain base table
    #[default]
    Regular,
    /// View; its upstream tables become lineage
    View,
    /// Table backed by storage outside the database
    External,
}

/// One table or view
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSpec {
    /// Table name
    pub name: String,
    /// Base table, view or external
    #[serde(default)]
    pub table_type: TableType,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
    /// Columns, in ordinal order
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
    /// SQL defining a view
    #[serde(default)]
    pub view_definition: Option<String>,
    /// Tables this one reads from: `table` (same schema), `schema.table`,
    /// `database.schema.table` or a full FQN
    #[serde(default)]
    pub upstream: Vec<String>,
}

/// One table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Source data type, e.g. `INT`
    pub data_type: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One stored procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcedureSpec {
    /// Procedure name
    pub name: String,
    /// Implementation language, e.g. `SQL`
    #[serde(default)]
    pub language: Option<String>,
    /// Procedure body
    pub code: String,
    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,
}

impl Catalog {
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed YAML
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Parse`] for malformed YAML
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    fn database(&self, name: &str) -> Option<&DatabaseSpec> {
        self.databases.iter().find(|db| db.name == name)
    }

    fn schema(&self, database: &str, schema: &str) -> Option<&SchemaSpec> {
        self.database(database)?
            .schemas
            .iter()
            .find(|s| s.name == schema)
    }
}

/// Item produced by the catalog's producers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogItem {
    /// The service itself
    Service(ServiceSpec),
    /// A database, without its schemas
    Database {
        /// Database name
        name: String,
        /// Free-text description
        description: Option<String>,
    },
    /// A schema, with the tags to apply to it
    Schema {
        /// Schema name
        name: String,
        /// Free-text description
        description: Option<String>,
        /// Tags applied to the schema
        tags: Vec<TagSpec>,
    },
    /// A table or view
    Table(TableSpec),
    /// A stored procedure
    Procedure(ProcedureSpec),
}

/// A view seen during the walk, waiting for lineage
#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewRecord {
    fqn: String,
    /// Parts of the view's schema FQN, the scope partial upstream names resolve in
    schema_parts: Vec<String>,
    upstream: Vec<String>,
    sql: Option<String>,
}

/// Source reading a [`Catalog`]
#[derive(Debug, Clone)]
pub struct CatalogSource {
    catalog: Catalog,
    service_name: String,
    use_fqn_for_filtering: bool,
    database_filter: NameFilter,
    schema_filter: NameFilter,
    table_filter: NameFilter,
    views: Vec<ViewRecord>,
}

impl CatalogSource {
    /// # Errors
    /// Returns [`ConfigError::InvalidPattern`] if a filter does not compile
    pub fn new(catalog: Catalog, config: &SourceConfig) -> Result<Self, ConfigError> {
        let service_name = config
            .service_name
            .clone()
            .unwrap_or_else(|| catalog.service.name.clone());
        Ok(Self {
            catalog,
            service_name,
            use_fqn_for_filtering: config.use_fqn_for_filtering,
            database_filter: config.database_filter_pattern.compile()?,
            schema_filter: config.schema_filter_pattern.compile()?,
            table_filter: config.table_filter_pattern.compile()?,
            views: Vec::new(),
        })
    }

    /// Service name used as the FQN root, after any override
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Number of views collected so far
    #[must_use]
    pub fn pending_views(&self) -> usize {
        self.views.len()
    }

    fn filtered(&self, filter: &NameFilter, name: &str, fqn: &str) -> bool {
        filter.is_filtered(if self.use_fqn_for_filtering { fqn } else { name })
    }

    fn current(scope: &SourceScope<'_>, slot: &str) -> anyhow::Result<String> {
        scope
            .context()
            .name(slot)
            .map(str::to_string)
            .with_context(|| format!("no `{slot}` in context"))
    }

    fn database_fqn(scope: &SourceScope<'_>) -> String {
        scope
            .context()
            .fqn_of(&[slots::DATABASE_SERVICE, slots::DATABASE])
    }

    fn schema_fqn(scope: &SourceScope<'_>) -> String {
        scope
            .context()
            .fqn_of(&[slots::DATABASE_SERVICE, slots::DATABASE, slots::DATABASE_SCHEMA])
    }
}

fn unexpected(expected: &str, item: &CatalogItem) -> anyhow::Error {
    anyhow::anyhow!("expected a {expected} item, got {item:?}")
}

fn candidates(items: Vec<CatalogItem>) -> Option<Candidates<CatalogItem>> {
    Some(Box::new(items.into_iter()))
}

fn with_description(request: CreateRequest, description: Option<&String>) -> CreateRequest {
    match description {
        Some(text) => request.with_field("description", Value::String(text.clone())),
        None => request,
    }
}

/// Qualify an upstream name against the view's schema. Each extra part in
/// `upstream` names one scope further up, so `db.schema.table` lands under
/// the service rather than the view's database.
fn resolve_upstream(schema_parts: &[String], upstream: &str) -> String {
    let upstream = fqn::split(upstream);
    let keep = schema_parts
        .len()
        .saturating_sub(upstream.len().saturating_sub(1));
    fqn::build(schema_parts[..keep].iter().chain(&upstream))
}

#[allow(clippy::unnecessary_wraps)]
impl CatalogSource {
    fn get_services(
        &mut self,
        _: &mut SourceScope<'_>,
    ) -> anyhow::Result<Option<Candidates<CatalogItem>>> {
        let mut service = self.catalog.service.clone();
        service.name.clone_from(&self.service_name);
        Ok(candidates(vec![CatalogItem::Service(service)]))
    }

    fn yield_service(
        &mut self,
        item: &CatalogItem,
        _: &mut SourceScope<'_>,
    ) -> anyhow::Result<Vec<EntityOutcome>> {
        let CatalogItem::Service(service) = item else {
            return Err(unexpected("service", item));
        };
        let request = CreateRequest::new(EntityType::DATABASE_SERVICE, &service.name)
            .with_field("serviceType", Value::String(service.service_type.clone()));
        Ok(vec![EntityOutcome::create(with_description(
            request,
            service.description.as_ref(),
        ))])
    }

    fn get_database_names(
        &mut self,
        scope: &mut SourceScope<'_>,
    ) -> anyhow::Result<Option<Candidates<CatalogItem>>> {
        let service = Self::current(scope, slots::DATABASE_SERVICE)?;
        let mut items = Vec::new();
        for db in &self.catalog.databases {
            let db_fqn = fqn::build([service.as_str(), db.name.as_str()]);
            if self.filtered(&self.database_filter, &db.name, &db_fqn) {
                scope.filter(db_fqn, "Database Filtered Out");
                continue;
            }
            items.push(CatalogItem::Database {
                name: db.name.clone(),
                description: db.description.clone(),
            });
        }
        Ok(candidates(items))
    }

    fn yield_database(
        &mut self,
        item: &CatalogItem,
        scope: &mut SourceScope<'_>,
    ) -> anyhow::Result<Vec<EntityOutcome>> {
        let CatalogItem::Database { name, description } = item else {
            return Err(unexpected("database", item));
        };
        let service = Self::current(scope, slots::DATABASE_SERVICE)?;
        let request = CreateRequest::new(EntityType::DATABASE, name)
            .with_parent(&service)
            .with_field("service", Value::String(service.clone()));
        Ok(vec![EntityOutcome::create(with_description(
            request,
            description.as_ref(),
        ))])
    }

    fn get_database_schema_names(
        &mut self,
        scope: &mut SourceScope<'_>,
    ) -> anyhow::Result<Option<Candidates<CatalogItem>>> {
        let database = Self::current(scope, slots::DATABASE)?;
        let Some(db) = self.catalog.database(&database) else {
            bail!("database `{database}` is not in the catalog");
        };
        let db_fqn = Self::database_fqn(scope);
        let mut items = Vec::new();
        for schema in &db.schemas {
            let schema_fqn = fqn::join(Some(db_fqn.as_str()), &schema.name);
            if self.filtered(&self.schema_filter, &schema.name, &schema_fqn) {
                scope.filter(schema_fqn, "Schema Filtered Out");
                continue;
            }
            items.push(CatalogItem::Schema {
                name: schema.name.clone(),
                description: schema.description.clone(),
                tags: schema.tags.clone(),
            });
        }
        Ok(candidates(items))
    }

    fn yield_schema_tags(
        &mut self,
        item: &CatalogItem,
        scope: &mut SourceScope<'_>,
    ) -> anyhow::Result<Vec<EntityOutcome>> {
        let CatalogItem::Schema { name, tags, .. } = item else {
            return Err(unexpected("schema", item));
        };
        let schema_fqn = fqn::join(Some(Self::database_fqn(scope).as_str()), name);
        Ok(tags
            .iter()
            .map(|tag| {
                EntityOutcome::classification(ClassificationRequest {
                    classification: tag.classification.clone(),
                    tag: tag.tag.clone(),
                    description: tag.description.clone(),
                    target_fqn: Some(schema_fqn.clone()),
                })
            })
            .collect())
    }

    fn yield_schema(
        &mut self,
        item: &CatalogItem,
        scope: &mut SourceScope<'_>,
    ) -> anyhow::Result<Vec<EntityOutcome>> {
        let CatalogItem::Schema {
            name, description, ..
        } = item
        else {
            return Err(unexpected("schema", item));
        };
        let db_fqn = Self::database_fqn(scope);
        let request = CreateRequest::new(EntityType::DATABASE_SCHEMA, name)
            .with_parent(&db_fqn)
            .with_field("database", Value::String(db_fqn.clone()));
        Ok(vec![EntityOutcome::create(with_description(
            request,
            description.as_ref(),
        ))])
    }

    fn get_tables(
        &mut self,
        scope: &mut SourceScope<'_>,
    ) -> anyhow::Result<Option<Candidates<CatalogItem>>> {
        let database = Self::current(scope, slots::DATABASE)?;
        let schema_name = Self::current(scope, slots::DATABASE_SCHEMA)?;
        let Some(schema) = self.catalog.schema(&database, &schema_name) else {
            bail!("schema `{database}.{schema_name}` is not in the catalog");
        };
        let schema_fqn = Self::schema_fqn(scope);
        let mut items = Vec::new();
        for table in &schema.tables {
            let table_fqn = fqn::join(Some(schema_fqn.as_str()), &table.name);
            if self.filtered(&self.table_filter, &table.name, &table_fqn) {
                scope.filter(table_fqn, "Table Filtered Out");
                continue;
            }
            items.push(CatalogItem::Table(table.clone()));
        }
        Ok(candidates(items))
    }

    fn yield_table(
        &mut self,
        item: &CatalogItem,
        scope: &mut SourceScope<'_>,
    ) -> anyhow::Result<Vec<EntityOutcome>> {
        let CatalogItem::Table(table) = item else {
            return Err(unexpected("table", item));
        };
        let schema_fqn = Self::schema_fqn(scope);
        let columns = serde_json::to_value(&table.columns)
            .with_context(|| format!("serializing columns of `{}`", table.name))?;
        let mut request = CreateRequest::new(EntityType::TABLE, &table.name)
            .with_parent(&schema_fqn)
            .with_field("tableType", json!(table.table_type))
            .with_field("columns", columns)
            .with_field("databaseSchema", Value::String(schema_fqn.clone()));
        request = with_description(request, table.description.as_ref());
        if let Some(sql) = &table.view_definition {
            request = request.with_field("viewDefinition", Value::String(sql.clone()));
        }

        if table.table_type == TableType::View || table.view_definition.is_some() {
            self.views.push(ViewRecord {
                fqn: request.fqn(),
                schema_parts: fqn::split(&schema_fqn),
                upstream: table.upstream.clone(),
                sql: table.view_definition.clone(),
            });
        }
        Ok(vec![EntityOutcome::create(request)])
    }

    fn get_stored_procedures(
        &mut self,
        scope: &mut SourceScope<'_>,
    ) -> anyhow::Result<Option<Candidates<CatalogItem>>> {
        let database = Self::current(scope, slots::DATABASE)?;
        let schema_name = Self::current(scope, slots::DATABASE_SCHEMA)?;
        let Some(schema) = self.catalog.schema(&database, &schema_name) else {
            return Ok(None);
        };
        if schema.stored_procedures.is_empty() {
            return Ok(None);
        }
        Ok(candidates(
            schema
                .stored_procedures
                .iter()
                .cloned()
                .map(CatalogItem::Procedure)
                .collect(),
        ))
    }

    fn yield_stored_procedure(
        &mut self,
        item: &CatalogItem,
        scope: &mut SourceScope<'_>,
    ) -> anyhow::Result<Vec<EntityOutcome>> {
        let CatalogItem::Procedure(procedure) = item else {
            return Err(unexpected("stored procedure", item));
        };
        let schema_fqn = Self::schema_fqn(scope);
        let request = CreateRequest::new(EntityType::STORED_PROCEDURE, &procedure.name)
            .with_parent(&schema_fqn)
            .with_field(
                "storedProcedureCode",
                json!({
                    "language": procedure.language.as_deref().unwrap_or("SQL"),
                    "code": procedure.code,
                }),
            )
            .with_field("databaseSchema", Value::String(schema_fqn));
        Ok(vec![EntityOutcome::create(with_description(
            request,
            procedure.description.as_ref(),
        ))])
    }

    fn yield_view_lineage(&mut self, _: &mut SourceScope<'_>) -> anyhow::Result<Vec<EntityOutcome>> {
        debug!(views = self.views.len(), "processing lineage for views");
        let mut outcomes = Vec::new();
        for view in self.views.drain(..) {
            for upstream in &view.upstream {
                let from = resolve_upstream(&view.schema_parts, upstream);
                if from == view.fqn {
                    continue;
                }
                outcomes.push(EntityOutcome::lineage(LineageRequest {
                    from: EntityReference::new(EntityType::TABLE, from),
                    to: EntityReference::new(EntityType::TABLE, view.fqn.clone()),
                    sql_query: view.sql.clone(),
                }));
            }
        }
        Ok(outcomes)
    }
}

impl Source for CatalogSource {
    type Candidate = CatalogItem;

    fn handlers() -> Handlers<Self, CatalogItem> {
        Handlers::new()
            .producer(handlers::GET_SERVICES, Self::get_services)
            .processor(handlers::YIELD_SERVICE, Self::yield_service)
            .producer(handlers::GET_DATABASE_NAMES, Self::get_database_names)
            .processor(handlers::YIELD_DATABASE, Self::yield_database)
            .producer(handlers::GET_SCHEMA_NAMES, Self::get_database_schema_names)
            .processor(handlers::YIELD_SCHEMA_TAGS, Self::yield_schema_tags)
            .processor(handlers::YIELD_SCHEMA, Self::yield_schema)
            .producer(handlers::GET_TABLES, Self::get_tables)
            .processor(handlers::YIELD_TABLE, Self::yield_table)
            .producer(handlers::GET_STORED_PROCEDURES, Self::get_stored_procedures)
            .processor(handlers::YIELD_STORED_PROCEDURE, Self::yield_stored_procedure)
            .hook(handlers::YIELD_VIEW_LINEAGE, Self::yield_view_lineage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RunContext;
    use crate::filter::FilterPattern;
    use crate::status::Status;
    use catsync_topology::{presets, Stage};

    const CATALOG: &str = r"
service:
  name: mysql_prod
  serviceType: Mysql
databases:
  - name: sales
    schemas:
      - name: public
        tables:
          - name: orders
            columns:
              - { name: id, dataType: INT }
          - name: tmp_orders
          - name: big_orders
            tableType: View
            viewDefinition: select * from orders
            upstream: [orders, audit.events]
  - name: scratch
";

    fn source(config: &SourceConfig) -> CatalogSource {
        CatalogSource::new(Catalog::from_yaml_str(CATALOG).unwrap(), config).unwrap()
    }

    fn context_at(service: &str, db: &str, schema: &str) -> RunContext {
        let mut ctx = RunContext::new();
        ctx.update_context_name(&Stage::new(EntityType::DATABASE_SERVICE, "s").with_context(slots::DATABASE_SERVICE), service);
        ctx.update_context_name(&Stage::new(EntityType::DATABASE, "d").with_context(slots::DATABASE), db);
        ctx.update_context_name(
            &Stage::new(EntityType::DATABASE_SCHEMA, "s").with_context(slots::DATABASE_SCHEMA),
            schema,
        );
        ctx
    }

    #[test]
    fn parses_defaults() {
        let catalog = Catalog::from_yaml_str(CATALOG).unwrap();
        assert_eq!(catalog.databases.len(), 2);
        let tables = &catalog.databases[0].schemas[0].tables;
        assert_eq!(tables[0].table_type, TableType::Regular);
        assert_eq!(tables[2].table_type, TableType::View);
        assert!(catalog.databases[1].schemas.is_empty());
    }

    #[test]
    fn handlers_cover_the_database_service_topology() {
        let topology = presets::database_service().unwrap();
        assert!(CatalogSource::handlers().check(&topology).is_ok());
    }

    #[test]
    fn service_name_override() {
        let src = source(&SourceConfig {
            service_name: Some("renamed".into()),
            ..SourceConfig::default()
        });
        assert_eq!(src.service_name(), "renamed");
    }

    #[test]
    fn tables_are_filtered_and_recorded() {
        let config = SourceConfig {
            table_filter_pattern: FilterPattern::excludes(["tmp_"]),
            ..SourceConfig::default()
        };
        let mut src = source(&config);
        let ctx = context_at("mysql_prod", "sales", "public");
        let mut status = Status::new();
        let mut scope = SourceScope::new(&ctx, &mut status);

        let names: Vec<String> = src
            .get_tables(&mut scope)
            .unwrap()
            .unwrap()
            .map(|item| match item {
                CatalogItem::Table(t) => t.name,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["orders", "big_orders"]);
        assert_eq!(status.filtered[0].name, "mysql_prod.sales.public.tmp_orders");
        assert_eq!(status.filtered[0].reason, "Table Filtered Out");
    }

    #[test]
    fn fqn_filtering_matches_full_names() {
        let config = SourceConfig {
            use_fqn_for_filtering: true,
            database_filter_pattern: FilterPattern::includes([r"mysql_prod\.sales$"]),
            ..SourceConfig::default()
        };
        let mut src = source(&config);
        let ctx = context_at("mysql_prod", "sales", "public");
        let mut status = Status::new();
        let mut scope = SourceScope::new(&ctx, &mut status);
        let count = src.get_database_names(&mut scope).unwrap().unwrap().count();
        assert_eq!(count, 1);
        assert_eq!(status.filtered[0].name, "mysql_prod.scratch");
    }

    #[test]
    fn views_become_lineage_after_tables() {
        let mut src = source(&SourceConfig::default());
        let ctx = context_at("mysql_prod", "sales", "public");
        let mut status = Status::new();
        let mut scope = SourceScope::new(&ctx, &mut status);

        let mut view = src.catalog.databases[0].schemas[0].tables[2].clone();
        view.upstream.extend([
            "staging.raw.events".to_string(),
            "other_svc.sales.public.\"odd.name\"".to_string(),
        ]);
        let outcomes = src.yield_table(&CatalogItem::Table(view), &mut scope).unwrap();
        let Some(crate::entity::Request::Create(create)) = outcomes[0].as_request() else {
            panic!("expected a create request");
        };
        assert_eq!(create.fqn(), "mysql_prod.sales.public.big_orders");
        assert_eq!(create.fields["tableType"], "View");
        assert_eq!(src.pending_views(), 1);

        let lineage = src.yield_view_lineage(&mut scope).unwrap();
        let edges: Vec<String> = lineage
            .iter()
            .filter_map(|o| match o.as_request() {
                Some(crate::entity::Request::Lineage(edge)) => Some(edge.from.fqn.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            edges,
            vec![
                "mysql_prod.sales.public.orders",
                "mysql_prod.sales.audit.events",
                "mysql_prod.staging.raw.events",
                "other_svc.sales.public.\"odd.name\"",
            ]
        );
        assert_eq!(src.pending_views(), 0);
    }

    #[test]
    fn wrong_item_kind_is_an_error() {
        let mut src = source(&SourceConfig::default());
        let ctx = context_at("mysql_prod", "sales", "public");
        let mut status = Status::new();
        let mut scope = SourceScope::new(&ctx, &mut status);
        let err = src
            .yield_table(
                &CatalogItem::Database {
                    name: "x".into(),
                    description: None,
                },
                &mut scope,
            )
            .unwrap_err();
        assert!(err.to_string().contains("expected a table item"));
    }
}
