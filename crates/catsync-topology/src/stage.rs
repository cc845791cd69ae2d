use crate::entity_type::EntityType;
use serde::Serialize;

/// One transform within a topology node
///
/// A stage turns each item produced by its node into zero or more requests
/// for `entity_type`, and declares how the engine should reconcile them.
///
/// Flags:
/// - `nullable`: the processor may legitimately produce nothing
/// - `must_ack`: the written entity must be observable before descending
/// - `cache_entities`: after this stage, bulk-load fingerprints for children
/// - `use_cache`: compare this stage's requests against cached fingerprints
/// - `context`: Run Context slot fed with the emitted entity
/// - `clear_context`: drop that slot once the node's item is done
/// - `overwrite`: when false, existing entities are never rewritten
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    /// Target entity type
    pub entity_type: EntityType,
    /// Processor handler name
    pub processor: String,
    /// Processor may produce nothing without a warning
    pub nullable: bool,
    /// Written entity must be visible before descending
    pub must_ack: bool,
    /// Preload children's fingerprints after this stage
    pub cache_entities: bool,
    /// Compare requests against cached fingerprints
    pub use_cache: bool,
    /// Run Context slot fed with the emitted entity
    pub context: Option<String>,
    /// Drop the slot once the node's item is done
    pub clear_context: bool,
    /// Rewrite entities that already exist
    pub overwrite: bool,
    /// Ancestor slots joined into FQNs, root first
    ///
    /// Left unset, the topology builder derives it from the node's ancestors.
    pub consumer: Option<Vec<String>>,
    /// Filter key used when this stage's type is bulk-listed under a parent
    pub scope_param: Option<String>,
}

impl Stage {
    /// Create a stage with default flags
    #[must_use]
    pub fn new(entity_type: EntityType, processor: impl Into<String>) -> Self {
        Self {
            entity_type,
            processor: processor.into(),
            nullable: false,
            must_ack: false,
            cache_entities: false,
            use_cache: false,
            context: None,
            clear_context: false,
            overwrite: true,
            consumer: None,
            scope_param: None,
        }
    }

    /// Feed emitted entities into the given context slot
    #[inline]
    #[must_use]
    pub fn with_context(mut self, slot: impl Into<String>) -> Self {
        self.context = Some(slot.into());
        self
    }

    /// Allow the processor to produce nothing
    #[inline]
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Require the written entity to be visible before descending
    #[inline]
    #[must_use]
    pub fn must_ack(mut self) -> Self {
        self.must_ack = true;
        self
    }

    /// Preload children's fingerprints after this stage
    #[inline]
    #[must_use]
    pub fn cache_entities(mut self) -> Self {
        self.cache_entities = true;
        self
    }

    /// Skip writes whose fingerprint is cached
    #[inline]
    #[must_use]
    pub fn use_cache(mut self) -> Self {
        self.use_cache = true;
        self
    }

    /// Clear the context slot after each item
    #[inline]
    #[must_use]
    pub fn clear_context(mut self) -> Self {
        self.clear_context = true;
        self
    }

    /// Never rewrite an entity that already exists remotely
    #[inline]
    #[must_use]
    pub fn no_overwrite(mut self) -> Self {
        self.overwrite = false;
        self
    }

    /// Set the FQN consumer slots explicitly
    #[must_use]
    pub fn with_consumer<I, S>(mut self, slots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.consumer = Some(slots.into_iter().map(Into::into).collect());
        self
    }

    /// Override the bulk-listing filter key
    #[inline]
    #[must_use]
    pub fn with_scope_param(mut self, param: impl Into<String>) -> Self {
        self.scope_param = Some(param.into());
        self
    }

    /// FQN consumer slots (empty until resolved)
    #[inline]
    #[must_use]
    pub fn consumer(&self) -> &[String] {
        self.consumer.as_deref().unwrap_or_default()
    }

    /// Filter key to list this stage's type under `parent`
    #[must_use]
    pub fn scope_param_under<'a>(&'a self, parent: &'a EntityType) -> &'a str {
        self.scope_param
            .as_deref()
            .unwrap_or_else(|| parent.scope_param())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_overwrite_and_nothing_else() {
        let stage = Stage::new(EntityType::TABLE, "yield_table");
        assert!(stage.overwrite);
        assert!(!stage.nullable && !stage.must_ack && !stage.use_cache);
        assert!(stage.context.is_none());
        assert!(stage.consumer().is_empty());
    }

    #[test]
    fn builder_flags() {
        let stage = Stage::new(EntityType::DATABASE_SERVICE, "yield_service")
            .with_context("database_service")
            .must_ack()
            .cache_entities()
            .no_overwrite();
        assert_eq!(stage.context.as_deref(), Some("database_service"));
        assert!(stage.must_ack && stage.cache_entities && !stage.overwrite);
    }

    #[test]
    fn scope_param_override_wins() {
        let parent = EntityType::DATABASE_SCHEMA;
        let default = Stage::new(EntityType::TABLE, "yield_table");
        assert_eq!(default.scope_param_under(&parent), "databaseSchema");

        let custom = default.with_scope_param("schema");
        assert_eq!(custom.scope_param_under(&parent), "schema");
    }
}
