//! Reconciliation dispatcher
//!
//! Decides, per request, whether the remote store needs a create, a patch or
//! nothing at all, using the run's fingerprint cache and name lookups.
//!
//! # Write ordering
//!
//! [`Dispatcher::sink_request`] never writes. It returns the outcome to hand
//! to the sink plus a [`Settlement`]: the acknowledgement poll and context
//! update that must run *after* the caller has written the outcome. The
//! traversal applies it at the start of its next pull.

use crate::context::RunState;
use crate::entity::{
    CreateRequest, Entity, EntityOutcome, EntityReference, PatchRequest, Request, ALL_FIELDS,
};
use crate::error::DispatchError;
use crate::store::MetadataStore;
use catsync_topology::Stage;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

/// Default number of lookups before an unacknowledged write fails
pub const DEFAULT_ACK_ATTEMPTS: u32 = 3;

/// Strategy turning a stale entity plus a fresh candidate into a patch
pub trait PatchBuilder: Send + Sync + Debug {
    /// Build the patch bringing `original` in line with `candidate`
    fn build_patch(&self, original: &Entity, candidate: &CreateRequest) -> PatchRequest;

    /// Strategy name (for logging)
    fn name(&self) -> &'static str;
}

/// Overlay every candidate field onto the original
///
/// Fields only the store knows about (owners, followers, ...) survive, as do
/// the id, FQN and version.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShallowMerge;

impl PatchBuilder for ShallowMerge {
    fn build_patch(&self, original: &Entity, candidate: &CreateRequest) -> PatchRequest {
        let mut updated = original.clone();
        for (key, value) in &candidate.fields {
            updated.fields.insert(key.clone(), value.clone());
        }
        updated.source_hash.clone_from(&candidate.source_hash);
        PatchRequest {
            original: original.clone(),
            updated,
        }
    }

    fn name(&self) -> &'static str {
        "shallow_merge"
    }
}

/// Shallow merge that never overrides the listed fields when the original
/// already has them
///
/// Used for fields curated by hand in the store, like descriptions.
#[derive(Debug, Clone, Default)]
pub struct SelectiveMerge {
    /// Field names left untouched when already present
    pub preserve: Vec<String>,
}

impl SelectiveMerge {
    /// Preserve the given fields
    #[must_use]
    pub fn new<I, S>(preserve: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            preserve: preserve.into_iter().map(Into::into).collect(),
        }
    }
}

impl PatchBuilder for SelectiveMerge {
    fn build_patch(&self, original: &Entity, candidate: &CreateRequest) -> PatchRequest {
        let mut updated = original.clone();
        for (key, value) in &candidate.fields {
            if self.preserve.contains(key) && original.fields.contains_key(key) {
                continue;
            }
            updated.fields.insert(key.clone(), value.clone());
        }
        updated.source_hash.clone_from(&candidate.source_hash);
        PatchRequest {
            original: original.clone(),
            updated,
        }
    }

    fn name(&self) -> &'static str {
        "selective_merge"
    }
}

/// Context slot update deferred until after the write
#[derive(Debug, Clone, PartialEq)]
pub enum ContextUpdate {
    /// Store only the entity name
    Name(String),
    /// Store the whole request
    Value(Request),
}

/// Post-write work for one dispatched request
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    /// What to put in the stage's context slot
    pub update: ContextUpdate,
    /// Entity that must be observable before the update is applied
    pub ack: Option<EntityReference>,
}

impl Settlement {
    /// Fill the slot with a name
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            update: ContextUpdate::Name(name.into()),
            ack: None,
        }
    }

    /// Fill the slot with a request
    #[must_use]
    pub fn value(request: Request) -> Self {
        Self {
            update: ContextUpdate::Value(request),
            ack: None,
        }
    }

    /// Wait for `target` to be visible before settling
    #[must_use]
    pub fn with_ack(mut self, target: EntityReference) -> Self {
        self.ack = Some(target);
        self
    }
}

/// Result of dispatching one outcome
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    /// Outcome for the sink; `None` when the write is suppressed
    pub outcome: Option<EntityOutcome>,
    /// Context update to apply once the outcome is handled
    pub settlement: Option<Settlement>,
}

impl Dispatch {
    fn emit(outcome: EntityOutcome) -> Self {
        Self {
            outcome: Some(outcome),
            settlement: None,
        }
    }

    fn emit_settled(request: Request, settlement: Settlement) -> Self {
        Self {
            outcome: Some(EntityOutcome::Request(request)),
            settlement: Some(settlement),
        }
    }

    fn suppressed(settlement: Settlement) -> Self {
        Self {
            outcome: None,
            settlement: Some(settlement),
        }
    }

    /// Whether the write was skipped
    #[inline]
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.outcome.is_none()
    }
}

/// Create/patch/skip decision maker
pub struct Dispatcher {
    store: Arc<dyn MetadataStore>,
    patcher: Box<dyn PatchBuilder>,
    force_overwrite: bool,
    ack_attempts: u32,
}

impl Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("patcher", &self.patcher.name())
            .field("force_overwrite", &self.force_overwrite)
            .field("ack_attempts", &self.ack_attempts)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Dispatcher over `store` with shallow-merge patches
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self {
            store,
            patcher: Box::new(ShallowMerge),
            force_overwrite: false,
            ack_attempts: DEFAULT_ACK_ATTEMPTS,
        }
    }

    /// Use `patcher` to build patches
    #[must_use]
    pub fn with_patch_builder(mut self, patcher: Box<dyn PatchBuilder>) -> Self {
        self.patcher = patcher;
        self
    }

    /// Rewrite entities even on stages that opted out of overwriting
    #[must_use]
    pub fn force_overwrite(mut self, force: bool) -> Self {
        self.force_overwrite = force;
        self
    }

    /// Lookups before an unacknowledged write fails (at least one)
    #[must_use]
    pub fn with_ack_attempts(mut self, attempts: u32) -> Self {
        self.ack_attempts = attempts.max(1);
        self
    }

    /// Store used for lookups and acks
    #[inline]
    #[must_use]
    pub fn store(&self) -> &dyn MetadataStore {
        self.store.as_ref()
    }

    /// Lookups made before giving up on an ack
    #[inline]
    #[must_use]
    pub fn ack_attempts(&self) -> u32 {
        self.ack_attempts
    }

    /// Decide what, if anything, to write for `outcome`
    ///
    /// Failure records pass through untouched. Requests on stages without a
    /// context slot pass through without reconciliation.
    ///
    /// # Errors
    /// - [`DispatchError::Validation`] for blank names or self-referencing
    ///   lineage; the caller logs and skips the request
    /// - [`DispatchError::Store`] if a lookup fails
    /// - [`DispatchError::Fingerprint`] if the request cannot be hashed
    pub async fn sink_request(
        &self,
        state: &mut RunState,
        stage: &Stage,
        outcome: EntityOutcome,
    ) -> Result<Dispatch, DispatchError> {
        let request = match outcome {
            EntityOutcome::Failure(failure) => return Ok(Dispatch::emit(EntityOutcome::Failure(failure))),
            EntityOutcome::Request(request) => request,
        };
        validate(&request)?;

        if stage.context.is_none() {
            return Ok(Dispatch::emit(EntityOutcome::Request(request)));
        }

        match request {
            Request::Create(create) => self.reconcile_create(state, stage, create).await,
            Request::Patch(patch) => {
                let name = patch.updated.name.clone();
                Ok(Dispatch::emit_settled(Request::Patch(patch), Settlement::name(name)))
            }
            Request::Lineage(edge) => {
                let source = edge.from.fqn.clone();
                Ok(Dispatch::emit_settled(Request::Lineage(edge), Settlement::name(source)))
            }
            request @ (Request::Classification(_) | Request::CustomProperty(_)) => {
                let settlement = Settlement::value(request.clone());
                Ok(Dispatch::emit_settled(request, settlement))
            }
        }
    }

    async fn reconcile_create(
        &self,
        state: &mut RunState,
        stage: &Stage,
        mut create: CreateRequest,
    ) -> Result<Dispatch, DispatchError> {
        let entity_type = &stage.entity_type;
        let fqn = state.context.fqn_from_stage(stage, &create.name);

        if !stage.overwrite && !self.force_overwrite {
            if let Some(existing) = self.store.get_by_name(entity_type, &fqn, ALL_FIELDS).await? {
                debug!(%entity_type, %fqn, "exists and overwrite disabled; skipping write");
                state.status.unchanged(&fqn);
                return Ok(Dispatch::suppressed(Settlement::name(existing.name)));
            }
        }

        let fingerprint = create.fingerprint()?;
        create.source_hash = Some(fingerprint.to_string());

        if stage.use_cache {
            match state.fingerprints.get(entity_type, &fqn) {
                None => debug!(%entity_type, %fqn, "no cached fingerprint; creating"),
                Some(cached) if fingerprint.matches(cached) => {
                    debug!(%entity_type, %fqn, "fingerprint unchanged; skipping write");
                    state.status.unchanged(&fqn);
                    let mut settlement = Settlement::name(create.name);
                    if stage.must_ack {
                        // the listing may predate a remote delete
                        settlement = settlement
                            .with_ack(EntityReference::new(entity_type.clone(), fqn));
                    }
                    return Ok(Dispatch::suppressed(settlement));
                }
                Some(_) => {
                    if let Some(original) =
                        self.store.get_by_name(entity_type, &fqn, ALL_FIELDS).await?
                    {
                        let patch = self.patcher.build_patch(&original, &create);
                        debug!(
                            %entity_type,
                            %fqn,
                            strategy = self.patcher.name(),
                            changed = ?patch.changed_fields(),
                            "fingerprint changed; patching"
                        );
                        return Ok(Dispatch::emit_settled(
                            Request::Patch(patch),
                            Settlement::name(create.name),
                        ));
                    }
                    debug!(%entity_type, %fqn, "cached entity vanished remotely; creating");
                }
            }
        }

        let mut settlement = Settlement::name(create.name.clone());
        if stage.must_ack {
            settlement = settlement.with_ack(EntityReference::new(entity_type.clone(), fqn));
        }
        Ok(Dispatch::emit_settled(Request::Create(create), settlement))
    }

    /// Apply post-write work: poll for the acknowledgement if one is owed,
    /// then update the stage's context slot
    ///
    /// # Errors
    /// - [`DispatchError::MissingAck`] if the entity never became visible
    /// - [`DispatchError::Store`] if a lookup fails
    pub async fn settle(
        &self,
        state: &mut RunState,
        stage: &Stage,
        settlement: Settlement,
    ) -> Result<(), DispatchError> {
        if let Some(target) = &settlement.ack {
            self.await_ack(target).await?;
        }
        match settlement.update {
            ContextUpdate::Name(name) => state.context.update_context_name(stage, name),
            ContextUpdate::Value(request) => state.context.update_context_value(stage, request),
        }
        Ok(())
    }

    async fn await_ack(&self, target: &EntityReference) -> Result<Entity, DispatchError> {
        for attempt in 1..=self.ack_attempts {
            if let Some(entity) = self
                .store
                .get_by_name(&target.entity_type, &target.fqn, ALL_FIELDS)
                .await?
            {
                return Ok(entity);
            }
            debug!(%target, attempt, of = self.ack_attempts, "write not acknowledged yet");
        }
        Err(DispatchError::MissingAck {
            entity_type: target.entity_type.clone(),
            fqn: target.fqn.clone(),
            attempts: self.ack_attempts,
        })
    }
}

fn validate(request: &Request) -> Result<(), DispatchError> {
    match request {
        Request::Create(create) if create.name.trim().is_empty() => Err(DispatchError::Validation(
            format!("{} request has an empty name", create.entity_type),
        )),
        Request::Lineage(edge) if edge.from == edge.to => Err(DispatchError::Validation(format!(
            "lineage edge from {} to itself",
            edge.from
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{ClassificationRequest, LineageRequest};
    use crate::store::MemoryStore;
    use catsync_topology::EntityType;
    use serde_json::json;
    use uuid::Uuid;

    fn original() -> Entity {
        Entity {
            id: Uuid::new_v4(),
            entity_type: EntityType::TABLE,
            name: "orders".into(),
            fully_qualified_name: "svc.db.s.orders".into(),
            source_hash: Some("old".into()),
            version: 4,
            fields: json!({"description": "curated", "owner": "team-a"})
                .as_object()
                .cloned()
                .unwrap(),
        }
    }

    fn candidate() -> CreateRequest {
        let mut c = CreateRequest::new(EntityType::TABLE, "orders")
            .with_parent("svc.db.s")
            .with_field("description", json!("from source"))
            .with_field("columns", json!(["id"]));
        c.source_hash = Some("new".into());
        c
    }

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn shallow_merge_keeps_server_fields() {
        let patch = ShallowMerge.build_patch(&original(), &candidate());
        let updated = &patch.updated;
        assert_eq!(updated.id, patch.original.id);
        assert_eq!(updated.version, 4);
        assert_eq!(updated.fields["owner"], "team-a");
        assert_eq!(updated.fields["description"], "from source");
        assert_eq!(updated.source_hash.as_deref(), Some("new"));
    }

    #[test]
    fn selective_merge_preserves_listed_fields() {
        let patch = SelectiveMerge::new(["description"]).build_patch(&original(), &candidate());
        assert_eq!(patch.updated.fields["description"], "curated");
        assert_eq!(patch.updated.fields["columns"], json!(["id"]));
        assert_eq!(patch.changed_fields(), vec!["columns", "sourceHash"]);
    }

    #[test]
    fn ack_attempts_never_drop_to_zero() {
        assert_eq!(dispatcher().with_ack_attempts(0).ack_attempts(), 1);
        assert_eq!(dispatcher().ack_attempts(), DEFAULT_ACK_ATTEMPTS);
    }

    #[tokio::test]
    async fn blank_names_are_validation_errors() {
        let stage = Stage::new(EntityType::TABLE, "yield_table").with_context("table");
        let mut state = RunState::new();
        let err = dispatcher()
            .sink_request(
                &mut state,
                &stage,
                EntityOutcome::create(CreateRequest::new(EntityType::TABLE, "  ")),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn self_lineage_is_rejected() {
        let stage = Stage::new(EntityType::LINEAGE, "yield_view_lineage");
        let reference = EntityReference::new(EntityType::TABLE, "svc.db.s.v");
        let edge = LineageRequest {
            from: reference.clone(),
            to: reference,
            sql_query: None,
        };
        let err = dispatcher()
            .sink_request(&mut RunState::new(), &stage, EntityOutcome::lineage(edge))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn stage_without_slot_passes_request_through() {
        let stage = Stage::new(EntityType::TABLE, "yield_table").use_cache();
        let mut state = RunState::new();
        let outcome = EntityOutcome::create(candidate());
        let dispatch = dispatcher()
            .sink_request(&mut state, &stage, outcome.clone())
            .await
            .unwrap();
        assert_eq!(dispatch.outcome, Some(outcome));
        assert!(dispatch.settlement.is_none());
    }

    #[tokio::test]
    async fn classification_settles_full_value() {
        let stage = Stage::new(EntityType::CLASSIFICATION, "yield_tags").with_context("tags");
        let tag = ClassificationRequest {
            classification: "PII".into(),
            tag: "email".into(),
            description: None,
            target_fqn: Some("svc.db.s".into()),
        };
        let d = dispatcher();
        let mut state = RunState::new();
        let dispatch = d
            .sink_request(&mut state, &stage, EntityOutcome::classification(tag.clone()))
            .await
            .unwrap();
        assert!(!dispatch.is_suppressed());

        d.settle(&mut state, &stage, dispatch.settlement.unwrap())
            .await
            .unwrap();
        assert_eq!(state.context.value("tags"), Some(&Request::Classification(tag)));
    }

    #[tokio::test]
    async fn lineage_settles_source_endpoint() {
        let stage = Stage::new(EntityType::LINEAGE, "yield_lineage").with_context("lineage");
        let edge = LineageRequest {
            from: EntityReference::new(EntityType::TABLE, "svc.db.s.a"),
            to: EntityReference::new(EntityType::TABLE, "svc.db.s.v"),
            sql_query: Some("select * from a".into()),
        };
        let d = dispatcher();
        let mut state = RunState::new();
        let dispatch = d
            .sink_request(&mut state, &stage, EntityOutcome::lineage(edge))
            .await
            .unwrap();
        d.settle(&mut state, &stage, dispatch.settlement.unwrap())
            .await
            .unwrap();
        assert_eq!(state.context.name("lineage"), Some("svc.db.s.a"));
    }

    #[tokio::test]
    async fn cached_match_on_acked_stage_still_polls() {
        let stage = Stage::new(EntityType::TABLE, "yield_table")
            .with_context("table")
            .use_cache()
            .must_ack();
        let store = Arc::new(MemoryStore::new());
        let d = Dispatcher::new(store.clone());
        let request = CreateRequest::new(EntityType::TABLE, "orders");
        let fingerprint = request.fingerprint().unwrap();

        let mut state = RunState::new();
        state
            .fingerprints
            .insert(EntityType::TABLE, "orders", fingerprint.to_string());
        let dispatch = d
            .sink_request(&mut state, &stage, EntityOutcome::create(request))
            .await
            .unwrap();
        assert!(dispatch.is_suppressed());

        let err = d
            .settle(&mut state, &stage, dispatch.settlement.unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MissingAck { ref fqn, .. } if fqn == "orders"));
        assert_eq!(store.metrics().get_by_name, 3);
        assert!(!state.context.contains("table"));
    }

    #[tokio::test]
    async fn failures_pass_through() {
        let stage = Stage::new(EntityType::TABLE, "yield_table").with_context("table");
        let failure = EntityOutcome::failure(crate::entity::FailureRecord::new(
            "t",
            crate::entity::FailureKind::Transform,
            "boom",
        ));
        let dispatch = dispatcher()
            .sink_request(&mut RunState::new(), &stage, failure.clone())
            .await
            .unwrap();
        assert_eq!(dispatch.outcome, Some(failure));
    }
}
