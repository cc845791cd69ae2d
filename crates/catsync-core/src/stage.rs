//! Stage processor
//!
//! Runs one stage of a node over one produced item: invokes the processor,
//! hands each outcome to the dispatcher, and after a `cache_entities` stage
//! preloads the fingerprints its children will compare against.

use crate::context::RunState;
use crate::dispatch::{Dispatch, Dispatcher, Settlement};
use crate::entity::{EntityOutcome, FailureKind, FailureRecord};
use crate::source::{Processor, SourceScope};
use catsync_topology::{EntityType, NodeId, Stage, Topology};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// What became of one outcome after dispatch
#[derive(Debug, Clone, PartialEq)]
pub enum Sunk {
    /// Hand to the sink, then apply the settlement
    Emit(EntityOutcome, Option<Settlement>),
    /// Nothing to write; apply the settlement right away
    Settle(Settlement),
    /// Dropped after a validation error
    Skipped,
    /// Dispatch failed; `fatal` stops the rest of the item's branch
    Failed {
        /// What went wrong
        record: FailureRecord,
        /// Whether the rest of the item's branch is skipped
        fatal: bool,
    },
}

/// Runs stages against the dispatcher
#[derive(Debug)]
pub struct StageProcessor {
    dispatcher: Dispatcher,
}

impl StageProcessor {
    /// Stage processor writing through `dispatcher`
    #[must_use]
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Dispatcher deciding what to write
    #[inline]
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run the stage's processor over one item
    ///
    /// A processor error becomes a single transform failure. A non-nullable
    /// stage that produced nothing is reported as a warning.
    pub fn process_stage<S, C>(
        &self,
        processor: &Processor<S, C>,
        stage: &Stage,
        source: &mut S,
        candidate: &C,
        state: &mut RunState,
    ) -> VecDeque<EntityOutcome> {
        let mut scope = SourceScope::new(&state.context, &mut state.status);
        let outcomes = match processor(source, candidate, &mut scope) {
            Ok(outcomes) => outcomes,
            Err(err) => {
                warn!(processor = %stage.processor, error = %err, "processor failed");
                let record = FailureRecord::from_anyhow(&stage.processor, FailureKind::Transform, &err);
                return VecDeque::from([EntityOutcome::Failure(record)]);
            }
        };

        if outcomes.is_empty() && !stage.nullable {
            let message = format!(
                "stage `{}` produced no {} request",
                stage.processor, stage.entity_type
            );
            warn!(processor = %stage.processor, "{message}");
            state.status.warning(message);
        }
        outcomes.into()
    }

    /// Dispatch one outcome
    pub async fn sink(&self, state: &mut RunState, stage: &Stage, outcome: EntityOutcome) -> Sunk {
        let name = match &outcome {
            EntityOutcome::Request(request) => request.display_name(),
            EntityOutcome::Failure(failure) => failure.name.clone(),
        };
        match self.dispatcher.sink_request(state, stage, outcome).await {
            Ok(Dispatch {
                outcome: Some(outcome),
                settlement,
            }) => Sunk::Emit(outcome, settlement),
            Ok(Dispatch {
                outcome: None,
                settlement: Some(settlement),
            }) => Sunk::Settle(settlement),
            Ok(Dispatch {
                outcome: None,
                settlement: None,
            }) => Sunk::Skipped,
            Err(err) if err.is_validation() => {
                warn!(processor = %stage.processor, %name, error = %err, "skipping invalid request");
                state.status.warning(format!("{name}: {err}"));
                Sunk::Skipped
            }
            Err(err) => {
                let fatal = err.is_fatal_for_branch();
                Sunk::Failed {
                    record: err.into_failure(name),
                    fatal,
                }
            }
        }
    }

    /// Preload fingerprints for every caching child stage of `node`
    ///
    /// Scoped to the FQN `stage` just confirmed in the Run Context; one bulk
    /// listing per child entity type. Returns a store failure record per
    /// listing that failed.
    pub async fn cache_children(
        &self,
        state: &mut RunState,
        topology: &Topology,
        node: NodeId,
        stage: &Stage,
    ) -> Vec<FailureRecord> {
        let Some(scope) = state.context.current_fqn(stage) else {
            debug!(processor = %stage.processor, "no confirmed entity in context; cache not populated");
            return Vec::new();
        };

        let mut listed: Vec<&EntityType> = Vec::new();
        let mut failures = Vec::new();
        for &child in topology.children(node) {
            for child_stage in topology.node(child).stages.iter().filter(|s| s.use_cache) {
                if listed.contains(&&child_stage.entity_type) {
                    continue;
                }
                listed.push(&child_stage.entity_type);

                if let Err(err) = state
                    .fingerprints
                    .populate(self.dispatcher.store(), &stage.entity_type, child_stage, &scope)
                    .await
                {
                    warn!(
                        child_type = %child_stage.entity_type,
                        %scope,
                        error = %err,
                        "fingerprint cache population failed"
                    );
                    failures.push(FailureRecord::from_error(
                        format!("{scope} ({} fingerprints)", child_stage.entity_type),
                        FailureKind::Store,
                        &err,
                    ));
                }
            }
        }
        failures
    }
}
