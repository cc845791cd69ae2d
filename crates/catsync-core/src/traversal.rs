//! Traversal engine
//!
//! Walks a [`Topology`] depth first and yields one [`EntityOutcome`] per
//! pull. The walk is an explicit stack of frames, one per level being
//! iterated, so it can suspend after every outcome and resume exactly where
//! it stopped.
//!
//! Per node, in declared order:
//! 1. call the producer (`Ok(None)` is an empty sequence, a node without a
//!    producer is skipped, an error becomes a failure record)
//! 2. for each item run every stage, clear `clear_context` slots, then walk
//!    the children
//! 3. run the post-process hooks, each isolated from the others
//!
//! The consumer writes each yielded request before pulling again; the
//! dispatcher's settlement for it (acknowledgement, context update) runs at
//! the start of the next pull.

use crate::context::RunState;
use crate::dispatch::{Dispatcher, Settlement};
use crate::entity::{EntityOutcome, FailureKind, FailureRecord};
use crate::error::EngineError;
use crate::source::{Candidates, Handlers, Source, SourceScope};
use crate::stage::{StageProcessor, Sunk};
use catsync_topology::{NodeId, Topology};
use futures::Stream;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info_span, warn};

/// Items of one node being iterated
struct NodeRun<C> {
    node: NodeId,
    candidates: Candidates<C>,
}

/// One item going through its node's stages
struct CandidateRun<C> {
    candidate: C,
    stage: usize,
    /// Outcomes of the current stage not dispatched yet
    queue: Option<VecDeque<EntityOutcome>>,
    /// Set after a fatal failure; remaining stages and children are skipped
    aborted: bool,
}

impl<C> CandidateRun<C> {
    fn new(candidate: C) -> Self {
        Self {
            candidate,
            stage: 0,
            queue: None,
            aborted: false,
        }
    }
}

enum Step<C> {
    /// Call the producer of `nodes[cursor]`
    Enter,
    /// Pull the next item
    Candidates(NodeRun<C>),
    /// Run stages for the current item
    Stages(NodeRun<C>, CandidateRun<C>),
    /// Run hooks, then move to the next node
    PostProcess(NodeId),
}

/// One level of the walk: sibling nodes and where we are among them
struct Frame<C> {
    nodes: Vec<NodeId>,
    cursor: usize,
    step: Option<Step<C>>,
}

impl<C> Frame<C> {
    fn new(nodes: Vec<NodeId>) -> Self {
        Self {
            nodes,
            cursor: 0,
            step: Some(Step::Enter),
        }
    }
}

/// Settlement owed for the last yielded outcome
struct Pending {
    node: NodeId,
    stage: usize,
    settlement: Settlement,
}

/// Pull-based depth-first walk of a topology
pub struct Traversal<S, C> {
    topology: Arc<Topology>,
    source: S,
    handlers: Handlers<S, C>,
    processor: StageProcessor,
    state: RunState,
    stack: Vec<Frame<C>>,
    outbox: VecDeque<EntityOutcome>,
    pending: Option<Pending>,
}

impl<S, C> std::fmt::Debug for Traversal<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Traversal")
            .field("depth", &self.stack.len())
            .field("outbox", &self.outbox.len())
            .field("pending", &self.pending.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S: Source> Traversal<S, S::Candidate> {
    /// Walk `topology` with the source's own handler table
    ///
    /// # Errors
    /// Returns [`EngineError::UnregisteredHandler`] if the topology names a
    /// handler the source does not register
    pub fn for_source(
        topology: Arc<Topology>,
        source: S,
        dispatcher: Dispatcher,
    ) -> Result<Self, EngineError> {
        Self::new(topology, source, S::handlers(), dispatcher)
    }
}

impl<S, C> Traversal<S, C> {
    /// Prepare a walk over every root of `topology`
    ///
    /// # Errors
    /// Returns [`EngineError::UnregisteredHandler`] if the topology names a
    /// handler missing from `handlers`
    pub fn new(
        topology: Arc<Topology>,
        source: S,
        handlers: Handlers<S, C>,
        dispatcher: Dispatcher,
    ) -> Result<Self, EngineError> {
        handlers.check(&topology)?;
        let mut traversal = Self {
            topology,
            source,
            handlers,
            processor: StageProcessor::new(dispatcher),
            state: RunState::new(),
            stack: Vec::new(),
            outbox: VecDeque::new(),
            pending: None,
        };
        let roots = traversal.topology.roots().to_vec();
        traversal.process_nodes(roots);
        Ok(traversal)
    }

    /// Queue `nodes` (and their subtrees) to be walked before anything
    /// already queued
    pub fn process_nodes(&mut self, nodes: Vec<NodeId>) {
        if !nodes.is_empty() {
            self.stack.push(Frame::new(nodes));
        }
    }

    /// Replace the run state, e.g. to start from a warm fingerprint cache
    #[must_use]
    pub fn with_state(mut self, state: RunState) -> Self {
        self.state = state;
        self
    }

    /// Run state so far
    #[inline]
    #[must_use]
    pub fn state(&self) -> &RunState {
        &self.state
    }

    /// The source being walked
    #[inline]
    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Settle anything still owed and hand back the source and run state
    pub async fn finish(mut self) -> (S, RunState) {
        if let Some(failure) = self.settle_pending().await {
            warn!(name = %failure.name, error = %failure.error, "settlement failed at shutdown");
            self.state.status.failed(failure);
        }
        (self.source, self.state)
    }

    /// Next outcome, or `None` once the topology is exhausted
    pub async fn next_outcome(&mut self) -> Option<EntityOutcome> {
        if let Some(failure) = self.settle_pending().await {
            return Some(EntityOutcome::Failure(failure));
        }
        self.advance().await
    }

    /// Turn the walk into a stream of outcomes
    pub fn into_stream(self) -> impl Stream<Item = EntityOutcome> {
        futures::stream::unfold(self, |mut traversal| async move {
            let outcome = traversal.next_outcome().await?;
            Some((outcome, traversal))
        })
    }

    async fn settle_pending(&mut self) -> Option<FailureRecord> {
        let Pending {
            node,
            stage,
            settlement,
        } = self.pending.take()?;
        let stage = &self.topology.node(node).stages[stage];
        let name = settlement
            .ack
            .as_ref()
            .map_or_else(|| stage.entity_type.to_string(), |target| target.fqn.clone());

        let err = self
            .processor
            .dispatcher()
            .settle(&mut self.state, stage, settlement)
            .await
            .err()?;
        if err.is_fatal_for_branch() {
            warn!(%name, error = %err, "aborting branch");
            self.abort_current_candidate();
        }
        Some(err.into_failure(name))
    }

    fn abort_current_candidate(&mut self) {
        if let Some(Frame {
            step: Some(Step::Stages(_, run)),
            ..
        }) = self.stack.last_mut()
        {
            run.aborted = true;
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn advance(&mut self) -> Option<EntityOutcome> {
        loop {
            if let Some(outcome) = self.outbox.pop_front() {
                return Some(outcome);
            }
            let frame = self.stack.last_mut()?;
            let Some(step) = frame.step.take() else {
                self.stack.pop();
                continue;
            };

            match step {
                Step::Enter => {
                    let Some(&node_id) = frame.nodes.get(frame.cursor) else {
                        self.stack.pop();
                        continue;
                    };
                    let node = self.topology.node(node_id);
                    let Some(producer_name) = node.producer.as_deref() else {
                        debug!(node = %node.name, "no producer; skipping node");
                        frame.cursor += 1;
                        frame.step = Some(Step::Enter);
                        continue;
                    };
                    let _span = info_span!("node", node = %node.name).entered();
                    debug!(producer = producer_name, "producing");

                    let Some(producer) = self.handlers.get_producer(producer_name) else {
                        frame.step = Some(Step::PostProcess(node_id));
                        continue;
                    };
                    let mut scope = SourceScope::new(&self.state.context, &mut self.state.status);
                    frame.step = Some(match producer(&mut self.source, &mut scope) {
                        Ok(Some(candidates)) => Step::Candidates(NodeRun {
                            node: node_id,
                            candidates,
                        }),
                        Ok(None) => Step::PostProcess(node_id),
                        Err(err) => {
                            warn!(producer = producer_name, error = %err, "producer failed");
                            self.outbox.push_back(EntityOutcome::Failure(
                                FailureRecord::from_anyhow(producer_name, FailureKind::Transform, &err),
                            ));
                            Step::PostProcess(node_id)
                        }
                    });
                }

                Step::Candidates(mut run) => {
                    frame.step = Some(match run.candidates.next() {
                        Some(candidate) => Step::Stages(run, CandidateRun::new(candidate)),
                        None => Step::PostProcess(run.node),
                    });
                }

                Step::Stages(run, mut item) => {
                    let node = self.topology.node(run.node);

                    if item.aborted || item.stage >= node.stages.len() {
                        for stage in node.stages.iter().filter(|s| s.clear_context) {
                            self.state.context.clear_stage(stage);
                        }
                        let children = self.topology.children(run.node);
                        let descend = !item.aborted && !children.is_empty();
                        let children = children.to_vec();
                        frame.step = Some(Step::Candidates(run));
                        if descend {
                            self.stack.push(Frame::new(children));
                        }
                        continue;
                    }

                    let stage = &node.stages[item.stage];
                    if item.queue.is_none() {
                        let queue = match self.handlers.get_processor(&stage.processor) {
                            Some(processor) => self.processor.process_stage(
                                processor,
                                stage,
                                &mut self.source,
                                &item.candidate,
                                &mut self.state,
                            ),
                            None => VecDeque::new(),
                        };
                        item.queue = Some(queue);
                        frame.step = Some(Step::Stages(run, item));
                        continue;
                    }

                    let Some(outcome) = item.queue.as_mut().and_then(VecDeque::pop_front) else {
                        if stage.cache_entities {
                            let failures = self
                                .processor
                                .cache_children(&mut self.state, &self.topology, run.node, stage)
                                .await;
                            self.outbox
                                .extend(failures.into_iter().map(EntityOutcome::Failure));
                        }
                        item.stage += 1;
                        item.queue = None;
                        frame.step = Some(Step::Stages(run, item));
                        continue;
                    };

                    match self.processor.sink(&mut self.state, stage, outcome).await {
                        Sunk::Emit(outcome, settlement) => {
                            self.pending = settlement.map(|settlement| Pending {
                                node: run.node,
                                stage: item.stage,
                                settlement,
                            });
                            frame.step = Some(Step::Stages(run, item));
                            return Some(outcome);
                        }
                        Sunk::Settle(settlement) => {
                            if let Err(err) = self
                                .processor
                                .dispatcher()
                                .settle(&mut self.state, stage, settlement)
                                .await
                            {
                                item.aborted |= err.is_fatal_for_branch();
                                self.outbox.push_back(EntityOutcome::Failure(
                                    err.into_failure(stage.entity_type.to_string()),
                                ));
                            }
                        }
                        Sunk::Skipped => {}
                        Sunk::Failed { record, fatal } => {
                            item.aborted |= fatal;
                            self.outbox.push_back(EntityOutcome::Failure(record));
                        }
                    }
                    frame.step = Some(Step::Stages(run, item));
                }

                Step::PostProcess(node_id) => {
                    let node = self.topology.node(node_id);
                    for hook_name in &node.post_process {
                        let Some(hook) = self.handlers.get_hook(hook_name) else {
                            continue;
                        };
                        debug!(node = %node.name, hook = %hook_name, "post-processing");
                        let mut scope =
                            SourceScope::new(&self.state.context, &mut self.state.status);
                        match hook(&mut self.source, &mut scope) {
                            Ok(outcomes) => self.outbox.extend(outcomes),
                            Err(err) => {
                                warn!(hook = %hook_name, error = %err, "post-process hook failed");
                                self.state
                                    .status
                                    .warning(format!("hook `{hook_name}` failed: {err}"));
                            }
                        }
                    }
                    frame.cursor += 1;
                    frame.step = Some(Step::Enter);
                }
            }
        }
    }
}
