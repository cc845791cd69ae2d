//! Run Context
//!
//! Mutable scope carried through one depth-first traversal. Each stage with
//! a context slot writes the identity it just confirmed; nested stages read
//! their ancestors' slots to build FQNs.
//!
//! # Invariant
//!
//! Values only flow parent → child within one branch. A slot written by a
//! `clear_context` stage is removed once its node's item has run all stages,
//! so sibling items never see it.

use crate::cache::FingerprintStore;
use crate::entity::Request;
use crate::fqn;
use crate::status::Status;
use catsync_topology::Stage;
use indexmap::IndexMap;

/// Value held by a context slot
#[derive(Debug, Clone, PartialEq)]
pub enum ContextValue {
    /// Confirmed entity name, used for FQN building
    Name(String),
    /// Full request, for stages whose consumers need the whole object
    Request(Box<Request>),
}

/// Slot name → most recently confirmed value, in nesting order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunContext {
    slots: IndexMap<String, ContextValue>,
}

impl RunContext {
    /// Context with no slots filled
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a confirmed name in the stage's slot
    ///
    /// No-op for stages without a slot.
    pub fn update_context_name(&mut self, stage: &Stage, name: impl Into<String>) {
        if let Some(slot) = &stage.context {
            self.slots
                .insert(slot.clone(), ContextValue::Name(name.into()));
        }
    }

    /// Store a whole request in the stage's slot
    pub fn update_context_value(&mut self, stage: &Stage, value: Request) {
        if let Some(slot) = &stage.context {
            self.slots
                .insert(slot.clone(), ContextValue::Request(Box::new(value)));
        }
    }

    /// Remove the stage's slot
    pub fn clear_stage(&mut self, stage: &Stage) {
        if let Some(slot) = &stage.context {
            self.slots.shift_remove(slot);
        }
    }

    /// FQN for `name` under the stage's currently-set ancestor names
    ///
    /// Ancestors are the stage's consumer slots, root first; unset slots and
    /// slots holding full requests are skipped.
    #[must_use]
    pub fn fqn_from_stage(&self, stage: &Stage, name: &str) -> String {
        let ancestors = stage.consumer().iter().filter_map(|slot| self.name(slot));
        fqn::build(ancestors.chain(std::iter::once(name)))
    }

    /// FQN of the entity currently held in the stage's own slot
    #[must_use]
    pub fn current_fqn(&self, stage: &Stage) -> Option<String> {
        let slot = stage.context.as_deref()?;
        let name = self.name(slot)?;
        Some(self.fqn_from_stage(stage, name))
    }

    /// Name held by a slot
    #[must_use]
    pub fn name(&self, slot: &str) -> Option<&str> {
        match self.slots.get(slot)? {
            ContextValue::Name(name) => Some(name.as_str()),
            ContextValue::Request(_) => None,
        }
    }

    /// Request held by a slot
    #[must_use]
    pub fn value(&self, slot: &str) -> Option<&Request> {
        match self.slots.get(slot)? {
            ContextValue::Request(request) => Some(request.as_ref()),
            ContextValue::Name(_) => None,
        }
    }

    /// FQN made of the names held by `slots`, in the order given
    #[must_use]
    pub fn fqn_of(&self, slots: &[&str]) -> String {
        fqn::build(slots.iter().filter_map(|slot| self.name(slot)))
    }

    /// Whether `slot` currently holds a value
    #[inline]
    #[must_use]
    pub fn contains(&self, slot: &str) -> bool {
        self.slots.contains_key(slot)
    }

    /// Number of filled slots
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// True when no slot is filled
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Everything mutable a traversal owns for the length of one run
///
/// Created when the traversal starts and handed back when it finishes;
/// nothing in here outlives the run.
#[derive(Debug, Default)]
pub struct RunState {
    /// Names and requests feeding the walk
    pub context: RunContext,
    /// Fingerprints preloaded by `cache_entities` stages
    pub fingerprints: FingerprintStore,
    /// What happened to every entity so far
    pub status: Status,
}

impl RunState {
    /// Fresh state for a new run
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}
