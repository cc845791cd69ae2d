//! Source boundary
//!
//! A source is plain state plus a table of named handlers. The topology
//! refers to handlers by name; [`Handlers::check`] makes sure every name it
//! uses is registered before a traversal starts.
//!
//! Handlers receive a [`SourceScope`]: read access to the Run Context (to
//! know which database/schema they are in) and write access to the run's
//! [`Status`] (to record filtered entities).

use crate::context::RunContext;
use crate::entity::EntityOutcome;
use crate::error::{EngineError, HandlerKind};
use crate::status::Status;
use catsync_topology::Topology;
use std::collections::HashMap;
use std::fmt::{self, Debug, Formatter};

/// Lazily produced raw items for one node
pub type Candidates<C> = Box<dyn Iterator<Item = C> + Send>;

/// Enumerates the raw items of a node; `Ok(None)` means nothing to produce
pub type Producer<S, C> = Box<
    dyn Fn(&mut S, &mut SourceScope<'_>) -> anyhow::Result<Option<Candidates<C>>> + Send + Sync,
>;

/// Turns one raw item into requests for a stage
pub type Processor<S, C> =
    Box<dyn Fn(&mut S, &C, &mut SourceScope<'_>) -> anyhow::Result<Vec<EntityOutcome>> + Send + Sync>;

/// Runs once after all of a node's items
pub type Hook<S> =
    Box<dyn Fn(&mut S, &mut SourceScope<'_>) -> anyhow::Result<Vec<EntityOutcome>> + Send + Sync>;

/// What a handler may see and touch while it runs
#[derive(Debug)]
pub struct SourceScope<'a> {
    context: &'a RunContext,
    status: &'a mut Status,
}

impl<'a> SourceScope<'a> {
    /// Scope over the current context and status
    #[must_use]
    pub fn new(context: &'a RunContext, status: &'a mut Status) -> Self {
        Self { context, status }
    }

    /// Read-only view of the run context
    #[inline]
    #[must_use]
    pub fn context(&self) -> &RunContext {
        self.context
    }

    /// Run status, for warnings and filtered entities
    #[inline]
    pub fn status(&mut self) -> &mut Status {
        self.status
    }

    /// Record an entity skipped by a filter
    pub fn filter(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.status.filter(name, reason);
    }
}

/// Named handler table for a source of state `S` producing items `C`
pub struct Handlers<S, C> {
    producers: HashMap<String, Producer<S, C>>,
    processors: HashMap<String, Processor<S, C>>,
    hooks: HashMap<String, Hook<S>>,
}

impl<S, C> Default for Handlers<S, C> {
    fn default() -> Self {
        Self {
            producers: HashMap::new(),
            processors: HashMap::new(),
            hooks: HashMap::new(),
        }
    }
}

impl<S, C> Debug for Handlers<S, C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let mut producers: Vec<_> = self.producers.keys().collect();
        let mut processors: Vec<_> = self.processors.keys().collect();
        let mut hooks: Vec<_> = self.hooks.keys().collect();
        producers.sort();
        processors.sort();
        hooks.sort();
        f.debug_struct("Handlers")
            .field("producers", &producers)
            .field("processors", &processors)
            .field("hooks", &hooks)
            .finish()
    }
}

impl<S, C> Handlers<S, C> {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer under `name`
    #[must_use]
    pub fn producer<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut S, &mut SourceScope<'_>) -> anyhow::Result<Option<Candidates<C>>>
            + Send
            + Sync
            + 'static,
    {
        self.producers.insert(name.into(), Box::new(handler));
        self
    }

    /// Register a processor under `name`
    #[must_use]
    pub fn processor<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut S, &C, &mut SourceScope<'_>) -> anyhow::Result<Vec<EntityOutcome>>
            + Send
            + Sync
            + 'static,
    {
        self.processors.insert(name.into(), Box::new(handler));
        self
    }

    /// Register a post-process hook under `name`
    #[must_use]
    pub fn hook<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&mut S, &mut SourceScope<'_>) -> anyhow::Result<Vec<EntityOutcome>>
            + Send
            + Sync
            + 'static,
    {
        self.hooks.insert(name.into(), Box::new(handler));
        self
    }

    /// Producer registered as `name`
    #[must_use]
    pub fn get_producer(&self, name: &str) -> Option<&Producer<S, C>> {
        self.producers.get(name)
    }

    /// Processor registered as `name`
    #[must_use]
    pub fn get_processor(&self, name: &str) -> Option<&Processor<S, C>> {
        self.processors.get(name)
    }

    /// Hook registered as `name`
    #[must_use]
    pub fn get_hook(&self, name: &str) -> Option<&Hook<S>> {
        self.hooks.get(name)
    }

    /// Ensure every handler the topology names is registered
    ///
    /// # Errors
    /// Returns [`EngineError::UnregisteredHandler`] for the first missing
    /// name, checking producers, then processors, then hooks
    pub fn check(&self, topology: &Topology) -> Result<(), EngineError> {
        let names = topology.handler_names();
        let missing = |kind, name: &str| EngineError::UnregisteredHandler {
            kind,
            name: name.to_string(),
        };
        if let Some(name) = names.producers.iter().find(|n| !self.producers.contains_key(**n)) {
            return Err(missing(HandlerKind::Producer, name));
        }
        if let Some(name) = names.processors.iter().find(|n| !self.processors.contains_key(**n)) {
            return Err(missing(HandlerKind::Processor, name));
        }
        if let Some(name) = names.hooks.iter().find(|n| !self.hooks.contains_key(**n)) {
            return Err(missing(HandlerKind::Hook, name));
        }
        Ok(())
    }
}

/// A source whose handler table is known statically
pub trait Source: Sized {
    /// Raw item produced by the source's producers
    type Candidate;

    /// Every handler the source's topology refers to
    fn handlers() -> Handlers<Self, Self::Candidate>;
}
