use crate::stage::Stage;
use serde::Serialize;

/// One level of a source topology
///
/// The producer enumerates raw items for this level; every stage runs on
/// each item in order; children are walked once per item, depth first;
/// post-process hooks run after the last item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopologyNode {
    /// Unique node name, referenced by parents' `children`
    pub name: String,
    /// Producer handler name; a node without one is skipped
    pub producer: Option<String>,
    /// Stages run on each item, in order
    pub stages: Vec<Stage>,
    /// Child node names, in traversal order
    pub children: Vec<String>,
    /// Post-process hook names, run in order after all items
    pub post_process: Vec<String>,
}

impl TopologyNode {
    /// Create a node driven by `producer`
    #[must_use]
    pub fn new(name: impl Into<String>, producer: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            producer: Some(producer.into()),
            stages: Vec::new(),
            children: Vec::new(),
            post_process: Vec::new(),
        }
    }

    /// Create a node with no producer
    #[must_use]
    pub fn without_producer(name: impl Into<String>) -> Self {
        Self {
            producer: None,
            ..Self::new(name, String::new())
        }
    }

    /// Append a stage
    #[must_use]
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Append a child node name
    #[must_use]
    pub fn child(mut self, name: impl Into<String>) -> Self {
        self.children.push(name.into());
        self
    }

    /// Append a post-process hook
    #[must_use]
    pub fn post_process(mut self, hook: impl Into<String>) -> Self {
        self.post_process.push(hook.into());
        self
    }

    /// Context slots this node's stages feed, in stage order
    pub fn context_slots(&self) -> impl Iterator<Item = &str> + '_ {
        self.stages.iter().filter_map(|s| s.context.as_deref())
    }
}
