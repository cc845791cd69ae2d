use crate::node::TopologyNode;
use serde::Serialize;
use std::collections::HashMap;

/// Index of a node within its [`Topology`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position in declaration order
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// A validated, immutable source topology
///
/// Only produced by [`TopologyBuilder::build`](crate::TopologyBuilder::build),
/// so children always resolve and the child relation is a forest.
#[derive(Debug, Clone, Serialize)]
pub struct Topology {
    nodes: Vec<TopologyNode>,
    #[serde(skip)]
    by_name: HashMap<String, NodeId>,
    #[serde(skip)]
    children: Vec<Vec<NodeId>>,
    roots: Vec<NodeId>,
}

impl Topology {
    pub(crate) fn from_parts(
        nodes: Vec<TopologyNode>,
        by_name: HashMap<String, NodeId>,
        children: Vec<Vec<NodeId>>,
        roots: Vec<NodeId>,
    ) -> Self {
        Self {
            nodes,
            by_name,
            children,
            roots,
        }
    }

    /// Nodes nobody lists as a child, in declaration order
    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Resolved children of a node, in declared order
    #[inline]
    #[must_use]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.children[id.0]
    }

    /// Node at `id`
    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> &TopologyNode {
        &self.nodes[id.0]
    }

    /// Node named `name`
    #[must_use]
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when there are no nodes
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &TopologyNode)> + '_ {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Every producer, processor and hook name the topology refers to
    #[must_use]
    pub fn handler_names(&self) -> HandlerNames<'_> {
        let mut names = HandlerNames::default();
        for node in &self.nodes {
            names.producers.extend(node.producer.as_deref());
            names
                .processors
                .extend(node.stages.iter().map(|s| s.processor.as_str()));
            names
                .hooks
                .extend(node.post_process.iter().map(String::as_str));
        }
        names
    }
}

/// Handler names referenced by a topology, grouped by kind
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HandlerNames<'a> {
    /// Producer names
    pub producers: Vec<&'a str>,
    /// Processor names
    pub processors: Vec<&'a str>,
    /// Post-process hook names
    pub hooks: Vec<&'a str>,
}
