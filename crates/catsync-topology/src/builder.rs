//! Topology Builder
//!
//! The only way to obtain a [`Topology`]. Nodes are collected first and the
//! whole graph is validated in [`TopologyBuilder::build`].

use crate::error::TopologyError;
use crate::node::TopologyNode;
use crate::topology::{NodeId, Topology};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Builder for validated topologies
///
/// Usage:
/// ```rust,ignore
/// let topology = TopologyBuilder::new()
///     .node(service_node)
///     .node(database_node)
///     .build()?;
/// ```
#[derive(Debug, Default, Clone)]
pub struct TopologyBuilder {
    nodes: Vec<TopologyNode>,
}

impl TopologyBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node
    #[must_use]
    pub fn node(mut self, node: TopologyNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// Number of nodes added so far
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Validate and freeze the topology
    ///
    /// # Errors
    /// Returns `TopologyError` if:
    /// - no nodes were added, or two share a name
    /// - a node has no stages, or a stage sets `must_ack`/`cache_entities`
    ///   without a context slot
    /// - a child name is unknown, or a node has several parents
    /// - child references form a cycle
    pub fn build(self) -> Result<Topology, TopologyError> {
        let mut nodes = self.nodes;
        if nodes.is_empty() {
            return Err(TopologyError::Empty);
        }

        let mut by_name = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if by_name.insert(node.name.clone(), NodeId(i)).is_some() {
                return Err(TopologyError::DuplicateNode(node.name.clone()));
            }
            check_stages(node)?;
        }

        let mut graph = DiGraph::<usize, ()>::with_capacity(nodes.len(), nodes.len());
        let indices: Vec<NodeIndex> = (0..nodes.len()).map(|i| graph.add_node(i)).collect();
        let mut parent: Vec<Option<usize>> = vec![None; nodes.len()];
        let mut children = vec![Vec::new(); nodes.len()];

        for (i, node) in nodes.iter().enumerate() {
            for child in &node.children {
                let Some(&NodeId(c)) = by_name.get(child) else {
                    return Err(TopologyError::UnknownChild {
                        node: node.name.clone(),
                        child: child.clone(),
                    });
                };
                if let Some(p) = parent[c] {
                    if p != i {
                        return Err(TopologyError::MultipleParents {
                            node: child.clone(),
                            first: nodes[p].name.clone(),
                            second: node.name.clone(),
                        });
                    }
                }
                parent[c] = Some(i);
                children[i].push(NodeId(c));
                graph.add_edge(indices[i], indices[c], ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            let at = graph[cycle.node_id()];
            return Err(TopologyError::CycleDetected(nodes[at].name.clone()));
        }

        let roots: Vec<NodeId> = (0..nodes.len())
            .filter(|&i| parent[i].is_none())
            .map(NodeId)
            .collect();

        derive_consumers(&mut nodes, &children, &roots);

        Ok(Topology::from_parts(nodes, by_name, children, roots))
    }
}

fn check_stages(node: &TopologyNode) -> Result<(), TopologyError> {
    if node.stages.is_empty() {
        return Err(TopologyError::NoStages(node.name.clone()));
    }
    for stage in &node.stages {
        if stage.context.is_some() {
            continue;
        }
        let flag = if stage.must_ack {
            "must_ack"
        } else if stage.cache_entities {
            "cache_entities"
        } else {
            continue;
        };
        return Err(TopologyError::MissingContext {
            node: node.name.clone(),
            processor: stage.processor.clone(),
            flag,
        });
    }
    Ok(())
}

/// Fill unset stage consumers with the context slots of all ancestors
fn derive_consumers(nodes: &mut [TopologyNode], children: &[Vec<NodeId>], roots: &[NodeId]) {
    let mut stack: Vec<(NodeId, Vec<String>)> =
        roots.iter().rev().map(|&r| (r, Vec::new())).collect();

    while let Some((NodeId(i), ancestors)) = stack.pop() {
        let node = &mut nodes[i];
        for stage in &mut node.stages {
            if stage.consumer.is_none() {
                stage.consumer = Some(ancestors.clone());
            }
        }

        let mut below = ancestors;
        below.extend(node.context_slots().map(str::to_owned));
        for &child in children[i].iter().rev() {
            stack.push((child, below.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntityType, Stage};

    fn leaf(name: &str) -> TopologyNode {
        TopologyNode::new(name, format!("get_{name}"))
            .stage(Stage::new(EntityType::new(name), format!("yield_{name}")).with_context(name))
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(TopologyBuilder::new().build().unwrap_err(), TopologyError::Empty);
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = TopologyBuilder::new()
            .node(leaf("a"))
            .node(leaf("a"))
            .build()
            .unwrap_err();
        assert_eq!(err, TopologyError::DuplicateNode("a".into()));
    }

    #[test]
    fn rejects_unknown_child() {
        let err = TopologyBuilder::new()
            .node(leaf("a").child("ghost"))
            .build()
            .unwrap_err();
        assert!(matches!(err, TopologyError::UnknownChild { ref child, .. } if child == "ghost"));
    }

    #[test]
    fn rejects_cycles() {
        let err = TopologyBuilder::new()
            .node(leaf("root").child("a"))
            .node(leaf("a").child("b"))
            .node(leaf("b").child("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, TopologyError::MultipleParents { .. } | TopologyError::CycleDetected(_)));
    }

    #[test]
    fn rejects_self_loop() {
        let err = TopologyBuilder::new()
            .node(leaf("a").child("a"))
            .build()
            .unwrap_err();
        assert_eq!(err, TopologyError::CycleDetected("a".into()));
    }

    #[test]
    fn rejects_cache_without_context() {
        let node = TopologyNode::new("a", "get_a")
            .stage(Stage::new(EntityType::new("a"), "yield_a").cache_entities());
        let err = TopologyBuilder::new().node(node).build().unwrap_err();
        assert!(matches!(
            err,
            TopologyError::MissingContext { flag: "cache_entities", .. }
        ));
    }

    #[test]
    fn rejects_nodes_without_stages() {
        let err = TopologyBuilder::new()
            .node(TopologyNode::new("a", "get_a"))
            .build()
            .unwrap_err();
        assert_eq!(err, TopologyError::NoStages("a".into()));
    }

    #[test]
    fn derives_consumers_from_ancestors() {
        let topology = TopologyBuilder::new()
            .node(leaf("service").child("database"))
            .node(leaf("database").child("schema"))
            .node(leaf("schema"))
            .build()
            .unwrap();

        let schema = topology.find("schema").unwrap();
        assert_eq!(
            topology.node(schema).stages[0].consumer(),
            ["service".to_string(), "database".to_string()]
        );
        let service = topology.find("service").unwrap();
        assert!(topology.node(service).stages[0].consumer().is_empty());
    }

    #[test]
    fn keeps_explicit_consumers() {
        let node = TopologyNode::new("table", "get_table").stage(
            Stage::new(EntityType::TABLE, "yield_table")
                .with_context("table")
                .with_consumer(["schema"]),
        );
        let topology = TopologyBuilder::new()
            .node(leaf("database").child("table"))
            .node(node)
            .build()
            .unwrap();
        let table = topology.find("table").unwrap();
        assert_eq!(topology.node(table).stages[0].consumer(), ["schema".to_string()]);
    }
}
