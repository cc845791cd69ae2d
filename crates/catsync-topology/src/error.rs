/// Errors raised while building a [`Topology`](crate::Topology)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopologyError {
    /// Topology has no nodes
    #[error("topology has no nodes")]
    Empty,

    /// Two nodes share a name
    #[error("duplicate node `{0}`")]
    DuplicateNode(String),

    /// A node lists a child that was never declared
    #[error("node `{node}` references unknown child `{child}`")]
    UnknownChild {
        /// Parent node
        node: String,
        /// Child name that matches no node
        child: String,
    },

    /// A node is listed as the child of more than one parent
    #[error("node `{node}` has several parents: `{first}` and `{second}`")]
    MultipleParents {
        /// Node with several parents
        node: String,
        /// First parent seen
        first: String,
        /// Second parent seen
        second: String,
    },

    /// Child references form a cycle
    #[error("cycle detected through node `{0}`")]
    CycleDetected(String),

    /// A node has no stages
    #[error("node `{0}` declares no stages")]
    NoStages(String),

    /// A stage needs a context slot for the flag it sets
    #[error("stage `{processor}` in node `{node}` sets `{flag}` but has no context slot")]
    MissingContext {
        /// Node holding the stage
        node: String,
        /// Processor of the stage
        processor: String,
        /// Flag that needs the slot
        flag: &'static str,
    },
}
