//! catsync Topology
//!
//! Static description of how a source is walked: which producer enumerates
//! each level, which stages turn produced items into requests, and which
//! levels nest under which.
//!
//! # Construction
//!
//! ```rust,ignore
//! use catsync_topology::{EntityType, Stage, TopologyBuilder, TopologyNode};
//!
//! let topology = TopologyBuilder::new()
//!     .node(
//!         TopologyNode::new("database", "get_database_names")
//!             .stage(Stage::new(EntityType::DATABASE, "yield_database").with_context("database"))
//!             .child("database_schema"),
//!     )
//!     .node(/* ... */)
//!     .build()?;
//! ```
//!
//! [`TopologyBuilder::build`] rejects unknown children, cycles and nodes with
//! several parents, and derives every stage's FQN consumer slots from its
//! ancestors.

#![warn(missing_docs, unreachable_pub)]

mod builder;
mod entity_type;
mod error;
mod node;
pub mod presets;
mod stage;
mod topology;

pub use builder::TopologyBuilder;
pub use entity_type::EntityType;
pub use error::TopologyError;
pub use node::TopologyNode;
pub use stage::Stage;
pub use topology::{HandlerNames, NodeId, Topology};
