//! Error types for catsync
//!
//! Provides error handling for:
//! - Remote store and sink failures
//! - Per-request dispatch failures (validation, missing acknowledgement)
//! - Engine construction (topology, handler registration)
//! - Configuration loading
//! - Workflow-level escalation

use crate::entity::{FailureKind, FailureRecord};
use catsync_fingerprint::FingerprintError;
use catsync_topology::{EntityType, TopologyError};
use std::path::PathBuf;

/// Remote store / sink errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Store could not be reached or answered with a server error
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Write targeted an entity that does not exist
    #[error("{entity_type} `{fqn}` not found")]
    NotFound {
        /// Type of the missing entity
        entity_type: EntityType,
        /// FQN of the missing entity
        fqn: String,
    },

    /// Store rejected the request
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Payload could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors raised while dispatching a single request
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Request is structurally invalid or unexpectedly empty
    #[error("invalid request: {0}")]
    Validation(String),

    /// Fingerprint could not be computed
    #[error("fingerprint failed: {0}")]
    Fingerprint(#[from] FingerprintError),

    /// Remote lookup failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Written entity never became visible within the retry budget
    #[error(
        "missing ack back from [{entity_type}: {fqn}] after {attempts} lookups; \
         descendants cannot be resolved without it"
    )]
    MissingAck {
        /// Type of the unacknowledged entity
        entity_type: EntityType,
        /// FQN of the unacknowledged entity
        fqn: String,
        /// Lookups made
        attempts: u32,
    },
}

impl DispatchError {
    /// Validation errors are logged and skipped, never recorded as failures
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Missing acknowledgements stop the whole branch
    #[inline]
    #[must_use]
    pub fn is_fatal_for_branch(&self) -> bool {
        matches!(self, Self::MissingAck { .. })
    }

    /// Failure kind to record this error under
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::MissingAck { .. } => FailureKind::MissingAck,
            Self::Store(_) => FailureKind::Store,
            Self::Validation(_) | Self::Fingerprint(_) => FailureKind::Transform,
        }
    }

    /// Convert into a failure record for `name`
    #[must_use]
    pub fn into_failure(self, name: impl Into<String>) -> FailureRecord {
        FailureRecord::from_error(name, self.failure_kind(), &self)
    }
}

/// Kind of source handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    /// Enumerates items
    Producer,
    /// Turns an item into requests
    Processor,
    /// Runs after a node's items
    Hook,
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Producer => "producer",
            Self::Processor => "processor",
            Self::Hook => "post-process hook",
        })
    }
}

/// Errors raised while assembling a traversal
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Topology failed validation
    #[error("invalid topology: {0}")]
    Topology(#[from] TopologyError),

    /// Topology names a handler the source never registered
    #[error("{kind} `{name}` is not registered")]
    UnregisteredHandler {
        /// Which registry was consulted
        kind: HandlerKind,
        /// Handler name the topology uses
        name: String,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config is not valid YAML for the expected shape
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Filter pattern is not a valid regex
    #[error("invalid filter pattern `{pattern}`: {source}")]
    InvalidPattern {
        /// Pattern as written
        pattern: String,
        /// Regex compile error
        #[source]
        source: regex::Error,
    },

    /// Values are well-formed but unusable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Workflow-level errors
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Traversal could not be built
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A failure was escalated because `raise_on_error` is set
    #[error("ingestion stopped at `{}`: {}", .0.name, .0.error)]
    Failed(FailureRecord),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ack_is_fatal_and_named() {
        let err = DispatchError::MissingAck {
            entity_type: EntityType::DATABASE_SERVICE,
            fqn: "svc".into(),
            attempts: 3,
        };
        assert!(err.is_fatal_for_branch());
        assert!(!err.is_validation());
        assert!(err.to_string().contains("[databaseService: svc]"));

        let record = err.into_failure("svc");
        assert_eq!(record.kind, FailureKind::MissingAck);
    }

    #[test]
    fn store_errors_keep_cause_in_trace() {
        let err = DispatchError::from(StoreError::Unavailable("503".into()));
        let record = err.into_failure("svc.db");
        assert_eq!(record.kind, FailureKind::Store);
        assert!(record.stack_trace.unwrap().contains("store unavailable: 503"));
    }

    #[test]
    fn unregistered_handler_display() {
        let err = EngineError::UnregisteredHandler {
            kind: HandlerKind::Hook,
            name: "yield_view_lineage".into(),
        };
        assert_eq!(
            err.to_string(),
            "post-process hook `yield_view_lineage` is not registered"
        );
    }
}
