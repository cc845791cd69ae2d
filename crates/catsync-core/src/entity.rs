//! Entities, requests and outcomes
//!
//! Entity payloads are free-form JSON: the engine only relies on a type, a
//! name, a parent FQN and the stored `sourceHash`. Everything else travels
//! in `fields` untouched.

use crate::fqn;
use catsync_fingerprint::{Fingerprint, FingerprintError};
use catsync_topology::EntityType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

/// Field list asking the store for every field
pub const ALL_FIELDS: &[&str] = &["*"];

/// Field holding the stored fingerprint
pub const SOURCE_HASH_FIELD: &str = "sourceHash";

/// Server-assigned or bookkeeping fields left out of fingerprints
pub const VOLATILE_FIELDS: &[&str] = &[
    "id",
    "version",
    "updatedAt",
    "updatedBy",
    "href",
    "changeDescription",
    SOURCE_HASH_FIELD,
];

/// A record as stored by the remote metadata store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Store-assigned identifier
    pub id: Uuid,
    /// Entity type
    pub entity_type: EntityType,
    /// Leaf name
    pub name: String,
    /// Full dotted path from the service down
    pub fully_qualified_name: String,
    /// Absent on entities written before fingerprinting existed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    /// Bumped by every write
    pub version: u32,
    /// Everything else, as stored
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Full create (upsert) payload for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    /// Type to create
    pub entity_type: EntityType,
    /// Leaf name; the FQN is `parent.name`
    pub name: String,
    /// FQN of the owning entity, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Fingerprint of this request, filled in by the dispatcher
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    /// Type-specific payload
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl CreateRequest {
    /// Bare request with no parent or fields
    #[must_use]
    pub fn new(entity_type: EntityType, name: impl Into<String>) -> Self {
        Self {
            entity_type,
            name: name.into(),
            parent: None,
            source_hash: None,
            fields: Map::new(),
        }
    }

    /// Set the owning entity's FQN
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Add one payload field
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// FQN this request will be stored under
    #[must_use]
    pub fn fqn(&self) -> String {
        fqn::join(self.parent.as_deref(), &self.name)
    }

    /// Fingerprint over the semantic fields of the request
    ///
    /// # Errors
    /// Returns error if the fields cannot be serialized
    pub fn fingerprint(&self) -> Result<Fingerprint, FingerprintError> {
        Fingerprint::of_serializable(self, VOLATILE_FIELDS)
    }
}

/// Partial update of an existing entity
///
/// Carries the stored entity and the entity it should become; the sink
/// derives whatever diff format the store speaks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchRequest {
    /// Entity as currently stored
    pub original: Entity,
    /// Entity after the patch
    pub updated: Entity,
}

impl PatchRequest {
    /// Top-level fields whose values differ, sorted
    #[must_use]
    pub fn changed_fields(&self) -> Vec<String> {
        let mut changed: Vec<String> = self
            .updated
            .fields
            .iter()
            .filter(|(k, v)| self.original.fields.get(*k) != Some(*v))
            .map(|(k, _)| k.clone())
            .chain(
                self.original
                    .fields
                    .keys()
                    .filter(|k| !self.updated.fields.contains_key(*k))
                    .cloned(),
            )
            .collect();
        if self.original.source_hash != self.updated.source_hash {
            changed.push(SOURCE_HASH_FIELD.to_string());
        }
        changed.sort();
        changed
    }
}

/// Pointer to an entity by type and FQN
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReference {
    /// Type of the target
    pub entity_type: EntityType,
    /// FQN of the target
    pub fqn: String,
}

impl EntityReference {
    /// Reference to `fqn`
    #[must_use]
    pub fn new(entity_type: EntityType, fqn: impl Into<String>) -> Self {
        Self {
            entity_type,
            fqn: fqn.into(),
        }
    }
}

impl Display for EntityReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.fqn)
    }
}

/// Directed lineage edge between two entities
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageRequest {
    /// Upstream entity
    pub from: EntityReference,
    /// Downstream entity
    pub to: EntityReference,
    /// Query that moves data along the edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
}

/// Classification plus one of its tags, optionally applied to an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRequest {
    /// Classification name
    pub classification: String,
    /// Tag name
    pub tag: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// FQN of the entity the tag labels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_fqn: Option<String>,
}

impl ClassificationRequest {
    /// `classification.tag`
    #[must_use]
    pub fn tag_fqn(&self) -> String {
        fqn::build([self.classification.as_str(), self.tag.as_str()])
    }
}

/// Custom property added to an entity type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomPropertyRequest {
    /// Type gaining the property
    pub entity_type: EntityType,
    /// Property name
    pub name: String,
    /// Value type, e.g. `string`
    pub property_type: String,
    /// Free-text description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Request variants the dispatcher knows how to reconcile
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Request {
    /// Create or fully rewrite an entity
    Create(CreateRequest),
    /// Patch an existing entity
    Patch(PatchRequest),
    /// Add a lineage edge
    Lineage(LineageRequest),
    /// Create a classification tag, optionally applying it
    Classification(ClassificationRequest),
    /// Add a custom property
    CustomProperty(CustomPropertyRequest),
}

/// Discriminant of [`Request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// See [`Request::Create`]
    Create,
    /// See [`Request::Patch`]
    Patch,
    /// See [`Request::Lineage`]
    Lineage,
    /// See [`Request::Classification`]
    Classification,
    /// See [`Request::CustomProperty`]
    CustomProperty,
}

impl Request {
    /// Which variant this is
    #[must_use]
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Create(_) => RequestKind::Create,
            Self::Patch(_) => RequestKind::Patch,
            Self::Lineage(_) => RequestKind::Lineage,
            Self::Classification(_) => RequestKind::Classification,
            Self::CustomProperty(_) => RequestKind::CustomProperty,
        }
    }

    /// Human-readable name, used in logs and failure records
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            Self::Create(r) => r.fqn(),
            Self::Patch(r) => r.updated.fully_qualified_name.clone(),
            Self::Lineage(r) => format!("{} -> {}", r.from, r.to),
            Self::Classification(r) => r.tag_fqn(),
            Self::CustomProperty(r) => format!("{}.{}", r.entity_type, r.name),
        }
    }
}

/// What went wrong for a failure record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// A producer, processor or hook returned an error
    Transform,
    /// A remote store call failed
    Store,
    /// A written entity never became visible
    MissingAck,
}

/// Structured failure carried through the outcome stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    /// Handler or entity the failure belongs to
    pub name: String,
    /// Error message
    pub error: String,
    /// Error with its cause chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    /// Where the failure came from
    pub kind: FailureKind,
}

impl FailureRecord {
    /// Record without a stack trace
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            error: error.into(),
            stack_trace: None,
            kind,
        }
    }

    /// Build a record from an `anyhow` error, keeping its cause chain
    #[must_use]
    pub fn from_anyhow(name: impl Into<String>, kind: FailureKind, err: &anyhow::Error) -> Self {
        Self {
            name: name.into(),
            error: err.to_string(),
            stack_trace: Some(format!("{err:?}")),
            kind,
        }
    }

    /// Build a record from any error, rendering its `source()` chain
    #[must_use]
    pub fn from_error<E>(name: impl Into<String>, kind: FailureKind, err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut trace = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push_str("\n\nCaused by:\n    ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            name: name.into(),
            error: err.to_string(),
            stack_trace: Some(trace),
            kind,
        }
    }
}

/// Either a built request or a structured failure, never both
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityOutcome {
    /// A request for the sink
    Request(Request),
    /// A failure to record
    Failure(FailureRecord),
}

impl EntityOutcome {
    /// Wrap a create request
    #[inline]
    #[must_use]
    pub fn create(request: CreateRequest) -> Self {
        Self::Request(Request::Create(request))
    }

    /// Wrap a lineage request
    #[inline]
    #[must_use]
    pub fn lineage(request: LineageRequest) -> Self {
        Self::Request(Request::Lineage(request))
    }

    /// Wrap a classification request
    #[inline]
    #[must_use]
    pub fn classification(request: ClassificationRequest) -> Self {
        Self::Request(Request::Classification(request))
    }

    /// Wrap a custom property request
    #[inline]
    #[must_use]
    pub fn custom_property(request: CustomPropertyRequest) -> Self {
        Self::Request(Request::CustomProperty(request))
    }

    /// Wrap a failure
    #[inline]
    #[must_use]
    pub fn failure(record: FailureRecord) -> Self {
        Self::Failure(record)
    }

    /// The request, unless this is a failure
    #[inline]
    #[must_use]
    pub fn as_request(&self) -> Option<&Request> {
        match self {
            Self::Request(r) => Some(r),
            Self::Failure(_) => None,
        }
    }

    /// The failure, unless this is a request
    #[inline]
    #[must_use]
    pub fn as_failure(&self) -> Option<&FailureRecord> {
        match self {
            Self::Request(_) => None,
            Self::Failure(f) => Some(f),
        }
    }
}
