use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt::{self, Display, Formatter};

/// Name of a remote entity type, e.g. `table` or `databaseService`
///
/// Open set: sources may target types the engine has never heard of. The
/// associated constants cover the types used by the standard presets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(Cow<'static, str>);

impl EntityType {
    /// Database service, the root of a database source
    pub const DATABASE_SERVICE: Self = Self::from_static("databaseService");
    /// Database
    pub const DATABASE: Self = Self::from_static("database");
    /// Schema within a database
    pub const DATABASE_SCHEMA: Self = Self::from_static("databaseSchema");
    /// Table or view
    pub const TABLE: Self = Self::from_static("table");
    /// Stored procedure
    pub const STORED_PROCEDURE: Self = Self::from_static("storedProcedure");
    /// Classification grouping tags
    pub const CLASSIFICATION: Self = Self::from_static("classification");
    /// Tag within a classification
    pub const TAG: Self = Self::from_static("tag");
    /// Lineage edge
    pub const LINEAGE: Self = Self::from_static("lineage");
    /// Custom property definition
    pub const CUSTOM_PROPERTY: Self = Self::from_static("customProperty");

    /// Type name known at compile time
    #[inline]
    #[must_use]
    pub const fn from_static(name: &'static str) -> Self {
        Self(Cow::Borrowed(name))
    }

    /// Type name built at runtime
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    /// Type name as sent to the store
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Service-level types sit at the root of a source and own everything
    /// below them
    #[inline]
    #[must_use]
    pub fn is_service(&self) -> bool {
        self.0.ends_with("Service")
    }

    /// Filter key used when bulk-listing children of this type
    ///
    /// Services are filtered by `service`; every other parent by its own
    /// type name (`database`, `databaseSchema`, ...).
    #[must_use]
    pub fn scope_param(&self) -> &str {
        if self.is_service() {
            "service"
        } else {
            self.as_str()
        }
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for EntityType {
    fn from(name: &'static str) -> Self {
        Self::from_static(name)
    }
}
