//! Ingestion configuration
//!
//! Loaded from YAML:
//!
//! ```yaml
//! source:
//!   service_name: mysql_prod
//!   force_entity_overwriting: false
//!   ack_retries: 3
//!   table_filter_pattern:
//!     excludes: ["tmp_.*"]
//! workflow:
//!   raise_on_error: false
//! logging:
//!   level: info
//!   json: false
//! ```
//!
//! Every section and field is optional.

use crate::dispatch::DEFAULT_ACK_ATTEMPTS;
use crate::error::ConfigError;
use crate::filter::FilterPattern;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Source-side options
    pub source: SourceConfig,
    /// Workflow options
    pub workflow: WorkflowConfig,
    /// Logging options
    pub logging: LoggingConfig,
}

/// Source-side options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Overrides the service name found in the catalog
    pub service_name: Option<String>,
    /// Rewrite entities even on stages that never overwrite
    pub force_entity_overwriting: bool,
    /// Lookups before an unacknowledged write fails
    pub ack_retries: u32,
    /// Match filter patterns against FQNs instead of bare names
    pub use_fqn_for_filtering: bool,
    /// Databases to keep or skip
    pub database_filter_pattern: FilterPattern,
    /// Schemas to keep or skip
    pub schema_filter_pattern: FilterPattern,
    /// Tables to keep or skip
    pub table_filter_pattern: FilterPattern,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            service_name: None,
            force_entity_overwriting: false,
            ack_retries: DEFAULT_ACK_ATTEMPTS,
            use_fqn_for_filtering: false,
            database_filter_pattern: FilterPattern::default(),
            schema_filter_pattern: FilterPattern::default(),
            table_filter_pattern: FilterPattern::default(),
        }
    }
}

/// Workflow options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Stop at the first failure instead of recording it
    pub raise_on_error: bool,
}

/// Logging options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

impl IngestionConfig {
    /// Defaults for every option
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate YAML
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] for malformed YAML and
    /// [`ConfigError::Invalid`] / [`ConfigError::InvalidPattern`] for
    /// unusable values
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    ///
    /// # Errors
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`IngestionConfig::from_yaml_str`]
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    /// Check values serde cannot
    ///
    /// # Errors
    /// Returns the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.ack_retries == 0 {
            return Err(ConfigError::Invalid("source.ack_retries must be at least 1".into()));
        }
        if self
            .source
            .service_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(ConfigError::Invalid("source.service_name must not be blank".into()));
        }
        self.source.database_filter_pattern.compile()?;
        self.source.schema_filter_pattern.compile()?;
        self.source.table_filter_pattern.compile()?;
        Ok(())
    }

    /// Override the catalog's service name
    #[inline]
    #[must_use]
    pub fn with_service_name(mut self, name: impl Into<String>) -> Self {
        self.source.service_name = Some(name.into());
        self
    }

    /// Rewrite entities even on stages that never overwrite
    #[inline]
    #[must_use]
    pub fn with_force_overwrite(mut self, force: bool) -> Self {
        self.source.force_entity_overwriting = force;
        self
    }

    /// Lookups before an unacknowledged write fails
    #[inline]
    #[must_use]
    pub fn with_ack_retries(mut self, retries: u32) -> Self {
        self.source.ack_retries = retries;
        self
    }

    /// Match filters against FQNs instead of bare names
    #[inline]
    #[must_use]
    pub fn with_fqn_filtering(mut self, enabled: bool) -> Self {
        self.source.use_fqn_for_filtering = enabled;
        self
    }

    /// Replace the database filter
    #[inline]
    #[must_use]
    pub fn with_database_filter(mut self, pattern: FilterPattern) -> Self {
        self.source.database_filter_pattern = pattern;
        self
    }

    /// Replace the schema filter
    #[inline]
    #[must_use]
    pub fn with_schema_filter(mut self, pattern: FilterPattern) -> Self {
        self.source.schema_filter_pattern = pattern;
        self
    }

    /// Replace the table filter
    #[inline]
    #[must_use]
    pub fn with_table_filter(mut self, pattern: FilterPattern) -> Self {
        self.source.table_filter_pattern = pattern;
        self
    }

    /// Stop at the first failure
    #[inline]
    #[must_use]
    pub fn with_raise_on_error(mut self, raise: bool) -> Self {
        self.workflow.raise_on_error = raise;
        self
    }

    /// Default log filter directive
    #[inline]
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    /// Emit JSON log lines
    #[inline]
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.logging.json = json;
        self
    }
}
