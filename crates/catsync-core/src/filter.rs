//! Include/exclude name filters
//!
//! Patterns are regexes anchored at the start of the name. A name is
//! filtered out when it matches an exclude pattern, or when includes are
//! given and it matches none of them.

use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Raw filter configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPattern {
    /// Keep only names matching one of these
    pub includes: Vec<String>,
    /// Drop names matching any of these
    pub excludes: Vec<String>,
}

impl FilterPattern {
    /// Filter keeping only `patterns`
    #[must_use]
    pub fn includes<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            includes: patterns.into_iter().map(Into::into).collect(),
            excludes: Vec::new(),
        }
    }

    /// Filter dropping `patterns`
    #[must_use]
    pub fn excludes<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            includes: Vec::new(),
            excludes: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// Compile into a [`NameFilter`]
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidPattern`] for the first invalid regex
    pub fn compile(&self) -> Result<NameFilter, ConfigError> {
        Ok(NameFilter {
            includes: compile_all(&self.includes)?,
            excludes: compile_all(&self.excludes)?,
        })
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(&format!("^(?:{pattern})")).map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

/// Compiled filter
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    includes: Vec<Regex>,
    excludes: Vec<Regex>,
}

impl NameFilter {
    /// Whether `name` should be skipped
    #[must_use]
    pub fn is_filtered(&self, name: &str) -> bool {
        if self.excludes.iter().any(|re| re.is_match(name)) {
            return true;
        }
        !self.includes.is_empty() && !self.includes.iter().any(|re| re.is_match(name))
    }
}
