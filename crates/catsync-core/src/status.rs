//! Run status bookkeeping
//!
//! Counts what happened to every entity the traversal touched. Filtered
//! entities and suppressed writes are recorded here rather than surfacing as
//! outcomes.

use crate::entity::FailureRecord;
use serde::Serialize;

/// An entity skipped on purpose, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilteredEntity {
    /// Name or FQN of the skipped entity
    pub name: String,
    /// Why it was skipped, e.g. `Table Filtered Out`
    pub reason: String,
}

/// Per-run status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Status {
    /// Entities created (or fully rewritten)
    pub records: Vec<String>,
    /// Entities patched
    pub updated: Vec<String>,
    /// Writes suppressed because nothing changed
    pub unchanged: Vec<String>,
    /// Entities skipped by filters
    pub filtered: Vec<FilteredEntity>,
    /// Non-fatal problems
    pub warnings: Vec<String>,
    /// Failures recorded instead of raised
    pub failures: Vec<FailureRecord>,
}

/// Counts-only view of a [`Status`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    /// Entities created
    pub records: usize,
    /// Entities patched
    pub updated: usize,
    /// Writes suppressed
    pub unchanged: usize,
    /// Entities filtered out
    pub filtered: usize,
    /// Warnings
    pub warnings: usize,
    /// Failures
    pub failures: usize,
}

impl Status {
    /// Empty status
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a created entity
    pub fn scanned(&mut self, name: impl Into<String>) {
        self.records.push(name.into());
    }

    /// Record a patched entity
    pub fn patched(&mut self, name: impl Into<String>) {
        self.updated.push(name.into());
    }

    /// Record a suppressed write
    pub fn unchanged(&mut self, name: impl Into<String>) {
        self.unchanged.push(name.into());
    }

    /// Record an entity skipped by a filter
    pub fn filter(&mut self, name: impl Into<String>, reason: impl Into<String>) {
        self.filtered.push(FilteredEntity {
            name: name.into(),
            reason: reason.into(),
        });
    }

    /// Record a warning
    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Record a failure
    pub fn failed(&mut self, failure: FailureRecord) {
        self.failures.push(failure);
    }

    /// True once any failure is recorded
    #[inline]
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Append everything recorded in `other`
    pub fn merge(&mut self, other: Status) {
        self.records.extend(other.records);
        self.updated.extend(other.updated);
        self.unchanged.extend(other.unchanged);
        self.filtered.extend(other.filtered);
        self.warnings.extend(other.warnings);
        self.failures.extend(other.failures);
    }

    /// Counts of everything recorded
    #[must_use]
    pub fn summary(&self) -> StatusSummary {
        StatusSummary {
            records: self.records.len(),
            updated: self.updated.len(),
            unchanged: self.unchanged.len(),
            filtered: self.filtered.len(),
            warnings: self.warnings.len(),
            failures: self.failures.len(),
        }
    }

    /// Percentage of processed entities that did not fail
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let ok = self.records.len() + self.updated.len() + self.unchanged.len();
        let total = ok + self.failures.len();
        if total == 0 {
            return 100.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = ok as f64 * 100.0 / total as f64;
        rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FailureKind;

    #[test]
    fn summary_counts_each_bucket() {
        let mut status = Status::new();
        status.scanned("a");
        status.scanned("b");
        status.patched("c");
        status.unchanged("d");
        status.filter("e", "Table Filtered Out");
        status.failed(FailureRecord::new("f", FailureKind::Store, "down"));

        let summary = status.summary();
        assert_eq!(summary.records, 2);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.failures, 1);
        assert!(status.has_failures());
    }

    #[test]
    fn success_rate_without_work_is_full() {
        assert!((Status::new().success_rate() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn success_rate_counts_failures() {
        let mut status = Status::new();
        status.scanned("a");
        status.failed(FailureRecord::new("b", FailureKind::Transform, "boom"));
        assert!((status.success_rate() - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn merge_appends() {
        let mut a = Status::new();
        a.scanned("x");
        let mut b = Status::new();
        b.unchanged("y");
        b.warning("careful");
        a.merge(b);
        assert_eq!(a.records, vec!["x"]);
        assert_eq!(a.unchanged, vec!["y"]);
        assert_eq!(a.warnings, vec!["careful"]);
    }
}
