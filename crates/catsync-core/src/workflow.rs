//! Ingestion workflow
//!
//! Consumer side of a traversal: pulls each outcome, writes requests to the
//! sink before pulling again, and keeps the run's [`Status`].

use crate::entity::{EntityOutcome, FailureKind, FailureRecord, Request};
use crate::error::WorkflowError;
use crate::status::{Status, StatusSummary};
use crate::store::Sink;
use crate::traversal::Traversal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of one finished pass
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// When the pass began
    pub started_at: DateTime<Utc>,
    /// When the pass ended
    pub finished_at: DateTime<Utc>,
    /// Counts from `status`
    pub summary: StatusSummary,
    /// Percentage of processed entities that did not fail
    pub success_rate: f64,
    /// Full status
    pub status: Status,
}

impl RunReport {
    /// Wall time of the pass
    #[must_use]
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Drives a traversal into a sink
pub struct Workflow {
    sink: Arc<dyn Sink>,
    raise_on_error: bool,
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("raise_on_error", &self.raise_on_error)
            .finish_non_exhaustive()
    }
}

impl Workflow {
    /// Workflow writing into `sink`
    #[must_use]
    pub fn new(sink: Arc<dyn Sink>) -> Self {
        Self {
            sink,
            raise_on_error: false,
        }
    }

    /// Stop at the first failure
    #[must_use]
    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }

    /// Run the traversal to completion
    ///
    /// # Errors
    /// Returns [`WorkflowError::Failed`] with the first failure when
    /// `raise_on_error` is set
    pub async fn run<S, C>(&self, traversal: Traversal<S, C>) -> Result<RunReport, WorkflowError> {
        self.run_with_source(traversal).await.map(|(report, _)| report)
    }

    /// Run the traversal to completion and hand the source back
    ///
    /// # Errors
    /// As [`Workflow::run`]
    pub async fn run_with_source<S, C>(
        &self,
        mut traversal: Traversal<S, C>,
    ) -> Result<(RunReport, S), WorkflowError> {
        let started_at = Utc::now();
        let mut status = Status::new();

        while let Some(outcome) = traversal.next_outcome().await {
            let failure = match outcome {
                EntityOutcome::Request(request) => self.write(&request, &mut status).await,
                EntityOutcome::Failure(failure) => Some(failure),
            };
            if let Some(failure) = failure {
                warn!(name = %failure.name, kind = ?failure.kind, error = %failure.error, "entity failed");
                if self.raise_on_error {
                    return Err(WorkflowError::Failed(failure));
                }
                status.failed(failure);
            }
        }

        let (source, state) = traversal.finish().await;
        status.merge(state.status);
        let report = RunReport {
            started_at,
            finished_at: Utc::now(),
            summary: status.summary(),
            success_rate: status.success_rate(),
            status,
        };
        info!(
            written = report.summary.records,
            patched = report.summary.updated,
            unchanged = report.summary.unchanged,
            filtered = report.summary.filtered,
            failed = report.summary.failures,
            "ingestion finished"
        );
        Ok((report, source))
    }

    async fn write(&self, request: &Request, status: &mut Status) -> Option<FailureRecord> {
        let name = request.display_name();
        match self.sink.write(request).await {
            Ok(_) => {
                debug!(kind = ?request.kind(), %name, "written");
                match request {
                    Request::Patch(_) => status.patched(name),
                    _ => status.scanned(name),
                }
                None
            }
            Err(err) => Some(FailureRecord::from_error(name, FailureKind::Store, &err)),
        }
    }
}
