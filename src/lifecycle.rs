//! Session lifecycle: starts background workflows and drives query status.
//!
//! `start_search` and `start_analysis` return as soon as the status change is
//! stored; the external worker runs on a tracked tokio task. Each workflow
//! ends with exactly one status transition, `completed` or `failed`, no
//! matter how it went wrong.
//!
//! At most one workflow runs per session: a search only runs while its
//! query is `processing`, and an analysis can only start from `completed`.
//! Across sessions a semaphore bounds how many worker processes run at once.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

use crate::config::ServiceConfig;
use crate::db::Database;
use crate::error::{Result, SessionError};
use crate::ingest;
use crate::models::*;
use crate::worker::{ExitOutcome, Invoker};

#[derive(Clone)]
pub struct SessionManager {
    db: Database,
    invoker: Arc<Invoker>,
    jobs: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
}

impl SessionManager {
    pub fn new(db: Database, config: ServiceConfig) -> Self {
        let cancel = CancellationToken::new();
        let jobs = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            db,
            invoker: Arc::new(Invoker::new(config, cancel.clone())),
            jobs,
            tracker: TaskTracker::new(),
            cancel,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &ServiceConfig {
        self.invoker.config()
    }

    /// Number of workflows that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Create a session in `processing` and start its search in the
    /// background.
    pub fn start_search(&self, params: SearchParams) -> Result<Query> {
        let query_text = params.query.trim();
        if query_text.is_empty() {
            return Err(SessionError::InvalidRequest("query must not be empty".into()));
        }
        if params.num_results == 0 {
            return Err(SessionError::InvalidRequest(
                "num_results must be at least 1".into(),
            ));
        }

        let query = self.db.create_query(CreateQueryInput::from(&params))?;
        tracing::info!("Created session {} for {:?}", query.id, query.query);

        let this = self.clone();
        let id = query.id.clone();
        let span = tracing::info_span!("workflow", session_id = %id, operation = "search");
        self.tracker.spawn(
            async move { this.run_search_workflow(id, params).await }.instrument(span),
        );

        Ok(query)
    }

    /// Move a completed session to `analyzing` and start the analysis in the
    /// background.
    ///
    /// Fails without touching the store when the session does not exist or
    /// is not `completed`.
    pub fn start_analysis(&self, id: &str) -> Result<Query> {
        let query = match self.db.transition_query_status(id, QueryStatus::Analyzing)? {
            Transition::Applied(query) => query,
            Transition::NotFound => return Err(SessionError::NotFound(id.to_string())),
            Transition::Rejected(status) => {
                return Err(SessionError::InvalidState {
                    id: id.to_string(),
                    status,
                })
            }
        };
        tracing::info!("Session {} is now analyzing", id);

        let this = self.clone();
        let id = query.id.clone();
        let span = tracing::info_span!("workflow", session_id = %id, operation = "analyze");
        self.tracker
            .spawn(async move { this.run_analysis_workflow(id).await }.instrument(span));

        Ok(query)
    }

    /// Fail every session a previous process left in flight.
    pub fn reconcile_stale(&self) -> Result<usize> {
        let count = self.db.fail_stale_queries()?;
        if count > 0 {
            tracing::warn!("Marked {} stale session(s) as failed", count);
        }
        Ok(count)
    }

    /// Give running workflows `shutdown_grace` to finish, then kill their
    /// workers.
    ///
    /// Killed workflows still record `failed` before this returns.
    pub async fn shutdown(&self) {
        self.tracker.close();
        let grace = self.config().shutdown_grace;

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                "{} workflow(s) still running after {:?}; terminating workers",
                self.tracker.len(),
                grace
            );
            self.cancel.cancel();
            self.tracker.wait().await;
        }
        tracing::info!("Session manager stopped");
    }

    async fn run_search_workflow(self, id: String, params: SearchParams) {
        let this = self.clone();
        let workflow_id = id.clone();
        let result = flatten(
            tokio::spawn(
                async move { this.search(&workflow_id, &params).await }.in_current_span(),
            )
            .await,
        );
        if let Ok(count) = &result {
            tracing::info!("Stored {} summaries", count);
        }
        self.finish(&id, result.map(|_| ()));
    }

    async fn run_analysis_workflow(self, id: String) {
        let this = self.clone();
        let workflow_id = id.clone();
        let result = flatten(
            tokio::spawn(async move { this.analyze(&workflow_id).await }.in_current_span())
                .await,
        );
        self.finish(&id, result);
    }

    async fn search(&self, id: &str, params: &SearchParams) -> Result<usize> {
        let (output_dir, outcome) = {
            let _slot = self.acquire_job_slot().await?;
            self.invoker.invoke_search(id, params).await
        };
        check(outcome)?;

        let session_id = id.to_string();
        let summaries =
            tokio::task::spawn_blocking(move || ingest::ingest(&output_dir, &session_id))
                .await
                .map_err(|e| SessionError::Aborted(format!("ingestion task failed: {e}")))??;

        Ok(self.db.add_summaries(&summaries)?)
    }

    async fn analyze(&self, id: &str) -> Result<()> {
        let output_dir = self.config().session_dir(id);
        let outcome = {
            let _slot = self.acquire_job_slot().await?;
            self.invoker.invoke_analyze(&output_dir).await
        };
        check(outcome)
    }

    async fn acquire_job_slot(&self) -> Result<OwnedSemaphorePermit> {
        tokio::select! {
            _ = self.cancel.cancelled() => Err(SessionError::Aborted("shutting down".into())),
            permit = self.jobs.clone().acquire_owned() => {
                permit.map_err(|_| SessionError::Aborted("job queue closed".into()))
            }
        }
    }

    /// Record the terminal status of a workflow. Never fails.
    fn finish(&self, id: &str, result: Result<()>) {
        let next = match result {
            Ok(()) => QueryStatus::Completed,
            Err(e) => {
                tracing::error!("Workflow for session {} failed: {}", id, e);
                QueryStatus::Failed
            }
        };

        match self.db.transition_query_status(id, next) {
            Ok(Transition::Applied(_)) => tracing::info!("Session {} is now {}", id, next),
            Ok(Transition::NotFound) => {
                tracing::warn!("Session {} disappeared before it could be marked {}", id, next)
            }
            Ok(Transition::Rejected(current)) => tracing::warn!(
                "Session {} is {}; not moving it to {}",
                id,
                current,
                next
            ),
            Err(e) => tracing::error!("Failed to mark session {} as {}: {:#}", id, next, e),
        }
    }
}

fn check(outcome: ExitOutcome) -> Result<()> {
    match outcome {
        ExitOutcome::Success => Ok(()),
        ExitOutcome::Failure {
            exit_code,
            stderr_snippet,
        } => Err(SessionError::Invocation {
            exit_code,
            stderr: stderr_snippet,
        }),
    }
}

/// Treat a panicked workflow task like any other workflow failure.
fn flatten<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>) -> Result<T> {
    joined.unwrap_or_else(|e| Err(SessionError::Aborted(format!("workflow task panicked: {e}"))))
}
