//! Error taxonomy for session operations.

use thiserror::Error;

use crate::ingest::IngestError;
use crate::models::QueryStatus;

pub type Result<T, E = SessionError> = std::result::Result<T, E>;

/// Errors raised by the session lifecycle manager.
///
/// `NotFound` and `InvalidState` are returned synchronously to callers and
/// never change a session. The other variants only occur inside background
/// workflows, where they are logged and turned into a `failed` status.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("external worker failed (exit code {exit_code:?}): {stderr}")]
    Invocation {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("ingestion failed: {0}")]
    Ingestion(#[from] IngestError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("workflow aborted: {0}")]
    Aborted(String),

    #[error("Query not found: {0}")]
    NotFound(String),

    #[error("session {id} is {status}")]
    InvalidState { id: String, status: QueryStatus },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
