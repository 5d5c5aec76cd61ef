//! Session-level errors.

use pipeline::{GraphError, RemoteRequestError, RetryPolicy};
use thiserror::Error;

/// Errors returned by [`crate::PipelineSession`] operations.
///
/// Every error is scoped to the one operation that produced it; the session
/// stays usable and its local graph is unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// The operation was rejected by the local graph rules.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The service call failed. Surface to the user for a manual retry decision.
    #[error(transparent)]
    Remote(#[from] RemoteRequestError),

    /// `execute` was called before the pipeline was ever persisted.
    #[error("Pipeline has not been saved yet; add a node first")]
    NotPersisted,

    /// `execute` was called while a previous run request is still unanswered.
    #[error("A run request for this pipeline is already in flight")]
    ExecutionInFlight,
}

impl SyncError {
    /// Whether retrying the same operation could succeed.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            SyncError::Remote(err) => err.retry_policy(),
            SyncError::ExecutionInFlight => RetryPolicy::Retryable { after: None },
            SyncError::Graph(_) | SyncError::NotPersisted => RetryPolicy::NonRetryable,
        }
    }
}
