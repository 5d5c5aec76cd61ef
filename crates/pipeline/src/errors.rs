//! Error and retry-policy types for the pipeline builder domain.
//!
//! [`GraphError`] covers misuse of the local graph operations. These are local,
//! non-fatal, and abort only the operation that produced them.
//!
//! [`RemoteRequestError`] covers failures talking to the visual-builder
//! service. It is produced by infrastructure adapters implementing
//! [`crate::PipelineService`] and carries a [`RetryPolicy`] so callers can
//! decide whether offering a manual retry makes sense. Nothing in the workspace
//! retries automatically.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ConnectionId, NodeId, TemplateId};

// ---------------------------------------------------------------------------
// Retry semantics
// ---------------------------------------------------------------------------

/// Whether an error condition is safe to retry and, if so, after what delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// The operation may be retried.
    Retryable {
        /// Minimum back-off before the next attempt, derived from a
        /// `Retry-After` header when the service sent one.
        after: Option<Duration>,
    },
    /// Retrying the same request will fail the same way.
    NonRetryable,
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

/// Errors produced by the local graph operations on [`crate::Pipeline`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// The requested node type is absent from the template registry.
    #[error("Node template not found: {template_id}")]
    TemplateNotFound { template_id: TemplateId },

    /// An operation referenced a node that is not in the pipeline.
    #[error("Node not found: {node_id}")]
    NodeNotFound { node_id: NodeId },

    /// A connection would join a node to itself.
    #[error("Invalid connection from {source_node_id} to {target_node_id}: {reason}")]
    InvalidConnection {
        source_node_id: NodeId,
        target_node_id: NodeId,
        reason: String,
    },

    /// A node with this id already exists in the pipeline.
    #[error("Duplicate node id: {node_id}")]
    DuplicateNode { node_id: NodeId },

    /// A connection with this id already exists in the pipeline.
    #[error("Duplicate connection id: {connection_id}")]
    DuplicateConnection { connection_id: ConnectionId },
}

// ---------------------------------------------------------------------------
// Remote errors
// ---------------------------------------------------------------------------

/// A call to the visual-builder service failed.
///
/// Whatever the variant, the local graph has not been modified: reconciliation
/// only happens after a successful response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteRequestError {
    /// The request never produced an HTTP response (DNS, connect, timeout).
    #[error("Transport failure: {message}")]
    Transport {
        message: String,
        /// `true` when the failure was a client-side timeout.
        timed_out: bool,
    },

    /// The service answered with a non-success status.
    #[error("Service returned HTTP {status}: {body}")]
    Status {
        status: u16,
        /// Response body, truncated for logging.
        body: String,
        /// Parsed `Retry-After`, if present.
        retry_after: Option<Duration>,
    },

    /// The response body did not match the expected shape.
    #[error("Malformed response body: {message}")]
    MalformedBody { message: String },
}

impl RemoteRequestError {
    /// Classifies the failure for a caller deciding whether to offer a retry.
    ///
    /// Transport failures, `408`, `429`, and `5xx` are retryable. Every other
    /// status and any malformed body is not.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            RemoteRequestError::Transport { .. } => RetryPolicy::Retryable { after: None },
            RemoteRequestError::Status {
                status,
                retry_after,
                ..
            } => match status {
                408 | 429 | 500..=599 => RetryPolicy::Retryable {
                    after: *retry_after,
                },
                _ => RetryPolicy::NonRetryable,
            },
            RemoteRequestError::MalformedBody { .. } => RetryPolicy::NonRetryable,
        }
    }
}
