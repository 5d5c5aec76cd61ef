//! Pipeline builder session orchestration.
//!
//! [`PipelineSession`] keeps one local [`pipeline::Pipeline`] in step with the
//! remote visual-builder service. It owns three concerns:
//!
//! - **Lazy persistence.** A new pipeline is [`PersistState::Unsaved`]. The
//!   first remote mutation creates it on the service, moves to
//!   [`PersistState::Saved`], then issues the requested mutation.
//! - **Sequencing.** Each mutation takes a [`pipeline::MutationSeq`] from the
//!   [`MutationLedger`]. Responses for cancelled mutations, or for mutations
//!   whose target node was deleted while the request was in flight, are
//!   discarded instead of applied.
//! - **Reconciliation.** Service-assigned ids are merged into the local graph
//!   only after a successful response. A failed call leaves the graph as it was.
//!
//! ## Architectural Layer
//!
//! **Orchestration layer.** The session sequences calls between the graph
//! rules in the [`pipeline`] crate and a [`pipeline::PipelineService`]
//! implementation. It contains no graph rules of its own.

pub mod errors;
pub mod ledger;
pub mod session;

pub use errors::SyncError;
pub use ledger::{MutationLedger, PendingMutation};
pub use session::{ExecutionReceipt, PersistState, PipelineSession, Reconciled};
