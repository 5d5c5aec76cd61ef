//! Newtype domain identifiers.
//!
//! Every domain concept that has an identity is represented as a distinct newtype
//! wrapping a primitive. This prevents accidentally interchanging, for example, a
//! [`NodeId`] with a [`ConnectionId`] even though both are server-assigned strings.
//!
//! Server-assigned identifiers are opaque: the visual-builder service may hand
//! out integers or strings, and the infrastructure adapter normalises both to
//! their string form before they reach this crate.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display, and
// serde as a plain string that must be non-empty.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value).ok_or_else(|| format!("{} must not be empty", stringify!($name)))
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Identifiers: server-assigned
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a persisted pipeline.
    ///
    /// Assigned by the visual-builder service on the first create call; an
    /// unsaved pipeline has no [`PipelineId`].
    PipelineId
}

string_id! {
    /// Identifies a node within one pipeline.
    ///
    /// Assigned by the service in response to an `add_node` action. Unique per
    /// pipeline, never reused locally once the node is deleted.
    NodeId
}

string_id! {
    /// Identifies a directed connection between two nodes.
    ConnectionId
}

// ---------------------------------------------------------------------------
// Identifiers: catalog
// ---------------------------------------------------------------------------

string_id! {
    /// Identifies a node template in the registry (e.g. `"csv_source"`).
    ///
    /// Sent to the service as the `node_type` of an `add_node` action.
    TemplateId
}

// ---------------------------------------------------------------------------
// Identifiers: locally generated
// ---------------------------------------------------------------------------

/// Position of a mutation in a session's issue order.
///
/// Strictly increasing per session. Responses are matched back to the mutation
/// that issued them by this number, which lets stale responses be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MutationSeq(u64);

impl MutationSeq {
    /// Creates a sequence number from a raw integer.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the sequence number that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for MutationSeq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Correlates one outgoing request with service-side logs.
///
/// Generated fresh for every remote call and propagated through spans and the
/// `X-Request-Id` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a new random request identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`RequestId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
