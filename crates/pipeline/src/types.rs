//! Shared value types for the pipeline builder domain.
//!
//! Unlike the newtype identifiers in [`crate::identifiers`], these types carry
//! meaningful values with invariants (e.g. canvas zoom is kept within a fixed
//! range) and participate in graph operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Node classification
// ---------------------------------------------------------------------------

/// The processing role of a node, inherited from its template.
///
/// Fixed when the node is created; a node never changes kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Reads data into the pipeline (files, databases, APIs).
    Source,
    /// Reshapes or cleans records.
    Transform,
    /// Checks records against quality rules.
    Validate,
    /// Delegates to a backend model (insight generation, prediction).
    Ai,
    /// Writes results out of the pipeline.
    Output,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeKind::Source => "source",
            NodeKind::Transform => "transform",
            NodeKind::Validate => "validate",
            NodeKind::Ai => "ai",
            NodeKind::Output => "output",
        };
        f.write_str(s)
    }
}

/// Run status of a node.
///
/// Every node starts as [`NodeStatus::Configured`]. The other states are set by
/// the external result stream, never by local graph operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Configured,
    Running,
    Completed,
    Error,
}

// ---------------------------------------------------------------------------
// Canvas geometry
// ---------------------------------------------------------------------------

/// A canvas-local 2D coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Smallest zoom factor the canvas accepts.
pub const MIN_ZOOM: f64 = 0.1;

/// Largest zoom factor the canvas accepts.
pub const MAX_ZOOM: f64 = 4.0;

/// Viewport metadata stored alongside the graph.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Zoom factor in `[MIN_ZOOM, MAX_ZOOM]`.
    pub zoom: f64,
    /// Pan offset of the viewport origin.
    pub pan: Position,
}

impl CanvasConfig {
    /// Creates a canvas config, clamping `zoom` into `[MIN_ZOOM, MAX_ZOOM]`.
    ///
    /// A non-finite zoom falls back to `1.0`.
    pub fn new(zoom: f64, pan: Position) -> Self {
        let zoom = if zoom.is_finite() {
            zoom.clamp(MIN_ZOOM, MAX_ZOOM)
        } else {
            1.0
        };
        Self { zoom, pan }
    }
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan: Position::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
