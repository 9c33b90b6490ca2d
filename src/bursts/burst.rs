//! Sealed bursts and their classification

use crate::clustering::Point;
use crate::types::{BoundaryEvents, EventsData, Line, TaskId, ThreadId, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Classification of a sealed burst
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurstKind {
    /// Every parameter available and in range
    Complete,
    /// Some parameter's event types were never observed
    MissingData,
    /// Shorter than the configured duration filter
    DurationFiltered,
    /// Some parameter outside its accepted range
    RangeFiltered,
}

impl BurstKind {
    /// Label used in metrics and output files
    pub fn as_str(&self) -> &'static str {
        match self {
            BurstKind::Complete => "complete",
            BurstKind::MissingData => "missing_data",
            BurstKind::DurationFiltered => "duration_filtered",
            BurstKind::RangeFiltered => "range_filtered",
        }
    }
}

impl fmt::Display for BurstKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Burst as handed over by the assembler when it seals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedBurst {
    /// Task id
    pub task: TaskId,
    /// Thread id
    pub thread: ThreadId,
    /// Line of the record that opened the burst
    pub line: Line,
    /// Start timestamp
    pub begin: Timestamp,
    /// End timestamp
    pub end: Timestamp,
    /// `(end - begin)` scaled by the trace time factor
    pub duration: u64,
    /// Accumulated counter values
    pub events: EventsData,
    /// Event types observed exactly at `end`
    pub boundary_events: BoundaryEvents,
}

/// Burst stored for analysis
#[derive(Debug, Clone, PartialEq)]
pub struct Burst {
    /// Global sequence number, in sealing order
    pub instance: u64,
    /// Task id
    pub task: TaskId,
    /// Thread id
    pub thread: ThreadId,
    /// Line of the record that opened the burst
    pub line: Line,
    /// Start timestamp
    pub begin: Timestamp,
    /// End timestamp
    pub end: Timestamp,
    /// Scaled duration
    pub duration: u64,
    /// Accumulated counter values, duration included
    pub events: EventsData,
    /// Event types observed exactly at `end`
    pub boundary_events: BoundaryEvents,
    /// Raw metric of every clustering parameter
    pub raw_dimensions: Vec<f64>,
    /// Coordinates used for clustering, normalized once the run is complete
    pub dimensions: Vec<f64>,
    /// Classification
    pub kind: BurstKind,
}

impl Burst {
    /// Whether this burst takes part in clustering
    pub fn is_complete(&self) -> bool {
        self.kind == BurstKind::Complete
    }

    /// Clustering coordinates as a point
    pub fn point(&self, normalized: bool) -> Point {
        if normalized {
            Point::normalized_from(self.dimensions.clone())
        } else {
            Point::new(self.dimensions.clone())
        }
    }
}
