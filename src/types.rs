//! Core data types used throughout burst extraction and clustering
//!
//! # Key Types
//!
//! - **`TraceRecord`**: One input record, either a thread state or a batch of events
//! - **`EventsData`**: Accumulated `event type -> value` map attached to a burst
//! - **`ClusterId`**: Cluster label, with [`NOISE`] reserved for outliers
//!
//! # Example
//!
//! ```rust
//! use burst_clustering::types::{StateRecord, TraceRecord, RUNNING_STATE};
//!
//! let record = TraceRecord::State(StateRecord {
//!     task: 0,
//!     thread: 0,
//!     line: 12,
//!     begin: 100,
//!     end: 250,
//!     value: RUNNING_STATE,
//! });
//! assert_eq!(record.line(), 12);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Application task identifier (zero-based)
pub type TaskId = u32;

/// Thread identifier within a task (zero-based)
pub type ThreadId = u32;

/// Source line of a record in the input trace
///
/// Lines are unique per record and identify bursts across ranks.
pub type Line = u64;

/// Trace timestamp in trace time units
pub type Timestamp = u64;

/// Hardware counter or user event type
pub type EventType = u32;

/// Raw event value
pub type EventValue = u64;

/// Cluster label
pub type ClusterId = u32;

/// Label of points that belong to no cluster
pub const NOISE: ClusterId = 0;

/// First id handed to a real cluster
pub const MIN_CLUSTER_ID: ClusterId = 1;

/// State value marking a thread as executing user code
pub const RUNNING_STATE: u32 = 1;

/// Event type emitted when the hardware counter group changes
pub const HWC_GROUP_CHANGE_TYPE: EventType = 42_009_999;

/// Pseudo event type under which a burst's duration is stored
pub const DURATION_EVENT_TYPE: EventType = 1;

/// Accumulated event values, keyed by type
///
/// Ordered so that iteration is deterministic.
pub type EventsData = BTreeMap<EventType, EventValue>;

/// Set of event types observed exactly at a burst's end
pub type BoundaryEvents = BTreeSet<EventType>;

/// Single input record
///
/// Records are serialized one per line as JSON with a `kind` tag:
///
/// ```json
/// {"kind":"state","task":0,"thread":0,"line":1,"begin":0,"end":10,"value":1}
/// {"kind":"event","task":0,"thread":0,"line":2,"timestamp":10,"events":[[42000050,1200]]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TraceRecord {
    /// Thread state interval
    State(StateRecord),
    /// Timestamped batch of events
    Event(EventRecord),
}

impl TraceRecord {
    /// Source line of the record
    pub fn line(&self) -> Line {
        match self {
            TraceRecord::State(s) => s.line,
            TraceRecord::Event(e) => e.line,
        }
    }

    /// Task and thread the record belongs to
    pub fn object(&self) -> (TaskId, ThreadId) {
        match self {
            TraceRecord::State(s) => (s.task, s.thread),
            TraceRecord::Event(e) => (e.task, e.thread),
        }
    }
}

/// Thread state record spanning `[begin, end]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Task id
    pub task: TaskId,
    /// Thread id
    pub thread: ThreadId,
    /// Source line
    pub line: Line,
    /// Start timestamp
    pub begin: Timestamp,
    /// End timestamp
    pub end: Timestamp,
    /// State value
    pub value: u32,
}

impl StateRecord {
    /// Whether the thread was running user code during this state
    pub fn is_running(&self, running_state: u32) -> bool {
        self.value == running_state
    }
}

/// Event record carrying one or more `(type, value)` pairs at a single timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Task id
    pub task: TaskId,
    /// Thread id
    pub thread: ThreadId,
    /// Source line
    pub line: Line,
    /// Event timestamp
    pub timestamp: Timestamp,
    /// Type/value pairs, in record order
    pub events: Vec<(EventType, EventValue)>,
}
