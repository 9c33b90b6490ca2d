//! Clustering parameters: how burst counters become point coordinates
//!
//! A parameter reads one event type (or combines two) out of a burst's
//! accumulated events and yields one coordinate. Parameters are declared in
//! the `[[parameters]]` section of the configuration:
//!
//! ```toml
//! [[parameters]]
//! kind = "single_event"
//! name = "Instructions"
//! event_type = 42000050
//! apply_log = true
//!
//! [[parameters]]
//! kind = "mixed_events"
//! name = "IPC"
//! event_type_a = 42000050
//! event_type_b = 42000059
//! operation = "divide"
//! ```

use super::burst::BurstKind;
use crate::error::ValidationError;
use crate::types::{EventType, EventsData, DURATION_EVENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_factor() -> f64 {
    1.0
}

/// Arithmetic combination of two event values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixOperation {
    /// `a + b`
    Add,
    /// `a - b`
    Subtract,
    /// `a * b`
    Multiply,
    /// `a / b`, zero when `b` is zero
    Divide,
}

impl MixOperation {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            MixOperation::Add => a + b,
            MixOperation::Subtract => a - b,
            MixOperation::Multiply => a * b,
            MixOperation::Divide => {
                if b == 0.0 {
                    0.0
                } else {
                    a / b
                }
            }
        }
    }
}

/// Parameter built from a single event type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleEventParameter {
    /// Display name
    pub name: String,
    /// Event type to read
    pub event_type: EventType,
    /// Weight applied at normalization
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Use the natural logarithm of the value
    #[serde(default)]
    pub apply_log: bool,
    /// Bursts whose raw value is below this are filtered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_min: Option<f64>,
    /// Bursts whose raw value is above this are filtered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_max: Option<f64>,
}

/// Parameter combining two event types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixedEventsParameter {
    /// Display name
    pub name: String,
    /// Left operand event type
    pub event_type_a: EventType,
    /// Right operand event type
    pub event_type_b: EventType,
    /// Combination applied to the two values
    pub operation: MixOperation,
    /// Weight applied at normalization
    #[serde(default = "default_factor")]
    pub factor: f64,
    /// Use the natural logarithm of the combined value
    #[serde(default)]
    pub apply_log: bool,
    /// Bursts whose raw value is below this are filtered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_min: Option<f64>,
    /// Bursts whose raw value is above this are filtered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_max: Option<f64>,
}

/// One clustering dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClusteringParameter {
    /// Value of one event type
    SingleEvent(SingleEventParameter),
    /// Combination of two event types
    MixedEvents(MixedEventsParameter),
}

/// Outcome of evaluating one parameter against a burst
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterValue {
    /// Some required event type was not observed
    Missing,
    /// Value computed but outside the accepted range
    OutOfRange {
        /// Raw metric
        raw: f64,
        /// Metric after the optional logarithm
        processed: f64,
    },
    /// Value usable as a coordinate
    Ready {
        /// Raw metric
        raw: f64,
        /// Metric after the optional logarithm
        processed: f64,
    },
}

impl ClusteringParameter {
    /// Shorthand for a single-event parameter with default settings
    pub fn single(name: impl Into<String>, event_type: EventType) -> Self {
        ClusteringParameter::SingleEvent(SingleEventParameter {
            name: name.into(),
            event_type,
            factor: default_factor(),
            apply_log: false,
            range_min: None,
            range_max: None,
        })
    }

    /// Shorthand for a mixed-events parameter with default settings
    pub fn mixed(
        name: impl Into<String>,
        event_type_a: EventType,
        event_type_b: EventType,
        operation: MixOperation,
    ) -> Self {
        ClusteringParameter::MixedEvents(MixedEventsParameter {
            name: name.into(),
            event_type_a,
            event_type_b,
            operation,
            factor: default_factor(),
            apply_log: false,
            range_min: None,
            range_max: None,
        })
    }

    /// Parameter measuring the burst duration
    pub fn duration() -> Self {
        Self::single("Duration", DURATION_EVENT_TYPE)
    }

    /// Display name
    pub fn name(&self) -> &str {
        match self {
            ClusteringParameter::SingleEvent(p) => &p.name,
            ClusteringParameter::MixedEvents(p) => &p.name,
        }
    }

    /// Normalization weight
    pub fn factor(&self) -> f64 {
        match self {
            ClusteringParameter::SingleEvent(p) => p.factor,
            ClusteringParameter::MixedEvents(p) => p.factor,
        }
    }

    fn apply_log(&self) -> bool {
        match self {
            ClusteringParameter::SingleEvent(p) => p.apply_log,
            ClusteringParameter::MixedEvents(p) => p.apply_log,
        }
    }

    fn range(&self) -> (Option<f64>, Option<f64>) {
        match self {
            ClusteringParameter::SingleEvent(p) => (p.range_min, p.range_max),
            ClusteringParameter::MixedEvents(p) => (p.range_min, p.range_max),
        }
    }

    /// Event types this parameter reads
    pub fn event_types(&self) -> Vec<EventType> {
        match self {
            ClusteringParameter::SingleEvent(p) => vec![p.event_type],
            ClusteringParameter::MixedEvents(p) => vec![p.event_type_a, p.event_type_b],
        }
    }

    /// Evaluate against a burst's accumulated events
    pub fn evaluate(&self, events: &EventsData) -> ParameterValue {
        let raw = match self {
            ClusteringParameter::SingleEvent(p) => match events.get(&p.event_type) {
                Some(&v) => v as f64,
                None => return ParameterValue::Missing,
            },
            ClusteringParameter::MixedEvents(p) => {
                match (events.get(&p.event_type_a), events.get(&p.event_type_b)) {
                    (Some(&a), Some(&b)) => p.operation.apply(a as f64, b as f64),
                    _ => return ParameterValue::Missing,
                }
            }
        };

        let processed = if self.apply_log() {
            if raw == 0.0 {
                f64::MIN_POSITIVE
            } else {
                raw.ln()
            }
        } else {
            raw
        };

        // log of a negative difference has no coordinate
        let (min, max) = self.range();
        let below = min.is_some_and(|m| raw < m);
        let above = max.is_some_and(|m| raw > m);
        if below || above || !processed.is_finite() {
            ParameterValue::OutOfRange { raw, processed }
        } else {
            ParameterValue::Ready { raw, processed }
        }
    }

    /// Check the declaration for inconsistencies
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name().trim().is_empty() {
            return Err(ValidationError::MissingField("parameters.name".to_string()));
        }
        if !self.factor().is_finite() || self.factor() <= 0.0 {
            return Err(ValidationError::InvalidFormat {
                field: format!("parameters.{}.factor", self.name()),
                message: "factor must be a positive real".to_string(),
            });
        }
        if let (Some(min), Some(max)) = self.range() {
            if min > max {
                return Err(ValidationError::InvalidFormat {
                    field: format!("parameters.{}.range", self.name()),
                    message: format!("range_min {} is above range_max {}", min, max),
                });
            }
        }
        Ok(())
    }
}

/// Coordinates and classification derived from one burst
#[derive(Debug, Clone, PartialEq)]
pub struct BurstMetrics {
    /// Raw metric of every parameter, NaN when missing
    pub raw: Vec<f64>,
    /// Processed metric of every parameter, NaN when missing
    pub processed: Vec<f64>,
    /// Resulting classification, before any duration filter
    pub kind: BurstKind,
}

/// Ordered set of clustering parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterSet {
    parameters: Vec<ClusteringParameter>,
}

impl ParameterSet {
    /// Create a set, rejecting duplicate names
    pub fn new(parameters: Vec<ClusteringParameter>) -> Result<Self, ValidationError> {
        let mut names = HashSet::new();
        for p in &parameters {
            p.validate()?;
            if !names.insert(p.name().to_string()) {
                return Err(ValidationError::InvalidFormat {
                    field: "parameters".to_string(),
                    message: format!("duplicate parameter name '{}'", p.name()),
                });
            }
        }
        Ok(Self { parameters })
    }

    /// Number of dimensions
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// Whether no parameter is configured
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Parameters in dimension order
    pub fn parameters(&self) -> &[ClusteringParameter] {
        &self.parameters
    }

    /// Dimension names in order
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name().to_string()).collect()
    }

    /// Normalization weights in dimension order
    pub fn factors(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.factor()).collect()
    }

    /// Evaluate every parameter against a burst's events
    ///
    /// Missing data takes precedence over range filtering.
    pub fn evaluate(&self, events: &EventsData) -> BurstMetrics {
        let mut raw = Vec::with_capacity(self.parameters.len());
        let mut processed = Vec::with_capacity(self.parameters.len());
        let mut missing = false;
        let mut filtered = false;

        for p in &self.parameters {
            match p.evaluate(events) {
                ParameterValue::Missing => {
                    missing = true;
                    raw.push(f64::NAN);
                    processed.push(f64::NAN);
                }
                ParameterValue::OutOfRange { raw: r, processed: v } => {
                    filtered = true;
                    raw.push(r);
                    processed.push(v);
                }
                ParameterValue::Ready { raw: r, processed: v } => {
                    raw.push(r);
                    processed.push(v);
                }
            }
        }

        let kind = if missing {
            BurstKind::MissingData
        } else if filtered {
            BurstKind::RangeFiltered
        } else {
            BurstKind::Complete
        };

        BurstMetrics { raw, processed, kind }
    }
}
