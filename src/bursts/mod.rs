//! Bursts: sealed computation intervals and their clustering coordinates

mod burst;
mod parameters;
mod trace_data;

pub use burst::{Burst, BurstKind, ExtractedBurst};
pub use parameters::{
    BurstMetrics, ClusteringParameter, MixOperation, MixedEventsParameter, ParameterSet,
    ParameterValue, SingleEventParameter,
};
pub use trace_data::{BurstCounts, TraceData, TraceDataConfig};
