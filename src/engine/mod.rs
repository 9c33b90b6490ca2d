//! Pluggable pipeline architecture: record sources, burst sinks and clustering backends

pub mod builder;
pub mod registry;
pub mod traits;

pub use builder::{ClusteringReport, TraceClustering, TraceClusteringBuilder};
pub use registry::{AlgorithmConstructor, AlgorithmRegistry};
pub use traits::{BurstSink, ClusteringAlgorithm, RecordSource};
