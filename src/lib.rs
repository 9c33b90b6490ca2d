//! Burst clustering - structure detection in HPC execution traces
//!
//! This library reconstructs computation bursts from ordered trace records
//! and groups them by performance behaviour:
//! - Burst assembly with look-ahead stitching of adjacent running states
//! - Counter-derived clustering coordinates with range normalization
//! - DBSCAN over a KD-tree spatial index
//! - Multi-rank runs reconciled into one global partition at rank 0
//!
//! # Example
//!
//! ```rust
//! use burst_clustering::bursts::ClusteringParameter;
//! use burst_clustering::engine::TraceClustering;
//!
//! let clustering = TraceClustering::builder()
//!     .with_parameter(ClusteringParameter::single("Instructions", 42_000_050))
//!     .with_dbscan(0.05, 4)
//!     .build()
//!     .unwrap();
//! assert!(clustering.algorithm_name().starts_with("DBSCAN"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bursts;
pub mod clustering;
pub mod distributed;
pub mod engine;
pub mod error;
pub mod extraction;
pub mod types;

/// Prometheus metrics and telemetry
pub mod metrics;

/// Configuration management with TOML support
pub mod config;

// Re-export main types
pub use config::AnalysisConfig;
pub use engine::{ClusteringReport, TraceClustering, TraceClusteringBuilder};
pub use error::{Error, Result};
pub use types::{ClusterId, Line, TraceRecord};
