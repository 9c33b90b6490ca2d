//! Density-based clustering of burst coordinates
//!
//! - [`Point`]: fixed-dimension coordinate vector
//! - [`KdTree`]: spatial index answering radius and nearest-neighbour queries
//! - [`Dbscan`]: the clustering algorithm
//! - [`Partition`]: the per-point result
//! - [`ClusteringStatistics`]: per-cluster aggregates over clustered bursts

mod dbscan;
mod kdtree;
mod partition;
mod point;
mod statistics;

pub use dbscan::{Dbscan, DbscanRunStats, KDistanceCurve};
pub use kdtree::KdTree;
pub use partition::Partition;
pub use point::{common_dimensions, range_normalize, Point};
pub use statistics::{ClusterStatistics, ClusteringStatistics};
