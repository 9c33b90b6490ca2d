//! Density-based clustering (DBSCAN) over a KD-tree index
//!
//! Every point starts unclassified. Points are visited in input order; an
//! unclassified point either seeds a new cluster (when its epsilon
//! neighbourhood holds at least `min_points` points, itself included) or is
//! marked noise. Noise can later be absorbed as a border point of a cluster
//! expanded from elsewhere.
//!
//! A new cluster labels its whole seed neighbourhood, so a border point
//! already claimed by an earlier cluster moves to the later one when it lies
//! within epsilon of the later seed. Points reached through queue expansion
//! never change cluster.
//!
//! # Example
//!
//! ```rust
//! use burst_clustering::clustering::{Dbscan, Point};
//! use burst_clustering::engine::ClusteringAlgorithm;
//!
//! let dbscan = Dbscan::new(1.0, 2).unwrap();
//! let points = vec![
//!     Point::new(vec![0.0, 0.0]),
//!     Point::new(vec![0.5, 0.0]),
//!     Point::new(vec![5.0, 5.0]),
//! ];
//! let partition = dbscan.run(&points).unwrap();
//! assert_eq!(partition.assignment(), &[1, 1, 0]);
//! ```

use super::kdtree::KdTree;
use super::partition::Partition;
use super::point::Point;
use crate::engine::traits::ClusteringAlgorithm;
use crate::error::ClusteringError;
use crate::metrics;
use crate::types::{ClusterId, MIN_CLUSTER_ID, NOISE};
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;
use tracing::{debug, info};

/// Per-point classification during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Unclassified,
    Noise,
    Cluster(ClusterId),
}

/// Counters collected during one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DbscanRunStats {
    /// Whether a spatial index was constructed
    pub index_built: bool,
    /// Epsilon range queries issued
    pub range_queries: u64,
    /// Clusters formed
    pub clusters_formed: usize,
}

/// k-distance curve for one value of k
#[derive(Debug, Clone, PartialEq)]
pub struct KDistanceCurve {
    /// Neighbour rank, self excluded
    pub k: usize,
    /// k-th neighbour distance of every point, sorted descending
    pub distances: Vec<f64>,
}

/// DBSCAN clustering algorithm
#[derive(Debug, Clone, PartialEq)]
pub struct Dbscan {
    epsilon: f64,
    min_points: usize,
}

impl Dbscan {
    /// Registry name of the algorithm
    pub const NAME: &'static str = "DBSCAN";
    /// Parameter key for the neighbourhood radius
    pub const EPSILON_KEY: &'static str = "epsilon";
    /// Parameter key for the core-point threshold
    pub const MIN_POINTS_KEY: &'static str = "min_points";

    /// Create a DBSCAN instance
    ///
    /// `epsilon` must be a positive finite radius and `min_points` at least 1.
    pub fn new(epsilon: f64, min_points: usize) -> Result<Self, ClusteringError> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(ClusteringError::Configuration(format!(
                "{} must be a positive real, got {}",
                Self::EPSILON_KEY,
                epsilon
            )));
        }
        if min_points == 0 {
            return Err(ClusteringError::Configuration(format!(
                "{} must be a positive integer",
                Self::MIN_POINTS_KEY
            )));
        }
        Ok(Self {
            epsilon,
            min_points,
        })
    }

    /// Create a DBSCAN instance from a string parameter map
    ///
    /// Both `epsilon` and `min_points` are required. Any other key is rejected.
    pub fn from_parameters(parameters: &BTreeMap<String, String>) -> Result<Self, ClusteringError> {
        if let Some(unknown) = parameters
            .keys()
            .find(|k| k.as_str() != Self::EPSILON_KEY && k.as_str() != Self::MIN_POINTS_KEY)
        {
            return Err(ClusteringError::Configuration(format!(
                "unknown {} parameter '{}'",
                Self::NAME,
                unknown
            )));
        }

        let epsilon = required(parameters, Self::EPSILON_KEY)?
            .trim()
            .parse::<f64>()
            .map_err(|_| {
                ClusteringError::Configuration(format!("{} value is not a number", Self::EPSILON_KEY))
            })?;

        let min_points = required(parameters, Self::MIN_POINTS_KEY)?
            .trim()
            .parse::<usize>()
            .map_err(|_| {
                ClusteringError::Configuration(format!(
                    "{} value is not a positive integer",
                    Self::MIN_POINTS_KEY
                ))
            })?;

        Self::new(epsilon, min_points)
    }

    /// Neighbourhood radius
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Minimum neighbourhood size of a core point
    pub fn min_points(&self) -> usize {
        self.min_points
    }

    /// Cluster `points`, returning the partition and run counters
    pub fn run_with_stats(&self, points: &[Point]) -> Result<(Partition, DbscanRunStats), ClusteringError> {
        let mut stats = DbscanRunStats::default();
        if points.is_empty() {
            debug!("DBSCAN over an empty point set, nothing to cluster");
            return Ok((Partition::new(), stats));
        }

        let start = Instant::now();
        info!(
            points = points.len(),
            epsilon = self.epsilon,
            min_points = self.min_points,
            "Starting DBSCAN"
        );

        let index = KdTree::build(points)?;
        stats.index_built = true;

        let mut labels = vec![Label::Unclassified; points.len()];
        let mut next_id = MIN_CLUSTER_ID;

        for i in 0..points.len() {
            if labels[i] != Label::Unclassified {
                continue;
            }
            if self.expand_cluster(&index, i, next_id, &mut labels, &mut stats) {
                next_id += 1;
                stats.clusters_formed += 1;
            }
        }

        let assignment: Vec<ClusterId> = labels
            .iter()
            .map(|label| match label {
                Label::Cluster(id) => *id,
                Label::Noise | Label::Unclassified => NOISE,
            })
            .collect();
        let partition = Partition::from_assignment(assignment);
        debug_assert_eq!(partition.cluster_count(), stats.clusters_formed);

        metrics::record_clustering_run(stats.range_queries, stats.clusters_formed, start.elapsed());
        info!(
            clusters = stats.clusters_formed,
            noise = partition.has_noise(),
            range_queries = stats.range_queries,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "DBSCAN finished"
        );

        Ok((partition, stats))
    }

    /// Try to grow cluster `id` from point `p`
    ///
    /// Returns false, marking `p` as noise, when `p` is not a core point.
    fn expand_cluster(
        &self,
        index: &KdTree,
        p: usize,
        id: ClusterId,
        labels: &mut [Label],
        stats: &mut DbscanRunStats,
    ) -> bool {
        let seeds = index.range_query_indexed(p, self.epsilon);
        stats.range_queries += 1;

        if seeds.len() < self.min_points {
            labels[p] = Label::Noise;
            return false;
        }

        let mut queue = VecDeque::with_capacity(seeds.len());
        for &s in &seeds {
            labels[s] = Label::Cluster(id);
            if s != p {
                queue.push_back(s);
            }
        }

        while let Some(s) = queue.pop_front() {
            let neighbours = index.range_query_indexed(s, self.epsilon);
            stats.range_queries += 1;

            if neighbours.len() < self.min_points {
                continue;
            }

            for n in neighbours {
                match labels[n] {
                    Label::Unclassified => {
                        queue.push_back(n);
                        labels[n] = Label::Cluster(id);
                    }
                    Label::Noise => labels[n] = Label::Cluster(id),
                    Label::Cluster(_) => {}
                }
            }
        }

        true
    }

    /// k-distance curves for every k in `k_begin..=k_end`
    ///
    /// Used to pick epsilon: the knee of the curve for `k = min_points - 1`
    /// is a good radius. Points with fewer than k neighbours do not
    /// contribute to that curve.
    pub fn k_distance_profile(
        points: &[Point],
        k_begin: usize,
        k_end: usize,
    ) -> Result<Vec<KDistanceCurve>, ClusteringError> {
        if k_begin == 0 || k_begin > k_end {
            return Err(ClusteringError::Configuration(format!(
                "invalid k range {}..={}",
                k_begin, k_end
            )));
        }
        if points.is_empty() {
            return Err(ClusteringError::Configuration(
                "k-distance profile needs at least one point".to_string(),
            ));
        }

        let index = KdTree::build(points)?;
        let mut curves: Vec<KDistanceCurve> = (k_begin..=k_end)
            .map(|k| KDistanceCurve {
                k,
                distances: Vec::with_capacity(points.len()),
            })
            .collect();

        for point in points {
            // Position 0 is the point itself
            let found = index.nearest(point, k_end + 1)?;
            for curve in curves.iter_mut() {
                if let Some(&(_, d)) = found.get(curve.k) {
                    curve.distances.push(d);
                }
            }
        }

        for curve in curves.iter_mut() {
            curve.distances.sort_by(|a, b| b.total_cmp(a));
        }

        debug!(k_begin, k_end, points = points.len(), "Computed k-distance profile");
        Ok(curves)
    }
}

impl ClusteringAlgorithm for Dbscan {
    fn name(&self) -> String {
        format!(
            "{} (Eps={}, MinPoints={})",
            Self::NAME,
            self.epsilon,
            self.min_points
        )
    }

    fn run(&self, points: &[Point]) -> Result<Partition, ClusteringError> {
        self.run_with_stats(points).map(|(partition, _)| partition)
    }

    fn has_noise(&self) -> bool {
        true
    }
}

fn required<'a>(parameters: &'a BTreeMap<String, String>, key: &str) -> Result<&'a str, ClusteringError> {
    parameters
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ClusteringError::Configuration(format!("missing required parameter '{}'", key)))
}
