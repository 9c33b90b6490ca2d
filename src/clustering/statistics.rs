//! Per-cluster statistics over a clustered burst set

use super::partition::Partition;
use crate::bursts::Burst;
use crate::error::ClusteringError;
use crate::types::{ClusterId, MIN_CLUSTER_ID, NOISE};
use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregates of one cluster
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterStatistics {
    /// Cluster id
    pub id: ClusterId,
    /// Number of bursts
    pub individuals: u64,
    /// Sum of burst durations
    pub total_duration: u64,
    /// Mean burst duration
    pub duration_mean: f64,
    #[serde(skip)]
    duration_m2: f64,
    /// Mean raw value of every clustering dimension
    pub dimension_means: Vec<f64>,
}

impl ClusterStatistics {
    fn new(id: ClusterId, dimensions: usize) -> Self {
        Self {
            id,
            individuals: 0,
            total_duration: 0,
            duration_mean: 0.0,
            duration_m2: 0.0,
            dimension_means: vec![0.0; dimensions],
        }
    }

    /// Welford update with one burst
    fn add(&mut self, burst: &Burst) {
        self.individuals += 1;
        self.total_duration = self.total_duration.saturating_add(burst.duration);

        let n = self.individuals as f64;
        let x = burst.duration as f64;
        let delta = x - self.duration_mean;
        self.duration_mean += delta / n;
        self.duration_m2 += delta * (x - self.duration_mean);

        for (mean, &v) in self.dimension_means.iter_mut().zip(burst.raw_dimensions.iter()) {
            *mean += (v - *mean) / n;
        }
    }

    /// Sample variance of the burst durations
    pub fn duration_variance(&self) -> f64 {
        if self.individuals < 2 {
            0.0
        } else {
            self.duration_m2 / (self.individuals - 1) as f64
        }
    }

    /// Sample standard deviation of the burst durations
    pub fn duration_stddev(&self) -> f64 {
        self.duration_variance().sqrt()
    }
}

/// Statistics of a whole partition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusteringStatistics {
    clusters: BTreeMap<ClusterId, ClusterStatistics>,
    total_duration: u64,
}

impl ClusteringStatistics {
    /// Aggregate `bursts` according to `partition`
    ///
    /// `partition.assignment()[i]` must be the cluster of `bursts[i]`.
    pub fn compute(bursts: &[&Burst], partition: &Partition) -> Result<Self, ClusteringError> {
        if bursts.len() != partition.len() {
            return Err(ClusteringError::PartitionMismatch {
                items: bursts.len(),
                assignments: partition.len(),
            });
        }

        let dimensions = bursts.first().map_or(0, |b| b.raw_dimensions.len());
        let mut clusters = BTreeMap::new();
        let mut total_duration = 0u64;

        for (burst, &id) in bursts.iter().zip(partition.assignment()) {
            clusters
                .entry(id)
                .or_insert_with(|| ClusterStatistics::new(id, dimensions))
                .add(burst);
            total_duration = total_duration.saturating_add(burst.duration);
        }

        Ok(Self {
            clusters,
            total_duration,
        })
    }

    /// Statistics of one cluster
    pub fn cluster(&self, id: ClusterId) -> Option<&ClusterStatistics> {
        self.clusters.get(&id)
    }

    /// Every cluster, noise first, then ascending ids
    pub fn clusters(&self) -> impl Iterator<Item = &ClusterStatistics> {
        self.clusters.values()
    }

    /// Noise statistics, when any burst was noise
    pub fn noise(&self) -> Option<&ClusterStatistics> {
        self.clusters.get(&NOISE)
    }

    /// Sum of all burst durations
    pub fn total_duration(&self) -> u64 {
        self.total_duration
    }

    /// Share of the total duration spent in `id`, as a percentage
    pub fn percentage_duration(&self, id: ClusterId) -> f64 {
        if self.total_duration == 0 {
            return 0.0;
        }
        self.clusters
            .get(&id)
            .map_or(0.0, |c| 100.0 * c.total_duration as f64 / self.total_duration as f64)
    }

    /// Renumbering of real clusters by descending total duration
    ///
    /// The heaviest cluster becomes `MIN_CLUSTER_ID`. Ties keep the original
    /// id order. Noise is not part of the map.
    pub fn translated_ids(&self) -> BTreeMap<ClusterId, ClusterId> {
        let mut order: Vec<&ClusterStatistics> =
            self.clusters.values().filter(|c| c.id != NOISE).collect();
        order.sort_by(|a, b| b.total_duration.cmp(&a.total_duration).then(a.id.cmp(&b.id)));

        order
            .into_iter()
            .zip(MIN_CLUSTER_ID..)
            .map(|(c, new_id)| (c.id, new_id))
            .collect()
    }
}
