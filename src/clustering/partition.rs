//! Cluster assignment of a point set

use crate::types::{ClusterId, MIN_CLUSTER_ID, NOISE};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Result of a clustering run
///
/// `assignment[i]` is the cluster of input point `i`. The id set holds the
/// ids actually present, noise included when at least one point is noise.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    assignment: Vec<ClusterId>,
    ids: BTreeSet<ClusterId>,
    has_noise: bool,
    cluster_count: usize,
}

impl Partition {
    /// Empty partition
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a partition from a complete assignment vector
    pub fn from_assignment(assignment: Vec<ClusterId>) -> Self {
        let ids: BTreeSet<ClusterId> = assignment.iter().copied().collect();
        let has_noise = ids.contains(&NOISE);
        let cluster_count = ids.iter().filter(|&&id| id != NOISE).count();

        Self {
            assignment,
            ids,
            has_noise,
            cluster_count,
        }
    }

    /// Per-point cluster ids
    pub fn assignment(&self) -> &[ClusterId] {
        &self.assignment
    }

    /// Consume the partition, keeping the assignment vector
    pub fn into_assignment(self) -> Vec<ClusterId> {
        self.assignment
    }

    /// Distinct ids present in the assignment
    pub fn ids(&self) -> &BTreeSet<ClusterId> {
        &self.ids
    }

    /// Whether any point was labelled noise
    pub fn has_noise(&self) -> bool {
        self.has_noise
    }

    /// Number of real clusters, noise excluded
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// Number of assigned points
    pub fn len(&self) -> usize {
        self.assignment.len()
    }

    /// Whether the partition covers no points
    pub fn is_empty(&self) -> bool {
        self.assignment.is_empty()
    }

    /// Largest id present, `NOISE` for an empty or all-noise partition
    pub fn max_id(&self) -> ClusterId {
        self.ids.iter().next_back().copied().unwrap_or(NOISE)
    }

    /// Cluster of point `idx`
    pub fn cluster_of(&self, idx: usize) -> Option<ClusterId> {
        self.assignment.get(idx).copied()
    }

    /// Indices of the points assigned to `id`, ascending
    pub fn members(&self, id: ClusterId) -> Vec<usize> {
        self.assignment
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == id)
            .map(|(i, _)| i)
            .collect()
    }

    /// Number of points in each present cluster
    pub fn sizes(&self) -> BTreeMap<ClusterId, usize> {
        let mut sizes = BTreeMap::new();
        for &id in &self.assignment {
            *sizes.entry(id).or_insert(0) += 1;
        }
        sizes
    }

    /// Relabel every point through `translation`
    ///
    /// Ids missing from the map keep their value. Noise is never relabelled.
    pub fn translated(&self, translation: &BTreeMap<ClusterId, ClusterId>) -> Partition {
        let assignment = self
            .assignment
            .iter()
            .map(|&id| {
                if id == NOISE {
                    NOISE
                } else {
                    translation.get(&id).copied().unwrap_or(id)
                }
            })
            .collect();
        Partition::from_assignment(assignment)
    }

    /// Iterator over the real cluster ids, ascending
    pub fn cluster_ids(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.ids.iter().copied().filter(|&id| id >= MIN_CLUSTER_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_follow_assignment() {
        let p = Partition::from_assignment(vec![1, 1, 0, 2, 2, 2]);
        assert!(p.has_noise());
        assert_eq!(p.cluster_count(), 2);
        assert_eq!(p.max_id(), 2);
        assert_eq!(p.ids().iter().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(p.members(2), vec![3, 4, 5]);
        assert_eq!(p.sizes().get(&0), Some(&1));
    }

    #[test]
    fn test_empty_partition() {
        let p = Partition::new();
        assert!(p.is_empty());
        assert!(!p.has_noise());
        assert_eq!(p.cluster_count(), 0);
        assert_eq!(p.max_id(), NOISE);
    }

    #[test]
    fn test_translation_keeps_noise() {
        let p = Partition::from_assignment(vec![0, 1, 2, 2]);
        let map: BTreeMap<_, _> = [(1, 2), (2, 1)].into_iter().collect();
        let t = p.translated(&map);
        assert_eq!(t.assignment(), &[0, 2, 1, 1]);
        assert_eq!(t.cluster_ids().collect::<Vec<_>>(), vec![1, 2]);
    }
}
