//! Property and scenario tests for DBSCAN
//!
//! Uses property-based testing (proptest) to check the density
//! reachability guarantees against a brute-force neighbourhood oracle.

use burst_clustering::clustering::{Dbscan, KdTree, Point};
use burst_clustering::engine::ClusteringAlgorithm;
use burst_clustering::types::NOISE;
use proptest::prelude::*;
use std::collections::BTreeSet;

// =============================================================================
// Test Data Strategies
// =============================================================================

/// Points on a coarse grid so that clusters, borders and noise all occur
fn grid_points(max: usize) -> impl Strategy<Value = Vec<Point>> {
    prop::collection::vec((0u8..24, 0u8..24), 0..max).prop_map(|cells| {
        cells
            .into_iter()
            .map(|(x, y)| Point::new(vec![x as f64 * 0.5, y as f64 * 0.5]))
            .collect()
    })
}

fn within(a: &Point, b: &Point, eps: f64) -> bool {
    a.squared_distance(b).unwrap() <= eps * eps
}

/// Brute-force core point flags
fn core_points(points: &[Point], eps: f64, min_points: usize) -> Vec<bool> {
    points
        .iter()
        .map(|p| points.iter().filter(|q| within(p, q, eps)).count() >= min_points)
        .collect()
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    /// No point within epsilon of a core point is left as noise
    #[test]
    fn noise_frontier(
        points in grid_points(80),
        eps in 0.3..3.0f64,
        min_points in 1usize..6,
    ) {
        let partition = Dbscan::new(eps, min_points).unwrap().run(&points).unwrap();
        let core = core_points(&points, eps, min_points);

        for (i, p) in points.iter().enumerate() {
            if partition.assignment()[i] != NOISE {
                continue;
            }
            for (j, q) in points.iter().enumerate() {
                prop_assert!(
                    !(core[j] && within(p, q, eps)),
                    "point {} is noise but lies within eps of core point {}", i, j
                );
            }
        }
    }

    /// Core points within epsilon of each other share a cluster
    #[test]
    fn reachability_closure(
        points in grid_points(80),
        eps in 0.3..3.0f64,
        min_points in 1usize..6,
    ) {
        let partition = Dbscan::new(eps, min_points).unwrap().run(&points).unwrap();
        let core = core_points(&points, eps, min_points);
        let ids = partition.assignment();

        for i in 0..points.len() {
            if !core[i] {
                continue;
            }
            prop_assert_ne!(ids[i], NOISE);
            for j in 0..points.len() {
                if core[j] && within(&points[i], &points[j], eps) {
                    prop_assert_eq!(ids[i], ids[j], "core points {} and {} split", i, j);
                }
            }
        }
    }

    /// Every clustered point lies within epsilon of a core point of its cluster
    #[test]
    fn border_points_touch_own_core(
        points in grid_points(80),
        eps in 0.3..3.0f64,
        min_points in 1usize..6,
    ) {
        let partition = Dbscan::new(eps, min_points).unwrap().run(&points).unwrap();
        let core = core_points(&points, eps, min_points);
        let ids = partition.assignment();

        for (i, p) in points.iter().enumerate() {
            if ids[i] == NOISE {
                continue;
            }
            prop_assert!(
                (0..points.len()).any(|j| core[j] && ids[j] == ids[i] && within(p, &points[j], eps)),
                "point {} in cluster {} has no core neighbour in it", i, ids[i]
            );
        }
    }

    /// Every cluster holds a core point and ids are contiguous from 1
    #[test]
    fn clusters_are_seeded_and_contiguous(
        points in grid_points(80),
        eps in 0.3..3.0f64,
        min_points in 1usize..6,
    ) {
        let partition = Dbscan::new(eps, min_points).unwrap().run(&points).unwrap();
        let core = core_points(&points, eps, min_points);

        let real: BTreeSet<u32> = partition.assignment().iter().copied().filter(|&id| id != NOISE).collect();
        let expected: BTreeSet<u32> = (1..=partition.cluster_count() as u32).collect();
        prop_assert_eq!(&real, &expected);

        for id in real {
            prop_assert!(partition.members(id).iter().any(|&i| core[i]));
        }
        prop_assert_eq!(partition.len(), points.len());
    }

    /// Identical input yields identical assignments
    #[test]
    fn deterministic(
        points in grid_points(60),
        eps in 0.3..3.0f64,
        min_points in 1usize..6,
    ) {
        let dbscan = Dbscan::new(eps, min_points).unwrap();
        let first = dbscan.run(&points).unwrap();
        let second = dbscan.run(&points).unwrap();
        prop_assert_eq!(first, second);
    }

    /// With one point per core neighbourhood nothing is noise
    #[test]
    fn min_points_one_has_no_noise(points in grid_points(60), eps in 0.3..3.0f64) {
        let partition = Dbscan::new(eps, 1).unwrap().run(&points).unwrap();
        prop_assert!(!partition.has_noise());
    }

    /// KD-tree radius queries match a linear scan
    #[test]
    fn range_query_matches_scan(points in grid_points(80), eps in 0.1..4.0f64) {
        prop_assume!(!points.is_empty());
        let tree = KdTree::build(&points).unwrap();
        for q in points.iter().take(10) {
            let expected: Vec<usize> = points
                .iter()
                .enumerate()
                .filter(|(_, p)| within(p, q, eps))
                .map(|(i, _)| i)
                .collect();
            prop_assert_eq!(tree.range_query(q, eps).unwrap(), expected);
        }
    }
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_two_close_points_and_an_outlier() {
    let points = vec![
        Point::new(vec![0.0, 0.0]),
        Point::new(vec![0.5, 0.0]),
        Point::new(vec![5.0, 5.0]),
    ];
    let partition = Dbscan::new(1.0, 2).unwrap().run(&points).unwrap();

    assert_eq!(partition.assignment(), &[1, 1, NOISE]);
    assert_eq!(partition.cluster_count(), 1);
    assert!(partition.has_noise());
}

#[test]
fn test_isolated_points_form_singletons() {
    let points = vec![Point::new(vec![0.0, 0.0]), Point::new(vec![10.0, 10.0])];
    let partition = Dbscan::new(0.1, 1).unwrap().run(&points).unwrap();

    assert_eq!(partition.assignment(), &[1, 2]);
    assert_eq!(partition.cluster_count(), 2);
    assert!(!partition.has_noise());
}

#[test]
fn test_empty_input_builds_no_index() {
    let (partition, stats) = Dbscan::new(0.5, 3).unwrap().run_with_stats(&[]).unwrap();

    assert!(partition.is_empty());
    assert_eq!(partition.cluster_count(), 0);
    assert!(!stats.index_built);
    assert_eq!(stats.range_queries, 0);
}

#[test]
fn test_chain_is_one_cluster() {
    let points: Vec<Point> = (0..20).map(|i| Point::new(vec![i as f64 * 0.9])).collect();
    let partition = Dbscan::new(1.0, 3).unwrap().run(&points).unwrap();
    // end points are borders, everything else is core
    assert!(partition.assignment().iter().all(|&id| id == 1));
}

#[test]
fn test_border_point_adopted_after_noise() {
    // point 0 is visited first and is not core, then absorbed by the cluster
    let points = vec![
        Point::new(vec![0.0]),
        Point::new(vec![1.0]),
        Point::new(vec![1.5]),
        Point::new(vec![2.0]),
    ];
    let partition = Dbscan::new(1.0, 3).unwrap().run(&points).unwrap();
    assert_eq!(partition.assignment(), &[1, 1, 1, 1]);
}

#[test]
fn test_mixed_dimensions_rejected() {
    let points = vec![Point::new(vec![0.0, 0.0]), Point::new(vec![1.0])];
    assert!(Dbscan::new(1.0, 1).unwrap().run(&points).is_err());
}
