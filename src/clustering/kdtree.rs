//! KD-tree spatial index for fixed-radius and k-nearest queries
//!
//! The tree is built once over an immutable point set and stored as an
//! arena: coordinates live in one contiguous buffer and nodes refer to
//! children by index. Splits cycle through the dimensions and pivot on the
//! median, so the depth stays logarithmic in the number of points.
//!
//! Construction: O(n log n)
//! Range query: O(n^(1-1/d) + k) worst case, k = number of points returned
//! k-nearest: O(log n) average

use super::point::{common_dimensions, squared_distance, Point};
use crate::error::ClusteringError;
use ordered_float::OrderedFloat;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, Copy)]
struct KdNode {
    /// Index of the point in the input set
    point: usize,
    split_dim: usize,
    left: Option<usize>,
    right: Option<usize>,
}

/// Spatial index over a fixed set of points
#[derive(Debug, Clone)]
pub struct KdTree {
    /// Row-major coordinates, `dimensions` values per point
    coords: Vec<f64>,
    dimensions: usize,
    nodes: Vec<KdNode>,
    root: Option<usize>,
}

impl KdTree {
    /// Build an index over `points`
    ///
    /// Point `i` of the input is reported as index `i` by every query.
    pub fn build(points: &[Point]) -> Result<Self, ClusteringError> {
        if points.is_empty() {
            return Err(ClusteringError::EmptyIndex);
        }
        let dimensions = common_dimensions(points)?;
        if dimensions == 0 {
            return Err(ClusteringError::Configuration(
                "cannot index points without coordinates".to_string(),
            ));
        }

        let mut coords = Vec::with_capacity(points.len() * dimensions);
        for p in points {
            coords.extend_from_slice(p.as_slice());
        }

        let mut order: Vec<usize> = (0..points.len()).collect();
        let mut nodes = Vec::with_capacity(points.len());
        let root = build_recursive(&coords, dimensions, &mut order, 0, &mut nodes);

        Ok(Self {
            coords,
            dimensions,
            nodes,
            root,
        })
    }

    /// Number of indexed points
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the index holds no points
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Dimensionality of the indexed points
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    #[inline]
    fn coords_of(&self, idx: usize) -> &[f64] {
        let start = idx * self.dimensions;
        &self.coords[start..start + self.dimensions]
    }

    /// All indexed points within `epsilon` of `query`, boundary included
    ///
    /// The query point itself is part of the result when it is indexed.
    /// Indices come back in ascending order.
    pub fn range_query(&self, query: &Point, epsilon: f64) -> Result<Vec<usize>, ClusteringError> {
        self.check_query(query)?;

        let mut results = Vec::new();
        if let Some(root) = self.root {
            self.range_recursive(root, query.as_slice(), epsilon * epsilon, &mut results);
        }
        results.sort_unstable();
        Ok(results)
    }

    /// Range query for an indexed point, by index
    pub(crate) fn range_query_indexed(&self, idx: usize, epsilon: f64) -> Vec<usize> {
        let mut results = Vec::new();
        if let Some(root) = self.root {
            let query = self.coords_of(idx).to_vec();
            self.range_recursive(root, &query, epsilon * epsilon, &mut results);
        }
        results.sort_unstable();
        results
    }

    fn range_recursive(&self, node_idx: usize, query: &[f64], radius_sq: f64, results: &mut Vec<usize>) {
        let node = self.nodes[node_idx];
        let here = self.coords_of(node.point);

        if squared_distance(query, here) <= radius_sq {
            results.push(node.point);
        }

        let diff = query[node.split_dim] - here[node.split_dim];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(child) = near {
            self.range_recursive(child, query, radius_sq, results);
        }
        // Equal coordinates may sit on either side of the split
        if diff * diff <= radius_sq {
            if let Some(child) = far {
                self.range_recursive(child, query, radius_sq, results);
            }
        }
    }

    /// The `k` indexed points closest to `query`, nearest first
    ///
    /// Returns `(index, distance)` pairs. Ties are broken by index.
    pub fn nearest(&self, query: &Point, k: usize) -> Result<Vec<(usize, f64)>, ClusteringError> {
        self.check_query(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        // Max-heap on distance, so the worst candidate is on top
        let mut heap: BinaryHeap<(OrderedFloat<f64>, usize)> = BinaryHeap::with_capacity(k + 1);
        if let Some(root) = self.root {
            self.nearest_recursive(root, query.as_slice(), k, &mut heap);
        }

        let mut found: Vec<(usize, f64)> = heap
            .into_iter()
            .map(|(d, idx)| (idx, d.into_inner().sqrt()))
            .collect();
        found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        Ok(found)
    }

    fn nearest_recursive(
        &self,
        node_idx: usize,
        query: &[f64],
        k: usize,
        heap: &mut BinaryHeap<(OrderedFloat<f64>, usize)>,
    ) {
        let node = self.nodes[node_idx];
        let here = self.coords_of(node.point);

        let dist_sq = OrderedFloat(squared_distance(query, here));
        if heap.len() < k {
            heap.push((dist_sq, node.point));
        } else if let Some(&worst) = heap.peek() {
            if (dist_sq, node.point) < worst {
                heap.pop();
                heap.push((dist_sq, node.point));
            }
        }

        let diff = query[node.split_dim] - here[node.split_dim];
        let (near, far) = if diff < 0.0 {
            (node.left, node.right)
        } else {
            (node.right, node.left)
        };

        if let Some(child) = near {
            self.nearest_recursive(child, query, k, heap);
        }

        let plane_sq = diff * diff;
        let must_visit = heap.len() < k || heap.peek().is_some_and(|(worst, _)| plane_sq <= worst.0);
        if must_visit {
            if let Some(child) = far {
                self.nearest_recursive(child, query, k, heap);
            }
        }
    }

    /// Distance to the point at position `k` in nearest-first order
    ///
    /// Position 0 is the closest indexed point. For a query that is itself
    /// indexed that is the query at distance zero, so position `k` is its
    /// k-th nearest neighbour. `None` when fewer than `k + 1` points exist.
    pub fn kth_nearest_distance(&self, query: &Point, k: usize) -> Result<Option<f64>, ClusteringError> {
        let found = self.nearest(query, k + 1)?;
        Ok(found.get(k).map(|&(_, d)| d))
    }

    fn check_query(&self, query: &Point) -> Result<(), ClusteringError> {
        if query.dimensions() != self.dimensions {
            return Err(ClusteringError::DimensionMismatch {
                expected: self.dimensions,
                found: query.dimensions(),
            });
        }
        Ok(())
    }
}

fn build_recursive(
    coords: &[f64],
    dimensions: usize,
    order: &mut [usize],
    depth: usize,
    nodes: &mut Vec<KdNode>,
) -> Option<usize> {
    if order.is_empty() {
        return None;
    }

    let split_dim = depth % dimensions;
    let mid = order.len() / 2;

    order.select_nth_unstable_by(mid, |&a, &b| {
        let ka = coords[a * dimensions + split_dim];
        let kb = coords[b * dimensions + split_dim];
        ka.total_cmp(&kb).then(a.cmp(&b))
    });

    let point = order[mid];
    let (left_slice, rest) = order.split_at_mut(mid);
    let right_slice = &mut rest[1..];

    let left = build_recursive(coords, dimensions, left_slice, depth + 1, nodes);
    let right = build_recursive(coords, dimensions, right_slice, depth + 1, nodes);

    nodes.push(KdNode {
        point,
        split_dim,
        left,
        right,
    });
    Some(nodes.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize) -> Vec<Point> {
        let mut points = Vec::new();
        for x in 0..n {
            for y in 0..n {
                points.push(Point::new(vec![x as f64, y as f64]));
            }
        }
        points
    }

    fn brute_range(points: &[Point], query: &Point, eps: f64) -> Vec<usize> {
        points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.squared_distance(query).unwrap() <= eps * eps)
            .map(|(i, _)| i)
            .collect()
    }

    #[test]
    fn test_empty_build_rejected() {
        assert_eq!(KdTree::build(&[]).unwrap_err(), ClusteringError::EmptyIndex);
    }

    #[test]
    fn test_mixed_dimensions_rejected() {
        let points = vec![Point::new(vec![0.0, 0.0]), Point::new(vec![1.0])];
        assert!(matches!(
            KdTree::build(&points),
            Err(ClusteringError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_range_query_matches_brute_force() {
        let points = grid(10);
        let tree = KdTree::build(&points).unwrap();
        assert_eq!(tree.len(), 100);

        for q in [&points[0], &points[55], &points[99]] {
            for eps in [0.5, 1.0, 1.5, 3.0] {
                assert_eq!(tree.range_query(q, eps).unwrap(), brute_range(&points, q, eps));
            }
        }
    }

    #[test]
    fn test_range_includes_boundary_and_self() {
        let points = vec![Point::new(vec![0.0]), Point::new(vec![1.0]), Point::new(vec![2.5])];
        let tree = KdTree::build(&points).unwrap();
        assert_eq!(tree.range_query(&points[0], 1.0).unwrap(), vec![0, 1]);
        assert_eq!(tree.range_query_indexed(2, 0.1), vec![2]);
    }

    #[test]
    fn test_duplicate_coordinates() {
        let points = vec![Point::new(vec![1.0, 1.0]); 7];
        let tree = KdTree::build(&points).unwrap();
        assert_eq!(tree.range_query(&points[3], 0.0).unwrap(), (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_nearest_neighbours() {
        let points = vec![
            Point::new(vec![0.0]),
            Point::new(vec![1.0]),
            Point::new(vec![3.0]),
            Point::new(vec![7.0]),
        ];
        let tree = KdTree::build(&points).unwrap();

        let found = tree.nearest(&Point::new(vec![0.0]), 3).unwrap();
        assert_eq!(found, vec![(0, 0.0), (1, 1.0), (2, 3.0)]);

        assert_eq!(tree.kth_nearest_distance(&points[0], 1).unwrap(), Some(1.0));
        assert_eq!(tree.kth_nearest_distance(&points[3], 1).unwrap(), Some(4.0));
        assert_eq!(tree.kth_nearest_distance(&points[0], 4).unwrap(), None);
    }

    #[test]
    fn test_query_dimension_checked() {
        let tree = KdTree::build(&grid(3)).unwrap();
        assert!(tree.range_query(&Point::new(vec![0.0]), 1.0).is_err());
    }
}
