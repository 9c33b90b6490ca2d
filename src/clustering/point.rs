//! Points in the clustering feature space

use crate::error::ClusteringError;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Div};

/// Immutable vector of real coordinates
///
/// A point is usually built from the processed parameters of one burst.
/// All points of a run share one dimensionality, fixed by the first point.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    values: Vec<f64>,
    normalized: bool,
}

impl Point {
    /// Create a point from raw coordinates
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            normalized: false,
        }
    }

    /// Create a point whose coordinates are already range normalized
    pub fn normalized_from(values: Vec<f64>) -> Self {
        Self {
            values,
            normalized: true,
        }
    }

    /// Number of coordinates
    pub fn dimensions(&self) -> usize {
        self.values.len()
    }

    /// Coordinates as a slice
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    /// Coordinate at `dim`
    pub fn get(&self, dim: usize) -> Option<f64> {
        self.values.get(dim).copied()
    }

    /// Whether the coordinates went through range normalization
    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Squared euclidean distance, or `None` when dimensions differ
    pub fn squared_distance(&self, other: &Point) -> Option<f64> {
        if self.dimensions() != other.dimensions() {
            return None;
        }
        Some(squared_distance(&self.values, &other.values))
    }

    /// Euclidean distance
    ///
    /// Points of different dimensionality are infinitely far apart.
    pub fn euclidean_distance(&self, other: &Point) -> f64 {
        self.squared_distance(other)
            .map(f64::sqrt)
            .unwrap_or(f64::INFINITY)
    }

    /// Return a range-normalized copy of this point
    ///
    /// Each coordinate `v` becomes `factor * (v - min) / (max - min)`.
    /// Coordinates whose range is empty collapse to zero.
    pub fn range_normalized(
        &self,
        min: &[f64],
        max: &[f64],
        factors: &[f64],
    ) -> Result<Point, ClusteringError> {
        for bound in [min.len(), max.len(), factors.len()] {
            if bound != self.dimensions() {
                return Err(ClusteringError::DimensionMismatch {
                    expected: self.dimensions(),
                    found: bound,
                });
            }
        }

        let values = self
            .values
            .iter()
            .enumerate()
            .map(|(i, &v)| range_normalize(v, min[i], max[i], factors[i]))
            .collect();

        Ok(Point::normalized_from(values))
    }
}

impl From<Vec<f64>> for Point {
    fn from(values: Vec<f64>) -> Self {
        Point::new(values)
    }
}

impl Add for &Point {
    type Output = Point;

    fn add(self, rhs: &Point) -> Point {
        let values = self
            .values
            .iter()
            .zip(rhs.values.iter())
            .map(|(a, b)| a + b)
            .collect();
        Point {
            values,
            normalized: self.normalized && rhs.normalized,
        }
    }
}

impl Div<f64> for &Point {
    type Output = Point;

    fn div(self, rhs: f64) -> Point {
        Point {
            values: self.values.iter().map(|v| v / rhs).collect(),
            normalized: self.normalized,
        }
    }
}

/// Squared euclidean distance between two equally sized coordinate slices
#[inline]
pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Scale `value` into `[0, factor]` given the observed range of its dimension
pub fn range_normalize(value: f64, min: f64, max: f64, factor: f64) -> f64 {
    let span = max - min;
    if span <= 0.0 || !span.is_finite() {
        return 0.0;
    }
    factor * (value - min) / span
}

/// Check that every point has the dimensionality of the first one
///
/// Returns the common dimensionality, or zero for an empty set.
pub fn common_dimensions(points: &[Point]) -> Result<usize, ClusteringError> {
    let Some(first) = points.first() else {
        return Ok(0);
    };
    let expected = first.dimensions();

    match points.iter().find(|p| p.dimensions() != expected) {
        Some(p) => Err(ClusteringError::DimensionMismatch {
            expected,
            found: p.dimensions(),
        }),
        None => Ok(expected),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_euclidean_distance() {
        let a = Point::new(vec![0.0, 0.0]);
        let b = Point::new(vec![3.0, 4.0]);
        assert_eq!(a.euclidean_distance(&b), 5.0);
        assert_eq!(a.squared_distance(&b), Some(25.0));
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let a = Point::new(vec![0.0, 0.0]);
        let b = Point::new(vec![1.0]);
        assert_eq!(a.squared_distance(&b), None);
        assert!(a.euclidean_distance(&b).is_infinite());
    }

    #[test]
    fn test_range_normalization() {
        let p = Point::new(vec![5.0, 7.0, 3.0]);
        let n = p
            .range_normalized(&[0.0, 7.0, 1.0], &[10.0, 7.0, 5.0], &[1.0, 1.0, 2.0])
            .unwrap();

        assert!(n.is_normalized());
        assert_eq!(n.as_slice(), &[0.5, 0.0, 1.0]);
    }

    #[test]
    fn test_arithmetic() {
        let a = Point::new(vec![1.0, 2.0]);
        let b = Point::new(vec![3.0, 4.0]);
        let mean = &(&a + &b) / 2.0;
        assert_eq!(mean.as_slice(), &[2.0, 3.0]);
    }

    #[test]
    fn test_common_dimensions() {
        let ok = vec![Point::new(vec![1.0, 2.0]), Point::new(vec![0.0, 0.0])];
        assert_eq!(common_dimensions(&ok), Ok(2));
        assert_eq!(common_dimensions(&[]), Ok(0));

        let bad = vec![Point::new(vec![1.0, 2.0]), Point::new(vec![0.0])];
        assert_eq!(
            common_dimensions(&bad),
            Err(ClusteringError::DimensionMismatch {
                expected: 2,
                found: 1
            })
        );
    }
}
