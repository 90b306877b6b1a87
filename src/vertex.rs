//! Points and their clustering-assignment state.
//!
//! A [`Vertex`] owns its coordinates and a weight (the number of raw points it
//! stands for once it has been promoted from a lower level). Assignment state
//! refers to the owning facility by its vertex index; facilities live in the
//! clusterer's arena, never inside the vertex.
//!
//! Two distances are kept apart:
//! - the *distance*: Euclidean, each axis scaled by the optional coordinate
//!   weights passed to every call
//! - the *connection cost*: distance times the vertex weight, the quantity
//!   facility location minimises

use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    coords: Vec<f64>,
    weight: f64,
    /// Vertex index of the facility serving this vertex.
    facility: Option<usize>,
    is_facility: bool,
    distance_to_facility: f64,
    cost_to_facility: f64,
}

impl Vertex {
    /// Unit-weight vertex, not assigned to any facility.
    pub fn new(coords: Vec<f64>) -> Self {
        Self {
            coords,
            weight: 1.0,
            facility: None,
            is_facility: false,
            distance_to_facility: 0.0,
            cost_to_facility: 0.0,
        }
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn dimension(&self) -> usize {
        self.coords.len()
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    /// Infinite weight marks a vertex that must stay a facility.
    pub fn is_forced(&self) -> bool {
        self.weight == f64::INFINITY
    }

    pub fn facility(&self) -> Option<usize> {
        self.facility
    }

    pub fn is_facility(&self) -> bool {
        self.is_facility
    }

    /// Connection cost to the current facility; zero for a facility vertex.
    pub fn cost_to_facility(&self) -> f64 {
        self.cost_to_facility
    }

    /// Distance to the current facility, without the vertex weight.
    pub fn distance_to_facility(&self) -> f64 {
        self.distance_to_facility
    }

    /// Weighted Euclidean distance to `other`.
    pub fn distance(&self, other: &Vertex, weights: Option<&[f64]>) -> ClusterResult<f64> {
        if self.dimension() != other.dimension() {
            return Err(ClusterError::DimensionMismatch {
                expected: self.dimension(),
                got: other.dimension(),
            });
        }
        if let Some(w) = weights {
            if w.len() != self.dimension() {
                return Err(ClusterError::DimensionMismatch {
                    expected: self.dimension(),
                    got: w.len(),
                });
            }
        }
        Ok(coord_distance(&self.coords, &other.coords, weights))
    }

    /// Cost of connecting this vertex to something `distance` away.
    #[inline]
    pub fn connection_cost(&self, distance: f64) -> f64 {
        // keeps forced vertices at zero cost on their own facility
        if distance == 0.0 {
            0.0
        } else {
            self.weight * distance
        }
    }

    pub(crate) fn assign(&mut self, facility: usize, distance: f64) {
        self.facility = Some(facility);
        self.distance_to_facility = distance;
        self.cost_to_facility = self.connection_cost(distance);
    }

    pub(crate) fn set_is_facility(&mut self, is_facility: bool) {
        self.is_facility = is_facility;
    }

    pub(crate) fn clear_assignment(&mut self) {
        self.facility = None;
        self.is_facility = false;
        self.distance_to_facility = 0.0;
        self.cost_to_facility = 0.0;
    }
}

/// Euclidean distance with optional per-axis scaling. Callers check lengths.
#[inline]
pub(crate) fn coord_distance(a: &[f64], b: &[f64], weights: Option<&[f64]>) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    match weights {
        None => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y).powi(2))
            .sum::<f64>()
            .sqrt(),
        Some(w) => a
            .iter()
            .zip(b)
            .zip(w)
            .map(|((x, y), w)| ((x - y) * w).powi(2))
            .sum::<f64>()
            .sqrt(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_unweighted_and_weighted() {
        let a = Vertex::new(vec![0.0, 0.0, 0.0]);
        let b = Vertex::new(vec![1.0, 2.0, 2.0]);
        assert!((a.distance(&b, None).unwrap() - 3.0).abs() < 1e-12);

        let w = [2.0, 0.0, 0.5];
        // sqrt(4 + 0 + 1)
        assert!((a.distance(&b, Some(&w)).unwrap() - 5.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_distance_checks_dimensions() {
        let a = Vertex::new(vec![0.0, 0.0]);
        let b = Vertex::new(vec![1.0, 2.0, 2.0]);
        assert!(matches!(
            a.distance(&b, None),
            Err(ClusterError::DimensionMismatch {
                expected: 2,
                got: 3
            })
        ));
        assert!(a.distance(&a, Some(&[1.0])).is_err());
    }

    #[test]
    fn test_connection_cost_scales_with_weight() {
        let v = Vertex::new(vec![0.0]).with_weight(2.5);
        assert_eq!(v.connection_cost(2.0), 5.0);

        let forced = Vertex::new(vec![0.0]).with_weight(f64::INFINITY);
        assert!(forced.is_forced());
        assert_eq!(forced.connection_cost(0.0), 0.0);
        assert_eq!(forced.connection_cost(1e-9), f64::INFINITY);
    }

    #[test]
    fn test_assign_caches_cost() {
        let mut v = Vertex::new(vec![1.0, 1.0]).with_weight(3.0);
        v.assign(7, 0.5);
        assert_eq!(v.facility(), Some(7));
        assert_eq!(v.distance_to_facility(), 0.5);
        assert_eq!(v.cost_to_facility(), 1.5);
        v.clear_assignment();
        assert_eq!(v.facility(), None);
        assert_eq!(v.cost_to_facility(), 0.0);
    }
}
