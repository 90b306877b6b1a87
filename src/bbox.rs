use serde::{Deserialize, Serialize};

use crate::error::{ClusterError, ClusterResult};
use crate::vertex::{Vertex, coord_distance};

/// Axis-aligned bounding box of a point set.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    min: Vec<f64>,
    max: Vec<f64>,
}

impl BoundingBox {
    /// Box around `vertices`; empty when there are none.
    pub fn from_vertices(vertices: &[Vertex]) -> ClusterResult<Self> {
        let mut bbox = Self::default();
        for v in vertices {
            bbox.add(v.coords())?;
        }
        Ok(bbox)
    }

    pub fn is_initialized(&self) -> bool {
        !self.min.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self) -> &[f64] {
        &self.min
    }

    pub fn max(&self) -> &[f64] {
        &self.max
    }

    /// Grows the box to contain `coords`.
    pub fn add(&mut self, coords: &[f64]) -> ClusterResult<()> {
        if !self.is_initialized() {
            self.min = coords.to_vec();
            self.max = coords.to_vec();
            return Ok(());
        }
        if coords.len() != self.dimension() {
            return Err(ClusterError::DimensionMismatch {
                expected: self.dimension(),
                got: coords.len(),
            });
        }
        for ((lo, hi), &c) in self.min.iter_mut().zip(self.max.iter_mut()).zip(coords) {
            *lo = lo.min(c);
            *hi = hi.max(c);
        }
        Ok(())
    }

    /// Length of the diagonal, each axis scaled by `weights`. Zero when empty.
    pub fn weighted_diagonal(&self, weights: Option<&[f64]>) -> f64 {
        if !self.is_initialized() {
            return 0.0;
        }
        coord_distance(&self.min, &self.max, weights)
    }
}
