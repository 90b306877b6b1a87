use serde::{Deserialize, Serialize};

use crate::vertex::Vertex;

/// An open cluster centre. Always sits on one designated vertex, which is
/// also one of its members.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Facility {
    vertex: usize,
    coords: Vec<f64>,
    members: Vec<usize>,
    /// Scratch for the sequential gain pass, reset after every evaluation.
    #[serde(skip)]
    accumulator: f64,
    max_distance: f64,
    max_distance_vertex: usize,
}

impl Facility {
    /// Facility on `vertex` with no members yet; the caller adds the vertex
    /// itself like any other member.
    pub(crate) fn new(index: usize, vertex: &Vertex) -> Self {
        Self {
            vertex: index,
            coords: vertex.coords().to_vec(),
            members: Vec::new(),
            accumulator: 0.0,
            max_distance: 0.0,
            max_distance_vertex: index,
        }
    }

    pub fn vertex(&self) -> usize {
        self.vertex
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn members(&self) -> &[usize] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Largest member distance (without vertex weights).
    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    pub(crate) fn accumulator(&self) -> f64 {
        self.accumulator
    }

    pub(crate) fn add_to_accumulator(&mut self, value: f64) {
        self.accumulator += value;
    }

    pub(crate) fn reset_accumulator(&mut self) {
        self.accumulator = 0.0;
    }

    pub(crate) fn add_member(&mut self, index: usize, distance: f64) {
        self.members.push(index);
        if distance > self.max_distance {
            self.max_distance = distance;
            self.max_distance_vertex = index;
        }
    }

    /// Removes `index` from the members; `vertices` is needed to find a new
    /// farthest member when the current one leaves.
    pub(crate) fn remove_member(&mut self, index: usize, vertices: &[Vertex]) {
        if let Some(pos) = self.members.iter().position(|&m| m == index) {
            self.members.remove(pos);
        }
        if index == self.max_distance_vertex {
            self.recompute_max_distance(vertices);
        }
    }

    fn recompute_max_distance(&mut self, vertices: &[Vertex]) {
        self.max_distance = 0.0;
        self.max_distance_vertex = self.vertex;
        for &m in &self.members {
            let d = vertices[m].distance_to_facility();
            if d > self.max_distance {
                self.max_distance = d;
                self.max_distance_vertex = m;
            }
        }
    }

    /// Takes the member list, leaving the facility empty.
    pub(crate) fn take_members(&mut self) -> Vec<usize> {
        self.max_distance = 0.0;
        self.max_distance_vertex = self.vertex;
        std::mem::take(&mut self.members)
    }

    pub(crate) fn refresh_coords(&mut self, vertex: &Vertex) {
        self.coords = vertex.coords().to_vec();
    }
}
