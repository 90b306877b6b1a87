//! Gain evaluation for a facility candidate, split over facility ranges.
//!
//! The scan over open facilities is read-only: every range produces a
//! [`PartialGain`] with its own accumulators, and the partials are merged in
//! range order. Mutation happens afterwards, in a single commit step owned by
//! the clusterer.
//!
//! Near facilities (candidate within twice their farthest member) have every
//! member inspected for reassignment. Far facilities cannot lose a member to
//! the candidate, so only their closure is evaluated, with an early exit
//! once it can no longer pay off.

use std::ops::Range;

use log::trace;
use rayon::prelude::*;

use crate::facility::Facility;
use crate::vertex::{Vertex, coord_distance};

/// Result of evaluating one candidate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GainOutcome {
    /// Net cost improvement of opening the candidate.
    pub gain: f64,
    /// Vertices that would move to the candidate.
    pub reassign: Vec<usize>,
    /// Facilities (by vertex index) that would close, members moving to the candidate.
    pub close: Vec<usize>,
}

/// Contribution of one facility range.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct PartialGain {
    pub gain: f64,
    pub reassign: Vec<usize>,
    pub close: Vec<usize>,
}

impl PartialGain {
    /// Appends `other`, keeping range order.
    pub fn merge(mut self, other: PartialGain) -> PartialGain {
        self.gain += other.gain;
        self.reassign.extend(other.reassign);
        self.close.extend(other.close);
        self
    }
}

/// Read-only view of a clustering state for one evaluation.
pub(crate) struct GainContext<'a> {
    pub vertices: &'a [Vertex],
    pub slots: &'a [Option<Facility>],
    pub open: &'a [usize],
    pub facility_cost: f64,
    pub weights: Option<&'a [f64]>,
    pub include_facility_vertices: bool,
}

impl GainContext<'_> {
    /// Cost of opening the candidate: nothing when it is already a facility.
    pub fn opening_gain(&self, candidate: usize) -> f64 {
        if self.vertices[candidate].is_facility() {
            0.0
        } else {
            -self.facility_cost
        }
    }

    fn counts(&self, vertex: &Vertex) -> bool {
        self.include_facility_vertices || !vertex.is_facility()
    }

    fn closable(&self, facility: usize, candidate: usize) -> bool {
        facility != candidate && !self.vertices[facility].is_forced()
    }

    /// Scans `open[range]`.
    pub fn range_gain(&self, candidate: usize, range: Range<usize>) -> PartialGain {
        let mut partial = PartialGain::default();
        let cand = &self.vertices[candidate];

        for &f in &self.open[range] {
            let Some(facility) = self.slots[f].as_ref() else {
                continue;
            };
            let dist = coord_distance(
                cand.coords(),
                self.vertices[f].coords(),
                self.weights,
            );
            if dist <= 2.0 * facility.max_distance() {
                self.near_facility(facility, candidate, &mut partial);
            } else if f != candidate {
                self.far_facility(facility, candidate, &mut partial);
            }
        }
        partial
    }

    fn member_gain(&self, member: usize, candidate: usize) -> f64 {
        let v = &self.vertices[member];
        let d = coord_distance(
            v.coords(),
            self.vertices[candidate].coords(),
            self.weights,
        );
        v.cost_to_facility() - v.connection_cost(d)
    }

    fn near_facility(&self, facility: &Facility, candidate: usize, partial: &mut PartialGain) {
        let mut accumulator = 0.0;
        for &m in facility.members() {
            if !self.counts(&self.vertices[m]) {
                continue;
            }
            let dist_gain = self.member_gain(m, candidate);
            if dist_gain > 0.0 {
                partial.reassign.push(m);
                partial.gain += dist_gain;
            } else {
                accumulator += dist_gain;
            }
        }
        if accumulator + self.facility_cost > 0.0 && self.closable(facility.vertex(), candidate) {
            partial.close.push(facility.vertex());
            partial.gain += accumulator + self.facility_cost;
        }
    }

    fn far_facility(&self, facility: &Facility, candidate: usize, partial: &mut PartialGain) {
        if !self.closable(facility.vertex(), candidate) {
            return;
        }
        let mut accumulator = 0.0;
        for &m in facility.members() {
            if !self.counts(&self.vertices[m]) {
                continue;
            }
            accumulator += self.member_gain(m, candidate);
            if accumulator + self.facility_cost <= 0.0 {
                return;
            }
        }
        partial.close.push(facility.vertex());
        partial.gain += accumulator + self.facility_cost;
    }

    /// Evaluates `candidate` over the given ranges of the open list in
    /// parallel and merges the partials in range order.
    pub fn parallel_gain(&self, candidate: usize, ranges: &[Range<usize>]) -> GainOutcome {
        let partials: Vec<PartialGain> = ranges
            .par_iter()
            .map(|r| self.range_gain(candidate, r.clone()))
            .collect();

        let merged = partials
            .into_iter()
            .fold(PartialGain::default(), PartialGain::merge);
        let outcome = GainOutcome {
            gain: self.opening_gain(candidate) + merged.gain,
            reassign: merged.reassign,
            close: merged.close,
        };
        trace!(
            "candidate {}: gain {:.6}, {} to reassign, {} to close",
            candidate,
            outcome.gain,
            outcome.reassign.len(),
            outcome.close.len()
        );
        outcome
    }
}

/// Splits `0..len` into at most `parts` contiguous ranges; the last one
/// takes the remainder. No range is empty unless `len` is 0.
pub fn split_ranges(len: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.clamp(1, len.max(1));
    let chunk = len / parts;
    (0..parts)
        .map(|j| {
            let end = if j + 1 == parts { len } else { (j + 1) * chunk };
            j * chunk..end
        })
        .collect()
}
