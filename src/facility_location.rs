//! Online facility-location clustering of one block of vertices.
//!
//! Opening a facility costs `facility_cost` (the coordinate-weighted bounding
//! box diagonal times the cost multiplier); connecting a vertex costs its
//! weight times its distance to the facility. The solution is built in two
//! phases:
//! - random insertion: vertices are visited in random order and each opens a
//!   facility with probability `min(1, cost / facility_cost)`, otherwise it
//!   joins the nearest open facility
//! - local search: a random vertex is evaluated as a facility candidate; when
//!   the gain (connection savings plus the savings of closing facilities whose
//!   members would all be better off at the candidate) is positive the move is
//!   committed
//!
//! Vertices and facilities form an arena: a vertex refers to its facility by
//! the facility's vertex index, facilities are stored in a slot per vertex
//! index, and `open` keeps the open facilities in opening order.
//!
//! Vertices with infinite weight are forced facilities: inserted first, always
//! opened, never closed. With `facility_cost <= 0` every vertex becomes its own facility.

use std::ops::Range;

use log::{debug, info, trace};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{ClusterError, ClusterResult};
use crate::facility::Facility;
use crate::gain::{GainContext, GainOutcome, split_ranges};
use crate::stream::{ClusterRecord, ClusterSink};
use crate::vertex::{Vertex, coord_distance};

/// Parameters of one facility-location run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacilityLocationConfig {
    /// Scales the facility cost; higher values give fewer, larger clusters.
    pub cost_multiplier: f64,
    /// Local-search iterations; `None` means N/10 (N/100 when updating).
    pub iterations: Option<usize>,
    /// Per-axis distance scaling, one entry per coordinate.
    pub coord_weights: Option<Vec<f64>>,
    /// Seed of the random stream; `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Evaluate gains over facility ranges in parallel.
    pub parallel: bool,
    /// Number of facility ranges; `None` means the rayon thread count.
    pub workers: Option<usize>,
    /// Let facility vertices take part in the reassignment scan.
    pub include_facility_vertices: bool,
}

impl Default for FacilityLocationConfig {
    fn default() -> Self {
        Self {
            cost_multiplier: 1.0,
            iterations: None,
            coord_weights: None,
            seed: Some(1234),
            parallel: true,
            workers: None,
            include_facility_vertices: true,
        }
    }
}

impl FacilityLocationConfig {
    pub fn with_cost_multiplier(mut self, multiplier: f64) -> Self {
        self.cost_multiplier = multiplier;
        self
    }

    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn with_coord_weights(mut self, weights: Vec<f64>) -> Self {
        self.coord_weights = Some(weights);
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    pub fn with_include_facility_vertices(mut self, include: bool) -> Self {
        self.include_facility_vertices = include;
        self
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if !(self.cost_multiplier.is_finite() && self.cost_multiplier >= 0.0) {
            return Err(ClusterError::Configuration(format!(
                "cost multiplier must be finite and non-negative, got {}",
                self.cost_multiplier
            )));
        }
        if self.workers == Some(0) {
            return Err(ClusterError::Configuration(
                "worker count must be at least 1".to_string(),
            ));
        }
        if let Some(w) = &self.coord_weights {
            if w.is_empty() {
                return Err(ClusterError::Configuration(
                    "coordinate weights must not be empty".to_string(),
                ));
            }
            if w.iter().any(|x| !(x.is_finite() && *x >= 0.0)) {
                return Err(ClusterError::Configuration(format!(
                    "coordinate weights must be finite and non-negative: {:?}",
                    w
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FacilityLocation {
    config: FacilityLocationConfig,
    vertices: Vec<Vertex>,
    /// Facility sitting on each vertex index, if any.
    slots: Vec<Option<Facility>>,
    /// Open facilities by vertex index, in opening order.
    open: Vec<usize>,
    bbox: BoundingBox,
    facility_cost: f64,
    rng: ChaCha8Rng,
}

impl FacilityLocation {
    pub fn new(config: FacilityLocationConfig) -> ClusterResult<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        Ok(Self {
            config,
            vertices: Vec::new(),
            slots: Vec::new(),
            open: Vec::new(),
            bbox: BoundingBox::default(),
            facility_cost: 0.0,
            rng,
        })
    }

    pub fn config(&self) -> &FacilityLocationConfig {
        &self.config
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.bbox
    }

    pub fn facility_cost(&self) -> f64 {
        self.facility_cost
    }

    /// Clusters `vertices`, replacing any previous solution.
    pub fn compute_clustering(&mut self, vertices: Vec<Vertex>) -> ClusterResult<()> {
        let bbox = BoundingBox::from_vertices(&vertices)?;
        self.compute_clustering_with_bbox(vertices, bbox)
    }

    /// Clusters `vertices` using a precomputed bounding box for the
    /// facility cost.
    pub fn compute_clustering_with_bbox(
        &mut self,
        vertices: Vec<Vertex>,
        bbox: BoundingBox,
    ) -> ClusterResult<()> {
        self.validate_input(&vertices)?;
        if bbox.is_initialized() && bbox.dimension() != vertices[0].dimension() {
            return Err(ClusterError::DimensionMismatch {
                expected: vertices[0].dimension(),
                got: bbox.dimension(),
            });
        }

        self.vertices = vertices;
        self.bbox = bbox;
        self.facility_cost = self
            .bbox
            .weighted_diagonal(self.config.coord_weights.as_deref())
            * self.config.cost_multiplier;
        info!(
            "Facility location over {} vertices (D={}), facility cost {:.6}",
            self.vertices.len(),
            self.bbox.dimension(),
            self.facility_cost
        );

        self.generate_initial_solution();
        debug!("Initial solution: {} facilities", self.open.len());
        if cfg!(debug_assertions) {
            self.check_assignments()?;
        }

        if self.facility_cost > 0.0 {
            let iterations = self.config.iterations.unwrap_or(self.vertices.len() / 10);
            self.perform_iterations(iterations)?;
        }
        debug!(
            "Clustering done: {} facilities, connection cost {:.6}",
            self.open.len(),
            self.cost_for_connections()
        );
        Ok(())
    }

    /// Replaces the vertex coordinates while keeping the facility structure,
    /// then runs a shorter improvement pass. The vertex count must not change.
    pub fn update_vertices(&mut self, vertices: Vec<Vertex>) -> ClusterResult<()> {
        if self.vertices.is_empty() {
            return self.compute_clustering(vertices);
        }
        if vertices.len() != self.vertices.len() {
            return Err(ClusterError::Configuration(format!(
                "update needs {} vertices, got {}",
                self.vertices.len(),
                vertices.len()
            )));
        }
        self.validate_input(&vertices)?;
        if vertices[0].dimension() != self.bbox.dimension() {
            return Err(ClusterError::DimensionMismatch {
                expected: self.bbox.dimension(),
                got: vertices[0].dimension(),
            });
        }

        self.bbox = BoundingBox::from_vertices(&vertices)?;
        self.vertices = vertices;

        let Self {
            config,
            vertices,
            slots,
            open,
            ..
        } = self;
        let weights = config.coord_weights.as_deref();
        for v in vertices.iter_mut() {
            v.clear_assignment();
        }
        for &f in open.iter() {
            let Some(facility) = slots[f].as_mut() else {
                continue;
            };
            facility.refresh_coords(&vertices[f]);
            for m in facility.take_members() {
                let d = coord_distance(vertices[m].coords(), vertices[f].coords(), weights);
                vertices[m].set_is_facility(m == f);
                vertices[m].assign(f, d);
                facility.add_member(m, d);
            }
        }

        self.facility_cost = self
            .bbox
            .weighted_diagonal(self.config.coord_weights.as_deref())
            * self.config.cost_multiplier;
        if self.facility_cost > 0.0 {
            let iterations = self.config.iterations.unwrap_or(self.vertices.len() / 100);
            self.perform_iterations(iterations)?;
        }
        debug!(
            "Update done: {} facilities, facility cost {:.6}",
            self.open.len(),
            self.facility_cost
        );
        Ok(())
    }

    fn validate_input(&self, vertices: &[Vertex]) -> ClusterResult<()> {
        let first = vertices
            .first()
            .ok_or_else(|| ClusterError::Configuration("no vertices to cluster".to_string()))?;
        let dim = first.dimension();
        if dim == 0 {
            return Err(ClusterError::Configuration(
                "vertices have no coordinates".to_string(),
            ));
        }
        if let Some(w) = &self.config.coord_weights {
            if w.len() != dim {
                return Err(ClusterError::Configuration(format!(
                    "{} coordinate weights for {}-dimensional vertices",
                    w.len(),
                    dim
                )));
            }
        }
        for v in vertices {
            if v.dimension() != dim {
                return Err(ClusterError::DimensionMismatch {
                    expected: dim,
                    got: v.dimension(),
                });
            }
            // NaN fails too
            if !(v.weight() > 0.0) {
                return Err(ClusterError::Configuration(format!(
                    "vertex weight must be positive, got {}",
                    v.weight()
                )));
            }
        }
        Ok(())
    }

    fn generate_initial_solution(&mut self) {
        let n = self.vertices.len();
        self.slots = vec![None; n];
        self.open.clear();
        for v in &mut self.vertices {
            v.clear_assignment();
        }

        // facilities are free
        if self.facility_cost <= 0.0 {
            for i in 0..n {
                self.open_facility(i);
            }
            return;
        }

        let order = self.insertion_order();
        self.open_facility(order[0]);
        for &i in &order[1..] {
            let (closest, dist) = self.closest_facility(i);
            // weighted cost: a vertex aggregating many points opens a facility
            // more readily; with unit weights this is dist / facility_cost
            let cost = self.vertices[i].connection_cost(dist);
            // forced vertices open even when they coincide with a facility
            if self.vertices[i].is_forced() || self.rng.random::<f64>() <= cost / self.facility_cost {
                self.open_facility(i);
            } else {
                self.attach(i, closest, dist);
            }
        }
    }

    /// Forced facilities first, everything else shuffled.
    fn insertion_order(&mut self) -> Vec<usize> {
        let (mut order, mut rest): (Vec<usize>, Vec<usize>) =
            (0..self.vertices.len()).partition(|&i| self.vertices[i].is_forced());
        rest.shuffle(&mut self.rng);
        order.extend(rest);
        order
    }

    fn open_facility(&mut self, index: usize) {
        let mut facility = Facility::new(index, &self.vertices[index]);
        facility.add_member(index, 0.0);
        self.vertices[index].set_is_facility(true);
        self.vertices[index].assign(index, 0.0);
        self.slots[index] = Some(facility);
        self.open.push(index);
    }

    fn attach(&mut self, index: usize, facility: usize, dist: f64) {
        self.vertices[index].set_is_facility(false);
        self.vertices[index].assign(facility, dist);
        if let Some(f) = self.slots[facility].as_mut() {
            f.add_member(index, dist);
        }
    }

    /// Nearest open facility and its distance.
    fn closest_facility(&self, index: usize) -> (usize, f64) {
        let weights = self.config.coord_weights.as_deref();
        let coords = self.vertices[index].coords();
        let mut best = (usize::MAX, f64::INFINITY);
        for &f in &self.open {
            let d = coord_distance(coords, self.vertices[f].coords(), weights);
            if d < best.1 {
                best = (f, d);
            }
        }
        best
    }

    fn perform_iterations(&mut self, iterations: usize) -> ClusterResult<()> {
        let n = self.vertices.len();
        let mut committed = 0usize;
        for _ in 0..iterations {
            let candidate = self.rng.random_range(0..n);
            let outcome = self.evaluate_gain(candidate);
            if outcome.gain > 0.0 {
                trace!("commit candidate {} with gain {:.6}", candidate, outcome.gain);
                self.commit(candidate, outcome);
                committed += 1;
                if cfg!(debug_assertions) {
                    self.check_assignments()?;
                }
            }
        }
        debug!(
            "{} iterations, {} moves committed, {} facilities open",
            iterations,
            committed,
            self.open.len()
        );
        Ok(())
    }

    fn worker_count(&self) -> usize {
        self.config.workers.unwrap_or_else(rayon::current_num_threads)
    }

    pub(crate) fn evaluate_gain(&mut self, candidate: usize) -> GainOutcome {
        if self.config.parallel {
            let ranges = split_ranges(self.open.len(), self.worker_count());
            self.gain_over_ranges(candidate, &ranges)
        } else {
            self.sequential_gain(candidate)
        }
    }

    fn gain_context(&self) -> GainContext<'_> {
        GainContext {
            vertices: &self.vertices,
            slots: &self.slots,
            open: &self.open,
            facility_cost: self.facility_cost,
            weights: self.config.coord_weights.as_deref(),
            include_facility_vertices: self.config.include_facility_vertices,
        }
    }

    /// Read-only gain evaluation over the given ranges of the open list.
    pub(crate) fn gain_over_ranges(&self, candidate: usize, ranges: &[Range<usize>]) -> GainOutcome {
        self.gain_context().parallel_gain(candidate, ranges)
    }

    /// Single pass over all vertices, accumulating closure costs on the
    /// facilities themselves.
    pub(crate) fn sequential_gain(&mut self, candidate: usize) -> GainOutcome {
        let Self {
            config,
            vertices,
            slots,
            open,
            facility_cost,
            ..
        } = self;
        let weights = config.coord_weights.as_deref();
        let cand = &vertices[candidate];

        let mut gain = if cand.is_facility() {
            0.0
        } else {
            -*facility_cost
        };
        let mut reassign = Vec::new();
        for (i, v) in vertices.iter().enumerate() {
            if !config.include_facility_vertices && v.is_facility() {
                continue;
            }
            let d = coord_distance(v.coords(), cand.coords(), weights);
            let dist_gain = v.cost_to_facility() - v.connection_cost(d);
            if dist_gain > 0.0 {
                reassign.push(i);
                gain += dist_gain;
            } else if let Some(f) = v.facility() {
                if let Some(facility) = slots[f].as_mut() {
                    facility.add_to_accumulator(dist_gain);
                }
            }
        }

        let mut close = Vec::new();
        for &f in open.iter() {
            let forced = vertices[f].is_forced();
            let Some(facility) = slots[f].as_mut() else {
                continue;
            };
            let saving = facility.accumulator() + *facility_cost;
            if saving > 0.0 && f != candidate && !forced {
                close.push(f);
                gain += saving;
            }
            facility.reset_accumulator();
        }

        GainOutcome {
            gain,
            reassign,
            close,
        }
    }

    /// Opens the candidate (if needed), moves the improving vertices to it
    /// and closes the marked facilities, their members joining the candidate.
    fn commit(&mut self, candidate: usize, outcome: GainOutcome) {
        let GainOutcome {
            mut reassign,
            close,
            ..
        } = outcome;

        if !self.vertices[candidate].is_facility() {
            if !reassign.contains(&candidate) {
                reassign.push(candidate);
            }
            self.vertices[candidate].set_is_facility(true);
            self.slots[candidate] = Some(Facility::new(candidate, &self.vertices[candidate]));
            self.open.push(candidate);
        }

        let Self {
            config,
            vertices,
            slots,
            open,
            ..
        } = self;
        let weights = config.coord_weights.as_deref();

        for index in reassign {
            if let Some(from) = vertices[index].facility() {
                if let Some(f) = slots[from].as_mut() {
                    f.remove_member(index, vertices);
                }
            }
            let d = coord_distance(vertices[index].coords(), vertices[candidate].coords(), weights);
            vertices[index].assign(candidate, d);
            if let Some(f) = slots[candidate].as_mut() {
                f.add_member(index, d);
            }
        }

        for f in close {
            let Some(mut closed) = slots[f].take() else {
                continue;
            };
            open.retain(|&o| o != f);
            vertices[f].set_is_facility(false);
            for index in closed.take_members() {
                let d = coord_distance(vertices[index].coords(), vertices[candidate].coords(), weights);
                vertices[index].assign(candidate, d);
                if let Some(target) = slots[candidate].as_mut() {
                    target.add_member(index, d);
                }
            }
        }
    }

    pub fn cluster_count(&self) -> usize {
        self.open.len()
    }

    /// Vertex indices of the open facilities, in opening order.
    pub fn facilities(&self) -> &[usize] {
        &self.open
    }

    /// Members of the cluster whose facility sits on `facility`.
    pub fn cluster_members(&self, facility: usize) -> Option<&[usize]> {
        self.slots
            .get(facility)
            .and_then(|s| s.as_ref())
            .map(|f| f.members())
    }

    /// Facility vertex index of the cluster containing `vertex`.
    pub fn cluster_of(&self, vertex: usize) -> Option<usize> {
        self.vertices.get(vertex).and_then(|v| v.facility())
    }

    /// Largest connection cost within each cluster, in opening order.
    pub fn cluster_radii(&self) -> Vec<f64> {
        self.open
            .iter()
            .filter_map(|&f| self.slots[f].as_ref())
            .map(|f| {
                f.members()
                    .iter()
                    .map(|&m| self.vertices[m].cost_to_facility())
                    .fold(0.0, f64::max)
            })
            .collect()
    }

    pub fn cost_for_facilities(&self) -> f64 {
        self.facility_cost * self.open.len() as f64
    }

    pub fn cost_for_connections(&self) -> f64 {
        self.vertices.iter().map(|v| v.cost_to_facility()).sum()
    }

    /// Average excess connection cost of the vertices not attached to their
    /// closest facility, and how many there are. `(0.0, 0)` when every vertex
    /// is attached to its closest facility.
    pub fn assignment_error(&self) -> (f64, usize) {
        let mut wrong = 0usize;
        let mut sum = 0.0;
        for (i, v) in self.vertices.iter().enumerate() {
            if v.is_facility() {
                continue;
            }
            let (closest, dist) = self.closest_facility(i);
            let cost = v.connection_cost(dist);
            if Some(closest) != v.facility() && cost < v.cost_to_facility() {
                wrong += 1;
                sum += v.cost_to_facility() - cost;
            }
        }
        if wrong == 0 {
            (0.0, 0)
        } else {
            (sum / wrong as f64, wrong)
        }
    }

    /// Checks that vertices and facilities agree about every assignment.
    pub fn check_assignments(&self) -> ClusterResult<()> {
        let mut assigned = 0usize;
        for &f in &self.open {
            let facility = self.slots[f].as_ref().ok_or_else(|| {
                ClusterError::Inconsistent(format!("open facility {} has no slot", f))
            })?;
            if !facility.members().contains(&f) {
                return Err(ClusterError::Inconsistent(format!(
                    "facility {} does not contain its own vertex",
                    f
                )));
            }
            for &m in facility.members() {
                if self.vertices[m].facility() != Some(f) {
                    return Err(ClusterError::Inconsistent(format!(
                        "vertex {} is listed by facility {} but assigned to {:?}",
                        m,
                        f,
                        self.vertices[m].facility()
                    )));
                }
            }
            assigned += facility.len();
        }
        for (i, v) in self.vertices.iter().enumerate() {
            if v.is_facility() != (v.facility() == Some(i)) {
                return Err(ClusterError::Inconsistent(format!(
                    "vertex {} facility flag disagrees with its assignment {:?}",
                    i,
                    v.facility()
                )));
            }
        }
        if assigned != self.vertices.len() {
            return Err(ClusterError::Inconsistent(format!(
                "{} memberships for {} vertices",
                assigned,
                self.vertices.len()
            )));
        }
        Ok(())
    }

    /// One record per open facility, in opening order.
    pub fn cluster_records(&self) -> Vec<ClusterRecord> {
        self.open
            .iter()
            .filter_map(|&f| self.slots[f].as_ref())
            .map(|f| ClusterRecord {
                facility: f.vertex(),
                members: f.members().to_vec(),
                centroid: f.coords().to_vec(),
            })
            .collect()
    }

    /// Sends every cluster to `sink`; returns the number of records.
    pub fn emit_clusters(&self, sink: &mut dyn ClusterSink) -> ClusterResult<usize> {
        let records = self.cluster_records();
        let count = records.len();
        for record in records {
            sink.accept(record)?;
        }
        Ok(count)
    }
}
