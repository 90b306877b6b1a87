//! One level of the hierarchy: a fixed-capacity buffer of centres, the
//! clusterer run over it when full, and the level's output file.
//!
//! Clustering sees a copy of the buffer whose weights are rescaled to an
//! average of 1, which keeps the facility cost comparable across levels.
//! The centres promoted upwards carry the sum of the un-normalised weights of
//! their members, so the total mass entering level 0 reaches the top intact.

use std::collections::HashMap;
use std::path::PathBuf;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::centre::Centre;
use crate::error::{ClusterError, ClusterResult};
use crate::facility_location::{FacilityLocation, FacilityLocationConfig};
use crate::storage::{LevelFormat, LevelWriter};
use crate::vertex::Vertex;

/// Bookkeeping of one level, recorded in the run metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelSummary {
    pub level: usize,
    /// Records written to the level file (or that would have been).
    pub records: usize,
    /// Clustering passes run on this level.
    pub blocks: usize,
    pub path: Option<PathBuf>,
}

#[derive(Debug)]
pub struct ClusteringLevel {
    level: usize,
    block_size: usize,
    buffer: Vec<Centre>,
    clusterer: FacilityLocation,
    writer: Option<LevelWriter>,
    path: Option<PathBuf>,
    finished: bool,
    blocks: usize,
    records: usize,
}

impl ClusteringLevel {
    /// Creates the level; with `output` set its file is created right away.
    pub fn new(
        level: usize,
        block_size: usize,
        clustering: FacilityLocationConfig,
        output: Option<(PathBuf, LevelFormat)>,
    ) -> ClusterResult<Self> {
        if block_size == 0 {
            return Err(ClusterError::Configuration(
                "block size must be positive".to_string(),
            ));
        }
        let (writer, path) = match output {
            Some((path, format)) => (
                Some(LevelWriter::create(&path, format, level > 0)?),
                Some(path),
            ),
            None => (None, None),
        };
        Ok(Self {
            level,
            block_size,
            buffer: Vec::with_capacity(block_size),
            clusterer: FacilityLocation::new(clustering)?,
            writer,
            path,
            finished: false,
            blocks: 0,
            records: 0,
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn free_space(&self) -> usize {
        self.block_size - self.buffer.len()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Centres currently held in the buffer.
    pub fn buffered(&self) -> &[Centre] {
        &self.buffer
    }

    /// Clusterer holding the last block's solution.
    pub fn clusterer(&self) -> &FacilityLocation {
        &self.clusterer
    }

    /// Appends `centres`; they must fit the free space.
    pub fn push(&mut self, centres: Vec<Centre>) -> ClusterResult<()> {
        if self.finished {
            return Err(ClusterError::StreamFinished);
        }
        if centres.len() > self.free_space() {
            return Err(ClusterError::CapacityExceeded {
                requested: centres.len(),
                free: self.free_space(),
            });
        }
        self.buffer.extend(centres);
        Ok(())
    }

    /// Clusters the buffered centres on normalised weights.
    pub fn cluster(&mut self) -> ClusterResult<()> {
        let n = self.buffer.len();
        let finite: f64 = self
            .buffer
            .iter()
            .map(|c| c.vertex.weight())
            .filter(|w| w.is_finite())
            .sum();
        let scale = if finite > 0.0 { n as f64 / finite } else { 1.0 };

        let vertices: Vec<Vertex> = self
            .buffer
            .iter()
            .map(|c| Vertex::new(c.vertex.coords().to_vec()).with_weight(c.vertex.weight() * scale))
            .collect();
        self.clusterer.compute_clustering(vertices)
    }

    /// Member lists of the current solution, one per open facility, keyed by
    /// the facility's buffer index.
    fn clusters(&self) -> ClusterResult<Vec<(usize, Vec<usize>)>> {
        self.clusterer
            .facilities()
            .iter()
            .map(|&f| {
                let members = self.clusterer.cluster_members(f).ok_or_else(|| {
                    ClusterError::Inconsistent(format!("open facility {} has no members", f))
                })?;
                Ok((f, members.to_vec()))
            })
            .collect()
    }

    /// Writes the members of every cluster and returns one centre per
    /// cluster, pointing back at where its members were written.
    ///
    /// A solution with one cluster per point (a block of coincident points
    /// has no facility cost) is replaced by one cluster per distinct
    /// position, so repeated readings collapse instead of being promoted
    /// unchanged.
    pub fn persist(&mut self) -> ClusterResult<Vec<Centre>> {
        let mut clusters = self.clusters()?;
        if clusters.len() == self.buffer.len() && self.buffer.len() > 1 {
            let merged = coincident_groups(&self.buffer);
            if merged.len() < clusters.len() {
                debug!(
                    "Level {}: merged {} points into {} distinct positions",
                    self.level,
                    self.buffer.len(),
                    merged.len()
                );
                clusters = merged;
            }
        }

        let mut promoted = Vec::with_capacity(clusters.len());
        for (f, members) in &clusters {
            let records: Vec<&Centre> = members.iter().map(|&m| &self.buffer[m]).collect();
            let start = match self.writer.as_mut() {
                Some(w) => w.write_block(&records)?,
                None => -1,
            };

            let mass: f64 = records.iter().map(|c| c.vertex.weight()).sum();
            let count = i32::try_from(members.len()).map_err(|_| {
                ClusterError::Configuration(format!("cluster of {} members", members.len()))
            })?;
            let coords = self.buffer[*f].vertex.coords().to_vec();
            let mut centre = Centre::new(Vertex::new(coords).with_weight(mass));
            centre.children_file_start = start;
            centre.children_count = count;
            promoted.push(centre);
        }

        self.blocks += 1;
        self.records += self.buffer.len();
        debug!(
            "Level {}: {} points -> {} centres",
            self.level,
            self.buffer.len(),
            promoted.len()
        );
        Ok(promoted)
    }

    /// Clusters, persists and empties the buffer; returns the promoted centres.
    pub fn process(&mut self) -> ClusterResult<Vec<Centre>> {
        self.cluster()?;
        let promoted = self.persist()?;
        self.reset();
        Ok(promoted)
    }

    /// Writes the buffer as it is, without clustering. The buffer is kept.
    pub fn persist_unordered(&mut self) -> ClusterResult<()> {
        if let Some(w) = self.writer.as_mut() {
            let records: Vec<&Centre> = self.buffer.iter().collect();
            w.write_block(&records)?;
        }
        self.records += self.buffer.len();
        info!(
            "Level {} written unordered with {} records",
            self.level,
            self.buffer.len()
        );
        Ok(())
    }

    /// Discards the buffered centres.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Closes the level; further pushes fail.
    pub fn finish(&mut self) -> ClusterResult<()> {
        self.finished = true;
        if let Some(w) = self.writer.take() {
            w.finish()?;
        }
        Ok(())
    }

    pub fn summary(&self) -> LevelSummary {
        LevelSummary {
            level: self.level,
            records: self.records,
            blocks: self.blocks,
            path: self.path.clone(),
        }
    }
}

/// Groups `centres` by exact position, in order of first appearance. The
/// first centre of each group stands for it.
fn coincident_groups(centres: &[Centre]) -> Vec<(usize, Vec<usize>)> {
    let mut index: HashMap<Vec<u64>, usize> = HashMap::new();
    let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
    for (i, c) in centres.iter().enumerate() {
        // -0.0 and 0.0 are the same position
        let key: Vec<u64> = c
            .vertex
            .coords()
            .iter()
            .map(|&x| if x == 0.0 { 0 } else { x.to_bits() })
            .collect();
        match index.get(&key) {
            Some(&g) => groups[g].1.push(i),
            None => {
                index.insert(key, groups.len());
                groups.push((i, vec![i]));
            }
        }
    }
    groups
}
