//! Streaming hierarchical clustering.
//!
//! Points enter level 0. Whenever a level's buffer is full it is clustered,
//! each cluster's members are written to the level file and one centre per
//! cluster moves up to the next level, creating it on demand. Every written
//! member block is addressable from the centre that stands for it, so the
//! files form a tree that can be walked down from the top level.
//!
//! On [`HierarchicalClusterer::finish`] the partially filled levels below the
//! highest are processed as well; the highest level is written as it is.

use std::path::PathBuf;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::centre::Centre;
use crate::error::{ClusterError, ClusterResult};
use crate::facility_location::FacilityLocationConfig;
use crate::level::{ClusteringLevel, LevelSummary};
use crate::storage::{LevelFormat, RunMetadata, level_path, metadata_path};
use crate::stream::PointSource;
use crate::vertex::Vertex;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    /// Capacity of every level buffer.
    pub block_size: usize,
    /// Facility cost multiplier used on every level; overrides the one in
    /// `clustering`.
    pub cost_multiplier: f64,
    /// Base path of the level files; `None` keeps everything in memory.
    pub output: Option<PathBuf>,
    pub format: LevelFormat,
    pub clustering: FacilityLocationConfig,
    /// Number of levels after which the run is aborted.
    pub max_levels: usize,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            block_size: 1000,
            cost_multiplier: 1.0,
            output: None,
            format: LevelFormat::Raw,
            clustering: FacilityLocationConfig::default(),
            max_levels: 64,
        }
    }
}

impl HierarchyConfig {
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_cost_multiplier(mut self, multiplier: f64) -> Self {
        self.cost_multiplier = multiplier;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_format(mut self, format: LevelFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_clustering(mut self, clustering: FacilityLocationConfig) -> Self {
        self.clustering = clustering;
        self
    }

    pub fn with_max_levels(mut self, max_levels: usize) -> Self {
        self.max_levels = max_levels;
        self
    }

    pub fn validate(&self) -> ClusterResult<()> {
        if self.block_size < 2 {
            return Err(ClusterError::Configuration(format!(
                "block size must be at least 2, got {}",
                self.block_size
            )));
        }
        // a free facility promotes every point of a block unchanged
        if !(self.cost_multiplier.is_finite() && self.cost_multiplier > 0.0) {
            return Err(ClusterError::Configuration(format!(
                "cost multiplier must be positive and finite, got {}",
                self.cost_multiplier
            )));
        }
        if self.max_levels == 0 {
            return Err(ClusterError::Configuration(
                "at least one level is required".to_string(),
            ));
        }
        self.format.validate()?;
        self.level_clustering(0).validate()
    }

    /// Clustering parameters of `level`. Seeded runs use a distinct stream
    /// per level.
    pub fn level_clustering(&self, level: usize) -> FacilityLocationConfig {
        let mut config = self.clustering.clone();
        config.cost_multiplier = self.cost_multiplier;
        config.seed = config.seed.map(|s| s.wrapping_add(level as u64));
        config
    }
}

/// What a finished run produced.
#[derive(Clone, Debug)]
pub struct HierarchySummary {
    pub levels: Vec<LevelSummary>,
    /// Records of the highest level, carrying the aggregated mass.
    pub top: Vec<Centre>,
    pub total_points: usize,
    pub dimension: Option<usize>,
}

#[derive(Debug)]
pub struct HierarchicalClusterer {
    config: HierarchyConfig,
    levels: Vec<ClusteringLevel>,
    dimension: Option<usize>,
    total_points: usize,
    finished: bool,
}

impl HierarchicalClusterer {
    pub fn new(config: HierarchyConfig) -> ClusterResult<Self> {
        config.validate()?;
        if let Some(output) = &config.output {
            info!("Hierarchical clustering writing to {}", output.display());
        }
        Ok(Self {
            config,
            levels: Vec::new(),
            dimension: None,
            total_points: 0,
            finished: false,
        })
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[ClusteringLevel] {
        &self.levels
    }

    pub fn total_points(&self) -> usize {
        self.total_points
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Pushes unit-weight points.
    pub fn push_points(&mut self, points: Vec<Vec<f64>>) -> ClusterResult<()> {
        self.push_vertices(points.into_iter().map(Vertex::new).collect())
    }

    /// Pushes weighted points; the weight is the mass each point carries.
    pub fn push_vertices(&mut self, vertices: Vec<Vertex>) -> ClusterResult<()> {
        if self.finished {
            return Err(ClusterError::StreamFinished);
        }
        self.check_batch(&vertices)?;
        let n = vertices.len();
        self.push_to_level(0, vertices.into_iter().map(Centre::new).collect())?;
        self.total_points += n;
        Ok(())
    }

    /// Drains `source`; returns the number of points pushed.
    pub fn push_source<S: PointSource + ?Sized>(&mut self, source: &mut S) -> ClusterResult<usize> {
        let mut pushed = 0;
        while let Some(batch) = source.next_batch()? {
            pushed += batch.len();
            self.push_points(batch)?;
        }
        Ok(pushed)
    }

    /// Validates a whole batch; the run's dimension is recorded only once
    /// every vertex of the batch is accepted.
    fn check_batch(&mut self, vertices: &[Vertex]) -> ClusterResult<()> {
        let Some(first) = vertices.first() else {
            return Ok(());
        };
        let dim = match self.dimension {
            Some(d) => d,
            None => {
                let dim = first.dimension();
                if dim == 0 || dim > usize::from(u16::MAX) {
                    return Err(ClusterError::Configuration(format!(
                        "points must have between 1 and {} coordinates, got {}",
                        u16::MAX,
                        dim
                    )));
                }
                if let Some(w) = &self.config.clustering.coord_weights {
                    if w.len() != dim {
                        return Err(ClusterError::Configuration(format!(
                            "{} coordinate weights for {}-dimensional points",
                            w.len(),
                            dim
                        )));
                    }
                }
                dim
            }
        };
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
                    "point weight must be positive, got {}",
                    v.weight()
                )));
            }
        }
        self.dimension = Some(dim);
        Ok(())
    }

    /// Splits `centres` over the free space of `level`, processing the level
    /// each time it fills up.
    fn push_to_level(&mut self, level: usize, mut centres: Vec<Centre>) -> ClusterResult<()> {
        while !centres.is_empty() {
            if level == self.levels.len() {
                self.add_level()?;
            }
            let free = self.levels[level].free_space();
            let rest = if centres.len() > free {
                centres.split_off(free)
            } else {
                Vec::new()
            };
            self.levels[level].push(centres)?;
            if self.levels[level].free_space() == 0 {
                self.process_level(level)?;
            }
            centres = rest;
        }
        Ok(())
    }

    fn process_level(&mut self, level: usize) -> ClusterResult<()> {
        let promoted = self.levels[level].process()?;
        debug!(
            "Level {} promoted {} centres to level {}",
            level,
            promoted.len(),
            level + 1
        );
        self.push_to_level(level + 1, promoted)
    }

    fn add_level(&mut self) -> ClusterResult<()> {
        let level = self.levels.len();
        if level >= self.config.max_levels {
            return Err(ClusterError::LevelLimit {
                limit: self.config.max_levels,
            });
        }
        let output = self
            .config
            .output
            .as_ref()
            .map(|o| (level_path(o, level), self.config.format));
        self.levels.push(ClusteringLevel::new(
            level,
            self.config.block_size,
            self.config.level_clustering(level),
            output,
        )?);
        info!("Created level {}", level);
        Ok(())
    }

    /// Flushes every level, closes the files and writes the run metadata.
    /// Further pushes fail with [`ClusterError::StreamFinished`].
    pub fn finish(&mut self) -> ClusterResult<HierarchySummary> {
        if self.finished {
            return Err(ClusterError::StreamFinished);
        }

        // processing can add levels, so the bound is re-read every time
        let mut level = 0;
        while level + 1 < self.levels.len() {
            if !self.levels[level].is_empty() {
                self.process_level(level)?;
            }
            level += 1;
        }

        let top = match self.levels.last_mut() {
            Some(top) => {
                top.persist_unordered()?;
                top.buffered().to_vec()
            }
            None => Vec::new(),
        };
        for l in &mut self.levels {
            l.finish()?;
        }
        self.finished = true;

        let levels: Vec<LevelSummary> = self.levels.iter().map(|l| l.summary()).collect();
        if let Some(output) = &self.config.output {
            RunMetadata::new(
                self.config.clone(),
                self.dimension,
                self.total_points,
                levels.clone(),
            )
            .save(metadata_path(output))?;
        }
        info!(
            "Finished: {} points in {} levels, {} top records",
            self.total_points,
            levels.len(),
            top.len()
        );

        Ok(HierarchySummary {
            levels,
            top,
            total_points: self.total_points,
            dimension: self.dimension,
        })
    }
}
