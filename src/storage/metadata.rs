use std::fs;
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::ClusterResult;
use crate::hierarchy::HierarchyConfig;
use crate::level::LevelSummary;
use crate::storage::LevelFormat;

/// Description of a finished run, stored next to the level files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub timestamp: String,
    pub config: HierarchyConfig,
    /// Coordinate count; `None` when no point was pushed.
    pub dimension: Option<usize>,
    pub total_points: usize,
    pub levels: Vec<LevelSummary>,
}

impl RunMetadata {
    pub fn new(
        config: HierarchyConfig,
        dimension: Option<usize>,
        total_points: usize,
        levels: Vec<LevelSummary>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            config,
            dimension,
            total_points,
            levels,
        }
    }

    pub fn format(&self) -> LevelFormat {
        self.config.format
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    pub fn save(&self, path: impl AsRef<Path>) -> ClusterResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!("Saved run metadata to {}", path.as_ref().display());
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> ClusterResult<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&json)?)
    }
}
