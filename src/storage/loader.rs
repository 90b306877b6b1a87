//! Reading a finished hierarchy back.
//!
//! The top level is the entry point; any centre above level 0 expands into
//! its members by seeking into the file of the level below.

use std::path::{Path, PathBuf};

use log::debug;

use crate::centre::Centre;
use crate::error::{ClusterError, ClusterResult};
use crate::storage::{RunMetadata, level_path, metadata_path, read_children, read_level};

#[derive(Clone, Debug)]
pub struct ClusterLoader {
    output: PathBuf,
    metadata: RunMetadata,
}

impl ClusterLoader {
    /// Opens the run that wrote to `output`, reading its metadata file.
    pub fn open(output: impl AsRef<Path>) -> ClusterResult<Self> {
        let output = output.as_ref().to_path_buf();
        let metadata = RunMetadata::load(metadata_path(&output))?;
        if metadata.levels.is_empty() {
            return Err(ClusterError::CorruptLevelFile(
                "run metadata lists no levels".to_string(),
            ));
        }
        debug!(
            "Opened run {} with {} levels",
            output.display(),
            metadata.level_count()
        );
        Ok(Self { output, metadata })
    }

    pub fn metadata(&self) -> &RunMetadata {
        &self.metadata
    }

    pub fn level_count(&self) -> usize {
        self.metadata.level_count()
    }

    pub fn top_level(&self) -> usize {
        self.level_count() - 1
    }

    fn check_level(&self, level: usize) -> ClusterResult<()> {
        if level < self.level_count() {
            Ok(())
        } else {
            Err(ClusterError::Configuration(format!(
                "level {} does not exist, the run has {}",
                level,
                self.level_count()
            )))
        }
    }

    /// Every record of `level`, in file order.
    pub fn load_level(&self, level: usize) -> ClusterResult<Vec<Centre>> {
        self.check_level(level)?;
        read_level(
            level_path(&self.output, level),
            self.metadata.format(),
            level > 0,
        )
    }

    pub fn load_top(&self) -> ClusterResult<Vec<Centre>> {
        self.load_level(self.top_level())
    }

    /// Members of `centre`, a record of `level`, read from the level below.
    /// Level-0 records have no members.
    pub fn expand(&self, centre: &Centre, level: usize) -> ClusterResult<Vec<Centre>> {
        self.check_level(level)?;
        if level == 0 || !centre.has_children() {
            return Ok(Vec::new());
        }
        let below = level - 1;
        read_children(
            level_path(&self.output, below),
            self.metadata.format(),
            below > 0,
            centre.children_file_start,
            centre.children_count as usize,
        )
    }
}
