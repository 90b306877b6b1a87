//! Streaming hierarchical clustering of point clouds.
//!
//! - [`facility_location`]: randomized facility-location clustering of one
//!   block of weighted vertices, with a local-search improvement pass whose
//!   gain evaluation fans out over rayon
//! - [`level`] and [`hierarchy`]: fixed-size level buffers that cluster when
//!   full and promote one centre per cluster to the level above
//! - [`storage`]: level files (raw records or arithmetic-coded blocks from
//!   `flstream-codec`), run metadata and a loader that walks the tree back
//!   down from the top level
//!
//! ```no_run
//! use flstream::{HierarchicalClusterer, HierarchyConfig};
//!
//! # fn main() -> flstream::ClusterResult<()> {
//! let config = HierarchyConfig::default()
//!     .with_block_size(1000)
//!     .with_output("out/cloud.bin");
//! let mut clusterer = HierarchicalClusterer::new(config)?;
//! clusterer.push_points(vec![vec![0.0, 1.0, 2.0], vec![1.0, 1.0, 0.5]])?;
//! let summary = clusterer.finish()?;
//! println!("{} levels", summary.levels.len());
//! # Ok(())
//! # }
//! ```

pub mod bbox;
pub mod centre;
pub mod error;
pub mod facility;
pub mod facility_location;
pub mod gain;
pub mod hierarchy;
pub mod level;
pub mod storage;
pub mod stream;
pub mod vertex;

#[cfg(test)]
mod tests;

pub use bbox::BoundingBox;
pub use centre::Centre;
pub use error::{ClusterError, ClusterResult};
pub use facility::Facility;
pub use facility_location::{FacilityLocation, FacilityLocationConfig};
pub use gain::{GainOutcome, split_ranges};
pub use hierarchy::{HierarchicalClusterer, HierarchyConfig, HierarchySummary};
pub use level::{ClusteringLevel, LevelSummary};
pub use storage::{ClusterLoader, LevelFormat, LevelWriter, RunMetadata};
pub use stream::{ClusterRecord, ClusterSink, JsonLinesSink, PointSource};
pub use vertex::Vertex;

pub use flstream_codec::{ArithCoder, ArithCoderConfig};
