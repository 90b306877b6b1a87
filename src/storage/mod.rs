//! Level files and run metadata.
//!
//! A run with output path `dir/<stem>.<ext>` writes one file per hierarchy
//! level, `dir/<stem>_<level>.<ext>`, and `dir/<stem>_metadata.json` once the
//! stream is finished.

pub mod level_file;
pub mod loader;
pub mod metadata;

use std::path::{Path, PathBuf};

pub use level_file::{LevelFormat, LevelWriter, read_children, read_level};
pub use loader::ClusterLoader;
pub use metadata::RunMetadata;

/// File of hierarchy `level` for the run writing to `output`.
pub fn level_path(output: &Path, level: usize) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match output.extension() {
        Some(ext) => format!("{}_{}.{}", stem, level, ext.to_string_lossy()),
        None => format!("{}_{}", stem, level),
    };
    output.with_file_name(name)
}

/// Metadata file of the run writing to `output`.
pub fn metadata_path(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!("{}_metadata.json", stem))
}
