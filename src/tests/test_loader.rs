use std::fs::OpenOptions;
use std::path::Path;

use tempfile::TempDir;

use crate::centre::Centre;
use crate::error::ClusterError;
use crate::hierarchy::{HierarchicalClusterer, HierarchyConfig};
use crate::storage::{ClusterLoader, LevelFormat, RunMetadata, level_path, metadata_path, read_level};
use crate::tests::init;
use crate::tests::test_data::uniform_points;

fn write_run(output: &Path, format: LevelFormat, n: usize) -> usize {
    let config = HierarchyConfig::default()
        .with_block_size(250)
        .with_format(format)
        .with_output(output);
    let mut clusterer = HierarchicalClusterer::new(config).unwrap();
    clusterer.push_points(uniform_points(n, 2, 77)).unwrap();
    clusterer.finish().unwrap().levels.len()
}

/// Walks from `centre` down to level 0, counting the raw points reached.
fn count_leaves(loader: &ClusterLoader, centre: &Centre, level: usize) -> usize {
    if level == 0 {
        return 1;
    }
    let children = loader.expand(centre, level).unwrap();
    assert_eq!(children.len(), centre.children_count as usize);
    children
        .iter()
        .map(|c| count_leaves(loader, c, level - 1))
        .sum()
}

fn check_round_trip(format: LevelFormat) {
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("run.bin");
    let levels = write_run(&output, format, 2000);

    let loader = ClusterLoader::open(&output).unwrap();
    assert_eq!(loader.level_count(), levels);
    assert_eq!(loader.metadata().total_points, 2000);
    assert_eq!(loader.metadata().dimension, Some(2));

    let top = loader.load_top().unwrap();
    assert_eq!(top.len(), loader.metadata().levels[levels - 1].records);
    let leaves: usize = top
        .iter()
        .map(|c| count_leaves(&loader, c, loader.top_level()))
        .sum();
    assert_eq!(leaves, 2000);
    // masses are not stored
    assert!(top.iter().all(|c| c.vertex.weight() == 1.0));
}

#[test]
fn test_raw_tree_round_trip() {
    init();
    check_round_trip(LevelFormat::Raw);
}

#[test]
fn test_compressed_tree_round_trip() {
    init();
    check_round_trip(LevelFormat::compressed(1e-4));
}

#[test]
fn test_raw_centre_is_one_of_its_children() {
    init();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("run.bin");
    let levels = write_run(&output, LevelFormat::Raw, 1000);
    assert!(levels >= 2);

    let loader = ClusterLoader::open(&output).unwrap();
    for centre in loader.load_level(1).unwrap() {
        let children = loader.expand(&centre, 1).unwrap();
        assert!(
            children
                .iter()
                .any(|c| c.vertex.coords() == centre.vertex.coords())
        );
    }
}

#[test]
fn test_level_zero_has_no_children() {
    init();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("run.bin");
    write_run(&output, LevelFormat::Raw, 600);

    let loader = ClusterLoader::open(&output).unwrap();
    let raw = loader.load_level(0).unwrap();
    assert_eq!(raw.len(), 600);
    assert!(loader.expand(&raw[0], 0).unwrap().is_empty());
    assert!(matches!(
        loader.load_level(loader.level_count()),
        Err(ClusterError::Configuration(_))
    ));
}

#[test]
fn test_metadata_round_trip() {
    init();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("run.bin");
    write_run(&output, LevelFormat::Raw, 700);

    let meta = RunMetadata::load(metadata_path(&output)).unwrap();
    assert_eq!(meta.format(), LevelFormat::Raw);
    assert_eq!(meta.config.block_size, 250);
    assert_eq!(meta.levels[0].records, 700);
    assert!(chrono::DateTime::parse_from_rfc3339(&meta.timestamp).is_ok());

    let copy = dir.path().join("copy.json");
    meta.save(&copy).unwrap();
    assert_eq!(RunMetadata::load(&copy).unwrap().levels, meta.levels);
}

#[test]
fn test_missing_metadata() {
    init();
    let dir = TempDir::new().unwrap();
    assert!(matches!(
        ClusterLoader::open(dir.path().join("nothing.bin")),
        Err(ClusterError::Io(_))
    ));
}

#[test]
fn test_truncated_level_file_is_reported() {
    init();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("run.bin");
    write_run(&output, LevelFormat::Raw, 300);

    let path = level_path(&output, 0);
    let len = std::fs::metadata(&path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(len - 3)
        .unwrap();
    assert!(matches!(
        read_level(&path, LevelFormat::Raw, false),
        Err(ClusterError::CorruptLevelFile(_))
    ));
}
