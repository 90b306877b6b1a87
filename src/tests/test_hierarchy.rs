use std::path::Path;

use approx::assert_relative_eq;
use log::info;
use tempfile::TempDir;

use crate::centre::Centre;
use crate::error::ClusterError;
use crate::facility_location::FacilityLocationConfig;
use crate::hierarchy::{HierarchicalClusterer, HierarchyConfig, HierarchySummary};
use crate::level::ClusteringLevel;
use crate::storage::{LevelFormat, level_path, metadata_path, read_level};
use crate::tests::init;
use crate::tests::test_data::uniform_points;
use crate::vertex::Vertex;

fn run(config: HierarchyConfig, points: Vec<Vec<f64>>) -> HierarchySummary {
    let mut clusterer = HierarchicalClusterer::new(config).unwrap();
    clusterer.push_points(points).unwrap();
    clusterer.finish().unwrap()
}

/// Checks that every record of a level is referenced exactly once from the
/// level above and returns the record count per level.
fn check_level_files(output: &Path, format: LevelFormat, levels: usize) -> Vec<usize> {
    let files: Vec<Vec<Centre>> = (0..levels)
        .map(|l| read_level(level_path(output, l), format, l > 0).unwrap())
        .collect();
    for l in 1..levels {
        let children: i64 = files[l].iter().map(|c| c.children_count as i64).sum();
        assert_eq!(
            children as usize,
            files[l - 1].len(),
            "level {} does not reference every record of level {}",
            l,
            l - 1
        );
        for c in &files[l] {
            assert!(c.children_count > 0, "centre without children on level {}", l);
            assert!(c.children_file_start >= 2);
        }
    }
    files.iter().map(|f| f.len()).collect()
}

#[test]
fn test_ten_thousand_points_end_to_end() {
    init();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("cloud.bin");
    let config = HierarchyConfig::default()
        .with_block_size(1000)
        .with_cost_multiplier(1.0)
        .with_output(&output);

    let summary = run(config, uniform_points(10_000, 3, 7));
    info!("{} levels: {:?}", summary.levels.len(), summary.levels);

    assert!(summary.levels.len() >= 2);
    assert_eq!(summary.total_points, 10_000);
    assert_eq!(summary.dimension, Some(3));

    let counts = check_level_files(&output, LevelFormat::Raw, summary.levels.len());
    assert_eq!(counts[0], 10_000);
    for (l, s) in summary.levels.iter().enumerate() {
        assert_eq!(s.records, counts[l]);
        assert_eq!(s.path.as_deref(), Some(level_path(&output, l).as_path()));
    }
    assert_eq!(*counts.last().unwrap(), summary.top.len());

    let mass: f64 = summary.top.iter().map(|c| c.vertex.weight()).sum();
    assert_relative_eq!(mass, 10_000.0, max_relative = 1e-9);
    assert!(metadata_path(&output).exists());
}

#[test]
fn test_compressed_level_files() {
    init();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("cloud.flc");
    let q = 1e-3;
    let config = HierarchyConfig::default()
        .with_block_size(500)
        .with_format(LevelFormat::compressed(q))
        .with_output(&output);

    let summary = run(config, uniform_points(3000, 3, 12));
    let counts = check_level_files(&output, LevelFormat::compressed(q), summary.levels.len());
    assert_eq!(counts[0], 3000);

    let raw = read_level(level_path(&output, 0), LevelFormat::compressed(q), false).unwrap();
    for c in &raw {
        assert!(
            c.vertex
                .coords()
                .iter()
                .all(|x| *x >= -q && *x <= 1.0 + q)
        );
    }

    // compressed blocks are smaller than raw records
    let size = std::fs::metadata(level_path(&output, 0)).unwrap().len();
    assert!(size < 3000 * 3 * 8, "{} bytes", size);
}

#[test]
fn test_in_memory_run_conserves_mass() {
    init();
    let config = HierarchyConfig::default().with_block_size(200);
    let mut clusterer = HierarchicalClusterer::new(config).unwrap();
    let vertices: Vec<Vertex> = uniform_points(1500, 2, 4)
        .into_iter()
        .map(|p| Vertex::new(p).with_weight(2.0))
        .collect();
    clusterer.push_vertices(vertices).unwrap();
    let summary = clusterer.finish().unwrap();

    let mass: f64 = summary.top.iter().map(|c| c.vertex.weight()).sum();
    assert_relative_eq!(mass, 3000.0, max_relative = 1e-9);
    assert_eq!(summary.levels[0].records, 1500);
    assert!(summary.levels.iter().all(|l| l.path.is_none()));
    assert!(summary.top.iter().all(|c| c.children_file_start == -1));
    for pair in summary.levels.windows(2) {
        assert!(pair[1].records <= pair[0].records);
    }
}

#[test]
fn test_small_input_stays_on_level_zero() {
    init();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("small.bin");
    let config = HierarchyConfig::default().with_output(&output);

    let summary = run(config, uniform_points(10, 2, 1));
    assert_eq!(summary.levels.len(), 1);
    assert_eq!(summary.top.len(), 10);
    assert_eq!(summary.levels[0].blocks, 0);
    assert_eq!(
        read_level(level_path(&output, 0), LevelFormat::Raw, false)
            .unwrap()
            .len(),
        10
    );
}

#[test]
fn test_batches_split_across_levels() {
    init();
    let config = HierarchyConfig::default().with_block_size(100);
    let mut clusterer = HierarchicalClusterer::new(config).unwrap();
    let points = uniform_points(1234, 2, 9);
    let mut batches = points.chunks(97).map(|c| c.to_vec());
    let pushed = clusterer.push_source(&mut batches).unwrap();
    assert_eq!(pushed, 1234);
    assert_eq!(clusterer.total_points(), 1234);
    // 1234 = 12 full blocks + 34 buffered
    assert_eq!(clusterer.levels()[0].len(), 34);

    let summary = clusterer.finish().unwrap();
    assert_eq!(summary.levels[0].records, 1234);
    assert_eq!(summary.levels[0].blocks, 13);
}

#[test]
fn test_push_after_finish_fails() {
    init();
    let mut clusterer = HierarchicalClusterer::new(HierarchyConfig::default()).unwrap();
    clusterer.push_points(uniform_points(5, 2, 3)).unwrap();
    clusterer.finish().unwrap();

    assert!(matches!(
        clusterer.push_points(uniform_points(1, 2, 3)),
        Err(ClusterError::StreamFinished)
    ));
    assert!(matches!(clusterer.finish(), Err(ClusterError::StreamFinished)));
}

#[test]
fn test_level_capacity() {
    init();
    let mut level = ClusteringLevel::new(0, 4, FacilityLocationConfig::default(), None).unwrap();
    let centres = |n: usize| -> Vec<Centre> {
        (0..n)
            .map(|i| Centre::new(Vertex::new(vec![i as f64, 0.0])))
            .collect()
    };
    level.push(centres(3)).unwrap();
    assert_eq!(level.free_space(), 1);
    assert!(matches!(
        level.push(centres(2)),
        Err(ClusterError::CapacityExceeded {
            requested: 2,
            free: 1
        })
    ));
    level.push(centres(1)).unwrap();

    let promoted = level.process().unwrap();
    assert!(level.is_empty());
    let members: i32 = promoted.iter().map(|c| c.children_count).sum();
    assert_eq!(members, 4);
    assert!(promoted.iter().all(|c| c.children_file_start == -1));

    level.finish().unwrap();
    assert!(matches!(
        level.push(centres(1)),
        Err(ClusterError::StreamFinished)
    ));
}

#[test]
fn test_repeated_readings_collapse_and_stream_continues() {
    init();
    let dir = TempDir::new().unwrap();
    let output = dir.path().join("stuck.bin");
    let config = HierarchyConfig::default()
        .with_block_size(10)
        .with_output(&output);
    let mut clusterer = HierarchicalClusterer::new(config).unwrap();

    // one full block of a sensor stuck at the same reading
    clusterer.push_points(vec![vec![5.0, 5.0]; 10]).unwrap();
    assert_eq!(clusterer.level_count(), 2);
    let lifted = clusterer.levels()[1].buffered();
    assert_eq!(lifted.len(), 1);
    assert_eq!(lifted[0].children_count, 10);
    assert_eq!(lifted[0].vertex.weight(), 10.0);

    clusterer.push_points(uniform_points(500, 2, 3)).unwrap();
    let summary = clusterer.finish().unwrap();

    let mass: f64 = summary.top.iter().map(|c| c.vertex.weight()).sum();
    assert_relative_eq!(mass, 510.0, max_relative = 1e-9);
    let counts = check_level_files(&output, LevelFormat::Raw, summary.levels.len());
    assert_eq!(counts[0], 510);
}

#[test]
fn test_level_merges_coincident_points() {
    init();
    let mut level = ClusteringLevel::new(1, 4, FacilityLocationConfig::default(), None).unwrap();
    let centres: Vec<Centre> = (0..4)
        .map(|_| Centre::new(Vertex::new(vec![1.0, -2.0]).with_weight(0.5)))
        .collect();
    level.push(centres).unwrap();

    let promoted = level.process().unwrap();
    // the clusterer itself opens one facility per point here
    assert_eq!(level.clusterer().cluster_count(), 4);
    assert_eq!(promoted.len(), 1);
    assert_eq!(promoted[0].children_count, 4);
    assert_eq!(promoted[0].vertex.coords(), &[1.0, -2.0]);
    assert_relative_eq!(promoted[0].vertex.weight(), 2.0, max_relative = 1e-12);
}

#[test]
fn test_blocks_that_never_shrink_hit_level_limit() {
    init();
    // two distinct points always open two facilities
    let config = HierarchyConfig::default()
        .with_block_size(2)
        .with_max_levels(4);
    let mut clusterer = HierarchicalClusterer::new(config).unwrap();
    let err = clusterer
        .push_points(vec![vec![0.0, 0.0], vec![1.0, 1.0]])
        .unwrap_err();
    assert!(matches!(err, ClusterError::LevelLimit { limit: 4 }));
}

#[test]
fn test_rejected_batch_does_not_fix_dimension() {
    init();
    let mut clusterer = HierarchicalClusterer::new(HierarchyConfig::default()).unwrap();
    assert!(matches!(
        clusterer.push_points(vec![vec![0.0, 1.0], vec![0.0, 1.0, 2.0]]),
        Err(ClusterError::DimensionMismatch { .. })
    ));
    assert_eq!(clusterer.dimension(), None);
    assert_eq!(clusterer.total_points(), 0);

    clusterer
        .push_points(vec![vec![0.0, 1.0, 2.0], vec![2.0, 1.0, 0.0]])
        .unwrap();
    assert_eq!(clusterer.dimension(), Some(3));
}

#[test]
fn test_invalid_input_is_rejected() {
    init();
    for config in [
        HierarchyConfig::default().with_block_size(1),
        HierarchyConfig::default().with_max_levels(0),
        HierarchyConfig::default().with_cost_multiplier(-0.5),
        HierarchyConfig::default().with_cost_multiplier(0.0),
        HierarchyConfig::default().with_format(LevelFormat::compressed(0.0)),
    ] {
        assert!(matches!(
            HierarchicalClusterer::new(config),
            Err(ClusterError::Configuration(_))
        ));
    }

    let mut clusterer = HierarchicalClusterer::new(HierarchyConfig::default()).unwrap();
    assert!(matches!(
        clusterer.push_points(vec![vec![]]),
        Err(ClusterError::Configuration(_))
    ));
    assert!(matches!(
        clusterer.push_points(vec![vec![0.0, 1.0], vec![0.0, 1.0, 2.0]]),
        Err(ClusterError::DimensionMismatch {
            expected: 2,
            got: 3
        })
    ));
    assert!(matches!(
        clusterer.push_vertices(vec![Vertex::new(vec![0.0, 0.0]).with_weight(-1.0)]),
        Err(ClusterError::Configuration(_))
    ));

    let weighted = HierarchyConfig::default()
        .with_clustering(FacilityLocationConfig::default().with_coord_weights(vec![1.0]));
    let mut clusterer = HierarchicalClusterer::new(weighted).unwrap();
    assert!(matches!(
        clusterer.push_points(vec![vec![0.0, 1.0]]),
        Err(ClusterError::Configuration(_))
    ));
}

#[test]
fn test_level_seeds_differ() {
    let config = HierarchyConfig::default().with_cost_multiplier(3.0);
    let l0 = config.level_clustering(0);
    let l2 = config.level_clustering(2);
    assert_eq!(l0.cost_multiplier, 3.0);
    assert_eq!(l0.seed, Some(1234));
    assert_eq!(l2.seed, Some(1236));
}
