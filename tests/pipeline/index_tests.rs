//! Spatial index integration tests: linear and quadtree equivalence.

use tilepipe::index::{LinearIndex, QuadTreeConfig, QuadTreeIndex, TileIndex};
use tilepipe::manifest::{TileManifest, TileMeta, Viewport};

use super::test_utils::pure_grid_manifest;

fn sorted_files(tiles: &[TileMeta]) -> Vec<String> {
    let mut files: Vec<String> = tiles.iter().map(|t| t.file.clone()).collect();
    files.sort();
    files
}

#[test]
fn test_straddling_viewport_hits_four_tiles() {
    // Nine 32x32 tiles in a 3x3 grid over 96x96.
    let manifest = pure_grid_manifest(3, 3, 32);
    let linear = LinearIndex::from_manifest(manifest.clone());
    let quad = QuadTreeIndex::from_manifest(manifest, QuadTreeConfig::default());

    let vp = Viewport::new(16, 16, 32, 32);
    let linear_hits = linear.query(&vp);
    let quad_hits = quad.query(&vp);

    let mut positions: Vec<(i32, i32)> = linear_hits.iter().map(|t| (t.x, t.y)).collect();
    positions.sort_unstable();
    assert_eq!(positions, vec![(0, 0), (0, 32), (32, 0), (32, 32)]);
    assert_eq!(sorted_files(&quad_hits), sorted_files(&linear_hits));
}

#[test]
fn test_indexes_agree_across_viewports() {
    let manifest = pure_grid_manifest(8, 8, 16);
    let linear = LinearIndex::from_manifest(manifest.clone());
    let quad = QuadTreeIndex::from_manifest(
        manifest,
        QuadTreeConfig {
            max_depth: 6,
            max_tiles_per_node: 2,
        },
    );

    let viewports = [
        Viewport::new(0, 0, 128, 128),
        Viewport::new(1, 1, 1, 1),
        Viewport::new(15, 15, 2, 2),
        Viewport::new(-10, -10, 20, 20),
        Viewport::new(120, 120, 50, 50),
        Viewport::new(64, 0, 1, 128),
        Viewport::new(0, 0, 16, 16),
        Viewport::new(300, 300, 10, 10),
    ];
    for vp in &viewports {
        assert_eq!(
            sorted_files(&quad.query(vp)),
            sorted_files(&linear.query(vp)),
            "index mismatch for viewport {vp:?}"
        );
    }
}

#[test]
fn test_indexes_agree_with_irregular_tiles() {
    // Variable-size tiles, overlaps, and a tile straddling the middle,
    // like a quadtree split with mixed depths would produce.
    let tiles = vec![
        TileMeta::new(0, 0, 64, 64, "a.png"),
        TileMeta::new(64, 0, 32, 32, "b.png"),
        TileMeta::new(96, 0, 32, 32, "c.png"),
        TileMeta::new(64, 32, 64, 32, "d.png"),
        TileMeta::new(0, 64, 128, 64, "e.png"),
        TileMeta::new(50, 50, 28, 28, "straddle.png"),
    ];
    let manifest = TileManifest::from_tiles(tiles);
    let linear = LinearIndex::from_manifest(manifest.clone());
    let quad = QuadTreeIndex::from_manifest(
        manifest,
        QuadTreeConfig {
            max_depth: 5,
            max_tiles_per_node: 1,
        },
    );

    let viewports = [
        Viewport::new(0, 0, 128, 128),
        Viewport::new(60, 60, 10, 10),
        Viewport::new(0, 60, 128, 10),
        Viewport::new(90, 10, 20, 20),
    ];
    for vp in &viewports {
        assert_eq!(
            sorted_files(&quad.query(vp)),
            sorted_files(&linear.query(vp)),
            "index mismatch for viewport {vp:?}"
        );
    }
}

#[test]
fn test_touching_edges_do_not_overlap() {
    let manifest = pure_grid_manifest(2, 2, 32);
    let linear = LinearIndex::from_manifest(manifest.clone());
    let quad = QuadTreeIndex::from_manifest(manifest, QuadTreeConfig::default());

    // A viewport exactly on the seam between columns touches the left
    // tiles' right edges but only overlaps the right column.
    let vp = Viewport::new(32, 0, 32, 64);
    for index in [&linear as &dyn TileIndex, &quad as &dyn TileIndex] {
        let hits = index.query(&vp);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|t| t.x == 32));
    }
}

#[test]
fn test_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let meta_path = dir.path().join("meta.txt");
    pure_grid_manifest(3, 3, 32).save(&meta_path).unwrap();

    let linear = LinearIndex::load(&meta_path).unwrap();
    let quad = QuadTreeIndex::load(&meta_path).unwrap();

    assert_eq!(linear.map_width(), 96);
    assert_eq!(quad.map_height(), 96);

    let vp = Viewport::new(40, 40, 20, 20);
    assert_eq!(
        sorted_files(&quad.query(&vp)),
        sorted_files(&linear.query(&vp))
    );
}
