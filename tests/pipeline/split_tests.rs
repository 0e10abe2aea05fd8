//! Write-path integration tests: splitting images into tiles.

use tilepipe::manifest::{TileManifest, TileMeta};
use tilepipe::split::{split_quadtree_image, SplitConfig};

use super::test_utils::{fill_rect, gradient_image, solid_image};

#[test]
fn test_single_pure_color_image() {
    let dir = tempfile::tempdir().unwrap();
    let pixels = solid_image(64, 64, [0xFF, 0x00, 0x00, 0xFF]);

    let config = SplitConfig {
        max_depth: 8,
        min_tile_size: 4,
        color_tolerance: 0,
    };
    let tiles = split_quadtree_image(&pixels, 64, 64, dir.path(), &config);

    // One metadata-only tile, no PNG files on disk.
    assert_eq!(tiles, vec![TileMeta::new(0, 0, 64, 64, "FF0000FF")]);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_two_color_checkerboard() {
    let dir = tempfile::tempdir().unwrap();
    let red = [0xFF, 0x00, 0x00, 0xFF];
    let blue = [0x00, 0x00, 0xFF, 0xFF];
    let mut pixels = solid_image(8, 8, red);
    fill_rect(&mut pixels, 8, 4, 0, 4, 4, blue);
    fill_rect(&mut pixels, 8, 0, 4, 4, 4, blue);

    let config = SplitConfig {
        max_depth: 3,
        min_tile_size: 4,
        color_tolerance: 0,
    };
    let mut tiles = split_quadtree_image(&pixels, 8, 8, dir.path(), &config);
    tiles.sort_by_key(|t| (t.y, t.x));

    assert_eq!(
        tiles,
        vec![
            TileMeta::new(0, 0, 4, 4, "FF0000FF"),
            TileMeta::new(4, 0, 4, 4, "0000FFFF"),
            TileMeta::new(0, 4, 4, 4, "0000FFFF"),
            TileMeta::new(4, 4, 4, 4, "FF0000FF"),
        ]
    );
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_gradient_emits_pixel_tiles() {
    let dir = tempfile::tempdir().unwrap();
    let pixels = gradient_image(32, 32);

    let config = SplitConfig {
        max_depth: 2,
        min_tile_size: 4,
        color_tolerance: 0,
    };
    let tiles = split_quadtree_image(&pixels, 32, 32, dir.path(), &config);

    // Depth cap of 2 gives a 4x4 grid of 8x8 pixel tiles.
    assert_eq!(tiles.len(), 16);
    for tile in &tiles {
        assert!(!tile.is_pure_color());
        assert_eq!((tile.w, tile.h), (8, 8));
        assert!(dir.path().join(&tile.file).exists(), "missing {}", tile.file);
    }
}

#[test]
fn test_split_manifest_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut pixels = solid_image(32, 32, [10, 20, 30, 255]);
    fill_rect(&mut pixels, 32, 0, 0, 8, 8, [200, 20, 30, 255]);

    let tiles = split_quadtree_image(&pixels, 32, 32, dir.path(), &SplitConfig::default());
    let manifest = TileManifest::from_tiles(tiles);

    let meta_path = dir.path().join("meta.txt");
    manifest.save(&meta_path).unwrap();
    let loaded = TileManifest::load(&meta_path).unwrap();

    assert_eq!(loaded.tiles(), manifest.tiles());
    assert_eq!(loaded.map_width(), 32);
    assert_eq!(loaded.map_height(), 32);
}

#[test]
fn test_tolerance_collapses_noisy_region() {
    let dir = tempfile::tempdir().unwrap();
    // Base gray with +/-1 noise on the red channel.
    let mut pixels = solid_image(16, 16, [128, 128, 128, 255]);
    for (i, px) in pixels.chunks_mut(4).enumerate() {
        px[0] = 128 + (i % 2) as u8;
    }

    let strict = SplitConfig {
        max_depth: 2,
        min_tile_size: 4,
        color_tolerance: 0,
    };
    let tolerant = SplitConfig {
        color_tolerance: 1,
        ..strict
    };

    let strict_tiles = split_quadtree_image(&pixels, 16, 16, dir.path(), &strict);
    let tolerant_tiles = split_quadtree_image(&pixels, 16, 16, dir.path(), &tolerant);

    assert!(strict_tiles.iter().all(|t| !t.is_pure_color()));
    assert_eq!(tolerant_tiles.len(), 1);
    assert!(tolerant_tiles[0].is_pure_color());
}

#[test]
fn test_non_power_of_two_image_covers_whole_area() {
    let dir = tempfile::tempdir().unwrap();
    let pixels = gradient_image(20, 12);

    let config = SplitConfig {
        max_depth: 3,
        min_tile_size: 2,
        color_tolerance: 0,
    };
    let tiles = split_quadtree_image(&pixels, 20, 12, dir.path(), &config);
    let manifest = TileManifest::from_tiles(tiles);

    assert_eq!(manifest.map_width(), 20);
    assert_eq!(manifest.map_height(), 12);

    // Clipped tiles never extend past the image.
    for tile in manifest.tiles() {
        assert!(tile.x + tile.w <= 20);
        assert!(tile.y + tile.h <= 12);
        assert!(tile.w > 0 && tile.h > 0);
    }
}
