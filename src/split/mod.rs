//! Tile splitters: the write path of the pipeline.
//!
//! [`split_quadtree`] recursively subdivides the image and collapses
//! uniform-color regions into metadata-only tiles, so a map with large
//! flat areas stores a fraction of the pixel data a fixed grid would.
//! [`split_fixed`] is the plain grid splitter kept for comparison runs.
//!
//! Both return the emitted [`TileMeta`] records; callers persist them via
//! [`TileManifest::save`](crate::manifest::TileManifest::save).

mod node;

use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::SplitError;
use crate::manifest::TileMeta;
use crate::raster::{codec, color};

use node::QuadNode;

/// Quadtree splitting parameters.
#[derive(Debug, Clone, Copy)]
pub struct SplitConfig {
    /// Maximum recursion depth.
    pub max_depth: u32,
    /// Regions at most this wide or tall are not subdivided further.
    pub min_tile_size: i32,
    /// Per-channel tolerance for the uniform-color test.
    pub color_tolerance: u8,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            min_tile_size: 4,
            color_tolerance: 0,
        }
    }
}

/// Split the image at `input` into quadtree tiles under `out_dir`.
///
/// Pure-color leaves are emitted as metadata only (the file token is the
/// 8-hex-digit RGBA value); mixed leaves are written as PNG files. A
/// failed tile write is logged and skipped; the returned list contains the
/// tiles that succeeded.
pub fn split_quadtree(
    input: &Path,
    out_dir: &Path,
    config: &SplitConfig,
) -> Result<Vec<TileMeta>, SplitError> {
    let image = codec::decode_rgba(input)?;
    info!(
        input = %input.display(),
        width = image.width,
        height = image.height,
        "loaded source image"
    );

    ensure_out_dir(out_dir)?;
    let tiles = split_quadtree_image(&image.pixels, image.width, image.height, out_dir, config);

    info!(tiles = tiles.len(), "quadtree split completed");
    Ok(tiles)
}

/// Split an in-memory RGBA image into quadtree tiles under `out_dir`.
///
/// `out_dir` must already exist.
pub fn split_quadtree_image(
    pixels: &[u8],
    width: i32,
    height: i32,
    out_dir: &Path,
    config: &SplitConfig,
) -> Vec<TileMeta> {
    let mut root = QuadNode::new(0, 0, width, height);
    subdivide_region(&mut root, pixels, width, height, config, 0);

    let mut tiles = Vec::new();
    collect_leaf_tiles(&root, pixels, width, height, out_dir, &mut tiles);
    tiles
}

/// Split the image at `input` into a fixed `tile_w` x `tile_h` grid.
///
/// Edge tiles are clipped to the image bounds. Every tile is written as a
/// PNG named `tile_{x}_{y}.png`.
pub fn split_fixed(
    input: &Path,
    out_dir: &Path,
    tile_w: i32,
    tile_h: i32,
) -> Result<Vec<TileMeta>, SplitError> {
    let image = codec::decode_rgba(input)?;
    ensure_out_dir(out_dir)?;

    let mut tiles = Vec::new();
    let mut y = 0;
    while y < image.height {
        let mut x = 0;
        while x < image.width {
            let cw = tile_w.min(image.width - x);
            let ch = tile_h.min(image.height - y);
            let file = format!("tile_{x}_{y}.png");

            let mut buf = Vec::with_capacity((cw * ch * 4) as usize);
            for row in 0..ch {
                let start = (((y + row) * image.width + x) * 4) as usize;
                buf.extend_from_slice(&image.pixels[start..start + (cw * 4) as usize]);
            }

            match codec::encode_rgba(&out_dir.join(&file), &buf, cw as u32, ch as u32) {
                Ok(()) => tiles.push(TileMeta::new(x, y, cw, ch, file)),
                Err(e) => warn!(tile = %file, error = %e, "skipping tile that failed to write"),
            }
            x += tile_w;
        }
        y += tile_h;
    }

    info!(tiles = tiles.len(), "fixed-size split completed");
    Ok(tiles)
}

fn ensure_out_dir(out_dir: &Path) -> Result<(), SplitError> {
    std::fs::create_dir_all(out_dir).map_err(|source| SplitError::OutputDir {
        path: out_dir.display().to_string(),
        source,
    })
}

/// Recursive subdivision. A node becomes a leaf when its clipped region is
/// uniform, the depth limit is reached, or the clipped region is already
/// at the minimum tile size.
fn subdivide_region(
    node: &mut QuadNode,
    pixels: &[u8],
    image_w: i32,
    image_h: i32,
    config: &SplitConfig,
    depth: u32,
) {
    if node.x >= image_w || node.y >= image_h {
        return;
    }

    let actual_w = node.w.min(image_w - node.x);
    let actual_h = node.h.min(image_h - node.y);

    let uniform = color::uniform_color(
        pixels,
        image_w,
        node.x,
        node.y,
        actual_w,
        actual_h,
        config.color_tolerance,
    );

    if uniform.is_some()
        || depth >= config.max_depth
        || actual_w <= config.min_tile_size
        || actual_h <= config.min_tile_size
    {
        node.uniform_color = uniform;
        return;
    }

    if actual_w > 1 && actual_h > 1 {
        node.subdivide();
        if let Some(children) = node.children.as_mut() {
            for child in children.iter_mut() {
                subdivide_region(child, pixels, image_w, image_h, config, depth + 1);
            }
        }
    }
}

fn collect_leaf_tiles(
    node: &QuadNode,
    pixels: &[u8],
    image_w: i32,
    image_h: i32,
    out_dir: &Path,
    tiles: &mut Vec<TileMeta>,
) {
    if let Some(children) = &node.children {
        for child in children.iter() {
            collect_leaf_tiles(child, pixels, image_w, image_h, out_dir, tiles);
        }
        return;
    }

    if node.x >= image_w || node.y >= image_h {
        return;
    }
    let actual_w = node.w.min(image_w - node.x);
    let actual_h = node.h.min(image_h - node.y);
    if actual_w <= 0 || actual_h <= 0 {
        return;
    }

    if let Some(uniform) = node.uniform_color {
        let file = color::format_color_token(uniform);
        debug!(x = node.x, y = node.y, w = actual_w, h = actual_h, color = %file, "pure color tile");
        tiles.push(TileMeta::new(node.x, node.y, actual_w, actual_h, file));
        return;
    }

    // Mixed tile: the PNG covers the declared node rectangle (out-of-image
    // pixels transparent), while the meta records the clipped dimensions.
    let file = format!("qtile_{}_{}_{}x{}.png", node.x, node.y, node.w, node.h);
    match write_pixel_tile(node, pixels, image_w, image_h, &out_dir.join(&file)) {
        Ok(()) => tiles.push(TileMeta::new(node.x, node.y, actual_w, actual_h, file)),
        Err(e) => warn!(tile = %file, error = %e, "skipping tile that failed to write"),
    }
}

fn write_pixel_tile(
    node: &QuadNode,
    pixels: &[u8],
    image_w: i32,
    image_h: i32,
    path: &Path,
) -> Result<(), crate::error::CodecError> {
    let mut buf = vec![0u8; (node.w * node.h * 4) as usize];
    for dy in 0..node.h {
        let src_y = node.y + dy;
        if src_y >= image_h {
            break;
        }
        let copy_w = node.w.min(image_w - node.x);
        if copy_w <= 0 {
            continue;
        }
        let src = ((src_y * image_w + node.x) * 4) as usize;
        let dst = ((dy * node.w) * 4) as usize;
        buf[dst..dst + (copy_w * 4) as usize]
            .copy_from_slice(&pixels[src..src + (copy_w * 4) as usize]);
    }

    codec::encode_rgba(path, &buf, node.w as u32, node.h as u32)
}
