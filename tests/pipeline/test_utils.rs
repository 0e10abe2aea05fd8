//! Shared fixtures for the pipeline integration tests.

use std::path::Path;

use tilepipe::manifest::{TileManifest, TileMeta};
use tilepipe::raster::codec;

/// Build a solid-color RGBA buffer.
pub fn solid_image(w: i32, h: i32, rgba: [u8; 4]) -> Vec<u8> {
    let mut buf = Vec::with_capacity((w * h * 4) as usize);
    for _ in 0..w * h {
        buf.extend_from_slice(&rgba);
    }
    buf
}

/// Overwrite a rectangle of an RGBA buffer with one color.
pub fn fill_rect(pixels: &mut [u8], image_w: i32, x: i32, y: i32, w: i32, h: i32, rgba: [u8; 4]) {
    for dy in 0..h {
        for dx in 0..w {
            let off = (((y + dy) * image_w + (x + dx)) * 4) as usize;
            pixels[off..off + 4].copy_from_slice(&rgba);
        }
    }
}

/// A deterministic opaque gradient that contains no uniform regions.
pub fn gradient_image(w: i32, h: i32) -> Vec<u8> {
    let mut buf = Vec::with_capacity((w * h * 4) as usize);
    for y in 0..h {
        for x in 0..w {
            buf.extend_from_slice(&[
                (x * 255 / w.max(1)) as u8,
                (y * 255 / h.max(1)) as u8,
                ((x + y) * 7 % 256) as u8,
                255,
            ]);
        }
    }
    buf
}

/// Write an RGBA buffer to disk as a PNG.
pub fn write_png(path: &Path, pixels: &[u8], w: i32, h: i32) {
    codec::encode_rgba(path, pixels, w as u32, h as u32).unwrap();
}

/// A `cols` x `rows` manifest of pure-color tiles of the given size.
pub fn pure_grid_manifest(cols: i32, rows: i32, size: i32) -> TileManifest {
    let mut tiles = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            // Encode the grid position into the color so tests can tell
            // tiles apart.
            let color = ((col as u32) << 24) | ((row as u32) << 16) | 0xFF;
            tiles.push(TileMeta::new(
                col * size,
                row * size,
                size,
                size,
                format!("{color:08X}"),
            ));
        }
    }
    TileManifest::from_tiles(tiles)
}

/// Parse the assembler's hex dump back into packed pixel values.
pub fn parse_hex_dump(hex: &str) -> Vec<u32> {
    hex.split(',')
        .map(|token| {
            let token = token.strip_prefix("0x").expect("missing 0x prefix");
            assert_eq!(token.len(), 8, "hex pixel must be 8 digits: {token}");
            u32::from_str_radix(token, 16).unwrap()
        })
        .collect()
}
