//! Tile metadata and the on-disk manifest.
//!
//! A manifest is a plain text file: one header line (`x y w h file`), then
//! one whitespace-separated record per tile. The `file` token is either a
//! PNG filename relative to the tile directory or an 8-hex-digit RGBA
//! color for a pure-color tile with no pixel payload. The map extent is
//! not stored; it is derived from the tiles on load.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::error::ManifestError;
use crate::raster::color;

/// Metadata for one tile: its rectangle in source-image pixel coordinates
/// (origin top-left) and its file token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileMeta {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    pub file: String,
}

impl TileMeta {
    pub fn new(x: i32, y: i32, w: i32, h: i32, file: impl Into<String>) -> Self {
        Self {
            x,
            y,
            w,
            h,
            file: file.into(),
        }
    }

    /// Whether this tile is a pure-color record (8-hex-digit file token).
    pub fn is_pure_color(&self) -> bool {
        color::is_color_token(&self.file)
    }

    /// The packed RGBA color of a pure-color tile.
    pub fn pure_color(&self) -> Option<u32> {
        color::parse_color_token(&self.file)
    }

    /// Strict intersection test: rectangles that only touch along an edge
    /// do not overlap.
    pub fn intersects(&self, vp: &Viewport) -> bool {
        !(self.x + self.w <= vp.x
            || self.y + self.h <= vp.y
            || self.x >= vp.x + vp.w
            || self.y >= vp.y + vp.h)
    }
}

/// A rectangle to assemble, in the same coordinate space as [`TileMeta`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    /// Build a viewport from a position given in bottom-left origin
    /// coordinates, as accepted by the CLI. The internal space is
    /// top-left origin, so `y` becomes `map_height - y - h`, clamped at 0.
    pub fn from_bottom_left(x: i32, y: i32, w: i32, h: i32, map_height: i32) -> Self {
        let internal_y = (map_height - y - h).max(0);
        Self {
            x,
            y: internal_y,
            w,
            h,
        }
    }
}

/// The persisted tile list plus its derived map extent.
///
/// Created by a splitter or loaded from disk; read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct TileManifest {
    tiles: Vec<TileMeta>,
    map_width: i32,
    map_height: i32,
}

impl TileManifest {
    /// Build a manifest from a tile list, deriving the map extent.
    pub fn from_tiles(tiles: Vec<TileMeta>) -> Self {
        let mut manifest = Self {
            tiles,
            map_width: 0,
            map_height: 0,
        };
        manifest.derive_extent();
        manifest
    }

    /// Load a manifest from disk.
    ///
    /// The header line is skipped; malformed records are skipped silently.
    /// Fails only if the file itself cannot be read.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Open {
            path: path.display().to_string(),
            source,
        })?;

        let tiles = content
            .lines()
            .skip(1)
            .filter_map(parse_record)
            .collect();

        Ok(Self::from_tiles(tiles))
    }

    /// Write the manifest: header line, then one record per tile.
    pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
        let write = |path: &Path| -> std::io::Result<()> {
            let mut out = std::io::BufWriter::new(fs::File::create(path)?);
            writeln!(out, "x y w h file")?;
            for tile in &self.tiles {
                writeln!(out, "{} {} {} {} {}", tile.x, tile.y, tile.w, tile.h, tile.file)?;
            }
            out.flush()
        };

        write(path).map_err(|source| ManifestError::Write {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn tiles(&self) -> &[TileMeta] {
        &self.tiles
    }

    /// Derived extent: `max(x + w)` over all tiles.
    pub fn map_width(&self) -> i32 {
        self.map_width
    }

    /// Derived extent: `max(y + h)` over all tiles.
    pub fn map_height(&self) -> i32 {
        self.map_height
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    fn derive_extent(&mut self) {
        self.map_width = 0;
        self.map_height = 0;
        for tile in &self.tiles {
            self.map_width = self.map_width.max(tile.x + tile.w);
            self.map_height = self.map_height.max(tile.y + tile.h);
        }
    }
}

fn parse_record(line: &str) -> Option<TileMeta> {
    let mut fields = line.split_whitespace();
    let x = fields.next()?.parse().ok()?;
    let y = fields.next()?.parse().ok()?;
    let w = fields.next()?.parse().ok()?;
    let h = fields.next()?.parse().ok()?;
    let file = fields.next()?.to_string();
    Some(TileMeta { x, y, w, h, file })
}
