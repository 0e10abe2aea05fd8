//! Command-line interface definition.
//!
//! Two subcommands drive the pipeline:
//!
//! - `tilepipe split -i map.png -o data/tiles [--quadtree ...]` — the
//!   write path: split a raster into tiles plus a manifest.
//! - `tilepipe view -i data/tiles -p x,y -s WxH [...]` — the read path:
//!   assemble a viewport from the tiles.
//!
//! The `-p` position is given in bottom-left origin coordinates and
//! converted internally (see [`Viewport::from_bottom_left`]).
//!
//! [`Viewport::from_bottom_left`]: crate::manifest::Viewport::from_bottom_left

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Args, Parser, Subcommand};

/// Default tile directory shared by both subcommands.
pub const DEFAULT_TILE_DIR: &str = "data/tiles";

/// Manifest filename inside the tile directory.
pub const MANIFEST_FILE: &str = "meta.txt";

/// Quadtree map tile pipeline.
///
/// Splits large raster maps into color-aware quadtree tiles and
/// reassembles arbitrary viewports from them.
#[derive(Parser, Debug)]
#[command(name = "tilepipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Split a raster map into tiles and write the manifest.
    Split(SplitArgs),
    /// Assemble a viewport from a tile directory.
    View(ViewArgs),
}

/// A `WxH` (or `W,H`) pair of pixel dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelSize {
    pub w: i32,
    pub h: i32,
}

impl FromStr for PixelSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .split_once('x')
            .or_else(|| s.split_once(','))
            .ok_or_else(|| format!("expected WxH or W,H, got '{s}'"))?;
        let w = w.trim().parse().map_err(|_| format!("invalid width '{w}'"))?;
        let h = h.trim().parse().map_err(|_| format!("invalid height '{h}'"))?;
        Ok(Self { w, h })
    }
}

/// An `x,y` pixel position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelPos {
    pub x: i32,
    pub y: i32,
}

impl FromStr for PixelPos {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| format!("expected x,y, got '{s}'"))?;
        let x = x.trim().parse().map_err(|_| format!("invalid x '{x}'"))?;
        let y = y.trim().parse().map_err(|_| format!("invalid y '{y}'"))?;
        Ok(Self { x, y })
    }
}

#[derive(Args, Debug, Clone)]
pub struct SplitArgs {
    /// Input raster map (PNG).
    #[arg(short = 'i', long = "input", env = "TILEPIPE_INPUT")]
    pub input: PathBuf,

    /// Output tile directory.
    #[arg(short = 'o', long = "output", default_value = DEFAULT_TILE_DIR)]
    pub output: PathBuf,

    /// Use color-aware quadtree splitting instead of the fixed grid.
    #[arg(long)]
    pub quadtree: bool,

    /// Maximum quadtree depth.
    #[arg(long, default_value_t = 8)]
    pub max_depth: u32,

    /// Minimum tile size in pixels (quadtree mode).
    #[arg(long = "min-size", default_value_t = 4)]
    pub min_tile_size: i32,

    /// Per-channel color comparison tolerance (quadtree mode).
    #[arg(long, default_value_t = 0)]
    pub color_tolerance: u8,

    /// Fixed tile size as WxH.
    #[arg(long, default_value = "32x32")]
    pub tile: PixelSize,

    /// Manifest path (default: <output>/meta.txt).
    #[arg(long)]
    pub meta: Option<PathBuf>,

    /// Run both splitters into <output>_fixed and <output>_quadtree and
    /// report the tile-count reduction.
    #[arg(long)]
    pub compare: bool,
}

impl SplitArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.tile.w <= 0 || self.tile.h <= 0 {
            return Err("tile size must be positive".to_string());
        }
        if self.max_depth == 0 {
            return Err("max-depth must be at least 1".to_string());
        }
        if self.min_tile_size <= 0 {
            return Err("min-size must be positive".to_string());
        }
        Ok(())
    }

    /// Manifest path for a given output directory.
    pub fn meta_path(&self, out_dir: &std::path::Path) -> PathBuf {
        match &self.meta {
            Some(path) => path.clone(),
            None => out_dir.join(MANIFEST_FILE),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ViewArgs {
    /// Tile directory containing the manifest.
    #[arg(short = 'i', long = "input", default_value = DEFAULT_TILE_DIR, env = "TILEPIPE_TILES")]
    pub input: PathBuf,

    /// Viewport position as x,y. The y coordinate is in bottom-left
    /// origin and converted internally.
    #[arg(short = 'p', long = "pos", default_value = "0,0")]
    pub pos: PixelPos,

    /// Viewport size as WxH or W,H.
    #[arg(short = 's', long = "size", default_value = "128x128")]
    pub size: PixelSize,

    /// Write the assembled viewport as a PNG instead of a hex dump.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Use the quadtree spatial index.
    #[arg(short = 'q', long)]
    pub quadtree: bool,

    /// Use the enhanced assembler (tile cache + async loading).
    #[arg(short = 'e', long)]
    pub enhanced: bool,

    /// Disable tile caching (only with --enhanced).
    #[arg(long)]
    pub no_cache: bool,

    /// Disable async loading (only with --enhanced).
    #[arg(long)]
    pub no_async: bool,

    /// Print cache, loader and assembly statistics.
    #[arg(long)]
    pub stats: bool,

    /// Manifest path (default: <input>/meta.txt).
    #[arg(long)]
    pub meta: Option<PathBuf>,
}

impl ViewArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.size.w <= 0 || self.size.h <= 0 {
            return Err("viewport size must be positive".to_string());
        }
        Ok(())
    }

    pub fn meta_path(&self) -> PathBuf {
        match &self.meta {
            Some(path) => path.clone(),
            None => self.input.join(MANIFEST_FILE),
        }
    }
}
