//! Viewport assembly: the read path of the pipeline.
//!
//! For a requested viewport the assembler queries the spatial index,
//! resolves every overlapping tile (cache first, then async loads through
//! the [`TileLoader`], then a synchronous decode fallback), and
//! composites the results onto an RGBA canvas in traversal order. The
//! canvas is written as a PNG or emitted as a hex dump.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   ViewportAssembler                      │
//! │  ┌────────────────────────────────────────────────────┐  │
//! │  │                   assemble()                       │  │
//! │  │  1. index.query(vp)     3. blit tiles onto canvas  │  │
//! │  │  2. resolve each tile   4. encode PNG / hex dump   │  │
//! │  └────────────────────────────────────────────────────┘  │
//! │        │                  │                   │          │
//! │        ▼                  ▼                   ▼          │
//! │  ┌───────────┐      ┌────────────┐      ┌───────────┐    │
//! │  │ TileCache │      │ TileLoader │      │ PNG codec │    │
//! │  └───────────┘      └────────────┘      └───────────┘    │
//! └──────────────────────────────────────────────────────────┘
//! ```

mod blit;

pub use blit::{blit_image, blit_solid};

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::cache::{CachedTile, TileCache};
use crate::error::AssembleError;
use crate::index::TileIndex;
use crate::loader::{LoaderConfig, TileLoader};
use crate::manifest::{TileMeta, Viewport};
use crate::raster::{codec, color};

/// Priority for on-demand loads issued during assembly.
const ASSEMBLE_LOAD_PRIORITY: i32 = 200;

/// Base priority when preloading an explicitly named next viewport.
const NEXT_VIEWPORT_PRELOAD_PRIORITY: i32 = 75;

/// Base priority for the expanded-viewport preload after an assemble.
const EXPANDED_PRELOAD_PRIORITY: i32 = 50;

/// Assembler behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct AssemblerConfig {
    pub enable_async_loading: bool,
    pub enable_caching: bool,
    pub enable_preloading: bool,
    /// Advisory cap on how long to await one async load.
    pub load_timeout: Duration,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            enable_async_loading: true,
            enable_caching: true,
            enable_preloading: true,
            load_timeout: Duration::from_secs(5),
        }
    }
}

/// Counters for the most recent assembly.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssemblyStats {
    pub total_tiles: usize,
    pub cached_tiles: usize,
    pub async_loaded_tiles: usize,
    pub sync_loaded_tiles: usize,
    pub failed_tiles: usize,
    pub assembly_time_ms: f64,
}

impl AssemblyStats {
    pub fn cache_hit_rate(&self) -> f64 {
        if self.total_tiles == 0 {
            return 0.0;
        }
        self.cached_tiles as f64 / self.total_tiles as f64
    }
}

/// Pixel data resolved for one tile, ready to blit.
struct TileRenderData {
    loaded: bool,
    width: i32,
    height: i32,
    is_pure_color: bool,
    pure_color: u32,
    pixels: Bytes,
}

impl TileRenderData {
    fn not_loaded() -> Self {
        Self {
            loaded: false,
            width: 0,
            height: 0,
            is_pure_color: false,
            pure_color: 0,
            pixels: Bytes::new(),
        }
    }

    fn from_cached(tile: &CachedTile) -> Self {
        Self {
            loaded: true,
            width: tile.width,
            height: tile.height,
            is_pure_color: tile.is_pure_color,
            pure_color: tile.pure_color,
            pixels: tile.pixels.clone(),
        }
    }
}

/// Orchestrates the full read path for one viewport at a time.
pub struct ViewportAssembler {
    cache: Option<Arc<TileCache>>,
    loader: Option<Arc<TileLoader>>,
    config: AssemblerConfig,
    last_stats: AssemblyStats,
}

impl ViewportAssembler {
    /// Build an assembler, creating (and starting) the cache and loader
    /// that were not supplied but are enabled by `config`.
    pub fn new(
        cache: Option<Arc<TileCache>>,
        loader: Option<Arc<TileLoader>>,
        config: AssemblerConfig,
    ) -> Self {
        let cache = match cache {
            Some(cache) => Some(cache),
            None if config.enable_caching => Some(Arc::new(TileCache::new())),
            None => None,
        };

        let loader = match loader {
            Some(loader) => Some(loader),
            None if config.enable_async_loading => cache.as_ref().map(|cache| {
                let loader = Arc::new(TileLoader::new(Arc::clone(cache), LoaderConfig::default()));
                loader.start();
                loader
            }),
            None => None,
        };

        Self {
            cache,
            loader,
            config,
            last_stats: AssemblyStats::default(),
        }
    }

    /// Assemble `vp` and write the canvas as a PNG to `out_path`.
    pub async fn assemble(
        &mut self,
        index: &dyn TileIndex,
        vp: &Viewport,
        resource_dir: &Path,
        out_path: &Path,
    ) -> Result<(), AssembleError> {
        let started = Instant::now();

        let canvas = self.render(index, vp, resource_dir).await?;
        codec::encode_rgba(out_path, &canvas, vp.w as u32, vp.h as u32)?;

        self.last_stats.assembly_time_ms = started.elapsed().as_secs_f64() * 1000.0;

        if self.config.enable_preloading {
            if let Some(loader) = &self.loader {
                let expanded = Viewport::new(
                    vp.x - vp.w / 4,
                    vp.y - vp.h / 4,
                    vp.w + vp.w / 2,
                    vp.h + vp.h / 2,
                );
                let tiles = index.query(&expanded);
                loader.preload_viewport_tiles(&tiles, resource_dir, EXPANDED_PRELOAD_PRIORITY);
            }
        }

        debug!(
            viewport_w = vp.w,
            viewport_h = vp.h,
            tiles = self.last_stats.total_tiles,
            cache_hits = self.last_stats.cached_tiles,
            time_ms = self.last_stats.assembly_time_ms,
            "assembled viewport"
        );
        Ok(())
    }

    /// Assemble `vp` and return the canvas as `0xRRGGBBAA,...` over all
    /// pixels in row-major order.
    pub async fn assemble_to_hex(
        &mut self,
        index: &dyn TileIndex,
        vp: &Viewport,
        resource_dir: &Path,
    ) -> Result<String, AssembleError> {
        let canvas = self.render(index, vp, resource_dir).await?;

        let mut out = String::with_capacity(canvas.len() / 4 * 11);
        for (i, px) in canvas.chunks_exact(4).enumerate() {
            if i > 0 {
                out.push(',');
            }
            let packed = color::pack_rgba(px[0], px[1], px[2], px[3]);
            out.push_str(&format!("0x{packed:08X}"));
        }
        Ok(out)
    }

    /// Queue preloads for an upcoming viewport.
    pub fn preload_next_viewport(
        &self,
        index: &dyn TileIndex,
        _current: &Viewport,
        next: &Viewport,
        resource_dir: &Path,
    ) {
        if !self.config.enable_preloading {
            return;
        }
        if let Some(loader) = &self.loader {
            let tiles = index.query(next);
            loader.preload_viewport_tiles(&tiles, resource_dir, NEXT_VIEWPORT_PRELOAD_PRIORITY);
        }
    }

    /// Queue preloads along a movement vector.
    pub fn preload_by_movement(
        &self,
        index: &dyn TileIndex,
        current: &Viewport,
        delta_x: i32,
        delta_y: i32,
        resource_dir: &Path,
    ) {
        if !self.config.enable_preloading {
            return;
        }
        if let Some(loader) = &self.loader {
            let movement = Viewport::new(delta_x, delta_y, 0, 0);
            loader.preload_by_direction(current, &movement, index, resource_dir);
        }
    }

    /// Evict every cached tile not visible in `vp`.
    pub fn evict_out_of_viewport_tiles(&self, vp: &Viewport, index: &dyn TileIndex) {
        if let Some(cache) = &self.cache {
            let visible_ids: Vec<String> =
                index.query(vp).into_iter().map(|tile| tile.file).collect();
            cache.evict_out_of_viewport(&visible_ids);
        }
    }

    /// Counters for the most recent `assemble`/`assemble_to_hex` call.
    pub fn last_stats(&self) -> AssemblyStats {
        self.last_stats
    }

    pub fn cache(&self) -> Option<&Arc<TileCache>> {
        self.cache.as_ref()
    }

    pub fn loader(&self) -> Option<&Arc<TileLoader>> {
        self.loader.as_ref()
    }

    async fn render(
        &mut self,
        index: &dyn TileIndex,
        vp: &Viewport,
        resource_dir: &Path,
    ) -> Result<Vec<u8>, AssembleError> {
        self.last_stats = AssemblyStats::default();

        let tiles = index.query(vp);
        if tiles.is_empty() {
            warn!(x = vp.x, y = vp.y, w = vp.w, h = vp.h, "no tiles overlap viewport");
            return Err(AssembleError::EmptyViewport {
                x: vp.x,
                y: vp.y,
                w: vp.w,
                h: vp.h,
            });
        }
        self.last_stats.total_tiles = tiles.len();

        let mut canvas = vec![0u8; (vp.w * vp.h * 4) as usize];

        let render_data = match (self.config.enable_async_loading, self.loader.clone()) {
            (true, Some(loader)) => self.load_tiles_async(&loader, &tiles, resource_dir).await,
            _ => tiles
                .iter()
                .map(|meta| self.load_tile_sync(meta, resource_dir))
                .collect(),
        };

        for (meta, data) in tiles.iter().zip(render_data.iter()) {
            if !data.loaded {
                continue;
            }
            let local_x = meta.x - vp.x;
            let local_y = meta.y - vp.y;
            if data.is_pure_color {
                blit_solid(
                    &mut canvas,
                    vp.w,
                    vp.h,
                    data.pure_color,
                    data.width,
                    data.height,
                    local_x,
                    local_y,
                );
            } else {
                blit_image(
                    &mut canvas,
                    vp.w,
                    vp.h,
                    &data.pixels,
                    data.width,
                    data.height,
                    local_x,
                    local_y,
                );
            }
        }

        Ok(canvas)
    }

    /// Resolve tiles through the loader, keeping each record aligned with
    /// its tile: cache hits fill in immediately, misses are dispatched in
    /// parallel and awaited afterwards.
    async fn load_tiles_async(
        &mut self,
        loader: &Arc<TileLoader>,
        tiles: &[TileMeta],
        resource_dir: &Path,
    ) -> Vec<TileRenderData> {
        let mut records: Vec<Option<TileRenderData>> = tiles.iter().map(|_| None).collect();

        let mut pending = Vec::new();
        for (i, meta) in tiles.iter().enumerate() {
            let cached = self.cache.as_ref().and_then(|cache| cache.get(&meta.file));
            if let Some(tile) = cached {
                records[i] = Some(TileRenderData::from_cached(&tile));
                self.last_stats.cached_tiles += 1;
            } else {
                let future = loader.load_tile(resource_dir, meta, Some(ASSEMBLE_LOAD_PRIORITY));
                pending.push((i, meta.file.clone(), future));
            }
        }

        for (i, tile_id, future) in pending {
            match tokio::time::timeout(self.config.load_timeout, future).await {
                Ok(result) if result.is_completed() => {
                    records[i] = Some(TileRenderData {
                        loaded: true,
                        width: result.width,
                        height: result.height,
                        is_pure_color: result.is_pure_color,
                        pure_color: result.pure_color,
                        pixels: result.pixels,
                    });
                    self.last_stats.async_loaded_tiles += 1;
                }
                Ok(result) => {
                    error!(
                        %tile_id,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "async tile load failed"
                    );
                    self.last_stats.failed_tiles += 1;
                }
                Err(_) => {
                    warn!(%tile_id, "async tile load timed out");
                    self.last_stats.failed_tiles += 1;
                }
            }
        }

        records
            .into_iter()
            .map(|record| record.unwrap_or_else(TileRenderData::not_loaded))
            .collect()
    }

    /// Decode one tile synchronously, writing through to the cache.
    fn load_tile_sync(&mut self, meta: &TileMeta, resource_dir: &Path) -> TileRenderData {
        if let Some(cache) = &self.cache {
            if let Some(tile) = cache.get(&meta.file) {
                self.last_stats.cached_tiles += 1;
                return TileRenderData::from_cached(&tile);
            }
        }

        if let Some(pure_color) = meta.pure_color() {
            if let Some(cache) = &self.cache {
                cache.put_pure_color(&meta.file, pure_color, meta.w, meta.h);
            }
            self.last_stats.sync_loaded_tiles += 1;
            return TileRenderData {
                loaded: true,
                width: meta.w,
                height: meta.h,
                is_pure_color: true,
                pure_color,
                pixels: Bytes::new(),
            };
        }

        match codec::decode_rgba(&resource_dir.join(&meta.file)) {
            Ok(image) => {
                if let Some(cache) = &self.cache {
                    cache.put(&meta.file, image.pixels.clone(), image.width, image.height, 4);
                }
                self.last_stats.sync_loaded_tiles += 1;
                TileRenderData {
                    loaded: true,
                    width: image.width,
                    height: image.height,
                    is_pure_color: false,
                    pure_color: 0,
                    pixels: image.pixels,
                }
            }
            Err(e) => {
                error!(tile = %meta.file, error = %e, "failed to load tile");
                self.last_stats.failed_tiles += 1;
                TileRenderData::not_loaded()
            }
        }
    }
}
