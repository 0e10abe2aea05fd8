//! Bounded in-memory tile cache.
//!
//! This module provides an LRU cache for decoded tiles, preventing
//! repeated decodes of frequently assembled regions.
//!
//! # Entries
//!
//! Tiles are cached by their manifest file token (unique within a
//! manifest). An entry is either a decoded RGBA buffer or a pure-color
//! record with no pixel payload. Entries are handed out as
//! [`Arc<CachedTile>`] handles: eviction removes a tile from the cache,
//! but a reader holding a handle keeps the payload alive.
//!
//! # Size-Based Eviction
//!
//! The cache tracks the total size of cached tiles in bytes and a tile
//! count, and evicts least-recently-used entries when either capacity
//! would be exceeded. All public operations are serialized by a single
//! mutex.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use bytes::Bytes;
use lru::LruCache;

/// Default cache capacity: 512MB.
pub const DEFAULT_CACHE_BYTES: usize = 512 * 1024 * 1024;

/// Default maximum number of cached tiles.
pub const DEFAULT_CACHE_TILES: usize = 10_000;

/// Cache capacity limits.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    /// Maximum total size of cached tiles in bytes.
    pub max_bytes: usize,
    /// Maximum number of cached tiles.
    pub max_tiles: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_CACHE_BYTES,
            max_tiles: DEFAULT_CACHE_TILES,
        }
    }
}

/// A cached tile payload: decoded pixels or a pure-color record.
#[derive(Debug, Clone)]
pub struct CachedTile {
    pub tile_id: String,
    /// Tightly packed RGBA pixels; empty for pure-color tiles.
    pub pixels: Bytes,
    pub width: i32,
    pub height: i32,
    pub channels: i32,
    /// Bytes charged against the cache limits for this entry.
    pub size_bytes: usize,
    pub is_pure_color: bool,
    pub pure_color: u32,
}

/// Running cache statistics. Totals reflect current contents; the
/// hit/miss/eviction counters are cumulative and survive `clear()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStatistics {
    pub total_bytes: usize,
    pub total_tiles: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStatistics {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            return 0.0;
        }
        self.hits as f64 / lookups as f64
    }
}

struct Entry {
    tile: Arc<CachedTile>,
    last_accessed: Instant,
}

struct CacheInner {
    entries: LruCache<String, Entry>,
    stats: CacheStatistics,
}

/// Thread-safe LRU tile cache bounded by bytes and tile count.
pub struct TileCache {
    config: CacheConfig,
    inner: Mutex<CacheInner>,
}

impl TileCache {
    /// Create a cache with the default limits (512MB, 10000 tiles).
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(CacheInner {
                entries: LruCache::unbounded(),
                stats: CacheStatistics::default(),
            }),
        }
    }

    /// Look up a tile, promoting it to most recently used.
    ///
    /// The returned handle stays valid even if the entry is evicted
    /// afterwards.
    pub fn get(&self, tile_id: &str) -> Option<Arc<CachedTile>> {
        let mut inner = self.lock();
        match inner.entries.get_mut(tile_id) {
            Some(entry) => {
                entry.last_accessed = Instant::now();
                let tile = Arc::clone(&entry.tile);
                inner.stats.hits += 1;
                Some(tile)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Insert a decoded pixel tile, displacing any entry with the same id
    /// and evicting LRU entries until both capacity limits hold.
    pub fn put(&self, tile_id: &str, pixels: Bytes, width: i32, height: i32, channels: i32) {
        let size_bytes = estimate_size(tile_id, pixels.len());
        let tile = CachedTile {
            tile_id: tile_id.to_string(),
            pixels,
            width,
            height,
            channels,
            size_bytes,
            is_pure_color: false,
            pure_color: 0,
        };
        self.insert(tile);
    }

    /// Insert a pure-color record: no pixel payload, only the packed
    /// RGBA value and the tile's dimensions.
    pub fn put_pure_color(&self, tile_id: &str, pure_color: u32, width: i32, height: i32) {
        let size_bytes = estimate_size(tile_id, 0);
        let tile = CachedTile {
            tile_id: tile_id.to_string(),
            pixels: Bytes::new(),
            width,
            height,
            channels: 4,
            size_bytes,
            is_pure_color: true,
            pure_color,
        };
        self.insert(tile);
    }

    /// Remove every entry whose id is not in `visible_ids`, counting each
    /// removal as an eviction.
    pub fn evict_out_of_viewport(&self, visible_ids: &[String]) {
        let visible: HashSet<&str> = visible_ids.iter().map(String::as_str).collect();
        let mut inner = self.lock();

        let doomed: Vec<String> = inner
            .entries
            .iter()
            .filter(|(id, _)| !visible.contains(id.as_str()))
            .map(|(id, _)| id.clone())
            .collect();

        for id in doomed {
            if let Some(entry) = inner.entries.pop(&id) {
                inner.stats.total_bytes -= entry.tile.size_bytes;
                inner.stats.total_tiles -= 1;
                inner.stats.evictions += 1;
            }
        }
    }

    /// Drop all entries and zero the totals. The cumulative counters are
    /// kept.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.stats.total_bytes = 0;
        inner.stats.total_tiles = 0;
    }

    /// Snapshot of the current statistics.
    pub fn statistics(&self) -> CacheStatistics {
        self.lock().stats
    }

    /// Current total size of cached tiles in bytes.
    pub fn memory_usage(&self) -> usize {
        self.lock().stats.total_bytes
    }

    /// Current number of cached tiles.
    pub fn tile_count(&self) -> usize {
        self.lock().stats.total_tiles
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn insert(&self, tile: CachedTile) {
        let mut inner = self.lock();

        // Displace an existing entry with the same id (not an eviction).
        if let Some(old) = inner.entries.pop(&tile.tile_id) {
            inner.stats.total_bytes -= old.tile.size_bytes;
            inner.stats.total_tiles -= 1;
        }

        // Evict from the LRU tail until the new entry fits both limits.
        while !inner.entries.is_empty()
            && (inner.stats.total_bytes + tile.size_bytes > self.config.max_bytes
                || inner.stats.total_tiles >= self.config.max_tiles)
        {
            if let Some((_, entry)) = inner.entries.pop_lru() {
                inner.stats.total_bytes -= entry.tile.size_bytes;
                inner.stats.total_tiles -= 1;
                inner.stats.evictions += 1;
            }
        }

        inner.stats.total_bytes += tile.size_bytes;
        inner.stats.total_tiles += 1;
        let id = tile.tile_id.clone();
        inner.entries.put(
            id,
            Entry {
                tile: Arc::new(tile),
                last_accessed: Instant::now(),
            },
        );
    }

    fn lock(&self) -> MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes charged for an entry: pixel payload plus fixed record overhead
/// plus the id string.
fn estimate_size(tile_id: &str, pixel_bytes: usize) -> usize {
    pixel_bytes + std::mem::size_of::<CachedTile>() + tile_id.len()
}
