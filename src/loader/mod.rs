//! Concurrent tile loader.
//!
//! A fixed pool of worker threads drains a priority queue of decode
//! requests and writes results through to the [`TileCache`]. Callers get
//! completion either as a future or as a callback; both are fed from the
//! same per-tile waiter list, which doubles as the dedup structure: a
//! request for a tile that is already in flight attaches another waiter
//! instead of enqueueing a second decode.
//!
//! # Scheduling
//!
//! The queue is a max-heap on the request's `priority` integer: the
//! largest priority is served first. Workers block on a condition
//! variable while the queue is empty and exit when the loader stops.
//!
//! # Queue overflow
//!
//! An enqueue against a full queue fails the request synchronously:
//! every waiter registered for that tile id completes with a `Failed`
//! result carrying "load queue full". Futures always resolve.

use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use bytes::Bytes;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::cache::{CachedTile, TileCache};
use crate::index::TileIndex;
use crate::manifest::{TileMeta, Viewport};
use crate::raster::{codec, color};

/// Base priority for directional preloading.
pub const DIRECTIONAL_PRELOAD_PRIORITY: i32 = 25;

/// Worker pool configuration.
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    pub num_workers: usize,
    /// Requests beyond this queue depth fail with "load queue full".
    pub max_queue_size: usize,
    /// Priority used when the caller does not pass one.
    pub default_priority: i32,
    pub enable_preloading: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            max_queue_size: 1000,
            default_priority: 100,
            enable_preloading: true,
        }
    }
}

/// Lifecycle of one load request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Pending,
    Loading,
    Completed,
    Failed,
}

/// Outcome of a load, delivered to futures and callbacks.
#[derive(Debug, Clone)]
pub struct LoadResult {
    pub tile_id: String,
    pub status: LoadStatus,
    /// Tightly packed RGBA pixels; empty for pure-color tiles and failures.
    pub pixels: Bytes,
    pub width: i32,
    pub height: i32,
    pub channels: i32,
    pub is_pure_color: bool,
    pub pure_color: u32,
    pub error: Option<String>,
}

impl LoadResult {
    pub fn is_completed(&self) -> bool {
        self.status == LoadStatus::Completed
    }

    fn failed(tile_id: &str, message: impl Into<String>) -> Self {
        Self {
            tile_id: tile_id.to_string(),
            status: LoadStatus::Failed,
            pixels: Bytes::new(),
            width: 0,
            height: 0,
            channels: 0,
            is_pure_color: false,
            pure_color: 0,
            error: Some(message.into()),
        }
    }

    fn from_cached(tile: &CachedTile) -> Self {
        Self {
            tile_id: tile.tile_id.clone(),
            status: LoadStatus::Completed,
            pixels: tile.pixels.clone(),
            width: tile.width,
            height: tile.height,
            channels: tile.channels,
            is_pure_color: tile.is_pure_color,
            pure_color: tile.pure_color,
            error: None,
        }
    }
}

/// Loader counters. Advisory: read without synchronizing against
/// in-flight work.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoaderStatistics {
    pub total_requests: u64,
    pub completed_loads: u64,
    pub failed_loads: u64,
    pub cache_hits: u64,
    pub queued_requests: u64,
    pub active_loads: u64,
}

impl LoaderStatistics {
    pub fn success_rate(&self) -> f64 {
        let finished = self.completed_loads + self.failed_loads;
        if finished == 0 {
            return 0.0;
        }
        self.completed_loads as f64 / finished as f64
    }
}

/// A queued decode request. Ordered by priority only; the heap pops the
/// largest priority first.
#[derive(Debug, Clone)]
struct LoadRequest {
    tile_id: String,
    file_path: PathBuf,
    priority: i32,
    is_pure_color: bool,
    pure_color: u32,
    width: i32,
    height: i32,
}

impl LoadRequest {
    fn from_meta(resource_dir: &Path, meta: &TileMeta, priority: i32) -> Self {
        let is_pure_color = color::is_color_token(&meta.file);
        Self {
            tile_id: meta.file.clone(),
            file_path: resource_dir.join(&meta.file),
            priority,
            is_pure_color,
            pure_color: meta.pure_color().unwrap_or(0),
            width: meta.w,
            height: meta.h,
        }
    }
}

impl PartialEq for LoadRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}

impl Eq for LoadRequest {}

impl PartialOrd for LoadRequest {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LoadRequest {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority.cmp(&other.priority)
    }
}

/// One registered completion: a future's sender or a boxed callback.
enum Waiter {
    Future(oneshot::Sender<LoadResult>),
    Callback(Box<dyn FnOnce(LoadResult) + Send + 'static>),
}

#[derive(Default)]
struct Counters {
    total_requests: AtomicU64,
    completed_loads: AtomicU64,
    failed_loads: AtomicU64,
    cache_hits: AtomicU64,
    queued_requests: AtomicU64,
    active_loads: AtomicU64,
}

struct Shared {
    cache: Arc<TileCache>,
    config: LoaderConfig,
    queue: Mutex<BinaryHeap<LoadRequest>>,
    queue_cv: Condvar,
    callbacks: Mutex<HashMap<String, Vec<Waiter>>>,
    status: Mutex<HashMap<String, LoadStatus>>,
    running: AtomicBool,
    counters: Counters,
}

impl Shared {
    fn lock_queue(&self) -> MutexGuard<'_, BinaryHeap<LoadRequest>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_callbacks(&self) -> MutexGuard<'_, HashMap<String, Vec<Waiter>>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_status(&self) -> MutexGuard<'_, HashMap<String, LoadStatus>> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, tile_id: &str, status: LoadStatus) {
        self.lock_status().insert(tile_id.to_string(), status);
    }

    fn is_in_flight(&self, tile_id: &str) -> bool {
        matches!(
            self.lock_status().get(tile_id),
            Some(LoadStatus::Pending | LoadStatus::Loading)
        )
    }

    /// Take the waiters for a finished tile and complete them. No loader
    /// lock is held while a callback runs; callbacks may re-enter the
    /// loader.
    fn notify(&self, result: LoadResult) {
        let waiters = self.lock_callbacks().remove(&result.tile_id).unwrap_or_default();
        for waiter in waiters {
            deliver(waiter, result.clone());
        }
    }
}

fn deliver(waiter: Waiter, result: LoadResult) {
    match waiter {
        Waiter::Future(tx) => {
            // The receiver may have been dropped; nothing to do then.
            let _ = tx.send(result);
        }
        Waiter::Callback(callback) => {
            let tile_id = result.tile_id.clone();
            if std::panic::catch_unwind(AssertUnwindSafe(move || callback(result))).is_err() {
                error!(%tile_id, "tile load callback panicked");
            }
        }
    }
}

/// Priority-scheduled tile loader backed by a worker thread pool.
pub struct TileLoader {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TileLoader {
    pub fn new(cache: Arc<TileCache>, config: LoaderConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                cache,
                config,
                queue: Mutex::new(BinaryHeap::new()),
                queue_cv: Condvar::new(),
                callbacks: Mutex::new(HashMap::new()),
                status: Mutex::new(HashMap::new()),
                running: AtomicBool::new(false),
                counters: Counters::default(),
            }),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker pool. Idempotent.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..self.shared.config.num_workers {
            let shared = Arc::clone(&self.shared);
            workers.push(std::thread::spawn(move || worker_loop(shared)));
        }
        debug!(workers = self.shared.config.num_workers, "tile loader started");
    }

    /// Signal workers to stop and join them. Idempotent. In-flight
    /// decodes finish; queued requests stay queued for a later `start`.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.queue_cv.notify_all();
        let workers: Vec<_> = {
            let mut guard = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            guard.drain(..).collect()
        };
        for worker in workers {
            let _ = worker.join();
        }
        debug!("tile loader stopped");
    }

    /// Request a tile, returning a future for its [`LoadResult`].
    ///
    /// A cache hit resolves immediately. Otherwise the request is
    /// enqueued (or attached to an in-flight load of the same tile)
    /// before this function returns; the future only waits for
    /// completion.
    pub fn load_tile(
        &self,
        resource_dir: &Path,
        meta: &TileMeta,
        priority: Option<i32>,
    ) -> impl Future<Output = LoadResult> + Send + 'static {
        enum Pending {
            Ready(LoadResult),
            Wait(oneshot::Receiver<LoadResult>),
        }

        let tile_id = meta.file.clone();
        let pending = if let Some(cached) = self.shared.cache.get(&tile_id) {
            self.shared.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            Pending::Ready(LoadResult::from_cached(&cached))
        } else {
            let (tx, rx) = oneshot::channel();
            self.submit(resource_dir, meta, priority, Waiter::Future(tx));
            Pending::Wait(rx)
        };

        async move {
            match pending {
                Pending::Ready(result) => result,
                Pending::Wait(rx) => rx
                    .await
                    .unwrap_or_else(|_| LoadResult::failed(&tile_id, "tile loader shut down")),
            }
        }
    }

    /// Request a tile, delivering the result through `callback` instead
    /// of a future. A cache hit invokes the callback inline.
    pub fn load_tile_with(
        &self,
        resource_dir: &Path,
        meta: &TileMeta,
        priority: Option<i32>,
        callback: impl FnOnce(LoadResult) + Send + 'static,
    ) {
        if let Some(cached) = self.shared.cache.get(&meta.file) {
            self.shared.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            callback(LoadResult::from_cached(&cached));
            return;
        }
        self.submit(resource_dir, meta, priority, Waiter::Callback(Box::new(callback)));
    }

    /// Fire-and-forget enqueue of every tile not already cached or in
    /// flight. No waiters are registered; results land in the cache.
    pub fn preload_viewport_tiles(&self, tiles: &[TileMeta], resource_dir: &Path, base_priority: i32) {
        if !self.shared.config.enable_preloading {
            return;
        }

        for meta in tiles {
            if self.shared.cache.get(&meta.file).is_some() || self.is_loading(&meta.file) {
                continue;
            }

            let request = LoadRequest::from_meta(resource_dir, meta, base_priority);
            let enqueued = {
                let mut queue = self.shared.lock_queue();
                if queue.len() < self.shared.config.max_queue_size {
                    queue.push(request);
                    true
                } else {
                    false
                }
            };
            if enqueued {
                self.shared.counters.queued_requests.fetch_add(1, Ordering::Relaxed);
                self.shared.set_status(&meta.file, LoadStatus::Pending);
            }
        }

        self.shared.queue_cv.notify_all();
    }

    /// Preload the viewport expanded along a movement vector: the
    /// expansion is `|delta| + half the viewport extent` on each axis.
    pub fn preload_by_direction(
        &self,
        current: &Viewport,
        movement: &Viewport,
        index: &dyn TileIndex,
        resource_dir: &Path,
    ) {
        if !self.shared.config.enable_preloading {
            return;
        }

        let expand_x = movement.x.abs() + current.w / 2;
        let expand_y = movement.y.abs() + current.h / 2;
        let expanded = Viewport::new(
            current.x - expand_x,
            current.y - expand_y,
            current.w + 2 * expand_x,
            current.h + 2 * expand_y,
        );

        let tiles = index.query(&expanded);
        self.preload_viewport_tiles(&tiles, resource_dir, DIRECTIONAL_PRELOAD_PRIORITY);
    }

    /// Drop every request that has not been picked up by a worker.
    /// In-flight decodes are not interrupted.
    pub fn cancel_pending_requests(&self) {
        let mut queue = self.shared.lock_queue();
        queue.clear();
        self.shared.counters.queued_requests.store(0, Ordering::Relaxed);
    }

    /// Whether a request for this tile is queued or being decoded.
    pub fn is_loading(&self, tile_id: &str) -> bool {
        self.shared.is_in_flight(tile_id)
    }

    /// Number of requests waiting in the queue.
    pub fn queue_size(&self) -> usize {
        self.shared.lock_queue().len()
    }

    /// Snapshot of the loader counters.
    pub fn statistics(&self) -> LoaderStatistics {
        let c = &self.shared.counters;
        LoaderStatistics {
            total_requests: c.total_requests.load(Ordering::Relaxed),
            completed_loads: c.completed_loads.load(Ordering::Relaxed),
            failed_loads: c.failed_loads.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            queued_requests: c.queued_requests.load(Ordering::Relaxed),
            active_loads: c.active_loads.load(Ordering::Relaxed),
        }
    }

    /// Distance-weighted priority: tiles near the viewport center sort
    /// ahead of tiles at the fringe loaded with the same base.
    pub fn priority_for(meta: &TileMeta, viewport: &Viewport, base_priority: i32) -> i32 {
        let center_x = viewport.x + viewport.w / 2;
        let center_y = viewport.y + viewport.h / 2;
        let tile_center_x = meta.x + meta.w / 2;
        let tile_center_y = meta.y + meta.h / 2;

        let dx = f64::from(tile_center_x - center_x);
        let dy = f64::from(tile_center_y - center_y);
        let distance = (dx * dx + dy * dy).sqrt();

        base_priority + (distance / 10.0) as i32
    }

    /// Register a waiter and enqueue the request unless the tile is
    /// already in flight (then the waiter just attaches to it).
    fn submit(&self, resource_dir: &Path, meta: &TileMeta, priority: Option<i32>, waiter: Waiter) {
        let shared = &self.shared;
        let tile_id = meta.file.as_str();
        shared.counters.total_requests.fetch_add(1, Ordering::Relaxed);

        let first = {
            let mut callbacks = shared.lock_callbacks();
            let in_flight = shared.is_in_flight(tile_id);
            let waiters = callbacks.entry(tile_id.to_string()).or_default();
            let first = waiters.is_empty() && !in_flight;
            waiters.push(waiter);
            first
        };
        if !first {
            return;
        }

        let priority = priority.unwrap_or(shared.config.default_priority);
        let request = LoadRequest::from_meta(resource_dir, meta, priority);

        let enqueued = {
            let mut queue = shared.lock_queue();
            if queue.len() < shared.config.max_queue_size {
                queue.push(request);
                true
            } else {
                false
            }
        };

        if enqueued {
            shared.counters.queued_requests.fetch_add(1, Ordering::Relaxed);
            shared.set_status(tile_id, LoadStatus::Pending);
            shared.queue_cv.notify_one();
        } else {
            warn!(tile_id, "load queue full, failing request");
            shared.set_status(tile_id, LoadStatus::Failed);
            shared.notify(LoadResult::failed(tile_id, "load queue full"));
        }
    }
}

impl Drop for TileLoader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(shared: Arc<Shared>) {
    loop {
        let request = {
            let mut queue = shared.lock_queue();
            loop {
                if !shared.running.load(Ordering::Acquire) {
                    return;
                }
                if let Some(request) = queue.pop() {
                    // Under the queue lock so a concurrent cancel cannot
                    // reset the counter between pop and decrement.
                    shared.counters.queued_requests.fetch_sub(1, Ordering::Relaxed);
                    break request;
                }
                queue = shared.queue_cv.wait(queue).unwrap_or_else(PoisonError::into_inner);
            }
        };

        shared.counters.active_loads.fetch_add(1, Ordering::Relaxed);
        shared.set_status(&request.tile_id, LoadStatus::Loading);

        let result = execute_request(&request);

        if result.is_completed() {
            if result.is_pure_color {
                shared.cache.put_pure_color(
                    &result.tile_id,
                    result.pure_color,
                    result.width,
                    result.height,
                );
            } else {
                shared.cache.put(
                    &result.tile_id,
                    result.pixels.clone(),
                    result.width,
                    result.height,
                    result.channels,
                );
            }
            shared.counters.completed_loads.fetch_add(1, Ordering::Relaxed);
        } else {
            shared.counters.failed_loads.fetch_add(1, Ordering::Relaxed);
        }

        shared.set_status(&request.tile_id, result.status);
        shared.notify(result);
        shared.counters.active_loads.fetch_sub(1, Ordering::Relaxed);
    }
}

fn execute_request(request: &LoadRequest) -> LoadResult {
    if request.is_pure_color {
        return LoadResult {
            tile_id: request.tile_id.clone(),
            status: LoadStatus::Completed,
            pixels: Bytes::new(),
            width: request.width,
            height: request.height,
            channels: 4,
            is_pure_color: true,
            pure_color: request.pure_color,
            error: None,
        };
    }

    match codec::decode_rgba(&request.file_path) {
        Ok(image) => LoadResult {
            tile_id: request.tile_id.clone(),
            status: LoadStatus::Completed,
            pixels: image.pixels,
            width: image.width,
            height: image.height,
            channels: 4,
            is_pure_color: false,
            pure_color: 0,
            error: None,
        },
        Err(e) => LoadResult::failed(&request.tile_id, e.to_string()),
    }
}
