//! Loader integration tests: dedup, priority, write-through.

use std::sync::{Arc, Mutex};

use tilepipe::cache::{CacheConfig, TileCache};
use tilepipe::loader::{LoadStatus, LoaderConfig, TileLoader};
use tilepipe::manifest::TileMeta;

use super::test_utils::{gradient_image, write_png};

fn test_cache() -> Arc<TileCache> {
    Arc::new(TileCache::with_config(CacheConfig {
        max_bytes: 32 * 1024 * 1024,
        max_tiles: 512,
    }))
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_requests_decode_once() {
    let dir = tempfile::tempdir().unwrap();
    let pixels = gradient_image(16, 16);
    write_png(&dir.path().join("tile.png"), &pixels, 16, 16);

    let loader = Arc::new(TileLoader::new(
        test_cache(),
        LoaderConfig {
            num_workers: 4,
            ..LoaderConfig::default()
        },
    ));
    loader.start();

    let meta = TileMeta::new(0, 0, 16, 16, "tile.png");
    let mut handles = Vec::new();
    for _ in 0..16 {
        let future = loader.load_tile(dir.path(), &meta, None);
        handles.push(tokio::spawn(future));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap());
    }

    // All sixteen callers observe the same completed tile.
    for result in &results {
        assert_eq!(result.status, LoadStatus::Completed);
        assert_eq!((result.width, result.height), (16, 16));
        assert_eq!(result.pixels, results[0].pixels);
    }

    // Exactly one decode ran; everyone else attached to it or hit the
    // cache it populated.
    let stats = loader.statistics();
    assert_eq!(stats.completed_loads, 1);
    assert_eq!(stats.failed_loads, 0);
    // Every call either registered a waiter or was a pre-satisfied hit.
    assert_eq!(stats.total_requests + stats.cache_hits, 16);

    loader.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_priority_order_served_highest_first() {
    let dir = tempfile::tempdir().unwrap();
    let pixels = gradient_image(4, 4);
    for name in ["low.png", "mid.png", "high.png"] {
        write_png(&dir.path().join(name), &pixels, 4, 4);
    }

    // Enqueue everything before any worker runs so the heap order is
    // what decides.
    let loader = Arc::new(TileLoader::new(
        test_cache(),
        LoaderConfig {
            num_workers: 1,
            ..LoaderConfig::default()
        },
    ));

    let order = Arc::new(Mutex::new(Vec::new()));
    for (name, priority) in [("low.png", 10), ("mid.png", 50), ("high.png", 200)] {
        let order = Arc::clone(&order);
        let meta = TileMeta::new(0, 0, 4, 4, name);
        loader.load_tile_with(dir.path(), &meta, Some(priority), move |result| {
            order.lock().unwrap().push(result.tile_id);
        });
    }
    assert_eq!(loader.queue_size(), 3);

    loader.start();
    // Wait for the queue to drain.
    for _ in 0..200 {
        if loader.statistics().completed_loads == 3 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    loader.stop();

    let order = order.lock().unwrap();
    assert_eq!(*order, vec!["high.png", "mid.png", "low.png"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_completed_loads_populate_cache() {
    let dir = tempfile::tempdir().unwrap();
    let pixels = gradient_image(8, 8);
    write_png(&dir.path().join("tile.png"), &pixels, 8, 8);

    let cache = test_cache();
    let loader = Arc::new(TileLoader::new(Arc::clone(&cache), LoaderConfig::default()));
    loader.start();

    let meta = TileMeta::new(0, 0, 8, 8, "tile.png");
    let result = loader.load_tile(dir.path(), &meta, None).await;
    assert_eq!(result.status, LoadStatus::Completed);

    let cached = cache.get("tile.png").expect("tile should be cached");
    assert_eq!(cached.pixels, result.pixels);

    // A second request is a pre-satisfied cache hit.
    let again = loader.load_tile(dir.path(), &meta, None).await;
    assert_eq!(again.status, LoadStatus::Completed);
    assert_eq!(loader.statistics().cache_hits, 1);
    assert_eq!(loader.statistics().completed_loads, 1);

    loader.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_pure_color_requests_skip_decode() {
    let cache = test_cache();
    let loader = Arc::new(TileLoader::new(Arc::clone(&cache), LoaderConfig::default()));
    loader.start();

    // No file exists for a pure-color token; the worker synthesizes it.
    let meta = TileMeta::new(0, 0, 32, 32, "00FF00FF");
    let result = loader.load_tile(std::path::Path::new("/nonexistent"), &meta, None).await;

    assert_eq!(result.status, LoadStatus::Completed);
    assert!(result.is_pure_color);
    assert_eq!(result.pure_color, 0x00FF00FF);
    assert!(result.pixels.is_empty());

    let cached = cache.get("00FF00FF").unwrap();
    assert!(cached.is_pure_color);

    loader.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_decode_reports_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("corrupt.png"), b"not a png").unwrap();

    let loader = Arc::new(TileLoader::new(test_cache(), LoaderConfig::default()));
    loader.start();

    let meta = TileMeta::new(0, 0, 8, 8, "corrupt.png");
    let result = loader.load_tile(dir.path(), &meta, None).await;

    assert_eq!(result.status, LoadStatus::Failed);
    assert!(result.error.is_some());
    assert_eq!(loader.statistics().failed_loads, 1);

    loader.stop();
}
