//! Cache eviction behavior under byte, count and viewport pressure.

use std::mem;

use bytes::Bytes;
use tilepipe::cache::{CacheConfig, CachedTile, TileCache};

fn charge(id: &str, pixel_bytes: usize) -> usize {
    pixel_bytes + mem::size_of::<CachedTile>() + id.len()
}

#[test]
fn test_fourth_insert_evicts_lru() {
    // Room for exactly three one-byte-id tiles of 400 pixel bytes.
    let cache = TileCache::with_config(CacheConfig {
        max_bytes: 3 * charge("a", 400),
        max_tiles: 10,
    });

    for id in ["a", "b", "c"] {
        cache.put(id, Bytes::from(vec![0u8; 400]), 10, 10, 4);
    }
    cache.put("d", Bytes::from(vec![0u8; 400]), 10, 10, 4);

    // "a" was at the LRU tail and must be gone.
    assert!(cache.get("a").is_none());
    assert!(cache.get("d").is_some());

    let stats = cache.statistics();
    assert_eq!(stats.evictions, 1);
    // get("a") was a miss, get("d") a hit.
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[test]
fn test_viewport_eviction_keeps_only_visible() {
    let cache = TileCache::new();
    for id in ["a", "b", "c", "d", "e"] {
        cache.put(id, Bytes::from(vec![0u8; 64]), 4, 4, 4);
    }

    cache.evict_out_of_viewport(&["b".to_string(), "d".to_string()]);

    assert!(cache.get("b").is_some());
    assert!(cache.get("d").is_some());
    for id in ["a", "c", "e"] {
        assert!(cache.get(id).is_none(), "{id} should be evicted");
    }
    assert_eq!(cache.statistics().evictions, 3);
}

#[test]
fn test_accounting_invariant_through_churn() {
    let cache = TileCache::with_config(CacheConfig {
        max_bytes: 10 * charge("t_00", 256),
        max_tiles: 8,
    });

    for i in 0..50 {
        let id = format!("t_{:02}", i % 12);
        cache.put(&id, Bytes::from(vec![0u8; 256]), 8, 8, 4);
        if i % 3 == 0 {
            cache.get(&format!("t_{:02}", (i + 1) % 12));
        }
    }

    let stats = cache.statistics();
    assert!(stats.total_tiles <= 8);
    assert_eq!(stats.total_bytes, stats.total_tiles * charge("t_00", 256));
}

#[test]
fn test_mixed_pure_and_pixel_entries() {
    let cache = TileCache::new();
    cache.put("qtile_0_0_32x32.png", Bytes::from(vec![0u8; 4096]), 32, 32, 4);
    cache.put_pure_color("FF0000FF", 0xFF0000FF, 32, 32);

    let pixel = cache.get("qtile_0_0_32x32.png").unwrap();
    let pure = cache.get("FF0000FF").unwrap();

    assert!(!pixel.is_pure_color);
    assert!(pure.is_pure_color);
    assert!(pure.pixels.is_empty());
    // Pure-color entries cost only overhead, not pixel bytes.
    assert!(pure.size_bytes < pixel.size_bytes);
    assert_eq!(
        cache.statistics().total_bytes,
        pixel.size_bytes + pure.size_bytes
    );
}
