//! tilepipe - quadtree map tile pipeline CLI.
//!
//! `split` turns a raster map into a tile directory plus manifest;
//! `view` assembles a viewport from it. Exit codes: 0 success, 1 load or
//! query failure, 2 assemble or save failure, 3 unexpected error.

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tilepipe::{
    assemble::{AssemblerConfig, ViewportAssembler},
    cache::{CacheConfig, TileCache},
    config::{Cli, Command, SplitArgs, ViewArgs},
    error::AssembleError,
    index::{IndexStatistics, LinearIndex, QuadTreeIndex, TileIndex},
    loader::{LoaderConfig, TileLoader},
    manifest::{TileManifest, Viewport},
    split::{split_fixed, split_quadtree, SplitConfig},
};

/// Cache limits for the enhanced `view` pipeline.
const VIEW_CACHE_CONFIG: CacheConfig = CacheConfig {
    max_bytes: 256 * 1024 * 1024,
    max_tiles: 5000,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Split(args) => run_split(args),
        Command::View(args) => run_view(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose { "tilepipe=debug" } else { "tilepipe=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_split(args: SplitArgs) -> Result<(), u8> {
    if let Err(e) = args.validate() {
        error!("invalid arguments: {e}");
        return Err(1);
    }

    if args.compare {
        return run_split_compare(&args);
    }

    prepare_output_dir(&args.output)?;

    let tiles = if args.quadtree {
        let config = SplitConfig {
            max_depth: args.max_depth,
            min_tile_size: args.min_tile_size,
            color_tolerance: args.color_tolerance,
        };
        info!(
            max_depth = config.max_depth,
            min_tile_size = config.min_tile_size,
            color_tolerance = config.color_tolerance,
            "using quadtree splitting"
        );
        split_quadtree(&args.input, &args.output, &config).map_err(|e| {
            error!("split failed: {e}");
            1u8
        })?
    } else {
        info!(tile_w = args.tile.w, tile_h = args.tile.h, "using fixed-size splitting");
        split_fixed(&args.input, &args.output, args.tile.w, args.tile.h).map_err(|e| {
            error!("split failed: {e}");
            1u8
        })?
    };

    let meta_path = args.meta_path(&args.output);
    let manifest = TileManifest::from_tiles(tiles);
    manifest.save(&meta_path).map_err(|e| {
        error!("{e}");
        2u8
    })?;

    println!(
        "Split completed: {} tiles. Meta: {}",
        manifest.len(),
        meta_path.display()
    );
    Ok(())
}

/// Run both splitters side by side and report the tile-count reduction.
fn run_split_compare(args: &SplitArgs) -> Result<(), u8> {
    let fixed_dir = suffixed_dir(&args.output, "_fixed");
    let quad_dir = suffixed_dir(&args.output, "_quadtree");

    prepare_output_dir(&fixed_dir)?;
    let fixed_tiles = split_fixed(&args.input, &fixed_dir, args.tile.w, args.tile.h)
        .map_err(|e| {
            error!("fixed split failed: {e}");
            1u8
        })?;
    let fixed_manifest = TileManifest::from_tiles(fixed_tiles);
    fixed_manifest
        .save(&fixed_dir.join(tilepipe::config::MANIFEST_FILE))
        .map_err(|e| {
            error!("{e}");
            2u8
        })?;

    prepare_output_dir(&quad_dir)?;
    let config = SplitConfig {
        max_depth: args.max_depth,
        min_tile_size: args.min_tile_size,
        color_tolerance: args.color_tolerance,
    };
    let quad_tiles = split_quadtree(&args.input, &quad_dir, &config).map_err(|e| {
        error!("quadtree split failed: {e}");
        1u8
    })?;
    let quad_manifest = TileManifest::from_tiles(quad_tiles);
    quad_manifest
        .save(&quad_dir.join(tilepipe::config::MANIFEST_FILE))
        .map_err(|e| {
            error!("{e}");
            2u8
        })?;

    println!("Fixed-size tiles: {}", fixed_manifest.len());
    println!("Quad-tree tiles: {}", quad_manifest.len());
    if fixed_manifest.len() > 0 {
        println!(
            "Reduction ratio: {:.1}%",
            quad_manifest.len() as f64 / fixed_manifest.len() as f64 * 100.0
        );
    }
    Ok(())
}

async fn run_view(args: ViewArgs) -> Result<(), u8> {
    if let Err(e) = args.validate() {
        error!("invalid arguments: {e}");
        return Err(1);
    }

    let meta_path = args.meta_path();
    let (index, index_stats): (Box<dyn TileIndex>, Option<IndexStatistics>) = if args.quadtree {
        let index = QuadTreeIndex::load(&meta_path).map_err(|e| {
            error!("{e}");
            1u8
        })?;
        let stats = index.statistics();
        (Box::new(index), Some(stats))
    } else {
        let index = LinearIndex::load(&meta_path).map_err(|e| {
            error!("{e}");
            1u8
        })?;
        (Box::new(index), None)
    };

    let vp = Viewport::from_bottom_left(
        args.pos.x,
        args.pos.y,
        args.size.w,
        args.size.h,
        index.map_height(),
    );

    let mut assembler = build_assembler(&args);
    let result = run_assembly(&mut assembler, index.as_ref(), &vp, &args).await;

    if args.stats {
        print_statistics(&assembler, index_stats.as_ref());
    }

    if let Some(loader) = assembler.loader() {
        loader.stop();
    }

    result
}

fn build_assembler(args: &ViewArgs) -> ViewportAssembler {
    if !args.enhanced {
        // Plain pipeline: direct synchronous decodes, no cache.
        return ViewportAssembler::new(
            None,
            None,
            AssemblerConfig {
                enable_async_loading: false,
                enable_caching: false,
                enable_preloading: false,
                ..AssemblerConfig::default()
            },
        );
    }

    let cache = if args.no_cache {
        None
    } else {
        Some(Arc::new(TileCache::with_config(VIEW_CACHE_CONFIG)))
    };

    let loader = if args.no_async {
        None
    } else {
        cache.as_ref().map(|cache| {
            let loader = Arc::new(TileLoader::new(
                Arc::clone(cache),
                LoaderConfig {
                    num_workers: 2,
                    max_queue_size: 500,
                    ..LoaderConfig::default()
                },
            ));
            loader.start();
            loader
        })
    };

    ViewportAssembler::new(
        cache,
        loader,
        AssemblerConfig {
            enable_async_loading: !args.no_async,
            enable_caching: !args.no_cache,
            enable_preloading: true,
            ..AssemblerConfig::default()
        },
    )
}

async fn run_assembly(
    assembler: &mut ViewportAssembler,
    index: &dyn TileIndex,
    vp: &Viewport,
    args: &ViewArgs,
) -> Result<(), u8> {
    let resource_dir: &Path = &args.input;

    match &args.output {
        Some(out_path) => {
            assembler
                .assemble(index, vp, resource_dir, out_path)
                .await
                .map_err(|e| {
                    error!("assemble failed: {e}");
                    2u8
                })?;
            println!("Assemble OK -> {}", out_path.display());
            Ok(())
        }
        None => {
            let hex = assembler
                .assemble_to_hex(index, vp, resource_dir)
                .await
                .map_err(|e| {
                    match e {
                        AssembleError::EmptyViewport { .. } => error!("{e}"),
                        other => error!("assemble failed: {other}"),
                    }
                    1u8
                })?;
            println!("{hex}");
            Ok(())
        }
    }
}

fn print_statistics(assembler: &ViewportAssembler, index_stats: Option<&IndexStatistics>) {
    match assembler.cache() {
        Some(cache) => {
            let stats = cache.statistics();
            eprintln!("=== Cache Statistics ===");
            eprintln!("Memory usage: {} KB", stats.total_bytes / 1024);
            eprintln!("Total tiles: {}", stats.total_tiles);
            eprintln!("Cache hits: {}", stats.hits);
            eprintln!("Cache misses: {}", stats.misses);
            eprintln!("Hit rate: {:.1}%", stats.hit_rate() * 100.0);
            eprintln!("Evicted tiles: {}", stats.evictions);
        }
        None => eprintln!("Cache not enabled"),
    }

    match assembler.loader() {
        Some(loader) => {
            let stats = loader.statistics();
            eprintln!("=== Loader Statistics ===");
            eprintln!("Total requests: {}", stats.total_requests);
            eprintln!("Completed loads: {}", stats.completed_loads);
            eprintln!("Failed loads: {}", stats.failed_loads);
            eprintln!("Cache hits: {}", stats.cache_hits);
            eprintln!("Queued requests: {}", stats.queued_requests);
            eprintln!("Active loads: {}", stats.active_loads);
            eprintln!("Success rate: {:.1}%", stats.success_rate() * 100.0);
        }
        None => eprintln!("Async loader not enabled"),
    }

    if let Some(stats) = index_stats {
        eprintln!("=== Index Statistics ===");
        eprintln!("Total nodes: {}", stats.total_nodes);
        eprintln!("Leaf nodes: {}", stats.leaf_nodes);
        eprintln!("Max depth: {}", stats.max_depth);
        eprintln!("Avg tiles per leaf: {:.2}", stats.avg_tiles_per_leaf);
    }

    let assembly = assembler.last_stats();
    eprintln!("=== Assembly Statistics ===");
    eprintln!("Total tiles: {}", assembly.total_tiles);
    eprintln!("Cached tiles: {}", assembly.cached_tiles);
    eprintln!("Async loaded: {}", assembly.async_loaded_tiles);
    eprintln!("Sync loaded: {}", assembly.sync_loaded_tiles);
    eprintln!("Failed tiles: {}", assembly.failed_tiles);
    eprintln!("Cache hit rate: {:.1}%", assembly.cache_hit_rate() * 100.0);
    eprintln!("Assembly time: {:.2} ms", assembly.assembly_time_ms);
}

/// Clear an existing output directory or create a fresh one.
fn prepare_output_dir(dir: &Path) -> Result<(), u8> {
    let result = (|| -> std::io::Result<()> {
        if dir.exists() {
            if !dir.is_dir() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "exists but is not a directory",
                ));
            }
            for entry in std::fs::read_dir(dir)? {
                let path = entry?.path();
                if path.is_dir() {
                    std::fs::remove_dir_all(&path)?;
                } else {
                    std::fs::remove_file(&path)?;
                }
            }
        } else {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    })();

    result.map_err(|e| {
        error!("failed to prepare output directory {}: {e}", dir.display());
        2u8
    })
}

fn suffixed_dir(dir: &Path, suffix: &str) -> std::path::PathBuf {
    let mut name = dir.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    dir.with_file_name(name)
}
