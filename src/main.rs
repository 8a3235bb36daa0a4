//! wsi-tiler - Tile selection and extraction for Whole Slide Images.
//!
//! This binary wires the CLI to the extraction engine and prints a JSON
//! report of every run on stdout.

use clap::Parser;
use serde::Serialize;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_tiler::{
    config::{Cli, Command, CountConfig, GridConfig, MaskArgs, SlideArgs},
    extract::{ExtractionRequest, FileTileSink, TileEncoder, TileExtractor},
    grid::TileGrid,
    slide::{ImageSlide, RasterMaskSource, RegionReader},
    store::TileMetricsStore,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Grid(config) => run_grid(config),
        Command::Annotated(config) => {
            let result = config.validate().map(|_| config.to_request());
            run_extraction(&config.slide, Some(&config.masks), result)
        }
        Command::Segmentation(config) => {
            let result = config.validate().map(|_| config.to_request());
            run_extraction(&config.slide, Some(&config.masks), result)
        }
        Command::Unannotated(config) => {
            let result = config.validate().map(|_| config.to_request());
            run_extraction(&config.slide, None, result)
        }
        Command::Random(config) => {
            let result = config.validate().map(|_| config.to_request());
            run_extraction(&config.slide, None, result)
        }
        Command::Count(config) => run_count(config),
    }
}

// =============================================================================
// Grid Command
// =============================================================================

fn run_grid(config: GridConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let slide = match ImageSlide::open(&config.slide) {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to open slide: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some(info) = slide.level_info(config.level) else {
        error!(
            "Level {} out of range, slide has {} level(s)",
            config.level,
            slide.level_count()
        );
        return ExitCode::FAILURE;
    };

    let grid = match TileGrid::for_level(config.level, &info, config.tile_size) {
        Ok(grid) if config.drop_partial => grid.without_partial_tiles(),
        Ok(grid) => grid,
        Err(e) => {
            error!("Failed to build tile grid: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let store = TileMetricsStore::from_grid(grid);
    info!(
        "Tiled {} at level {}: {} columns x {} rows ({} tiles)",
        slide.slide_id(),
        config.level,
        store.grid().columns(),
        store.grid().rows(),
        store.len()
    );

    if let Err(e) = store.save(&config.output) {
        error!("Failed to write metrics store: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Metrics store written to {}", config.output.display());
    ExitCode::SUCCESS
}

// =============================================================================
// Extraction Commands
// =============================================================================

fn run_extraction(
    args: &SlideArgs,
    masks: Option<&MaskArgs>,
    request: Result<ExtractionRequest, String>,
) -> ExitCode {
    init_logging(args.verbose);

    let request = match request {
        Ok(request) => request,
        Err(e) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let Some((slide, store)) = open_inputs(args) else {
        return ExitCode::FAILURE;
    };

    let mask_source = match masks.map(|m| RasterMaskSource::open(&m.masks)) {
        None => RasterMaskSource::new(),
        Some(Ok(source)) => source,
        Some(Err(e)) => {
            error!("Failed to open annotation masks: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!(
        "Extracting from {} in {} mode into {}",
        slide.slide_id(),
        request.mode.name(),
        request.output_dir.display()
    );

    let extractor = TileExtractor::new(&slide, &store)
        .with_masks(&mask_source)
        .with_encoder(TileEncoder::new(args.jpeg_quality));

    match extractor.extract(&request, &mut FileTileSink) {
        Ok(report) => {
            info!("Wrote {} tiles", report.tiles_written);
            print_json(&report)
        }
        Err(e) => {
            error!("Extraction failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Count Command
// =============================================================================

#[derive(Serialize)]
struct CandidateCount<'a> {
    class_name: &'a str,
    candidates: Option<usize>,
}

fn run_count(config: CountConfig) -> ExitCode {
    init_logging(config.slide.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let Some((slide, store)) = open_inputs(&config.slide) else {
        return ExitCode::FAILURE;
    };

    let request = config.to_request();
    match TileExtractor::new(&slide, &store).count_class_candidates(&request, &config.class_name) {
        Ok(candidates) => print_json(&CandidateCount {
            class_name: &config.class_name,
            candidates,
        }),
        Err(e) => {
            error!("Count failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn open_inputs(args: &SlideArgs) -> Option<(ImageSlide, TileMetricsStore)> {
    let slide = match ImageSlide::open(&args.slide) {
        Ok(slide) => slide,
        Err(e) => {
            error!("Failed to open slide: {}", e);
            return None;
        }
    };

    let store = match TileMetricsStore::load(&args.metrics) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to load metrics store: {}", e);
            return None;
        }
    };

    info!(
        "Loaded {} ({} tiles, {} annotated classes)",
        slide.slide_id(),
        store.len(),
        store.annotation_classes().len()
    );
    Some((slide, store))
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Failed to serialize report: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_tiler=debug"
    } else {
        "wsi_tiler=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer().with_writer(std::io::stderr),
        )
        .init();
}
