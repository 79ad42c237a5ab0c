//! # Vineyard Survey Runner
//!
//! Batch entry point: builds (or restores) the parcel grid from an
//! orthomosaic, turns recorded drone frames into observations, assigns them
//! to parcels and exports the per-parcel survey.

mod config;

use crate::config::RunnerConfig;

use anyhow::{Context, bail, ensure};
use image::{DynamicImage, RgbImage};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use vineyard_core::{AffineTransform, Observation};
use vineyard_grid::{GridEngine, GridState, Orthomosaic, ParcelGrid};
use vineyard_locator::report::{write_csv_file, write_json_file};
use vineyard_locator::{
    CoordinateMapper, CoordinateTable, FrameRecord, PlantLocator, RecordedDetections, StrategyKind,
};

fn main() -> anyhow::Result<()> {
    init_logging();

    info!("🍇 Starting Vineyard Parcel Survey v{}", env!("CARGO_PKG_VERSION"));
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = RunnerConfig::load(config_path.as_deref())?;
    info!("Configuration loaded");
    info!("   Row separation: {} px", config.grid.row_separation);
    info!("   Parcel length: {} px", config.grid.parcel_length);
    info!("   Heading: {}°", config.locator.heading_deg);
    info!("   Strategy: {:?}", config.locator.strategy);

    let started = Instant::now();
    let ortho = load_orthomosaic(&config)?;
    let engine = GridEngine::with_config(config.grid.clone())?;
    let grid = load_or_build_grid(&engine, &ortho, &config)?;

    std::fs::create_dir_all(&config.output.dir)
        .with_context(|| format!("failed to create {}", config.output.dir.display()))?;
    if let Some(name) = &config.output.grid_state {
        GridState::from_grid(&grid).save_json(config.output.path(name))?;
    }

    let mapper = load_mapper(config.input.coordinate_table.as_deref(), config.transform, &ortho)?;

    let locator = match config.locator.strategy {
        StrategyKind::Analytic => PlantLocator::new(config.locator.clone(), grid, mapper)?,
        StrategyKind::Raster => {
            let smoothed = engine.smooth_mask(ortho.mask());
            PlantLocator::with_mask(config.locator.clone(), grid, mapper, &smoothed)?
        }
    };

    let observations = load_observations(&locator, config.input.frames.as_deref())?;
    let report = locator.assign(&observations);
    let records = locator.parcel_records(&report, &observations);

    write_csv_file(config.output.path(&config.output.parcels_csv), &records)?;
    write_json_file(config.output.path(&config.output.parcels_json), &records)?;
    write_json_file(config.output.path(&config.output.report_json), &report)?;

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("✅ Survey complete in {} ms", started.elapsed().as_millis());
    info!("   Parcels: {}", records.len());
    info!("   Assigned: {}/{}", report.stats.assigned, report.stats.observations);
    for (reason, count) in &report.stats.unresolved {
        info!("   {reason}: {count}");
    }
    info!("   Output: {}", config.output.dir.display());
    Ok(())
}

/// Initialize logging with tracing
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,vineyard_grid=debug,vineyard_locator=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(filter)
        .init();
}

fn open_image(path: &Path) -> anyhow::Result<DynamicImage> {
    image::open(path).with_context(|| format!("failed to open image {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file)).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_orthomosaic(config: &RunnerConfig) -> anyhow::Result<Orthomosaic> {
    let bands = config
        .input
        .bands
        .as_deref()
        .map(|path| open_image(path).map(|image| image.to_rgb8()))
        .transpose()?;
    let mask = config
        .input
        .mask
        .as_deref()
        .map(|path| open_image(path).map(|image| image.to_luma8()))
        .transpose()?;

    let ortho = match (bands, mask) {
        (Some(bands), Some(mask)) => Orthomosaic::new(bands, mask, config.transform)?,
        (Some(bands), None) => Orthomosaic::from_bands(bands, config.transform),
        (None, Some(mask)) => {
            let (width, height) = mask.dimensions();
            Orthomosaic::new(RgbImage::new(width, height), mask, config.transform)?
        }
        (None, None) => bail!("either input.mask or input.bands must be set"),
    };

    let (width, height) = ortho.dimensions();
    info!("🗺️  Orthomosaic loaded: {}x{}", width, height);
    Ok(ortho)
}

fn load_or_build_grid(engine: &GridEngine, ortho: &Orthomosaic, config: &RunnerConfig) -> anyhow::Result<ParcelGrid> {
    match &config.input.grid_state {
        Some(path) => {
            let grid = engine.restore(&GridState::load_json(path)?)?;
            info!("Grid restored from {} ({} parcels)", path.display(), grid.len());
            Ok(grid)
        }
        None => Ok(engine.build(ortho)?),
    }
}

/// Mapper from the configured coordinate table, or from the orthomosaic transform
fn load_mapper(
    table_path: Option<&Path>,
    transform: AffineTransform,
    ortho: &Orthomosaic,
) -> anyhow::Result<CoordinateMapper> {
    let Some(path) = table_path else {
        return Ok(CoordinateMapper::from_orthomosaic(ortho)?);
    };
    let table = CoordinateTable::load_json(path)?;
    ensure!(
        (table.width, table.height) == ortho.dimensions(),
        "coordinate table {} is {}x{} but the orthomosaic is {}x{}",
        path.display(),
        table.width,
        table.height,
        ortho.dimensions().0,
        ortho.dimensions().1
    );
    Ok(CoordinateMapper::from_table(&table)?.with_transform(transform))
}

fn load_observations(locator: &PlantLocator, frames: Option<&Path>) -> anyhow::Result<Vec<Observation>> {
    let Some(path) = frames else {
        warn!("No frames configured, exporting the bare grid");
        return Ok(Vec::new());
    };

    let records: Vec<FrameRecord> = read_json(path)?;
    info!("📷 Loaded {} frames from {}", records.len(), path.display());

    let detector = RecordedDetections::from_records(&records)?;
    let frames: Vec<_> = records.iter().map(FrameRecord::frame).collect();
    Ok(locator.survey(&frames, &detector))
}
