use anyhow::{Context, Result};
use dark_pion_relic::config::PipelineConfig;
use dark_pion_relic::pipeline::{aeff_grid, BenchmarkPoint, GridAxes, PionModel};
use dark_pion_relic::theory::Generations;
use dark_pion_relic::utils::balancer::Balancer;
use ndarray_npy::write_npy;
use std::time::Instant;

// Defaults of the (mD, fpi) TeV scan
const DEFAULT_AXIS_RANGE: [f64; 4] = [0.5, 8.5, 42.0, 78.0];
const DEFAULT_MESH: usize = 10;

// Cores left for the rest of the system
const REDUCE: usize = 1;

/// Usage: aeff_grid [NGEN] [BP] [CASE] [MESH] [XMIN XMAX YMIN YMAX]
fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let int_arg = |i: usize, default: usize| -> Result<usize> {
        args.get(i)
            .map(|a| a.parse::<usize>().with_context(|| format!("argument {} ({a}) must be an integer", i + 1)))
            .unwrap_or(Ok(default))
    };
    let gens = Generations::try_from(int_arg(0, 1)?)?;
    let bp = BenchmarkPoint::try_from(int_arg(1, 1)?)?;
    let axes = GridAxes::try_from(int_arg(2, 4)?)?;
    let mesh = int_arg(3, DEFAULT_MESH)?;
    let axis_range = if args.len() >= 8 {
        let mut range = [0.0; 4];
        for (k, value) in args[4..8].iter().enumerate() {
            range[k] = value.parse().with_context(|| format!("axis bound {value} is not a number"))?;
        }
        range
    } else {
        DEFAULT_AXIS_RANGE
    };

    let config = PipelineConfig::default();
    let output = config.cache_dir.join(format!("aeffOnGrid_{gens}_{}.npy", bp.label()));
    let model = PionModel::load(gens, config)?;
    let balancer = Balancer::new(REDUCE)?;

    let start = Instant::now();
    log::info!("Scanning {mesh}x{mesh} grid {axis_range:?} with {axes:?} at {}", bp.label());
    let grid = aeff_grid(&model, &balancer, bp, axes, axis_range, mesh);
    log::info!("Grid done in {:?}", start.elapsed());

    log::info!("Saving to file at {}", output.display());
    write_npy(&output, &grid).with_context(|| format!("could not write {}", output.display()))?;
    Ok(())
}
