use anyhow::{Context, Result};
use dark_pion_relic::config::PipelineConfig;
use dark_pion_relic::pipeline::pre_scan;
use dark_pion_relic::theory::Generations;
use std::time::Instant;

/// Usage: pre_scan [NGEN]   (NGEN = 1 or 3, default 1)
fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let ngen: usize = std::env::args()
        .nth(1)
        .map(|arg| arg.parse())
        .transpose()
        .context("NGEN must be an integer")?
        .unwrap_or(1);
    let gens = Generations::try_from(ngen)?;
    let config = PipelineConfig::default();

    let start = Instant::now();
    pre_scan(gens, &config).with_context(|| format!("pre_scan for {gens} failed"))?;
    log::info!("pre_scan for {gens} finished in {:?}", start.elapsed());
    Ok(())
}
