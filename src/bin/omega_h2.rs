use anyhow::{Context, Result};
use dark_pion_relic::config::PipelineConfig;
use dark_pion_relic::pipeline::PionModel;
use dark_pion_relic::relic::RelicAbundanceSolver;
use dark_pion_relic::theory::params::PionParams;
use dark_pion_relic::theory::Generations;
use std::time::Instant;

// BP1 with a heavy singlet
const GS: f64 = 0.8;
const FPI: f64 = 155000.0;
const KAPPA: f64 = 1.0;
const EQ: f64 = 0.5;
const BSMALL: f64 = 0.01;
const SQSQ: f64 = 0.3;

/// Usage: omega_h2 [NGEN] [GS FPI KAPPA EQ BSMALL SQSQ]
fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let ngen: usize = match args.first() {
        Some(arg) => arg.parse().context("NGEN must be an integer")?,
        None => 1,
    };
    let gens = Generations::try_from(ngen)?;
    let [gs, fpi, kappa, eq, bsmall, s_q_sq] = if args.len() >= 7 {
        let mut values = [0.0; 6];
        for (k, arg) in args[1..7].iter().enumerate() {
            values[k] = arg.parse().with_context(|| format!("parameter {arg} is not a number"))?;
        }
        values
    } else {
        [GS, FPI, KAPPA, EQ, BSMALL, SQSQ]
    };
    let params = PionParams::from_charge_and_bsmall(gs, fpi, kappa, eq, bsmall, s_q_sq)?;

    let config = PipelineConfig::default();
    let solver = RelicAbundanceSolver::from_config(&config)?;
    let model = PionModel::load(gens, config)?;

    let start = Instant::now();
    let point = model.m1_aeff(&params)?;
    log::info!("m1 = {:e} GeV, a_eff = {:e}", point.m1, point.a_eff);
    let solution = model.omega_h2(&params, &solver)?;
    log::info!("Relic abundance in {:?}", start.elapsed());

    println!("Number of generations:        {}", gens.count());
    println!("Lightest DM pion mass [GeV]:  {:e}", point.m1);
    println!("a_eff [GeV^-2]:               {:e}", point.a_eff.re);
    println!("Omega h^2:                    {:e}", solution.final_omega_h2());
    println!("Thermalization:               {:e}", solution.thermalization);
    if solution.thermalized() {
        println!("Warning: dark sector thermalizes with the SM at this point");
    }
    Ok(())
}
