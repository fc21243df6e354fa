use serde_derive::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::{DEFAULT_FREEZE_OUT_X, EIGENVALUE_IMAGINARY_TOLERANCE};
use crate::utils::ode::OdeOptions;

/// Location of the precomputed F-hat tensors and transform matrices.
pub const DEFAULT_CACHE_DIR: &str = "./npyFiles";

/// Location of the g*(T) tables and the sparse interaction-to-mass transform.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Coefficients of the gauge-boson loop contributions to the pion masses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WilsonCoefficients {
    pub ca: f64,
    pub cz: f64,
    pub cg: f64,
    pub cw: f64,
}

impl Default for WilsonCoefficients {
    fn default() -> Self {
        WilsonCoefficients {
            ca: -1.0,
            cz: -1.0,
            cg: -1.0,
            cw: 1.0,
        }
    }
}

/// Everything that used to live in module-level DEBUG/TIME flags and hardcoded paths.
/// Verbosity is handled by the `log` level, so nothing here toggles printing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// x = m_1 / T used in the Boltzmann weights of the coannihilation average.
    pub freeze_out_x: f64,
    pub wilson: WilsonCoefficients,
    pub cache_dir: PathBuf,
    pub data_dir: PathBuf,
    /// Largest |Im(lambda)| accepted when diagonalizing the Ngen = 3 mass matrix.
    pub eigenvalue_tolerance: f64,
    pub ode: OdeOptions,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            freeze_out_x: DEFAULT_FREEZE_OUT_X,
            wilson: WilsonCoefficients::default(),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            eigenvalue_tolerance: EIGENVALUE_IMAGINARY_TOLERANCE,
            ode: OdeOptions::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = cache_dir.into();
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Caps the wall-clock time of every relic-abundance integration.
    pub fn with_wall_clock_budget(mut self, seconds: f64) -> Self {
        self.ode.max_wall_time_secs = Some(seconds);
        self
    }

    pub fn gstar_path(&self) -> PathBuf {
        self.data_dir.join("gstar.dat")
    }

    pub fn gstar_s_path(&self) -> PathBuf {
        self.data_dir.join("gstarS.dat")
    }

    pub fn sparse_mass_transform_path(&self) -> PathBuf {
        self.data_dir.join("WcoreMatrix_intToMass_sparse.txt")
    }
}

#[test]
fn test_default_config_matches_scan_settings() {
    let config = PipelineConfig::default();
    assert_eq!(config.freeze_out_x, 20.0);
    assert_eq!(config.wilson.cw, 1.0);
    assert_eq!(config.wilson.ca, -1.0);
    assert_eq!(config.ode.rtol, 1e-10);
    assert_eq!(config.ode.atol, 1e-20);
    assert!(config.ode.max_wall_time_secs.is_none());
}

#[test]
fn test_builder_paths() {
    let config = PipelineConfig::default()
        .with_data_dir("/tmp/tables")
        .with_wall_clock_budget(30.0);
    assert_eq!(config.gstar_path(), PathBuf::from("/tmp/tables/gstar.dat"));
    assert_eq!(config.ode.max_wall_time_secs, Some(30.0));
}
