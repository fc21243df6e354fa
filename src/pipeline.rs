//! Parameter point to (m1, a_eff) and Omega h^2.
//!
//! `pre_scan` does everything that does not depend on the parameter point and writes it to
//! the cache. A `PionModel` loads the cache once and is then evaluated at many points.

use std::time::Instant;
use sysinfo::{System, SystemExt};

use crate::config::PipelineConfig;
use crate::constants::AEFF_IMAGINARY_RATIO_WARNING;
use crate::error::{PionError, Result};
use crate::relic::{RelicAbundanceSolver, RelicSolution};
use crate::theory::coannihilation::effective_cross_section;
use crate::theory::cross_section::sigma_matrix;
use crate::theory::form_factors::{build_form_factors, FormFactors};
use crate::theory::generators::build_generators;
use crate::theory::mass_spectrum::{pion_mass_sq, MassSpectrum};
use crate::theory::params::PionParams;
use crate::theory::transform::{
    dm_transform_matrix, interaction_to_dm_transform, load_core_transform, transform_form_factors,
};
use crate::theory::Generations;
use crate::utils::io::{CacheKind, MatrixCache};
use crate::{Complex, ComplexMatrix, FloatType};

fn log_memory(stage: &str) {
    let mut sys = System::new_all();
    sys.refresh_memory();
    log::info!(
        "{stage}: used memory {} of {} bytes",
        sys.used_memory(),
        sys.total_memory()
    );
}

/// Builds the generators and F-hat tensors and writes them to the cache.
///
/// Ngen = 1 stores F-hat already rotated to the DM-charge basis. Ngen = 3 stores the
/// interaction basis tensors plus V and the core of W, since the full rotation depends on
/// the parameter point.
pub fn pre_scan(gens: Generations, config: &PipelineConfig) -> Result<()> {
    let cache = MatrixCache::open(&config.cache_dir);
    let kinds: &[CacheKind] = match gens {
        Generations::One => &[CacheKind::FormFactors],
        Generations::Three => &[
            CacheKind::FormFactors,
            CacheKind::DmTransform,
            CacheKind::MassTransformCore,
        ],
    };
    // Fail before the expensive part
    for &kind in kinds {
        if cache.exists(gens, kind) {
            return Err(PionError::CacheExists(cache.path(gens, kind)));
        }
    }

    let start = Instant::now();
    let generators = build_generators(gens);
    let violations = generators.normalization_violations();
    if !violations.is_empty() {
        log::warn!("generators {violations:?} are not normalized to tr(X X^dagger) = 1/2");
    }
    log::info!("Built {} generators in {:?}", generators.x.len(), start.elapsed());

    let start = Instant::now();
    let form_factors = build_form_factors(&generators, gens)?;
    log::info!("Built F1Hat, F2Hat in {:?}", start.elapsed());
    log_memory("after tensor build");

    let v = dm_transform_matrix(gens);
    match gens {
        Generations::One => {
            let start = Instant::now();
            let dm_basis = transform_form_factors(&v, &form_factors)?;
            log::info!("Converted to DM-charge basis in {:?}", start.elapsed());
            cache.store_form_factors(gens, &dm_basis)?;
        }
        Generations::Three => {
            let core = load_core_transform(&config.sparse_mass_transform_path(), gens.n_pions())?;
            cache.store_form_factors(gens, &form_factors)?;
            cache.store_matrix(gens, CacheKind::DmTransform, &v)?;
            cache.store_matrix(gens, CacheKind::MassTransformCore, &core)?;
        }
    }
    Ok(())
}

/// Cached, parameter independent inputs for one generation count.
pub struct PionModel {
    pub gens: Generations,
    pub config: PipelineConfig,
    /// F1Hat, F2Hat: DM-charge basis for Ngen = 1, interaction basis for Ngen = 3
    form_factors_hat: FormFactors,
    dm_transform: Option<ComplexMatrix>,
    mass_transform_core: Option<ComplexMatrix>,
    /// Degeneracy of each DM-charged pion
    degeneracies: Vec<FloatType>,
}

/// Whether a_eff is real up to `AEFF_IMAGINARY_RATIO_WARNING`.
pub fn imaginary_part_negligible(a_eff: Complex) -> bool {
    a_eff.im.abs() <= AEFF_IMAGINARY_RATIO_WARNING * a_eff.re.abs()
}

/// Spectrum and coannihilation result of one parameter point.
#[derive(Debug, Clone)]
pub struct PointResult {
    pub spectrum: MassSpectrum,
    pub m1: FloatType,
    pub a_eff: Complex,
}

impl PionModel {
    pub fn load(gens: Generations, config: PipelineConfig) -> Result<Self> {
        let start = Instant::now();
        let cache = MatrixCache::open(&config.cache_dir);
        let form_factors_hat = cache.load_form_factors(gens)?;
        let (dm_transform, mass_transform_core) = match gens {
            Generations::One => (None, None),
            Generations::Three => (
                Some(cache.load_matrix(gens, CacheKind::DmTransform)?),
                Some(cache.load_matrix(gens, CacheKind::MassTransformCore)?),
            ),
        };
        log::info!("Loaded {gens} cache in {:?}", start.elapsed());
        Ok(PionModel {
            gens,
            config,
            form_factors_hat,
            dm_transform,
            mass_transform_core,
            degeneracies: vec![1.0; gens.dm_indices().len()],
        })
    }

    pub fn spectrum(&self, params: &PionParams) -> Result<MassSpectrum> {
        pion_mass_sq(
            self.gens,
            params,
            &self.config.wilson,
            self.mass_transform_core.as_ref(),
            self.config.eigenvalue_tolerance,
        )
    }

    /// F1 and F2 in the DM-charge basis at this parameter point.
    pub fn form_factors(&self, params: &PionParams, spectrum: &MassSpectrum) -> Result<FormFactors> {
        let hat = match (self.gens, &self.dm_transform, &spectrum.w) {
            (Generations::One, _, _) => self.form_factors_hat.clone(),
            (Generations::Three, Some(v), Some(w)) => {
                let start = Instant::now();
                let u = interaction_to_dm_transform(w, v);
                let dm_basis = transform_form_factors(&u, &self.form_factors_hat)?;
                log::debug!("Converted to DM-charge basis in {:?}", start.elapsed());
                dm_basis
            }
            _ => {
                return Err(PionError::ShapeMismatch(
                    "Ngen3 needs both V and W to reach the DM-charge basis".into(),
                ))
            }
        };
        Ok(hat.scaled(params.f1_scale(), params.f2_scale()))
    }

    /// Mass of the lightest DM pion and the effective cross section, without freeze-out.
    pub fn m1_aeff(&self, params: &PionParams) -> Result<PointResult> {
        let spectrum = self.spectrum(params)?;
        let form_factors = self.form_factors(params, &spectrum)?;

        let start = Instant::now();
        let m2: Vec<FloatType> = spectrum.m2_dm.to_vec();
        let sigma = sigma_matrix(self.gens, &m2, &form_factors.f1, &form_factors.f2)?;
        log::debug!("sigma matrix in {:?}", start.elapsed());

        let a_eff = effective_cross_section(
            self.gens,
            &sigma,
            &spectrum.m2_dm_arr,
            &self.degeneracies,
            self.config.freeze_out_x,
        )?;
        let m1 = spectrum.lightest_dm_mass();
        Ok(PointResult { spectrum, m1, a_eff })
    }

    /// Full pipeline. The constituent mass used for the deconfinement rescaling is mD.
    pub fn omega_h2(&self, params: &PionParams, solver: &RelicAbundanceSolver) -> Result<RelicSolution> {
        let point = self.m1_aeff(params)?;
        if !imaginary_part_negligible(point.a_eff) {
            log::warn!("a_eff has a sizeable imaginary part: {}", point.a_eff);
        }
        solver.calc_omega_h2(point.m1, params.mass_d, point.a_eff.re)
    }

    /// Sampler entry point: log10 scan variables in, (final Omega h^2, thermalization) out.
    pub fn omega_h2_from_log10_scan(
        &self,
        solver: &RelicAbundanceSolver,
        gs_pow: f64,
        fpi_pow: f64,
        kappa_pow: f64,
        asmall_pow: f64,
        bsmall_pow: f64,
        s_q_sq_pow: f64,
    ) -> Result<(FloatType, FloatType)> {
        let params = PionParams::from_log10_scan(gs_pow, fpi_pow, kappa_pow, asmall_pow, bsmall_pow, s_q_sq_pow)?;
        let solution = self.omega_h2(&params, solver)?;
        Ok((solution.final_omega_h2(), solution.thermalization))
    }
}

/// Benchmark points for grid scans over (mD, fpi).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchmarkPoint {
    Bp1,
    Bp2,
}

impl BenchmarkPoint {
    /// (gs, kappa, eQ, sQsq)
    pub fn couplings(self) -> (f64, f64, f64, f64) {
        match self {
            BenchmarkPoint::Bp1 => (0.8, 0.0, 0.5, 0.3),
            BenchmarkPoint::Bp2 => (0.1, 0.0, 0.01, 0.01),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BenchmarkPoint::Bp1 => "BP1",
            BenchmarkPoint::Bp2 => "BP2",
        }
    }
}

impl TryFrom<usize> for BenchmarkPoint {
    type Error = PionError;

    fn try_from(bp: usize) -> Result<Self> {
        match bp {
            1 => Ok(BenchmarkPoint::Bp1),
            2 => Ok(BenchmarkPoint::Bp2),
            _ => Err(PionError::InvalidParameter {
                name: "BP",
                value: bp as f64,
            }),
        }
    }
}

/// Meaning of the two grid axes (x, y).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridAxes {
    /// CASE 0: log10 bsmall, log10 fpi[GeV]
    BsmallPowFpiPow,
    /// CASE 1: log10 mD[GeV], log10 fpi[GeV]
    MassPowFpiPow,
    /// CASE 2: mD[GeV], fpi[GeV]
    MassGevFpiGev,
    /// CASE 3: mD[GeV], fpi[TeV]
    MassGevFpiTev,
    /// CASE 4: mD[TeV], fpi[TeV]
    MassTevFpiTev,
}

impl TryFrom<usize> for GridAxes {
    type Error = PionError;

    fn try_from(case: usize) -> Result<Self> {
        match case {
            0 => Ok(GridAxes::BsmallPowFpiPow),
            1 => Ok(GridAxes::MassPowFpiPow),
            2 => Ok(GridAxes::MassGevFpiGev),
            3 => Ok(GridAxes::MassGevFpiTev),
            4 => Ok(GridAxes::MassTevFpiTev),
            _ => Err(PionError::InvalidParameter {
                name: "CASE",
                value: case as f64,
            }),
        }
    }
}

impl GridAxes {
    /// Converts a grid position to (fpi [GeV], bsmall).
    pub fn fpi_bsmall(self, x: f64, y: f64) -> (f64, f64) {
        let bsmall_of = |md: f64, fpi: f64| md / (4.0 * std::f64::consts::PI * fpi);
        match self {
            GridAxes::BsmallPowFpiPow => (10f64.powf(y), 10f64.powf(x)),
            GridAxes::MassPowFpiPow => {
                let fpi = 10f64.powf(y);
                (fpi, bsmall_of(10f64.powf(x), fpi))
            }
            GridAxes::MassGevFpiGev => (y, bsmall_of(x, y)),
            GridAxes::MassGevFpiTev => (y * 1e3, bsmall_of(x, y * 1e3)),
            GridAxes::MassTevFpiTev => (y * 1e3, bsmall_of(x * 1e3, y * 1e3)),
        }
    }
}

/// Evaluates (m1, Re a_eff) on a `mesh` x `mesh` grid spanning `axis_range` =
/// [xmin, xmax, ymin, ymax] (both ends included). Returns the stack [X, Y, m1, Re a_eff]
/// with shape (4, mesh, mesh). Points that fail are logged and left as NaN.
pub fn aeff_grid(
    model: &PionModel,
    balancer: &crate::utils::balancer::Balancer,
    bp: BenchmarkPoint,
    axes: GridAxes,
    axis_range: [f64; 4],
    mesh: usize,
) -> ndarray::Array3<f64> {
    use crate::utils::linspace;

    let xs = linspace(axis_range[0], axis_range[1], mesh);
    let ys = linspace(axis_range[2], axis_range[3], mesh);
    let positions: Vec<(usize, usize)> = itertools::iproduct!(0..mesh, 0..mesh).collect();
    let (gs, kappa, eq, s_q_sq) = bp.couplings();

    let results = balancer.scan(&positions, true, |&(i, j)| {
        let (fpi, bsmall) = axes.fpi_bsmall(xs[i], ys[j]);
        let point = PionParams::from_charge_and_bsmall(gs, fpi, kappa, eq, bsmall, s_q_sq)
            .and_then(|params| model.m1_aeff(&params));
        match point {
            Ok(point) => (point.m1, point.a_eff.re),
            Err(e) => {
                log::warn!("grid point (x = {}, y = {}) failed: {e}", xs[i], ys[j]);
                (f64::NAN, f64::NAN)
            }
        }
    });

    let mut grid = ndarray::Array3::from_elem((4, mesh, mesh), f64::NAN);
    for (&(i, j), (m1, aeff)) in positions.iter().zip(results) {
        grid[[0, i, j]] = xs[i];
        grid[[1, i, j]] = ys[j];
        grid[[2, i, j]] = m1;
        grid[[3, i, j]] = aeff;
    }
    grid
}

#[test]
fn test_grid_axes_agree_on_one_point() {
    // mD = 1 TeV, fpi = 10 TeV in every convention
    let fpi = 1.0e4;
    let md = 1.0e3;
    let bsmall = md / (4.0 * std::f64::consts::PI * fpi);
    let cases = [
        (0, bsmall.log10(), fpi.log10()),
        (1, md.log10(), fpi.log10()),
        (2, md, fpi),
        (3, md, fpi / 1e3),
        (4, md / 1e3, fpi / 1e3),
    ];
    for (case, x, y) in cases {
        let (got_fpi, got_bsmall) = GridAxes::try_from(case).unwrap().fpi_bsmall(x, y);
        assert_approx_eq::assert_approx_eq!(got_fpi / fpi, 1.0, 1e-12);
        assert_approx_eq::assert_approx_eq!(got_bsmall / bsmall, 1.0, 1e-12);
    }
    assert!(GridAxes::try_from(5).is_err());
    assert!(BenchmarkPoint::try_from(3).is_err());
}

#[test]
fn test_imaginary_part_threshold() {
    assert!(imaginary_part_negligible(Complex::new(1e-10, 1e-17)));
    assert!(!imaginary_part_negligible(Complex::new(1e-10, 1e-15)));
    assert!(!imaginary_part_negligible(Complex::new(0.0, 1e-30)));
    assert!(imaginary_part_negligible(Complex::new(-2.0, 1e-7)));
}
