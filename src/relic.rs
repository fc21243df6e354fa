//! Freeze-out of the lightest dark pion and the present-day relic density.
//!
//! The Boltzmann system is integrated in a = log10 of the scale factor over [0, 2] with
//! state (rho_rad, N_DM, T). N_DM is measured in units of the initial photon density.

use nalgebra::DVector;
use std::f64::consts::{LN_10, PI};
use std::path::Path;
use std::time::Instant;

use crate::config::PipelineConfig;
use crate::constants::{
    critical_density, hubble_rate, ALPHA_WEAK, PHOTON_NUMBER_DENSITY_COEFFICIENT,
    RADIATION_DENSITY_COEFFICIENT, TEMPERATURE_TODAY,
};
use crate::error::{PionError, Result};
use crate::utils::bessel::bessel_k2;
use crate::utils::io::load_two_column_table;
use crate::utils::ode::{integrate, OdeOptions, OdeSystem};
use crate::utils::spline::CubicSpline;

/// Range of log10(scale factor) covered by the integration.
pub const LOG_SCALE_FACTOR_SPAN: (f64, f64) = (0.0, 2.0);

/// Effective relativistic degrees of freedom for energy (g*) and entropy (g*S).
/// Both are splined in log10(T / GeV).
#[derive(Debug, Clone)]
pub struct DegreesOfFreedom {
    gstar: CubicSpline,
    gstar_s: CubicSpline,
}

impl DegreesOfFreedom {
    pub fn from_tables(
        temperature: Vec<f64>,
        gstar: Vec<f64>,
        temperature_s: Vec<f64>,
        gstar_s: Vec<f64>,
    ) -> Result<Self> {
        let log_t = |t: Vec<f64>| -> Result<Vec<f64>> {
            t.into_iter()
                .map(|t| {
                    if t > 0.0 {
                        Ok(t.log10())
                    } else {
                        Err(PionError::InvalidParameter {
                            name: "table temperature",
                            value: t,
                        })
                    }
                })
                .collect()
        };
        Ok(DegreesOfFreedom {
            gstar: CubicSpline::natural(log_t(temperature)?, gstar)?,
            gstar_s: CubicSpline::natural(log_t(temperature_s)?, gstar_s)?,
        })
    }

    pub fn load(gstar_path: &Path, gstar_s_path: &Path) -> Result<Self> {
        let (t, g) = load_two_column_table(gstar_path)?;
        let (t_s, g_s) = load_two_column_table(gstar_s_path)?;
        Self::from_tables(t, g, t_s, g_s).map_err(|e| match e {
            PionError::InvalidParameter { .. } | PionError::ShapeMismatch(_) => {
                PionError::MalformedAsset(gstar_path.to_path_buf(), e.to_string())
            }
            e => e,
        })
    }

    pub fn gstar(&self, t: f64) -> f64 {
        self.gstar.eval(t.log10())
    }

    pub fn gstar_s(&self, t: f64) -> f64 {
        self.gstar_s.eval(t.log10())
    }

    /// d g*S / dT
    pub fn dgstar_s_dt(&self, t: f64) -> f64 {
        self.gstar_s.derivative(t.log10()) / (t * LN_10)
    }
}

/// Right hand side of the freeze-out equations for one species of mass `m_dm`.
struct RelicSystem<'a> {
    dof: &'a DegreesOfFreedom,
    nphi: f64,
    m_dm: f64,
    sv: f64,
}

impl RelicSystem<'_> {
    /// Equilibrium N_DM at temperature `t`.
    fn equilibrium(&self, a: f64, t: f64) -> f64 {
        10f64.powf(3.0 * a) * self.m_dm * self.m_dm * t * bessel_k2(self.m_dm / t) / (PI * PI) / self.nphi
    }
}

impl OdeSystem for RelicSystem<'_> {
    fn rhs(&self, a: f64, v: &DVector<f64>) -> DVector<f64> {
        let (rho_rad, n_dm, t) = (v[0], v[1], v[2]);

        let hubble = hubble_rate(rho_rad * 10f64.powf(-4.0 * a));
        let delta = 1.0 + t * self.dof.dgstar_s_dt(t) / (3.0 * self.dof.gstar_s(t));

        let drho = 0.0;
        let dt = -t / delta;
        let n_eq = self.equilibrium(a, t);
        let dn = -(n_dm * n_dm - n_eq * n_eq) * self.sv * self.nphi / (hubble * 10f64.powf(3.0 * a));

        // d/d(log10 a) = ln(10) d/d(ln a)
        DVector::from_vec(vec![drho * LN_10, dn * LN_10, dt * LN_10])
    }
}

/// Trajectory of the freeze-out integration.
#[derive(Debug, Clone)]
pub struct RelicSolution {
    /// log10 of the scale factor at each accepted step
    pub a: Vec<f64>,
    pub temperature: Vec<f64>,
    pub n_dm: Vec<f64>,
    /// Omega h^2 today, if freeze-out ended at the corresponding step
    pub omega_h2: Vec<f64>,
    /// min over the trajectory of the weak interaction rate over the Hubble rate
    pub thermalization: f64,
}

impl RelicSolution {
    /// The relic density at the end of the integration.
    pub fn final_omega_h2(&self) -> f64 {
        self.omega_h2.last().copied().unwrap_or(f64::NAN)
    }

    /// Whether the dark sector would have thermalized with the SM (rate above Hubble).
    pub fn thermalized(&self) -> bool {
        self.thermalization > 1.0
    }
}

pub struct RelicAbundanceSolver {
    pub dof: DegreesOfFreedom,
    pub options: OdeOptions,
}

impl RelicAbundanceSolver {
    pub fn new(dof: DegreesOfFreedom, options: OdeOptions) -> Self {
        RelicAbundanceSolver { dof, options }
    }

    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let dof = DegreesOfFreedom::load(&config.gstar_path(), &config.gstar_s_path())?;
        Ok(Self::new(dof, config.ode))
    }

    /// Integrates freeze-out of a species of mass `m1` with thermally averaged cross section `sv`,
    /// then converts to the relic density of constituents of mass `m_dm_con`.
    pub fn calc_omega_h2(&self, m1: f64, m_dm_con: f64, sv: f64) -> Result<RelicSolution> {
        if m1 == 0.0 {
            return Err(PionError::VanishingDenominator("lightest dark pion mass m1"));
        }
        if !(m1.is_finite() && m1 > 0.0) {
            return Err(PionError::InvalidParameter { name: "m1", value: m1 });
        }
        if m_dm_con == 0.0 {
            return Err(PionError::VanishingDenominator("constituent mass"));
        }
        if !(m_dm_con.is_finite() && m_dm_con > 0.0) {
            return Err(PionError::InvalidParameter {
                name: "mDMcon",
                value: m_dm_con,
            });
        }
        if !sv.is_finite() {
            return Err(PionError::InvalidParameter { name: "sv", value: sv });
        }

        let start = Instant::now();
        let t_initial = m1;
        let rho_initial = RADIATION_DENSITY_COEFFICIENT * self.dof.gstar(t_initial) * t_initial.powi(4);
        let nphi = PHOTON_NUMBER_DENSITY_COEFFICIENT * t_initial.powi(3);
        let y0 = DVector::from_vec(vec![rho_initial, nphi, t_initial]);

        let system = RelicSystem {
            dof: &self.dof,
            nphi,
            m_dm: m1,
            sv,
        };
        let solution = integrate(&system, LOG_SCALE_FACTOR_SPAN, y0, &self.options)?;
        log::debug!(
            "freeze-out for m1 = {m1:e}: {} steps ({} rejected) in {:?}",
            solution.x.len(),
            solution.rejected_steps,
            start.elapsed()
        );

        let a = solution.x.clone();
        let rho_rad = solution.component(0);
        let n_dm = solution.component(1);
        let temperature = solution.component(2);
        let t_end = *temperature
            .last()
            .ok_or_else(|| PionError::IntegrationFailure("no accepted steps".into()))?;

        let gstar_s_end = self.dof.gstar_s(t_end);
        if gstar_s_end == 0.0 || t_end == 0.0 {
            return Err(PionError::VanishingDenominator("g*S at the end of freeze-out"));
        }
        let conf = (self.dof.gstar_s(TEMPERATURE_TODAY) / gstar_s_end) * (TEMPERATURE_TODAY / t_end).powi(3)
            / critical_density();
        // Energy density of the confined phase to that of the deconfined constituents
        let deconf = 2.0 * m_dm_con / m1;

        let omega_h2 = a
            .iter()
            .zip(&n_dm)
            .map(|(a, n)| n * nphi * 10f64.powf(-3.0 * a) * m1 * conf * deconf)
            .collect();

        let sigma_weak = ALPHA_WEAK * ALPHA_WEAK * PI / (m_dm_con * m_dm_con);
        let thermalization = a
            .iter()
            .zip(n_dm.iter().zip(&rho_rad))
            .map(|(a, (n, rho))| {
                sigma_weak * 10f64.powf(-3.0 * a) * n * nphi * 2.0 / hubble_rate(rho * 10f64.powf(-4.0 * a))
            })
            .fold(f64::INFINITY, f64::min);

        Ok(RelicSolution {
            a,
            temperature,
            n_dm,
            omega_h2,
            thermalization,
        })
    }
}

#[cfg(test)]
fn flat_dof(g: f64) -> DegreesOfFreedom {
    let t: Vec<f64> = (-15..=10).map(|p| 10f64.powi(p)).collect();
    DegreesOfFreedom::from_tables(t.clone(), vec![g; t.len()], t.clone(), vec![g; t.len()]).unwrap()
}

#[test]
fn test_flat_dof_cools_as_inverse_scale_factor() {
    let solver = RelicAbundanceSolver::new(flat_dof(100.0), OdeOptions::default());
    let m1 = 1.0e3;
    let solution = solver.calc_omega_h2(m1, 2.0e3, 1.0e-10).unwrap();

    // With constant g*S, T = m1 10^-a and rho_rad never changes
    for (a, t) in solution.a.iter().zip(&solution.temperature) {
        assert!(((t - m1 * 10f64.powf(-a)) / t).abs() < 1e-6, "T({a}) = {t}");
    }
    assert_eq!(*solution.a.last().unwrap(), 2.0);

    assert!(solution.n_dm.iter().all(|&n| n >= 0.0));
    assert!(solution.n_dm.last().unwrap() < &solution.n_dm[0]);
    assert!(solution.final_omega_h2().is_finite());
    assert!(solution.final_omega_h2() > 0.0);
    assert!(solution.thermalization.is_finite() && solution.thermalization >= 0.0);
}

#[test]
fn test_larger_cross_section_leaves_less_dark_matter() {
    let solver = RelicAbundanceSolver::new(flat_dof(100.0), OdeOptions::default());
    let weak = solver.calc_omega_h2(1.0e3, 1.0e3, 1.0e-12).unwrap();
    let strong = solver.calc_omega_h2(1.0e3, 1.0e3, 1.0e-9).unwrap();
    assert!(strong.final_omega_h2() < weak.final_omega_h2());
}

#[test]
fn test_zero_mass_is_rejected() {
    let solver = RelicAbundanceSolver::new(flat_dof(10.0), OdeOptions::default());
    assert!(matches!(
        solver.calc_omega_h2(0.0, 1.0, 1e-10),
        Err(PionError::VanishingDenominator(_))
    ));
    assert!(matches!(
        solver.calc_omega_h2(1.0, 0.0, 1e-10),
        Err(PionError::VanishingDenominator(_))
    ));
    assert!(solver.calc_omega_h2(-1.0, 1.0, 1e-10).is_err());
}

#[test]
fn test_equilibrium_density_at_start() {
    // At T = m and a = 0, N_eq = m^3 K2(1) / pi^2 / n_gamma, independent of m
    let dof = flat_dof(10.0);
    let m = 50.0;
    let system = RelicSystem {
        dof: &dof,
        nphi: PHOTON_NUMBER_DENSITY_COEFFICIENT * m * m * m,
        m_dm: m,
        sv: 0.0,
    };
    let want = bessel_k2(1.0) / (PI * PI) / PHOTON_NUMBER_DENSITY_COEFFICIENT;
    assert_approx_eq::assert_approx_eq!(system.equilibrium(0.0, m), want, 1e-12);
}

#[test]
fn test_wall_clock_budget_is_honored() {
    let options = OdeOptions {
        max_wall_time_secs: Some(0.0),
        ..OdeOptions::default()
    };
    let solver = RelicAbundanceSolver::new(flat_dof(10.0), options);
    assert!(matches!(
        solver.calc_omega_h2(1.0e3, 1.0e3, 1e-10),
        Err(PionError::Timeout { .. })
    ));
}
