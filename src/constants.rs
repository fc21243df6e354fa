use std::f64::consts::PI;

/// Gravitational constant in GeV^-2.
pub const GRAVITATIONAL_CONSTANT: f64 = 6.70883e-39;

/// One centimeter expressed in keV^-1.
pub const CM_IN_INV_KEV: f64 = 5.067730938543699e7;

/// Critical density today over h^2, in GeV/cm^3 (before the unit conversion to GeV^4).
pub const CRITICAL_DENSITY_GEV_PER_CM3: f64 = 1.053672e-23;

/// Photon temperature today in GeV.
pub const TEMPERATURE_TODAY: f64 = 2.34865e-13;

/// Weak fine structure constant, used by the thermalization diagnostic.
pub const ALPHA_WEAK: f64 = 0.0338;

/// n_gamma = 2 zeta(3) / pi^2 T^3
pub const PHOTON_NUMBER_DENSITY_COEFFICIENT: f64 = 0.24358828401821708;

/// rho_rad = pi^2 / 30 g_* T^4
pub const RADIATION_DENSITY_COEFFICIENT: f64 = 0.3289868133696;

/// Any single-channel cross section with magnitude below this is treated as exactly zero.
pub const CROSS_SECTION_FLOOR: f64 = 1e-20;

/// |Im a_eff| / |Re a_eff| above which a parameter point is reported.
pub const AEFF_IMAGINARY_RATIO_WARNING: f64 = 1e-6;

/// Largest imaginary part tolerated on an eigenvalue of the Ngen = 3 mass matrix.
pub const EIGENVALUE_IMAGINARY_TOLERANCE: f64 = 1e-2;

/// Tolerance on tr(X X^dagger) = 1/2 for the broken generators.
pub const GENERATOR_NORMALIZATION_TOLERANCE: f64 = 1e-8;

/// Required value of tr(X X^dagger) for every broken generator.
pub const GENERATOR_NORMALIZATION: f64 = 0.5;

/// Default x = m / T at freeze-out used in the coannihilation average.
pub const DEFAULT_FREEZE_OUT_X: f64 = 20.0;

/// Critical density in GeV^4.
pub fn critical_density() -> f64 {
    CRITICAL_DENSITY_GEV_PER_CM3 * CM_IN_INV_KEV.powi(-3)
}

/// Hubble rate for a radiation energy density `rho_rad` (GeV^4).
pub fn hubble_rate(rho_rad: f64) -> f64 {
    (8.0 * PI * GRAVITATIONAL_CONSTANT * rho_rad / 3.0).sqrt()
}

#[test]
fn test_critical_density_magnitude() {
    // 1.05e-5 h^2 GeV/cm^3 is roughly 8.1e-47 GeV^4
    let rc = critical_density();
    assert!(rc > 8.0e-47 && rc < 8.2e-47, "got {rc}");
}

#[test]
fn test_photon_coefficient_is_two_zeta_three_over_pi_squared() {
    let zeta_three = 1.2020569031595942;
    assert!((2.0 * zeta_three / (PI * PI) - PHOTON_NUMBER_DENSITY_COEFFICIENT).abs() < 1e-12);
}
