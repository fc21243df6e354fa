use serde_derive::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{PionError, Result};

/// A point of the dark pion parameter space, in physical units (GeV).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PionParams {
    /// Dark gauge coupling
    pub gs: f64,
    /// Pion decay constant
    pub fpi: f64,
    /// Coefficient of the singlet mass term
    pub kappa: f64,
    /// Dark hypercharge coupling
    pub eq: f64,
    /// Dark quark mass
    pub mass_d: f64,
    /// Squared sine of the hypercharge mixing angle
    pub s_q_sq: f64,
}

impl PionParams {
    /// Validates a parameter point given in physical variables.
    pub fn new(gs: f64, fpi: f64, kappa: f64, eq: f64, mass_d: f64, s_q_sq: f64) -> Result<Self> {
        let checks: [(&'static str, f64, bool); 6] = [
            ("gs", gs, true),
            ("fpi", fpi, fpi > 0.0),
            ("kappa", kappa, true),
            ("eQ", eq, true),
            ("mD", mass_d, mass_d >= 0.0),
            ("sQsq", s_q_sq, s_q_sq > 0.0),
        ];
        for (name, value, in_domain) in checks {
            if !value.is_finite() || !in_domain {
                return Err(PionError::InvalidParameter { name, value });
            }
        }
        Ok(PionParams {
            gs,
            fpi,
            kappa,
            eq,
            mass_d,
            s_q_sq,
        })
    }

    /// Scan variables: eQ = asmall gs and mD = bsmall Lambda_W.
    pub fn from_scan(
        gs: f64,
        fpi: f64,
        kappa: f64,
        asmall: f64,
        bsmall: f64,
        s_q_sq: f64,
    ) -> Result<Self> {
        Self::new(gs, fpi, kappa, asmall * gs, bsmall * 4.0 * PI * fpi, s_q_sq)
    }

    /// Scan variables given as base-10 logarithms, the form samplers hand them over in.
    pub fn from_log10_scan(
        gs_pow: f64,
        fpi_pow: f64,
        kappa_pow: f64,
        asmall_pow: f64,
        bsmall_pow: f64,
        s_q_sq_pow: f64,
    ) -> Result<Self> {
        let exp10 = |x: f64| 10f64.powf(x);
        Self::from_scan(
            exp10(gs_pow),
            exp10(fpi_pow),
            exp10(kappa_pow),
            exp10(asmall_pow),
            exp10(bsmall_pow),
            exp10(s_q_sq_pow),
        )
    }

    /// Physical eQ together with the scan variable bsmall, as used for benchmark points.
    pub fn from_charge_and_bsmall(
        gs: f64,
        fpi: f64,
        kappa: f64,
        eq: f64,
        bsmall: f64,
        s_q_sq: f64,
    ) -> Result<Self> {
        Self::new(gs, fpi, kappa, eq, bsmall * 4.0 * PI * fpi, s_q_sq)
    }

    /// Confinement scale Lambda_W = 4 pi fpi.
    pub fn lambda_w(&self) -> f64 {
        4.0 * PI * self.fpi
    }

    /// Prefactor turning F1Hat into F1.
    pub fn f1_scale(&self) -> f64 {
        4.0 / self.fpi.powi(2)
    }

    /// Prefactor turning F2Hat into F2.
    pub fn f2_scale(&self) -> f64 {
        -2.0 * self.mass_d * self.lambda_w().powi(3) / (3.0 * self.fpi.powi(4))
    }
}

#[test]
fn test_scan_variables() {
    let params = PionParams::from_scan(0.8, 155000.0, 1.0, 0.5, 0.01, 0.3).unwrap();
    assert_approx_eq::assert_approx_eq!(params.eq, 0.4);
    assert_approx_eq::assert_approx_eq!(params.mass_d / params.lambda_w(), 0.01);
}

#[test]
fn test_log10_scan_variables() {
    let params = PionParams::from_log10_scan(0.0, 5.0, 0.0, -3.0, -2.0, -1.0).unwrap();
    assert_approx_eq::assert_approx_eq!(params.fpi, 1e5, 1e-6);
    assert_approx_eq::assert_approx_eq!(params.eq, 1e-3);
    assert_approx_eq::assert_approx_eq!(params.s_q_sq, 0.1);
}

#[test]
fn test_rejects_nonpositive_decay_constant() {
    let err = PionParams::new(0.8, 0.0, 1.0, 0.5, 1.0, 0.3).unwrap_err();
    assert!(matches!(err, PionError::InvalidParameter { name: "fpi", .. }));

    let err = PionParams::new(0.8, 1.0, 1.0, 0.5, 1.0, f64::NAN).unwrap_err();
    assert!(matches!(err, PionError::InvalidParameter { name: "sQsq", .. }));
}
