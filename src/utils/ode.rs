//! Fourth-order Rosenbrock integrator for stiff systems.
//!
//! Kaps-Rentrop scheme with Shampine's coefficients and an embedded third-order error
//! estimate. The Jacobian and the explicit x-derivative are taken by central differences.
//! Every accepted step is recorded together with its derivative, so the solution can be
//! evaluated anywhere in the span with cubic Hermite interpolation.

use nalgebra::{DMatrix, DVector};
use serde_derive::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{PionError, Result};

const GAM: f64 = 1.0 / 2.0;
const A21: f64 = 2.0;
const A31: f64 = 48.0 / 25.0;
const A32: f64 = 6.0 / 25.0;
const C21: f64 = -8.0;
const C31: f64 = 372.0 / 25.0;
const C32: f64 = 12.0 / 5.0;
const C41: f64 = -112.0 / 125.0;
const C42: f64 = -54.0 / 125.0;
const C43: f64 = -2.0 / 5.0;
const B1: f64 = 19.0 / 9.0;
const B2: f64 = 1.0 / 2.0;
const B3: f64 = 25.0 / 108.0;
const B4: f64 = 125.0 / 108.0;
const E1: f64 = 17.0 / 54.0;
const E2: f64 = 7.0 / 36.0;
const E3: f64 = 0.0;
const E4: f64 = 125.0 / 108.0;
const C1X: f64 = 1.0 / 2.0;
const C2X: f64 = -3.0 / 2.0;
const C3X: f64 = 121.0 / 50.0;
const C4X: f64 = 29.0 / 250.0;
const A2X: f64 = 1.0;
const A3X: f64 = 3.0 / 5.0;

// Step size control
const SAFETY: f64 = 0.9;
const GROW: f64 = 1.5;
const PGROW: f64 = -0.25;
const SHRNK: f64 = 0.5;
const PSHRNK: f64 = -1.0 / 3.0;
const ERRCON: f64 = 0.1296;

/// A first-order system dy/dx = f(x, y).
pub trait OdeSystem {
    fn rhs(&self, x: f64, y: &DVector<f64>) -> DVector<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OdeOptions {
    pub rtol: f64,
    pub atol: f64,
    /// Initial step; estimated from the initial slope when absent
    pub first_step: Option<f64>,
    pub max_steps: usize,
    /// Wall-clock budget in seconds
    pub max_wall_time_secs: Option<f64>,
}

impl Default for OdeOptions {
    fn default() -> Self {
        OdeOptions {
            rtol: 1e-10,
            atol: 1e-20,
            first_step: None,
            max_steps: 500_000,
            max_wall_time_secs: None,
        }
    }
}

/// Accepted steps of an integration.
#[derive(Debug, Clone)]
pub struct OdeSolution {
    pub x: Vec<f64>,
    pub y: Vec<DVector<f64>>,
    pub dydx: Vec<DVector<f64>>,
    pub rejected_steps: usize,
}

impl OdeSolution {
    /// The i-th component along every accepted step.
    pub fn component(&self, i: usize) -> Vec<f64> {
        self.y.iter().map(|y| y[i]).collect()
    }

    pub fn last(&self) -> Option<&DVector<f64>> {
        self.y.last()
    }

    /// Dense output: cubic Hermite interpolation between accepted steps.
    pub fn at(&self, x: f64) -> Option<DVector<f64>> {
        let n = self.x.len();
        if n == 0 || x < self.x[0] || x > self.x[n - 1] {
            return None;
        }
        if n == 1 {
            return Some(self.y[0].clone());
        }
        let k = self.x.partition_point(|&knot| knot <= x).clamp(1, n - 1) - 1;
        let h = self.x[k + 1] - self.x[k];
        let t = (x - self.x[k]) / h;
        let (t2, t3) = (t * t, t * t * t);
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;
        Some(
            &self.y[k] * h00
                + &self.dydx[k] * (h10 * h)
                + &self.y[k + 1] * h01
                + &self.dydx[k + 1] * (h11 * h),
        )
    }
}

fn jacobian<S: OdeSystem>(system: &S, x: f64, y: &DVector<f64>, atol: f64) -> DMatrix<f64> {
    let n = y.len();
    let mut jac = DMatrix::zeros(n, n);
    let eps = f64::EPSILON.cbrt();
    for j in 0..n {
        let delta = eps * y[j].abs().max(atol).max(f64::MIN_POSITIVE.sqrt());
        let mut up = y.clone();
        let mut down = y.clone();
        up[j] += delta;
        down[j] -= delta;
        let column = (system.rhs(x, &up) - system.rhs(x, &down)) / (2.0 * delta);
        jac.set_column(j, &column);
    }
    jac
}

fn x_derivative<S: OdeSystem>(system: &S, x: f64, y: &DVector<f64>) -> DVector<f64> {
    let delta = f64::EPSILON.cbrt() * x.abs().max(1.0);
    (system.rhs(x + delta, y) - system.rhs(x - delta, y)) / (2.0 * delta)
}

/// One trial step of size h. Returns the new state and the error estimate.
fn rosenbrock_step<S: OdeSystem>(
    system: &S,
    x: f64,
    y: &DVector<f64>,
    dydx: &DVector<f64>,
    dfdx: &DVector<f64>,
    jac: &DMatrix<f64>,
    h: f64,
) -> Result<(DVector<f64>, DVector<f64>)> {
    let n = y.len();
    let mut iteration = -jac;
    for i in 0..n {
        iteration[(i, i)] += 1.0 / (GAM * h);
    }
    let lu = iteration.lu();
    let solve = |rhs: DVector<f64>| {
        lu.solve(&rhs)
            .ok_or_else(|| PionError::IntegrationFailure(format!("singular iteration matrix at x = {x}")))
    };

    let g1 = solve(dydx + dfdx * (h * C1X))?;

    let f2 = system.rhs(x + A2X * h, &(y + &g1 * A21));
    let g2 = solve(f2 + dfdx * (h * C2X) + &g1 * (C21 / h))?;

    let f3 = system.rhs(x + A3X * h, &(y + &g1 * A31 + &g2 * A32));
    let g3 = solve(&f3 + dfdx * (h * C3X) + (&g1 * C31 + &g2 * C32) / h)?;

    // The fourth stage reuses the third derivative evaluation
    let g4 = solve(&f3 + dfdx * (h * C4X) + (&g1 * C41 + &g2 * C42 + &g3 * C43) / h)?;

    let y_new = y + &g1 * B1 + &g2 * B2 + &g3 * B3 + &g4 * B4;
    let err = &g1 * E1 + &g2 * E2 + &g3 * E3 + &g4 * E4;
    Ok((y_new, err))
}

fn scaled_error(err: &DVector<f64>, y: &DVector<f64>, y_new: &DVector<f64>, options: &OdeOptions) -> f64 {
    err.iter()
        .zip(y.iter().zip(y_new.iter()))
        .map(|(e, (a, b))| e.abs() / (options.atol + options.rtol * a.abs().max(b.abs())))
        .fold(0.0, f64::max)
}

fn initial_step(f0: &DVector<f64>, y0: &DVector<f64>, span: f64, options: &OdeOptions) -> f64 {
    let scale = |i: usize| options.atol + options.rtol * y0[i].abs();
    let rms = |v: &DVector<f64>| {
        (v.iter().enumerate().map(|(i, x)| (x / scale(i)).powi(2)).sum::<f64>() / v.len() as f64).sqrt()
    };
    let (d0, d1) = (rms(y0), rms(f0));
    let h = if d0 < 1e-5 || d1 < 1e-5 { 1e-6 * span } else { 0.01 * d0 / d1 };
    h.clamp(1e-14 * span, 0.1 * span)
}

/// Integrates `system` from `span.0` to `span.1` (forward only).
pub fn integrate<S: OdeSystem>(
    system: &S,
    span: (f64, f64),
    y0: DVector<f64>,
    options: &OdeOptions,
) -> Result<OdeSolution> {
    let (x0, x_end) = span;
    if !(x_end > x0) {
        return Err(PionError::IntegrationFailure(format!(
            "empty or backward span [{x0}, {x_end}]"
        )));
    }
    let start = Instant::now();

    let f0 = system.rhs(x0, &y0);
    if f0.iter().chain(y0.iter()).any(|v| !v.is_finite()) {
        return Err(PionError::IntegrationFailure("non-finite initial state or slope".into()));
    }
    let mut h = options
        .first_step
        .unwrap_or_else(|| initial_step(&f0, &y0, x_end - x0, options));

    let mut solution = OdeSolution {
        x: vec![x0],
        y: vec![y0],
        dydx: vec![f0],
        rejected_steps: 0,
    };
    let mut x = x0;

    for _ in 0..options.max_steps {
        if x >= x_end {
            return Ok(solution);
        }
        if let Some(budget) = options.max_wall_time_secs {
            let elapsed = start.elapsed().as_secs_f64();
            if elapsed >= budget {
                return Err(PionError::Timeout { elapsed_secs: elapsed });
            }
        }

        let (y, dydx) = match (solution.y.last(), solution.dydx.last()) {
            (Some(y), Some(dydx)) => (y.clone(), dydx.clone()),
            _ => return Err(PionError::IntegrationFailure("empty solution".into())),
        };
        let jac = jacobian(system, x, &y, options.atol);
        let dfdx = x_derivative(system, x, &y);

        // Shrink until the step is accepted
        loop {
            if x + h > x_end {
                h = x_end - x;
            }
            if x + h == x {
                return Err(PionError::IntegrationFailure(format!("step size underflow at x = {x}")));
            }

            let (y_new, err) = rosenbrock_step(system, x, &y, &dydx, &dfdx, &jac, h)?;
            let errmax = scaled_error(&err, &y, &y_new, options);
            if errmax.is_finite() && errmax <= 1.0 && y_new.iter().all(|v| v.is_finite()) {
                x = if x_end - (x + h) <= 1e-14 * (x_end - x0) { x_end } else { x + h };
                let f_new = system.rhs(x, &y_new);
                solution.x.push(x);
                solution.y.push(y_new);
                solution.dydx.push(f_new);
                h = if errmax > ERRCON { SAFETY * h * errmax.powf(PGROW) } else { GROW * h };
                break;
            }

            solution.rejected_steps += 1;
            h = if errmax.is_finite() {
                (SAFETY * h * errmax.powf(PSHRNK)).max(SHRNK * h)
            } else {
                SHRNK * h
            };
        }
    }

    if x >= x_end {
        Ok(solution)
    } else {
        Err(PionError::IntegrationFailure(format!(
            "exceeded {} steps, stopped at x = {x}",
            options.max_steps
        )))
    }
}

#[cfg(test)]
struct Decay {
    rate: f64,
}

#[cfg(test)]
impl OdeSystem for Decay {
    fn rhs(&self, _x: f64, y: &DVector<f64>) -> DVector<f64> {
        y * (-self.rate)
    }
}

#[test]
fn test_exponential_decay() {
    let options = OdeOptions {
        rtol: 1e-10,
        atol: 1e-14,
        ..OdeOptions::default()
    };
    let solution = integrate(&Decay { rate: 1.0 }, (0.0, 2.0), DVector::from_vec(vec![1.0]), &options).unwrap();
    assert_eq!(*solution.x.last().unwrap(), 2.0);
    let end = solution.last().unwrap()[0];
    assert!((end - (-2.0f64).exp()).abs() < 1e-8, "{end}");

    // Dense output between steps
    let mid = solution.at(0.777).unwrap()[0];
    assert!((mid - (-0.777f64).exp()).abs() < 1e-7, "{mid}");
}

#[test]
fn test_stiff_robertson() {
    // Robertson chemical kinetics, the classic stiff benchmark
    struct Robertson;
    impl OdeSystem for Robertson {
        fn rhs(&self, _x: f64, y: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![
                -0.04 * y[0] + 1e4 * y[1] * y[2],
                0.04 * y[0] - 1e4 * y[1] * y[2] - 3e7 * y[1] * y[1],
                3e7 * y[1] * y[1],
            ])
        }
    }
    let options = OdeOptions {
        rtol: 1e-6,
        atol: 1e-10,
        ..OdeOptions::default()
    };
    let solution = integrate(&Robertson, (0.0, 40.0), DVector::from_vec(vec![1.0, 0.0, 0.0]), &options).unwrap();
    let end = solution.last().unwrap();
    // Reference: y1(40) = 0.7158, y3(40) = 0.2842
    assert!((end[0] - 0.7158).abs() < 1e-3);
    assert!((end[2] - 0.2842).abs() < 1e-3);
    assert!((end.sum() - 1.0).abs() < 1e-6);
    // An explicit method would need ~1e6 steps here
    assert!(solution.x.len() < 2000);
}

#[test]
fn test_riccati_freeze_out_shape() {
    // dN/dx = -k (N^2 - Neq^2) with Neq = 0: N = N0 / (1 + k N0 x)
    struct Riccati;
    impl OdeSystem for Riccati {
        fn rhs(&self, _x: f64, y: &DVector<f64>) -> DVector<f64> {
            DVector::from_vec(vec![-1e3 * y[0] * y[0]])
        }
    }
    let solution = integrate(&Riccati, (0.0, 1.0), DVector::from_vec(vec![1e3]), &OdeOptions::default()).unwrap();
    let end = solution.last().unwrap()[0];
    let want = 1e3 / (1.0 + 1e6);
    assert!(((end - want) / want).abs() < 1e-7, "{end} vs {want}");
}

#[test]
fn test_wall_clock_budget() {
    let options = OdeOptions {
        max_wall_time_secs: Some(0.0),
        first_step: Some(1e-6),
        ..OdeOptions::default()
    };
    let result = integrate(&Decay { rate: 1.0 }, (0.0, 1.0), DVector::from_vec(vec![1.0]), &options);
    assert!(matches!(result, Err(PionError::Timeout { .. })));
}

#[test]
fn test_rejects_backward_span() {
    let result = integrate(&Decay { rate: 1.0 }, (1.0, 0.0), DVector::from_vec(vec![1.0]), &OdeOptions::default());
    assert!(matches!(result, Err(PionError::IntegrationFailure(_))));
}
