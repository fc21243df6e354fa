use crate::error::{PionError, Result};

/// Natural cubic spline through tabulated points. Outside the table the first or last
/// value is returned and the derivative is zero.
#[derive(Debug, Clone)]
pub struct CubicSpline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at the knots
    curvature: Vec<f64>,
}

impl CubicSpline {
    pub fn natural(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        let n = x.len();
        if n != y.len() || n < 3 {
            return Err(PionError::ShapeMismatch(format!(
                "spline needs at least 3 matching knots, got {} x and {} y",
                n,
                y.len()
            )));
        }
        if x.windows(2).any(|w| !(w[1] > w[0])) {
            return Err(PionError::ShapeMismatch("spline knots must be strictly increasing".into()));
        }

        // Tridiagonal system for the interior second derivatives (Thomas algorithm)
        let mut curvature = vec![0.0; n];
        let mut upper = vec![0.0; n];
        for i in 1..n - 1 {
            let sig = (x[i] - x[i - 1]) / (x[i + 1] - x[i - 1]);
            let p = sig * upper[i - 1] + 2.0;
            upper[i] = (sig - 1.0) / p;
            let slope_change =
                (y[i + 1] - y[i]) / (x[i + 1] - x[i]) - (y[i] - y[i - 1]) / (x[i] - x[i - 1]);
            curvature[i] = (6.0 * slope_change / (x[i + 1] - x[i - 1]) - sig * curvature[i - 1]) / p;
        }
        curvature[n - 1] = 0.0;
        for k in (0..n - 1).rev() {
            curvature[k] = upper[k] * curvature[k + 1] + curvature[k];
        }

        Ok(CubicSpline { x, y, curvature })
    }

    fn segment(&self, t: f64) -> Option<usize> {
        let n = self.x.len();
        if !(t >= self.x[0] && t <= self.x[n - 1]) {
            return None;
        }
        Some(self.x.partition_point(|&knot| knot <= t).clamp(1, n - 1) - 1)
    }

    pub fn eval(&self, t: f64) -> f64 {
        let Some(k) = self.segment(t) else {
            return if t < self.x[0] { self.y[0] } else { self.y[self.y.len() - 1] };
        };
        let h = self.x[k + 1] - self.x[k];
        let a = (self.x[k + 1] - t) / h;
        let b = (t - self.x[k]) / h;
        a * self.y[k]
            + b * self.y[k + 1]
            + ((a.powi(3) - a) * self.curvature[k] + (b.powi(3) - b) * self.curvature[k + 1]) * h * h / 6.0
    }

    pub fn derivative(&self, t: f64) -> f64 {
        let Some(k) = self.segment(t) else {
            return 0.0;
        };
        let h = self.x[k + 1] - self.x[k];
        let a = (self.x[k + 1] - t) / h;
        let b = (t - self.x[k]) / h;
        (self.y[k + 1] - self.y[k]) / h
            - (3.0 * a * a - 1.0) / 6.0 * h * self.curvature[k]
            + (3.0 * b * b - 1.0) / 6.0 * h * self.curvature[k + 1]
    }

    pub fn domain(&self) -> (f64, f64) {
        (self.x[0], self.x[self.x.len() - 1])
    }
}

#[test]
fn test_reproduces_knots_and_lines() {
    let x: Vec<f64> = (0..6).map(|i| i as f64).collect();
    let y: Vec<f64> = x.iter().map(|v| 3.0 * v - 1.0).collect();
    let spline = CubicSpline::natural(x, y).unwrap();
    for t in [0.0, 0.3, 2.5, 4.99, 5.0] {
        assert_approx_eq::assert_approx_eq!(spline.eval(t), 3.0 * t - 1.0, 1e-12);
        assert_approx_eq::assert_approx_eq!(spline.derivative(t), 3.0, 1e-12);
    }
}

#[test]
fn test_smooth_function() {
    let x: Vec<f64> = (0..=40).map(|i| i as f64 * 0.1).collect();
    let y: Vec<f64> = x.iter().map(|v| v.sin()).collect();
    let spline = CubicSpline::natural(x, y).unwrap();
    for t in [0.55, 1.234, 2.0, 3.3] {
        assert!((spline.eval(t) - f64::sin(t)).abs() < 1e-4);
        assert!((spline.derivative(t) - f64::cos(t)).abs() < 1e-3);
    }
}

#[test]
fn test_clamped_outside_table() {
    let spline = CubicSpline::natural(vec![1.0, 2.0, 3.0], vec![10.0, 20.0, 40.0]).unwrap();
    assert_eq!(spline.eval(0.0), 10.0);
    assert_eq!(spline.eval(5.0), 40.0);
    assert_eq!(spline.derivative(5.0), 0.0);
}

#[test]
fn test_rejects_unsorted_knots() {
    assert!(CubicSpline::natural(vec![1.0, 3.0, 2.0], vec![0.0; 3]).is_err());
    assert!(CubicSpline::natural(vec![1.0, 2.0], vec![0.0; 2]).is_err());
}
