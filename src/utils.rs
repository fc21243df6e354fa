pub mod balancer;
pub mod bessel;
pub mod io;
pub mod jacobian;
pub mod ode;
pub mod spline;

/// Evenly spaced grid of `num` points from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => vec![],
        1 => vec![start],
        _ => {
            let step = (stop - start) / (num - 1) as f64;
            (0..num).map(|i| start + step * i as f64).collect()
        }
    }
}

/// Grid of `num` points evenly spaced in log10 between 10^start_pow and 10^stop_pow.
pub fn logspace(start_pow: f64, stop_pow: f64, num: usize) -> Vec<f64> {
    linspace(start_pow, stop_pow, num)
        .into_iter()
        .map(|p| 10f64.powf(p))
        .collect()
}

#[test]
fn test_linspace_endpoints() {
    let grid = linspace(-1.0, 1.0, 5);
    assert_eq!(grid, vec![-1.0, -0.5, 0.0, 0.5, 1.0]);
    assert_eq!(linspace(3.0, 4.0, 1), vec![3.0]);
    assert!(linspace(3.0, 4.0, 0).is_empty());
}

#[test]
fn test_logspace() {
    let grid = logspace(0.0, 2.0, 3);
    assert_approx_eq::assert_approx_eq!(grid[0], 1.0);
    assert_approx_eq::assert_approx_eq!(grid[1], 10.0);
    assert_approx_eq::assert_approx_eq!(grid[2], 100.0, 1e-12);
}
