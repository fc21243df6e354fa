use itertools::iproduct;
use ndarray::Array2;
use num_traits::Zero;
use rayon::prelude::*;
use std::f64::consts::PI;

use super::form_factors::Tensor4;
use super::Generations;
use crate::constants::CROSS_SECTION_FLOOR;
use crate::error::{PionError, Result};
use crate::{Complex, FloatType, Index};

/// Coefficients of the cross section as a quadratic polynomial in W1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossSectionCoefficients {
    pub constant: Complex,
    pub linear: Complex,
    pub quadratic: Complex,
}

/// Kaellen triangle function lambda(s, M2c, M2d).
pub fn triangle(s: FloatType, m2c: FloatType, m2d: FloatType) -> FloatType {
    s * s - 2.0 * (m2c + m2d) * s + (m2c - m2d).powi(2)
}

/// Combines the six F1 diagram factors and the F2 contact term into (Cconst, Clin, Cquad).
pub fn coefficients(
    [a, b, c, d]: [Index; 4],
    s: FloatType,
    m2: &[FloatType],
    f1: &Tensor4,
    f2: &Tensor4,
) -> CrossSectionCoefficients {
    let g1 = f1.get(a, b, c, d);
    let g2 = f1.get(d, b, c, a);
    let g3 = f1.get(c, d, a, b);
    let g4 = f1.get(a, c, b, d);
    let g5 = f1.get(a, d, c, b);
    let g6 = f1.get(c, b, a, d);
    let g7 = f2.get(a, b, c, d);

    let amplitude = (g7 * 2.0
        + (g2 + g3 - g5) * m2[a]
        + (g3 + g4 - g6) * m2[b]
        + (g1 + g2 - g6) * m2[c]
        + (g1 + g4 - g5) * m2[d])
        * 0.5;
    let g13 = g1 + g3 - g5 - g6;
    let g24 = g2 + g4 - g5 - g6;
    let (amp_cc, g13_cc, g24_cc) = (amplitude.conj(), g13.conj(), g24.conj());

    CrossSectionCoefficients {
        constant: amplitude * amp_cc + g13 * g13_cc * (0.25 * s * s)
            - (amp_cc * g13 + amplitude * g13_cc) * (0.5 * s),
        linear: (g13 * g24_cc + g13_cc * g24) * (0.25 * s) - (amp_cc * g24 + amplitude * g24_cc) * 0.5,
        quadratic: g24 * g24_cc * 0.25,
    }
}

/// s-wave cross section of a + b -> c + d at threshold, s = (m_a + m_b)^2.
///
/// Kinematically closed channels (lambda <= 0) and results below the numerical floor are
/// exactly zero. A zero mass on either incoming pion is an error.
pub fn cross_section(
    a: Index,
    b: Index,
    c: Index,
    d: Index,
    m2: &[FloatType],
    f1: &Tensor4,
    f2: &Tensor4,
) -> Result<Complex> {
    for &incoming in &[a, b] {
        if m2[incoming] < 0.0 || !m2[incoming].is_finite() {
            return Err(PionError::InvalidParameter {
                name: "mass squared of an annihilating pion",
                value: m2[incoming],
            });
        }
    }
    let (ma, mb) = (m2[a].sqrt(), m2[b].sqrt());
    if ma == 0.0 || mb == 0.0 {
        return Err(PionError::VanishingDenominator("mass of an annihilating pion"));
    }
    let s = (ma + mb).powi(2);
    if s == 0.0 {
        return Err(PionError::VanishingDenominator("Mandelstam s"));
    }

    let lambda = triangle(s, m2[c], m2[d]);
    if lambda <= 0.0 {
        return Ok(Complex::zero());
    }

    let coeffs = coefficients([a, b, c, d], s, m2, f1, f2);
    let w1 = m2[a] + m2[c] - (s + m2[a] - m2[b]) * (s + m2[c] - m2[d]) / (2.0 * s);
    let sigma = (coeffs.constant + coeffs.linear * w1 + coeffs.quadratic * (w1 * w1))
        * (lambda.sqrt() / (32.0 * PI * ma * mb * s));

    if sigma.norm() < CROSS_SECTION_FLOOR {
        Ok(Complex::zero())
    } else {
        Ok(sigma)
    }
}

/// sigma[i, j] = sum over SM pairs (c, d) of the cross section i + j -> c + d, for every
/// ordered pair of DM-charged indices. Other entries stay zero.
pub fn sigma_matrix(
    gens: Generations,
    m2: &[FloatType],
    f1: &Tensor4,
    f2: &Tensor4,
) -> Result<Array2<Complex>> {
    let n = gens.n_pions();
    if m2.len() != n || f1.dim() != n || f2.dim() != n {
        return Err(PionError::ShapeMismatch(format!(
            "{gens} expects {n} pions, got masses {} and tensors {}/{}",
            m2.len(),
            f1.dim(),
            f2.dim()
        )));
    }

    let sm = gens.sm_indices();
    let dm_pairs: Vec<(Index, Index)> = iproduct!(gens.dm_indices(), gens.dm_indices()).collect();

    let sums = dm_pairs
        .par_iter()
        .map(|&(i, j)| {
            let mut total = Complex::zero();
            for (&c, &d) in iproduct!(sm.iter(), sm.iter()) {
                total += cross_section(i, j, c, d, m2, f1, f2)?;
            }
            Ok(((i, j), total))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut sigma = Array2::zeros((n, n));
    for ((i, j), total) in sums {
        sigma[[i, j]] = total;
    }
    Ok(sigma)
}

#[cfg(test)]
fn dense_ones(n: usize) -> Tensor4 {
    Tensor4::Dense(ndarray::Array4::from_elem((n, n, n, n), Complex::new(1e-3, 2e-4)))
}

#[test]
fn test_closed_channel_is_exactly_zero() {
    let f = dense_ones(4);
    // Outgoing pions heavier than the threshold energy
    let m2 = [0.0, 1.0, 1.0, 100.0];
    assert_eq!(triangle(4.0, 100.0, 100.0), 4.0 * 4.0 - 2.0 * 200.0 * 4.0);
    let sigma = cross_section(1, 2, 3, 3, &m2, &f, &f).unwrap();
    assert_eq!(sigma, Complex::zero());
}

#[test]
fn test_zero_incoming_mass_fails() {
    let f = dense_ones(4);
    let m2 = [0.0, 1.0, 1.0, 0.1];
    assert!(matches!(
        cross_section(0, 1, 3, 3, &m2, &f, &f),
        Err(PionError::VanishingDenominator(_))
    ));
    assert!(matches!(
        cross_section(1, 0, 3, 3, &m2, &f, &f),
        Err(PionError::VanishingDenominator(_))
    ));
}

#[test]
fn test_open_channel_matches_polynomial() {
    let f = dense_ones(4);
    let m2 = [0.0, 1.0, 4.0, 0.25];
    let sigma = cross_section(1, 2, 3, 3, &m2, &f, &f).unwrap();

    let s = 9.0;
    let lambda = triangle(s, 0.25, 0.25);
    let coeffs = coefficients([1, 2, 3, 3], s, &m2, &f, &f);
    let w1 = 1.0 + 0.25 - (s + 1.0 - 4.0) * s / (2.0 * s);
    let want = (coeffs.constant + coeffs.linear * w1 + coeffs.quadratic * w1 * w1)
        * (lambda.sqrt() / (32.0 * PI * 2.0 * s));
    assert!((sigma - want).norm() <= 1e-12 * want.norm());
    assert!(sigma.norm() > 0.0);
}

#[test]
fn test_tiny_results_clamped() {
    let f = Tensor4::Dense(ndarray::Array4::from_elem((4, 4, 4, 4), Complex::new(1e-15, 0.0)));
    let m2 = [0.0, 1.0, 1.0, 0.0];
    assert_eq!(cross_section(1, 2, 3, 3, &m2, &f, &f).unwrap(), Complex::zero());
}

#[test]
fn test_sigma_matrix_only_fills_dm_block() {
    let gens = Generations::One;
    let f = dense_ones(15);
    let m2: Vec<f64> = (0..15).map(|i| 1.0 + 0.1 * i as f64).collect();
    let sigma = sigma_matrix(gens, &m2, &f, &f).unwrap();
    for ((i, j), value) in sigma.indexed_iter() {
        let in_dm = gens.dm_indices().contains(&i) && gens.dm_indices().contains(&j);
        if !in_dm {
            assert_eq!(*value, Complex::zero());
        }
    }
    assert!(sigma[[5, 6]].norm() > 0.0);
}
