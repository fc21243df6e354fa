use ndarray::Array2;
use num_traits::Zero;

use super::Generations;
use crate::error::{PionError, Result};
use crate::{Complex, FloatType, MassSquaredArray};

/// Boltzmann weight g (1 + delta)^(3/2) exp(-x delta) of one DM pion.
fn boltzmann_weight(g: FloatType, delta: FloatType, x: FloatType) -> FloatType {
    g * (1.0 + delta).powf(1.5) * (-x * delta).exp()
}

/// Relative mass splittings (m_i - m_1) / m_1 with respect to the lightest DM pion.
pub fn mass_splittings(m2_dm_arr: &MassSquaredArray) -> Result<Vec<FloatType>> {
    let masses: Vec<FloatType> = m2_dm_arr.iter().map(|m2| m2.sqrt()).collect();
    let m1 = masses.iter().copied().fold(FloatType::INFINITY, FloatType::min);
    if m1 == 0.0 || !m1.is_finite() {
        return Err(PionError::VanishingDenominator("lightest DM pion mass m1"));
    }
    Ok(masses.iter().map(|m| (m - m1) / m1).collect())
}

/// Effective coannihilation cross section
///
/// a_eff = sum_ij sigma_ij w_i w_j / g_eff^2, with w_i the Boltzmann weight of DM pion i at
/// x = m_1 / T and g_eff = sum_i w_i. `m2_dm_arr` and `degeneracies` follow the order of
/// `gens.dm_indices()`.
pub fn effective_cross_section(
    gens: Generations,
    sigma: &Array2<Complex>,
    m2_dm_arr: &MassSquaredArray,
    degeneracies: &[FloatType],
    x: FloatType,
) -> Result<Complex> {
    let dm: Vec<usize> = gens.dm_indices().collect();
    if m2_dm_arr.len() != dm.len() || degeneracies.len() != dm.len() {
        return Err(PionError::ShapeMismatch(format!(
            "{gens} has {} DM pions, got {} masses and {} degeneracies",
            dm.len(),
            m2_dm_arr.len(),
            degeneracies.len()
        )));
    }

    let weights: Vec<FloatType> = mass_splittings(m2_dm_arr)?
        .into_iter()
        .zip(degeneracies)
        .map(|(delta, &g)| boltzmann_weight(g, delta, x))
        .collect();

    let g_eff_sq = weights.iter().sum::<FloatType>().powi(2);
    if g_eff_sq == 0.0 {
        return Err(PionError::VanishingDenominator("g_eff^2"));
    }

    let mut total = Complex::zero();
    for (l, &i) in dm.iter().enumerate() {
        for (k, &j) in dm.iter().enumerate() {
            total += sigma[[i, j]] * (weights[l] * weights[k]);
        }
    }
    Ok(total / g_eff_sq)
}

#[test]
fn test_degenerate_spectrum_averages_sigma() {
    // Equal masses: a_eff is the plain average of the DM block
    let gens = Generations::One;
    let mut sigma = Array2::zeros((15, 15));
    for i in gens.dm_indices() {
        for j in gens.dm_indices() {
            sigma[[i, j]] = Complex::new((i + j) as f64, 0.0);
        }
    }
    let m2 = MassSquaredArray::from_elem(8, 4.0);
    let aeff = effective_cross_section(gens, &sigma, &m2, &[1.0; 8], 20.0).unwrap();

    let mean: f64 = gens
        .dm_indices()
        .flat_map(|i| gens.dm_indices().map(move |j| (i + j) as f64))
        .sum::<f64>()
        / 64.0;
    assert_approx_eq::assert_approx_eq!(aeff.re, mean, 1e-12);
    assert_eq!(aeff.im, 0.0);
}

#[test]
fn test_heavy_partners_suppressed() {
    let gens = Generations::One;
    let mut sigma = Array2::zeros((15, 15));
    sigma[[5, 5]] = Complex::new(1.0, 0.0);
    sigma[[12, 12]] = Complex::new(1.0, 0.0);
    let mut m2 = MassSquaredArray::from_elem(8, 4.0);
    m2[7] = 9.0;

    let aeff = effective_cross_section(gens, &sigma, &m2, &[1.0; 8], 20.0).unwrap();
    // Only the light pion at index 5 contributes appreciably
    let weight_light = 1.0;
    let weight_heavy = boltzmann_weight(1.0, 0.5, 20.0);
    let g_eff = 7.0 * weight_light + weight_heavy;
    let want = (weight_light.powi(2) + weight_heavy.powi(2)) / g_eff.powi(2);
    assert_approx_eq::assert_approx_eq!(aeff.re, want, 1e-14);
}

#[test]
fn test_massless_lightest_pion_fails() {
    let gens = Generations::One;
    let sigma = Array2::zeros((15, 15));
    let mut m2 = MassSquaredArray::from_elem(8, 4.0);
    m2[0] = 0.0;
    assert!(matches!(
        effective_cross_section(gens, &sigma, &m2, &[1.0; 8], 20.0),
        Err(PionError::VanishingDenominator(_))
    ));
}

#[test]
fn test_zero_degeneracies_fail() {
    let gens = Generations::One;
    let sigma = Array2::zeros((15, 15));
    let m2 = MassSquaredArray::from_elem(8, 4.0);
    assert!(matches!(
        effective_cross_section(gens, &sigma, &m2, &[0.0; 8], 20.0),
        Err(PionError::VanishingDenominator("g_eff^2"))
    ));
}
