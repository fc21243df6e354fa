//! Pion mass spectrum.
//!
//! For one generation the masses are closed-form. For three generations the mass matrix is
//! built in the interaction basis from the ON/OFF functions and diagonalized numerically;
//! eigenpairs are matched to mass slots through their overlap with the rows of W.

use nalgebra::DMatrix;
use ndarray::Array1;
use std::f64::consts::PI;

use super::params::PionParams;
use super::tables::{
    dm_from_mass, generator_of, Mixing, SlotValue, ETA_PRIME_HEAVY_SLOT, ETA_PRIME_INTERACTION,
    ETA_PRIME_LIGHT_SLOT, MASS_LAYOUT_NGEN3,
};
use super::transform::complete_mass_transform;
use super::Generations;
use crate::config::WilsonCoefficients;
use crate::error::{PionError, Result};
use crate::{ComplexMatrix, FloatType, Index, MassSquaredArray};

/// Mass-squared values of one parameter point.
#[derive(Debug, Clone)]
pub struct MassSpectrum {
    /// DM-charge basis, one value per pion index
    pub m2_dm: MassSquaredArray,
    /// Mass basis
    pub m2_mass: MassSquaredArray,
    /// `m2_dm` restricted to the DM-charged indices
    pub m2_dm_arr: MassSquaredArray,
    /// Normalized interaction-to-mass transform, only for Ngen = 3
    pub w: Option<ComplexMatrix>,
}

impl MassSpectrum {
    fn from_mass_basis(gens: Generations, m2_mass: MassSquaredArray, w: Option<ComplexMatrix>) -> Self {
        let m2_dm: MassSquaredArray = dm_from_mass(gens).into_iter().map(|slot| m2_mass[slot]).collect();
        let m2_dm_arr = gens.dm_indices().map(|i| m2_dm[i]).collect();
        MassSpectrum {
            m2_dm,
            m2_mass,
            m2_dm_arr,
            w,
        }
    }

    /// Mass of the lightest DM-charged pion.
    pub fn lightest_dm_mass(&self) -> FloatType {
        self.m2_dm_arr
            .iter()
            .copied()
            .fold(FloatType::INFINITY, FloatType::min)
            .sqrt()
    }
}

/// Closed-form Ngen = 1 spectrum.
pub fn pion_mass_sq_ngen1(params: &PionParams, wilson: &WilsonCoefficients) -> MassSpectrum {
    let WilsonCoefficients { ca, cz, cg, cw } = *wilson;
    let fpi = params.fpi;
    let fsq = fpi * fpi;
    let md = params.mass_d;
    let sq = params.s_q_sq;
    let eqsq = params.eq * params.eq;
    let gssq = params.gs * params.gs;
    let (pi2, pi3) = (PI * PI, PI * PI * PI);

    let msq0 = 64.0 * fpi * (md * pi3 + 6.0 * fpi * params.kappa * pi2);
    let msq1to4 = fsq * (-3.0 * ca * eqsq + 2.0 * cz * eqsq - 9.0 * cg * gssq + 6.0 * cw * gssq) / 6.0
        + cz * eqsq * fsq / (6.0 * sq)
        - cz * eqsq * fsq * sq / 2.0;
    let msq5and8 = 64.0 * fpi * md * pi3;
    let msq6and7 = -2.0 * fpi * (3.0 * ca * eqsq * fpi - cz * eqsq * fpi - 96.0 * md * pi3) / 3.0
        - 2.0 * cz * eqsq * fsq * sq;
    let msq9to12 = -0.5 * fpi * (ca * eqsq * fpi + 3.0 * cg * fpi * gssq - 128.0 * md * pi3)
        + cz * eqsq * fsq / (18.0 * sq)
        - cz * eqsq * fsq * sq / 2.0;
    let msq14 = 64.0 * fpi * md * pi3;

    let m2_mass = Array1::from(vec![
        msq0, msq1to4, msq1to4, msq1to4, msq1to4, msq5and8, msq6and7, msq6and7, msq5and8,
        msq9to12, msq9to12, msq9to12, msq9to12, 0.0, msq14,
    ]);
    MassSpectrum::from_mass_basis(Generations::One, m2_mass, None)
}

/// The ON/OFF functions entering the Ngen = 3 mass matrix.
#[derive(Debug, Clone, Copy)]
pub struct MassFunctions {
    wilson: WilsonCoefficients,
    kappa: f64,
    s_q_sq: f64,
    /// e_Q^2 Lambda_W^2 / pi^2
    eq_term: f64,
    /// g_s^2 Lambda_W^2 / pi^2
    gs_term: f64,
    lambda_sq: f64,
    /// Lambda_W^3 m_DM / f^2
    condensate: f64,
}

impl MassFunctions {
    pub fn new(params: &PionParams, wilson: &WilsonCoefficients) -> Self {
        let lambda = params.lambda_w();
        let lambda_sq = lambda * lambda;
        MassFunctions {
            wilson: *wilson,
            kappa: params.kappa,
            s_q_sq: params.s_q_sq,
            eq_term: params.eq * params.eq * lambda_sq / (PI * PI),
            gs_term: params.gs * params.gs * lambda_sq / (PI * PI),
            lambda_sq,
            condensate: lambda_sq * lambda * params.mass_d / (params.fpi * params.fpi),
        }
    }

    pub fn off_1(&self) -> f64 {
        -2.0 * 6f64.sqrt() / 7.0 * self.condensate
    }

    pub fn off_2(&self) -> f64 {
        self.wilson.cw * self.gs_term / 16.0
    }

    pub fn off_3(&self) -> f64 {
        -self.off_2()
    }

    pub fn on_1(&self) -> f64 {
        2.0 / 7.0 * self.condensate + 56.0 * self.kappa * self.lambda_sq
    }

    pub fn on_2(&self) -> f64 {
        self.on_5() + self.wilson.cw * self.gs_term / 16.0
    }

    pub fn on_3(&self) -> f64 {
        0.0
    }

    pub fn on_4(&self) -> f64 {
        let WilsonCoefficients { ca, cz, .. } = self.wilson;
        let sq = self.s_q_sq;
        self.eq_term * (-ca / 8.0 + cz / 12.0 - cz * sq / 8.0 + cz / (72.0 * sq))
    }

    pub fn on_5(&self) -> f64 {
        let WilsonCoefficients { ca, cz, cg, .. } = self.wilson;
        let sq = self.s_q_sq;
        self.eq_term * (-ca / 32.0 + cz / 48.0 - cz * sq / 32.0 + cz / (96.0 * sq))
            - 3.0 * cg * self.gs_term / 32.0
    }

    pub fn on_6(&self) -> f64 {
        self.condensate
    }

    pub fn on_7(&self) -> f64 {
        let WilsonCoefficients { ca, cz, .. } = self.wilson;
        self.eq_term * (-ca / 8.0 + cz / 24.0 - cz * self.s_q_sq / 8.0) + self.condensate
    }

    pub fn on_8(&self) -> f64 {
        -self.wilson.cg * self.gs_term / 4.0
    }

    pub fn on_9(&self) -> f64 {
        let WilsonCoefficients { ca, cz, cg, .. } = self.wilson;
        let sq = self.s_q_sq;
        self.eq_term * (-ca / 32.0 - cz * sq / 32.0 + cz / (288.0 * sq))
            - 3.0 * cg * self.gs_term / 32.0
            + self.condensate
    }

    pub fn on_10(&self) -> f64 {
        12.0 / 7.0 * self.condensate
    }

    /// Closed-form eigenvalue of a slot group.
    pub fn slot_value(&self, value: SlotValue) -> f64 {
        match value {
            SlotValue::On2 => self.on_2(),
            SlotValue::On3 => self.on_3(),
            SlotValue::On4 => self.on_4(),
            SlotValue::On5MinusOff2 => self.on_5() - self.off_2(),
            SlotValue::On5PlusOff2 => self.on_5() + self.off_2(),
            SlotValue::On5MinusOff3 => self.on_5() - self.off_3(),
            SlotValue::On5PlusOff3 => self.on_5() + self.off_3(),
            SlotValue::On6 => self.on_6(),
            SlotValue::On7 => self.on_7(),
            SlotValue::On8 => self.on_8(),
            SlotValue::On9 => self.on_9(),
        }
    }

    /// Eigenvalues (light, heavy) of the eta' block [[ON_1, OFF_1], [OFF_1, ON_10]].
    pub fn eta_prime_eigenvalues(&self) -> (f64, f64) {
        let (on1, on10) = (self.on_1(), self.on_10());
        let root = self.eta_prime_root();
        (0.5 * (on1 + on10 - root), 0.5 * (on1 + on10 + root))
    }

    /// Interaction-index 0 components (x_minus, x_plus) of the eta' eigenvectors (x, 1).
    pub fn eta_prime_mixing(&self) -> Result<(f64, f64)> {
        let off1 = self.off_1();
        if off1 == 0.0 {
            return Err(PionError::VanishingDenominator("OFF_1 in the eta' mixing"));
        }
        let delta = self.on_1() - self.on_10();
        let root = self.eta_prime_root();
        Ok((0.5 * (delta - root) / off1, 0.5 * (delta + root) / off1))
    }

    fn eta_prime_root(&self) -> f64 {
        let off1 = self.off_1();
        let delta = self.on_1() - self.on_10();
        (4.0 * off1 * off1 + delta * delta).sqrt()
    }

    /// The 91x91 mass-squared matrix in the interaction basis.
    pub fn interaction_mass_matrix(&self) -> DMatrix<f64> {
        let n = Generations::Three.n_pions();
        let mut m = DMatrix::zeros(n, n);

        for (mass, value) in MASS_LAYOUT_NGEN3.values.iter().enumerate() {
            if let Some(value) = value {
                let i = generator_of(mass);
                m[(i, i)] = if value.is_mixed() { self.on_5() } else { self.slot_value(*value) };
            }
        }
        for &(minus, plus, mixing) in MASS_LAYOUT_NGEN3.mixed.iter() {
            let off = match mixing {
                Mixing::Off2 => self.off_2(),
                Mixing::Off3 => self.off_3(),
            };
            let (i, j) = (generator_of(minus), generator_of(plus));
            m[(i, j)] = off;
            m[(j, i)] = off;
        }

        let [e0, e1] = ETA_PRIME_INTERACTION;
        m[(e0, e0)] = self.on_1();
        m[(e1, e1)] = self.on_10();
        m[(e0, e1)] = self.off_1();
        m[(e1, e0)] = self.off_1();
        m
    }
}

/// A real eigenpair living on a connected block of interaction indices.
#[derive(Debug, Clone)]
pub struct Eigenpair {
    pub value: f64,
    pub support: Vec<Index>,
    pub vector: Vec<f64>,
}

/// Splits `matrix` into connected blocks and diagonalizes each one.
///
/// Fails with `ComplexEigenvalue` when any eigenvalue has |Im| >= `tolerance`; the imaginary
/// parts are discarded otherwise.
pub fn diagonalize_mass_matrix(matrix: &DMatrix<f64>, tolerance: f64) -> Result<Vec<Eigenpair>> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(PionError::ShapeMismatch(format!(
            "mass matrix is {}x{}",
            n,
            matrix.ncols()
        )));
    }

    let mut pairs = Vec::with_capacity(n);
    for block in connected_blocks(matrix) {
        if block.len() == 1 {
            let i = block[0];
            pairs.push(Eigenpair {
                value: matrix[(i, i)],
                support: block,
                vector: vec![1.0],
            });
            continue;
        }

        let size = block.len();
        let sub = DMatrix::from_fn(size, size, |r, c| matrix[(block[r], block[c])]);
        for (k, lambda) in sub.complex_eigenvalues().iter().enumerate() {
            if lambda.im.abs() >= tolerance {
                return Err(PionError::ComplexEigenvalue {
                    index: block[k],
                    imaginary: lambda.im,
                });
            }
            pairs.push(Eigenpair {
                value: lambda.re,
                support: block.clone(),
                vector: null_vector(&sub, lambda.re)?,
            });
        }
    }
    Ok(pairs)
}

/// Groups indices connected through nonzero off-diagonal entries.
fn connected_blocks(matrix: &DMatrix<f64>) -> Vec<Vec<Index>> {
    let n = matrix.nrows();
    let mut block_of: Vec<Option<usize>> = vec![None; n];
    let mut blocks: Vec<Vec<Index>> = vec![];
    for start in 0..n {
        if block_of[start].is_some() {
            continue;
        }
        let id = blocks.len();
        let mut members = vec![start];
        block_of[start] = Some(id);
        let mut cursor = 0;
        while cursor < members.len() {
            let i = members[cursor];
            for j in 0..n {
                if block_of[j].is_none() && (matrix[(i, j)] != 0.0 || matrix[(j, i)] != 0.0) {
                    block_of[j] = Some(id);
                    members.push(j);
                }
            }
            cursor += 1;
        }
        members.sort_unstable();
        blocks.push(members);
    }
    blocks
}

/// Unit vector spanning the (numerical) null space of `sub - lambda`.
fn null_vector(sub: &DMatrix<f64>, lambda: f64) -> Result<Vec<f64>> {
    let size = sub.nrows();
    let shifted = sub - DMatrix::<f64>::identity(size, size) * lambda;
    let svd = shifted.svd(false, true);
    let v_t = svd
        .v_t
        .ok_or_else(|| PionError::ShapeMismatch("SVD returned no right singular vectors".into()))?;
    let smallest = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(k, _)| k)
        .unwrap_or(0);
    Ok(v_t.row(smallest).iter().copied().collect())
}

/// Assigns each mass slot (row of `w`) the eigenvalue whose eigenvector overlaps most with it.
fn match_eigenpairs(w: &ComplexMatrix, pairs: &[Eigenpair]) -> Result<MassSquaredArray> {
    let n = w.nrows();

    // Overlap of every slot with every eigenpair sharing its support
    let mut candidates: Vec<(f64, Index, usize)> = vec![];
    for slot in 0..n {
        for (p, pair) in pairs.iter().enumerate() {
            let overlap: f64 = pair
                .support
                .iter()
                .zip(&pair.vector)
                .map(|(&i, &v)| w[[slot, i]].re * v)
                .sum();
            if overlap.abs() > 0.0 {
                candidates.push((overlap.abs(), slot, p));
            }
        }
    }
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0));

    // Greedy assignment, largest overlap first
    let mut slot_value: Vec<Option<f64>> = vec![None; n];
    let mut used = vec![false; pairs.len()];
    for (_, slot, p) in candidates {
        if slot_value[slot].is_none() && !used[p] {
            slot_value[slot] = Some(pairs[p].value);
            used[p] = true;
        }
    }
    slot_value
        .into_iter()
        .enumerate()
        .map(|(slot, value)| {
            value.ok_or_else(|| {
                PionError::ShapeMismatch(format!("no eigenvector overlaps mass slot {slot}"))
            })
        })
        .collect()
}

/// Numerically diagonalized Ngen = 3 spectrum.
///
/// `core` is the parameter-independent part of W; the eta' entries are filled in here.
/// The light eta' eigenvalue goes to mass index 89 and the heavy one to mass index 90,
/// matching the rows (x_minus, 1) and (x_plus, 1) of W.
pub fn pion_mass_sq_ngen3(
    params: &PionParams,
    wilson: &WilsonCoefficients,
    core: &ComplexMatrix,
    tolerance: f64,
) -> Result<MassSpectrum> {
    let functions = MassFunctions::new(params, wilson);
    let (x_minus, x_plus) = functions.eta_prime_mixing()?;
    let w = complete_mass_transform(core, x_minus, x_plus)?;

    let pairs = diagonalize_mass_matrix(&functions.interaction_mass_matrix(), tolerance)?;
    let m2_mass = match_eigenpairs(&w, &pairs)?;

    log::debug!(
        "Ngen3 eta' block: light {:e}, heavy {:e}",
        m2_mass[ETA_PRIME_LIGHT_SLOT],
        m2_mass[ETA_PRIME_HEAVY_SLOT]
    );
    Ok(MassSpectrum::from_mass_basis(Generations::Three, m2_mass, Some(w)))
}

/// Dispatches on the generation count. Ngen = 3 needs the core of W.
pub fn pion_mass_sq(
    gens: Generations,
    params: &PionParams,
    wilson: &WilsonCoefficients,
    core: Option<&ComplexMatrix>,
    tolerance: f64,
) -> Result<MassSpectrum> {
    match gens {
        Generations::One => Ok(pion_mass_sq_ngen1(params, wilson)),
        Generations::Three => {
            let core = core.ok_or_else(|| {
                PionError::ShapeMismatch("Ngen3 mass spectrum needs the core transform".into())
            })?;
            pion_mass_sq_ngen3(params, wilson, core, tolerance)
        }
    }
}

#[cfg(test)]
fn benchmark() -> PionParams {
    PionParams::from_charge_and_bsmall(0.8, 155000.0, 1.0, 0.5, 0.01, 0.3).unwrap()
}

#[test]
fn test_ngen1_benchmark_spectrum() {
    let spectrum = pion_mass_sq_ngen1(&benchmark(), &WilsonCoefficients::default());
    assert_eq!(spectrum.m2_dm.len(), 15);
    assert_eq!(spectrum.m2_dm[13], 0.0);
    assert_eq!(spectrum.m2_mass[13], 0.0);
    assert!(spectrum.m2_dm[0] > 0.0);
    assert_eq!(spectrum.m2_dm_arr.len(), 8);

    // Partners of each DM pair are degenerate
    for pair in spectrum.m2_dm_arr.to_vec().chunks(2) {
        assert_eq!(pair[0], pair[1]);
    }
}

#[test]
fn test_ngen3_matches_closed_form() {
    use super::transform::core_mass_transform;

    let params = benchmark();
    let wilson = WilsonCoefficients::default();
    let functions = MassFunctions::new(&params, &wilson);
    let spectrum = pion_mass_sq_ngen3(&params, &wilson, &core_mass_transform(), 1e-2).unwrap();

    for (m, value) in MASS_LAYOUT_NGEN3.values.iter().enumerate() {
        if let Some(value) = value {
            let want = functions.slot_value(*value);
            let got = spectrum.m2_mass[m];
            assert!((got - want).abs() <= 1e-9 * want.abs().max(1.0), "mass index {m}: {got} vs {want}");
        }
    }
    let (light, heavy) = functions.eta_prime_eigenvalues();
    assert!((spectrum.m2_mass[ETA_PRIME_LIGHT_SLOT] - light).abs() <= 1e-9 * heavy.abs());
    assert!((spectrum.m2_mass[ETA_PRIME_HEAVY_SLOT] - heavy).abs() <= 1e-9 * heavy.abs());
    assert!(heavy > light);
    assert_eq!(spectrum.m2_dm_arr.len(), 24);
    assert_eq!(spectrum.m2_dm[0], spectrum.m2_mass[ETA_PRIME_HEAVY_SLOT]);
}

#[test]
fn test_ngen3_dm_pairs_degenerate() {
    use super::transform::core_mass_transform;

    let params = benchmark();
    let wilson = WilsonCoefficients::default();
    let functions = MassFunctions::new(&params, &wilson);
    let spectrum = pion_mass_sq_ngen3(&params, &wilson, &core_mass_transform(), 1e-2).unwrap();

    let pairs: Vec<(f64, f64)> = spectrum.m2_dm_arr.to_vec().chunks(2).map(|p| (p[0], p[1])).collect();
    assert_eq!(pairs.len(), 12);
    for (k, (first, second)) in pairs.iter().enumerate() {
        assert_eq!(first, second, "pair {k}");
        let want = match k {
            0..=2 => functions.on_6(),
            3..=5 => functions.on_7(),
            _ => functions.on_9(),
        };
        assert!((first - want).abs() <= 1e-9 * want.abs(), "pair {k}: {first} vs {want}");
    }
}

#[test]
fn test_complex_eigenvalue_rejected() {
    let rotation = DMatrix::from_row_slice(2, 2, &[0.0, 1.0, -1.0, 0.0]);
    let err = diagonalize_mass_matrix(&rotation, 1e-2).unwrap_err();
    assert!(matches!(err, PionError::ComplexEigenvalue { .. }));
}

#[test]
fn test_blocks_split_on_zero_couplings() {
    let matrix = DMatrix::from_row_slice(3, 3, &[2.0, 0.0, 1.0, 0.0, 5.0, 0.0, 1.0, 0.0, 2.0]);
    assert_eq!(connected_blocks(&matrix), vec![vec![0, 2], vec![1]]);

    let mut values: Vec<f64> = diagonalize_mass_matrix(&matrix, 1e-2)
        .unwrap()
        .into_iter()
        .map(|pair| pair.value)
        .collect();
    values.sort_by(f64::total_cmp);
    for (got, want) in values.iter().zip([1.0, 3.0, 5.0]) {
        assert_approx_eq::assert_approx_eq!(*got, want, 1e-12);
    }
}

#[test]
fn test_eta_prime_massless_without_kappa() {
    let params = PionParams::from_charge_and_bsmall(0.8, 155000.0, 0.0, 0.5, 0.01, 0.3).unwrap();
    let functions = MassFunctions::new(&params, &WilsonCoefficients::default());
    let (light, heavy) = functions.eta_prime_eigenvalues();
    assert!(light.abs() < 1e-9 * heavy);
}
