//! Basis transforms of the form factors.
//!
//! All transforms act as F'(e,f,g,h) = sum U(a,e) U(b,f) U(c,g) U(d,h) F(a,b,c,d), so that
//! T(A, T(B, F)) = T(BA, F). With Pi_mass = W Pi_int and Pi_mass = V Pi_DM this gives
//! F_mass = T(W^dagger, F_int) and F_DM = T(V, F_mass) = T(W^dagger V, F_int).

use csv::{ReaderBuilder, Trim};
use ndarray::{Array2, Array4};
use num_traits::Zero;
use rayon::prelude::*;
use std::f64::consts::FRAC_1_SQRT_2;
use std::path::Path;

use super::form_factors::{FormFactors, SparseTensor4, Tensor4};
use super::tables::{
    generator_of, neutral_slots, pair_tables, ETA_PRIME_HEAVY_SLOT, ETA_PRIME_INTERACTION,
    ETA_PRIME_LIGHT_SLOT, MASS_LAYOUT_NGEN3,
};
use super::Generations;
use crate::error::{PionError, Result};
use crate::{Complex, ComplexMatrix, FloatType, Index};

/// Applies U to all four indices of F.
pub fn transform_tensor(u: &ComplexMatrix, f: &Tensor4) -> Result<Tensor4> {
    let n = f.dim();
    if u.nrows() != n || u.ncols() != n {
        return Err(PionError::ShapeMismatch(format!(
            "transform of shape {:?} applied to tensor of dimension {n}",
            u.shape()
        )));
    }
    match f {
        Tensor4::Dense(array) => transform_dense(u, array).map(Tensor4::Dense),
        Tensor4::Sparse(sparse) => Ok(Tensor4::Sparse(transform_sparse(u, sparse))),
    }
}

pub fn transform_form_factors(u: &ComplexMatrix, form_factors: &FormFactors) -> Result<FormFactors> {
    Ok(FormFactors {
        f1: transform_tensor(u, &form_factors.f1)?,
        f2: transform_tensor(u, &form_factors.f2)?,
    })
}

// Contracts the leading index and rotates the new index to the back, four times.
fn transform_dense(u: &ComplexMatrix, f: &Array4<Complex>) -> Result<Array4<Complex>> {
    let n = u.nrows();
    let shape_error = |e: ndarray::ShapeError| PionError::ShapeMismatch(e.to_string());
    let ut = u.t();
    let mut current = f.as_standard_layout().into_owned();
    for _ in 0..4 {
        let flat = current.into_shape((n, n * n * n)).map_err(shape_error)?;
        let contracted = ut.dot(&flat);
        let rotated = contracted
            .into_shape((n, n, n, n))
            .map_err(shape_error)?
            .permuted_axes([1, 2, 3, 0]);
        current = rotated.as_standard_layout().into_owned();
    }
    Ok(current)
}

// Expands every nonzero of F over the nonzero entries of the four rows of U it touches.
fn transform_sparse(u: &ComplexMatrix, f: &SparseTensor4) -> SparseTensor4 {
    let rows: Vec<Vec<(Index, Complex)>> = u
        .outer_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .filter(|(_, v)| !v.is_zero())
                .map(|(e, v)| (e, *v))
                .collect()
        })
        .collect();

    let mut out = SparseTensor4::new(f.n);
    f.entries.par_iter().for_each(|entry| {
        let [a, b, c, d] = f.unpack(*entry.key());
        let value = *entry.value();
        for &(e, ue) in &rows[a] {
            let ve = value * ue;
            for &(g, ug) in &rows[b] {
                let vg = ve * ug;
                for &(h, uh) in &rows[c] {
                    let vh = vg * uh;
                    for &(k, uk) in &rows[d] {
                        out.add([e, g, h, k], vh * uk);
                    }
                }
            }
        }
    });
    out.prune();
    out
}

/// Mass-to-DM-charge rotation V, with Pi_mass = V Pi_DM. Unitary.
///
/// Each DM pair (d, d+1) is built from the real (A) and imaginary (B) mass states,
/// Pi_A = (Pi_d + Pi_{d+1}) / sqrt(2) and Pi_B = i (Pi_d - Pi_{d+1}) / sqrt(2).
pub fn dm_transform_matrix(gens: Generations) -> ComplexMatrix {
    let n = gens.n_pions();
    let mut v = Array2::zeros((n, n));
    let (starts, partner_a, partner_b) = pair_tables(gens);
    for ((&d, &a), &b) in starts.iter().zip(partner_a).zip(partner_b) {
        v[[a, d]] = Complex::new(FRAC_1_SQRT_2, 0.0);
        v[[a, d + 1]] = Complex::new(FRAC_1_SQRT_2, 0.0);
        v[[b, d]] = Complex::new(0.0, FRAC_1_SQRT_2);
        v[[b, d + 1]] = Complex::new(0.0, -FRAC_1_SQRT_2);
    }
    for (dm, slot) in neutral_slots(gens) {
        v[[slot, dm]] = Complex::new(1.0, 0.0);
    }
    v
}

/// Parameter-independent part of the Ngen = 3 interaction-to-mass matrix W (rows = mass
/// states, columns = interaction indices), before row normalization. Mass state m is
/// `generator_of(m)` except in the ON_5 pairs and the eta' block, whose interaction-index 0
/// entries W[89, 0] and W[90, 0] are left empty.
pub fn core_mass_transform() -> ComplexMatrix {
    let n = Generations::Three.n_pions();
    let mut w = Array2::zeros((n, n));
    let one = Complex::new(1.0, 0.0);
    for m in 0..n {
        if m != ETA_PRIME_HEAVY_SLOT && m != ETA_PRIME_LIGHT_SLOT {
            w[[m, generator_of(m)]] = one;
        }
    }
    // Mixed pairs: minus state (1, -1), plus state (1, 1) over the two generators
    for &(minus, plus, _) in MASS_LAYOUT_NGEN3.mixed.iter() {
        w[[minus, generator_of(plus)]] = -one;
        w[[plus, generator_of(minus)]] = one;
    }
    w[[ETA_PRIME_HEAVY_SLOT, ETA_PRIME_INTERACTION[1]]] = one;
    w[[ETA_PRIME_LIGHT_SLOT, ETA_PRIME_INTERACTION[1]]] = one;
    w
}

/// Loads the sparse core of W from `value, row, col` lines (1-based indices).
pub fn load_core_transform(path: &Path, n: usize) -> Result<ComplexMatrix> {
    let malformed = |msg: String| PionError::MalformedAsset(path.to_path_buf(), msg);

    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .trim(Trim::All)
        .comment(Some(b'#'))
        .from_path(path)
        .map_err(|e| PionError::Io(path.to_path_buf(), e.to_string()))?;

    let mut w = Array2::zeros((n, n));
    for (line, record) in rdr.deserialize::<(String, usize, usize)>().enumerate() {
        let (value, row, col) = record.map_err(|e| malformed(e.to_string()))?;
        let value = parse_complex(&value)
            .ok_or_else(|| malformed(format!("line {}: bad value {value:?}", line + 1)))?;
        if row == 0 || col == 0 || row > n || col > n {
            return Err(malformed(format!("line {}: index ({row}, {col}) out of range", line + 1)));
        }
        w[[row - 1, col - 1]] = value;
    }
    Ok(w)
}

/// Parses "1.5", "(1.5+0j)", "-2e-3-1j" and the like.
pub fn parse_complex(text: &str) -> Option<Complex> {
    let text = text.trim().trim_start_matches('(').trim_end_matches(')');
    let Some(body) = text.strip_suffix('j') else {
        return text.parse().ok().map(|re| Complex::new(re, 0.0));
    };

    // Split at the last sign that does not belong to an exponent
    let bytes = body.as_bytes();
    let split = (1..bytes.len())
        .rev()
        .find(|&i| (bytes[i] == b'+' || bytes[i] == b'-') && !matches!(bytes[i - 1], b'e' | b'E'));
    match split {
        Some(i) => Some(Complex::new(body[..i].parse().ok()?, body[i..].parse().ok()?)),
        None => Some(Complex::new(0.0, body.parse().ok()?)),
    }
}

/// Completes W with the eta' mixing entries and normalizes every row, so that W is unitary
/// and the mixed states carry 1/sqrt(2) of each generator.
pub fn complete_mass_transform(
    core: &ComplexMatrix,
    x_minus: FloatType,
    x_plus: FloatType,
) -> Result<ComplexMatrix> {
    let mut w = core.clone();
    w[[ETA_PRIME_LIGHT_SLOT, ETA_PRIME_INTERACTION[0]]] = Complex::new(x_minus, 0.0);
    w[[ETA_PRIME_HEAVY_SLOT, ETA_PRIME_INTERACTION[0]]] = Complex::new(x_plus, 0.0);
    for (slot, mut row) in w.outer_iter_mut().enumerate() {
        let norm = row.iter().map(|v| v.norm_sqr()).sum::<FloatType>().sqrt();
        if norm == 0.0 || !norm.is_finite() {
            return Err(PionError::ShapeMismatch(format!("mass transform row {slot} has norm {norm}")));
        }
        row.mapv_inplace(|v| v / norm);
    }
    Ok(w)
}

/// U = W^dagger V, taking interaction-basis tensors straight to the DM-charge basis.
pub fn interaction_to_dm_transform(w: &ComplexMatrix, v: &ComplexMatrix) -> ComplexMatrix {
    w.t().mapv(|x| x.conj()).dot(v)
}

/// Largest entry of |M M^dagger - 1|.
pub fn unitarity_defect(m: &ComplexMatrix) -> FloatType {
    let product = m.dot(&m.t().mapv(|x| x.conj()));
    product
        .indexed_iter()
        .map(|((r, c), v)| {
            let identity = if r == c { 1.0 } else { 0.0 };
            (*v - identity).norm()
        })
        .fold(0.0, FloatType::max)
}

#[test]
fn test_dm_transform_unitary() {
    for gens in [Generations::One, Generations::Three] {
        let v = dm_transform_matrix(gens);
        assert!(unitarity_defect(&v) < 1e-14, "{gens}");
    }
}

#[test]
fn test_dm_transform_identity_outside_pairs() {
    let v = dm_transform_matrix(Generations::One);
    for i in [0, 1, 2, 3, 4, 13, 14] {
        for j in 0..15 {
            let want = if i == j { 1.0 } else { 0.0 };
            assert_eq!(v[[i, j]], Complex::new(want, 0.0));
            assert_eq!(v[[j, i]], Complex::new(want, 0.0));
        }
    }
}

#[test]
fn test_round_trip_restores_interaction_basis() {
    use super::form_factors::build_form_factors;
    use super::generators::build_generators;

    let gens = Generations::One;
    let form_factors = build_form_factors(&build_generators(gens), gens).unwrap();
    let v = dm_transform_matrix(gens);
    let v_dagger = v.t().mapv(|x| x.conj());

    let dm_basis = transform_tensor(&v, &form_factors.f1).unwrap();
    let back = transform_tensor(&v_dagger, &dm_basis).unwrap();
    assert!(back.max_abs_diff(&form_factors.f1).unwrap() < 1e-13);
}

#[test]
fn test_sparse_and_dense_transforms_agree() {
    use super::form_factors::build_form_factors;
    use super::generators::build_generators;

    let gens = Generations::One;
    let form_factors = build_form_factors(&build_generators(gens), gens).unwrap();
    let dense = form_factors.f2;
    let sparse = match &dense {
        Tensor4::Dense(array) => {
            let sparse = SparseTensor4::new(15);
            for ((a, b, c, d), v) in array.indexed_iter() {
                if !v.is_zero() {
                    sparse.add([a, b, c, d], *v);
                }
            }
            Tensor4::Sparse(sparse)
        }
        Tensor4::Sparse(_) => unreachable!(),
    };

    let v = dm_transform_matrix(gens);
    let from_dense = transform_tensor(&v, &dense).unwrap();
    let from_sparse = transform_tensor(&v, &sparse).unwrap();
    assert!(from_dense.max_abs_diff(&from_sparse).unwrap() < 1e-14);
}

#[test]
fn test_composition_rule() {
    use super::form_factors::build_form_factors;
    use super::generators::build_generators;

    let gens = Generations::One;
    let f = build_form_factors(&build_generators(gens), gens).unwrap().f1;
    let v = dm_transform_matrix(gens);

    // B: a real rotation in the (1, 2) plane
    let (s, c) = (0.3f64.sin(), 0.3f64.cos());
    let mut b = Array2::<Complex>::eye(15);
    b[[1, 1]] = Complex::new(c, 0.0);
    b[[1, 2]] = Complex::new(-s, 0.0);
    b[[2, 1]] = Complex::new(s, 0.0);
    b[[2, 2]] = Complex::new(c, 0.0);

    let nested = transform_tensor(&v, &transform_tensor(&b, &f).unwrap()).unwrap();
    let combined = transform_tensor(&b.dot(&v), &f).unwrap();
    assert!(nested.max_abs_diff(&combined).unwrap() < 1e-14);
}

#[test]
fn test_parse_complex() {
    assert_eq!(parse_complex("(1+0j)"), Some(Complex::new(1.0, 0.0)));
    assert_eq!(parse_complex("(-1+0j)"), Some(Complex::new(-1.0, 0.0)));
    assert_eq!(parse_complex("0.5"), Some(Complex::new(0.5, 0.0)));
    assert_eq!(parse_complex("2.5e-3-1.5e+2j"), Some(Complex::new(2.5e-3, -150.0)));
    assert_eq!(parse_complex("-2j"), Some(Complex::new(0.0, -2.0)));
    assert_eq!(parse_complex("one"), None);
}

#[test]
fn test_completed_mass_transform_is_orthogonal() {
    // x_minus x_plus = -1 keeps the two eta' rows orthogonal
    let w = complete_mass_transform(&core_mass_transform(), -0.5, 2.0).unwrap();
    assert!(unitarity_defect(&w) < 1e-14);
}

#[cfg(test)]
fn generators_off_spurion_flavor(gens: Generations) -> Vec<bool> {
    use super::generators::build_generators;

    let dim = gens.matrix_dim();
    build_generators(gens)
        .x
        .iter()
        .map(|x| {
            !x.indexed_iter()
                .any(|((r, c), v)| v.norm() > 0.0 && (r >= dim - 2 || c >= dim - 2))
        })
        .collect()
}

// (dm index, generator) pairs where a DM-charged state picks up a generator without
// entries on the spurion flavor.
#[cfg(test)]
fn dm_states_off_spurion_flavor(gens: Generations, u: &ComplexMatrix) -> Vec<(Index, Index)> {
    let off = generators_off_spurion_flavor(gens);
    let mut found = vec![];
    for d in gens.dm_indices() {
        for g in 0..gens.n_pions() {
            if u[[g, d]].norm() > 1e-12 && off[g] {
                found.push((d, g));
            }
        }
    }
    found
}

#[test]
fn test_dm_states_live_on_spurion_flavor() {
    let v1 = dm_transform_matrix(Generations::One);
    assert_eq!(dm_states_off_spurion_flavor(Generations::One, &v1), vec![]);

    let w = complete_mass_transform(&core_mass_transform(), -0.5, 2.0).unwrap();
    let u = interaction_to_dm_transform(&w, &dm_transform_matrix(Generations::Three));
    assert_eq!(dm_states_off_spurion_flavor(Generations::Three, &u), vec![]);

    // and the neutral states never touch a DM generator
    let (_, partner_a, partner_b) = pair_tables(Generations::Three);
    for (dm, _) in neutral_slots(Generations::Three) {
        for &g in partner_a.iter().chain(partner_b) {
            assert_eq!(u[[g, dm]].norm(), 0.0, "dm {dm}, generator {g}");
        }
    }
}

#[test]
fn test_core_asset_dm_states_live_on_spurion_flavor() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/WcoreMatrix_intToMass_sparse.txt");
    let core = load_core_transform(&path, 91).unwrap();
    let w = complete_mass_transform(&core, -0.5, 2.0).unwrap();
    assert!(unitarity_defect(&w) < 1e-14);
    let u = interaction_to_dm_transform(&w, &dm_transform_matrix(Generations::Three));
    assert_eq!(dm_states_off_spurion_flavor(Generations::Three, &u), vec![]);
}

#[test]
fn test_ngen3_sparse_round_trip() {
    let w = complete_mass_transform(&core_mass_transform(), -0.5, 2.0).unwrap();
    let u = interaction_to_dm_transform(&w, &dm_transform_matrix(Generations::Three));
    assert!(unitarity_defect(&u) < 1e-14);
    let u_dagger = u.t().mapv(|x| x.conj());

    // A handful of entries on DM, mixed, eta' and plain neutral generators
    let (minus, plus, _) = MASS_LAYOUT_NGEN3.mixed[0];
    let (g_minus, g_plus) = (generator_of(minus), generator_of(plus));
    let f = SparseTensor4::new(91);
    f.add([21, 24, 1, 1], Complex::new(0.5, 0.0));
    f.add([g_minus, g_plus, 22, 23], Complex::new(-0.25, 0.125));
    f.add([89, 89, 0, 90], Complex::new(1.5, 0.0));
    f.add([90, 0, 90, 41], Complex::new(0.0, 1.0));
    f.add([85, 85, 57, 60], Complex::new(2.0, -1.0));
    let f = Tensor4::Sparse(f);

    let dm_basis = transform_tensor(&u, &f).unwrap();
    let back = transform_tensor(&u_dagger, &dm_basis).unwrap();
    assert!(back.max_abs_diff(&f).unwrap() < 1e-13);
}

#[test]
fn test_mixed_states_carry_half_weight() {
    let w = complete_mass_transform(&core_mass_transform(), -0.5, 2.0).unwrap();
    let w_dagger = w.t().mapv(|x| x.conj());
    let (minus, plus, _) = MASS_LAYOUT_NGEN3.mixed[0];
    let (g_minus, g_plus) = (generator_of(minus), generator_of(plus));
    assert_approx_eq::assert_approx_eq!(w[[plus, g_minus]].re, FRAC_1_SQRT_2, 1e-15);
    assert_approx_eq::assert_approx_eq!(w[[minus, g_plus]].re, -FRAC_1_SQRT_2, 1e-15);

    // One interaction-basis entry spreads over the mixed states with weight (1/sqrt(2))^4
    let f = SparseTensor4::new(91);
    f.add([g_minus, g_minus, g_minus, g_minus], Complex::new(1.0, 0.0));
    let mass_basis = transform_tensor(&w_dagger, &Tensor4::Sparse(f)).unwrap();
    assert_approx_eq::assert_approx_eq!(mass_basis.get(plus, plus, plus, plus).re, 0.25, 1e-15);
    assert_approx_eq::assert_approx_eq!(mass_basis.get(minus, plus, minus, plus).re, 0.25, 1e-15);
    assert_approx_eq::assert_approx_eq!(mass_basis.get(minus, minus, minus, minus).re, 0.25, 1e-15);
}
