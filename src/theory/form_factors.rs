//! Four-index form factors built from traces of generator products.
//!
//! F1Hat(a,b,c,d) = 1/4 [T(c,a,d,b) + T(a,c,d,b)] - 1/12 [T(c,a,b,d) + T(a,c,b,d)] - 1/3 T(a,b,c,d)
//! F2Hat(a,b,c,d) = tr(A X_a X_b X_c X_d)
//!
//! with T(a,b,c,d) = tr(X_a X_b X_c X_d). Rather than evaluating the 4-fold product for every
//! index quadruple, every nonzero trace is produced exactly once by enumerating closed walks
//! i -> j -> k -> l -> i over the nonzero entries of the generators. Each F1Hat term is then
//! a relabelling of T, so F1Hat is assembled by scattering each trace into five slots.

use dashmap::DashMap;
use ndarray::{Array4, Zip};
use num_traits::Zero;
use rayon::prelude::*;
use serde_derive::{Deserialize, Serialize};

use super::generators::Generators;
use super::Generations;
use crate::error::{PionError, Result};
use crate::{Complex, FloatType, Index};

/// Entries below this magnitude are cancellation residue and are dropped from sparse tensors.
const PRUNE_TOLERANCE: FloatType = 1e-14;

pub type PackedIndex = u32;

/// Sparse (N,N,N,N) complex tensor keyed by the packed quadruple a N^3 + b N^2 + c N + d.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SparseTensor4 {
    pub n: usize,
    pub entries: DashMap<PackedIndex, Complex>,
}

impl SparseTensor4 {
    pub fn new(n: usize) -> Self {
        SparseTensor4 {
            n,
            entries: DashMap::new(),
        }
    }

    pub fn pack(&self, [a, b, c, d]: [Index; 4]) -> PackedIndex {
        (((a * self.n + b) * self.n + c) * self.n + d) as PackedIndex
    }

    pub fn unpack(&self, key: PackedIndex) -> [Index; 4] {
        let n = self.n;
        let key = key as usize;
        [key / (n * n * n), (key / (n * n)) % n, (key / n) % n, key % n]
    }

    pub fn get(&self, index: [Index; 4]) -> Complex {
        self.entries
            .get(&self.pack(index))
            .map(|value| *value)
            .unwrap_or_else(Complex::zero)
    }

    /// Accumulates `value` into the entry at `index`. Safe to call from many threads.
    pub fn add(&self, index: [Index; 4], value: Complex) {
        self.entries
            .entry(self.pack(index))
            .and_modify(|v| *v += value)
            .or_insert(value);
    }

    pub fn prune(&mut self) {
        self.entries.retain(|_, v| v.norm() > PRUNE_TOLERANCE);
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn to_dense(&self) -> Array4<Complex> {
        let mut dense = Array4::zeros((self.n, self.n, self.n, self.n));
        for entry in self.entries.iter() {
            let [a, b, c, d] = self.unpack(*entry.key());
            dense[[a, b, c, d]] = *entry.value();
        }
        dense
    }
}

/// A form-factor tensor, dense for Ngen = 1 and sparse for Ngen = 3.
#[derive(Debug, Clone)]
pub enum Tensor4 {
    Dense(Array4<Complex>),
    Sparse(SparseTensor4),
}

impl Tensor4 {
    pub fn dim(&self) -> usize {
        match self {
            Tensor4::Dense(array) => array.shape()[0],
            Tensor4::Sparse(sparse) => sparse.n,
        }
    }

    pub fn get(&self, a: Index, b: Index, c: Index, d: Index) -> Complex {
        match self {
            Tensor4::Dense(array) => array[[a, b, c, d]],
            Tensor4::Sparse(sparse) => sparse.get([a, b, c, d]),
        }
    }

    /// Multiplies every entry by a real constant.
    pub fn scale(&mut self, factor: FloatType) {
        match self {
            Tensor4::Dense(array) => array.mapv_inplace(|v| v * factor),
            Tensor4::Sparse(sparse) => sparse
                .entries
                .par_iter_mut()
                .for_each(|mut entry| *entry.value_mut() *= factor),
        }
    }

    pub fn to_dense(&self) -> Array4<Complex> {
        match self {
            Tensor4::Dense(array) => array.clone(),
            Tensor4::Sparse(sparse) => sparse.to_dense(),
        }
    }

    /// Largest entrywise |self - other|.
    pub fn max_abs_diff(&self, other: &Tensor4) -> Result<FloatType> {
        if self.dim() != other.dim() {
            return Err(PionError::ShapeMismatch(format!(
                "tensor dimensions {} and {}",
                self.dim(),
                other.dim()
            )));
        }
        match (self, other) {
            (Tensor4::Dense(x), Tensor4::Dense(y)) => {
                let mut max = 0.0;
                Zip::from(x).and(y).for_each(|a, b| max = FloatType::max(max, (a - b).norm()));
                Ok(max)
            }
            _ => {
                // Only nonzero entries of either side can differ
                let keys = |t: &Tensor4| -> Vec<[Index; 4]> {
                    match t {
                        Tensor4::Dense(array) => array
                            .indexed_iter()
                            .filter(|(_, v)| !v.is_zero())
                            .map(|((a, b, c, d), _)| [a, b, c, d])
                            .collect(),
                        Tensor4::Sparse(sparse) => {
                            sparse.entries.iter().map(|e| sparse.unpack(*e.key())).collect()
                        }
                    }
                };
                Ok(keys(self)
                    .into_iter()
                    .chain(keys(other))
                    .map(|[a, b, c, d]| (self.get(a, b, c, d) - other.get(a, b, c, d)).norm())
                    .fold(0.0, FloatType::max))
            }
        }
    }
}

/// The pair (F1Hat, F2Hat), or their scaled versions (F1, F2), in a single basis.
#[derive(Debug, Clone)]
pub struct FormFactors {
    pub f1: Tensor4,
    pub f2: Tensor4,
}

impl FormFactors {
    /// F1 = f1_scale F1Hat and F2 = f2_scale F2Hat.
    pub fn scaled(mut self, f1_scale: FloatType, f2_scale: FloatType) -> Self {
        self.f1.scale(f1_scale);
        self.f2.scale(f2_scale);
        self
    }
}

/// Builds F1Hat and F2Hat in the interaction basis.
pub fn build_form_factors(generators: &Generators, gens: Generations) -> Result<FormFactors> {
    let n = generators.x.len();
    let dim = generators.a.nrows();
    if n != gens.n_pions() || dim != gens.matrix_dim() {
        return Err(PionError::ShapeMismatch(format!(
            "{gens} needs {} generators of dimension {}, got {n} of dimension {dim}",
            gens.n_pions(),
            gens.matrix_dim()
        )));
    }

    // Initialize (generator, value) lists for every matrix position
    let mut by_position: Vec<Vec<(Index, Complex)>> = vec![vec![]; dim * dim];
    for (gen, entries) in generators.nonzero_entries().into_iter().enumerate() {
        for (r, c, value) in entries {
            by_position[r * dim + c].push((gen, value));
        }
    }
    let successors: Vec<Vec<usize>> = (0..dim)
        .map(|r| (0..dim).filter(|&c| !by_position[r * dim + c].is_empty()).collect())
        .collect();
    let spurion: Vec<Complex> = generators.a.diag().to_vec();

    // Enumerate closed walks i -> j -> k -> l -> i
    let traces = SparseTensor4::new(n);
    let mut f2 = SparseTensor4::new(n);
    (0..dim).into_par_iter().for_each(|i| {
        for &j in &successors[i] {
            for &k in &successors[j] {
                for &l in &successors[k] {
                    let closing = &by_position[l * dim + i];
                    if closing.is_empty() {
                        continue;
                    }
                    for &(a, xa) in &by_position[i * dim + j] {
                        for &(b, xb) in &by_position[j * dim + k] {
                            let xab = xa * xb;
                            for &(c, xc) in &by_position[k * dim + l] {
                                let xabc = xab * xc;
                                for &(d, xd) in closing {
                                    let product = xabc * xd;
                                    traces.add([a, b, c, d], product);
                                    if !spurion[i].is_zero() {
                                        f2.add([a, b, c, d], spurion[i] * product);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
    });

    // Scatter every trace T(p,q,r,s) into the five F1Hat slots it feeds
    let mut f1 = SparseTensor4::new(n);
    traces.entries.par_iter().for_each(|entry| {
        let [p, q, r, s] = traces.unpack(*entry.key());
        let t = *entry.value();
        f1.add([q, s, p, r], t * 0.25);
        f1.add([p, s, q, r], t * 0.25);
        f1.add([q, r, p, s], -t / 12.0);
        f1.add([p, r, q, s], -t / 12.0);
        f1.add([p, q, r, s], -t / 3.0);
    });
    f1.prune();
    f2.prune();

    log::debug!(
        "{gens}: {} nonzero traces, {} nonzero F1Hat, {} nonzero F2Hat",
        traces.nnz(),
        f1.nnz(),
        f2.nnz()
    );

    Ok(if gens.dense_tensors() {
        FormFactors {
            f1: Tensor4::Dense(f1.to_dense()),
            f2: Tensor4::Dense(f2.to_dense()),
        }
    } else {
        FormFactors {
            f1: Tensor4::Sparse(f1),
            f2: Tensor4::Sparse(f2),
        }
    })
}

#[cfg(test)]
fn trace_of_product(matrices: &[&crate::ComplexMatrix]) -> Complex {
    let mut product = matrices[0].clone();
    for m in &matrices[1..] {
        product = product.dot(*m);
    }
    product.diag().sum()
}

#[cfg(test)]
fn f1_hat_direct(x: &[crate::ComplexMatrix], a: Index, b: Index, c: Index, d: Index) -> Complex {
    let t = |p: Index, q: Index, r: Index, s: Index| trace_of_product(&[&x[p], &x[q], &x[r], &x[s]]);
    (t(c, a, d, b) + t(a, c, d, b)) * 0.25 - (t(c, a, b, d) + t(a, c, b, d)) / 12.0 - t(a, b, c, d) / 3.0
}

#[test]
fn test_ngen1_matches_direct_traces() {
    use itertools::iproduct;

    let generators = super::generators::build_generators(Generations::One);
    let form_factors = build_form_factors(&generators, Generations::One).unwrap();
    assert!(matches!(form_factors.f1, Tensor4::Dense(_)));

    // Every quadruple for a subset of indices, including the singlet and diagonal generators
    let indices = [0, 1, 2, 5, 7, 13, 14];
    for (a, b, c, d) in iproduct!(indices, indices, indices, indices) {
        let want_f1 = f1_hat_direct(&generators.x, a, b, c, d);
        let want_f2 = trace_of_product(&[
            &generators.a,
            &generators.x[a],
            &generators.x[b],
            &generators.x[c],
            &generators.x[d],
        ]);
        assert!((form_factors.f1.get(a, b, c, d) - want_f1).norm() < 1e-13);
        assert!((form_factors.f2.get(a, b, c, d) - want_f2).norm() < 1e-13);
    }
}

#[test]
fn test_singlet_rows_vanish() {
    let generators = super::generators::build_generators(Generations::One);
    let form_factors = build_form_factors(&generators, Generations::One).unwrap();
    for b in 0..15 {
        assert!(form_factors.f1.get(0, b, 3, 4).is_zero());
        assert!(form_factors.f2.get(b, 0, 4, 3).is_zero());
    }
}

#[test]
fn test_pack_round_trip() {
    let tensor = SparseTensor4::new(91);
    for index in [[0, 0, 0, 0], [90, 90, 90, 90], [3, 17, 88, 41]] {
        assert_eq!(tensor.unpack(tensor.pack(index)), index);
    }
}

#[test]
fn test_rejects_mismatched_generators() {
    let generators = super::generators::build_generators(Generations::One);
    assert!(matches!(
        build_form_factors(&generators, Generations::Three),
        Err(PionError::ShapeMismatch(_))
    ));
}

#[test]
#[ignore]
fn test_ngen3_sparse_matches_direct_traces() {
    let generators = super::generators::build_generators(Generations::Three);
    let form_factors = build_form_factors(&generators, Generations::Three).unwrap();
    assert!(matches!(form_factors.f1, Tensor4::Sparse(_)));
    for (a, b, c, d) in [(1, 1, 1, 1), (1, 2, 2, 1), (85, 86, 90, 90), (5, 9, 40, 12)] {
        let want = f1_hat_direct(&generators.x, a, b, c, d);
        assert!((form_factors.f1.get(a, b, c, d) - want).norm() < 1e-13);
    }
}
