use ndarray::Array2;
use num_traits::Zero;

use super::Generations;
use crate::constants::{GENERATOR_NORMALIZATION, GENERATOR_NORMALIZATION_TOLERANCE};
use crate::{Complex, ComplexMatrix, FloatType};

const I: Complex = Complex::new(0.0, 1.0);
const ONE: Complex = Complex::new(1.0, 0.0);

/// Broken generators X[a] and the spurion A for one theory.
///
/// X[0] is the zero matrix standing in for the singlet, so that generator a is X[a] for
/// a >= 1 and pion indices line up with generator indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Generators {
    pub x: Vec<ComplexMatrix>,
    pub a: ComplexMatrix,
}

/// The four 2x2 blocks embedded for each flavor pair, before the 1/sqrt(8) scaling.
fn pauli_blocks() -> [[[Complex; 2]; 2]; 4] {
    let zero = Complex::zero();
    [
        [[ONE, zero], [zero, ONE]],
        [[zero, I], [I, zero]],
        [[zero, ONE], [-ONE, zero]],
        [[I, zero], [zero, -I]],
    ]
}

/// Builds X and A for the given number of generations. Pure function of `gens`.
pub fn build_generators(gens: Generations) -> Generators {
    let nf = gens.n_flavors();
    let dim = gens.matrix_dim();
    let scale = 1.0 / FloatType::sqrt(8.0);

    // Initialize with the singlet placeholder
    let mut x: Vec<ComplexMatrix> = Vec::with_capacity(gens.n_pions());
    x.push(Array2::zeros((dim, dim)));

    // Off-diagonal generators: one block per flavor pair and Pauli-like matrix
    for i in 0..nf {
        for j in (i + 1)..nf {
            for block in pauli_blocks().iter() {
                let mut generator = Array2::zeros((dim, dim));
                for r in 0..2 {
                    for c in 0..2 {
                        generator[[2 * i + r, 2 * j + c]] = block[r][c] * scale;
                        // Hermitian mirror
                        generator[[2 * j + c, 2 * i + r]] = block[r][c].conj() * scale;
                    }
                }
                x.push(generator);
            }
        }
    }

    // Diagonal generators: Cartan elements of SU(Nf), each flavor entry doubled
    for k in 1..nf {
        let norm = 1.0 / FloatType::sqrt(4.0 * (k * (k + 1)) as FloatType);
        let mut generator = Array2::zeros((dim, dim));
        for flavor in 0..=k {
            let weight = if flavor < k { 1.0 } else { -(k as FloatType) };
            for r in 0..2 {
                generator[[2 * flavor + r, 2 * flavor + r]] = Complex::new(weight * norm, 0.0);
            }
        }
        x.push(generator);
    }

    // Spurion flags the last flavor slot
    let mut a = Array2::zeros((dim, dim));
    a[[dim - 1, dim - 1]] = ONE;
    a[[dim - 2, dim - 2]] = ONE;

    Generators { x, a }
}

/// tr(X X^dagger)
pub fn normality_check(x: &ComplexMatrix) -> Complex {
    x.dot(&x.t().mapv(|v| v.conj())).diag().sum()
}

impl Generators {
    /// Indices of generators violating tr(X X^dagger) = 1/2, skipping the placeholder.
    pub fn normalization_violations(&self) -> Vec<usize> {
        self.x
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, x)| {
                (normality_check(x) - GENERATOR_NORMALIZATION).norm()
                    > GENERATOR_NORMALIZATION_TOLERANCE
            })
            .map(|(a, _)| a)
            .collect()
    }

    /// Nonzero entries (row, col, value) of every generator, indexed by generator.
    pub fn nonzero_entries(&self) -> Vec<Vec<(usize, usize, Complex)>> {
        self.x
            .iter()
            .map(|x| {
                x.indexed_iter()
                    .filter(|(_, v)| !v.is_zero())
                    .map(|((r, c), v)| (r, c, *v))
                    .collect()
            })
            .collect()
    }
}

#[test]
fn test_generator_count_matches_pion_count() {
    for gens in [Generations::One, Generations::Three] {
        let generators = build_generators(gens);
        assert_eq!(generators.x.len(), gens.n_pions());
        assert!(generators.x[0].iter().all(|v| v.is_zero()));
    }
}

#[test]
fn test_broken_generators_normalized() {
    for gens in [Generations::One, Generations::Three] {
        let generators = build_generators(gens);
        assert!(generators.normalization_violations().is_empty());
    }
}

#[test]
fn test_generators_hermitian_and_traceless() {
    let generators = build_generators(Generations::Three);
    for x in generators.x.iter() {
        let dagger = x.t().mapv(|v| v.conj());
        assert!(x.iter().zip(dagger.iter()).all(|(a, b)| (a - b).norm() < 1e-15));
        assert!(x.diag().sum().norm() < 1e-15);
    }
}

#[test]
fn test_build_generators_is_deterministic() {
    for gens in [Generations::One, Generations::Three] {
        assert_eq!(build_generators(gens), build_generators(gens));
    }
}

#[test]
fn test_ngen1_diagonal_generators() {
    let generators = build_generators(Generations::One);
    let scale = 1.0 / FloatType::sqrt(8.0);
    let first: Vec<f64> = generators.x[13].diag().iter().map(|v| v.re / scale).collect();
    let second: Vec<f64> = generators.x[14]
        .diag()
        .iter()
        .map(|v| v.re * FloatType::sqrt(24.0))
        .collect();
    for (got, want) in first.iter().zip([1.0, 1.0, -1.0, -1.0, 0.0, 0.0]) {
        assert_approx_eq::assert_approx_eq!(*got, want);
    }
    for (got, want) in second.iter().zip([1.0, 1.0, 1.0, 1.0, -2.0, -2.0]) {
        assert_approx_eq::assert_approx_eq!(*got, want);
    }
}

#[test]
fn test_spurion() {
    let a = build_generators(Generations::One).a;
    assert_eq!(a.diag().to_vec()[4..], [ONE, ONE]);
    assert_eq!(a.iter().filter(|v| !v.is_zero()).count(), 2);
}
