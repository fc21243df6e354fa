/// This module contains the dark pion theory: generator algebra, form factors, basis
/// transforms, the mass spectrum and the pieces of the coannihilation cross section.
pub mod coannihilation;
pub mod cross_section;
pub mod form_factors;
pub mod generators;
pub mod mass_spectrum;
pub mod params;
pub mod tables;
pub mod transform;

use serde_derive::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::ops::Range;

use crate::error::PionError;
use crate::Index;

/// Number of fermion generations of the dark sector. Only one and three are implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Generations {
    One,
    Three,
}

impl TryFrom<usize> for Generations {
    type Error = PionError;

    fn try_from(ngen: usize) -> Result<Self, Self::Error> {
        match ngen {
            1 => Ok(Generations::One),
            3 => Ok(Generations::Three),
            other => Err(PionError::InvalidGenerations(other)),
        }
    }
}

impl Display for Generations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ngen{}", self.count())
    }
}

impl Generations {
    pub fn count(self) -> usize {
        match self {
            Generations::One => 1,
            Generations::Three => 3,
        }
    }

    /// Number of flavor slots, Nf = 2 Ngen + 1.
    pub fn n_flavors(self) -> usize {
        2 * self.count() + 1
    }

    /// Dimension of the generator matrices.
    pub fn matrix_dim(self) -> usize {
        2 * self.n_flavors()
    }

    /// Number of pion species, N = Nf (2 Nf - 1), including the singlet at index 0.
    pub fn n_pions(self) -> usize {
        let nf = self.n_flavors();
        nf * (2 * nf - 1)
    }

    /// DM-charged pion indices in the DM-charge basis. They come in (d, d+1) pairs.
    pub fn dm_indices(self) -> Range<Index> {
        match self {
            Generations::One => 5..13,
            Generations::Three => 1..25,
        }
    }

    /// Every pion index that is neither DM-charged nor the singlet.
    pub fn sm_indices(self) -> Vec<Index> {
        let dm = self.dm_indices();
        (1..self.n_pions()).filter(|i| !dm.contains(i)).collect()
    }

    /// Whether the F-hat tensors for this theory are stored densely.
    pub fn dense_tensors(self) -> bool {
        matches!(self, Generations::One)
    }
}

#[test]
fn test_pion_counts() {
    assert_eq!(Generations::One.n_pions(), 15);
    assert_eq!(Generations::Three.n_pions(), 91);
    assert_eq!(Generations::One.matrix_dim(), 6);
    assert_eq!(Generations::Three.matrix_dim(), 14);
}

#[test]
fn test_invalid_generations() {
    assert!(matches!(
        Generations::try_from(2),
        Err(PionError::InvalidGenerations(2))
    ));
    assert_eq!(Generations::try_from(3).unwrap(), Generations::Three);
}

#[test]
fn test_dm_and_sm_partition_non_singlet_indices() {
    for gens in [Generations::One, Generations::Three] {
        let dm: Vec<Index> = gens.dm_indices().collect();
        let sm = gens.sm_indices();

        // Disjoint, singlet excluded, and together they cover 1..N
        assert!(!dm.contains(&0) && !sm.contains(&0));
        assert!(dm.iter().all(|i| !sm.contains(i)));
        assert_eq!(dm.len() + sm.len(), gens.n_pions() - 1);
    }
    assert_eq!(Generations::One.sm_indices(), vec![1, 2, 3, 4, 13, 14]);
    assert_eq!(Generations::Three.sm_indices().len(), 66);
}
