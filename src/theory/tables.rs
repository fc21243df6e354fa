//! Fixed index tables relating the mass basis to the DM-charge basis.
//!
//! DM-charged pions come in pairs (d, d+1) of opposite dark charge. In the mass basis the
//! same pair is a real and an imaginary combination living at indices A[i] and B[i], which
//! are degenerate by construction of the mass formulas. All other pions are neutral and
//! map one to one, in increasing order.
//!
//! Mass-basis indices are labelled by generator: outside the mixed blocks, mass state m is
//! the pion of generator X[m]. The DM-charged states are then exactly the generators of the
//! flavor pairs (k, Nf-1), the ones the spurion A touches. Pauli blocks 0 and 1 of a pair
//! are the A partners, blocks 3 and 2 the B partners.
//!
//! Ngen = 1: generators 5..13 belong to the pairs (0, 2) and (1, 2), with masses Msq5and8,
//! Msq6and7 and Msq9to12.
//!
//! Ngen = 3: generators 21..25, 41..45, 57..61, 69..73, 77..85 belong to the pairs (k, 6).
//! The DM pairs carry ON_6 (first three), ON_7 (next three) and ON_9 (last six). The
//! remaining generators take the neutral closed-form groups in increasing mass index. The
//! eta' block mixes X[0] with the last Cartan generator X[90]; its light eigenvalue sits at
//! mass index 89 and its heavy one at mass index 90, so the state of X[89] moves to mass
//! index 0.

use super::Generations;
use crate::Index;

/// First index of every DM-charged pair in the DM-charge basis, Ngen = 1.
pub const DM_PAIR_STARTS_NGEN1: [Index; 4] = [5, 7, 9, 11];

/// Mass-basis index of the real combination of each pair, Ngen = 1.
pub const PARTNER_A_NGEN1: [Index; 4] = [5, 6, 9, 10];

/// Mass-basis index of the imaginary combination of each pair, Ngen = 1.
pub const PARTNER_B_NGEN1: [Index; 4] = [8, 7, 12, 11];

/// First index of every DM-charged pair in the DM-charge basis, Ngen = 3.
pub const DM_PAIR_STARTS_NGEN3: [Index; 12] = [1, 3, 5, 7, 9, 11, 13, 15, 17, 19, 21, 23];

/// Mass-basis index of the real combination of each pair, Ngen = 3.
pub const PARTNER_A_NGEN3: [Index; 12] = [21, 22, 41, 42, 57, 58, 69, 70, 77, 78, 81, 82];

/// Mass-basis index of the imaginary combination of each pair, Ngen = 3.
pub const PARTNER_B_NGEN3: [Index; 12] = [24, 23, 44, 43, 60, 59, 72, 71, 80, 79, 84, 83];

/// Closed-form mass of each DM pair, Ngen = 3.
pub const DM_PAIR_VALUES_NGEN3: [SlotValue; 12] = [
    SlotValue::On6,
    SlotValue::On6,
    SlotValue::On6,
    SlotValue::On7,
    SlotValue::On7,
    SlotValue::On7,
    SlotValue::On9,
    SlotValue::On9,
    SlotValue::On9,
    SlotValue::On9,
    SlotValue::On9,
    SlotValue::On9,
];

/// Mass index holding the light eigenvalue of the eta' block, Ngen = 3.
pub const ETA_PRIME_LIGHT_SLOT: Index = 89;

/// Mass index holding the heavy eigenvalue of the eta' block, Ngen = 3.
pub const ETA_PRIME_HEAVY_SLOT: Index = 90;

/// Interaction-basis indices mixed by the eta' block, Ngen = 3.
pub const ETA_PRIME_INTERACTION: [Index; 2] = [0, 90];

/// Cartan generator whose state sits at mass index 0, Ngen = 3.
pub const DISPLACED_CARTAN_NGEN3: Index = 89;

/// Generator carried by a mass state outside the eta' block, Ngen = 3.
pub fn generator_of(mass: Index) -> Index {
    match mass {
        0 => DISPLACED_CARTAN_NGEN3,
        m => m,
    }
}

/// Closed-form value carried by a mass state of the Ngen = 3 spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotValue {
    On2,
    On3,
    On4,
    On5MinusOff2,
    On5PlusOff2,
    On5MinusOff3,
    On5PlusOff3,
    On6,
    On7,
    On8,
    On9,
}

impl SlotValue {
    /// Mixed states sit on ON_5 in the interaction basis and split through OFF_2 or OFF_3.
    pub fn is_mixed(self) -> bool {
        matches!(
            self,
            SlotValue::On5MinusOff2
                | SlotValue::On5PlusOff2
                | SlotValue::On5MinusOff3
                | SlotValue::On5PlusOff3
        )
    }
}

/// Group sizes of the neutral Ngen = 3 states outside the eta' block, in assignment order.
pub const NEUTRAL_GROUPS_NGEN3: [(usize, SlotValue); 8] = [
    (12, SlotValue::On2),
    (14, SlotValue::On3),
    (6, SlotValue::On4),
    (3, SlotValue::On5MinusOff2),
    (3, SlotValue::On5PlusOff2),
    (9, SlotValue::On5MinusOff3),
    (9, SlotValue::On5PlusOff3),
    (9, SlotValue::On8),
];

/// Which off-diagonal function splits a mixed pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mixing {
    Off2,
    Off3,
}

/// Mass-basis layout of the Ngen = 3 spectrum.
#[derive(Debug, Clone)]
pub struct MassLayout {
    /// Closed-form value of every mass index; `None` for the eta' block
    pub values: Vec<Option<SlotValue>>,
    /// (minus, plus, mixing) mass indices of the ON_5 pairs. The minus state has W row
    /// (1, -1) over the two generators, the plus state (1, 1).
    pub mixed: Vec<(Index, Index, Mixing)>,
    /// Neutral mass indices outside the eta' block, increasing
    pub neutral: Vec<Index>,
}

fn build_mass_layout() -> MassLayout {
    let n = Generations::Three.n_pions();
    let mut values: Vec<Option<SlotValue>> = vec![None; n];
    for ((&a, &b), &value) in PARTNER_A_NGEN3.iter().zip(&PARTNER_B_NGEN3).zip(&DM_PAIR_VALUES_NGEN3) {
        values[a] = Some(value);
        values[b] = Some(value);
    }

    let neutral: Vec<Index> = (0..n)
        .filter(|&m| m != ETA_PRIME_HEAVY_SLOT && m != ETA_PRIME_LIGHT_SLOT && values[m].is_none())
        .collect();
    let mut groups: Vec<Vec<Index>> = vec![];
    let mut cursor = neutral.iter();
    for &(size, value) in NEUTRAL_GROUPS_NGEN3.iter() {
        let members: Vec<Index> = cursor.by_ref().take(size).copied().collect();
        for &m in &members {
            values[m] = Some(value);
        }
        groups.push(members);
    }

    // Groups 3/4 pair through OFF_2, groups 5/6 through OFF_3
    let mut mixed = vec![];
    for (minus, plus, mixing) in [(3, 4, Mixing::Off2), (5, 6, Mixing::Off3)] {
        for (&m, &p) in groups[minus].iter().zip(&groups[plus]) {
            mixed.push((m, p, mixing));
        }
    }
    MassLayout { values, mixed, neutral }
}

lazy_static! {
    pub static ref MASS_LAYOUT_NGEN3: MassLayout = build_mass_layout();
}

/// The pair tables (pair starts, partner A, partner B) for a theory.
pub fn pair_tables(gens: Generations) -> (&'static [Index], &'static [Index], &'static [Index]) {
    match gens {
        Generations::One => (&DM_PAIR_STARTS_NGEN1, &PARTNER_A_NGEN1, &PARTNER_B_NGEN1),
        Generations::Three => (&DM_PAIR_STARTS_NGEN3, &PARTNER_A_NGEN3, &PARTNER_B_NGEN3),
    }
}

/// Neutral pions as (dm index, mass index).
pub fn neutral_slots(gens: Generations) -> Vec<(Index, Index)> {
    match gens {
        Generations::One => [0, 1, 2, 3, 4, 13, 14].iter().map(|&i| (i, i)).collect(),
        Generations::Three => {
            let dm_start = gens.dm_indices().end;
            std::iter::once((0, ETA_PRIME_HEAVY_SLOT))
                .chain(MASS_LAYOUT_NGEN3.neutral.iter().enumerate().map(|(k, &m)| (dm_start + k, m)))
                .chain(std::iter::once((gens.n_pions() - 1, ETA_PRIME_LIGHT_SLOT)))
                .collect()
        }
    }
}

/// For every DM-charge basis index, the mass index whose eigenvalue it carries.
pub fn dm_from_mass(gens: Generations) -> Vec<Index> {
    let mut perm = vec![0; gens.n_pions()];
    let (starts, partner_a, _) = pair_tables(gens);
    for (&d, &a) in starts.iter().zip(partner_a) {
        perm[d] = a;
        perm[d + 1] = a;
    }
    for (dm, slot) in neutral_slots(gens) {
        perm[dm] = slot;
    }
    perm
}

#[test]
fn test_ngen1_permutation_from_tables() {
    let want: Vec<Index> = vec![0, 1, 2, 3, 4, 5, 5, 6, 6, 9, 9, 10, 10, 13, 14];
    assert_eq!(dm_from_mass(Generations::One), want);
}

#[test]
fn test_every_mass_slot_used_once() {
    for gens in [Generations::One, Generations::Three] {
        let n = gens.n_pions();
        let (starts, partner_a, partner_b) = pair_tables(gens);
        let mut slot_hits = vec![0; n];
        let mut dm_hits = vec![0; n];
        for ((&d, &a), &b) in starts.iter().zip(partner_a).zip(partner_b) {
            slot_hits[a] += 1;
            slot_hits[b] += 1;
            dm_hits[d] += 1;
            dm_hits[d + 1] += 1;
        }
        for (dm, slot) in neutral_slots(gens) {
            slot_hits[slot] += 1;
            dm_hits[dm] += 1;
        }
        assert!(slot_hits.iter().all(|&h| h == 1), "{gens}: {slot_hits:?}");
        assert!(dm_hits.iter().all(|&h| h == 1), "{gens}: {dm_hits:?}");
    }
}

#[test]
fn test_pairs_cover_dm_range() {
    for gens in [Generations::One, Generations::Three] {
        let (starts, _, _) = pair_tables(gens);
        let covered: Vec<Index> = starts.iter().flat_map(|&d| [d, d + 1]).collect();
        assert_eq!(covered, gens.dm_indices().collect::<Vec<_>>());
    }
}

#[test]
fn test_partners_are_spurion_flavor_generators() {
    use super::generators::build_generators;

    for gens in [Generations::One, Generations::Three] {
        let generators = build_generators(gens);
        let spurion_rows = [gens.matrix_dim() - 2, gens.matrix_dim() - 1];
        let (_, partner_a, partner_b) = pair_tables(gens);
        for &m in partner_a.iter().chain(partner_b) {
            let touches = generators.x[m]
                .indexed_iter()
                .any(|((r, c), v)| v.norm() > 0.0 && (spurion_rows.contains(&r) || spurion_rows.contains(&c)));
            assert!(touches, "{gens}: generator {m}");
        }
    }
}

#[test]
fn test_ngen3_generators_used_once() {
    let n = Generations::Three.n_pions();
    let mut hits = vec![0; n];
    for m in (0..n).filter(|&m| m != ETA_PRIME_LIGHT_SLOT && m != ETA_PRIME_HEAVY_SLOT) {
        hits[generator_of(m)] += 1;
    }
    for g in ETA_PRIME_INTERACTION {
        hits[g] += 1;
    }
    assert!(hits.iter().all(|&h| h == 1), "{hits:?}");
}

#[test]
fn test_ngen3_layout_covers_every_state() {
    let layout = &*MASS_LAYOUT_NGEN3;
    assert_eq!(layout.neutral.len(), NEUTRAL_GROUPS_NGEN3.iter().map(|g| g.0).sum::<usize>());
    for (m, value) in layout.values.iter().enumerate() {
        let eta_prime = m == ETA_PRIME_HEAVY_SLOT || m == ETA_PRIME_LIGHT_SLOT;
        assert_eq!(value.is_none(), eta_prime, "mass index {m}");
    }
    assert_eq!(layout.mixed.len(), 12);
    for &(minus, plus, mixing) in &layout.mixed {
        let (want_minus, want_plus) = match mixing {
            Mixing::Off2 => (SlotValue::On5MinusOff2, SlotValue::On5PlusOff2),
            Mixing::Off3 => (SlotValue::On5MinusOff3, SlotValue::On5PlusOff3),
        };
        assert_eq!(layout.values[minus], Some(want_minus));
        assert_eq!(layout.values[plus], Some(want_plus));
    }
    for &m in PARTNER_A_NGEN3.iter().chain(&PARTNER_B_NGEN3) {
        assert!(!layout.neutral.contains(&m));
    }
}
