use std::collections::HashSet;

/// Harmonic bond `k (r - r0)²`, with `k` in kJ/(mol·nm²) and `r0` in nm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BondParam {
    pub atoms: [usize; 2],
    pub k: f64,
    pub r0: f64,
}

/// Harmonic angle `k (θ - θ0)²`, with `k` in kJ/(mol·rad²) and `θ0` in rad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngleParam {
    pub atoms: [usize; 3],
    pub k: f64,
    pub theta0: f64,
}

/// Periodic torsion `k (1 + cos(n φ - phase))`, with `k` in kJ/mol and `phase` in rad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TorsionParam {
    pub atoms: [usize; 4],
    pub k: f64,
    pub periodicity: f64,
    pub phase: f64,
    pub improper: bool,
}

/// A 1-4 pair whose nonbonded interaction is scaled rather than excluded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pair14 {
    pub atoms: [usize; 2],
    /// Multiplier applied to the Coulomb term (1 / SCEE).
    pub coulomb_scale: f64,
    /// Multiplier applied to the Lennard-Jones term (1 / SCNB).
    pub lj_scale: f64,
}

/// Nonbonded parameters: charges, a Lennard-Jones type matrix and exclusions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NonbondedParams {
    /// Partial charges in e.
    pub charges: Vec<f64>,
    /// Zero-based Lennard-Jones type of each atom.
    pub type_indices: Vec<usize>,
    pub n_types: usize,
    /// Row-major `n_types × n_types` A coefficients in kJ/mol·nm¹².
    pub lj_a: Vec<f64>,
    /// Row-major `n_types × n_types` B coefficients in kJ/mol·nm⁶.
    pub lj_b: Vec<f64>,
    /// Excluded partners of each atom (symmetric, sorted).
    pub exclusions: Vec<Vec<usize>>,
    pub pairs_14: Vec<Pair14>,
}

impl NonbondedParams {
    /// Returns the Lennard-Jones (A, B) coefficients for a pair of atoms.
    #[inline]
    pub fn lj_pair(&self, i: usize, j: usize) -> (f64, f64) {
        let index = self.type_indices[i] * self.n_types + self.type_indices[j];
        (self.lj_a[index], self.lj_b[index])
    }

    #[inline]
    pub fn is_excluded(&self, i: usize, j: usize) -> bool {
        self.exclusions
            .get(i)
            .is_some_and(|partners| partners.binary_search(&j).is_ok())
    }

    /// Adds a symmetric exclusion between two atoms, keeping the lists sorted.
    pub fn add_exclusion(&mut self, i: usize, j: usize) {
        if i == j {
            return;
        }
        for (a, b) in [(i, j), (j, i)] {
            let partners = &mut self.exclusions[a];
            if let Err(pos) = partners.binary_search(&b) {
                partners.insert(pos, b);
            }
        }
    }
}

/// The complete classical force field of a system, in internal units.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForceField {
    pub bonds: Vec<BondParam>,
    pub angles: Vec<AngleParam>,
    pub torsions: Vec<TorsionParam>,
    pub nonbonded: NonbondedParams,
}

impl ForceField {
    pub fn atom_count(&self) -> usize {
        self.nonbonded.charges.len()
    }

    pub fn total_charge(&self) -> f64 {
        self.nonbonded.charges.iter().sum()
    }

    /// Sets the charges of all atoms in `region` to zero and returns their previous sum.
    pub fn zero_charges(&mut self, region: &HashSet<usize>) -> f64 {
        let mut removed = 0.0;
        for &index in region {
            if let Some(q) = self.nonbonded.charges.get_mut(index) {
                removed += *q;
                *q = 0.0;
            }
        }
        removed
    }

    /// Removes every bonded term whose atoms all lie inside `region`.
    ///
    /// Returns the number of bonds, angles and torsions removed.
    pub fn remove_bonded_terms_within(&mut self, region: &HashSet<usize>) -> (usize, usize, usize) {
        let inside = |atoms: &[usize]| atoms.iter().all(|a| region.contains(a));

        let bonds_before = self.bonds.len();
        self.bonds.retain(|b| !inside(&b.atoms));
        let angles_before = self.angles.len();
        self.angles.retain(|a| !inside(&a.atoms));
        let torsions_before = self.torsions.len();
        self.torsions.retain(|t| !inside(&t.atoms));

        (
            bonds_before - self.bonds.len(),
            angles_before - self.angles.len(),
            torsions_before - self.torsions.len(),
        )
    }

    /// Excludes all nonbonded interactions between pairs of atoms inside `region`.
    ///
    /// Scaled 1-4 pairs inside the region are dropped as well.
    pub fn exclude_pairs_within(&mut self, region: &[usize]) {
        for (n, &i) in region.iter().enumerate() {
            for &j in &region[n + 1..] {
                self.nonbonded.add_exclusion(i, j);
            }
        }
        let set: HashSet<usize> = region.iter().copied().collect();
        self.nonbonded
            .pairs_14
            .retain(|p| !(set.contains(&p.atoms[0]) && set.contains(&p.atoms[1])));
    }
}
