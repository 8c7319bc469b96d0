use super::atom::Atom;
use super::residue::Residue;
use nalgebra::{Point3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum SystemError {
    #[error("Expected {expected} positions but got {actual}")]
    PositionCount { expected: usize, actual: usize },
    #[error("Expected {expected} velocities but got {actual}")]
    VelocityCount { expected: usize, actual: usize },
    #[error("Bond ({0}, {1}) references an atom outside the system")]
    BondOutOfRange(usize, usize),
    #[error("Atom {atom} references missing residue {residue}")]
    ResidueOutOfRange { atom: usize, residue: usize },
}

/// Represents a complete molecular system: topology plus one set of coordinates.
///
/// The system is treated as immutable input once loaded. The only mutation the pipeline
/// performs is writing back coordinates (`set_positions`) and, on the force field side,
/// the embedding binder's augmentation, which never touches this struct.
#[derive(Debug, Clone, Default)]
pub struct MolecularSystem {
    /// Atoms in topology order.
    atoms: Vec<Atom>,
    /// Residues in topology order, each a contiguous atom range.
    residues: Vec<Residue>,
    /// Covalent bonds as pairs of atom indices (i < j).
    bonds: Vec<(usize, usize)>,
    /// Cartesian coordinates in nm.
    positions: Vec<Point3<f64>>,
    /// Optional velocities in nm/ps, as read from a restart file.
    velocities: Option<Vec<Vector3<f64>>>,
    /// Rectangular periodic box edge lengths in nm.
    periodic_box: Option<Vector3<f64>>,
    /// Cached bonded neighbours, indexed by atom.
    adjacency: Vec<Vec<usize>>,
    /// Molecule index of each atom.
    molecule_of: Vec<usize>,
    /// Atom indices of each molecule, in ascending order.
    molecules: Vec<Vec<usize>>,
}

impl MolecularSystem {
    /// Creates a molecular system and derives its bond graph and molecule partition.
    ///
    /// # Arguments
    ///
    /// * `atoms` - Atoms in topology order.
    /// * `residues` - Residues covering the atoms.
    /// * `bonds` - Covalent bonds between atom indices.
    /// * `positions` - One coordinate per atom, in nm.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError`] if the coordinate count does not match the atom count or a
    /// bond/residue reference is out of range.
    pub fn new(
        atoms: Vec<Atom>,
        residues: Vec<Residue>,
        bonds: Vec<(usize, usize)>,
        positions: Vec<Point3<f64>>,
    ) -> Result<Self, SystemError> {
        let n = atoms.len();
        if positions.len() != n {
            return Err(SystemError::PositionCount {
                expected: n,
                actual: positions.len(),
            });
        }
        for (index, atom) in atoms.iter().enumerate() {
            if atom.residue_index >= residues.len() {
                return Err(SystemError::ResidueOutOfRange {
                    atom: index,
                    residue: atom.residue_index,
                });
            }
        }

        let mut adjacency = vec![Vec::new(); n];
        let mut normalized = Vec::with_capacity(bonds.len());
        for &(a, b) in &bonds {
            if a >= n || b >= n || a == b {
                return Err(SystemError::BondOutOfRange(a, b));
            }
            let (i, j) = if a < b { (a, b) } else { (b, a) };
            if !adjacency[i].contains(&j) {
                adjacency[i].push(j);
                adjacency[j].push(i);
                normalized.push((i, j));
            }
        }

        let (molecule_of, molecules) = partition_molecules(n, &normalized);

        Ok(Self {
            atoms,
            residues,
            bonds: normalized,
            positions,
            velocities: None,
            periodic_box: None,
            adjacency,
            molecule_of,
            molecules,
        })
    }

    pub fn with_periodic_box(mut self, periodic_box: Option<Vector3<f64>>) -> Self {
        self.periodic_box = periodic_box;
        self
    }

    pub fn with_velocities(
        mut self,
        velocities: Option<Vec<Vector3<f64>>>,
    ) -> Result<Self, SystemError> {
        if let Some(v) = &velocities {
            if v.len() != self.atoms.len() {
                return Err(SystemError::VelocityCount {
                    expected: self.atoms.len(),
                    actual: v.len(),
                });
            }
        }
        self.velocities = velocities;
        Ok(self)
    }

    #[inline]
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    pub fn atom(&self, index: usize) -> Option<&Atom> {
        self.atoms.get(index)
    }

    pub fn atoms(&self) -> &[Atom] {
        &self.atoms
    }

    pub fn residues(&self) -> &[Residue] {
        &self.residues
    }

    pub fn bonds(&self) -> &[(usize, usize)] {
        &self.bonds
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn velocities(&self) -> Option<&[Vector3<f64>]> {
        self.velocities.as_deref()
    }

    pub fn periodic_box(&self) -> Option<&Vector3<f64>> {
        self.periodic_box.as_ref()
    }

    /// Replaces all coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`SystemError::PositionCount`] if the length does not match the atom count.
    pub fn set_positions(&mut self, positions: Vec<Point3<f64>>) -> Result<(), SystemError> {
        if positions.len() != self.atoms.len() {
            return Err(SystemError::PositionCount {
                expected: self.atoms.len(),
                actual: positions.len(),
            });
        }
        self.positions = positions;
        Ok(())
    }

    /// Returns the atoms covalently bonded to `index`.
    pub fn neighbours(&self, index: usize) -> &[usize] {
        self.adjacency.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Returns the molecules (bond-connected components), ordered by their lowest atom index.
    pub fn molecules(&self) -> &[Vec<usize>] {
        &self.molecules
    }

    pub fn molecule_of(&self, index: usize) -> Option<usize> {
        self.molecule_of.get(index).copied()
    }

    pub fn masses(&self) -> Vec<f64> {
        self.atoms.iter().map(|a| a.mass).collect()
    }
}

fn find_root(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

fn partition_molecules(n: usize, bonds: &[(usize, usize)]) -> (Vec<usize>, Vec<Vec<usize>>) {
    let mut parent: Vec<usize> = (0..n).collect();
    for &(i, j) in bonds {
        let ri = find_root(&mut parent, i);
        let rj = find_root(&mut parent, j);
        if ri != rj {
            // Keep the lowest index as root so molecule order follows atom order.
            let (low, high) = if ri < rj { (ri, rj) } else { (rj, ri) };
            parent[high] = low;
        }
    }

    let mut molecule_of = vec![0; n];
    let mut root_to_molecule = vec![usize::MAX; n];
    let mut molecules: Vec<Vec<usize>> = Vec::new();
    for atom in 0..n {
        let root = find_root(&mut parent, atom);
        if root_to_molecule[root] == usize::MAX {
            root_to_molecule[root] = molecules.len();
            molecules.push(Vec::new());
        }
        let molecule = root_to_molecule[root];
        molecule_of[atom] = molecule;
        molecules[molecule].push(atom);
    }
    (molecule_of, molecules)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Two water molecules followed by a lone ion.
    pub(crate) fn water_dimer_with_ion() -> MolecularSystem {
        let atoms = vec![
            Atom::new("O", 8, 0, 15.999),
            Atom::new("H1", 1, 0, 1.008),
            Atom::new("H2", 1, 0, 1.008),
            Atom::new("O", 8, 1, 15.999),
            Atom::new("H1", 1, 1, 1.008),
            Atom::new("H2", 1, 1, 1.008),
            Atom::new("NA", 11, 2, 22.99),
        ];
        let residues = vec![
            Residue::new("WAT", 0, 3),
            Residue::new("WAT", 3, 3),
            Residue::new("NA", 6, 1),
        ];
        let bonds = vec![(0, 1), (2, 0), (3, 4), (3, 5)];
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.0957, 0.0, 0.0),
            Point3::new(-0.024, 0.0927, 0.0),
            Point3::new(0.3, 0.0, 0.0),
            Point3::new(0.3957, 0.0, 0.0),
            Point3::new(0.276, 0.0927, 0.0),
            Point3::new(0.6, 0.6, 0.6),
        ];
        MolecularSystem::new(atoms, residues, bonds, positions).unwrap()
    }

    #[test]
    fn new_rejects_mismatched_position_count() {
        let atoms = vec![Atom::new("C", 6, 0, 12.0)];
        let residues = vec![Residue::new("LIG", 0, 1)];
        let result = MolecularSystem::new(atoms, residues, vec![], vec![]);
        assert_eq!(
            result.unwrap_err(),
            SystemError::PositionCount {
                expected: 1,
                actual: 0
            }
        );
    }

    #[test]
    fn new_rejects_out_of_range_bonds() {
        let atoms = vec![Atom::new("C", 6, 0, 12.0)];
        let residues = vec![Residue::new("LIG", 0, 1)];
        let result = MolecularSystem::new(atoms, residues, vec![(0, 5)], vec![Point3::origin()]);
        assert_eq!(result.unwrap_err(), SystemError::BondOutOfRange(0, 5));
    }

    #[test]
    fn bonds_are_normalized_and_deduplicated() {
        let system = water_dimer_with_ion();
        assert_eq!(system.bonds(), &[(0, 1), (0, 2), (3, 4), (3, 5)]);
        assert_eq!(system.neighbours(0), &[1, 2]);
        assert!(system.neighbours(6).is_empty());
    }

    #[test]
    fn molecules_are_connected_components_in_atom_order() {
        let system = water_dimer_with_ion();
        assert_eq!(
            system.molecules(),
            &[vec![0, 1, 2], vec![3, 4, 5], vec![6]]
        );
        assert_eq!(system.molecule_of(4), Some(1));
        assert_eq!(system.molecule_of(6), Some(2));
    }

    #[test]
    fn set_positions_checks_length() {
        let mut system = water_dimer_with_ion();
        assert!(system.set_positions(vec![Point3::origin(); 2]).is_err());
        assert!(system.set_positions(vec![Point3::origin(); 7]).is_ok());
    }
}
