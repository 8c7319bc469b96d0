use crate::core::elements;

/// Represents an atom in a molecular topology.
///
/// Positions are not stored on the atom itself; they live in
/// [`MolecularSystem`](super::system::MolecularSystem) as a contiguous array so that the
/// integrator can update them without touching topology data.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    /// The name of the atom (e.g., "CA", "HH31").
    pub name: String,
    /// The force field atom type (e.g., "CT", "HC").
    pub atom_type: String,
    /// The atomic number, or 0 if it could not be determined.
    pub atomic_number: u8,
    /// Index of the residue this atom belongs to.
    pub residue_index: usize,
    /// Atomic mass in amu.
    pub mass: f64,
    /// Partial charge in elementary charge units.
    pub charge: f64,
}

impl Atom {
    /// Creates a new `Atom` with zero charge and no type.
    ///
    /// # Arguments
    ///
    /// * `name` - The name of the atom.
    /// * `atomic_number` - The atomic number.
    /// * `residue_index` - The index of the residue this atom belongs to.
    /// * `mass` - The atomic mass in amu.
    pub fn new(name: &str, atomic_number: u8, residue_index: usize, mass: f64) -> Self {
        Self {
            name: name.to_string(),
            atom_type: String::new(),
            atomic_number,
            residue_index,
            mass,
            charge: 0.0,
        }
    }

    /// Returns the element symbol, or `"X"` for unknown elements.
    pub fn element_symbol(&self) -> &'static str {
        elements::by_atomic_number(self.atomic_number)
            .map(|e| e.symbol)
            .unwrap_or("X")
    }

    #[inline]
    pub fn is_hydrogen(&self) -> bool {
        self.atomic_number == 1
    }
}
