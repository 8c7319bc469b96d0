use std::ops::Range;

/// A residue: a named, contiguous range of atoms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Residue {
    pub name: String,
    pub first_atom: usize,
    pub atom_count: usize,
}

impl Residue {
    pub fn new(name: &str, first_atom: usize, atom_count: usize) -> Self {
        Self {
            name: name.to_string(),
            first_atom,
            atom_count,
        }
    }

    /// The half-open range of atom indices belonging to this residue.
    pub fn atom_range(&self) -> Range<usize> {
        self.first_atom..self.first_atom + self.atom_count
    }

    pub fn contains(&self, atom_index: usize) -> bool {
        self.atom_range().contains(&atom_index)
    }
}
