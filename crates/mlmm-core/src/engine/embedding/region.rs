use crate::core::models::system::MolecularSystem;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegionError {
    #[error("Region selection is empty")]
    Empty,
    #[error("Cannot parse '{0}' as an atom index or range")]
    Syntax(String),
    #[error("Range {start}-{end} is reversed")]
    Reversed { start: usize, end: usize },
    #[error("Atom index {index} is out of range for a system of {atom_count} atoms")]
    OutOfRange { index: usize, atom_count: usize },
    #[error("Molecule {index} does not exist (the system has {molecules} molecules)")]
    NoSuchMolecule { index: usize, molecules: usize },
}

/// How the ML/QM region is chosen.
///
/// Indices are zero-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionSelection {
    /// Comma-separated single indices and inclusive ranges, e.g. `"1804-1822,2083-2132"`.
    AtomIndices(String),
    /// Every atom of one molecule (connected component of the bond graph).
    Molecule(usize),
}

impl RegionSelection {
    /// Resolves the selection into a sorted, duplicate-free list of atom indices.
    pub fn resolve(&self, system: &MolecularSystem) -> Result<Vec<usize>, RegionError> {
        match self {
            Self::AtomIndices(spec) => parse_indices(spec, system.atom_count()),
            Self::Molecule(index) => {
                let molecules = system.molecules();
                molecules
                    .get(*index)
                    .cloned()
                    .ok_or(RegionError::NoSuchMolecule {
                        index: *index,
                        molecules: molecules.len(),
                    })
            }
        }
    }
}

impl FromStr for RegionSelection {
    type Err = RegionError;

    /// Accepts `molecule:<n>` or an index list.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix("molecule:") {
            let index = rest
                .trim()
                .parse()
                .map_err(|_| RegionError::Syntax(rest.trim().to_string()))?;
            Ok(Self::Molecule(index))
        } else if s.is_empty() {
            Err(RegionError::Empty)
        } else {
            Ok(Self::AtomIndices(s.to_string()))
        }
    }
}

impl fmt::Display for RegionSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AtomIndices(spec) => write!(f, "{spec}"),
            Self::Molecule(index) => write!(f, "molecule:{index}"),
        }
    }
}

/// Parses `"a-b,c,d-e"` into the union of the listed indices, checked against `atom_count`.
pub fn parse_indices(spec: &str, atom_count: usize) -> Result<Vec<usize>, RegionError> {
    let parse = |token: &str| -> Result<usize, RegionError> {
        token
            .trim()
            .parse()
            .map_err(|_| RegionError::Syntax(token.trim().to_string()))
    };

    let mut selected = BTreeSet::new();
    for token in spec.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        let (start, end) = match token.split_once('-') {
            Some((a, b)) => (parse(a)?, parse(b)?),
            None => {
                let index = parse(token)?;
                (index, index)
            }
        };
        if end < start {
            return Err(RegionError::Reversed { start, end });
        }
        if end >= atom_count {
            return Err(RegionError::OutOfRange {
                index: end,
                atom_count,
            });
        }
        selected.extend(start..=end);
    }

    if selected.is_empty() {
        return Err(RegionError::Empty);
    }
    Ok(selected.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::system::tests::water_dimer_with_ion;

    #[test]
    fn disjoint_ranges_resolve_to_their_union() {
        let indices = parse_indices("1804-1822,2083-2132", 3000).unwrap();
        assert_eq!(indices.len(), 19 + 50);
        assert_eq!(indices.first(), Some(&1804));
        assert_eq!(indices[18], 1822);
        assert_eq!(indices[19], 2083);
        assert_eq!(indices.last(), Some(&2132));
    }

    #[test]
    fn overlapping_ranges_are_deduplicated_in_ascending_order() {
        let indices = parse_indices("5-8, 2, 7-9, 2", 20).unwrap();
        assert_eq!(indices, vec![2, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn reversed_and_out_of_range_selections_are_rejected() {
        assert_eq!(
            parse_indices("9-3", 20),
            Err(RegionError::Reversed { start: 9, end: 3 })
        );
        assert_eq!(
            parse_indices("0-20", 20),
            Err(RegionError::OutOfRange {
                index: 20,
                atom_count: 20
            })
        );
        assert_eq!(parse_indices("1-x", 20), Err(RegionError::Syntax("x".to_string())));
        assert_eq!(parse_indices(" , ", 20), Err(RegionError::Empty));
    }

    #[test]
    fn molecule_selection_uses_bond_graph() {
        let system = water_dimer_with_ion();
        let region = RegionSelection::Molecule(1).resolve(&system).unwrap();
        assert_eq!(region, vec![3, 4, 5]);
        assert_eq!(
            RegionSelection::Molecule(3).resolve(&system),
            Err(RegionError::NoSuchMolecule {
                index: 3,
                molecules: 3
            })
        );
    }

    #[test]
    fn selections_parse_from_strings() {
        assert_eq!(
            "molecule:2".parse::<RegionSelection>(),
            Ok(RegionSelection::Molecule(2))
        );
        assert_eq!(
            "0-3,6".parse::<RegionSelection>(),
            Ok(RegionSelection::AtomIndices("0-3,6".to_string()))
        );
        assert_eq!(RegionSelection::Molecule(4).to_string(), "molecule:4");
    }
}
