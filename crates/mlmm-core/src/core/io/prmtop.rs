use crate::core::elements;
use crate::core::forcefield::params::{
    AngleParam, BondParam, ForceField, NonbondedParams, Pair14, TorsionParam,
};
use crate::core::io::traits::InputFile;
use crate::core::models::atom::Atom;
use crate::core::models::residue::Residue;
use crate::core::models::system::SystemError;
use crate::core::units::{AMBER_CHARGE_FACTOR, ANGSTROM_TO_NM, KCAL_TO_KJ};
use nalgebra::Vector3;
use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead};
use thiserror::Error;
use tracing::warn;

const DEFAULT_SCEE: f64 = 1.2;
const DEFAULT_SCNB: f64 = 2.0;

// Offsets into the POINTERS section.
const NATOM: usize = 0;
const NTYPES: usize = 1;
const NBONH: usize = 2;
const MBONA: usize = 3;
const NTHETH: usize = 4;
const MTHETA: usize = 5;
const NPHIH: usize = 6;
const MPHIA: usize = 7;
const NNB: usize = 10;
const NRES: usize = 11;
const NUMBND: usize = 15;
const NUMANG: usize = 16;
const NPTRA: usize = 17;
const IFBOX: usize = 27;

#[derive(Debug, Error)]
pub enum AmberError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Missing required section: {0}")]
    MissingSection(String),
    #[error("Unsupported %FORMAT '{format}' in section {section}")]
    InvalidFormat { section: String, format: String },
    #[error("Invalid value '{value}' in section {section}")]
    InvalidValue { section: String, value: String },
    #[error("Section {section} has {actual} entries, expected {expected}")]
    Count {
        section: String,
        expected: usize,
        actual: usize,
    },
    #[error("Inconsistent data: {0}")]
    Inconsistent(String),
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("Only rectangular boxes are supported (angles {0:?})")]
    UnsupportedBox([f64; 3]),
    #[error(transparent)]
    System(#[from] SystemError),
}

/// Everything an AMBER topology contributes, in internal units.
#[derive(Debug, Clone)]
pub struct AmberTopology {
    pub title: String,
    pub atoms: Vec<Atom>,
    pub residues: Vec<Residue>,
    pub bonds: Vec<(usize, usize)>,
    pub periodic_box: Option<Vector3<f64>>,
    pub forcefield: ForceField,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FieldKind {
    Text,
    Integer,
    Real,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct FieldFormat {
    kind: FieldKind,
    width: usize,
}

impl FieldFormat {
    /// Parses Fortran edit descriptors such as `(20a4)`, `(10I8)` or `(5E16.8)`.
    fn parse(spec: &str) -> Option<Self> {
        let inner = spec.trim().trim_start_matches('(').trim_end_matches(')');
        let body = inner.trim_start_matches(|c: char| c.is_ascii_digit());
        let mut chars = body.chars();
        let kind = match chars.next()?.to_ascii_uppercase() {
            'A' => FieldKind::Text,
            'I' => FieldKind::Integer,
            'E' | 'F' | 'D' | 'G' => FieldKind::Real,
            _ => return None,
        };
        let width_text: String = chars.take_while(|c| c.is_ascii_digit()).collect();
        let width = width_text.parse().ok().filter(|&w: &usize| w > 0)?;
        Some(Self { kind, width })
    }
}

#[derive(Debug)]
struct Section {
    format: FieldFormat,
    lines: Vec<String>,
}

impl Section {
    fn fields(&self) -> impl Iterator<Item = &str> + '_ {
        let width = self.format.width;
        let kind = self.format.kind;
        self.lines.iter().flat_map(move |line| {
            let len = line.len();
            (0..len.div_ceil(width)).filter_map(move |n| {
                let start = n * width;
                let end = (start + width).min(len);
                let raw = line.get(start..end).unwrap_or("");
                let field = raw.trim();
                if field.is_empty() && kind != FieldKind::Text {
                    None
                } else {
                    Some(field)
                }
            })
        })
    }
}

struct Sections {
    title: String,
    map: HashMap<String, Section>,
}

impl Sections {
    fn parse(reader: &mut impl BufRead) -> Result<Self, AmberError> {
        let mut map = HashMap::new();
        let mut current: Option<(String, Option<FieldFormat>, Vec<String>)> = None;
        let mut first_line = true;

        for line in reader.lines() {
            let line = line?;
            if first_line {
                first_line = false;
                if !line.starts_with("%VERSION") && !line.starts_with("%FLAG") {
                    return Err(AmberError::UnsupportedFormat(
                        "topology does not start with %VERSION or %FLAG; old-style prmtop files are not supported"
                            .to_string(),
                    ));
                }
            }
            if let Some(name) = line.strip_prefix("%FLAG") {
                if let Some(section) = current.take() {
                    Self::finish(&mut map, section)?;
                }
                current = Some((name.trim().to_string(), None, Vec::new()));
            } else if let Some(spec) = line.strip_prefix("%FORMAT") {
                if let Some((name, format, _)) = current.as_mut() {
                    *format = Some(FieldFormat::parse(spec).ok_or_else(|| {
                        AmberError::InvalidFormat {
                            section: name.clone(),
                            format: spec.trim().to_string(),
                        }
                    })?);
                }
            } else if line.starts_with('%') {
                continue;
            } else if let Some((_, _, lines)) = current.as_mut() {
                lines.push(line.trim_end_matches(['\r', '\n']).to_string());
            }
        }
        if let Some(section) = current.take() {
            Self::finish(&mut map, section)?;
        }

        let title = map
            .get("TITLE")
            .or_else(|| map.get("CTITLE"))
            .map(|s: &Section| s.lines.concat().trim().to_string())
            .unwrap_or_default();
        Ok(Self { title, map })
    }

    fn finish(
        map: &mut HashMap<String, Section>,
        (name, format, lines): (String, Option<FieldFormat>, Vec<String>),
    ) -> Result<(), AmberError> {
        let format = format.ok_or_else(|| AmberError::InvalidFormat {
            section: name.clone(),
            format: String::new(),
        })?;
        map.insert(name, Section { format, lines });
        Ok(())
    }

    fn get(&self, name: &str) -> Result<&Section, AmberError> {
        self.map
            .get(name)
            .ok_or_else(|| AmberError::MissingSection(name.to_string()))
    }

    fn has(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    fn strings(&self, name: &str) -> Result<Vec<String>, AmberError> {
        Ok(self.get(name)?.fields().map(str::to_string).collect())
    }

    fn ints(&self, name: &str) -> Result<Vec<i64>, AmberError> {
        self.get(name)?
            .fields()
            .map(|field| {
                field.parse::<i64>().map_err(|_| AmberError::InvalidValue {
                    section: name.to_string(),
                    value: field.to_string(),
                })
            })
            .collect()
    }

    fn reals(&self, name: &str) -> Result<Vec<f64>, AmberError> {
        self.get(name)?
            .fields()
            .map(|field| {
                field
                    .replace(['D', 'd'], "E")
                    .parse::<f64>()
                    .map_err(|_| AmberError::InvalidValue {
                        section: name.to_string(),
                        value: field.to_string(),
                    })
            })
            .collect()
    }

    fn ints_exact(&self, name: &str, expected: usize) -> Result<Vec<i64>, AmberError> {
        check_count(name, self.ints(name)?, expected)
    }

    fn reals_exact(&self, name: &str, expected: usize) -> Result<Vec<f64>, AmberError> {
        check_count(name, self.reals(name)?, expected)
    }

    /// Reads an optional real-valued section, falling back to `default` for every entry.
    fn reals_or(&self, name: &str, expected: usize, default: f64) -> Result<Vec<f64>, AmberError> {
        if self.has(name) {
            self.reals_exact(name, expected)
        } else {
            Ok(vec![default; expected])
        }
    }
}

fn check_count<T>(name: &str, values: Vec<T>, expected: usize) -> Result<Vec<T>, AmberError> {
    if values.len() < expected {
        return Err(AmberError::Count {
            section: name.to_string(),
            expected,
            actual: values.len(),
        });
    }
    let mut values = values;
    values.truncate(expected);
    Ok(values)
}

/// Converts a `3 * index` coordinate offset from a bonded list into an atom index.
fn atom_from_offset(section: &str, raw: i64, natom: usize) -> Result<usize, AmberError> {
    let offset = raw.unsigned_abs() as usize;
    let index = offset / 3;
    if offset % 3 != 0 || index >= natom {
        return Err(AmberError::InvalidValue {
            section: section.to_string(),
            value: raw.to_string(),
        });
    }
    Ok(index)
}

/// Converts a 1-based parameter type into a 0-based index bounded by `count`.
fn param_index(section: &str, raw: i64, count: usize) -> Result<usize, AmberError> {
    if raw < 1 || raw as usize > count {
        return Err(AmberError::InvalidValue {
            section: section.to_string(),
            value: raw.to_string(),
        });
    }
    Ok(raw as usize - 1)
}

/// Reader for AMBER `.prm7`/`.parm7`/`.top` topology files.
pub struct PrmtopFile;

impl InputFile for PrmtopFile {
    type Output = AmberTopology;
    type Error = AmberError;

    fn read_from(reader: &mut impl BufRead) -> Result<AmberTopology, AmberError> {
        let sections = Sections::parse(reader)?;
        build_topology(&sections)
    }
}

fn build_topology(sections: &Sections) -> Result<AmberTopology, AmberError> {
    let pointers = sections.ints("POINTERS")?;
    if pointers.len() < 28 {
        return Err(AmberError::Count {
            section: "POINTERS".to_string(),
            expected: 28,
            actual: pointers.len(),
        });
    }
    let pointer = |offset: usize| -> Result<usize, AmberError> {
        usize::try_from(pointers[offset]).map_err(|_| AmberError::InvalidValue {
            section: "POINTERS".to_string(),
            value: pointers[offset].to_string(),
        })
    };
    let natom = pointer(NATOM)?;
    let ntypes = pointer(NTYPES)?;
    let nres = pointer(NRES)?;

    let names = check_count("ATOM_NAME", sections.strings("ATOM_NAME")?, natom)?;
    let charges: Vec<f64> = sections
        .reals_exact("CHARGE", natom)?
        .into_iter()
        .map(|q| q / AMBER_CHARGE_FACTOR)
        .collect();
    let masses = sections.reals_exact("MASS", natom)?;
    let atomic_numbers = if sections.has("ATOMIC_NUMBER") {
        Some(sections.ints_exact("ATOMIC_NUMBER", natom)?)
    } else {
        None
    };
    let atom_types = if sections.has("AMBER_ATOM_TYPE") {
        Some(check_count(
            "AMBER_ATOM_TYPE",
            sections.strings("AMBER_ATOM_TYPE")?,
            natom,
        )?)
    } else {
        None
    };
    let type_indices = sections
        .ints_exact("ATOM_TYPE_INDEX", natom)?
        .into_iter()
        .map(|t| param_index("ATOM_TYPE_INDEX", t, ntypes))
        .collect::<Result<Vec<_>, _>>()?;

    let residue_labels = check_count("RESIDUE_LABEL", sections.strings("RESIDUE_LABEL")?, nres)?;
    let residue_pointers = sections.ints_exact("RESIDUE_POINTER", nres)?;
    let mut residues = Vec::with_capacity(nres);
    for (n, label) in residue_labels.iter().enumerate() {
        let first = param_index("RESIDUE_POINTER", residue_pointers[n], natom)?;
        let end = match residue_pointers.get(n + 1) {
            Some(&next) => param_index("RESIDUE_POINTER", next, natom)?,
            None => natom,
        };
        if end <= first {
            return Err(AmberError::Inconsistent(format!(
                "residue {} ({}) is empty or out of order",
                n + 1,
                label
            )));
        }
        residues.push(Residue::new(label, first, end - first));
    }

    let mut atoms = Vec::with_capacity(natom);
    let mut residue_cursor = 0;
    for index in 0..natom {
        while residue_cursor + 1 < residues.len() && !residues[residue_cursor].contains(index) {
            residue_cursor += 1;
        }
        let atomic_number = match &atomic_numbers {
            Some(numbers) if numbers[index] > 0 => u8::try_from(numbers[index]).unwrap_or(0),
            _ => elements::guess_from_mass(masses[index]).map_or(0, |e| e.atomic_number),
        };
        let mut atom = Atom::new(&names[index], atomic_number, residue_cursor, masses[index]);
        atom.charge = charges[index];
        if let Some(types) = &atom_types {
            atom.atom_type = types[index].clone();
        }
        atoms.push(atom);
    }

    let forcefield = build_forcefield(sections, &pointers, natom, ntypes, charges, type_indices)?;
    let bonds = forcefield.bonds.iter().map(|b| (b.atoms[0], b.atoms[1])).collect();

    let periodic_box = if pointers[IFBOX] > 0 && sections.has("BOX_DIMENSIONS") {
        let dims = sections.reals_exact("BOX_DIMENSIONS", 4)?;
        if (dims[0] - 90.0).abs() > 1e-3 {
            return Err(AmberError::UnsupportedBox([dims[0], dims[0], dims[0]]));
        }
        Some(Vector3::new(dims[1], dims[2], dims[3]) * ANGSTROM_TO_NM)
    } else {
        None
    };

    Ok(AmberTopology {
        title: sections.title.clone(),
        atoms,
        residues,
        bonds,
        periodic_box,
        forcefield,
    })
}

fn build_forcefield(
    sections: &Sections,
    pointers: &[i64],
    natom: usize,
    ntypes: usize,
    charges: Vec<f64>,
    type_indices: Vec<usize>,
) -> Result<ForceField, AmberError> {
    let count = |offset: usize| pointers[offset].max(0) as usize;

    let numbnd = count(NUMBND);
    let bond_k = sections.reals_exact("BOND_FORCE_CONSTANT", numbnd)?;
    let bond_r0 = sections.reals_exact("BOND_EQUIL_VALUE", numbnd)?;
    let mut bonds = Vec::with_capacity(count(NBONH) + count(MBONA));
    for (section, n) in [
        ("BONDS_INC_HYDROGEN", count(NBONH)),
        ("BONDS_WITHOUT_HYDROGEN", count(MBONA)),
    ] {
        let raw = sections.ints_exact(section, 3 * n)?;
        for entry in raw.chunks_exact(3) {
            let i = atom_from_offset(section, entry[0], natom)?;
            let j = atom_from_offset(section, entry[1], natom)?;
            let t = param_index(section, entry[2], numbnd)?;
            bonds.push(BondParam {
                atoms: [i, j],
                k: bond_k[t] * KCAL_TO_KJ / (ANGSTROM_TO_NM * ANGSTROM_TO_NM),
                r0: bond_r0[t] * ANGSTROM_TO_NM,
            });
        }
    }

    let numang = count(NUMANG);
    let angle_k = sections.reals_exact("ANGLE_FORCE_CONSTANT", numang)?;
    let angle_theta0 = sections.reals_exact("ANGLE_EQUIL_VALUE", numang)?;
    let mut angles = Vec::with_capacity(count(NTHETH) + count(MTHETA));
    for (section, n) in [
        ("ANGLES_INC_HYDROGEN", count(NTHETH)),
        ("ANGLES_WITHOUT_HYDROGEN", count(MTHETA)),
    ] {
        let raw = sections.ints_exact(section, 4 * n)?;
        for entry in raw.chunks_exact(4) {
            let i = atom_from_offset(section, entry[0], natom)?;
            let j = atom_from_offset(section, entry[1], natom)?;
            let k = atom_from_offset(section, entry[2], natom)?;
            let t = param_index(section, entry[3], numang)?;
            angles.push(AngleParam {
                atoms: [i, j, k],
                k: angle_k[t] * KCAL_TO_KJ,
                theta0: angle_theta0[t],
            });
        }
    }

    let nptra = count(NPTRA);
    let dihedral_k = sections.reals_exact("DIHEDRAL_FORCE_CONSTANT", nptra)?;
    let dihedral_n = sections.reals_exact("DIHEDRAL_PERIODICITY", nptra)?;
    let dihedral_phase = sections.reals_exact("DIHEDRAL_PHASE", nptra)?;
    let scee = sections.reals_or("SCEE_SCALE_FACTOR", nptra, DEFAULT_SCEE)?;
    let scnb = sections.reals_or("SCNB_SCALE_FACTOR", nptra, DEFAULT_SCNB)?;
    let mut torsions = Vec::with_capacity(count(NPHIH) + count(MPHIA));
    let mut pairs_14 = Vec::new();
    let mut seen_14 = HashSet::new();
    for (section, n) in [
        ("DIHEDRALS_INC_HYDROGEN", count(NPHIH)),
        ("DIHEDRALS_WITHOUT_HYDROGEN", count(MPHIA)),
    ] {
        let raw = sections.ints_exact(section, 5 * n)?;
        for entry in raw.chunks_exact(5) {
            let i = atom_from_offset(section, entry[0], natom)?;
            let j = atom_from_offset(section, entry[1], natom)?;
            let k = atom_from_offset(section, entry[2], natom)?;
            let l = atom_from_offset(section, entry[3], natom)?;
            let t = param_index(section, entry[4], nptra)?;
            torsions.push(TorsionParam {
                atoms: [i, j, k, l],
                k: dihedral_k[t] * KCAL_TO_KJ,
                periodicity: dihedral_n[t],
                phase: dihedral_phase[t],
                improper: entry[3] < 0,
            });
            // A negative third index marks a torsion whose 1-4 pair is handled elsewhere.
            if entry[2] >= 0 && entry[3] >= 0 {
                let key = (i.min(l), i.max(l));
                if seen_14.insert(key) {
                    pairs_14.push(Pair14 {
                        atoms: [key.0, key.1],
                        coulomb_scale: if scee[t] > 0.0 { 1.0 / scee[t] } else { 0.0 },
                        lj_scale: if scnb[t] > 0.0 { 1.0 / scnb[t] } else { 0.0 },
                    });
                }
            }
        }
    }

    let nb_index = sections.ints_exact("NONBONDED_PARM_INDEX", ntypes * ntypes)?;
    let n_coefficients = nb_index.iter().copied().max().unwrap_or(0).max(0) as usize;
    let acoef = sections.reals_exact("LENNARD_JONES_ACOEF", n_coefficients)?;
    let bcoef = sections.reals_exact("LENNARD_JONES_BCOEF", n_coefficients)?;
    let a_factor = KCAL_TO_KJ * ANGSTROM_TO_NM.powi(12);
    let b_factor = KCAL_TO_KJ * ANGSTROM_TO_NM.powi(6);
    let mut lj_a = vec![0.0; ntypes * ntypes];
    let mut lj_b = vec![0.0; ntypes * ntypes];
    let mut hbond_pairs = 0;
    for (slot, &index) in nb_index.iter().enumerate() {
        if index > 0 {
            let c = index as usize - 1;
            lj_a[slot] = acoef[c] * a_factor;
            lj_b[slot] = bcoef[c] * b_factor;
        } else if index < 0 {
            hbond_pairs += 1;
        }
    }
    if hbond_pairs > 0 {
        warn!(
            pairs = hbond_pairs,
            "Topology uses 10-12 hydrogen-bond terms; those type pairs get no Lennard-Jones interaction"
        );
    }

    let nnb = count(NNB);
    let excluded_counts = sections.ints_exact("NUMBER_EXCLUDED_ATOMS", natom)?;
    let excluded_list = sections.ints_exact("EXCLUDED_ATOMS_LIST", nnb)?;
    let mut exclusions = vec![Vec::new(); natom];
    let mut cursor = 0;
    for (i, &n) in excluded_counts.iter().enumerate() {
        let n = n.max(0) as usize;
        let end = cursor + n;
        if end > excluded_list.len() {
            return Err(AmberError::Inconsistent(
                "NUMBER_EXCLUDED_ATOMS sums past the end of EXCLUDED_ATOMS_LIST".to_string(),
            ));
        }
        for &partner in &excluded_list[cursor..end] {
            // Zero is a placeholder for "no exclusions".
            if partner > 0 {
                let j = param_index("EXCLUDED_ATOMS_LIST", partner, natom)?;
                if j != i {
                    exclusions[i].push(j);
                    exclusions[j].push(i);
                }
            }
        }
        cursor = end;
    }
    let mut nonbonded = NonbondedParams {
        charges,
        type_indices,
        n_types: ntypes,
        lj_a,
        lj_b,
        exclusions,
        pairs_14: Vec::new(),
    };
    for list in &mut nonbonded.exclusions {
        list.sort_unstable();
        list.dedup();
    }
    // Bonded partners are always excluded, whatever the list says.
    for bond in &bonds {
        nonbonded.add_exclusion(bond.atoms[0], bond.atoms[1]);
    }
    for angle in &angles {
        nonbonded.add_exclusion(angle.atoms[0], angle.atoms[2]);
    }
    for pair in &pairs_14 {
        nonbonded.add_exclusion(pair.atoms[0], pair.atoms[1]);
    }
    nonbonded.pairs_14 = pairs_14;

    Ok(ForceField {
        bonds,
        angles,
        torsions,
        nonbonded,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;

    fn pointers_block(values: &[i64]) -> String {
        let mut out = String::new();
        for chunk in values.chunks(10) {
            for v in chunk {
                out.push_str(&format!("{v:8}"));
            }
            out.push('\n');
        }
        out
    }

    fn reals_block(values: &[f64]) -> String {
        let mut out = String::new();
        for chunk in values.chunks(5) {
            for v in chunk {
                out.push_str(&format!("{v:16.8E}"));
            }
            out.push('\n');
        }
        if values.is_empty() {
            out.push('\n');
        }
        out
    }

    fn ints_block(values: &[i64]) -> String {
        if values.is_empty() {
            return "\n".to_string();
        }
        pointers_block(values)
    }

    fn text_block(values: &[&str]) -> String {
        let mut out = String::new();
        for chunk in values.chunks(20) {
            for v in chunk {
                out.push_str(&format!("{v:<4}"));
            }
            out.push('\n');
        }
        out
    }

    fn section(name: &str, format: &str, body: &str) -> String {
        format!("%FLAG {name}\n%FORMAT({format})\n{body}")
    }

    /// A three-atom H-O-H molecule followed by a lone sodium ion, in prmtop text form.
    pub(crate) fn water_and_ion_prmtop() -> String {
        let mut pointers = vec![0i64; 31];
        pointers[NATOM] = 4;
        pointers[NTYPES] = 2;
        pointers[NBONH] = 2;
        pointers[NTHETH] = 1;
        pointers[NNB] = 4;
        pointers[NRES] = 2;
        pointers[NUMBND] = 1;
        pointers[NUMANG] = 1;
        pointers[NPTRA] = 0;

        let mut text = String::from("%VERSION  VERSION_STAMP = V0001.000  DATE = 01/01/24  00:00:00\n");
        text += &section("TITLE", "20a4", "WATER AND ION\n");
        text += &section("POINTERS", "10I8", &pointers_block(&pointers));
        text += &section("ATOM_NAME", "20a4", &text_block(&["O", "H1", "H2", "NA"]));
        text += &section(
            "CHARGE",
            "5E16.8",
            &reals_block(&[
                -0.834 * AMBER_CHARGE_FACTOR,
                0.417 * AMBER_CHARGE_FACTOR,
                0.417 * AMBER_CHARGE_FACTOR,
                1.0 * AMBER_CHARGE_FACTOR,
            ]),
        );
        text += &section("ATOMIC_NUMBER", "10I8", &ints_block(&[8, 1, 1, 11]));
        text += &section("MASS", "5E16.8", &reals_block(&[15.999, 1.008, 1.008, 22.99]));
        text += &section("ATOM_TYPE_INDEX", "10I8", &ints_block(&[1, 2, 2, 2]));
        text += &section("NUMBER_EXCLUDED_ATOMS", "10I8", &ints_block(&[2, 1, 0, 1]));
        text += &section("NONBONDED_PARM_INDEX", "10I8", &ints_block(&[1, 2, 2, 3]));
        text += &section("RESIDUE_LABEL", "20a4", &text_block(&["WAT", "NA"]));
        text += &section("RESIDUE_POINTER", "10I8", &ints_block(&[1, 4]));
        text += &section("BOND_FORCE_CONSTANT", "5E16.8", &reals_block(&[553.0]));
        text += &section("BOND_EQUIL_VALUE", "5E16.8", &reals_block(&[0.9572]));
        text += &section("ANGLE_FORCE_CONSTANT", "5E16.8", &reals_block(&[100.0]));
        text += &section("ANGLE_EQUIL_VALUE", "5E16.8", &reals_block(&[1.8242]));
        text += &section("DIHEDRAL_FORCE_CONSTANT", "5E16.8", &reals_block(&[]));
        text += &section("DIHEDRAL_PERIODICITY", "5E16.8", &reals_block(&[]));
        text += &section("DIHEDRAL_PHASE", "5E16.8", &reals_block(&[]));
        text += &section(
            "LENNARD_JONES_ACOEF",
            "5E16.8",
            &reals_block(&[582_000.0, 0.0, 0.0]),
        );
        text += &section(
            "LENNARD_JONES_BCOEF",
            "5E16.8",
            &reals_block(&[595.0, 0.0, 0.0]),
        );
        text += &section("BONDS_INC_HYDROGEN", "10I8", &ints_block(&[0, 3, 1, 0, 6, 1]));
        text += &section("BONDS_WITHOUT_HYDROGEN", "10I8", "\n");
        text += &section("ANGLES_INC_HYDROGEN", "10I8", &ints_block(&[3, 0, 6, 1]));
        text += &section("ANGLES_WITHOUT_HYDROGEN", "10I8", "\n");
        text += &section("DIHEDRALS_INC_HYDROGEN", "10I8", "\n");
        text += &section("DIHEDRALS_WITHOUT_HYDROGEN", "10I8", "\n");
        text += &section("EXCLUDED_ATOMS_LIST", "10I8", &ints_block(&[2, 3, 3, 0]));
        text += &section(
            "AMBER_ATOM_TYPE",
            "20a4",
            &text_block(&["OW", "HW", "HW", "Na+"]),
        );
        text
    }

    fn parse(text: &str) -> Result<AmberTopology, AmberError> {
        PrmtopFile::read_from(&mut Cursor::new(text.as_bytes()))
    }

    #[test]
    fn field_format_parses_common_descriptors() {
        assert_eq!(
            FieldFormat::parse("(20a4)"),
            Some(FieldFormat { kind: FieldKind::Text, width: 4 })
        );
        assert_eq!(
            FieldFormat::parse("(10I8)"),
            Some(FieldFormat { kind: FieldKind::Integer, width: 8 })
        );
        assert_eq!(
            FieldFormat::parse("(5E16.8)"),
            Some(FieldFormat { kind: FieldKind::Real, width: 16 })
        );
        assert_eq!(FieldFormat::parse("(3Q8)"), None);
    }

    #[test]
    fn reads_atoms_residues_and_charges() {
        let topology = parse(&water_and_ion_prmtop()).unwrap();
        assert_eq!(topology.title, "WATER AND ION");
        assert_eq!(topology.atoms.len(), 4);
        assert_eq!(topology.atoms[1].name, "H1");
        assert_eq!(topology.atoms[3].atomic_number, 11);
        assert_eq!(topology.atoms[3].residue_index, 1);
        assert_eq!(topology.atoms[0].atom_type, "OW");
        assert!((topology.atoms[0].charge + 0.834).abs() < 1e-6);
        assert_eq!(topology.residues.len(), 2);
        assert_eq!(topology.residues[0].atom_count, 3);
        assert_eq!(topology.bonds, vec![(0, 1), (0, 2)]);
    }

    #[test]
    fn converts_bonded_parameters_to_internal_units() {
        let ff = parse(&water_and_ion_prmtop()).unwrap().forcefield;
        assert_eq!(ff.bonds.len(), 2);
        assert!((ff.bonds[0].k - 553.0 * 418.4).abs() < 1e-6);
        assert!((ff.bonds[0].r0 - 0.09572).abs() < 1e-9);
        assert_eq!(ff.angles.len(), 1);
        assert_eq!(ff.angles[0].atoms, [1, 0, 2]);
        assert!((ff.angles[0].k - 418.4).abs() < 1e-9);
    }

    #[test]
    fn builds_type_matrix_and_exclusions() {
        let ff = parse(&water_and_ion_prmtop()).unwrap().forcefield;
        let (a, b) = ff.nonbonded.lj_pair(0, 0);
        assert!((a - 582_000.0 * 4.184e-12).abs() < 1e-15);
        assert!((b - 595.0 * 4.184e-6).abs() < 1e-12);
        assert_eq!(ff.nonbonded.lj_pair(0, 3), (0.0, 0.0));
        assert!(ff.nonbonded.is_excluded(1, 2));
        assert!(ff.nonbonded.is_excluded(2, 0));
        assert!(!ff.nonbonded.is_excluded(0, 3));
    }

    #[test]
    fn missing_section_is_reported_by_name() {
        let text = water_and_ion_prmtop().replace("%FLAG MASS", "%FLAG MASSES");
        match parse(&text) {
            Err(AmberError::MissingSection(name)) => assert_eq!(name, "MASS"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn rejects_old_style_topologies() {
        assert!(matches!(
            parse("old-style title\n    4    2\n"),
            Err(AmberError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn dihedrals_yield_scaled_14_pairs() {
        let mut pointers = vec![0i64; 31];
        pointers[NATOM] = 4;
        pointers[NTYPES] = 1;
        pointers[MBONA] = 3;
        pointers[MPHIA] = 2;
        pointers[NNB] = 6;
        pointers[NRES] = 1;
        pointers[NUMBND] = 1;
        pointers[NPTRA] = 2;

        let mut text = String::from("%VERSION\n");
        text += &section("POINTERS", "10I8", &pointers_block(&pointers));
        text += &section("ATOM_NAME", "20a4", &text_block(&["C1", "C2", "C3", "C4"]));
        text += &section("CHARGE", "5E16.8", &reals_block(&[0.0; 4]));
        text += &section("MASS", "5E16.8", &reals_block(&[12.01; 4]));
        text += &section("ATOM_TYPE_INDEX", "10I8", &ints_block(&[1, 1, 1, 1]));
        text += &section("NUMBER_EXCLUDED_ATOMS", "10I8", &ints_block(&[3, 2, 1, 0]));
        text += &section("EXCLUDED_ATOMS_LIST", "10I8", &ints_block(&[2, 3, 4, 3, 4, 4]));
        text += &section("NONBONDED_PARM_INDEX", "10I8", &ints_block(&[1]));
        text += &section("RESIDUE_LABEL", "20a4", &text_block(&["BUT"]));
        text += &section("RESIDUE_POINTER", "10I8", &ints_block(&[1]));
        text += &section("BOND_FORCE_CONSTANT", "5E16.8", &reals_block(&[300.0]));
        text += &section("BOND_EQUIL_VALUE", "5E16.8", &reals_block(&[1.53]));
        text += &section("ANGLE_FORCE_CONSTANT", "5E16.8", "\n");
        text += &section("ANGLE_EQUIL_VALUE", "5E16.8", "\n");
        text += &section("DIHEDRAL_FORCE_CONSTANT", "5E16.8", &reals_block(&[0.18, 0.25]));
        text += &section("DIHEDRAL_PERIODICITY", "5E16.8", &reals_block(&[3.0, 2.0]));
        text += &section("DIHEDRAL_PHASE", "5E16.8", &reals_block(&[0.0, 3.14159]));
        text += &section("SCEE_SCALE_FACTOR", "5E16.8", &reals_block(&[1.2, 1.2]));
        text += &section("SCNB_SCALE_FACTOR", "5E16.8", &reals_block(&[2.0, 2.0]));
        text += &section("LENNARD_JONES_ACOEF", "5E16.8", &reals_block(&[1.0e6]));
        text += &section("LENNARD_JONES_BCOEF", "5E16.8", &reals_block(&[6.0e2]));
        text += &section("BONDS_INC_HYDROGEN", "10I8", "\n");
        text += &section("BONDS_WITHOUT_HYDROGEN", "10I8", &ints_block(&[0, 3, 1, 3, 6, 1, 6, 9, 1]));
        text += &section("ANGLES_INC_HYDROGEN", "10I8", "\n");
        text += &section("ANGLES_WITHOUT_HYDROGEN", "10I8", "\n");
        text += &section("DIHEDRALS_INC_HYDROGEN", "10I8", "\n");
        // The second term of the multi-term torsion carries a negative third index.
        text += &section(
            "DIHEDRALS_WITHOUT_HYDROGEN",
            "10I8",
            &ints_block(&[0, 3, 6, 9, 1, 0, 3, -6, 9, 2]),
        );

        let ff = parse(&text).unwrap().forcefield;
        assert_eq!(ff.torsions.len(), 2);
        assert!((ff.torsions[0].k - 0.18 * KCAL_TO_KJ).abs() < 1e-12);
        assert_eq!(ff.torsions[1].atoms, [0, 1, 2, 3]);
        assert!(!ff.torsions[1].improper);
        assert_eq!(ff.nonbonded.pairs_14.len(), 1);
        let pair = ff.nonbonded.pairs_14[0];
        assert_eq!(pair.atoms, [0, 3]);
        assert!((pair.coulomb_scale - 1.0 / 1.2).abs() < 1e-12);
        assert!((pair.lj_scale - 0.5).abs() < 1e-12);
        assert!(ff.nonbonded.is_excluded(0, 3));
    }
}
