//! Unit conversion constants.
//!
//! Internal units: length nm, time ps, energy kJ/mol, mass amu, charge e, temperature K.

pub const KCAL_TO_KJ: f64 = 4.184;
pub const ANGSTROM_TO_NM: f64 = 0.1;
pub const NM_TO_ANGSTROM: f64 = 10.0;
pub const FEMTOSECOND_TO_PICOSECOND: f64 = 1.0e-3;

/// Boltzmann constant in kJ/(mol·K).
pub const BOLTZMANN_KJ_PER_MOL_K: f64 = 0.008_314_462_618;

/// 1 / (4π ε0) in kJ·nm/(mol·e²).
pub const COULOMB_CONSTANT: f64 = 138.935_458;

/// AMBER stores charges pre-multiplied by this factor.
pub const AMBER_CHARGE_FACTOR: f64 = 18.2223;

/// AMBER restart velocities are in Å per (1/20.455) ps.
pub const AMBER_VELOCITY_FACTOR: f64 = 20.455;

pub const HARTREE_TO_KJ_PER_MOL: f64 = 2625.499_639;
pub const BOHR_TO_NM: f64 = 0.052_917_721_090_3;

/// The AKMA time unit (used in DCD headers) expressed in ps.
pub const AKMA_TIME_PS: f64 = 0.048_888_21;

#[inline]
pub fn kcal_to_kj(value: f64) -> f64 {
    value * KCAL_TO_KJ
}

#[inline]
pub fn angstrom_to_nm(value: f64) -> f64 {
    value * ANGSTROM_TO_NM
}

#[inline]
pub fn nm_to_angstrom(value: f64) -> f64 {
    value * NM_TO_ANGSTROM
}

/// Converts a force constant from kcal/(mol·Å²) to kJ/(mol·nm²).
#[inline]
pub fn kcal_per_angstrom2_to_kj_per_nm2(value: f64) -> f64 {
    value * KCAL_TO_KJ / (ANGSTROM_TO_NM * ANGSTROM_TO_NM)
}

/// Converts a gradient from Hartree/Bohr to kJ/(mol·nm).
#[inline]
pub fn hartree_per_bohr_to_kj_per_nm(value: f64) -> f64 {
    value * HARTREE_TO_KJ_PER_MOL / BOHR_TO_NM
}
