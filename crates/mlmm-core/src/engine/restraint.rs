use crate::core::forcefield::potentials;
use crate::core::units::{angstrom_to_nm, kcal_per_angstrom2_to_kj_per_nm2};
use crate::engine::forces::{EvaluationInput, Force, ForceError, check_indices};
use crate::engine::parameters::ParameterSpec;
use nalgebra::{Point3, Vector3};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_FORCE_CONSTANT_NAME: &str = "k";
pub const DEFAULT_TARGET_NAME: &str = "r0";

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error, PartialEq)]
pub enum RestraintError {
    #[error("Restraint needs at least one distance pair")]
    NoPairs,
    #[error("Pair {index} uses atom {atom} twice")]
    DegeneratePair { index: usize, atom: usize },
    #[error("Pair {index} has a non-finite weight {weight}")]
    InvalidWeight { index: usize, weight: f64 },
    #[error("Pair {index} references atom {atom}, but the system has {atom_count} atoms")]
    AtomOutOfRange {
        index: usize,
        atom: usize,
        atom_count: usize,
    },
    #[error("Restraint {what} must be finite, got {value}")]
    InvalidValue { what: &'static str, value: f64 },
    #[error("Force constant and target must use different parameter names")]
    ParameterNameClash,
}

/// One weighted interatomic distance of the collective variable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedPair {
    pub atoms: [usize; 2],
    pub weight: f64,
}

/// Restraint settings in the units people usually write them in.
#[derive(Debug, Clone, PartialEq)]
pub struct RestraintConfig {
    pub pairs: Vec<WeightedPair>,
    /// Force constant in kcal/mol/Å².
    pub force_constant_kcal_per_mol_a2: f64,
    /// Target collective-variable value in Å.
    pub target_angstrom: f64,
    pub force_constant_name: String,
    pub target_name: String,
}

impl RestraintConfig {
    pub fn new(pairs: Vec<WeightedPair>, force_constant_kcal_per_mol_a2: f64, target_angstrom: f64) -> Self {
        Self {
            pairs,
            force_constant_kcal_per_mol_a2,
            target_angstrom,
            force_constant_name: DEFAULT_FORCE_CONSTANT_NAME.to_string(),
            target_name: DEFAULT_TARGET_NAME.to_string(),
        }
    }

    /// Force constant in kJ/mol/nm².
    pub fn force_constant(&self) -> f64 {
        kcal_per_angstrom2_to_kj_per_nm2(self.force_constant_kcal_per_mol_a2)
    }

    /// Target in nm.
    pub fn target(&self) -> f64 {
        angstrom_to_nm(self.target_angstrom)
    }
}

/// Quadratic bias on a weighted sum of interatomic distances:
/// `E = k (Σ wᵢ dᵢ − r0)²`.
///
/// `k` and `r0` are read from the context's global parameters on every evaluation, so
/// they can be changed after the force is added. The values captured here only serve as
/// the parameters' defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedDistanceRestraint {
    pairs: Vec<WeightedPair>,
    force_constant_name: String,
    target_name: String,
    default_force_constant: f64,
    default_target: f64,
}

impl WeightedDistanceRestraint {
    /// Builds the restraint and converts its parameters to kJ/mol/nm² and nm.
    ///
    /// Weights are arbitrary linear coefficients. A sum other than one is allowed but
    /// logged, since it changes the meaning of `r0`.
    pub fn new(config: &RestraintConfig) -> Result<Self, RestraintError> {
        if config.pairs.is_empty() {
            return Err(RestraintError::NoPairs);
        }
        for (index, pair) in config.pairs.iter().enumerate() {
            if pair.atoms[0] == pair.atoms[1] {
                return Err(RestraintError::DegeneratePair {
                    index,
                    atom: pair.atoms[0],
                });
            }
            if !pair.weight.is_finite() {
                return Err(RestraintError::InvalidWeight {
                    index,
                    weight: pair.weight,
                });
            }
        }
        for (what, value) in [
            ("force constant", config.force_constant_kcal_per_mol_a2),
            ("target", config.target_angstrom),
        ] {
            if !value.is_finite() {
                return Err(RestraintError::InvalidValue { what, value });
            }
        }
        if config.force_constant_name == config.target_name {
            return Err(RestraintError::ParameterNameClash);
        }

        let weight_sum: f64 = config.pairs.iter().map(|p| p.weight).sum();
        if (weight_sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            warn!(
                weight_sum,
                "Restraint weights do not sum to 1; the target is compared against the raw weighted sum"
            );
        }

        let restraint = Self {
            pairs: config.pairs.clone(),
            force_constant_name: config.force_constant_name.clone(),
            target_name: config.target_name.clone(),
            default_force_constant: config.force_constant(),
            default_target: config.target(),
        };
        debug!(
            pairs = restraint.pairs.len(),
            k = restraint.default_force_constant,
            r0 = restraint.default_target,
            "Built weighted-distance restraint"
        );
        Ok(restraint)
    }

    pub fn pairs(&self) -> &[WeightedPair] {
        &self.pairs
    }

    pub fn force_constant_name(&self) -> &str {
        &self.force_constant_name
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn default_force_constant(&self) -> f64 {
        self.default_force_constant
    }

    pub fn default_target(&self) -> f64 {
        self.default_target
    }

    /// Checks the pair indices against a system size.
    pub fn check_atoms(&self, atom_count: usize) -> Result<(), RestraintError> {
        for (index, pair) in self.pairs.iter().enumerate() {
            for &atom in &pair.atoms {
                if atom >= atom_count {
                    return Err(RestraintError::AtomOutOfRange {
                        index,
                        atom,
                        atom_count,
                    });
                }
            }
        }
        Ok(())
    }

    /// The weighted distance `Σ wᵢ dᵢ` in nm.
    pub fn collective_variable(
        &self,
        positions: &[Point3<f64>],
        periodic_box: Option<&Vector3<f64>>,
    ) -> f64 {
        self.pairs
            .iter()
            .map(|p| {
                let d = potentials::displacement(
                    &positions[p.atoms[0]],
                    &positions[p.atoms[1]],
                    periodic_box,
                );
                p.weight * d.norm()
            })
            .sum()
    }
}

impl Force for WeightedDistanceRestraint {
    fn name(&self) -> &str {
        "WeightedDistanceRestraint"
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::new(&self.force_constant_name, self.default_force_constant, "kJ/mol/nm^2"),
            ParameterSpec::new(&self.target_name, self.default_target, "nm"),
        ]
    }

    fn validate(&self, atom_count: usize) -> Result<(), ForceError> {
        check_indices(self.name(), atom_count, self.pairs.iter().flat_map(|p| &p.atoms))
    }

    fn compute(
        &mut self,
        input: &EvaluationInput<'_>,
        forces: &mut [Vector3<f64>],
    ) -> Result<f64, ForceError> {
        let k = input.parameters.get(&self.force_constant_name)?;
        let r0 = input.parameters.get(&self.target_name)?;

        let mut displacements = Vec::with_capacity(self.pairs.len());
        let mut cv = 0.0;
        for pair in &self.pairs {
            let d = potentials::displacement(
                &input.positions[pair.atoms[0]],
                &input.positions[pair.atoms[1]],
                input.periodic_box,
            );
            let r = d.norm();
            cv += pair.weight * r;
            displacements.push((d, r));
        }

        let (energy, de_dcv) = potentials::harmonic(cv, k, r0);
        for (pair, (d, r)) in self.pairs.iter().zip(displacements) {
            let f = potentials::radial_force(&d, r, de_dcv * pair.weight);
            forces[pair.atoms[0]] += f;
            forces[pair.atoms[1]] -= f;
        }
        Ok(energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::forces::tests::assert_forces_match_gradient;
    use crate::engine::parameters::ParameterTable;

    fn observed_config() -> RestraintConfig {
        RestraintConfig::new(
            vec![
                WeightedPair {
                    atoms: [0, 1],
                    weight: 0.7,
                },
                WeightedPair {
                    atoms: [2, 3],
                    weight: 0.3,
                },
            ],
            125.0,
            2.0,
        )
    }

    fn positions() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.3, 0.0, 0.0),
            Point3::new(0.0, 0.5, 0.0),
            Point3::new(0.0, 0.5, 0.1),
        ]
    }

    fn table_for(restraint: &WeightedDistanceRestraint) -> ParameterTable {
        let mut table = ParameterTable::new();
        for spec in restraint.parameters() {
            table.register(spec).unwrap();
        }
        table
    }

    fn energy(restraint: &mut WeightedDistanceRestraint, table: &ParameterTable, x: &[Point3<f64>]) -> f64 {
        let input = EvaluationInput {
            positions: x,
            periodic_box: None,
            parameters: table,
            step: 0,
        };
        let mut forces = vec![Vector3::zeros(); x.len()];
        restraint.compute(&input, &mut forces).unwrap()
    }

    #[test]
    fn parameters_are_converted_to_internal_units() {
        let restraint = WeightedDistanceRestraint::new(&observed_config()).unwrap();
        assert!((restraint.default_force_constant() - 52_300.0).abs() < 1e-9);
        assert!((restraint.default_target() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn collective_variable_is_weighted_sum_of_distances() {
        let restraint = WeightedDistanceRestraint::new(&observed_config()).unwrap();
        let cv = restraint.collective_variable(&positions(), None);
        assert!((cv - (0.7 * 0.3 + 0.3 * 0.1)).abs() < 1e-12);
    }

    #[test]
    fn energy_is_zero_at_target() {
        let mut restraint = WeightedDistanceRestraint::new(&observed_config()).unwrap();
        let mut table = table_for(&restraint);
        let x = positions();
        let cv = restraint.collective_variable(&x, None);
        table.set("r0", cv).unwrap();
        assert!(energy(&mut restraint, &table, &x).abs() < 1e-12);
    }

    #[test]
    fn energy_grows_monotonically_away_from_target() {
        let mut restraint = WeightedDistanceRestraint::new(&observed_config()).unwrap();
        let mut table = table_for(&restraint);
        let x = positions();
        let cv = restraint.collective_variable(&x, None);
        let mut previous = 0.0;
        for offset in [0.01, 0.02, 0.05, 0.1] {
            table.set("r0", cv - offset).unwrap();
            let above = energy(&mut restraint, &table, &x);
            table.set("r0", cv + offset).unwrap();
            let below = energy(&mut restraint, &table, &x);
            assert!(above > previous && below > previous);
            assert!((above - below).abs() < 1e-9);
            previous = above;
        }
    }

    #[test]
    fn parameter_changes_take_effect_without_rebuilding() {
        let mut restraint = WeightedDistanceRestraint::new(&observed_config()).unwrap();
        let mut table = table_for(&restraint);
        let x = positions();
        let before = energy(&mut restraint, &table, &x);
        let k = table.get("k").unwrap();
        table.set("k", 2.0 * k).unwrap();
        let after = energy(&mut restraint, &table, &x);
        assert!((after - 2.0 * before).abs() < 1e-9 * before.abs().max(1.0));
    }

    #[test]
    fn forces_match_numerical_gradient() {
        let mut restraint = WeightedDistanceRestraint::new(&observed_config()).unwrap();
        let mut table = table_for(&restraint);
        table.set("r0", 0.2).unwrap();
        table.set("k", 500.0).unwrap();
        assert_forces_match_gradient(&mut restraint, &positions(), None, &table, 1e-4);
    }

    #[test]
    fn shared_atoms_between_pairs_accumulate_forces() {
        let config = RestraintConfig::new(
            vec![
                WeightedPair {
                    atoms: [0, 1],
                    weight: 0.5,
                },
                WeightedPair {
                    atoms: [1, 2],
                    weight: 0.5,
                },
            ],
            10.0,
            1.0,
        );
        let mut restraint = WeightedDistanceRestraint::new(&config).unwrap();
        let table = table_for(&restraint);
        let x = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.2, 0.05, 0.0),
            Point3::new(0.3, 0.3, 0.1),
        ];
        assert_forces_match_gradient(&mut restraint, &x, None, &table, 1e-4);
    }

    #[test]
    fn rejects_invalid_configurations() {
        let mut config = observed_config();
        config.pairs.clear();
        assert_eq!(WeightedDistanceRestraint::new(&config), Err(RestraintError::NoPairs));

        let mut config = observed_config();
        config.pairs[1].atoms = [4, 4];
        assert!(matches!(
            WeightedDistanceRestraint::new(&config),
            Err(RestraintError::DegeneratePair { index: 1, atom: 4 })
        ));

        let mut config = observed_config();
        config.pairs[0].weight = f64::INFINITY;
        assert!(matches!(
            WeightedDistanceRestraint::new(&config),
            Err(RestraintError::InvalidWeight { index: 0, .. })
        ));

        let mut config = observed_config();
        config.target_name = "k".to_string();
        assert_eq!(
            WeightedDistanceRestraint::new(&config),
            Err(RestraintError::ParameterNameClash)
        );
    }

    #[test]
    fn unnormalised_weights_are_accepted() {
        let mut config = observed_config();
        config.pairs[1].weight = 1.3;
        assert!(WeightedDistanceRestraint::new(&config).is_ok());
    }

    #[test]
    fn check_atoms_reports_out_of_range_pairs() {
        let restraint = WeightedDistanceRestraint::new(&observed_config()).unwrap();
        assert!(restraint.check_atoms(4).is_ok());
        assert_eq!(
            restraint.check_atoms(3),
            Err(RestraintError::AtomOutOfRange {
                index: 1,
                atom: 3,
                atom_count: 3
            })
        );
    }
}
