use super::{EvaluationInput, Force, ForceError, check_indices};
use crate::core::forcefield::params::NonbondedParams;
use crate::core::forcefield::potentials;
use crate::core::units::COULOMB_CONSTANT;
use nalgebra::{Point3, Vector3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Dielectric of the continuum beyond the cutoff, as used for reaction-field electrostatics.
const REACTION_FIELD_DIELECTRIC: f64 = 78.3;

#[derive(Debug, Clone, Copy, PartialEq)]
struct ReactionField {
    cutoff: f64,
    k_rf: f64,
    c_rf: f64,
}

impl ReactionField {
    fn new(cutoff: f64) -> Self {
        let eps = REACTION_FIELD_DIELECTRIC;
        let k_rf = (eps - 1.0) / ((2.0 * eps + 1.0) * cutoff.powi(3));
        let c_rf = 1.0 / cutoff + k_rf * cutoff * cutoff;
        Self { cutoff, k_rf, c_rf }
    }
}

/// Lennard-Jones plus Coulomb between all non-excluded pairs, with scaled 1-4 pairs.
///
/// Without a cutoff every pair interacts through plain Coulomb. With a cutoff, pairs
/// beyond it are skipped and electrostatics use a reaction field. Scaled 1-4 pairs always
/// use plain Coulomb.
#[derive(Debug, Clone)]
pub struct NonbondedForce {
    params: NonbondedParams,
    reaction_field: Option<ReactionField>,
}

impl NonbondedForce {
    pub fn new(params: NonbondedParams, cutoff: Option<f64>) -> Self {
        Self {
            params,
            reaction_field: cutoff.map(ReactionField::new),
        }
    }

    pub fn params(&self) -> &NonbondedParams {
        &self.params
    }

    pub fn cutoff(&self) -> Option<f64> {
        self.reaction_field.map(|rf| rf.cutoff)
    }

    /// Adds the interactions of atom `i` with every `j > i` into `energy` and `forces`.
    fn accumulate_row(
        &self,
        i: usize,
        positions: &[Point3<f64>],
        periodic_box: Option<&Vector3<f64>>,
        energy: &mut f64,
        forces: &mut [Vector3<f64>],
    ) {
        let qi = self.params.charges[i];
        for j in (i + 1)..positions.len() {
            if self.params.is_excluded(i, j) {
                continue;
            }
            let d = potentials::displacement(&positions[i], &positions[j], periodic_box);
            let r2 = d.norm_squared();
            if let Some(rf) = &self.reaction_field {
                if r2 >= rf.cutoff * rf.cutoff {
                    continue;
                }
            }
            let r = r2.sqrt();
            let (a, b) = self.params.lj_pair(i, j);
            let (e_lj, de_lj) = if a != 0.0 || b != 0.0 {
                potentials::lennard_jones(r, a, b)
            } else {
                (0.0, 0.0)
            };
            let qq = qi * self.params.charges[j];
            let (e_q, de_q) = if qq == 0.0 {
                (0.0, 0.0)
            } else if let Some(rf) = &self.reaction_field {
                let prefactor = COULOMB_CONSTANT * qq;
                (
                    prefactor * (1.0 / r + rf.k_rf * r2 - rf.c_rf),
                    prefactor * (-1.0 / r2 + 2.0 * rf.k_rf * r),
                )
            } else {
                potentials::coulomb(r, qi, self.params.charges[j])
            };
            let f = potentials::radial_force(&d, r, de_lj + de_q);
            forces[i] += f;
            forces[j] -= f;
            *energy += e_lj + e_q;
        }
    }

    fn accumulate_pairs_14(
        &self,
        positions: &[Point3<f64>],
        periodic_box: Option<&Vector3<f64>>,
        forces: &mut [Vector3<f64>],
    ) -> f64 {
        let mut energy = 0.0;
        for pair in &self.params.pairs_14 {
            let [i, j] = pair.atoms;
            let d = potentials::displacement(&positions[i], &positions[j], periodic_box);
            let r = d.norm();
            let (a, b) = self.params.lj_pair(i, j);
            let (e_lj, de_lj) = potentials::lennard_jones(r, a, b);
            let (e_q, de_q) = potentials::coulomb(r, self.params.charges[i], self.params.charges[j]);
            let de_dr = pair.lj_scale * de_lj + pair.coulomb_scale * de_q;
            let f = potentials::radial_force(&d, r, de_dr);
            forces[i] += f;
            forces[j] -= f;
            energy += pair.lj_scale * e_lj + pair.coulomb_scale * e_q;
        }
        energy
    }
}

impl Force for NonbondedForce {
    fn name(&self) -> &str {
        "NonbondedForce"
    }

    fn validate(&self, atom_count: usize) -> Result<(), ForceError> {
        let p = &self.params;
        if p.charges.len() != atom_count
            || p.type_indices.len() != atom_count
            || p.exclusions.len() != atom_count
        {
            return Err(ForceError::Invalid {
                force: self.name().to_string(),
                message: format!(
                    "per-atom arrays have {} charges, {} types and {} exclusion lists for {} atoms",
                    p.charges.len(),
                    p.type_indices.len(),
                    p.exclusions.len(),
                    atom_count
                ),
            });
        }
        if p.lj_a.len() != p.n_types * p.n_types || p.lj_b.len() != p.n_types * p.n_types {
            return Err(ForceError::Invalid {
                force: self.name().to_string(),
                message: "Lennard-Jones matrix does not match the number of types".to_string(),
            });
        }
        if let Some(&t) = p.type_indices.iter().find(|&&t| t >= p.n_types) {
            return Err(ForceError::Invalid {
                force: self.name().to_string(),
                message: format!("atom type {t} is out of range for {} types", p.n_types),
            });
        }
        check_indices(self.name(), atom_count, p.pairs_14.iter().flat_map(|q| &q.atoms))
    }

    fn compute(
        &mut self,
        input: &EvaluationInput<'_>,
        forces: &mut [Vector3<f64>],
    ) -> Result<f64, ForceError> {
        let this: &Self = self;
        let positions = input.positions;
        let periodic_box = input.periodic_box;
        let n = positions.len();

        #[cfg(not(feature = "parallel"))]
        let (pair_energy, pair_forces) = {
            let mut energy = 0.0;
            let mut local = vec![Vector3::zeros(); n];
            for i in 0..n {
                this.accumulate_row(i, positions, periodic_box, &mut energy, &mut local);
            }
            (energy, local)
        };

        #[cfg(feature = "parallel")]
        let (pair_energy, pair_forces) = (0..n)
            .into_par_iter()
            .fold(
                || (0.0, vec![Vector3::zeros(); n]),
                |(mut energy, mut local), i| {
                    this.accumulate_row(i, positions, periodic_box, &mut energy, &mut local);
                    (energy, local)
                },
            )
            .reduce(
                || (0.0, vec![Vector3::zeros(); n]),
                |(ea, mut fa), (eb, fb)| {
                    for (a, b) in fa.iter_mut().zip(fb) {
                        *a += b;
                    }
                    (ea + eb, fa)
                },
            );

        for (total, f) in forces.iter_mut().zip(pair_forces) {
            *total += f;
        }
        let energy_14 = this.accumulate_pairs_14(positions, periodic_box, forces);
        Ok(pair_energy + energy_14)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::forcefield::params::tests::butane_like;
    use crate::core::forcefield::params::{NonbondedParams, Pair14};
    use crate::engine::forces::tests::assert_forces_match_gradient;
    use crate::engine::parameters::ParameterTable;

    fn ion_pair(charge: f64) -> NonbondedParams {
        NonbondedParams {
            charges: vec![charge, -charge],
            type_indices: vec![0, 0],
            n_types: 1,
            lj_a: vec![0.0],
            lj_b: vec![0.0],
            exclusions: vec![Vec::new(); 2],
            pairs_14: Vec::new(),
        }
    }

    fn evaluate(force: &mut NonbondedForce, positions: &[Point3<f64>]) -> (f64, Vec<Vector3<f64>>) {
        let table = ParameterTable::new();
        let input = EvaluationInput {
            positions,
            periodic_box: None,
            parameters: &table,
            step: 0,
        };
        let mut forces = vec![Vector3::zeros(); positions.len()];
        let energy = force.compute(&input, &mut forces).unwrap();
        (energy, forces)
    }

    #[test]
    fn opposite_charges_attract() {
        let mut force = NonbondedForce::new(ion_pair(1.0), None);
        let positions = [Point3::origin(), Point3::new(0.5, 0.0, 0.0)];
        let (energy, forces) = evaluate(&mut force, &positions);
        assert!((energy + COULOMB_CONSTANT / 0.5).abs() < 1e-9);
        assert!(forces[0].x > 0.0);
        assert!((forces[0] + forces[1]).norm() < 1e-9);
    }

    #[test]
    fn excluded_pairs_do_not_interact() {
        let mut params = ion_pair(1.0);
        params.add_exclusion(0, 1);
        let mut force = NonbondedForce::new(params, None);
        let positions = [Point3::origin(), Point3::new(0.5, 0.0, 0.0)];
        let (energy, forces) = evaluate(&mut force, &positions);
        assert_eq!(energy, 0.0);
        assert_eq!(forces[0], Vector3::zeros());
    }

    #[test]
    fn pairs_beyond_cutoff_are_skipped() {
        let mut force = NonbondedForce::new(ion_pair(1.0), Some(1.0));
        let positions = [Point3::origin(), Point3::new(1.2, 0.0, 0.0)];
        let (energy, _) = evaluate(&mut force, &positions);
        assert_eq!(energy, 0.0);
    }

    #[test]
    fn reaction_field_energy_vanishes_at_cutoff() {
        let mut force = NonbondedForce::new(ion_pair(1.0), Some(1.0));
        let positions = [Point3::origin(), Point3::new(1.0 - 1e-9, 0.0, 0.0)];
        let (energy, _) = evaluate(&mut force, &positions);
        assert!(energy.abs() < 1e-6);
    }

    #[test]
    fn scaled_14_pairs_are_added_back() {
        let mut params = ion_pair(1.0);
        params.add_exclusion(0, 1);
        params.pairs_14.push(Pair14 {
            atoms: [0, 1],
            coulomb_scale: 0.5,
            lj_scale: 0.5,
        });
        let mut force = NonbondedForce::new(params, None);
        let positions = [Point3::origin(), Point3::new(0.5, 0.0, 0.0)];
        let (energy, _) = evaluate(&mut force, &positions);
        assert!((energy + 0.5 * COULOMB_CONSTANT / 0.5).abs() < 1e-9);
    }

    #[test]
    fn forces_match_numerical_gradient() {
        let ff = butane_like();
        let mut params = ff.nonbonded.clone();
        params.exclusions = vec![Vec::new(); 4];
        params.add_exclusion(0, 1);
        let mut force = NonbondedForce::new(params, Some(1.2));
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.3, 0.05, 0.0),
            Point3::new(0.45, 0.35, 0.1),
            Point3::new(0.2, 0.4, 0.3),
        ];
        let table = ParameterTable::new();
        assert_forces_match_gradient(&mut force, &positions, None, &table, 1e-3);
    }

    #[test]
    fn validate_checks_per_atom_arrays() {
        let force = NonbondedForce::new(ion_pair(1.0), None);
        assert!(force.validate(2).is_ok());
        assert!(force.validate(3).is_err());
    }
}
