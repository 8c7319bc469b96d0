use super::{EvaluationInput, Force, ForceError, check_indices};
use crate::core::forcefield::params::{AngleParam, BondParam, TorsionParam};
use crate::core::forcefield::potentials;
use nalgebra::Vector3;

#[derive(Debug, Clone, Default)]
pub struct HarmonicBondForce {
    bonds: Vec<BondParam>,
}

impl HarmonicBondForce {
    pub fn new(bonds: Vec<BondParam>) -> Self {
        Self { bonds }
    }

    pub fn bonds(&self) -> &[BondParam] {
        &self.bonds
    }
}

impl Force for HarmonicBondForce {
    fn name(&self) -> &str {
        "HarmonicBondForce"
    }

    fn validate(&self, atom_count: usize) -> Result<(), ForceError> {
        check_indices(self.name(), atom_count, self.bonds.iter().flat_map(|b| &b.atoms))
    }

    fn compute(
        &mut self,
        input: &EvaluationInput<'_>,
        forces: &mut [Vector3<f64>],
    ) -> Result<f64, ForceError> {
        let mut energy = 0.0;
        for bond in &self.bonds {
            let [i, j] = bond.atoms;
            let d = potentials::displacement(
                &input.positions[i],
                &input.positions[j],
                input.periodic_box,
            );
            let r = d.norm();
            let (e, de_dr) = potentials::harmonic(r, bond.k, bond.r0);
            let f = potentials::radial_force(&d, r, de_dr);
            forces[i] += f;
            forces[j] -= f;
            energy += e;
        }
        Ok(energy)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HarmonicAngleForce {
    angles: Vec<AngleParam>,
}

impl HarmonicAngleForce {
    pub fn new(angles: Vec<AngleParam>) -> Self {
        Self { angles }
    }
}

impl Force for HarmonicAngleForce {
    fn name(&self) -> &str {
        "HarmonicAngleForce"
    }

    fn validate(&self, atom_count: usize) -> Result<(), ForceError> {
        check_indices(self.name(), atom_count, self.angles.iter().flat_map(|a| &a.atoms))
    }

    fn compute(
        &mut self,
        input: &EvaluationInput<'_>,
        forces: &mut [Vector3<f64>],
    ) -> Result<f64, ForceError> {
        let mut energy = 0.0;
        for angle in &self.angles {
            let [i, j, k] = angle.atoms;
            let p = input.positions;
            let (e, f) = potentials::harmonic_angle(
                [&p[i], &p[j], &p[k]],
                angle.k,
                angle.theta0,
                input.periodic_box,
            );
            forces[i] += f[0];
            forces[j] += f[1];
            forces[k] += f[2];
            energy += e;
        }
        Ok(energy)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PeriodicTorsionForce {
    torsions: Vec<TorsionParam>,
}

impl PeriodicTorsionForce {
    pub fn new(torsions: Vec<TorsionParam>) -> Self {
        Self { torsions }
    }
}

impl Force for PeriodicTorsionForce {
    fn name(&self) -> &str {
        "PeriodicTorsionForce"
    }

    fn validate(&self, atom_count: usize) -> Result<(), ForceError> {
        check_indices(
            self.name(),
            atom_count,
            self.torsions.iter().flat_map(|t| &t.atoms),
        )
    }

    fn compute(
        &mut self,
        input: &EvaluationInput<'_>,
        forces: &mut [Vector3<f64>],
    ) -> Result<f64, ForceError> {
        let mut energy = 0.0;
        for torsion in &self.torsions {
            let [i, j, k, l] = torsion.atoms;
            let p = input.positions;
            let (e, f) = potentials::torsion(
                [&p[i], &p[j], &p[k], &p[l]],
                torsion.k,
                torsion.periodicity,
                torsion.phase,
                input.periodic_box,
            );
            forces[i] += f[0];
            forces[j] += f[1];
            forces[k] += f[2];
            forces[l] += f[3];
            energy += e;
        }
        Ok(energy)
    }
}
