use super::EmbeddingMethod;
use super::backend::{BackendError, BackendRequest, EnergyBackend};
use crate::core::forcefield::potentials::minimum_image;
use crate::engine::forces::{EvaluationInput, Force, ForceError, check_indices};
use nalgebra::{Point3, Vector3};
use tracing::{debug, trace};

/// Force that delegates the ML/QM region to an energy backend.
///
/// The region is fixed for the engine's lifetime. The list of surrounding MM atoms sent
/// to the backend is rebuilt every `neighbour_list_frequency` steps; in between, the
/// same atoms are sent with their current positions.
#[derive(Debug)]
pub struct EmbeddingEngine {
    region: Vec<usize>,
    in_region: Vec<bool>,
    atomic_numbers: Vec<u8>,
    charges: Vec<f64>,
    qm_charge: i32,
    method: EmbeddingMethod,
    cutoff: f64,
    neighbour_list_frequency: u64,
    neighbours: Vec<usize>,
    last_rebuild: Option<u64>,
    backend: Box<dyn EnergyBackend>,
    evaluations: u64,
    qm_positions: Vec<Point3<f64>>,
    mm_positions: Vec<Point3<f64>>,
    mm_charges: Vec<f64>,
}

impl EmbeddingEngine {
    /// # Arguments
    ///
    /// * `region` - Sorted atom indices of the ML/QM region.
    /// * `atomic_numbers` - Atomic number of every atom in the system.
    /// * `charges` - Classical charges of every atom, as seen by the backend.
    /// * `qm_charge` - Net charge assigned to the region.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        region: Vec<usize>,
        atomic_numbers: &[u8],
        charges: Vec<f64>,
        qm_charge: i32,
        method: EmbeddingMethod,
        cutoff: f64,
        neighbour_list_frequency: u64,
        backend: Box<dyn EnergyBackend>,
    ) -> Self {
        let mut in_region = vec![false; charges.len()];
        for &i in &region {
            if let Some(flag) = in_region.get_mut(i) {
                *flag = true;
            }
        }
        let region_numbers = region
            .iter()
            .map(|&i| atomic_numbers.get(i).copied().unwrap_or(0))
            .collect();
        Self {
            qm_positions: Vec::with_capacity(region.len()),
            region,
            in_region,
            atomic_numbers: region_numbers,
            charges,
            qm_charge,
            method,
            cutoff,
            neighbour_list_frequency: neighbour_list_frequency.max(1),
            neighbours: Vec::new(),
            last_rebuild: None,
            backend,
            evaluations: 0,
            mm_positions: Vec::new(),
            mm_charges: Vec::new(),
        }
    }

    pub fn region(&self) -> &[usize] {
        &self.region
    }

    pub fn method(&self) -> EmbeddingMethod {
        self.method
    }

    pub fn qm_charge(&self) -> i32 {
        self.qm_charge
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// MM atoms currently sent to the backend.
    pub fn neighbours(&self) -> &[usize] {
        &self.neighbours
    }

    /// Number of backend evaluations so far.
    pub fn evaluations(&self) -> u64 {
        self.evaluations
    }

    fn needs_rebuild(&self, step: u64) -> bool {
        match self.last_rebuild {
            None => true,
            Some(last) => step < last || step - last >= self.neighbour_list_frequency,
        }
    }

    /// Places the region atoms in one periodic image around its first atom.
    fn gather_region(&mut self, positions: &[Point3<f64>], periodic_box: Option<&Vector3<f64>>) {
        self.qm_positions.clear();
        let anchor = positions[self.region[0]];
        for &i in &self.region {
            self.qm_positions
                .push(anchor + minimum_image(positions[i] - anchor, periodic_box));
        }
    }

    fn region_centre(&self) -> Point3<f64> {
        let sum: Vector3<f64> = self.qm_positions.iter().map(|p| p.coords).sum();
        Point3::from(sum / self.qm_positions.len() as f64)
    }

    fn rebuild_neighbours(
        &mut self,
        positions: &[Point3<f64>],
        periodic_box: Option<&Vector3<f64>>,
        step: u64,
    ) {
        self.neighbours.clear();
        if self.method == EmbeddingMethod::Electrostatic {
            let cutoff2 = self.cutoff * self.cutoff;
            for (j, p) in positions.iter().enumerate() {
                if self.in_region[j] || self.charges[j] == 0.0 {
                    continue;
                }
                let close = self
                    .qm_positions
                    .iter()
                    .any(|q| minimum_image(p - q, periodic_box).norm_squared() <= cutoff2);
                if close {
                    self.neighbours.push(j);
                }
            }
        }
        self.last_rebuild = Some(step);
        debug!(
            step,
            neighbours = self.neighbours.len(),
            "Rebuilt embedding neighbour list"
        );
    }
}

impl Force for EmbeddingEngine {
    fn name(&self) -> &str {
        "EmbeddingEngine"
    }

    fn validate(&self, atom_count: usize) -> Result<(), ForceError> {
        if self.region.is_empty() || self.charges.len() != atom_count {
            return Err(ForceError::Invalid {
                force: self.name().to_string(),
                message: format!(
                    "region of {} atoms with {} charges for a system of {} atoms",
                    self.region.len(),
                    self.charges.len(),
                    atom_count
                ),
            });
        }
        check_indices(self.name(), atom_count, &self.region)
    }

    fn compute(
        &mut self,
        input: &EvaluationInput<'_>,
        forces: &mut [Vector3<f64>],
    ) -> Result<f64, ForceError> {
        let positions = input.positions;
        self.gather_region(positions, input.periodic_box);
        if self.needs_rebuild(input.step) {
            self.rebuild_neighbours(positions, input.periodic_box, input.step);
        }

        let centre = self.region_centre();
        self.mm_positions.clear();
        self.mm_charges.clear();
        for &j in &self.neighbours {
            self.mm_positions
                .push(centre + minimum_image(positions[j] - centre, input.periodic_box));
            self.mm_charges.push(self.charges[j]);
        }

        let request = BackendRequest {
            qm_atomic_numbers: &self.atomic_numbers,
            qm_positions: &self.qm_positions,
            qm_charge: self.qm_charge,
            mm_charges: &self.mm_charges,
            mm_positions: &self.mm_positions,
        };
        let result = self.backend.compute(&request)?;
        if result.qm_forces.len() != self.region.len()
            || result.mm_forces.len() != self.neighbours.len()
        {
            return Err(BackendError::Parse(format!(
                "backend returned {} QM and {} MM forces for {} QM and {} MM atoms",
                result.qm_forces.len(),
                result.mm_forces.len(),
                self.region.len(),
                self.neighbours.len()
            ))
            .into());
        }
        if !result.is_finite() {
            return Err(BackendError::NonFinite.into());
        }

        for (&i, f) in self.region.iter().zip(&result.qm_forces) {
            forces[i] += f;
        }
        for (&j, f) in self.neighbours.iter().zip(&result.mm_forces) {
            forces[j] += f;
        }
        self.evaluations += 1;
        trace!(step = input.step, energy = result.energy, "Embedding evaluation");
        Ok(result.energy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::system::tests::water_dimer_with_ion;
    use crate::engine::embedding::backend::tests::TetherBackend;
    use crate::engine::parameters::ParameterTable;

    fn engine(method: EmbeddingMethod, frequency: u64) -> EmbeddingEngine {
        let system = water_dimer_with_ion();
        let numbers: Vec<u8> = system.atoms().iter().map(|a| a.atomic_number).collect();
        let charges = vec![-0.834, 0.417, 0.417, -0.834, 0.417, 0.417, 1.0];
        EmbeddingEngine::new(
            vec![0, 1, 2],
            &numbers,
            charges,
            0,
            method,
            0.5,
            frequency,
            Box::new(TetherBackend {
                k: 10.0,
                ..Default::default()
            }),
        )
    }

    fn evaluate(engine: &mut EmbeddingEngine, positions: &[Point3<f64>], step: u64) -> (f64, Vec<Vector3<f64>>) {
        let table = ParameterTable::new();
        let input = EvaluationInput {
            positions,
            periodic_box: None,
            parameters: &table,
            step,
        };
        let mut forces = vec![Vector3::zeros(); positions.len()];
        let energy = engine.compute(&input, &mut forces).unwrap();
        (energy, forces)
    }

    #[test]
    fn electrostatic_embedding_sends_nearby_charges() {
        let system = water_dimer_with_ion();
        let mut engine = engine(EmbeddingMethod::Electrostatic, 10);
        evaluate(&mut engine, system.positions(), 0);
        assert_eq!(engine.neighbours(), &[3, 4, 5]);
        assert_eq!(engine.evaluations(), 1);
    }

    #[test]
    fn mechanical_embedding_sends_no_charges() {
        let system = water_dimer_with_ion();
        let mut engine = engine(EmbeddingMethod::Mechanical, 10);
        evaluate(&mut engine, system.positions(), 0);
        assert!(engine.neighbours().is_empty());
    }

    #[test]
    fn backend_forces_land_on_region_atoms() {
        let system = water_dimer_with_ion();
        let mut engine = engine(EmbeddingMethod::Electrostatic, 10);
        let (energy, forces) = evaluate(&mut engine, system.positions(), 0);
        let expected: f64 = system.positions()[..3]
            .iter()
            .map(|p| 10.0 * p.coords.norm_squared())
            .sum();
        assert!((energy - expected).abs() < 1e-12);
        assert!((forces[1] + 20.0 * system.positions()[1].coords).norm() < 1e-12);
        assert_eq!(forces[6], Vector3::zeros());
    }

    #[test]
    fn neighbour_list_is_reused_between_rebuilds() {
        let system = water_dimer_with_ion();
        let mut engine = engine(EmbeddingMethod::Electrostatic, 10);
        evaluate(&mut engine, system.positions(), 0);

        let mut moved = system.positions().to_vec();
        moved[6] = Point3::new(0.35, 0.1, 0.0);
        evaluate(&mut engine, &moved, 5);
        assert_eq!(engine.neighbours(), &[3, 4, 5]);
        evaluate(&mut engine, &moved, 10);
        assert_eq!(engine.neighbours(), &[3, 4, 5, 6]);
    }

    #[test]
    fn validate_checks_charge_count() {
        let engine = engine(EmbeddingMethod::Electrostatic, 1);
        assert!(engine.validate(7).is_ok());
        assert!(engine.validate(8).is_err());
    }
}
