use super::error::EngineError;
use super::forces::ForceSystem;
use super::integrator::{DynamicState, Integrator, evaluate};
use super::parameters::{ParameterError, ParameterTable};
use crate::core::units::BOLTZMANN_KJ_PER_MOL_K;
use nalgebra::{Point3, Vector3};
use tracing::{debug, info};

/// The numerical state of one simulation: a force system, an integrator, particle state
/// and the table of global parameters.
///
/// Adding a force requires a new context. Use [`Context::into_parts`] to take the system
/// and integrator back out, modify the system, and build a fresh context from them.
pub struct Context {
    system: ForceSystem,
    integrator: Integrator,
    state: DynamicState,
    parameters: ParameterTable,
    #[cfg(feature = "parallel")]
    pool: Option<rayon::ThreadPool>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("atoms", &self.system.atom_count())
            .field("forces", &self.system.force_names())
            .field("step", &self.state.step)
            .field("potential_energy", &self.state.potential_energy)
            .finish()
    }
}

impl Context {
    /// Builds a context and evaluates the initial forces.
    ///
    /// When `velocities` is `None`, velocities are drawn from the Maxwell–Boltzmann
    /// distribution at the integrator temperature. Initial positions and velocities are
    /// projected onto the constraints.
    ///
    /// # Errors
    ///
    /// Fails if array sizes disagree with the system, a force references a missing atom,
    /// two forces declare the same parameter differently, or the initial evaluation fails.
    pub fn new(
        system: ForceSystem,
        mut integrator: Integrator,
        positions: Vec<Point3<f64>>,
        velocities: Option<Vec<Vector3<f64>>>,
    ) -> Result<Self, EngineError> {
        let n = system.atom_count();
        if positions.len() != n {
            return Err(EngineError::Initialization(format!(
                "{} positions for a system of {} atoms",
                positions.len(),
                n
            )));
        }
        if let Some(v) = &velocities {
            if v.len() != n {
                return Err(EngineError::Initialization(format!(
                    "{} velocities for a system of {} atoms",
                    v.len(),
                    n
                )));
            }
        }
        system
            .validate()
            .map_err(|source| EngineError::Force { step: 0, source })?;

        let mut parameters = ParameterTable::new();
        for force in system.forces() {
            for spec in force.parameters() {
                parameters.register(spec)?;
            }
        }

        let inverse_masses: Vec<f64> = system
            .masses()
            .iter()
            .map(|&m| if m > 0.0 { 1.0 / m } else { 0.0 })
            .collect();
        let velocities = match velocities {
            Some(mut given) => {
                for (v, &w) in given.iter_mut().zip(&inverse_masses) {
                    if w == 0.0 {
                        *v = Vector3::zeros();
                    }
                }
                given
            }
            None => {
                debug!(
                    temperature = integrator.temperature(),
                    "Drawing initial velocities"
                );
                integrator.thermal_velocities(&inverse_masses)
            }
        };

        let mut state = DynamicState {
            forces: vec![Vector3::zeros(); n],
            positions,
            velocities,
            inverse_masses,
            ..Default::default()
        };
        let reference = state.positions.clone();
        integrator.constrain_positions(&system, &mut state, &reference, system.periodic_box())?;
        integrator.constrain_velocities(&system, &mut state)?;

        #[cfg(feature = "parallel")]
        let pool = match integrator.threads() {
            Some(threads) => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .build()
                    .map_err(|e| {
                        EngineError::Initialization(format!("failed to build thread pool: {e}"))
                    })?,
            ),
            None => None,
        };

        let mut context = Self {
            system,
            integrator,
            state,
            parameters,
            #[cfg(feature = "parallel")]
            pool,
        };
        context.refresh()?;
        info!(
            atoms = n,
            forces = ?context.system.force_names(),
            constraints = context.system.constraints().len(),
            potential_energy = context.state.potential_energy,
            "Created integration context"
        );
        Ok(context)
    }

    /// Re-evaluates forces and energies at the current positions.
    fn refresh(&mut self) -> Result<(), EngineError> {
        let system = &mut self.system;
        let state = &mut self.state;
        let parameters = &self.parameters;

        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            return pool.install(|| evaluate(system, state, parameters));
        }
        evaluate(system, state, parameters)
    }

    /// Advances the simulation by `steps` integration steps.
    pub fn step(&mut self, steps: u64) -> Result<(), EngineError> {
        let system = &mut self.system;
        let integrator = &mut self.integrator;
        let state = &mut self.state;
        let parameters = &self.parameters;
        let mut advance = || -> Result<(), EngineError> {
            for _ in 0..steps {
                integrator.step(system, state, parameters)?;
            }
            Ok(())
        };

        #[cfg(feature = "parallel")]
        if let Some(pool) = &self.pool {
            return pool.install(advance);
        }
        advance()
    }

    /// Changes a global parameter and re-evaluates forces so the next step sees it.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> Result<(), EngineError> {
        self.parameters.set(name, value)?;
        debug!(name, value, "Set global parameter");
        self.refresh()
    }

    pub fn parameter(&self, name: &str) -> Result<f64, ParameterError> {
        self.parameters.get(name)
    }

    pub fn parameters(&self) -> &ParameterTable {
        &self.parameters
    }

    /// Potential energy in kJ/mol.
    pub fn potential_energy(&self) -> f64 {
        self.state.potential_energy
    }

    /// Energy of each force, by name, in kJ/mol.
    pub fn energy_breakdown(&self) -> Vec<(String, f64)> {
        self.system
            .force_names()
            .into_iter()
            .zip(self.state.breakdown.iter().copied())
            .collect()
    }

    /// Kinetic energy in kJ/mol.
    pub fn kinetic_energy(&self) -> f64 {
        self.state
            .velocities
            .iter()
            .zip(&self.state.inverse_masses)
            .filter(|(_, w)| **w > 0.0)
            .map(|(v, w)| 0.5 * v.norm_squared() / w)
            .sum()
    }

    /// Instantaneous temperature in K.
    pub fn temperature(&self) -> f64 {
        let dof = self.system.degrees_of_freedom();
        if dof == 0 {
            return 0.0;
        }
        2.0 * self.kinetic_energy() / (dof as f64 * BOLTZMANN_KJ_PER_MOL_K)
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.state.positions
    }

    pub fn velocities(&self) -> &[Vector3<f64>] {
        &self.state.velocities
    }

    pub fn forces(&self) -> &[Vector3<f64>] {
        &self.state.forces
    }

    /// Steps taken since this context was created.
    pub fn current_step(&self) -> u64 {
        self.state.step
    }

    /// Simulated time since this context was created, in ps.
    pub fn time(&self) -> f64 {
        self.state.step as f64 * self.integrator.timestep()
    }

    pub fn periodic_box(&self) -> Option<&Vector3<f64>> {
        self.system.periodic_box()
    }

    pub fn system(&self) -> &ForceSystem {
        &self.system
    }

    pub fn integrator(&self) -> &Integrator {
        &self.integrator
    }

    /// Takes the context apart into its system, integrator, positions and velocities.
    pub fn into_parts(self) -> (ForceSystem, Integrator, Vec<Point3<f64>>, Vec<Vector3<f64>>) {
        (
            self.system,
            self.integrator,
            self.state.positions,
            self.state.velocities,
        )
    }
}
