use super::config::{DynamicsConfig, IntegratorKind};
use super::constraints::ConstraintSolver;
use super::error::EngineError;
use super::forces::{EvaluationInput, ForceSystem};
use super::parameters::ParameterTable;
use crate::core::units::{BOLTZMANN_KJ_PER_MOL_K, FEMTOSECOND_TO_PICOSECOND};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use tracing::info;

/// Mutable per-particle state advanced by an [`Integrator`].
#[derive(Debug, Clone, Default)]
pub(crate) struct DynamicState {
    pub positions: Vec<Point3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
    pub forces: Vec<Vector3<f64>>,
    /// Zero for immovable particles.
    pub inverse_masses: Vec<f64>,
    pub potential_energy: f64,
    pub breakdown: Vec<f64>,
    pub step: u64,
}

/// Time-stepping scheme with its own random stream.
#[derive(Debug, Clone)]
pub struct Integrator {
    kind: IntegratorKind,
    timestep: f64,
    temperature: f64,
    friction: f64,
    seed: u64,
    threads: Option<usize>,
    solver: ConstraintSolver,
    rng: StdRng,
}

impl Integrator {
    /// # Arguments
    ///
    /// * `timestep` - Step size in ps.
    /// * `temperature` - Bath temperature in K.
    /// * `friction` - Collision rate in 1/ps (ignored by velocity Verlet).
    /// * `seed` - Seed of the random stream. When `None`, one is drawn and logged so the
    ///   run can be repeated.
    pub fn new(
        kind: IntegratorKind,
        timestep: f64,
        temperature: f64,
        friction: f64,
        seed: Option<u64>,
    ) -> Self {
        let seed = seed.unwrap_or_else(|| {
            let drawn = rand::random::<u64>();
            info!(seed = drawn, "No random seed given; drew one");
            drawn
        });
        Self {
            kind,
            timestep,
            temperature,
            friction,
            seed,
            threads: None,
            solver: ConstraintSolver::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_config(config: &DynamicsConfig) -> Self {
        let mut integrator = Self::new(
            config.integrator,
            config.timestep_fs * FEMTOSECOND_TO_PICOSECOND,
            config.temperature,
            config.friction,
            config.seed,
        );
        integrator.threads = config.threads;
        integrator
    }

    pub fn with_constraint_solver(mut self, solver: ConstraintSolver) -> Self {
        self.solver = solver;
        self
    }

    pub fn kind(&self) -> IntegratorKind {
        self.kind
    }

    /// Step size in ps.
    pub fn timestep(&self) -> f64 {
        self.timestep
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    pub fn friction(&self) -> f64 {
        self.friction
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Thread-count hint for force evaluation.
    pub fn threads(&self) -> Option<usize> {
        self.threads
    }

    /// Draws Maxwell–Boltzmann velocities at the bath temperature with zero net momentum.
    pub(crate) fn thermal_velocities(&mut self, inverse_masses: &[f64]) -> Vec<Vector3<f64>> {
        let kt = BOLTZMANN_KJ_PER_MOL_K * self.temperature;
        let mut velocities: Vec<Vector3<f64>> = inverse_masses
            .iter()
            .map(|&w| {
                if w == 0.0 {
                    Vector3::zeros()
                } else {
                    (kt * w).sqrt() * self.gaussian()
                }
            })
            .collect();

        let mut momentum = Vector3::zeros();
        let mut mass = 0.0;
        for (v, &w) in velocities.iter().zip(inverse_masses) {
            if w > 0.0 {
                momentum += v / w;
                mass += 1.0 / w;
            }
        }
        if mass > 0.0 {
            let drift = momentum / mass;
            for (v, &w) in velocities.iter_mut().zip(inverse_masses) {
                if w > 0.0 {
                    *v -= drift;
                }
            }
        }
        velocities
    }

    fn gaussian(&mut self) -> Vector3<f64> {
        Vector3::new(
            self.rng.sample(StandardNormal),
            self.rng.sample(StandardNormal),
            self.rng.sample(StandardNormal),
        )
    }

    /// Advances the state by one step, leaving forces evaluated at the new positions.
    pub(crate) fn step(
        &mut self,
        system: &mut ForceSystem,
        state: &mut DynamicState,
        parameters: &ParameterTable,
    ) -> Result<(), EngineError> {
        match self.kind {
            IntegratorKind::LangevinMiddle => self.langevin_middle(system, state, parameters)?,
            IntegratorKind::VelocityVerlet => self.velocity_verlet(system, state, parameters)?,
        }
        check_stable(state)
    }

    fn langevin_middle(
        &mut self,
        system: &mut ForceSystem,
        state: &mut DynamicState,
        parameters: &ParameterTable,
    ) -> Result<(), EngineError> {
        let dt = self.timestep;
        let periodic_box = system.periodic_box().copied();
        let a = (-self.friction * dt).exp();
        let b = (1.0 - a * a).max(0.0).sqrt();
        let kt = BOLTZMANN_KJ_PER_MOL_K * self.temperature;

        kick(state, dt);
        self.constrain_velocities(system, state)?;

        let previous = state.positions.clone();
        drift(state, 0.5 * dt);
        for i in 0..state.velocities.len() {
            let w = state.inverse_masses[i];
            if w > 0.0 {
                let noise = (kt * w).sqrt() * self.gaussian();
                state.velocities[i] = a * state.velocities[i] + b * noise;
            }
        }
        drift(state, 0.5 * dt);

        self.constrain_positions(system, state, &previous, periodic_box.as_ref())?;
        if !system.constraints().is_empty() {
            velocities_from_displacement(state, &previous, dt);
        }

        state.step += 1;
        evaluate(system, state, parameters)
    }

    fn velocity_verlet(
        &mut self,
        system: &mut ForceSystem,
        state: &mut DynamicState,
        parameters: &ParameterTable,
    ) -> Result<(), EngineError> {
        let dt = self.timestep;
        let periodic_box = system.periodic_box().copied();

        kick(state, 0.5 * dt);
        let previous = state.positions.clone();
        drift(state, dt);
        self.constrain_positions(system, state, &previous, periodic_box.as_ref())?;
        if !system.constraints().is_empty() {
            velocities_from_displacement(state, &previous, dt);
        }

        state.step += 1;
        evaluate(system, state, parameters)?;
        kick(state, 0.5 * dt);
        self.constrain_velocities(system, state)
    }

    pub(crate) fn constrain_positions(
        &self,
        system: &ForceSystem,
        state: &mut DynamicState,
        reference: &[Point3<f64>],
        periodic_box: Option<&Vector3<f64>>,
    ) -> Result<(), EngineError> {
        self.solver
            .apply_positions(
                system.constraints(),
                &state.inverse_masses,
                reference,
                &mut state.positions,
                periodic_box,
            )
            .map(|_| ())
            .ok_or(EngineError::ConstraintFailure {
                step: state.step,
                iterations: self.solver.max_iterations,
            })
    }

    pub(crate) fn constrain_velocities(
        &self,
        system: &ForceSystem,
        state: &mut DynamicState,
    ) -> Result<(), EngineError> {
        self.solver
            .apply_velocities(
                system.constraints(),
                &state.inverse_masses,
                &state.positions,
                &mut state.velocities,
                system.periodic_box(),
            )
            .map(|_| ())
            .ok_or(EngineError::ConstraintFailure {
                step: state.step,
                iterations: self.solver.max_iterations,
            })
    }
}

fn kick(state: &mut DynamicState, dt: f64) {
    for ((v, f), &w) in state
        .velocities
        .iter_mut()
        .zip(&state.forces)
        .zip(&state.inverse_masses)
    {
        if w == 0.0 {
            *v = Vector3::zeros();
        } else {
            *v += dt * w * *f;
        }
    }
}

fn drift(state: &mut DynamicState, dt: f64) {
    for (x, v) in state.positions.iter_mut().zip(&state.velocities) {
        *x += dt * *v;
    }
}

fn velocities_from_displacement(state: &mut DynamicState, previous: &[Point3<f64>], dt: f64) {
    for ((v, (x, x0)), &w) in state
        .velocities
        .iter_mut()
        .zip(state.positions.iter().zip(previous))
        .zip(&state.inverse_masses)
    {
        if w > 0.0 {
            *v = (x - x0) / dt;
        }
    }
}

/// Recomputes forces and energies at the current positions.
pub(crate) fn evaluate(
    system: &mut ForceSystem,
    state: &mut DynamicState,
    parameters: &ParameterTable,
) -> Result<(), EngineError> {
    let periodic_box = system.periodic_box().copied();
    let input = EvaluationInput {
        positions: &state.positions,
        periodic_box: periodic_box.as_ref(),
        parameters,
        step: state.step,
    };
    let (energy, breakdown) = system
        .evaluate(&input, &mut state.forces)
        .map_err(|source| EngineError::Force {
            step: state.step,
            source,
        })?;
    state.potential_energy = energy;
    state.breakdown = breakdown;
    Ok(())
}

fn check_stable(state: &DynamicState) -> Result<(), EngineError> {
    let finite = |v: &Vector3<f64>| v.iter().all(|x| x.is_finite());
    if let Some(atom) = state.positions.iter().position(|p| !finite(&p.coords)) {
        return Err(EngineError::Unstable {
            step: state.step,
            reason: format!("atom {atom} has a non-finite position"),
        });
    }
    if let Some(atom) = state.velocities.iter().position(|v| !finite(v)) {
        return Err(EngineError::Unstable {
            step: state.step,
            reason: format!("atom {atom} has a non-finite velocity"),
        });
    }
    Ok(())
}
