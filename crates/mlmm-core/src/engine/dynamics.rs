use super::config::{ConstraintPolicy, DynamicsConfig, FixedAtomSphere, SphereCentre};
use super::context::Context;
use super::embedding::EmbeddingEngine;
use super::error::EngineError;
use super::forces::{DistanceConstraint, Force, ForceSystem};
use super::integrator::Integrator;
use crate::core::forcefield::params::ForceField;
use crate::core::forcefield::potentials::minimum_image;
use crate::core::models::system::MolecularSystem;
use nalgebra::{Point3, Vector3};
use tracing::{info, warn};

/// Everything needed to build a fresh [`Context`]: the assembled force system, the
/// integrator and the current particle state.
#[derive(Debug)]
pub struct ExportedSystem {
    pub system: ForceSystem,
    pub integrator: Integrator,
    pub positions: Vec<Point3<f64>>,
    pub velocities: Vec<Vector3<f64>>,
}

impl ExportedSystem {
    /// Appends a force to the exported system and returns its index.
    pub fn add_force(&mut self, force: Box<dyn Force>) -> usize {
        self.system.add_force(force)
    }
}

/// Drives a classical system, optionally with an embedded ML/QM region.
#[derive(Debug)]
pub struct Dynamics {
    context: Context,
    config: DynamicsConfig,
}

impl Dynamics {
    /// Assembles the force system and builds the first integration context.
    ///
    /// Bonded and nonbonded terms come from `forcefield`, which for an embedded run is the
    /// force field returned by the binder. The embedding engine, if any, is added as the
    /// last force.
    ///
    /// # Errors
    ///
    /// Fails if the force field does not describe the system or the initial context cannot
    /// be built.
    pub fn new(
        system: &MolecularSystem,
        forcefield: &ForceField,
        engine: Option<EmbeddingEngine>,
        config: DynamicsConfig,
    ) -> Result<Self, EngineError> {
        if forcefield.atom_count() != system.atom_count() {
            return Err(EngineError::Initialization(format!(
                "force field describes {} atoms but the system has {}",
                forcefield.atom_count(),
                system.atom_count()
            )));
        }

        let mut masses = system.masses();
        if let Some(sphere) = &config.fixed_atoms {
            fix_atoms_outside(sphere, system, &mut masses, engine.as_ref().map(|e| e.region()))?;
        }

        let mut forces = ForceSystem::from_forcefield(
            masses,
            system.periodic_box().copied(),
            forcefield,
            config.cutoff,
        );

        if config.constraints == ConstraintPolicy::HBonds {
            for bond in &forcefield.bonds {
                let [i, j] = bond.atoms;
                if system.atoms()[i].is_hydrogen() || system.atoms()[j].is_hydrogen() {
                    forces.add_constraint(DistanceConstraint {
                        atoms: bond.atoms,
                        distance: bond.r0,
                    });
                }
            }
            let pruned = forces.prune_fixed_constraints();
            info!(
                constraints = forces.constraints().len(),
                pruned, "Constrained bonds to hydrogen"
            );
        }

        if let Some(engine) = engine {
            info!(
                backend = engine.backend_name(),
                region = engine.region().len(),
                "Attached embedding engine"
            );
            forces.add_force(Box::new(engine));
        }

        let integrator = Integrator::from_config(&config);
        info!(
            integrator = %config.integrator,
            timestep_fs = config.timestep_fs,
            temperature = config.temperature,
            seed = integrator.seed(),
            "Configured dynamics"
        );
        let context = Context::new(
            forces,
            integrator,
            system.positions().to_vec(),
            system.velocities().map(<[Vector3<f64>]>::to_vec),
        )?;
        Ok(Self { context, config })
    }

    /// Builds a driver around a fresh context created from an exported system.
    pub fn from_exported(exported: ExportedSystem, config: DynamicsConfig) -> Result<Self, EngineError> {
        let context = Context::new(
            exported.system,
            exported.integrator,
            exported.positions,
            Some(exported.velocities),
        )?;
        Ok(Self { context, config })
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn config(&self) -> &DynamicsConfig {
        &self.config
    }

    /// Hands over the assembled system, integrator and state so that forces can be added.
    pub fn export(self) -> ExportedSystem {
        let (system, integrator, positions, velocities) = self.context.into_parts();
        ExportedSystem {
            system,
            integrator,
            positions,
            velocities,
        }
    }

    pub fn into_context(self) -> Context {
        self.context
    }

    pub fn run(&mut self, steps: u64) -> Result<(), EngineError> {
        self.context.step(steps)
    }
}

/// Zeroes the mass of every atom outside the sphere.
fn fix_atoms_outside(
    sphere: &FixedAtomSphere,
    system: &MolecularSystem,
    masses: &mut [f64],
    region: Option<&[usize]>,
) -> Result<(), EngineError> {
    let positions = system.positions();
    let centre = match sphere.centre {
        SphereCentre::Point(p) => p,
        SphereCentre::Atom(index) => *positions.get(index).ok_or_else(|| {
            EngineError::Initialization(format!(
                "fixed-atom sphere is centred on atom {index}, but the system has {} atoms",
                positions.len()
            ))
        })?,
    };

    let radius2 = sphere.radius * sphere.radius;
    let mut fixed = 0;
    for (mass, p) in masses.iter_mut().zip(positions) {
        if minimum_image(p - centre, system.periodic_box()).norm_squared() > radius2 {
            *mass = 0.0;
            fixed += 1;
        }
    }
    info!(fixed, radius = sphere.radius, "Fixed atoms outside the sphere");

    if fixed == masses.len() {
        warn!("Every atom is fixed; the system will not move");
    }
    if let Some(region) = region {
        let frozen = region.iter().filter(|&&i| masses[i] == 0.0).count();
        if frozen > 0 {
            warn!(frozen, "Some embedded-region atoms lie outside the mobile sphere");
        }
    }
    Ok(())
}
