//! The compliant contact manager: owns the model, the geometry query and
//! the configuration, declares the cache entries, and drives one discrete
//! step.
//!
//! ```text
//! position kinematics ─┬─> discrete contact pairs ─> contact kinematics ─┐
//!                      └─> non-contact accelerations ────────────────────┴─> contact problem ─> solver results
//! ```

use std::rc::Rc;

use nalgebra::DVector;
use sim_constraint::SapSolver;
use sim_contact::{
    ContactDiscretizer, ContactPairKinematics, DiscreteContactPair, GeometryQuery,
    calc_contact_kinematics,
};
use sim_multibody::{MultibodyModel, PositionKinematics};
use sim_types::{
    DiscreteContactSolver, DiscreteUpdateConfig, GeometryId, JointIndex, Result, SimError,
    Vector3,
};
use tracing::{debug, warn};

use crate::assembler::{ContactProblemCache, CouplerConstraintSpec};
use crate::cache::{Cache, CacheIndex, Ticket};
use crate::context::Context;
use crate::free_motion::AccelerationsDueToNonContactForces;
use crate::results::{ContactSolverResults, pack_contact_solver_results};

/// Registration record of a deformable body model.
#[derive(Debug, Clone, PartialEq)]
pub struct DeformableModel {
    /// Model name.
    pub name: String,
    /// Number of deformable bodies in the model.
    pub num_bodies: usize,
}

impl DeformableModel {
    /// Create a registration record.
    #[must_use]
    pub fn new(name: impl Into<String>, num_bodies: usize) -> Self {
        Self {
            name: name.into(),
            num_bodies,
        }
    }
}

/// Contact force and kinematics of one contact, world frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactForceReport {
    /// Geometry A.
    pub id_a: GeometryId,
    /// Geometry B.
    pub id_b: GeometryId,
    /// Contact point.
    pub p_wc: Vector3<f64>,
    /// Unit normal from A into B.
    pub normal_w: Vector3<f64>,
    /// Force on B at the contact point. A receives the opposite force.
    pub f_bc_w: Vector3<f64>,
    /// Normal velocity of B relative to A, positive when separating.
    pub separation_speed: f64,
    /// Tangential speed of B relative to A.
    pub slip_speed: f64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct CacheIndexes {
    pub(crate) position_kinematics: CacheIndex,
    pub(crate) discrete_contact_pairs: CacheIndex,
    pub(crate) contact_kinematics: CacheIndex,
    pub(crate) non_contact_forces_accelerations: CacheIndex,
    pub(crate) contact_problem: CacheIndex,
    pub(crate) contact_solver_results: CacheIndex,
}

impl CacheIndexes {
    fn declare(cache: &mut Cache) -> Result<Self> {
        use Ticket::{DiscreteState, Entry, Inputs, Parameters, Time};

        let position_kinematics = cache.declare_entry("position kinematics", [DiscreteState])?;
        let discrete_contact_pairs = cache.declare_entry(
            "discrete contact pairs",
            [DiscreteState, Parameters, Entry(position_kinematics)],
        )?;
        let contact_kinematics = cache.declare_entry(
            "contact kinematics",
            [Entry(position_kinematics), Entry(discrete_contact_pairs)],
        )?;
        let non_contact_forces_accelerations = cache.declare_entry(
            "non-contact forces accelerations",
            [
                Time,
                DiscreteState,
                Parameters,
                Inputs,
                Entry(position_kinematics),
            ],
        )?;
        let contact_problem = cache.declare_entry(
            "contact problem",
            [
                DiscreteState,
                Parameters,
                Entry(contact_kinematics),
                Entry(non_contact_forces_accelerations),
            ],
        )?;
        let contact_solver_results = cache.declare_entry(
            "contact solver results",
            [DiscreteState, Entry(contact_problem)],
        )?;
        Ok(Self {
            position_kinematics,
            discrete_contact_pairs,
            contact_kinematics,
            non_contact_forces_accelerations,
            contact_problem,
            contact_solver_results,
        })
    }
}

/// Discrete update manager for compliant contact solved with SAP.
#[derive(Debug)]
pub struct CompliantContactManager {
    pub(crate) model: MultibodyModel,
    pub(crate) geometry: Box<dyn GeometryQuery>,
    pub(crate) config: DiscreteUpdateConfig,
    pub(crate) couplers: Vec<CouplerConstraintSpec>,
    deformable_model: Option<DeformableModel>,
    cache: Cache,
    pub(crate) cache_indexes: CacheIndexes,
    /// Bumped whenever a modification invalidates existing contexts.
    revision: u64,
}

impl CompliantContactManager {
    /// Create a manager for `model` with contact geometry from `geometry`.
    ///
    /// Fails if the configuration is invalid or selects a discrete solver
    /// other than SAP.
    pub fn new(
        model: MultibodyModel,
        geometry: impl GeometryQuery + 'static,
        config: DiscreteUpdateConfig,
    ) -> Result<Self> {
        config.validate()?;
        if config.discrete_solver != DiscreteContactSolver::Sap {
            return Err(SimError::UnsupportedSolver {
                solver: config.discrete_solver.to_string(),
            });
        }
        let mut cache = Cache::new();
        let cache_indexes = CacheIndexes::declare(&mut cache)?;
        debug!(
            num_velocities = model.num_velocities(),
            num_trees = model.topology().num_trees(),
            time_step = config.time_step,
            "compliant contact manager created"
        );
        Ok(Self {
            model,
            geometry: Box::new(geometry),
            config,
            couplers: Vec::new(),
            deformable_model: None,
            cache,
            cache_indexes,
            revision: 0,
        })
    }

    /// The multibody model.
    pub fn model(&self) -> &MultibodyModel {
        &self.model
    }

    /// The geometry query.
    pub fn geometry(&self) -> &dyn GeometryQuery {
        self.geometry.as_ref()
    }

    /// Configuration.
    pub fn config(&self) -> &DiscreteUpdateConfig {
        &self.config
    }

    /// Discrete time step.
    pub fn time_step(&self) -> f64 {
        self.config.time_step
    }

    /// Registered couplers, in registration order.
    pub fn couplers(&self) -> &[CouplerConstraintSpec] {
        &self.couplers
    }

    /// Couple two single-dof joints with `q_a = gear_ratio·q_b + offset`.
    ///
    /// Contexts created before this call are rejected afterwards.
    pub fn add_coupler_constraint(
        &mut self,
        joint_a: JointIndex,
        joint_b: JointIndex,
        gear_ratio: f64,
        offset: f64,
    ) -> Result<()> {
        for j in [joint_a, joint_b] {
            if j.index() >= self.model.num_joints() {
                return Err(SimError::invalid_index("joint", j.index()));
            }
            let joint = self.model.joint(j);
            if joint.num_velocities() != 1 {
                return Err(SimError::invalid_config(format!(
                    "coupler joint '{}' must have exactly one degree of freedom",
                    joint.name
                )));
            }
        }
        if joint_a == joint_b {
            return Err(SimError::invalid_config("a joint cannot be coupled to itself"));
        }
        if !gear_ratio.is_finite() || !offset.is_finite() {
            return Err(SimError::invalid_config(format!(
                "coupler gear ratio and offset must be finite (got {gear_ratio}, {offset})"
            )));
        }
        self.couplers.push(CouplerConstraintSpec {
            joint_a,
            joint_b,
            gear_ratio,
            offset,
        });
        self.revision += 1;
        Ok(())
    }

    /// Register the deformable model. At most one may be registered.
    pub fn register_deformable_model(&mut self, model: DeformableModel) -> Result<()> {
        if self.deformable_model.is_some() {
            return Err(SimError::DuplicateModel {
                model: "deformable".to_string(),
            });
        }
        debug!(name = %model.name, num_bodies = model.num_bodies, "deformable model registered");
        self.deformable_model = Some(model);
        self.revision += 1;
        Ok(())
    }

    /// The registered deformable model, if any.
    pub fn deformable_model(&self) -> Option<&DeformableModel> {
        self.deformable_model.as_ref()
    }

    /// Context at the model's default configuration, at rest, at `t = 0`.
    pub fn create_default_context(&self) -> Context {
        Context::new(
            self.model.default_positions(),
            DVector::zeros(self.model.num_velocities()),
            self.model.default_joint_damping(),
            self.model.default_reflected_inertia(),
            self.cache.empty_like(),
            self.revision,
        )
    }

    pub(crate) fn validate_context(&self, context: &Context) -> Result<()> {
        if context.revision() != self.revision {
            return Err(SimError::structural(
                "context was created before the manager was last modified",
            ));
        }
        if context.num_positions() != self.model.num_positions()
            || context.num_velocities() != self.model.num_velocities()
        {
            return Err(SimError::dimension_mismatch(
                "context state",
                self.model.num_states(),
                context.discrete_state().len(),
            ));
        }
        Ok(())
    }

    fn eval_entry<T: 'static>(
        &self,
        context: &Context,
        index: CacheIndex,
        calc: impl FnOnce() -> Result<T>,
    ) -> Result<Rc<T>> {
        self.validate_context(context)?;
        context.cache().eval(index, context.versions(), calc)
    }

    /// Body poses at the context's positions.
    pub fn eval_position_kinematics(&self, context: &Context) -> Result<Rc<PositionKinematics>> {
        self.eval_entry(context, self.cache_indexes.position_kinematics, || {
            self.model
                .calc_position_kinematics(&context.positions().into_owned())
        })
    }

    /// Discrete contact pairs, point pairs first.
    pub fn eval_discrete_contact_pairs(
        &self,
        context: &Context,
    ) -> Result<Rc<Vec<DiscreteContactPair>>> {
        self.eval_entry(context, self.cache_indexes.discrete_contact_pairs, || {
            let kinematics = self.eval_position_kinematics(context)?;
            ContactDiscretizer::new(
                self.geometry.as_ref(),
                &self.model,
                self.config.default_contact_stiffness,
            )
            .calc_discrete_contact_pairs(&kinematics, self.config.contact_model)
        })
    }

    /// Contact frames and Jacobian blocks, one per discrete pair.
    pub fn eval_contact_kinematics(
        &self,
        context: &Context,
    ) -> Result<Rc<Vec<ContactPairKinematics>>> {
        self.eval_entry(context, self.cache_indexes.contact_kinematics, || {
            let kinematics = self.eval_position_kinematics(context)?;
            let pairs = self.eval_discrete_contact_pairs(context)?;
            calc_contact_kinematics(&self.model, &kinematics, self.geometry.as_ref(), &pairs)
        })
    }

    /// Accelerations due to every force except contact, limits and couplers.
    ///
    /// Fails with [`SimError::AlgebraicLoop`] if the actuation input depends
    /// on this manager's contact outputs.
    pub fn eval_accelerations_due_to_non_contact_forces(
        &self,
        context: &Context,
    ) -> Result<Rc<AccelerationsDueToNonContactForces>> {
        self.eval_entry(
            context,
            self.cache_indexes.non_contact_forces_accelerations,
            || self.calc_accelerations_due_to_non_contact_forces(context),
        )
    }

    /// The assembled SAP problem and the contact frame rotations.
    pub fn eval_contact_problem(&self, context: &Context) -> Result<Rc<ContactProblemCache>> {
        self.eval_entry(context, self.cache_indexes.contact_problem, || {
            self.calc_contact_problem_cache(context)
        })
    }

    /// Solved next-step velocities and contact forces.
    ///
    /// Fails with [`SimError::SolverFailed`] if SAP does not converge.
    pub fn eval_contact_solver_results(
        &self,
        context: &Context,
    ) -> Result<Rc<ContactSolverResults>> {
        self.eval_entry(context, self.cache_indexes.contact_solver_results, || {
            self.calc_contact_solver_results(context)
        })
    }

    fn calc_contact_solver_results(&self, context: &Context) -> Result<ContactSolverResults> {
        let problem_cache = self.eval_contact_problem(context)?;
        let problem = &problem_cache.problem;

        // The previous velocities are the initial guess.
        let v0 = context.velocities().into_owned();
        let solver = SapSolver::new(self.config.solver);
        let results = solver.solve_with_guess(problem, &v0)?;
        if !results.status.is_success() {
            warn!(
                time = context.time(),
                status = ?results.status,
                iterations = results.iterations,
                "contact solver failed"
            );
            return Err(SimError::solver_failed(
                context.time(),
                format!(
                    "SAP status {:?} after {} iterations, residual {:e}",
                    results.status, results.iterations, results.residual
                ),
            ));
        }
        pack_contact_solver_results(problem, &results, self.time_step())
    }

    /// Next discrete state `[q0 + δt·q̇(v_next); v_next]`.
    pub fn calc_discrete_values(&self, context: &Context) -> Result<DVector<f64>> {
        let results = self.eval_contact_solver_results(context)?;
        let q0 = context.positions().into_owned();
        let v_next = &results.v_next;
        let qdot_next = self.model.map_velocity_to_qdot(&q0, v_next)?;
        let q_next = q0 + qdot_next * self.time_step();

        let nq = q_next.len();
        let mut x_next = DVector::zeros(nq + v_next.len());
        x_next.rows_mut(0, nq).copy_from(&q_next);
        x_next.rows_mut(nq, v_next.len()).copy_from(v_next);
        Ok(x_next)
    }

    /// Generalized accelerations `(v_next − v0)/δt`.
    pub fn calc_generalized_accelerations(&self, context: &Context) -> Result<DVector<f64>> {
        let results = self.eval_contact_solver_results(context)?;
        let v0 = context.velocities();
        Ok((&results.v_next - v0) / self.time_step())
    }

    /// Per-contact forces and velocities in the world frame.
    pub fn calc_contact_force_reports(&self, context: &Context) -> Result<Vec<ContactForceReport>> {
        let pairs = self.eval_discrete_contact_pairs(context)?;
        let problem_cache = self.eval_contact_problem(context)?;
        let results = self.eval_contact_solver_results(context)?;
        if problem_cache.r_wc.len() != pairs.len() || results.num_contacts() != pairs.len() {
            return Err(SimError::structural(
                "contact results do not match the discrete contact pairs",
            ));
        }
        Ok(pairs
            .iter()
            .zip(&problem_cache.r_wc)
            .enumerate()
            .map(|(i, (pair, r_wc))| {
                let f_c = Vector3::new(
                    results.tangential_forces[2 * i],
                    results.tangential_forces[2 * i + 1],
                    results.normal_forces[i],
                );
                let vt = Vector3::new(
                    results.tangential_velocities[2 * i],
                    results.tangential_velocities[2 * i + 1],
                    0.0,
                );
                ContactForceReport {
                    id_a: pair.id_a,
                    id_b: pair.id_b,
                    p_wc: pair.p_wc,
                    normal_w: r_wc * Vector3::z(),
                    f_bc_w: r_wc * f_c,
                    separation_speed: results.normal_velocities[i],
                    slip_speed: vt.norm(),
                }
            })
            .collect())
    }

    /// Advance the context by one step.
    ///
    /// On error the context keeps its previous time and state.
    pub fn advance(&self, context: &mut Context) -> Result<()> {
        let x_next = self.calc_discrete_values(context)?;
        let t_next = context.time() + self.time_step();
        context.commit_step(t_next, x_next)
    }
}
