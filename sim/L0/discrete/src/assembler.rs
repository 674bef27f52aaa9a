//! Assembly of the SAP problem for one step.
//!
//! Constraints are added in a fixed order, contacts then joint limits then
//! couplers, all from [`CompliantContactManager::calc_contact_problem_cache`].
//! [`ContactProblem`] rejects a contact added after any other constraint, so
//! result unpacking can rely on contact impulses heading the impulse vector.

use nalgebra::{DMatrix, DVector, Rotation3};
use sim_constraint::{
    Constraint, ContactProblem, FrictionConeParameters, HolonomicParameters, LimitParameters,
};
use sim_contact::JacobianTreeBlock;
use sim_types::{JointIndex, Result, SimError};
use tracing::{debug, trace};

use crate::context::Context;
use crate::manager::CompliantContactManager;

/// Couples two single-dof joints with `q_a − gear_ratio·q_b − offset = 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CouplerConstraintSpec {
    /// Driving joint.
    pub joint_a: JointIndex,
    /// Driven joint.
    pub joint_b: JointIndex,
    /// Gear ratio ρ.
    pub gear_ratio: f64,
    /// Position offset Δq.
    pub offset: f64,
}

/// The assembled problem plus the contact frame rotations needed to report
/// contact forces in the world frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactProblemCache {
    /// The SAP problem.
    pub problem: ContactProblem,
    /// `R_WC` per contact, in contact order.
    pub r_wc: Vec<Rotation3<f64>>,
}

impl CompliantContactManager {
    pub(crate) fn calc_contact_problem_cache(&self, context: &Context) -> Result<ContactProblemCache> {
        let a = self.calc_linear_dynamics_matrix(context)?;
        let v_star = self.calc_free_motion_velocities(context)?;
        let mut problem = ContactProblem::new(self.time_step(), a, v_star)?;

        let r_wc = self.add_contact_constraints(context, &mut problem)?;
        self.add_limit_constraints(context, &mut problem)?;
        self.add_coupler_constraints(context, &mut problem)?;

        debug!(
            num_contacts = problem.num_contacts(),
            num_constraints = problem.num_constraints(),
            num_equations = problem.num_constraint_equations(),
            "contact problem assembled"
        );
        Ok(ContactProblemCache { problem, r_wc })
    }

    fn add_contact_constraints(
        &self,
        context: &Context,
        problem: &mut ContactProblem,
    ) -> Result<Vec<Rotation3<f64>>> {
        let pairs = self.eval_discrete_contact_pairs(context)?;
        let kinematics = self.eval_contact_kinematics(context)?;
        if kinematics.len() != pairs.len() {
            return Err(SimError::dimension_mismatch(
                "contact kinematics",
                pairs.len(),
                kinematics.len(),
            ));
        }

        let reg = self.config.contact_regularization;
        let mut r_wc = Vec::with_capacity(pairs.len());
        for (pair, kin) in pairs.iter().zip(kinematics.iter()) {
            let parameters = FrictionConeParameters {
                mu: pair.friction_coefficient,
                stiffness: pair.stiffness,
                dissipation_time_scale: pair.dissipation_time_constant,
                beta: reg.beta,
                sigma: reg.sigma,
            };
            problem.add_constraint(Constraint::friction_cone(
                kin.jacobian.clone(),
                kin.phi,
                parameters,
            )?)?;
            r_wc.push(kin.r_wc);
        }
        Ok(r_wc)
    }

    fn add_limit_constraints(&self, context: &Context, problem: &mut ContactProblem) -> Result<()> {
        let dt = self.time_step();
        let limits = self.config.joint_limits;
        let topology = self.model.topology();
        let q0 = context.positions();
        let v0 = context.velocities();
        let v_star = problem.v_star().clone();

        for joint in self.model.joints() {
            if !joint.has_finite_limits() {
                continue;
            }
            if joint.num_velocities() != 1 {
                return Err(SimError::UnsupportedJointLimits {
                    joint: joint.name.clone(),
                });
            }

            let dof = joint.velocity_start();
            let (tree, tree_dof) = topology.velocity_local_index(dof).ok_or_else(|| {
                SimError::structural(format!("velocity {dof} of joint '{}' has no tree", joint.name))
            })?;
            let tree_nv = topology.num_tree_velocities(tree);

            // Δq estimates how far q travels in one step.
            let delta_q = dt * v0[dof].abs().max(v_star[dof].abs());
            let window_lower = q0[dof] - limits.window_factor * delta_q;
            let window_upper = q0[dof] + limits.window_factor * delta_q;

            let lower = joint.position_lower_limits[0];
            let upper = joint.position_upper_limits[0];
            let ql = if lower < window_lower { f64::NEG_INFINITY } else { lower };
            let qu = if upper > window_upper { f64::INFINITY } else { upper };
            if ql.is_infinite() && qu.is_infinite() {
                continue;
            }

            trace!(joint = %joint.name, ql, qu, q0 = q0[dof], "limit constraint");
            problem.add_constraint(Constraint::limit(
                tree,
                tree_dof,
                tree_nv,
                q0[dof],
                LimitParameters {
                    lower: ql,
                    upper: qu,
                    stiffness: limits.stiffness,
                    dissipation_time_scale: dt,
                    beta: limits.beta,
                },
            )?)?;
        }
        Ok(())
    }

    fn add_coupler_constraints(&self, context: &Context, problem: &mut ContactProblem) -> Result<()> {
        let dt = self.time_step();
        let topology = self.model.topology();
        let q0 = context.positions();
        let one = |x: f64| DVector::from_element(1, x);

        for coupler in &self.couplers {
            let dof_a = self.model.joint(coupler.joint_a).velocity_start();
            let dof_b = self.model.joint(coupler.joint_b).velocity_start();
            let local = |dof: usize| {
                topology
                    .velocity_local_index(dof)
                    .ok_or_else(|| SimError::structural(format!("coupled velocity {dof} has no tree")))
            };
            let (tree_a, local_a) = local(dof_a)?;
            let (tree_b, local_b) = local(dof_b)?;

            let g0 = q0[dof_a] - coupler.gear_ratio * q0[dof_b] - coupler.offset;
            let jacobian = if tree_a == tree_b {
                let mut j = DMatrix::zeros(1, topology.num_tree_velocities(tree_a));
                j[(0, local_a)] = 1.0;
                j[(0, local_b)] = -coupler.gear_ratio;
                vec![JacobianTreeBlock::new(tree_a, j)]
            } else {
                let mut ja = DMatrix::zeros(1, topology.num_tree_velocities(tree_a));
                let mut jb = DMatrix::zeros(1, topology.num_tree_velocities(tree_b));
                ja[(0, local_a)] = 1.0;
                jb[(0, local_b)] = -coupler.gear_ratio;
                vec![
                    JacobianTreeBlock::new(tree_a, ja),
                    JacobianTreeBlock::new(tree_b, jb),
                ]
            };

            let parameters = HolonomicParameters {
                impulse_lower: one(f64::NEG_INFINITY),
                impulse_upper: one(f64::INFINITY),
                stiffness: one(f64::INFINITY),
                relaxation_time: one(dt),
                beta: self.config.couplers.beta,
            };
            problem.add_constraint(Constraint::holonomic(jacobian, one(g0), parameters)?)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sim_constraint::ConstraintKind;
    use sim_contact::GeometryRegistry;
    use sim_multibody::{Body, Joint, MultibodyModelBuilder};
    use sim_types::{BodyIndex, DiscreteUpdateConfig, Vector3};

    fn limited_slider(lower: f64, upper: f64) -> CompliantContactManager {
        let mut builder = MultibodyModelBuilder::new();
        let slider = builder.add_body(Body::point_mass("slider", 1.0));
        builder.add_joint(
            Joint::prismatic("x", BodyIndex::WORLD, slider, Vector3::x()).with_limits(lower, upper),
        );
        CompliantContactManager::new(
            builder.build().unwrap(),
            GeometryRegistry::new(),
            DiscreteUpdateConfig::with_time_step(0.01),
        )
        .unwrap()
    }

    fn set_state(manager: &CompliantContactManager, q: f64, v: f64) -> Context {
        let mut context = manager.create_default_context();
        context.set_positions(&DVector::from_element(1, q)).unwrap();
        context.set_velocities(&DVector::from_element(1, v)).unwrap();
        context
    }

    #[test]
    fn test_limit_near_upper_only() {
        let manager = limited_slider(-0.1, 0.1);
        let context = set_state(&manager, 0.099, 1.0);
        let cache = manager.eval_contact_problem(&context).unwrap();
        assert_eq!(cache.problem.num_constraints(), 1);
        let c = cache.problem.constraint(0).unwrap();
        match c.kind() {
            ConstraintKind::Limit { parameters, q0 } => {
                assert_eq!(parameters.lower, f64::NEG_INFINITY);
                assert_eq!(parameters.upper, 0.1);
                assert_relative_eq!(*q0, 0.099);
                assert_relative_eq!(parameters.dissipation_time_scale, 0.01);
                assert_relative_eq!(parameters.stiffness, 1e12);
            }
            other => panic!("expected a limit constraint, got {other:?}"),
        }
        assert_eq!(c.num_equations(), 1);
    }

    #[test]
    fn test_limit_outside_window_is_skipped() {
        let manager = limited_slider(-0.1, 0.1);
        let context = set_state(&manager, 0.0, 1.0);
        let cache = manager.eval_contact_problem(&context).unwrap();
        assert_eq!(cache.problem.num_constraints(), 0);
    }

    #[test]
    fn test_infinite_limits_never_constrain() {
        let manager = limited_slider(f64::NEG_INFINITY, f64::INFINITY);
        let context = set_state(&manager, 1e6, 0.0);
        let cache = manager.eval_contact_problem(&context).unwrap();
        assert_eq!(cache.problem.num_constraints(), 0);
    }

    #[test]
    fn test_multi_dof_limits_unsupported() {
        let mut builder = MultibodyModelBuilder::new();
        let ball = builder.add_body(Body::point_mass("ball", 1.0));
        builder.add_joint(Joint::translational("free", BodyIndex::WORLD, ball).with_limits(-1.0, 1.0));
        let manager = CompliantContactManager::new(
            builder.build().unwrap(),
            GeometryRegistry::new(),
            DiscreteUpdateConfig::default(),
        )
        .unwrap();
        let context = manager.create_default_context();
        let err = manager.eval_contact_problem(&context).unwrap_err();
        assert!(matches!(err, SimError::UnsupportedJointLimits { ref joint } if joint == "free"));
    }

    #[test]
    fn test_coupler_on_one_tree_uses_one_block() {
        let mut builder = MultibodyModelBuilder::new();
        let a = builder.add_body(Body::solid_sphere("a", 1.0, 0.1));
        let b = builder.add_body(Body::solid_sphere("b", 1.0, 0.1));
        let ja = builder.add_joint(Joint::revolute("ja", BodyIndex::WORLD, a, Vector3::z()));
        let jb = builder.add_joint(Joint::revolute("jb", a, b, Vector3::z()).at(Vector3::x()));
        let mut manager = CompliantContactManager::new(
            builder.build().unwrap(),
            GeometryRegistry::new(),
            DiscreteUpdateConfig::default(),
        )
        .unwrap();
        manager.add_coupler_constraint(ja, jb, 3.0, 0.25).unwrap();

        let mut context = manager.create_default_context();
        context
            .set_positions(&DVector::from_vec(vec![1.0, 0.5]))
            .unwrap();
        let cache = manager.eval_contact_problem(&context).unwrap();
        let c = cache.problem.constraint(0).unwrap();
        assert_eq!(c.num_trees(), 1);
        assert_relative_eq!(c.constraint_function()[0], 1.0 - 3.0 * 0.5 - 0.25);
        let j = &c.jacobian()[0].jacobian;
        assert_eq!(j[(0, 0)], 1.0);
        assert_eq!(j[(0, 1)], -3.0);
    }
}
