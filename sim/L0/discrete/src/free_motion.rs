//! Free-motion velocities and the linear dynamics matrix.
//!
//! Continuous dynamics `M·v̇ = k(x)` are split into joint damping `−D·v`,
//! treated implicitly, and every other non-constraint force `k₁(x)`,
//! evaluated at the previous state. With `v̇ = (v − v₀)/δt`:
//!
//! ```text
//! (M + δt·D)·(v − v₀)/δt = k₁(x₀) − D·v₀
//! ```
//!
//! The accelerations `v̇₀` follow from forward dynamics with the diagonal
//! augmentation `reflected inertia + δt·D`, the free-motion velocities are
//! `v* = v₀ + δt·v̇₀`, and the per-tree dynamics matrices are the diagonal
//! blocks of `A = M + δt·D`.

use nalgebra::{DMatrix, DVector};
use sim_multibody::MultibodyForces;
use sim_types::Result;

use crate::context::Context;
use crate::manager::CompliantContactManager;

/// Non-contact generalized forces at the previous state and the
/// accelerations they produce.
#[derive(Debug, Clone, PartialEq)]
pub struct AccelerationsDueToNonContactForces {
    /// Force elements, actuation and explicit damping `−D·v₀`, as
    /// generalized forces.
    pub generalized_forces: DVector<f64>,
    /// Accelerations `v̇₀`.
    pub vdot: DVector<f64>,
}

impl CompliantContactManager {
    pub(crate) fn calc_accelerations_due_to_non_contact_forces(
        &self,
        context: &Context,
    ) -> Result<AccelerationsDueToNonContactForces> {
        let kinematics = self.eval_position_kinematics(context)?;
        let q0 = context.positions().into_owned();
        let v0 = context.velocities().into_owned();
        let dt = self.time_step();

        // Joint limits are constraints and are not included here.
        let mut forces = MultibodyForces::zeros(&self.model);
        self.model
            .calc_force_elements_contribution(&kinematics, &q0, &v0, &mut forces);
        forces.generalized -= context.joint_damping().component_mul(&v0);
        forces.generalized += context.eval_actuation()?;

        let diagonal_inertia = context.reflected_inertia() + context.joint_damping() * dt;
        let vdot = self
            .model
            .calc_forward_dynamics(&kinematics, &v0, &diagonal_inertia, &forces)?;
        let generalized_forces = self.model.calc_generalized_forces(&kinematics, &forces)?;

        Ok(AccelerationsDueToNonContactForces {
            generalized_forces,
            vdot,
        })
    }

    /// Free-motion velocities `v* = v₀ + δt·v̇₀`.
    pub fn calc_free_motion_velocities(&self, context: &Context) -> Result<DVector<f64>> {
        let accelerations = self.eval_accelerations_due_to_non_contact_forces(context)?;
        Ok(context.velocities() + &accelerations.vdot * self.time_step())
    }

    /// Per-tree blocks of `A = M + δt·D`, reflected inertia included in `M`.
    pub fn calc_linear_dynamics_matrix(&self, context: &Context) -> Result<Vec<DMatrix<f64>>> {
        let kinematics = self.eval_position_kinematics(context)?;
        let mut m = self
            .model
            .calc_mass_matrix(&kinematics, context.reflected_inertia())?;
        let dt = self.time_step();
        for (i, d) in context.joint_damping().iter().enumerate() {
            m[(i, i)] += dt * d;
        }

        let topology = self.model.topology();
        Ok(topology
            .trees()
            .map(|t| {
                let start = topology.tree_velocities_start(t);
                let n = topology.num_tree_velocities(t);
                m.view((start, start), (n, n)).into_owned()
            })
            .collect())
    }
}
