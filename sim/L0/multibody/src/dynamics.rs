//! Mass matrix, velocity-dependent bias and forward dynamics.
//!
//! Equations of motion in Kane's form:
//!
//! ```text
//! (M(q) + diag(d))·v̇ + C(q,v)·v = τ_applied
//! M(q)    = Σ_b  m_b·Jv_bᵀ·Jv_b + Jω_bᵀ·I_b·Jω_b
//! C(q,v)v = Σ_b  m_b·Jv_bᵀ·a_b + Jω_bᵀ·(I_b·α_b + ω_b × I_b·ω_b)
//! ```
//!
//! where `Jv_b` is the Jacobian of body `b`'s center of mass, `I_b` its world
//! frame rotational inertia, and `a_b`, `α_b` the velocity-product (bias)
//! accelerations obtained with `v̇ = 0`. `d` is a per-dof diagonal inertia
//! augmentation (reflected rotor inertia and implicit damping terms).

use nalgebra::{DMatrix, DVector, Vector3};
use sim_types::{BodyIndex, Result, SimError};

use crate::forces::MultibodyForces;
use crate::joint::JointType;
use crate::kinematics::PositionKinematics;
use crate::linalg::{cholesky_in_place, cholesky_solve_in_place};
use crate::model::MultibodyModel;

/// Body angular velocities and velocity-product accelerations, world frame.
struct BiasKinematics {
    angular_velocity: Vec<Vector3<f64>>,
    angular_bias: Vec<Vector3<f64>>,
    origin_bias: Vec<Vector3<f64>>,
}

impl MultibodyModel {
    /// Rigid-body mass matrix, excluding reflected inertia.
    #[must_use]
    pub fn calc_rigid_mass_matrix(&self, kinematics: &PositionKinematics) -> DMatrix<f64> {
        let nv = self.num_velocities();
        let mut mass_matrix = DMatrix::zeros(nv, nv);
        for b in 1..self.num_bodies() {
            let body = BodyIndex::new(b);
            let props = self.body(body);
            let p_wcm = kinematics.com_position(self, body);
            let jv = self.translational_jacobian(kinematics, body, &p_wcm);
            let jw = self.angular_jacobian(kinematics, body);
            let r_wb = kinematics.body_pose(body).rotation.to_rotation_matrix();
            let inertia_w = r_wb.matrix() * props.inertia * r_wb.matrix().transpose();
            mass_matrix += jv.transpose() * &jv * props.mass;
            mass_matrix += jw.transpose() * inertia_w * &jw;
        }
        mass_matrix
    }

    /// Mass matrix including per-dof reflected inertia on the diagonal.
    pub fn calc_mass_matrix(
        &self,
        kinematics: &PositionKinematics,
        reflected_inertia: &DVector<f64>,
    ) -> Result<DMatrix<f64>> {
        self.check_velocity_sized("reflected inertia", reflected_inertia)?;
        let mut mass_matrix = self.calc_rigid_mass_matrix(kinematics);
        for i in 0..self.num_velocities() {
            mass_matrix[(i, i)] += reflected_inertia[i];
        }
        Ok(mass_matrix)
    }

    /// Velocity-product term `C(q,v)·v`.
    pub fn calc_bias_term(
        &self,
        kinematics: &PositionKinematics,
        v: &DVector<f64>,
    ) -> Result<DVector<f64>> {
        self.check_velocity_sized("generalized velocities", v)?;
        let bias = self.calc_bias_kinematics(kinematics, v);
        let mut term = DVector::zeros(self.num_velocities());
        for b in 1..self.num_bodies() {
            let body = BodyIndex::new(b);
            let props = self.body(body);
            let pose = kinematics.body_pose(body);
            let w = bias.angular_velocity[b];
            let alpha = bias.angular_bias[b];
            let p_bcm = pose.rotation * props.com;
            let a_com = bias.origin_bias[b] + alpha.cross(&p_bcm) + w.cross(&w.cross(&p_bcm));

            let r_wb = pose.rotation.to_rotation_matrix();
            let inertia_w = r_wb.matrix() * props.inertia * r_wb.matrix().transpose();
            let moment = inertia_w * alpha + w.cross(&(inertia_w * w));

            let p_wcm = pose.translation.vector + p_bcm;
            let jv = self.translational_jacobian(kinematics, body, &p_wcm);
            let jw = self.angular_jacobian(kinematics, body);
            term += jv.transpose() * (a_com * props.mass);
            term += jw.transpose() * moment;
        }
        Ok(term)
    }

    /// Recursive outward pass for body velocities and bias accelerations.
    fn calc_bias_kinematics(
        &self,
        kinematics: &PositionKinematics,
        v: &DVector<f64>,
    ) -> BiasKinematics {
        let nb = self.num_bodies();
        let mut out = BiasKinematics {
            angular_velocity: vec![Vector3::zeros(); nb],
            angular_bias: vec![Vector3::zeros(); nb],
            origin_bias: vec![Vector3::zeros(); nb],
        };
        for b in 1..nb {
            let Some(j) = self.inboard[b] else { continue };
            let joint = &self.joints[j.index()];
            let p = joint.parent.index();
            let x_wf = kinematics.joint_frame(j);
            let start = joint.velocity_start;

            // Relative angular and linear velocity of the child in the joint frame,
            // expressed in world.
            let (w_rel, v_rel) = match joint.joint_type {
                JointType::Weld => (Vector3::zeros(), Vector3::zeros()),
                JointType::Revolute { axis } => (x_wf.rotation * axis * v[start], Vector3::zeros()),
                JointType::Prismatic { axis } => (Vector3::zeros(), x_wf.rotation * axis * v[start]),
                JointType::Translational => (
                    Vector3::zeros(),
                    x_wf.rotation * Vector3::new(v[start], v[start + 1], v[start + 2]),
                ),
            };

            let w_p = out.angular_velocity[p];
            let r = kinematics.body_pose(joint.child).translation.vector
                - kinematics.body_pose(joint.parent).translation.vector;

            out.angular_velocity[b] = w_p + w_rel;
            out.angular_bias[b] = out.angular_bias[p] + w_p.cross(&w_rel);
            out.origin_bias[b] = out.origin_bias[p]
                + out.angular_bias[p].cross(&r)
                + w_p.cross(&w_p.cross(&r))
                + w_p.cross(&v_rel) * 2.0;
        }
        out
    }

    /// Generalized forces equivalent to `forces`: `τ + Σ_b Jv_bᵀ·f_b + Jω_bᵀ·t_b`.
    pub fn calc_generalized_forces(
        &self,
        kinematics: &PositionKinematics,
        forces: &MultibodyForces,
    ) -> Result<DVector<f64>> {
        if !forces.check_invariants(self) {
            return Err(SimError::structural(
                "multibody forces are not sized for this model",
            ));
        }
        let mut tau = forces.generalized.clone();
        for (b, f) in forces.body_forces.iter().enumerate().skip(1) {
            if f.force == Vector3::zeros() && f.torque == Vector3::zeros() {
                continue;
            }
            let body = BodyIndex::new(b);
            let origin = kinematics.body_pose(body).translation.vector;
            tau += self.translational_jacobian(kinematics, body, &origin).transpose() * f.force;
            tau += self.angular_jacobian(kinematics, body).transpose() * f.torque;
        }
        Ok(tau)
    }

    /// Accumulate every registered force element into `forces`.
    pub fn calc_force_elements_contribution(
        &self,
        kinematics: &PositionKinematics,
        q: &DVector<f64>,
        v: &DVector<f64>,
        forces: &mut MultibodyForces,
    ) {
        for element in &self.force_elements {
            element.add_forces(self, kinematics, q, v, forces);
        }
    }

    /// Forward dynamics with diagonal inertia augmentation:
    /// solves `(M_rigid + diag(d))·v̇ = τ(forces) − C(q,v)·v` tree by tree.
    pub fn calc_forward_dynamics(
        &self,
        kinematics: &PositionKinematics,
        v: &DVector<f64>,
        diagonal_inertia: &DVector<f64>,
        forces: &MultibodyForces,
    ) -> Result<DVector<f64>> {
        self.check_velocity_sized("diagonal inertia", diagonal_inertia)?;
        let mut rhs = self.calc_generalized_forces(kinematics, forces)?;
        rhs -= self.calc_bias_term(kinematics, v)?;

        let mut mass_matrix = self.calc_rigid_mass_matrix(kinematics);
        for i in 0..self.num_velocities() {
            mass_matrix[(i, i)] += diagonal_inertia[i];
        }

        let mut vdot = DVector::zeros(self.num_velocities());
        for tree in self.topology.trees() {
            let start = self.topology.tree_velocities_start(tree);
            let n = self.topology.num_tree_velocities(tree);
            let mut block = mass_matrix.view((start, start), (n, n)).into_owned();
            cholesky_in_place(&mut block, &format!("mass matrix of {tree}"))?;
            let mut x = rhs.rows(start, n).into_owned();
            cholesky_solve_in_place(&block, &mut x);
            vdot.rows_mut(start, n).copy_from(&x);
        }
        Ok(vdot)
    }

    fn check_velocity_sized(&self, what: &str, x: &DVector<f64>) -> Result<()> {
        if x.len() == self.num_velocities() {
            Ok(())
        } else {
            Err(SimError::dimension_mismatch(what, self.num_velocities(), x.len()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::body::Body;
    use crate::forces::{JointSpring, UniformGravity};
    use crate::joint::Joint;
    use crate::model::MultibodyModelBuilder;
    use approx::assert_relative_eq;
    use sim_types::JointIndex;

    #[test]
    fn test_falling_point_mass() {
        let mut builder = MultibodyModelBuilder::new();
        let ball = builder.add_body(Body::solid_sphere("ball", 2.0, 0.1));
        builder.add_joint(Joint::translational("free", BodyIndex::WORLD, ball));
        builder.add_force_element(UniformGravity::default());
        let model = builder.build().unwrap();

        let q = DVector::zeros(3);
        let v = DVector::from_vec(vec![1.0, 0.0, 0.0]);
        let kin = model.calc_position_kinematics(&q).unwrap();
        let mut forces = MultibodyForces::zeros(&model);
        model.calc_force_elements_contribution(&kin, &q, &v, &mut forces);
        let vdot = model
            .calc_forward_dynamics(&kin, &v, &DVector::zeros(3), &forces)
            .unwrap();
        assert_relative_eq!(vdot[2], -UniformGravity::STANDARD, epsilon = 1e-12);
        assert_relative_eq!(vdot[0], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_diagonal_inertia_augments_mass() {
        let mut builder = MultibodyModelBuilder::new();
        let slider = builder.add_body(Body::point_mass("slider", 1.0));
        builder.add_joint(Joint::prismatic("x", BodyIndex::WORLD, slider, Vector3::x()));
        let model = builder.build().unwrap();

        let q = DVector::zeros(1);
        let v = DVector::zeros(1);
        let kin = model.calc_position_kinematics(&q).unwrap();
        let mut forces = MultibodyForces::zeros(&model);
        forces.generalized[0] = 3.0;
        let vdot = model
            .calc_forward_dynamics(&kin, &v, &DVector::from_element(1, 2.0), &forces)
            .unwrap();
        assert_relative_eq!(vdot[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mass_matrix_pendulum() {
        // Point mass m at distance L on a revolute joint: M = m·L².
        let mut builder = MultibodyModelBuilder::new();
        let link = builder.add_body(Body::new(
            "link",
            2.0,
            Vector3::new(0.5, 0.0, 0.0),
            nalgebra::Matrix3::zeros(),
        ));
        builder.add_joint(Joint::revolute("hinge", BodyIndex::WORLD, link, Vector3::z()));
        let model = builder.build().unwrap();
        let kin = model.calc_position_kinematics(&DVector::from_element(1, 0.4)).unwrap();
        let m = model
            .calc_mass_matrix(&kin, &DVector::from_element(1, 0.1))
            .unwrap();
        assert_relative_eq!(m[(0, 0)], 2.0 * 0.25 + 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_centripetal_bias_on_prismatic_arm() {
        // A slider on a spinning arm: the bias of the slider dof is −m·ω²·r.
        let mut builder = MultibodyModelBuilder::new();
        let arm = builder.add_body(Body::with_principal_inertia(
            "arm",
            1.0,
            Vector3::new(1.0, 1.0, 1.0),
        ));
        let bead = builder.add_body(Body::point_mass("bead", 0.5));
        builder.add_joint(Joint::revolute("spin", BodyIndex::WORLD, arm, Vector3::z()));
        builder.add_joint(Joint::prismatic("slide", arm, bead, Vector3::x()));
        let model = builder.build().unwrap();

        let q = DVector::from_vec(vec![0.0, 2.0]);
        let v = DVector::from_vec(vec![3.0, 0.0]);
        let kin = model.calc_position_kinematics(&q).unwrap();
        let bias = model.calc_bias_term(&kin, &v).unwrap();
        assert_relative_eq!(bias[1], -0.5 * 9.0 * 2.0, epsilon = 1e-10);
        assert_relative_eq!(bias[0], 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_joint_spring_force() {
        let mut builder = MultibodyModelBuilder::new();
        let slider = builder.add_body(Body::point_mass("slider", 1.0));
        builder.add_joint(Joint::prismatic("x", BodyIndex::WORLD, slider, Vector3::x()));
        builder.add_force_element(JointSpring::new(JointIndex::new(0), 10.0, 0.5));
        let model = builder.build().unwrap();

        let q = DVector::from_element(1, 0.7);
        let v = DVector::zeros(1);
        let kin = model.calc_position_kinematics(&q).unwrap();
        let mut forces = MultibodyForces::zeros(&model);
        model.calc_force_elements_contribution(&kin, &q, &v, &mut forces);
        assert_relative_eq!(forces.generalized[0], -2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_spring_on_multi_dof_joint_rejected() {
        let mut builder = MultibodyModelBuilder::new();
        let ball = builder.add_body(Body::point_mass("ball", 1.0));
        builder.add_joint(Joint::translational("free", BodyIndex::WORLD, ball));
        builder.add_force_element(JointSpring::new(JointIndex::new(0), 10.0, 0.0));
        assert!(builder.build().unwrap_err().is_config_error());
    }
}
