//! Position kinematics and body Jacobians.
//!
//! Jacobians are built by walking the kinematic chain from a body to the
//! world, accumulating per-joint columns:
//!
//! | Joint type     | translational column(s)  | angular column(s) |
//! |----------------|--------------------------|-------------------|
//! | Revolute       | `axis × (p − o_F)`       | `axis`            |
//! | Prismatic      | `axis`                   | `0`               |
//! | Translational  | `R_WF·eᵢ`                | `0`               |
//!
//! where `p` is the world-frame point, `o_F` the joint frame origin and
//! `axis` the world-frame joint axis. Since velocities of one tree are
//! contiguous, a body's Jacobian is non-zero only within its tree's column
//! range.

use nalgebra::{DVector, Isometry3, Matrix3xX, Vector3};
use sim_types::{BodyIndex, JointIndex, Result, SimError};

use crate::joint::JointType;
use crate::model::MultibodyModel;

/// World poses of every body and joint frame for one configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionKinematics {
    body_poses: Vec<Isometry3<f64>>,
    joint_frames: Vec<Isometry3<f64>>,
}

impl PositionKinematics {
    /// Pose `X_WB` of `body` in the world.
    #[must_use]
    pub fn body_pose(&self, body: BodyIndex) -> &Isometry3<f64> {
        &self.body_poses[body.index()]
    }

    /// Pose `X_WF` of the joint frame of `joint` in the world.
    #[must_use]
    pub fn joint_frame(&self, joint: JointIndex) -> &Isometry3<f64> {
        &self.joint_frames[joint.index()]
    }

    /// World position of the center of mass of `body`.
    #[must_use]
    pub fn com_position(&self, model: &MultibodyModel, body: BodyIndex) -> Vector3<f64> {
        let pose = self.body_pose(body);
        pose.translation.vector + pose.rotation * model.body(body).com
    }
}

impl MultibodyModel {
    /// Compute world poses for positions `q`.
    pub fn calc_position_kinematics(&self, q: &DVector<f64>) -> Result<PositionKinematics> {
        if q.len() != self.num_positions() {
            return Err(SimError::dimension_mismatch(
                "generalized positions",
                self.num_positions(),
                q.len(),
            ));
        }
        let mut body_poses = vec![Isometry3::identity(); self.num_bodies()];
        let mut joint_frames = vec![Isometry3::identity(); self.num_joints()];

        // Body order is topological: parents are always computed first.
        for b in 1..self.num_bodies() {
            let Some(j) = self.inboard[b] else { continue };
            let joint = &self.joints[j.index()];
            let start = joint.velocity_start;
            let qj = &q.as_slice()[start..start + joint.num_velocities()];
            let x_wf = body_poses[joint.parent.index()] * joint.offset;
            body_poses[b] = x_wf * joint.joint_type.motion(qj);
            joint_frames[j.index()] = x_wf;
        }
        Ok(PositionKinematics {
            body_poses,
            joint_frames,
        })
    }

    /// Translational velocity Jacobian `Jv` (3×nv) of the world-frame point
    /// `p_w` moving with `body`, such that `v_p = Jv·v`.
    #[must_use]
    pub fn translational_jacobian(
        &self,
        kinematics: &PositionKinematics,
        body: BodyIndex,
        p_w: &Vector3<f64>,
    ) -> Matrix3xX<f64> {
        let mut jac = Matrix3xX::zeros(self.num_velocities);
        self.walk_chain(body, |j, joint_type, start| {
            let x_wf = kinematics.joint_frame(j);
            match joint_type {
                JointType::Revolute { axis } => {
                    let axis_w = x_wf.rotation * axis;
                    let r = p_w - x_wf.translation.vector;
                    jac.set_column(start, &axis_w.cross(&r));
                }
                JointType::Prismatic { axis } => {
                    jac.set_column(start, &(x_wf.rotation * axis));
                }
                JointType::Translational => {
                    for i in 0..3 {
                        jac.set_column(start + i, &(x_wf.rotation * Vector3::ith(i, 1.0)));
                    }
                }
                JointType::Weld => {}
            }
        });
        jac
    }

    /// Angular velocity Jacobian `Jω` (3×nv) of `body`, such that `ω_B = Jω·v`.
    #[must_use]
    pub fn angular_jacobian(
        &self,
        kinematics: &PositionKinematics,
        body: BodyIndex,
    ) -> Matrix3xX<f64> {
        let mut jac = Matrix3xX::zeros(self.num_velocities);
        self.walk_chain(body, |j, joint_type, start| {
            if let JointType::Revolute { axis } = joint_type {
                let axis_w = kinematics.joint_frame(j).rotation * axis;
                jac.set_column(start, &axis_w);
            }
        });
        jac
    }

    /// Visit every joint between `body` and the world.
    fn walk_chain(&self, body: BodyIndex, mut visit: impl FnMut(JointIndex, &JointType, usize)) {
        let mut current = body;
        while let Some(j) = self.inboard_joint(current) {
            let joint = &self.joints[j.index()];
            visit(j, &joint.joint_type, joint.velocity_start);
            current = joint.parent;
        }
    }
}
