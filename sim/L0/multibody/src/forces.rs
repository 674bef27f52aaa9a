//! Applied forces and force elements.

use nalgebra::{DVector, Vector3};
use sim_types::{BodyIndex, JointIndex, Result, SimError};

use crate::kinematics::PositionKinematics;
use crate::model::MultibodyModel;

/// A torque and a force applied at a body's origin, both in the world frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpatialForce {
    /// Torque (N·m).
    pub torque: Vector3<f64>,
    /// Force (N).
    pub force: Vector3<f64>,
}

impl SpatialForce {
    /// Create a spatial force.
    #[must_use]
    pub fn new(torque: Vector3<f64>, force: Vector3<f64>) -> Self {
        Self { torque, force }
    }

    /// Shift the application point by `r` (from the current point to the new
    /// point): the force is unchanged and the torque picks up `−r × f`.
    #[must_use]
    pub fn shift(&self, r: &Vector3<f64>) -> Self {
        Self {
            torque: self.torque - r.cross(&self.force),
            force: self.force,
        }
    }
}

/// Forces applied to a multibody system: generalized forces plus per-body
/// spatial forces.
#[derive(Debug, Clone, PartialEq)]
pub struct MultibodyForces {
    /// Generalized forces, one per velocity.
    pub generalized: DVector<f64>,
    /// Spatial forces at each body origin, indexed by body.
    pub body_forces: Vec<SpatialForce>,
}

impl MultibodyForces {
    /// Zero forces sized for `model`.
    #[must_use]
    pub fn zeros(model: &MultibodyModel) -> Self {
        Self {
            generalized: DVector::zeros(model.num_velocities()),
            body_forces: vec![SpatialForce::default(); model.num_bodies()],
        }
    }

    /// Reset all entries to zero.
    pub fn set_zero(&mut self) {
        self.generalized.fill(0.0);
        self.body_forces.fill(SpatialForce::default());
    }

    /// Whether the sizes match `model`.
    #[must_use]
    pub fn check_invariants(&self, model: &MultibodyModel) -> bool {
        self.generalized.len() == model.num_velocities()
            && self.body_forces.len() == model.num_bodies()
    }
}

/// A force law evaluated at the current state and accumulated into
/// [`MultibodyForces`].
pub trait ForceElement: std::fmt::Debug {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Check the element against the model it was added to.
    fn validate(&self, _model: &MultibodyModel) -> Result<()> {
        Ok(())
    }

    /// Accumulate this element's forces.
    fn add_forces(
        &self,
        model: &MultibodyModel,
        kinematics: &PositionKinematics,
        q: &DVector<f64>,
        v: &DVector<f64>,
        forces: &mut MultibodyForces,
    );
}

/// Uniform gravitational field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UniformGravity {
    /// Gravity acceleration in the world frame (m/s²).
    pub acceleration: Vector3<f64>,
}

impl UniformGravity {
    /// Magnitude of standard gravity (m/s²).
    pub const STANDARD: f64 = 9.81;

    /// Create a field with the given acceleration.
    #[must_use]
    pub fn new(acceleration: Vector3<f64>) -> Self {
        Self { acceleration }
    }
}

impl Default for UniformGravity {
    fn default() -> Self {
        Self::new(Vector3::new(0.0, 0.0, -Self::STANDARD))
    }
}

impl ForceElement for UniformGravity {
    fn name(&self) -> &str {
        "uniform_gravity"
    }

    fn add_forces(
        &self,
        model: &MultibodyModel,
        kinematics: &PositionKinematics,
        _q: &DVector<f64>,
        _v: &DVector<f64>,
        forces: &mut MultibodyForces,
    ) {
        for b in 1..model.num_bodies() {
            let body = BodyIndex::new(b);
            let mass = model.body(body).mass;
            if mass == 0.0 {
                continue;
            }
            let weight = self.acceleration * mass;
            // Weight acts at the COM; shift it to the body origin.
            let p_bcm = kinematics.body_pose(body).rotation * model.body(body).com;
            let f = SpatialForce::new(Vector3::zeros(), weight).shift(&-p_bcm);
            let slot = &mut forces.body_forces[b];
            slot.torque += f.torque;
            slot.force += f.force;
        }
    }
}

/// Linear spring on a single-dof joint: `τ = −k·(q − q_rest)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JointSpring {
    /// Joint the spring acts on.
    pub joint: JointIndex,
    /// Spring stiffness.
    pub stiffness: f64,
    /// Rest position.
    pub rest_position: f64,
}

impl JointSpring {
    /// Create a joint spring.
    #[must_use]
    pub fn new(joint: JointIndex, stiffness: f64, rest_position: f64) -> Self {
        Self {
            joint,
            stiffness,
            rest_position,
        }
    }
}

impl ForceElement for JointSpring {
    fn name(&self) -> &str {
        "joint_spring"
    }

    fn validate(&self, model: &MultibodyModel) -> Result<()> {
        if self.joint.index() >= model.num_joints() {
            return Err(SimError::invalid_index("joint", self.joint.index()));
        }
        let joint = model.joint(self.joint);
        if joint.num_velocities() != 1 {
            return Err(SimError::invalid_config(format!(
                "joint spring requires a single-dof joint, '{}' has {}",
                joint.name,
                joint.num_velocities()
            )));
        }
        if !self.stiffness.is_finite() || self.stiffness < 0.0 {
            return Err(SimError::invalid_config(format!(
                "joint spring on '{}' has invalid stiffness {}",
                joint.name, self.stiffness
            )));
        }
        Ok(())
    }

    fn add_forces(
        &self,
        model: &MultibodyModel,
        _kinematics: &PositionKinematics,
        q: &DVector<f64>,
        _v: &DVector<f64>,
        forces: &mut MultibodyForces,
    ) {
        let i = model.joint(self.joint).velocity_start();
        forces.generalized[i] -= self.stiffness * (q[i] - self.rest_position);
    }
}
