//! Joints connecting a parent body to a child body.
//!
//! Every joint defines a fixed frame `F` on the parent (the `offset`), and
//! moves the child frame `C` relative to `F` as a function of its generalized
//! positions. At zero position `C` coincides with `F`. Joint axes are
//! expressed in `F`.
//!
//! | Joint type     | nq = nv | motion `X_FC(q)`                |
//! |----------------|---------|---------------------------------|
//! | Weld           | 0       | identity                        |
//! | Revolute       | 1       | rotation by `q` about `axis`    |
//! | Prismatic      | 1       | translation by `q·axis`         |
//! | Translational  | 3       | translation by `(q₀, q₁, q₂)`   |

use nalgebra::{Isometry3, Translation3, UnitQuaternion, Vector3};
use sim_types::BodyIndex;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Kind of joint and its kinematic parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JointType {
    /// Rigid attachment, no degrees of freedom.
    Weld,
    /// Rotation about a fixed axis.
    Revolute {
        /// Unit rotation axis in the joint frame.
        axis: Vector3<f64>,
    },
    /// Translation along a fixed axis.
    Prismatic {
        /// Unit translation axis in the joint frame.
        axis: Vector3<f64>,
    },
    /// Free translation along the three joint-frame axes.
    Translational,
}

impl JointType {
    /// Number of generalized velocities (equal to the number of positions).
    #[must_use]
    pub const fn num_velocities(&self) -> usize {
        match self {
            Self::Weld => 0,
            Self::Revolute { .. } | Self::Prismatic { .. } => 1,
            Self::Translational => 3,
        }
    }

    /// Human readable name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Weld => "weld",
            Self::Revolute { .. } => "revolute",
            Self::Prismatic { .. } => "prismatic",
            Self::Translational => "translational",
        }
    }

    /// Child pose in the joint frame for positions `q` (length `num_velocities()`).
    pub(crate) fn motion(&self, q: &[f64]) -> Isometry3<f64> {
        match self {
            Self::Weld => Isometry3::identity(),
            Self::Revolute { axis } => Isometry3::from_parts(
                Translation3::identity(),
                UnitQuaternion::from_scaled_axis(axis * q[0]),
            ),
            Self::Prismatic { axis } => {
                Isometry3::from_parts(Translation3::from(axis * q[0]), UnitQuaternion::identity())
            }
            Self::Translational => Isometry3::from_parts(
                Translation3::new(q[0], q[1], q[2]),
                UnitQuaternion::identity(),
            ),
        }
    }
}

/// A joint between a parent and a child body.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Joint {
    /// Joint name, used in diagnostics.
    pub name: String,
    /// Joint type.
    pub joint_type: JointType,
    /// Parent (inboard) body.
    pub parent: BodyIndex,
    /// Child (outboard) body.
    pub child: BodyIndex,
    /// Pose of the joint frame `F` in the parent body frame.
    pub offset: Isometry3<f64>,
    /// Per-dof viscous damping (N·s/m or N·m·s).
    pub damping: Vec<f64>,
    /// Per-dof reflected rotor inertia added to the mass matrix diagonal.
    pub reflected_inertia: Vec<f64>,
    /// Per-dof lower position limits. `-inf` means unlimited.
    pub position_lower_limits: Vec<f64>,
    /// Per-dof upper position limits. `+inf` means unlimited.
    pub position_upper_limits: Vec<f64>,
    /// First generalized velocity index, assigned when the model is built.
    pub(crate) velocity_start: usize,
}

impl Joint {
    /// Create a joint with no damping, no reflected inertia and no limits.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        joint_type: JointType,
        parent: BodyIndex,
        child: BodyIndex,
    ) -> Self {
        let nv = joint_type.num_velocities();
        Self {
            name: name.into(),
            joint_type,
            parent,
            child,
            offset: Isometry3::identity(),
            damping: vec![0.0; nv],
            reflected_inertia: vec![0.0; nv],
            position_lower_limits: vec![f64::NEG_INFINITY; nv],
            position_upper_limits: vec![f64::INFINITY; nv],
            velocity_start: 0,
        }
    }

    /// Weld `child` to `parent`.
    #[must_use]
    pub fn weld(name: impl Into<String>, parent: BodyIndex, child: BodyIndex) -> Self {
        Self::new(name, JointType::Weld, parent, child)
    }

    /// Revolute joint about `axis`.
    #[must_use]
    pub fn revolute(
        name: impl Into<String>,
        parent: BodyIndex,
        child: BodyIndex,
        axis: Vector3<f64>,
    ) -> Self {
        Self::new(name, JointType::Revolute { axis }, parent, child)
    }

    /// Prismatic joint along `axis`.
    #[must_use]
    pub fn prismatic(
        name: impl Into<String>,
        parent: BodyIndex,
        child: BodyIndex,
        axis: Vector3<f64>,
    ) -> Self {
        Self::new(name, JointType::Prismatic { axis }, parent, child)
    }

    /// Three-dof translational joint.
    #[must_use]
    pub fn translational(name: impl Into<String>, parent: BodyIndex, child: BodyIndex) -> Self {
        Self::new(name, JointType::Translational, parent, child)
    }

    /// Set the joint frame pose in the parent frame.
    #[must_use]
    pub fn with_offset(mut self, offset: Isometry3<f64>) -> Self {
        self.offset = offset;
        self
    }

    /// Place the joint frame at `position` in the parent frame.
    #[must_use]
    pub fn at(mut self, position: Vector3<f64>) -> Self {
        self.offset = Isometry3::translation(position.x, position.y, position.z);
        self
    }

    /// Set the same damping on every dof.
    #[must_use]
    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping.fill(damping);
        self
    }

    /// Set the same reflected inertia on every dof.
    #[must_use]
    pub fn with_reflected_inertia(mut self, reflected_inertia: f64) -> Self {
        self.reflected_inertia.fill(reflected_inertia);
        self
    }

    /// Set the same position limits on every dof.
    #[must_use]
    pub fn with_limits(mut self, lower: f64, upper: f64) -> Self {
        self.position_lower_limits.fill(lower);
        self.position_upper_limits.fill(upper);
        self
    }

    /// Number of generalized velocities.
    #[must_use]
    pub fn num_velocities(&self) -> usize {
        self.joint_type.num_velocities()
    }

    /// First generalized velocity index in the model's velocity vector.
    /// Positions share the same indexing.
    #[must_use]
    pub fn velocity_start(&self) -> usize {
        self.velocity_start
    }

    /// Whether any dof has a finite lower or upper limit.
    #[must_use]
    pub fn has_finite_limits(&self) -> bool {
        self.position_lower_limits.iter().any(|l| l.is_finite())
            || self.position_upper_limits.iter().any(|u| u.is_finite())
    }
}
