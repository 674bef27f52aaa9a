//! Reference kinematic-tree model for discrete contact simulation.
//!
//! This crate provides the multibody primitives the discrete update consumes:
//!
//! - **Topology**: bodies, joints and their partition into independent
//!   kinematic trees with contiguous velocity ranges ([`TreeTopology`])
//! - **Kinematics**: body poses and translational/angular Jacobians
//! - **Dynamics**: mass matrix, velocity-product bias, and forward dynamics
//!   with a per-dof diagonal inertia augmentation
//! - **Forces**: [`MultibodyForces`] and the [`ForceElement`] trait, with
//!   [`UniformGravity`] and [`JointSpring`]
//!
//! # Example
//!
//! ```
//! use nalgebra::{DVector, Vector3};
//! use sim_multibody::{Body, Joint, MultibodyForces, MultibodyModelBuilder, UniformGravity};
//! use sim_types::BodyIndex;
//!
//! let mut builder = MultibodyModelBuilder::new();
//! let ball = builder.add_body(Body::solid_sphere("ball", 1.0, 0.1));
//! builder.add_joint(Joint::translational("free", BodyIndex::WORLD, ball));
//! builder.add_force_element(UniformGravity::default());
//! let model = builder.build().unwrap();
//!
//! let q = DVector::zeros(3);
//! let v = DVector::zeros(3);
//! let kin = model.calc_position_kinematics(&q).unwrap();
//! let mut forces = MultibodyForces::zeros(&model);
//! model.calc_force_elements_contribution(&kin, &q, &v, &mut forces);
//! let vdot = model
//!     .calc_forward_dynamics(&kin, &v, &DVector::zeros(3), &forces)
//!     .unwrap();
//! assert!((vdot[2] + 9.81).abs() < 1e-12);
//! ```
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::similar_names,
    clippy::suboptimal_flops,
    clippy::many_single_char_names,
    clippy::nonminimal_bool, // `!(x >= 0.0)` rejects NaN
    clippy::neg_cmp_op_on_partial_ord
)]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod body;
pub mod dynamics;
pub mod forces;
pub mod joint;
pub mod kinematics;
pub mod linalg;
pub mod model;
pub mod topology;

pub use body::Body;
pub use forces::{ForceElement, JointSpring, MultibodyForces, SpatialForce, UniformGravity};
pub use joint::{Joint, JointType};
pub use kinematics::PositionKinematics;
pub use model::{MultibodyModel, MultibodyModelBuilder};
pub use topology::TreeTopology;
