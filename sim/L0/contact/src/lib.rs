//! Contact discovery for the discrete update.
//!
//! This crate turns geometry into contact constraints' raw material:
//!
//! - **Materials**: [`ProximityProperties`] and [`CoulombFriction`] per
//!   collision geometry
//! - **Geometry queries**: the [`GeometryQuery`] interface returning
//!   [`PenetrationAsPointPair`]s and [`ContactSurface`]s, with a primitive
//!   sphere/half-space implementation in [`GeometryRegistry`]
//! - **Discretization**: [`ContactDiscretizer`] producing
//!   [`DiscreteContactPair`]s with combined stiffness, dissipation time and
//!   friction
//! - **Contact kinematics**: [`calc_contact_kinematics`] producing a contact
//!   frame and per-tree Jacobian blocks for every pair
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
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::nonminimal_bool, // `!(x > 0.0)` rejects NaN
    clippy::neg_cmp_op_on_partial_ord
)]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod discretizer;
pub mod geometry;
pub mod kinematics;
pub mod properties;
pub mod query;

pub use discretizer::{
    ContactDiscretizer, DiscreteContactPair, combine_dissipation_time_constants,
    combine_friction_coefficients, combine_stiffnesses,
};
pub use geometry::{CollisionGeometry, GeometryRegistry, Shape};
pub use kinematics::{
    ContactPairKinematics, JacobianTreeBlock, calc_contact_kinematics,
    make_rotation_from_one_vector,
};
pub use properties::{CoulombFriction, ProximityProperties};
pub use query::{
    ContactSurface, FacePressure, GeometryQuery, PenetrationAsPointPair, SurfaceFace,
    SurfaceMeshKind,
};
