//! Discrete update of a multibody system with compliant contact.
//!
//! [`CompliantContactManager`] advances a [`Context`] by one fixed time step:
//!
//! - **Free motion**: non-contact forces with implicit joint damping give the
//!   free-motion velocities `v*` and the per-tree dynamics matrices
//! - **Assembly**: contacts, then joint limits inside a one-step window,
//!   then couplers, into one [`ContactProblem`](sim_constraint::ContactProblem)
//! - **Solve**: SAP, with the previous velocities as initial guess
//! - **Results**: [`ContactSolverResults`] and world-frame
//!   [`ContactForceReport`]s
//!
//! Every stage is memoized in the context's [`Cache`] and recomputed only
//! when time, state, parameters or inputs it depends on change.
//!
//! # Example
//!
//! ```
//! use nalgebra::{DVector, Isometry3, Vector3};
//! use sim_contact::{CoulombFriction, GeometryRegistry, ProximityProperties};
//! use sim_discrete::CompliantContactManager;
//! use sim_multibody::{Body, Joint, MultibodyModelBuilder, UniformGravity};
//! use sim_types::{BodyIndex, DiscreteUpdateConfig};
//!
//! let mut builder = MultibodyModelBuilder::new();
//! let ball = builder.add_body(Body::solid_sphere("ball", 1.0, 0.1));
//! builder.add_joint(Joint::translational("free", BodyIndex::WORLD, ball));
//! builder.add_force_element(UniformGravity::default());
//! let model = builder.build().unwrap();
//!
//! let props = ProximityProperties::new(0.01, CoulombFriction::uniform(0.5).unwrap());
//! let mut geometry = GeometryRegistry::new();
//! geometry
//!     .add_half_space("ground", BodyIndex::WORLD, Isometry3::identity(), props)
//!     .unwrap();
//! geometry
//!     .add_sphere("ball", ball, Vector3::zeros(), 0.1, props)
//!     .unwrap();
//!
//! let manager =
//!     CompliantContactManager::new(model, geometry, DiscreteUpdateConfig::default()).unwrap();
//! let mut context = manager.create_default_context();
//! context
//!     .set_positions(&DVector::from_vec(vec![0.0, 0.0, 0.0995]))
//!     .unwrap();
//! for _ in 0..10 {
//!     manager.advance(&mut context).unwrap();
//! }
//! assert!(context.positions()[2] > 0.09);
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

pub mod assembler;
pub mod cache;
pub mod context;
pub mod free_motion;
pub mod manager;
pub mod results;

pub use assembler::{ContactProblemCache, CouplerConstraintSpec};
pub use cache::{Cache, CacheIndex, SourceVersions, Ticket};
pub use context::{Actuation, ActuationSource, Context};
pub use free_motion::AccelerationsDueToNonContactForces;
pub use manager::{CompliantContactManager, ContactForceReport, DeformableModel};
pub use results::ContactSolverResults;
