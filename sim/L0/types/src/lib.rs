//! Core types shared by the discrete contact simulation crates.
//!
//! This crate provides the foundational vocabulary used by every other
//! Layer 0 simulation crate:
//!
//! - **Indices**: [`BodyIndex`], [`JointIndex`], [`TreeIndex`], [`GeometryId`]
//! - **Configuration**: [`DiscreteUpdateConfig`] and its parts
//! - **Errors**: [`SimError`], partitioned into configuration errors, solver
//!   non-convergence and structural invariant violations
//!
//! # Layer 0 Crate
//!
//! This is a Layer 0 crate with **zero Bevy dependencies**. It only depends
//! on `nalgebra` for math and `thiserror` for errors.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::doc_markdown,
    clippy::nonminimal_bool, // `!(x > 0.0)` rejects NaN
    clippy::neg_cmp_op_on_partial_ord
)]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod config;
pub mod error;
pub mod ids;

pub use config::{
    ContactModel, ContactRegularization, CouplerConfig, DiscreteContactSolver,
    DiscreteUpdateConfig, JointLimitConfig, SolverConfig,
};
pub use error::SimError;
pub use ids::{BodyIndex, GeometryId, JointIndex, TreeIndex};

// Re-export nalgebra types used throughout the simulation crates.
pub use nalgebra::{DMatrix, DVector, Matrix3, Point3, Rotation3, UnitVector3, Vector3};

/// Result type for simulation operations.
pub type Result<T> = std::result::Result<T, SimError>;
