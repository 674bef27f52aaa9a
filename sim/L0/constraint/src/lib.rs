//! SAP contact problem and solver.
//!
//! This crate formulates one discrete step as a convex optimization over the
//! next-step generalized velocities and solves it:
//!
//! - **Constraints**: [`Constraint`] with compliant frictional contacts, joint
//!   limits and holonomic (coupler) constraints, each coupling one or two
//!   trees through per-tree Jacobian blocks
//! - **Problem**: [`ContactProblem`] holding per-tree dynamics matrices, the
//!   free-motion velocities and the ordered constraint list
//! - **Solver**: [`SapSolver`], a Newton method with backtracking line search
//!   on the regularized primal cost
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
    clippy::cast_precision_loss,
    clippy::nonminimal_bool, // `!(x > 0.0)` rejects NaN
    clippy::neg_cmp_op_on_partial_ord
)]
#![cfg_attr(test, allow(clippy::float_cmp))]

pub mod constraint;
pub mod problem;
pub mod sap;

pub use constraint::{
    Constraint, ConstraintKind, FrictionConeParameters, HolonomicParameters, LimitParameters,
};
pub use problem::ContactProblem;
pub use sap::{SapSolver, SapSolverResults, SapSolverStatus};
