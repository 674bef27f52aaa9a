//! Integration tests for the discrete contact update.
//!
//! These tests drive [`sim_discrete::CompliantContactManager`] end to end:
//! - Compliant point contact against closed-form solutions
//! - Joint limits and couplers assembled next to contacts
//! - Cache invalidation and memoization across steps
//! - Failure modes: solver failure, algebraic loops, stale contexts

pub mod caching;
pub mod couplers;
pub mod failures;
pub mod joint_limits;
pub mod sphere_on_ground;
