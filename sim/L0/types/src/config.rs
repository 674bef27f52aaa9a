//! Configuration types for the discrete update.
//!
//! This module provides configuration types that control how each discrete
//! step is computed: time step, contact model, solver selection, the
//! regularization used to build constraints, and the velocity-level solver
//! tolerances.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Which geometric contact model feeds the discrete contact pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ContactModel {
    /// Penetration point pairs only.
    Point,
    /// Contact surfaces (area contact, one quadrature point per face) only.
    Hydroelastic,
    /// Both: contact surfaces where available, point pairs as fallback.
    /// Point pairs are listed first.
    #[default]
    HydroelasticWithFallback,
}

impl ContactModel {
    /// Whether penetration point pairs are queried.
    #[must_use]
    pub fn uses_point_pairs(self) -> bool {
        matches!(self, Self::Point | Self::HydroelasticWithFallback)
    }

    /// Whether contact surfaces are queried.
    #[must_use]
    pub fn uses_contact_surfaces(self) -> bool {
        matches!(self, Self::Hydroelastic | Self::HydroelasticWithFallback)
    }
}

/// Velocity-level solver used for the discrete update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DiscreteContactSolver {
    /// Semi-analytic primal solver with convex, regularized constraints.
    #[default]
    Sap,
    /// Transition-aware modified semi-implicit solver. Not supported by the
    /// compliant contact manager.
    Tamsi,
}

impl std::fmt::Display for DiscreteContactSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sap => write!(f, "SAP"),
            Self::Tamsi => write!(f, "TAMSI"),
        }
    }
}

/// Regularization parameters for friction-cone constraints.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactRegularization {
    /// Near-rigid parameter. The normal regularization never drops below
    /// `beta² / (4π²) · w`, with `w` the Delassus diagonal estimate.
    pub beta: f64,
    /// Dimensionless tangential regularization, `R_t = sigma · w`.
    pub sigma: f64,
}

impl Default for ContactRegularization {
    fn default() -> Self {
        Self {
            beta: 1.0,
            sigma: 1.0e-3,
        }
    }
}

/// Heuristics and parameters for joint position-limit constraints.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JointLimitConfig {
    /// Size of the look-ahead window around `q0`, in multiples of the
    /// estimated per-step displacement `dt · max(|v0|, |v*|)`. A limit
    /// outside `[q0 - f·Δq, q0 + f·Δq]` is not added to the problem.
    pub window_factor: f64,
    /// Limit stiffness. Very large values place the constraint in the
    /// near-rigid regime.
    pub stiffness: f64,
    /// Near-rigid parameter for limit constraints.
    pub beta: f64,
}

impl Default for JointLimitConfig {
    fn default() -> Self {
        Self {
            window_factor: 2.0,
            stiffness: 1.0e12,
            beta: 0.1,
        }
    }
}

/// Parameters for coupler (holonomic) constraints.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CouplerConfig {
    /// Near-rigid parameter for coupler constraints.
    pub beta: f64,
}

impl Default for CouplerConfig {
    fn default() -> Self {
        Self { beta: 0.1 }
    }
}

/// Configuration for the velocity-level convex solver.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SolverConfig {
    /// Maximum number of Newton iterations.
    pub max_iterations: usize,
    /// Absolute tolerance on the scaled momentum residual.
    pub abs_tolerance: f64,
    /// Relative tolerance on the scaled momentum residual.
    pub rel_tolerance: f64,
    /// Maximum number of backtracking line-search iterations.
    pub line_search_max_iterations: usize,
    /// Armijo sufficient-decrease parameter, in (0, 1).
    pub armijo_c: f64,
    /// Backtracking factor, in (0, 1).
    pub backtracking_rho: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            abs_tolerance: 1.0e-14,
            rel_tolerance: 1.0e-6,
            line_search_max_iterations: 40,
            armijo_c: 1.0e-4,
            backtracking_rho: 0.8,
        }
    }
}

impl SolverConfig {
    /// High-accuracy configuration.
    #[must_use]
    pub fn high_accuracy() -> Self {
        Self {
            max_iterations: 200,
            rel_tolerance: 1.0e-10,
            ..Default::default()
        }
    }

    /// Set the iteration budget.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Set the relative tolerance.
    #[must_use]
    pub const fn with_rel_tolerance(mut self, rel_tolerance: f64) -> Self {
        self.rel_tolerance = rel_tolerance;
        self
    }

    /// Validate the solver configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_iterations == 0 {
            return Err(crate::SimError::invalid_config(
                "max_iterations must be at least 1",
            ));
        }
        if !(self.abs_tolerance >= 0.0) || !(self.rel_tolerance >= 0.0) {
            return Err(crate::SimError::invalid_config(
                "solver tolerances must be non-negative",
            ));
        }
        if !(self.armijo_c > 0.0 && self.armijo_c < 1.0) {
            return Err(crate::SimError::invalid_config(
                "armijo_c must lie in (0, 1)",
            ));
        }
        if !(self.backtracking_rho > 0.0 && self.backtracking_rho < 1.0) {
            return Err(crate::SimError::invalid_config(
                "backtracking_rho must lie in (0, 1)",
            ));
        }
        Ok(())
    }
}

/// Main configuration for the discrete update.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DiscreteUpdateConfig {
    /// Fixed time step (seconds).
    pub time_step: f64,
    /// Contact model selector.
    pub contact_model: ContactModel,
    /// Velocity-level solver selector.
    pub discrete_solver: DiscreteContactSolver,
    /// Point contact stiffness used when a geometry does not declare one (N/m).
    pub default_contact_stiffness: f64,
    /// Friction-cone regularization.
    pub contact_regularization: ContactRegularization,
    /// Joint-limit heuristics and parameters.
    pub joint_limits: JointLimitConfig,
    /// Coupler constraint parameters.
    pub couplers: CouplerConfig,
    /// Convex solver configuration.
    pub solver: SolverConfig,
}

impl Default for DiscreteUpdateConfig {
    fn default() -> Self {
        Self {
            time_step: 1.0e-3,
            contact_model: ContactModel::default(),
            discrete_solver: DiscreteContactSolver::default(),
            default_contact_stiffness: 1.0e5,
            contact_regularization: ContactRegularization::default(),
            joint_limits: JointLimitConfig::default(),
            couplers: CouplerConfig::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl DiscreteUpdateConfig {
    /// Create a configuration with the given time step.
    #[must_use]
    pub fn with_time_step(time_step: f64) -> Self {
        Self {
            time_step,
            ..Default::default()
        }
    }

    /// Set the contact model.
    #[must_use]
    pub fn contact_model(mut self, contact_model: ContactModel) -> Self {
        self.contact_model = contact_model;
        self
    }

    /// Set the discrete contact solver.
    #[must_use]
    pub fn discrete_solver(mut self, solver: DiscreteContactSolver) -> Self {
        self.discrete_solver = solver;
        self
    }

    /// Set the default point contact stiffness.
    #[must_use]
    pub fn default_contact_stiffness(mut self, stiffness: f64) -> Self {
        self.default_contact_stiffness = stiffness;
        self
    }

    /// Set the joint-limit window factor.
    #[must_use]
    pub fn limit_window_factor(mut self, factor: f64) -> Self {
        self.joint_limits.window_factor = factor;
        self
    }

    /// Set the solver configuration.
    #[must_use]
    pub fn solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if !self.time_step.is_finite() || self.time_step <= 0.0 {
            return Err(crate::SimError::InvalidTimestep(self.time_step));
        }
        if !(self.default_contact_stiffness > 0.0) || !self.default_contact_stiffness.is_finite() {
            return Err(crate::SimError::invalid_config(
                "default_contact_stiffness must be finite and positive",
            ));
        }
        let reg = &self.contact_regularization;
        if !(reg.beta > 0.0) || !(reg.sigma > 0.0) {
            return Err(crate::SimError::invalid_config(
                "contact regularization beta and sigma must be positive",
            ));
        }
        let limits = &self.joint_limits;
        if !(limits.window_factor >= 0.0) || !limits.window_factor.is_finite() {
            return Err(crate::SimError::invalid_config(
                "limit window_factor must be finite and non-negative",
            ));
        }
        if !(limits.stiffness > 0.0) || !(limits.beta > 0.0) {
            return Err(crate::SimError::invalid_config(
                "limit stiffness and beta must be positive",
            ));
        }
        if !(self.couplers.beta > 0.0) {
            return Err(crate::SimError::invalid_config(
                "coupler beta must be positive",
            ));
        }
        self.solver.validate()
    }
}
