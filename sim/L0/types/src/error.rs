//! Error types for discrete contact simulation.
//!
//! Errors fall into three families:
//!
//! - **Configuration errors**: the model, its materials or its settings
//!   cannot be simulated as given. Fatal, never retried.
//! - **Numerical non-convergence**: the velocity-level solver did not
//!   converge for the current step. Fatal at the step level; the caller may
//!   retry with different parameters.
//! - **Structural invariants**: violated buffer sizes or topology
//!   assumptions. These indicate an integration bug upstream, not bad input.
//!
//! Every error aborts the current step; no partial state is committed.

use thiserror::Error;

/// Errors that can occur while computing a discrete update.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SimError {
    /// A required material property is absent from a geometry's proximity
    /// properties.
    #[error("missing required property '{property}'. {context}")]
    MissingProperty {
        /// Name of the missing property.
        property: String,
        /// Which geometry/body the property was requested for.
        context: String,
    },

    /// A material property holds a value outside its valid range.
    #[error("invalid property '{property}' = {value}: {reason}. {context}")]
    InvalidProperty {
        /// Name of the property.
        property: String,
        /// The offending value.
        value: f64,
        /// Why the value is rejected.
        reason: String,
        /// Which geometry/body the property was requested for.
        context: String,
    },

    /// Position limits on a joint with more than one degree of freedom.
    #[error(
        "limits for joints with more than one degree of freedom are not supported \
         (joint '{joint}'). A new multi-dof joint type with limits requires the \
         limit constraint assembly to be extended"
    )]
    UnsupportedJointLimits {
        /// Name of the offending joint.
        joint: String,
    },

    /// A physical model of a kind that may only be registered once was
    /// registered again.
    #[error("a {model} model has already been registered; repeated registration is not allowed")]
    DuplicateModel {
        /// Kind of the model.
        model: String,
    },

    /// The selected discrete contact solver is not supported.
    #[error("discrete contact solver '{solver}' is not supported by the compliant contact manager")]
    UnsupportedSolver {
        /// Name of the requested solver.
        solver: String,
    },

    /// Invalid time step.
    #[error("invalid time step: {0} (must be positive and finite)")]
    InvalidTimestep(f64),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// A cached quantity was requested while it was being computed.
    #[error(
        "algebraic loop detected while evaluating '{entry}'. The quantity depends on \
         itself, most likely through an input that depends on contact results; \
         cyclic force dependencies are not supported"
    )]
    AlgebraicLoop {
        /// Name of the cache entry that was re-entered.
        entry: String,
    },

    /// The velocity-level solver failed to converge.
    #[error(
        "the contact solver failed to converge at simulation time = {time}. \
         Reasons for divergence and possible solutions include:\n\
         \x20 1. Externally applied actuation values diverged due to reasons external \
         to the solver. Revise your control logic.\n\
         \x20 2. Force elements such as stiff springs can lead to unstable temporal \
         dynamics. Revise your model and consider modeling these forces as \
         compliant constraints instead.\n\
         \x20 3. Numerical ill conditioning of the model caused by, for instance, \
         extremely large mass ratios. Consider removing very small objects or \
         welding them to larger ones.\n\
         \x20 4. Some other cause ({detail})."
    )]
    SolverFailed {
        /// Simulation time of the failed step.
        time: f64,
        /// Solver-side detail (iterations, residual, non-finite input).
        detail: String,
    },

    /// A linear system that must be positive definite was not.
    #[error("matrix is not positive definite: {what}")]
    NotPositiveDefinite {
        /// Which matrix failed to factor.
        what: String,
    },

    /// Buffer or matrix of unexpected size.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// What was being sized.
        what: String,
        /// Expected size.
        expected: usize,
        /// Actual size.
        actual: usize,
    },

    /// Index out of range for the owning collection.
    #[error("invalid {kind} index {index}")]
    InvalidIndex {
        /// Kind of index (body, joint, tree, geometry).
        kind: String,
        /// The raw index value.
        index: u64,
    },

    /// Violated topology or assembly invariant.
    #[error("internal invariant violated: {reason}")]
    Structural {
        /// Description of the violated invariant.
        reason: String,
    },
}

impl SimError {
    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a structural invariant error.
    #[must_use]
    pub fn structural(reason: impl Into<String>) -> Self {
        Self::Structural {
            reason: reason.into(),
        }
    }

    /// Create a missing property error.
    #[must_use]
    pub fn missing_property(property: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingProperty {
            property: property.into(),
            context: context.into(),
        }
    }

    /// Create a solver failure error for the step at `time`.
    #[must_use]
    pub fn solver_failed(time: f64, detail: impl Into<String>) -> Self {
        Self::SolverFailed {
            time,
            detail: detail.into(),
        }
    }

    /// Create a dimension mismatch error.
    #[must_use]
    pub fn dimension_mismatch(what: impl Into<String>, expected: usize, actual: usize) -> Self {
        Self::DimensionMismatch {
            what: what.into(),
            expected,
            actual,
        }
    }

    /// Create an invalid index error.
    #[must_use]
    pub fn invalid_index(kind: impl Into<String>, index: usize) -> Self {
        Self::InvalidIndex {
            kind: kind.into(),
            index: index as u64,
        }
    }

    /// Check if this is a configuration error.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::MissingProperty { .. }
                | Self::InvalidProperty { .. }
                | Self::UnsupportedJointLimits { .. }
                | Self::DuplicateModel { .. }
                | Self::UnsupportedSolver { .. }
                | Self::InvalidTimestep(_)
                | Self::InvalidConfig { .. }
                | Self::AlgebraicLoop { .. }
        )
    }

    /// Check if this is a solver non-convergence error.
    #[must_use]
    pub fn is_solver_failure(&self) -> bool {
        matches!(self, Self::SolverFailed { .. })
    }

    /// Check if this is a structural invariant violation.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::Structural { .. } | Self::DimensionMismatch { .. } | Self::InvalidIndex { .. }
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SimError::missing_property("friction", "For geometry 'ball' on body 'sphere'.");
        let msg = err.to_string();
        assert!(msg.contains("friction"));
        assert!(msg.contains("ball"));

        let err = SimError::InvalidProperty {
            property: "relaxation_time".into(),
            value: -0.5,
            reason: "must be non-negative".into(),
            context: String::new(),
        };
        assert!(err.to_string().contains("-0.5"));
    }

    #[test]
    fn test_solver_failure_mentions_time() {
        let err = SimError::solver_failed(1.25, "non-finite free motion velocity");
        let msg = err.to_string();
        assert!(msg.contains("1.25"));
        assert!(msg.contains("actuation"));
        assert!(msg.contains("non-finite"));
        assert!(err.is_solver_failure());
        assert!(!err.is_config_error());
    }

    #[test]
    fn test_error_predicates() {
        assert!(SimError::invalid_config("bad").is_config_error());
        assert!(
            SimError::AlgebraicLoop {
                entry: "x".into()
            }
            .is_config_error()
        );
        assert!(SimError::structural("no tree").is_structural());
        assert!(SimError::dimension_mismatch("v0", 3, 2).is_structural());
        assert!(SimError::invalid_index("body", 9).is_structural());
        assert!(!SimError::structural("no tree").is_config_error());
    }
}
