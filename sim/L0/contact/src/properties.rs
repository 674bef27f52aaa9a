//! Per-geometry contact material properties.
//!
//! Each collision geometry carries a [`ProximityProperties`] record. Point
//! stiffness is optional and falls back to a configured default. Relaxation
//! time and Coulomb friction are required whenever the geometry takes part in
//! contact; requesting an absent one is a configuration error.

use sim_types::{Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Coulomb friction coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CoulombFriction {
    static_friction: f64,
    dynamic_friction: f64,
}

impl CoulombFriction {
    /// Create friction coefficients. Requires `static >= dynamic >= 0`.
    pub fn new(static_friction: f64, dynamic_friction: f64) -> Result<Self> {
        if !(dynamic_friction >= 0.0) || !dynamic_friction.is_finite() {
            return Err(SimError::InvalidProperty {
                property: "dynamic_friction".into(),
                value: dynamic_friction,
                reason: "must be finite and non-negative".into(),
                context: String::new(),
            });
        }
        if !(static_friction >= dynamic_friction) || !static_friction.is_finite() {
            return Err(SimError::InvalidProperty {
                property: "static_friction".into(),
                value: static_friction,
                reason: format!("must be finite and at least dynamic_friction = {dynamic_friction}"),
                context: String::new(),
            });
        }
        Ok(Self {
            static_friction,
            dynamic_friction,
        })
    }

    /// Same static and dynamic coefficient.
    pub fn uniform(mu: f64) -> Result<Self> {
        Self::new(mu, mu)
    }

    /// Frictionless contact.
    #[must_use]
    pub const fn frictionless() -> Self {
        Self {
            static_friction: 0.0,
            dynamic_friction: 0.0,
        }
    }

    /// Static coefficient.
    #[must_use]
    pub fn static_friction(&self) -> f64 {
        self.static_friction
    }

    /// Dynamic coefficient.
    #[must_use]
    pub fn dynamic_friction(&self) -> f64 {
        self.dynamic_friction
    }
}

/// Contact material of one collision geometry.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProximityProperties {
    /// Point contact stiffness (N/m). `None` uses the configured default.
    pub point_stiffness: Option<f64>,
    /// Dissipation relaxation time (s).
    pub relaxation_time: Option<f64>,
    /// Coulomb friction.
    pub friction: Option<CoulombFriction>,
}

impl ProximityProperties {
    /// Properties with relaxation time and friction set.
    #[must_use]
    pub fn new(relaxation_time: f64, friction: CoulombFriction) -> Self {
        Self {
            point_stiffness: None,
            relaxation_time: Some(relaxation_time),
            friction: Some(friction),
        }
    }

    /// Set the point contact stiffness.
    #[must_use]
    pub fn with_point_stiffness(mut self, stiffness: f64) -> Self {
        self.point_stiffness = Some(stiffness);
        self
    }

    /// Point stiffness, or `default` when none is declared. `context` names
    /// the geometry in error messages and is only built on failure.
    pub fn point_stiffness(&self, default: f64, context: impl FnOnce() -> String) -> Result<f64> {
        let k = self.point_stiffness.unwrap_or(default);
        if !(k > 0.0) || !k.is_finite() {
            return Err(SimError::InvalidProperty {
                property: "point_stiffness".into(),
                value: k,
                reason: "point stiffness must be finite and positive".into(),
                context: context(),
            });
        }
        Ok(k)
    }

    /// Relaxation time. `context` names the geometry in error messages.
    pub fn dissipation_time_constant(&self, context: impl FnOnce() -> String) -> Result<f64> {
        let Some(tau) = self.relaxation_time else {
            return Err(SimError::missing_property("relaxation_time", context()));
        };
        if !(tau >= 0.0) {
            return Err(SimError::InvalidProperty {
                property: "relaxation_time".into(),
                value: tau,
                reason: "relaxation time must be non-negative".into(),
                context: context(),
            });
        }
        Ok(tau)
    }

    /// Dynamic friction coefficient. `context` names the geometry in error
    /// messages.
    pub fn dynamic_friction(&self, context: impl FnOnce() -> String) -> Result<f64> {
        self.friction
            .map(|f| f.dynamic_friction())
            .ok_or_else(|| SimError::missing_property("friction", context()))
    }

    /// Check the declared values. Absent values are not an error here.
    pub fn validate(&self, context: impl Fn() -> String) -> Result<()> {
        if let Some(k) = self.point_stiffness {
            self.point_stiffness(k, &context)?;
        }
        if self.relaxation_time.is_some() {
            self.dissipation_time_constant(&context)?;
        }
        Ok(())
    }
}
