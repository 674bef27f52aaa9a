//! Rigid bodies.

use nalgebra::{Matrix3, Vector3};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A rigid body with mass properties expressed in its own frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Body {
    /// Body name, used in diagnostics.
    pub name: String,
    /// Mass (kg).
    pub mass: f64,
    /// Center of mass in the body frame.
    pub com: Vector3<f64>,
    /// Rotational inertia about the center of mass, in the body frame.
    pub inertia: Matrix3<f64>,
}

impl Body {
    /// Create a body with explicit mass properties.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        mass: f64,
        com: Vector3<f64>,
        inertia: Matrix3<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            mass,
            com,
            inertia,
        }
    }

    /// A point mass at the body origin.
    #[must_use]
    pub fn point_mass(name: impl Into<String>, mass: f64) -> Self {
        Self::new(name, mass, Vector3::zeros(), Matrix3::zeros())
    }

    /// A solid sphere centered at the body origin.
    #[must_use]
    pub fn solid_sphere(name: impl Into<String>, mass: f64, radius: f64) -> Self {
        let i = 0.4 * mass * radius * radius;
        Self::new(
            name,
            mass,
            Vector3::zeros(),
            Matrix3::from_diagonal_element(i),
        )
    }

    /// A body with the given principal moments, center of mass at the origin.
    #[must_use]
    pub fn with_principal_inertia(
        name: impl Into<String>,
        mass: f64,
        moments: Vector3<f64>,
    ) -> Self {
        Self::new(
            name,
            mass,
            Vector3::zeros(),
            Matrix3::from_diagonal(&moments),
        )
    }

    /// The world body: massless and immovable.
    #[must_use]
    pub(crate) fn world() -> Self {
        Self::point_mass("world", 0.0)
    }
}
