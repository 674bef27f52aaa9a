//! Typed indices for bodies, joints, trees and collision geometries.
//!
//! All indices are dense `usize` wrappers into the owning model's arrays,
//! except [`GeometryId`] which is an opaque handle issued by the geometry
//! registry.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

macro_rules! dense_index {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
        pub struct $name(pub usize);

        impl $name {
            /// Create a new index.
            #[must_use]
            pub const fn new(index: usize) -> Self {
                Self(index)
            }

            /// Get the raw index value.
            #[must_use]
            pub const fn index(self) -> usize {
                self.0
            }
        }

        impl From<usize> for $name {
            fn from(index: usize) -> Self {
                Self(index)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }
    };
}

dense_index!(
    /// Index of a rigid body. Body 0 is always the world.
    BodyIndex,
    "Body"
);

dense_index!(
    /// Index of a joint connecting a parent body to a child body.
    JointIndex,
    "Joint"
);

dense_index!(
    /// Index of an independent kinematic tree.
    ///
    /// A tree is the set of bodies and velocities reachable from one
    /// non-weld joint attached to the world. Bodies welded to the world
    /// (including the world itself) belong to no tree; lookups return
    /// `Option<TreeIndex>` and `None` plays the role of an invalid index.
    TreeIndex,
    "Tree"
);

impl BodyIndex {
    /// The world body.
    pub const WORLD: Self = Self(0);

    /// Whether this is the world body.
    #[must_use]
    pub const fn is_world(self) -> bool {
        self.0 == 0
    }
}

/// Opaque identifier of a collision geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GeometryId(pub u64);

impl GeometryId {
    /// Create a new geometry ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for GeometryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Geometry({})", self.0)
    }
}
