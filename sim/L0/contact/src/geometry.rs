//! Collision geometries attached to bodies, with a primitive point-contact
//! query.
//!
//! Supported pairs: sphere/sphere and sphere/half-space. Pairs of geometries
//! on the same body, and pairs whose bodies are both anchored to the world,
//! are filtered out.

use nalgebra::{Isometry3, Vector3};
use sim_multibody::{MultibodyModel, PositionKinematics};
use sim_types::{BodyIndex, GeometryId, Result, SimError};
use tracing::trace;

use crate::properties::ProximityProperties;
use crate::query::{ContactSurface, GeometryQuery, PenetrationAsPointPair};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Distance below which two sphere centers are considered coincident.
const COINCIDENT_CENTERS: f64 = 1e-12;

/// Collision shape in its geometry frame.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Shape {
    /// Sphere centered at the frame origin.
    Sphere {
        /// Radius (m).
        radius: f64,
    },
    /// Half-space `z ≤ 0`; its outward normal is the frame's +z axis.
    HalfSpace,
}

/// A collision geometry attached to a body.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionGeometry {
    /// Geometry name.
    pub name: String,
    /// Body the geometry is attached to.
    pub body: BodyIndex,
    /// Pose of the geometry frame in the body frame.
    pub pose: Isometry3<f64>,
    /// Shape.
    pub shape: Shape,
    /// Contact material.
    pub properties: ProximityProperties,
}

/// Registry of collision geometries, usable as a [`GeometryQuery`].
///
/// Contact surfaces are supplied externally with
/// [`set_contact_surfaces`](Self::set_contact_surfaces); the registry reports
/// them verbatim.
#[derive(Debug, Clone, Default)]
pub struct GeometryRegistry {
    geometries: Vec<CollisionGeometry>,
    surfaces: Vec<ContactSurface>,
}

impl GeometryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a geometry and return its id.
    ///
    /// Declared proximity properties are range-checked here, so a bad
    /// material is reported at registration rather than mid-step.
    pub fn add(&mut self, geometry: CollisionGeometry) -> Result<GeometryId> {
        geometry.properties.validate(|| {
            format!("For geometry {} on body {}.", geometry.name, geometry.body)
        })?;
        if let Shape::Sphere { radius } = geometry.shape {
            if !(radius > 0.0) || !radius.is_finite() {
                return Err(SimError::invalid_config(format!(
                    "sphere '{}' has invalid radius {radius}",
                    geometry.name
                )));
            }
        }
        self.geometries.push(geometry);
        Ok(GeometryId::new((self.geometries.len() - 1) as u64))
    }

    /// Attach a sphere to `body` at `center` (body frame).
    pub fn add_sphere(
        &mut self,
        name: impl Into<String>,
        body: BodyIndex,
        center: Vector3<f64>,
        radius: f64,
        properties: ProximityProperties,
    ) -> Result<GeometryId> {
        self.add(CollisionGeometry {
            name: name.into(),
            body,
            pose: Isometry3::translation(center.x, center.y, center.z),
            shape: Shape::Sphere { radius },
            properties,
        })
    }

    /// Attach a half-space to `body` with the given pose (its +z axis is the
    /// outward normal).
    pub fn add_half_space(
        &mut self,
        name: impl Into<String>,
        body: BodyIndex,
        pose: Isometry3<f64>,
        properties: ProximityProperties,
    ) -> Result<GeometryId> {
        self.add(CollisionGeometry {
            name: name.into(),
            body,
            pose,
            shape: Shape::HalfSpace,
            properties,
        })
    }

    /// Replace the contact surfaces reported by this registry.
    pub fn set_contact_surfaces(&mut self, surfaces: Vec<ContactSurface>) {
        self.surfaces = surfaces;
    }

    /// Number of geometries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// Geometry by id.
    #[must_use]
    pub fn get(&self, id: GeometryId) -> Option<&CollisionGeometry> {
        usize::try_from(id.raw())
            .ok()
            .and_then(|i| self.geometries.get(i))
    }

    fn world_pose(&self, kinematics: &PositionKinematics, g: &CollisionGeometry) -> Isometry3<f64> {
        kinematics.body_pose(g.body) * g.pose
    }
}

impl GeometryQuery for GeometryRegistry {
    fn body_of(&self, id: GeometryId) -> Option<BodyIndex> {
        self.get(id).map(|g| g.body)
    }

    fn name_of(&self, id: GeometryId) -> Option<&str> {
        self.get(id).map(|g| g.name.as_str())
    }

    fn proximity_properties(&self, id: GeometryId) -> Option<&ProximityProperties> {
        self.get(id).map(|g| &g.properties)
    }

    fn compute_point_pair_penetrations(
        &self,
        model: &MultibodyModel,
        kinematics: &PositionKinematics,
    ) -> Result<Vec<PenetrationAsPointPair>> {
        let topology = model.topology();
        if let Some(g) = self
            .geometries
            .iter()
            .find(|g| g.body.index() >= model.num_bodies())
        {
            return Err(SimError::invalid_index("body", g.body.index()));
        }
        let mut pairs = Vec::new();
        for (i, a) in self.geometries.iter().enumerate() {
            for (j, b) in self.geometries.iter().enumerate().skip(i + 1) {
                if a.body == b.body {
                    continue;
                }
                if topology.body_to_tree(a.body).is_none() && topology.body_to_tree(b.body).is_none()
                {
                    continue;
                }
                let x_wa = self.world_pose(kinematics, a);
                let x_wb = self.world_pose(kinematics, b);
                let id_a = GeometryId::new(i as u64);
                let id_b = GeometryId::new(j as u64);
                if let Some(pair) = penetration(id_a, &a.shape, &x_wa, id_b, &b.shape, &x_wb) {
                    pairs.push(pair);
                }
            }
        }
        trace!(num_pairs = pairs.len(), "point pair penetrations");
        Ok(pairs)
    }

    fn compute_contact_surfaces(
        &self,
        _model: &MultibodyModel,
        _kinematics: &PositionKinematics,
    ) -> Result<Vec<ContactSurface>> {
        Ok(self.surfaces.clone())
    }
}

/// Penetration between two shapes, `None` if they do not overlap or the pair
/// is unsupported.
fn penetration(
    id_a: GeometryId,
    shape_a: &Shape,
    x_wa: &Isometry3<f64>,
    id_b: GeometryId,
    shape_b: &Shape,
    x_wb: &Isometry3<f64>,
) -> Option<PenetrationAsPointPair> {
    match (shape_a, shape_b) {
        (Shape::Sphere { radius: ra }, Shape::Sphere { radius: rb }) => {
            let c_a = x_wa.translation.vector;
            let c_b = x_wb.translation.vector;
            let d = c_a - c_b;
            let dist = d.norm();
            let depth = ra + rb - dist;
            if depth <= 0.0 {
                return None;
            }
            let nhat_ba_w = if dist > COINCIDENT_CENTERS {
                d / dist
            } else {
                Vector3::z()
            };
            Some(PenetrationAsPointPair {
                id_a,
                id_b,
                p_wca: c_a - nhat_ba_w * *ra,
                p_wcb: c_b + nhat_ba_w * *rb,
                nhat_ba_w,
                depth,
            })
        }
        (Shape::HalfSpace, Shape::Sphere { radius }) => {
            let (p_on_half_space, p_on_sphere, n, depth) =
                sphere_half_space(x_wb, *radius, x_wa)?;
            // n points out of the half-space, i.e. from A into B.
            Some(PenetrationAsPointPair {
                id_a,
                id_b,
                p_wca: p_on_half_space,
                p_wcb: p_on_sphere,
                nhat_ba_w: -n,
                depth,
            })
        }
        (Shape::Sphere { radius }, Shape::HalfSpace) => {
            let (p_on_half_space, p_on_sphere, n, depth) =
                sphere_half_space(x_wa, *radius, x_wb)?;
            Some(PenetrationAsPointPair {
                id_a,
                id_b,
                p_wca: p_on_sphere,
                p_wcb: p_on_half_space,
                nhat_ba_w: n,
                depth,
            })
        }
        (Shape::HalfSpace, Shape::HalfSpace) => None,
    }
}

/// Returns (point on half-space boundary deepest in sphere, point on sphere
/// deepest in half-space, outward half-space normal, depth).
fn sphere_half_space(
    x_ws: &Isometry3<f64>,
    radius: f64,
    x_wh: &Isometry3<f64>,
) -> Option<(Vector3<f64>, Vector3<f64>, Vector3<f64>, f64)> {
    let n = x_wh.rotation * Vector3::z();
    let center = x_ws.translation.vector;
    let height = n.dot(&(center - x_wh.translation.vector));
    let depth = radius - height;
    if depth <= 0.0 {
        return None;
    }
    let p_on_sphere = center - n * radius;
    let p_on_half_space = center - n * height;
    Some((p_on_half_space, p_on_sphere, n, depth))
}
