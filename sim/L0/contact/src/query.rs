//! Geometric query results and the query interface.
//!
//! Two kinds of results feed the discrete contact pairs:
//!
//! - [`PenetrationAsPointPair`]: one pair of witness points per penetrating
//!   pair of geometries (point contact).
//! - [`ContactSurface`]: a meshed contact patch with per-face area, normal,
//!   centroid and pressure data (area contact).

use nalgebra::Vector3;
use sim_multibody::{MultibodyModel, PositionKinematics};
use sim_types::{BodyIndex, GeometryId, Result, SimError};

use crate::properties::ProximityProperties;

/// Penetration between geometries A and B, reported as two witness points.
#[derive(Debug, Clone, PartialEq)]
pub struct PenetrationAsPointPair {
    /// First geometry.
    pub id_a: GeometryId,
    /// Second geometry.
    pub id_b: GeometryId,
    /// Point on A that lies deepest inside B, world frame.
    pub p_wca: Vector3<f64>,
    /// Point on B that lies deepest inside A, world frame.
    pub p_wcb: Vector3<f64>,
    /// Unit normal pointing from B into A, world frame.
    pub nhat_ba_w: Vector3<f64>,
    /// Penetration depth, positive when penetrating.
    pub depth: f64,
}

/// Representation of a contact surface mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceMeshKind {
    /// Triangle mesh with a piecewise-linear pressure field stored at vertices.
    Triangle,
    /// Polygon mesh with a per-face linear pressure field.
    Polygon,
}

/// Pressure field on one face of a contact surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FacePressure {
    /// Pressure at the three vertices of a triangle.
    Vertices([f64; 3]),
    /// Linear field `p(x) = value + gradient·(x − origin)`.
    Linear {
        /// Pressure at `origin`.
        value: f64,
        /// Point where `value` is sampled, world frame.
        origin: Vector3<f64>,
        /// Pressure gradient along the surface, world frame.
        gradient: Vector3<f64>,
    },
}

impl FacePressure {
    /// Pressure at the face centroid `p_wq`.
    ///
    /// Triangle faces use the fixed centroid barycentric coordinates
    /// `(1/3, 1/3, 1/3)`; polygon faces evaluate the linear field at `p_wq`.
    pub fn at_centroid(&self, kind: SurfaceMeshKind, p_wq: &Vector3<f64>) -> Result<f64> {
        match (kind, self) {
            (SurfaceMeshKind::Triangle, Self::Vertices(p)) => Ok((p[0] + p[1] + p[2]) / 3.0),
            (
                SurfaceMeshKind::Polygon,
                Self::Linear {
                    value,
                    origin,
                    gradient,
                },
            ) => Ok(value + gradient.dot(&(p_wq - origin))),
            _ => Err(SimError::structural(format!(
                "face pressure representation does not match a {kind:?} surface mesh"
            ))),
        }
    }
}

/// One face of a contact surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceFace {
    /// Face area (m²).
    pub area: f64,
    /// Unit face normal, pointing out of N and into M, world frame.
    pub normal_w: Vector3<f64>,
    /// Face centroid, world frame.
    pub centroid_w: Vector3<f64>,
    /// Pressure field on the face.
    pub pressure: FacePressure,
    /// Gradient of M's pressure field, `None` if M is rigid.
    pub grad_e_m_w: Option<Vector3<f64>>,
    /// Gradient of N's pressure field, `None` if N is rigid.
    pub grad_e_n_w: Option<Vector3<f64>>,
}

/// Contact patch between geometries M and N.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactSurface {
    /// First geometry.
    pub id_m: GeometryId,
    /// Second geometry.
    pub id_n: GeometryId,
    /// Mesh representation.
    pub mesh_kind: SurfaceMeshKind,
    /// Faces of the patch.
    pub faces: Vec<SurfaceFace>,
}

impl ContactSurface {
    /// Whether the mesh is a triangle mesh.
    #[must_use]
    pub fn is_triangle(&self) -> bool {
        self.mesh_kind == SurfaceMeshKind::Triangle
    }
}

/// Source of geometric contact data and per-geometry metadata.
pub trait GeometryQuery: std::fmt::Debug {
    /// Body a geometry is attached to.
    fn body_of(&self, id: GeometryId) -> Option<BodyIndex>;

    /// Geometry name, used in diagnostics.
    fn name_of(&self, id: GeometryId) -> Option<&str>;

    /// Contact material of a geometry.
    fn proximity_properties(&self, id: GeometryId) -> Option<&ProximityProperties>;

    /// All penetrating pairs at the given configuration.
    fn compute_point_pair_penetrations(
        &self,
        model: &MultibodyModel,
        kinematics: &PositionKinematics,
    ) -> Result<Vec<PenetrationAsPointPair>>;

    /// All contact surfaces at the given configuration.
    fn compute_contact_surfaces(
        &self,
        _model: &MultibodyModel,
        _kinematics: &PositionKinematics,
    ) -> Result<Vec<ContactSurface>> {
        Ok(Vec::new())
    }
}
