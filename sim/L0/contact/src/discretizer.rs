//! Conversion of geometric query results into discrete contact pairs.
//!
//! # Point contact
//!
//! Each penetrating pair combines the per-geometry materials:
//!
//! ```text
//! k   = k₁·k₂/(k₁+k₂)          (0 when k₁+k₂ = 0)
//! τ   = τ₁ + τ₂
//! μ   = 2·μ₁·μ₂/(μ₁+μ₂)        (0 when μ₁+μ₂ = 0)
//! p_C = w_A·p_Ca + w_B·p_Cb,   w_A = k_A/(k_A+k_B)   (½ each when both are 0)
//! φ₀  = −depth
//! ```
//!
//! # Area contact
//!
//! Each contact-surface face is one quadrature point at its centroid. With
//! one-sided pressure gradients `g_M = ∇e_M·n̂` and `g_N = −∇e_N·n̂` (infinite
//! for a rigid side):
//!
//! ```text
//! g  = 1/(1/g_M + 1/g_N)
//! k  = A_e·g
//! φ₀ = −p₀/g
//! ```
//!
//! Faces with negligible area or gradient, and faces with `k ≤ 0`, produce no
//! pair.

use nalgebra::{RealField, Vector3};
use sim_multibody::{MultibodyModel, PositionKinematics};
use sim_types::{ContactModel, GeometryId, Result, SimError};
use tracing::trace;

use crate::properties::ProximityProperties;
use crate::query::{ContactSurface, GeometryQuery, PenetrationAsPointPair};

/// Faces with area at or below this value are ignored; their normals are not
/// reliable.
const MIN_FACE_AREA: f64 = 1.0e-14;

/// One-sided pressure gradients below this value produce no constraint.
const MIN_PRESSURE_GRADIENT: f64 = 1.0e-14;

/// One resolved contact between geometries A and B.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscreteContactPair {
    /// First geometry.
    pub id_a: GeometryId,
    /// Second geometry.
    pub id_b: GeometryId,
    /// Contact point, world frame.
    pub p_wc: Vector3<f64>,
    /// Unit normal pointing from B into A, world frame.
    pub nhat_ba_w: Vector3<f64>,
    /// Signed separation, negative when penetrating.
    pub phi0: f64,
    /// Combined normal stiffness.
    pub stiffness: f64,
    /// Combined dissipation time constant.
    pub dissipation_time_constant: f64,
    /// Combined friction coefficient.
    pub friction_coefficient: f64,
}

fn safe_divide<T: RealField>(num: T, denom: T) -> T {
    if denom == T::zero() {
        T::zero()
    } else {
        num / denom
    }
}

/// Series combination of two stiffnesses, `k₁·k₂/(k₁+k₂)`, zero when both
/// are zero.
pub fn combine_stiffnesses<T: RealField>(k1: T, k2: T) -> T {
    safe_divide(k1.clone() * k2.clone(), k1 + k2)
}

/// Dissipation time constants add.
pub fn combine_dissipation_time_constants<T: RealField>(tau1: T, tau2: T) -> T {
    tau1 + tau2
}

/// Combined friction `2·μ₁·μ₂/(μ₁+μ₂)`, zero when both are zero.
pub fn combine_friction_coefficients<T: RealField>(mu1: T, mu2: T) -> T {
    let two = T::one() + T::one();
    safe_divide(two * mu1.clone() * mu2.clone(), mu1 + mu2)
}

/// Builds [`DiscreteContactPair`]s from a [`GeometryQuery`].
#[derive(Debug, Clone, Copy)]
pub struct ContactDiscretizer<'a> {
    query: &'a dyn GeometryQuery,
    model: &'a MultibodyModel,
    default_point_stiffness: f64,
}

impl<'a> ContactDiscretizer<'a> {
    /// Create a discretizer. `default_point_stiffness` is used for geometries
    /// that declare no point stiffness.
    #[must_use]
    pub fn new(
        query: &'a dyn GeometryQuery,
        model: &'a MultibodyModel,
        default_point_stiffness: f64,
    ) -> Self {
        Self {
            query,
            model,
            default_point_stiffness,
        }
    }

    /// All discrete pairs at the given configuration. Point pairs come first
    /// when both contact models are active.
    pub fn calc_discrete_contact_pairs(
        &self,
        kinematics: &PositionKinematics,
        contact_model: ContactModel,
    ) -> Result<Vec<DiscreteContactPair>> {
        let mut pairs = Vec::new();
        if contact_model.uses_point_pairs() {
            let point_pairs = self
                .query
                .compute_point_pair_penetrations(self.model, kinematics)?;
            self.append_point_contact(&point_pairs, &mut pairs)?;
        }
        if contact_model.uses_contact_surfaces() {
            let surfaces = self.query.compute_contact_surfaces(self.model, kinematics)?;
            self.append_area_contact(&surfaces, &mut pairs)?;
        }
        trace!(num_pairs = pairs.len(), "discrete contact pairs");
        Ok(pairs)
    }

    /// Append one pair per penetration.
    pub fn append_point_contact(
        &self,
        point_pairs: &[PenetrationAsPointPair],
        pairs: &mut Vec<DiscreteContactPair>,
    ) -> Result<()> {
        pairs.reserve(point_pairs.len());
        for pair in point_pairs {
            let props_a = self.properties(pair.id_a)?;
            let props_b = self.properties(pair.id_b)?;
            let context_a = || self.describe(pair.id_a);
            let context_b = || self.describe(pair.id_b);
            let k_a = props_a.point_stiffness(self.default_point_stiffness, context_a)?;
            let k_b = props_b.point_stiffness(self.default_point_stiffness, context_b)?;
            let tau = combine_dissipation_time_constants(
                props_a.dissipation_time_constant(context_a)?,
                props_b.dissipation_time_constant(context_b)?,
            );
            let mu = combine_friction_coefficients(
                props_a.dynamic_friction(context_a)?,
                props_b.dynamic_friction(context_b)?,
            );

            // Hertz-like stiffness weighting of the witness points.
            let denom = k_a + k_b;
            let (w_a, w_b) = (k_a / denom, k_b / denom);

            pairs.push(DiscreteContactPair {
                id_a: pair.id_a,
                id_b: pair.id_b,
                p_wc: pair.p_wca * w_a + pair.p_wcb * w_b,
                nhat_ba_w: pair.nhat_ba_w,
                phi0: -pair.depth,
                stiffness: combine_stiffnesses(k_a, k_b),
                dissipation_time_constant: tau,
                friction_coefficient: mu,
            });
        }
        Ok(())
    }

    /// Append one pair per qualifying contact-surface face.
    pub fn append_area_contact(
        &self,
        surfaces: &[ContactSurface],
        pairs: &mut Vec<DiscreteContactPair>,
    ) -> Result<()> {
        for surface in surfaces {
            let props_m = self.properties(surface.id_m)?;
            let props_n = self.properties(surface.id_n)?;
            let context_m = || self.describe(surface.id_m);
            let context_n = || self.describe(surface.id_n);
            let tau = combine_dissipation_time_constants(
                props_m.dissipation_time_constant(context_m)?,
                props_n.dissipation_time_constant(context_n)?,
            );
            let mu = combine_friction_coefficients(
                props_m.dynamic_friction(context_m)?,
                props_n.dynamic_friction(context_n)?,
            );

            for face in &surface.faces {
                if !(face.area > MIN_FACE_AREA) {
                    continue;
                }
                if face.grad_e_m_w.is_none() && face.grad_e_n_w.is_none() {
                    return Err(SimError::structural(format!(
                        "contact surface between {} and {} has no compliant side",
                        surface.id_m, surface.id_n
                    )));
                }
                // Both gradients are positive pointing into their bodies.
                let nhat_w = face.normal_w;
                let g_m = face
                    .grad_e_m_w
                    .map_or(f64::INFINITY, |grad| grad.dot(&nhat_w));
                let g_n = face
                    .grad_e_n_w
                    .map_or(f64::INFINITY, |grad| -grad.dot(&nhat_w));
                if !(g_m >= MIN_PRESSURE_GRADIENT) || !(g_n >= MIN_PRESSURE_GRADIENT) {
                    continue;
                }

                // Equals g_M·g_N/(g_M + g_N), and stays valid when one is infinite.
                let g = 1.0 / (1.0 / g_m + 1.0 / g_n);
                let p0 = face
                    .pressure
                    .at_centroid(surface.mesh_kind, &face.centroid_w)?;
                let k = face.area * g;
                if k > 0.0 {
                    pairs.push(DiscreteContactPair {
                        id_a: surface.id_m,
                        id_b: surface.id_n,
                        p_wc: face.centroid_w,
                        nhat_ba_w: nhat_w,
                        phi0: -p0 / g,
                        stiffness: k,
                        dissipation_time_constant: tau,
                        friction_coefficient: mu,
                    });
                }
            }
        }
        Ok(())
    }

    fn properties(&self, id: GeometryId) -> Result<&'a ProximityProperties> {
        self.query
            .proximity_properties(id)
            .ok_or_else(|| SimError::missing_property("proximity_properties", self.describe(id)))
    }

    /// "For geometry <name> on body <body>." context for error messages.
    fn describe(&self, id: GeometryId) -> String {
        let name = self.query.name_of(id).unwrap_or("<unnamed>");
        let body = self
            .query
            .body_of(id)
            .filter(|b| b.index() < self.model.num_bodies())
            .map_or_else(|| "<unknown>".to_string(), |b| self.model.body(b).name.clone());
        format!("For geometry {name} on body {body}.")
    }
}
