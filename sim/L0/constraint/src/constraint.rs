//! Compliant constraints of the SAP problem.
//!
//! Every constraint couples one or two trees through a Jacobian with
//! `num_equations` rows per tree block and carries the value of its
//! constraint function at the previous state. Three kinds exist:
//!
//! - [`ConstraintKind::FrictionCone`]: one compliant point contact, three
//!   equations ordered (t₁, t₂, n).
//! - [`ConstraintKind::Limit`]: unilateral position limits of a single dof,
//!   one equation per finite side.
//! - [`ConstraintKind::Holonomic`]: bilateral `g(q) = 0` with box-bounded
//!   impulses.
//!
//! The solver only talks to the uniform interface: regularization `R`, bias
//! velocity `v̂`, and the projection `γ = P(y)` with its derivative.
//!
//! # Regularization
//!
//! For a compliant equation with stiffness `k` and dissipation time `τ`:
//!
//! ```text
//! R = max(β²/(4π²)·w, 1/(δt·k·(δt + τ)))
//! v̂ = −g₀/(δt + τ)
//! ```
//!
//! where `w` is the Delassus estimate of the constraint. The first term
//! keeps near-rigid constraints well conditioned.

use std::f64::consts::PI;

use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use sim_contact::JacobianTreeBlock;
use sim_types::{Result, SimError, TreeIndex};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Tangential impulse norms below this are smoothed to keep `t̂` finite.
const SOFT_NORM_TOLERANCE: f64 = 1e-7;

/// Parameters of a compliant frictional contact.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FrictionConeParameters {
    /// Coefficient of friction μ.
    pub mu: f64,
    /// Normal stiffness (N/m).
    pub stiffness: f64,
    /// Hunt-Crossley style dissipation time scale τ (s).
    pub dissipation_time_scale: f64,
    /// Near-rigid regime factor β.
    pub beta: f64,
    /// Tangential regularization factor σ, relative to the Delassus estimate.
    pub sigma: f64,
}

/// Parameters of a single-dof limit constraint.
///
/// A side at ±∞ is inactive and contributes no equation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LimitParameters {
    /// Lower position limit, `-∞` if inactive.
    pub lower: f64,
    /// Upper position limit, `+∞` if inactive.
    pub upper: f64,
    /// Limit stiffness.
    pub stiffness: f64,
    /// Dissipation time scale (s).
    pub dissipation_time_scale: f64,
    /// Near-rigid regime factor β.
    pub beta: f64,
}

/// Parameters of a holonomic constraint, one entry per equation.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HolonomicParameters {
    /// Lower impulse bound per equation.
    pub impulse_lower: DVector<f64>,
    /// Upper impulse bound per equation.
    pub impulse_upper: DVector<f64>,
    /// Stiffness per equation, `+∞` for near-rigid.
    pub stiffness: DVector<f64>,
    /// Relaxation time per equation (s).
    pub relaxation_time: DVector<f64>,
    /// Near-rigid regime factor β.
    pub beta: f64,
}

/// Kind-specific data of a [`Constraint`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConstraintKind {
    /// Compliant frictional point contact.
    FrictionCone(FrictionConeParameters),
    /// Position limits of one dof.
    Limit {
        /// Position at the previous step.
        q0: f64,
        /// Limit parameters.
        parameters: LimitParameters,
    },
    /// Bilateral holonomic constraint.
    Holonomic(HolonomicParameters),
}

/// A constraint in the SAP problem.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    kind: ConstraintKind,
    /// Constraint function at the previous state, one entry per equation.
    /// For contacts only the normal entry (φ₀) is meaningful.
    g0: DVector<f64>,
    jacobian: Vec<JacobianTreeBlock>,
}

impl Constraint {
    /// Compliant contact with signed distance `phi0` between the two
    /// geometries at the previous state.
    ///
    /// The Jacobian rows are ordered (t₁, t₂, n) in the contact frame.
    pub fn friction_cone(
        jacobian: Vec<JacobianTreeBlock>,
        phi0: f64,
        parameters: FrictionConeParameters,
    ) -> Result<Self> {
        let p = &parameters;
        if !(p.mu >= 0.0) || !(p.stiffness > 0.0) || !(p.dissipation_time_scale >= 0.0) {
            return Err(SimError::structural(format!(
                "invalid friction cone parameters {p:?}"
            )));
        }
        check_regularization_factors(p.beta, Some(p.sigma))?;
        check_blocks(&jacobian, 3)?;
        Ok(Self {
            kind: ConstraintKind::FrictionCone(parameters),
            g0: DVector::from_vec(vec![0.0, 0.0, phi0]),
            jacobian,
        })
    }

    /// Limit on the dof at local index `tree_dof` of `tree`, which has
    /// `tree_nv` velocities.
    ///
    /// One equation is emitted per finite side, lower first. The lower row
    /// measures `q − q_l` and the upper row `q_u − q`, so positive impulses
    /// push the dof back inside its range.
    pub fn limit(
        tree: TreeIndex,
        tree_dof: usize,
        tree_nv: usize,
        q0: f64,
        parameters: LimitParameters,
    ) -> Result<Self> {
        let p = &parameters;
        if tree_dof >= tree_nv {
            return Err(SimError::invalid_index("tree dof", tree_dof));
        }
        if !(p.lower <= p.upper) || !(p.stiffness > 0.0) || !(p.dissipation_time_scale >= 0.0) {
            return Err(SimError::structural(format!(
                "invalid limit parameters {p:?}"
            )));
        }
        check_regularization_factors(p.beta, None)?;

        let mut g0 = Vec::with_capacity(2);
        let mut signs = Vec::with_capacity(2);
        if p.lower.is_finite() {
            g0.push(q0 - p.lower);
            signs.push(1.0);
        }
        if p.upper.is_finite() {
            g0.push(p.upper - q0);
            signs.push(-1.0);
        }
        if g0.is_empty() {
            return Err(SimError::structural(
                "limit constraint needs at least one finite side",
            ));
        }

        let mut j = DMatrix::zeros(signs.len(), tree_nv);
        for (row, sign) in signs.iter().enumerate() {
            j[(row, tree_dof)] = *sign;
        }
        Ok(Self {
            kind: ConstraintKind::Limit { q0, parameters },
            g0: DVector::from_vec(g0),
            jacobian: vec![JacobianTreeBlock::new(tree, j)],
        })
    }

    /// Holonomic constraint `g(q) = 0` with value `g0` at the previous state.
    pub fn holonomic(
        jacobian: Vec<JacobianTreeBlock>,
        g0: DVector<f64>,
        parameters: HolonomicParameters,
    ) -> Result<Self> {
        let n = g0.len();
        let p = &parameters;
        for (what, len) in [
            ("holonomic impulse_lower", p.impulse_lower.len()),
            ("holonomic impulse_upper", p.impulse_upper.len()),
            ("holonomic stiffness", p.stiffness.len()),
            ("holonomic relaxation_time", p.relaxation_time.len()),
        ] {
            if len != n {
                return Err(SimError::dimension_mismatch(what, n, len));
            }
        }
        for i in 0..n {
            if !(p.impulse_lower[i] <= p.impulse_upper[i])
                || !(p.stiffness[i] > 0.0)
                || !(p.relaxation_time[i] >= 0.0)
            {
                return Err(SimError::structural(format!(
                    "invalid holonomic parameters for equation {i}"
                )));
            }
        }
        check_regularization_factors(p.beta, None)?;
        check_blocks(&jacobian, n)?;
        Ok(Self {
            kind: ConstraintKind::Holonomic(parameters),
            g0,
            jacobian,
        })
    }

    /// Kind-specific data.
    pub fn kind(&self) -> &ConstraintKind {
        &self.kind
    }

    /// Whether this is a contact constraint.
    pub fn is_contact(&self) -> bool {
        matches!(self.kind, ConstraintKind::FrictionCone(_))
    }

    /// Number of scalar equations.
    pub fn num_equations(&self) -> usize {
        self.g0.len()
    }

    /// Constraint function at the previous state.
    pub fn constraint_function(&self) -> &DVector<f64> {
        &self.g0
    }

    /// Jacobian blocks, one per coupled tree.
    pub fn jacobian(&self) -> &[JacobianTreeBlock] {
        &self.jacobian
    }

    /// Number of coupled trees, one or two.
    pub fn num_trees(&self) -> usize {
        self.jacobian.len()
    }

    /// First coupled tree.
    pub fn first_tree(&self) -> TreeIndex {
        self.jacobian[0].tree
    }

    /// Second coupled tree, if any.
    pub fn second_tree(&self) -> Option<TreeIndex> {
        self.jacobian.get(1).map(|b| b.tree)
    }

    /// Diagonal regularization `R` given the Delassus estimate `w`.
    pub(crate) fn regularization(&self, time_step: f64, w: f64) -> DVector<f64> {
        let dt = time_step;
        match &self.kind {
            ConstraintKind::FrictionCone(p) => {
                let rn = compliant_regularization(dt, w, p.stiffness, p.dissipation_time_scale, p.beta);
                let rt = p.sigma * w;
                DVector::from_vec(vec![rt, rt, rn])
            }
            ConstraintKind::Limit { parameters: p, .. } => {
                let r = compliant_regularization(dt, w, p.stiffness, p.dissipation_time_scale, p.beta);
                DVector::from_element(self.num_equations(), r)
            }
            ConstraintKind::Holonomic(p) => DVector::from_fn(self.num_equations(), |i, _| {
                compliant_regularization(dt, w, p.stiffness[i], p.relaxation_time[i], p.beta)
            }),
        }
    }

    /// Bias velocity `v̂` the constraint relaxes towards.
    pub(crate) fn bias(&self, time_step: f64) -> DVector<f64> {
        match &self.kind {
            ConstraintKind::FrictionCone(p) => {
                let vn = -self.g0[2] / (time_step + p.dissipation_time_scale);
                DVector::from_vec(vec![0.0, 0.0, vn])
            }
            ConstraintKind::Limit { parameters: p, .. } => {
                -&self.g0 / (time_step + p.dissipation_time_scale)
            }
            ConstraintKind::Holonomic(p) => DVector::from_fn(self.num_equations(), |i, _| {
                -self.g0[i] / (time_step + p.relaxation_time[i])
            }),
        }
    }

    /// Project `y` onto the feasible impulse set in the norm defined by `R`.
    ///
    /// Returns `γ = P(y)` and `G = ∂P/∂y·R⁻¹`, where `r_inv` holds `R⁻¹`
    /// (zero for rows with infinite `R`).
    pub(crate) fn project(
        &self,
        y: &DVector<f64>,
        r: &DVector<f64>,
        r_inv: &DVector<f64>,
    ) -> (DVector<f64>, DMatrix<f64>) {
        let n = self.num_equations();
        match &self.kind {
            ConstraintKind::FrictionCone(p) => {
                let yv = Vector3::new(y[0], y[1], y[2]);
                let mu_tilde = if r[2].is_finite() && r[2] > 0.0 {
                    p.mu * r[0] / r[2]
                } else {
                    0.0
                };
                let (gamma, dp_dy) = project_friction_cone(&yv, p.mu, mu_tilde);
                let g = dp_dy * Matrix3::from_diagonal(&Vector3::new(r_inv[0], r_inv[1], r_inv[2]));
                (
                    DVector::from_column_slice(gamma.as_slice()),
                    DMatrix::from_column_slice(3, 3, g.as_slice()),
                )
            }
            ConstraintKind::Limit { .. } => {
                let mut gamma = DVector::zeros(n);
                let mut g = DMatrix::zeros(n, n);
                for i in 0..n {
                    if y[i] > 0.0 {
                        gamma[i] = y[i];
                        g[(i, i)] = r_inv[i];
                    }
                }
                (gamma, g)
            }
            ConstraintKind::Holonomic(p) => {
                let mut gamma = DVector::zeros(n);
                let mut g = DMatrix::zeros(n, n);
                for i in 0..n {
                    let (lo, hi) = (p.impulse_lower[i], p.impulse_upper[i]);
                    if y[i] < lo {
                        gamma[i] = lo;
                    } else if y[i] > hi {
                        gamma[i] = hi;
                    } else {
                        gamma[i] = y[i];
                        g[(i, i)] = r_inv[i];
                    }
                }
                (gamma, g)
            }
        }
    }
}

fn compliant_regularization(dt: f64, w: f64, stiffness: f64, tau: f64, beta: f64) -> f64 {
    let near_rigid = beta * beta / (4.0 * PI * PI) * w;
    let compliant = 1.0 / (dt * stiffness * (dt + tau));
    near_rigid.max(compliant)
}

fn check_regularization_factors(beta: f64, sigma: Option<f64>) -> Result<()> {
    if !(beta > 0.0) || sigma.is_some_and(|s| !(s > 0.0)) {
        return Err(SimError::structural(format!(
            "regularization factors must be positive (beta = {beta}, sigma = {sigma:?})"
        )));
    }
    Ok(())
}

fn check_blocks(jacobian: &[JacobianTreeBlock], rows: usize) -> Result<()> {
    match jacobian {
        [a] => check_block_rows(a, rows),
        [a, b] => {
            if a.tree == b.tree {
                return Err(SimError::structural(format!(
                    "both Jacobian blocks reference tree {}",
                    a.tree
                )));
            }
            check_block_rows(a, rows)?;
            check_block_rows(b, rows)
        }
        _ => Err(SimError::structural(format!(
            "a constraint couples one or two trees, got {} blocks",
            jacobian.len()
        ))),
    }
}

fn check_block_rows(block: &JacobianTreeBlock, rows: usize) -> Result<()> {
    if block.jacobian.nrows() != rows {
        return Err(SimError::dimension_mismatch(
            "constraint Jacobian rows",
            rows,
            block.jacobian.nrows(),
        ));
    }
    Ok(())
}

/// Regularized friction cone projection in (t₁, t₂, n) ordering.
///
/// With `μ̃ = μ·Rt/Rn`:
///
/// - stiction, `‖yt‖ ≤ μ·yn`: `γ = y`
/// - separation, `μ̃·‖yt‖ ≤ −yn`: `γ = 0`
/// - sliding: `γn = (yn + μ̃·‖yt‖)/(1 + μ·μ̃)`, `γt = μ·γn·t̂`
///
/// Returns `γ` and `∂γ/∂y`.
fn project_friction_cone(y: &Vector3<f64>, mu: f64, mu_tilde: f64) -> (Vector3<f64>, Matrix3<f64>) {
    let yt = y.xy();
    let yn = y.z;
    let yr = (yt.norm_squared() + SOFT_NORM_TOLERANCE * SOFT_NORM_TOLERANCE).sqrt();

    if yr <= mu * yn {
        return (*y, Matrix3::identity());
    }
    if mu_tilde * yr <= -yn {
        return (Vector3::zeros(), Matrix3::zeros());
    }

    let that = yt / yr;
    let denom = 1.0 + mu * mu_tilde;
    let gn = (yn + mu_tilde * yr) / denom;
    let gt = that * (mu * gn);

    // ∂t̂/∂yt = (I − t̂t̂ᵀ)/‖yt‖
    let p_perp = nalgebra::Matrix2::identity() - that * that.transpose();
    let dgt_dyt = that * that.transpose() * (mu * mu_tilde / denom) + p_perp * (mu * gn / yr);
    let dgt_dyn = that * (mu / denom);
    let dgn_dyt = that.transpose() * (mu_tilde / denom);

    let mut dp = Matrix3::zeros();
    dp.fixed_view_mut::<2, 2>(0, 0).copy_from(&dgt_dyt);
    dp.fixed_view_mut::<2, 1>(0, 2).copy_from(&dgt_dyn);
    dp.fixed_view_mut::<1, 2>(2, 0).copy_from(&dgn_dyt);
    dp[(2, 2)] = 1.0 / denom;

    (Vector3::new(gt.x, gt.y, gn), dp)
}
