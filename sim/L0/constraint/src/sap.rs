//! Semi-Analytic Primal (SAP) solver.
//!
//! Minimizes the strictly convex cost
//!
//! ```text
//! ℓ(v) = ½‖v − v*‖²_A + Σᵢ ½γᵢᵀRᵢγᵢ,   γᵢ = Pᵢ(yᵢ),   yᵢ = −Rᵢ⁻¹(Jᵢv − v̂ᵢ)
//! ```
//!
//! with Newton's method and a backtracking line search. The gradient and
//! Hessian are
//!
//! ```text
//! ∇ℓ = A(v − v*) − Jᵀγ
//! H  = A + JᵀGJ,   G = ∂P/∂y·R⁻¹
//! ```
//!
//! Convergence is measured on the momentum residual scaled by
//! `D = diag(A)^(-1/2)`:
//!
//! ```text
//! ‖D·∇ℓ‖ ≤ ε_abs + ε_rel·max(‖D·A·v‖, ‖D·Jᵀγ‖)
//! ```

use nalgebra::{DMatrix, DVector};
use sim_multibody::linalg::{cholesky_in_place, cholesky_solve_in_place};
use sim_types::{Result, SimError, SolverConfig};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::problem::ContactProblem;

/// Outcome of a SAP solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SapSolverStatus {
    /// The residual met the tolerance.
    Success,
    /// A non-finite value appeared in the problem data or an iterate.
    NonFinite,
    /// The Newton Hessian or a tree dynamics matrix failed to factor.
    CholeskyFailed,
    /// The iteration budget ran out first.
    MaxIterationsExceeded,
}

impl SapSolverStatus {
    /// Whether the solve converged.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

/// Solution and statistics of a SAP solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SapSolverResults {
    /// Next-step generalized velocities. On failure, the last iterate.
    pub v: DVector<f64>,
    /// Stacked constraint impulses, in constraint order.
    pub gamma: DVector<f64>,
    /// Stacked constraint velocities `J·v`, in constraint order.
    pub vc: DVector<f64>,
    /// Solve outcome.
    pub status: SapSolverStatus,
    /// Newton iterations performed.
    pub iterations: usize,
    /// Total backtracking steps over all line searches.
    pub line_search_iterations: usize,
    /// Cost at `v`.
    pub cost: f64,
    /// Scaled momentum residual at `v`.
    pub residual: f64,
}

/// SAP convex solver.
#[derive(Debug, Clone, Default)]
pub struct SapSolver {
    config: SolverConfig,
}

impl SapSolver {
    /// Create a solver with the given parameters.
    #[must_use]
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Solver parameters.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve `problem` starting from `v_guess`.
    ///
    /// Numerical failure is reported through [`SapSolverResults::status`];
    /// an `Err` means `v_guess` does not match the problem.
    pub fn solve_with_guess(
        &self,
        problem: &ContactProblem,
        v_guess: &DVector<f64>,
    ) -> Result<SapSolverResults> {
        let nv = problem.num_velocities();
        if v_guess.len() != nv {
            return Err(SimError::dimension_mismatch("velocity guess", nv, v_guess.len()));
        }

        let Some(model) = SapModel::new(problem) else {
            tracing::warn!("SAP: tree dynamics matrix is not positive definite");
            return Ok(self.failed(problem, v_guess, SapSolverStatus::CholeskyFailed));
        };
        if !model.is_finite() || !all_finite(v_guess) {
            tracing::warn!("SAP: non-finite problem data");
            return Ok(self.failed(problem, v_guess, SapSolverStatus::NonFinite));
        }

        let cfg = &self.config;
        let mut v = v_guess.clone();
        let mut eval = model.evaluate(&v);
        let mut iterations = 0;
        let mut line_search_iterations = 0;

        // === NEWTON ITERATIONS ===
        let status = loop {
            if !eval.is_finite() {
                break SapSolverStatus::NonFinite;
            }
            let scale = model.momentum_scale(&v, &eval);
            let residual = model.scaled_residual(&eval);
            if residual <= cfg.abs_tolerance + cfg.rel_tolerance * scale {
                break SapSolverStatus::Success;
            }
            if iterations >= cfg.max_iterations {
                break SapSolverStatus::MaxIterationsExceeded;
            }

            let mut h = model.hessian(&eval);
            if cholesky_in_place(&mut h, "SAP Hessian").is_err() {
                break SapSolverStatus::CholeskyFailed;
            }
            let mut dv = -&eval.gradient;
            cholesky_solve_in_place(&h, &mut dv);

            // Armijo backtracking. The last trial is taken even if the
            // condition never holds.
            let slope = eval.gradient.dot(&dv);
            let mut alpha = 1.0;
            let mut trial = model.evaluate(&(&v + &dv));
            let mut ls = 0;
            while !(trial.cost <= eval.cost + cfg.armijo_c * alpha * slope)
                && ls < cfg.line_search_max_iterations
            {
                alpha *= cfg.backtracking_rho;
                trial = model.evaluate(&(&v + &dv * alpha));
                ls += 1;
            }
            line_search_iterations += ls;

            v += &dv * alpha;
            eval = trial;
            iterations += 1;
        };

        let residual = model.scaled_residual(&eval);
        match status {
            SapSolverStatus::Success => tracing::debug!(
                iterations,
                line_search_iterations,
                cost = eval.cost,
                residual,
                "SAP converged"
            ),
            _ => tracing::warn!(?status, iterations, residual, "SAP failed"),
        }

        Ok(SapSolverResults {
            v,
            gamma: eval.gamma,
            vc: eval.vc,
            status,
            iterations,
            line_search_iterations,
            cost: eval.cost,
            residual,
        })
    }

    fn failed(
        &self,
        problem: &ContactProblem,
        v_guess: &DVector<f64>,
        status: SapSolverStatus,
    ) -> SapSolverResults {
        let m = problem.num_constraint_equations();
        SapSolverResults {
            v: v_guess.clone(),
            gamma: DVector::zeros(m),
            vc: DVector::zeros(m),
            status,
            iterations: 0,
            line_search_iterations: 0,
            cost: f64::NAN,
            residual: f64::NAN,
        }
    }
}

fn all_finite(x: &DVector<f64>) -> bool {
    x.iter().all(|v| v.is_finite())
}

/// Dense, solver-ready view of a [`ContactProblem`].
struct SapModel<'a> {
    problem: &'a ContactProblem,
    a: DMatrix<f64>,
    j: DMatrix<f64>,
    /// `diag(A)^(-1/2)`.
    d: DVector<f64>,
    r: DVector<f64>,
    r_inv: DVector<f64>,
    v_hat: DVector<f64>,
    /// First row of each constraint.
    offsets: Vec<usize>,
}

struct Evaluation {
    vc: DVector<f64>,
    gamma: DVector<f64>,
    /// Per-constraint `G` blocks.
    g: Vec<DMatrix<f64>>,
    cost: f64,
    gradient: DVector<f64>,
}

impl Evaluation {
    fn is_finite(&self) -> bool {
        self.cost.is_finite() && all_finite(&self.gradient)
    }
}

impl<'a> SapModel<'a> {
    /// `None` if a tree dynamics matrix is not positive definite.
    fn new(problem: &'a ContactProblem) -> Option<Self> {
        let dt = problem.time_step();
        let a = problem.assemble_dynamics();
        let j = problem.assemble_jacobian();
        let d = a.diagonal().map(|x| 1.0 / x.sqrt());

        let mut factors = Vec::with_capacity(problem.num_trees());
        for at in problem.dynamics_matrix() {
            let mut l = at.clone();
            cholesky_in_place(&mut l, "tree dynamics matrix").ok()?;
            factors.push(l);
        }

        let m = problem.num_constraint_equations();
        let mut r = DVector::zeros(m);
        let mut v_hat = DVector::zeros(m);
        let mut offsets = Vec::with_capacity(problem.num_constraints());
        let mut row = 0;
        for c in problem.constraints() {
            let n = c.num_equations();
            // Delassus estimate w = ‖J·A⁻¹·Jᵀ‖_F / n
            let mut w_mat = DMatrix::zeros(n, n);
            for block in c.jacobian() {
                let l = &factors[block.tree.index()];
                let mut a_inv_jt = block.jacobian.transpose();
                for mut col in a_inv_jt.column_iter_mut() {
                    let mut x = DVector::from_iterator(col.len(), col.iter().copied());
                    cholesky_solve_in_place(l, &mut x);
                    col.copy_from(&x);
                }
                w_mat += &block.jacobian * a_inv_jt;
            }
            let w = w_mat.norm() / n as f64;

            r.rows_mut(row, n).copy_from(&c.regularization(dt, w));
            v_hat.rows_mut(row, n).copy_from(&c.bias(dt));
            offsets.push(row);
            row += n;
        }
        let r_inv = r.map(|x| if x.is_finite() { 1.0 / x } else { 0.0 });

        Some(Self {
            problem,
            a,
            j,
            d,
            r,
            r_inv,
            v_hat,
            offsets,
        })
    }

    fn is_finite(&self) -> bool {
        all_finite(self.problem.v_star())
            && self.a.iter().all(|x| x.is_finite())
            && self.j.iter().all(|x| x.is_finite())
            && all_finite(&self.v_hat)
            && self.r.iter().all(|x| !x.is_nan())
    }

    fn evaluate(&self, v: &DVector<f64>) -> Evaluation {
        let vc = &self.j * v;
        let m = vc.len();
        let mut gamma = DVector::zeros(m);
        let mut g = Vec::with_capacity(self.offsets.len());
        let mut cost = 0.0;

        for (c, &start) in self.problem.constraints().iter().zip(&self.offsets) {
            let n = c.num_equations();
            let r = self.r.rows(start, n).into_owned();
            let r_inv = self.r_inv.rows(start, n).into_owned();
            let y = -(vc.rows(start, n) - self.v_hat.rows(start, n)).component_mul(&r_inv);
            let (gamma_c, g_c) = c.project(&y, &r, &r_inv);
            for i in 0..n {
                if r_inv[i] > 0.0 {
                    cost += 0.5 * r[i] * gamma_c[i] * gamma_c[i];
                }
            }
            gamma.rows_mut(start, n).copy_from(&gamma_c);
            g.push(g_c);
        }

        let dv = v - self.problem.v_star();
        let a_dv = &self.a * &dv;
        cost += 0.5 * dv.dot(&a_dv);
        let gradient = a_dv - self.j.tr_mul(&gamma);

        Evaluation {
            vc,
            gamma,
            g,
            cost,
            gradient,
        }
    }

    fn hessian(&self, eval: &Evaluation) -> DMatrix<f64> {
        let mut h = self.a.clone();
        for (g_c, &start) in eval.g.iter().zip(&self.offsets) {
            let n = g_c.nrows();
            let jc = self.j.rows(start, n);
            h += jc.transpose() * g_c * jc;
        }
        h
    }

    fn scaled_residual(&self, eval: &Evaluation) -> f64 {
        eval.gradient.component_mul(&self.d).norm()
    }

    fn momentum_scale(&self, v: &DVector<f64>, eval: &Evaluation) -> f64 {
        let p = (&self.a * v).component_mul(&self.d).norm();
        let jc = self.j.tr_mul(&eval.gamma).component_mul(&self.d).norm();
        p.max(jc)
    }
}
