//! Dense Cholesky factorization.
//!
//! Pure math routines with no model dependencies. Forward dynamics uses them
//! to solve each tree's `(M + diag(d))·v̇ = τ` independently; the contact
//! solver factors its Newton Hessian with them.

use nalgebra::{DMatrix, DVector};
use sim_types::{Result, SimError};

/// In-place Cholesky (LL^T) factorization. Overwrites the lower triangle of `m` with L.
/// The upper triangle is left unchanged. Fails with [`SimError::NotPositiveDefinite`]
/// naming `what` if the matrix is not positive definite.
pub fn cholesky_in_place(m: &mut DMatrix<f64>, what: &str) -> Result<()> {
    let n = m.nrows();
    for j in 0..n {
        // L[j,j] = sqrt(M[j,j] - Σ(L[j,k]² for k < j))
        let mut diag = m[(j, j)];
        for k in 0..j {
            diag -= m[(j, k)] * m[(j, k)];
        }
        if !(diag > 0.0) {
            return Err(SimError::NotPositiveDefinite {
                what: what.to_string(),
            });
        }
        let ljj = diag.sqrt();
        m[(j, j)] = ljj;

        // L[i,j] = (M[i,j] - Σ(L[i,k]·L[j,k] for k < j)) / L[j,j]
        for i in (j + 1)..n {
            let mut sum = m[(i, j)];
            for k in 0..j {
                sum -= m[(i, k)] * m[(j, k)];
            }
            m[(i, j)] = sum / ljj;
        }
    }
    Ok(())
}

/// Solve L·L^T·x = b in place, where L is stored in the lower triangle of `l`.
/// On entry `x` contains b; on exit `x` contains the solution.
pub fn cholesky_solve_in_place(l: &DMatrix<f64>, x: &mut DVector<f64>) {
    let n = l.nrows();

    // Forward substitution: L·y = b
    for j in 0..n {
        for k in 0..j {
            x[j] -= l[(j, k)] * x[k];
        }
        x[j] /= l[(j, j)];
    }

    // Back substitution: L^T·z = y
    for j in (0..n).rev() {
        for k in (j + 1)..n {
            x[j] -= l[(k, j)] * x[k];
        }
        x[j] /= l[(j, j)];
    }
}
