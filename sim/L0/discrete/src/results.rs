//! Unpacking of SAP results into per-contact forces and velocities.

use nalgebra::DVector;
use sim_constraint::{ContactProblem, SapSolverResults};
use sim_types::{Result, SimError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Solution of one discrete step.
///
/// Forces are impulses divided by the time step. Per-contact tangential
/// quantities are stacked in pairs `(t₁, t₂)`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactSolverResults {
    /// Next-step generalized velocities.
    pub v_next: DVector<f64>,
    /// Normal force per contact.
    pub normal_forces: DVector<f64>,
    /// Tangential forces, two per contact.
    pub tangential_forces: DVector<f64>,
    /// Normal (separation) velocity per contact.
    pub normal_velocities: DVector<f64>,
    /// Tangential velocities, two per contact.
    pub tangential_velocities: DVector<f64>,
    /// Generalized forces due to contact, `Σ Jᵀ·f`.
    pub tau_contact: DVector<f64>,
}

impl ContactSolverResults {
    /// Number of contacts.
    pub fn num_contacts(&self) -> usize {
        self.normal_forces.len()
    }
}

/// Splits the contact head of the stacked impulses and velocities.
///
/// Relies on contact constraints preceding every other constraint in
/// `problem`, which [`ContactProblem::add_constraint`] enforces.
pub(crate) fn pack_contact_solver_results(
    problem: &ContactProblem,
    results: &SapSolverResults,
    time_step: f64,
) -> Result<ContactSolverResults> {
    let nc = problem.num_contacts();
    let nv = problem.num_velocities();
    if results.gamma.len() < 3 * nc || results.vc.len() < 3 * nc {
        return Err(SimError::dimension_mismatch(
            "contact impulses",
            3 * nc,
            results.gamma.len().min(results.vc.len()),
        ));
    }
    if results.v.len() != nv {
        return Err(SimError::dimension_mismatch("v_next", nv, results.v.len()));
    }

    let mut normal_forces = DVector::zeros(nc);
    let mut tangential_forces = DVector::zeros(2 * nc);
    let mut normal_velocities = DVector::zeros(nc);
    let mut tangential_velocities = DVector::zeros(2 * nc);
    let mut tau_contact = DVector::zeros(nv);

    for (i, constraint) in problem.constraints().iter().take(nc).enumerate() {
        let gamma = results.gamma.fixed_rows::<3>(3 * i);
        let vc = results.vc.fixed_rows::<3>(3 * i);
        tangential_forces[2 * i] = gamma[0] / time_step;
        tangential_forces[2 * i + 1] = gamma[1] / time_step;
        normal_forces[i] = gamma[2] / time_step;
        tangential_velocities[2 * i] = vc[0];
        tangential_velocities[2 * i + 1] = vc[1];
        normal_velocities[i] = vc[2];

        for block in constraint.jacobian() {
            let start = problem.tree_velocities_start(block.tree);
            let n = problem.num_tree_velocities(block.tree);
            let mut tau = tau_contact.rows_mut(start, n);
            tau.gemv_tr(1.0 / time_step, &block.jacobian, &gamma, 1.0);
        }
    }

    Ok(ContactSolverResults {
        v_next: results.v.clone(),
        normal_forces,
        tangential_forces,
        normal_velocities,
        tangential_velocities,
        tau_contact,
    })
}
