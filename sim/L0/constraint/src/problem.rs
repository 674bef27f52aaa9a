//! The SAP contact problem.
//!
//! A problem holds the per-tree linear dynamics matrices `A_t`, the
//! free-motion velocities `v*`, and an ordered list of constraints. All
//! contact constraints come first so that the head `3·nc` entries of the
//! stacked impulses are contact impulses.

use nalgebra::{DMatrix, DVector};
use sim_types::{Result, SimError, TreeIndex};

use crate::constraint::Constraint;

/// Linearized momentum balance plus constraints for one discrete step.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactProblem {
    time_step: f64,
    dynamics: Vec<DMatrix<f64>>,
    v_star: DVector<f64>,
    tree_velocities_start: Vec<usize>,
    constraints: Vec<Constraint>,
    num_contacts: usize,
    num_equations: usize,
}

impl ContactProblem {
    /// Create an empty problem.
    ///
    /// `dynamics[t]` is the square dynamics matrix of tree `t`; the trees'
    /// velocities are laid out contiguously in `v_star`.
    pub fn new(time_step: f64, dynamics: Vec<DMatrix<f64>>, v_star: DVector<f64>) -> Result<Self> {
        if !(time_step > 0.0) {
            return Err(SimError::InvalidTimestep(time_step));
        }
        let mut problem = Self {
            time_step,
            dynamics: Vec::new(),
            v_star: DVector::zeros(0),
            tree_velocities_start: Vec::new(),
            constraints: Vec::new(),
            num_contacts: 0,
            num_equations: 0,
        };
        problem.reset(dynamics, v_star)?;
        Ok(problem)
    }

    /// Replace the dynamics and free-motion velocities and drop all
    /// constraints.
    pub fn reset(&mut self, dynamics: Vec<DMatrix<f64>>, v_star: DVector<f64>) -> Result<()> {
        let mut starts = Vec::with_capacity(dynamics.len());
        let mut nv = 0;
        for a in &dynamics {
            if !a.is_square() {
                return Err(SimError::dimension_mismatch(
                    "tree dynamics matrix columns",
                    a.nrows(),
                    a.ncols(),
                ));
            }
            starts.push(nv);
            nv += a.nrows();
        }
        if v_star.len() != nv {
            return Err(SimError::dimension_mismatch("free-motion velocities", nv, v_star.len()));
        }
        self.dynamics = dynamics;
        self.v_star = v_star;
        self.tree_velocities_start = starts;
        self.constraints.clear();
        self.num_contacts = 0;
        self.num_equations = 0;
        Ok(())
    }

    /// Append a constraint and return its index.
    ///
    /// Contact constraints are rejected once any other kind has been added.
    pub fn add_constraint(&mut self, constraint: Constraint) -> Result<usize> {
        if constraint.is_contact() && self.num_contacts != self.constraints.len() {
            return Err(SimError::structural(
                "contact constraints must be added before any other constraint",
            ));
        }
        for block in constraint.jacobian() {
            let t = block.tree.index();
            if t >= self.num_trees() {
                return Err(SimError::invalid_index("tree", t));
            }
            let nv = self.dynamics[t].nrows();
            if block.jacobian.ncols() != nv {
                return Err(SimError::dimension_mismatch(
                    format!("constraint Jacobian columns for tree {t}"),
                    nv,
                    block.jacobian.ncols(),
                ));
            }
        }
        if constraint.is_contact() {
            self.num_contacts += 1;
        }
        self.num_equations += constraint.num_equations();
        self.constraints.push(constraint);
        Ok(self.constraints.len() - 1)
    }

    /// Discrete time step δt.
    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    /// Number of trees.
    pub fn num_trees(&self) -> usize {
        self.dynamics.len()
    }

    /// Total number of generalized velocities.
    pub fn num_velocities(&self) -> usize {
        self.v_star.len()
    }

    /// Number of constraints of any kind.
    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Number of contact constraints. They occupy indices `0..num_contacts`.
    pub fn num_contacts(&self) -> usize {
        self.num_contacts
    }

    /// Total number of scalar constraint equations.
    pub fn num_constraint_equations(&self) -> usize {
        self.num_equations
    }

    /// All constraints in insertion order.
    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    /// Constraint `i`.
    pub fn constraint(&self, i: usize) -> Option<&Constraint> {
        self.constraints.get(i)
    }

    /// Per-tree dynamics matrices.
    pub fn dynamics_matrix(&self) -> &[DMatrix<f64>] {
        &self.dynamics
    }

    /// Free-motion velocities.
    pub fn v_star(&self) -> &DVector<f64> {
        &self.v_star
    }

    /// First velocity of `tree`.
    pub fn tree_velocities_start(&self, tree: TreeIndex) -> usize {
        self.tree_velocities_start[tree.index()]
    }

    /// Number of velocities of `tree`.
    pub fn num_tree_velocities(&self, tree: TreeIndex) -> usize {
        self.dynamics[tree.index()].nrows()
    }

    /// Block-diagonal dynamics matrix over all velocities.
    pub(crate) fn assemble_dynamics(&self) -> DMatrix<f64> {
        let nv = self.num_velocities();
        let mut a = DMatrix::zeros(nv, nv);
        for (start, at) in self.tree_velocities_start.iter().zip(&self.dynamics) {
            let n = at.nrows();
            a.view_mut((*start, *start), (n, n)).copy_from(at);
        }
        a
    }

    /// Stacked constraint Jacobian over all velocities, rows in constraint
    /// order.
    pub(crate) fn assemble_jacobian(&self) -> DMatrix<f64> {
        let mut j = DMatrix::zeros(self.num_equations, self.num_velocities());
        let mut row = 0;
        for c in &self.constraints {
            let m = c.num_equations();
            for block in c.jacobian() {
                let start = self.tree_velocities_start[block.tree.index()];
                let n = block.jacobian.ncols();
                let mut view = j.view_mut((row, start), (m, n));
                view += &block.jacobian;
            }
            row += m;
        }
        j
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::constraint::{FrictionConeParameters, LimitParameters};
    use sim_contact::JacobianTreeBlock;

    fn contact(tree: usize, nv: usize) -> Constraint {
        Constraint::friction_cone(
            vec![JacobianTreeBlock::new(TreeIndex::new(tree), DMatrix::zeros(3, nv))],
            0.0,
            FrictionConeParameters {
                mu: 0.5,
                stiffness: 1e5,
                dissipation_time_scale: 0.0,
                beta: 1.0,
                sigma: 1e-3,
            },
        )
        .unwrap()
    }

    fn limit(tree: usize, nv: usize) -> Constraint {
        Constraint::limit(
            TreeIndex::new(tree),
            0,
            nv,
            0.0,
            LimitParameters {
                lower: -1.0,
                upper: f64::INFINITY,
                stiffness: 1e12,
                dissipation_time_scale: 1e-3,
                beta: 0.1,
            },
        )
        .unwrap()
    }

    fn two_tree_problem() -> ContactProblem {
        ContactProblem::new(
            1e-3,
            vec![DMatrix::identity(2, 2), DMatrix::identity(3, 3)],
            DVector::zeros(5),
        )
        .unwrap()
    }

    #[test]
    fn test_contacts_first_ordering_guard() {
        let mut problem = two_tree_problem();
        assert_eq!(problem.add_constraint(contact(0, 2)).unwrap(), 0);
        assert_eq!(problem.add_constraint(limit(1, 3)).unwrap(), 1);
        let err = problem.add_constraint(contact(1, 3)).unwrap_err();
        assert!(err.is_structural());
        assert_eq!(problem.num_contacts(), 1);
        assert_eq!(problem.num_constraints(), 2);
        assert_eq!(problem.num_constraint_equations(), 4);
    }

    #[test]
    fn test_tree_layout() {
        let problem = two_tree_problem();
        assert_eq!(problem.num_trees(), 2);
        assert_eq!(problem.num_velocities(), 5);
        assert_eq!(problem.tree_velocities_start(TreeIndex::new(1)), 2);
        assert_eq!(problem.num_tree_velocities(TreeIndex::new(1)), 3);
        let a = problem.assemble_dynamics();
        assert_eq!(a, DMatrix::identity(5, 5));
    }

    #[test]
    fn test_jacobian_column_mismatch_rejected() {
        let mut problem = two_tree_problem();
        let err = problem.add_constraint(contact(0, 3)).unwrap_err();
        assert!(matches!(err, SimError::DimensionMismatch { .. }));
        let err = problem.add_constraint(limit(2, 1)).unwrap_err();
        assert!(matches!(err, SimError::InvalidIndex { .. }));
    }

    #[test]
    fn test_reset_drops_constraints() {
        let mut problem = two_tree_problem();
        problem.add_constraint(contact(0, 2)).unwrap();
        problem
            .reset(vec![DMatrix::identity(1, 1)], DVector::zeros(1))
            .unwrap();
        assert_eq!(problem.num_constraints(), 0);
        assert_eq!(problem.num_contacts(), 0);
        assert!(problem.reset(vec![DMatrix::identity(1, 1)], DVector::zeros(2)).is_err());
    }

    #[test]
    fn test_assembled_jacobian_places_blocks() {
        let mut problem = two_tree_problem();
        problem.add_constraint(limit(1, 3)).unwrap();
        let j = problem.assemble_jacobian();
        assert_eq!(j.nrows(), 1);
        assert_eq!(j[(0, 2)], 1.0);
        assert_eq!(j.row(0).sum(), 1.0);
    }
}
