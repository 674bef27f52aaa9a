//! Coupler constraints between single-dof joints.
//!
//! Two disks with equal inertia coupled by `q_a = 2·q_b`. Starting from
//! `v₀ = (1, 0)` the momentum-preserving projection onto `v_a = 2·v_b` is
//! `(0.8, 0.4)`, which SAP reproduces up to its near-rigid regularization.

use approx::assert_relative_eq;
use nalgebra::DVector;
use sim_constraint::ConstraintKind;
use sim_tests::two_disks;

#[test]
fn test_gear_ratio_projection() {
    let (mut manager, ja, jb) = two_disks(1.0e-3).unwrap();
    manager.add_coupler_constraint(ja, jb, 2.0, 0.0).unwrap();

    let mut context = manager.create_default_context();
    context
        .set_velocities(&DVector::from_vec(vec![1.0, 0.0]))
        .unwrap();
    let results = manager.eval_contact_solver_results(&context).unwrap();
    assert_relative_eq!(results.v_next[0], 0.8, epsilon = 2e-3);
    assert_relative_eq!(results.v_next[1], 0.4, epsilon = 2e-3);
    // No contacts: nothing is reported as contact force.
    assert_eq!(results.num_contacts(), 0);
    assert_eq!(results.tau_contact, DVector::zeros(2));
}

#[test]
fn test_coupler_spans_two_trees() {
    let (mut manager, ja, jb) = two_disks(1.0e-3).unwrap();
    manager.add_coupler_constraint(ja, jb, 2.0, 0.0).unwrap();
    let context = manager.create_default_context();

    let cache = manager.eval_contact_problem(&context).unwrap();
    assert_eq!(cache.problem.num_constraints(), 1);
    let c = cache.problem.constraint(0).unwrap();
    assert!(matches!(c.kind(), ConstraintKind::Holonomic(_)));
    assert_eq!(c.num_trees(), 2);
    assert_eq!(c.jacobian()[0].jacobian[(0, 0)], 1.0);
    assert_eq!(c.jacobian()[1].jacobian[(0, 0)], -2.0);
}

#[test]
fn test_coupled_motion_stays_on_constraint() {
    let (mut manager, ja, jb) = two_disks(1.0e-3).unwrap();
    manager.add_coupler_constraint(ja, jb, 2.0, 0.0).unwrap();
    let mut context = manager.create_default_context();
    context
        .set_velocities(&DVector::from_vec(vec![1.0, 0.0]))
        .unwrap();

    for _ in 0..100 {
        manager.advance(&mut context).unwrap();
    }
    let q = context.positions();
    assert!(q[0] > 0.05);
    assert!((q[0] - 2.0 * q[1]).abs() < 1e-3);
}

#[test]
fn test_offset_violation_is_corrected() {
    let (mut manager, ja, jb) = two_disks(1.0e-3).unwrap();
    manager.add_coupler_constraint(ja, jb, 1.0, 0.05).unwrap();
    let mut context = manager.create_default_context();
    // g₀ = 0.2 − 0 − 0.05
    context
        .set_positions(&DVector::from_vec(vec![0.2, 0.0]))
        .unwrap();

    for _ in 0..50 {
        manager.advance(&mut context).unwrap();
    }
    let q = context.positions();
    let g = q[0] - q[1] - 0.05;
    assert!(g.abs() < 0.01, "constraint violation {g}");
}
