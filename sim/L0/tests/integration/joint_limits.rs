//! Joint position limits.

use approx::assert_relative_eq;
use nalgebra::DVector;
use sim_tests::limited_slider;

#[test]
fn test_slider_stops_at_upper_limit() {
    let manager = limited_slider(-0.1, 0.1, 1.0e-2).unwrap();
    let mut context = manager.create_default_context();
    context.set_positions(&DVector::from_element(1, 0.09)).unwrap();
    context.set_velocities(&DVector::from_element(1, 1.0)).unwrap();

    for _ in 0..20 {
        manager.advance(&mut context).unwrap();
        assert!(context.positions()[0] <= 0.1 + 1e-5);
    }
    assert!(context.positions()[0] > 0.099);
    assert!(context.velocities()[0].abs() < 1e-2);
}

#[test]
fn test_limit_does_not_pull_a_receding_dof() {
    let manager = limited_slider(-0.1, 0.1, 1.0e-2).unwrap();
    let mut context = manager.create_default_context();
    context.set_positions(&DVector::from_element(1, 0.0999)).unwrap();
    context.set_velocities(&DVector::from_element(1, -1.0)).unwrap();

    // The upper side is inside the window, but moving away needs no impulse.
    let cache = manager.eval_contact_problem(&context).unwrap();
    assert_eq!(cache.problem.num_constraint_equations(), 1);
    let results = manager.eval_contact_solver_results(&context).unwrap();
    assert_relative_eq!(results.v_next[0], -1.0, epsilon = 1e-9);
}

#[test]
fn test_both_sides_active_in_a_narrow_range() {
    let manager = limited_slider(-0.001, 0.001, 1.0e-2).unwrap();
    let mut context = manager.create_default_context();
    context.set_velocities(&DVector::from_element(1, 1.0)).unwrap();

    let cache = manager.eval_contact_problem(&context).unwrap();
    assert_eq!(cache.problem.num_constraints(), 1);
    assert_eq!(cache.problem.num_constraint_equations(), 2);

    manager.advance(&mut context).unwrap();
    assert!(context.positions()[0] <= 0.001 + 1e-5);
}
