//! Sphere on a ground half-space.
//!
//! With a frictionless contact, zero dissipation and the sphere at rest, the
//! normal equation of the SAP problem reduces to
//!
//! ```text
//! m·(v − v*) = δt·k·(d − δt·v)   ⇒   v = (m·v* + δt·k·d)/(m + δt²·k)
//! ```
//!
//! where `d` is the penetration depth and `v* = −g·δt`.

use approx::assert_relative_eq;
use nalgebra::{DVector, Vector3};
use sim_multibody::UniformGravity;
use sim_tests::{RADIUS, SphereOnGround};

#[test]
fn test_single_step_matches_closed_form() {
    let scene = SphereOnGround::default();
    let (manager, _) = scene.build().unwrap();
    let (m, k, dt, d) = (scene.mass, scene.stiffness, scene.time_step, 1.0e-3);

    let mut context = manager.create_default_context();
    context
        .set_positions(&DVector::from_vec(vec![0.0, 0.0, RADIUS - d]))
        .unwrap();

    let v_star = manager.calc_free_motion_velocities(&context).unwrap();
    assert_relative_eq!(v_star[2], -UniformGravity::STANDARD * dt, epsilon = 1e-12);

    let results = manager.eval_contact_solver_results(&context).unwrap();
    let expected = (m * v_star[2] + dt * k * d) / (m + dt * dt * k);
    assert_relative_eq!(results.v_next[2], expected, epsilon = 1e-8);
    assert_relative_eq!(results.v_next[0], 0.0, epsilon = 1e-12);
    assert_relative_eq!(results.v_next[1], 0.0, epsilon = 1e-12);

    // The explicit update v0 + dt·(−g + k·d/m) differs from the implicit one
    // by a relative O(dt²·k/m).
    let explicit = dt * (-UniformGravity::STANDARD + k * d / m);
    let eps = dt * dt * k / m;
    assert!(
        (results.v_next[2] - explicit).abs() <= 2.0 * eps * explicit.abs(),
        "implicit {} vs explicit {explicit}",
        results.v_next[2]
    );
    assert!(results.v_next[2] > explicit);

    // Contact force balances the momentum change.
    let fn_expected = m * (results.v_next[2] - v_star[2]) / dt;
    assert_eq!(results.num_contacts(), 1);
    assert_relative_eq!(results.normal_forces[0], fn_expected, epsilon = 1e-5);
    assert_relative_eq!(results.tau_contact[2], fn_expected, epsilon = 1e-5);
    assert_relative_eq!(results.normal_velocities[0], results.v_next[2], epsilon = 1e-12);
}

#[test]
fn test_contact_force_report_in_world_frame() {
    let scene = SphereOnGround::default();
    let (manager, ids) = scene.build().unwrap();
    let mut context = manager.create_default_context();
    context
        .set_positions(&DVector::from_vec(vec![0.2, -0.1, RADIUS - 1.0e-3]))
        .unwrap();

    let reports = manager.calc_contact_force_reports(&context).unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.id_a, ids.ground);
    assert_eq!(report.id_b, ids.sphere);
    assert_relative_eq!(report.normal_w, Vector3::z(), epsilon = 1e-12);

    let results = manager.eval_contact_solver_results(&context).unwrap();
    assert_relative_eq!(
        report.f_bc_w,
        Vector3::new(0.0, 0.0, results.normal_forces[0]),
        epsilon = 1e-9
    );
    assert!(report.f_bc_w.z > 0.0);
    assert_relative_eq!(report.separation_speed, results.v_next[2], epsilon = 1e-12);
    assert_relative_eq!(report.slip_speed, 0.0, epsilon = 1e-9);
}

#[test]
fn test_separated_sphere_falls_freely() {
    let scene = SphereOnGround::default();
    let (manager, _) = scene.build().unwrap();
    let mut context = manager.create_default_context();
    context
        .set_positions(&DVector::from_vec(vec![0.0, 0.0, 1.0]))
        .unwrap();

    assert!(manager.eval_discrete_contact_pairs(&context).unwrap().is_empty());
    let vdot = manager.calc_generalized_accelerations(&context).unwrap();
    assert_relative_eq!(vdot[2], -UniformGravity::STANDARD, epsilon = 1e-9);
    assert!(manager.calc_contact_force_reports(&context).unwrap().is_empty());
}

#[test]
fn test_sphere_settles_at_static_penetration() {
    let scene = SphereOnGround {
        stiffness: 1.0e4,
        dissipation_time: 0.01,
        mu: 0.5,
        ..SphereOnGround::default()
    };
    let (manager, _) = scene.build().unwrap();
    let mut context = manager.create_default_context();
    context
        .set_positions(&DVector::from_vec(vec![0.0, 0.0, RADIUS]))
        .unwrap();

    for _ in 0..2000 {
        manager.advance(&mut context).unwrap();
    }

    let static_penetration = scene.mass * UniformGravity::STANDARD / scene.stiffness;
    assert_relative_eq!(context.positions()[2], RADIUS - static_penetration, epsilon = 1e-4);
    assert!(context.velocities().norm() < 1e-3);
    assert_relative_eq!(context.time(), 2.0, epsilon = 1e-9);
}

#[test]
fn test_sliding_sphere_is_decelerated_by_friction() {
    let scene = SphereOnGround {
        stiffness: 1.0e4,
        dissipation_time: 0.01,
        mu: 0.5,
        ..SphereOnGround::default()
    };
    let (manager, _) = scene.build().unwrap();
    let mut context = manager.create_default_context();
    let penetration = scene.mass * UniformGravity::STANDARD / scene.stiffness;
    context
        .set_positions(&DVector::from_vec(vec![0.0, 0.0, RADIUS - penetration]))
        .unwrap();
    context
        .set_velocities(&DVector::from_vec(vec![1.0, 0.0, 0.0]))
        .unwrap();

    let reports = manager.calc_contact_force_reports(&context).unwrap();
    assert_eq!(reports.len(), 1);
    let f = reports[0].f_bc_w;
    // Friction opposes the slip and stays inside the cone.
    assert!(f.x < 0.0);
    assert!(f.xy().norm() <= 0.5 * f.z * (1.0 + 1e-6));

    for _ in 0..50 {
        manager.advance(&mut context).unwrap();
    }
    let vx = context.velocities()[0];
    assert!(vx < 1.0 && vx > 0.0);
}
