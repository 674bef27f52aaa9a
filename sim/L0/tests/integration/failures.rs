//! Error paths of the discrete update.
//!
//! A failed step must leave the context exactly as it was, and errors must
//! be classified so callers can tell configuration mistakes from solver
//! failures.

use std::rc::Rc;

use nalgebra::{DVector, Isometry3, Vector3};
use sim_contact::{CoulombFriction, GeometryRegistry, ProximityProperties};
use sim_discrete::{ActuationSource, CompliantContactManager, Context, DeformableModel};
use sim_multibody::{Body, Joint, MultibodyModelBuilder};
use sim_tests::{RADIUS, SphereOnGround, two_disks};
use sim_types::{BodyIndex, DiscreteUpdateConfig, Result, SimError};

#[test]
fn test_non_finite_actuation_fails_without_advancing() {
    let (manager, _) = SphereOnGround::default().build().unwrap();
    let mut context = manager.create_default_context();
    context
        .set_positions(&DVector::from_vec(vec![0.0, 0.0, RADIUS - 1e-3]))
        .unwrap();
    context
        .fix_actuation(DVector::from_vec(vec![0.0, 0.0, f64::NAN]))
        .unwrap();
    let state_before = context.discrete_state().clone();

    let err = manager.advance(&mut context).unwrap_err();
    assert!(err.is_solver_failure(), "unexpected error {err}");
    assert!(matches!(err, SimError::SolverFailed { time, .. } if time == 0.0));
    assert_eq!(context.time(), 0.0);
    assert_eq!(context.discrete_state(), &state_before);

    // Recovers once the input is sane again.
    context.clear_actuation();
    manager.advance(&mut context).unwrap();
    assert!(context.time() > 0.0);
}

#[test]
fn test_solver_failure_reports_current_time_and_causes() {
    let (manager, _) = SphereOnGround::default().build().unwrap();
    let mut context = manager.create_default_context();
    context
        .set_positions(&DVector::from_vec(vec![0.0, 0.0, RADIUS - 1e-3]))
        .unwrap();
    for _ in 0..5 {
        manager.advance(&mut context).unwrap();
    }
    let time = context.time();
    assert!(time > 0.0);

    context
        .fix_actuation(DVector::from_vec(vec![0.0, 0.0, f64::NAN]))
        .unwrap();
    let q_before = context.positions().clone_owned();
    let v_before = context.velocities().clone_owned();

    let err = manager.advance(&mut context).unwrap_err();
    match err {
        SimError::SolverFailed { time: failed_at, .. } => assert_eq!(failed_at, time),
        ref other => panic!("expected a solver failure, got {other}"),
    }
    let message = err.to_string();
    assert!(message.contains(&format!("simulation time = {time}")), "{message}");
    assert!(message.contains("actuation values diverged"), "{message}");
    assert!(message.contains("stiff springs"), "{message}");
    assert!(message.contains("ill conditioning"), "{message}");

    assert_eq!(context.time(), time);
    assert_eq!(context.positions().clone_owned(), q_before);
    assert_eq!(context.velocities().clone_owned(), v_before);
}

#[test]
fn test_zero_point_stiffness_is_rejected_before_stepping() {
    let props = ProximityProperties::new(0.0, CoulombFriction::frictionless());
    let mut geometry = GeometryRegistry::new();
    let err = geometry
        .add_half_space(
            "ground",
            BodyIndex::WORLD,
            Isometry3::identity(),
            props.with_point_stiffness(0.0),
        )
        .unwrap_err();
    assert!(err.is_config_error(), "unexpected error {err}");
    assert!(!err.is_structural());
    assert!(matches!(err, SimError::InvalidProperty { ref property, .. } if property == "point_stiffness"));

    // Same for a zero fallback, caught when the manager is built.
    let err = CompliantContactManager::new(
        MultibodyModelBuilder::new().build().unwrap(),
        GeometryRegistry::new(),
        DiscreteUpdateConfig::default().default_contact_stiffness(0.0),
    )
    .unwrap_err();
    assert!(err.is_config_error());
}

/// Actuation that feeds contact forces back into the plant that computes
/// them.
#[derive(Debug)]
struct ContactFeedback {
    manager: Rc<CompliantContactManager>,
}

impl ActuationSource for ContactFeedback {
    fn eval_actuation(&self, context: &Context) -> Result<DVector<f64>> {
        let results = self.manager.eval_contact_solver_results(context)?;
        Ok(-results.tau_contact.clone())
    }
}

#[test]
fn test_actuation_depending_on_contact_results_is_an_algebraic_loop() {
    let (manager, _) = SphereOnGround::default().build().unwrap();
    let manager = Rc::new(manager);
    let mut context = manager.create_default_context();
    context
        .set_positions(&DVector::from_vec(vec![0.0, 0.0, RADIUS - 1e-3]))
        .unwrap();
    context.connect_actuation(Rc::new(ContactFeedback {
        manager: Rc::clone(&manager),
    }));

    let err = manager.advance(&mut context).unwrap_err();
    assert!(matches!(err, SimError::AlgebraicLoop { .. }), "unexpected error {err}");
    assert!(err.is_config_error());
    assert_eq!(context.time(), 0.0);

    // No entry is left marked as in progress, so the next step succeeds.
    context.clear_actuation();
    manager.advance(&mut context).unwrap();
}

#[test]
fn test_context_from_before_a_structural_change_is_rejected() {
    let (mut manager, ja, jb) = two_disks(1e-3).unwrap();
    let before_coupler = manager.create_default_context();
    manager.add_coupler_constraint(ja, jb, 1.0, 0.0).unwrap();
    assert!(
        manager
            .eval_contact_solver_results(&before_coupler)
            .unwrap_err()
            .is_structural()
    );

    let before_deformable = manager.create_default_context();
    manager
        .register_deformable_model(DeformableModel::new("soft", 2))
        .unwrap();
    let mut stale = before_deformable;
    assert!(manager.advance(&mut stale).unwrap_err().is_structural());

    let mut fresh = manager.create_default_context();
    manager.advance(&mut fresh).unwrap();
}

#[test]
fn test_context_of_another_model_is_rejected() {
    let (disks, ..) = two_disks(1e-3).unwrap();
    let (sphere, _) = SphereOnGround::default().build().unwrap();
    let mut context = disks.create_default_context();
    let err = sphere.advance(&mut context).unwrap_err();
    assert!(err.is_structural());
}

#[test]
fn test_missing_friction_is_reported_with_geometry_name() {
    let mut builder = MultibodyModelBuilder::new();
    let ball = builder.add_body(Body::solid_sphere("ball", 1.0, RADIUS));
    builder.add_joint(Joint::translational("free", BodyIndex::WORLD, ball));
    let mut geometry = GeometryRegistry::new();
    let incomplete = ProximityProperties {
        relaxation_time: Some(0.0),
        ..ProximityProperties::default()
    };
    geometry
        .add_half_space("ground", BodyIndex::WORLD, Isometry3::identity(), incomplete)
        .unwrap();
    geometry
        .add_sphere("ball", ball, Vector3::zeros(), RADIUS, incomplete)
        .unwrap();
    let manager =
        CompliantContactManager::new(builder.build().unwrap(), geometry, DiscreteUpdateConfig::default())
            .unwrap();

    let mut context = manager.create_default_context();
    context
        .set_positions(&DVector::from_vec(vec![0.0, 0.0, RADIUS - 1e-3]))
        .unwrap();
    let err = manager.advance(&mut context).unwrap_err();
    assert!(err.is_config_error());
    assert!(matches!(err, SimError::MissingProperty { ref property, .. } if property == "friction"));
}

#[test]
fn test_invalid_time_step_rejected() {
    let err = CompliantContactManager::new(
        MultibodyModelBuilder::new().build().unwrap(),
        GeometryRegistry::new(),
        DiscreteUpdateConfig::with_time_step(0.0),
    )
    .unwrap_err();
    assert!(err.is_config_error());
}
