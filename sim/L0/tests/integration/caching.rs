//! Assembly order and cache behavior across steps.

use std::rc::Rc;

use nalgebra::{DVector, Isometry3, Vector3};
use sim_constraint::ConstraintKind;
use sim_contact::{CoulombFriction, GeometryRegistry, ProximityProperties};
use sim_discrete::CompliantContactManager;
use sim_multibody::{Body, Joint, MultibodyModelBuilder, UniformGravity};
use sim_tests::{RADIUS, SphereOnGround};
use sim_types::{BodyIndex, DiscreteUpdateConfig};

/// Sphere on ground (velocities 0..3), limited slider (3), coupled disks
/// (4, 5).
fn mixed_scene() -> CompliantContactManager {
    let mut builder = MultibodyModelBuilder::new();
    let ball = builder.add_body(Body::solid_sphere("ball", 1.0, RADIUS));
    let slider = builder.add_body(Body::point_mass("slider", 1.0));
    let disk_a = builder.add_body(Body::solid_sphere("disk_a", 1.0, RADIUS));
    let disk_b = builder.add_body(Body::solid_sphere("disk_b", 1.0, RADIUS));
    builder.add_joint(Joint::translational("free", BodyIndex::WORLD, ball));
    builder.add_joint(
        Joint::prismatic("slide", BodyIndex::WORLD, slider, Vector3::x())
            .at(Vector3::new(0.0, 5.0, 0.0))
            .with_limits(-0.1, 0.1),
    );
    let ja = builder.add_joint(
        Joint::revolute("ja", BodyIndex::WORLD, disk_a, Vector3::z()).at(Vector3::new(5.0, 0.0, 1.0)),
    );
    let jb = builder.add_joint(
        Joint::revolute("jb", BodyIndex::WORLD, disk_b, Vector3::z()).at(Vector3::new(6.0, 0.0, 1.0)),
    );
    builder.add_force_element(UniformGravity::default());

    let props = ProximityProperties::new(0.0, CoulombFriction::uniform(0.3).unwrap());
    let mut geometry = GeometryRegistry::new();
    geometry
        .add_half_space("ground", BodyIndex::WORLD, Isometry3::identity(), props)
        .unwrap();
    geometry
        .add_sphere("ball", ball, Vector3::zeros(), RADIUS, props)
        .unwrap();

    let mut manager = CompliantContactManager::new(
        builder.build().unwrap(),
        geometry,
        DiscreteUpdateConfig::with_time_step(1.0e-2),
    )
    .unwrap();
    manager.add_coupler_constraint(ja, jb, 2.0, 0.0).unwrap();
    manager
}

#[test]
fn test_constraints_assembled_contacts_first() {
    let manager = mixed_scene();
    let mut context = manager.create_default_context();
    context
        .set_positions(&DVector::from_vec(vec![0.0, 0.0, RADIUS - 1e-3, 0.099, 0.0, 0.0]))
        .unwrap();
    context
        .set_velocities(&DVector::from_vec(vec![0.0, 0.0, 0.0, 1.0, 1.0, 0.0]))
        .unwrap();

    let cache = manager.eval_contact_problem(&context).unwrap();
    let problem = &cache.problem;
    assert_eq!(problem.num_trees(), 4);
    assert_eq!(problem.num_contacts(), 1);
    let kinds: Vec<_> = problem
        .constraints()
        .iter()
        .map(|c| match c.kind() {
            ConstraintKind::FrictionCone(_) => "contact",
            ConstraintKind::Limit { .. } => "limit",
            ConstraintKind::Holonomic(_) => "coupler",
        })
        .collect();
    assert_eq!(kinds, ["contact", "limit", "coupler"]);
    assert_eq!(problem.num_constraint_equations(), 3 + 1 + 1);
    assert_eq!(cache.r_wc.len(), 1);

    // Contact generalized forces only touch the sphere's tree.
    let results = manager.eval_contact_solver_results(&context).unwrap();
    assert_eq!(results.num_contacts(), 1);
    assert!(results.tau_contact[2] > 0.0);
    for i in 3..6 {
        assert_eq!(results.tau_contact[i], 0.0);
    }
    assert!(results.v_next[3] < 1.0);
}

#[test]
fn test_stages_recompute_only_when_their_inputs_change() {
    let (manager, _) = SphereOnGround::default().build().unwrap();
    let mut context = manager.create_default_context();
    context
        .set_positions(&DVector::from_vec(vec![0.0, 0.0, RADIUS - 1e-3]))
        .unwrap();

    let kinematics = manager.eval_position_kinematics(&context).unwrap();
    let pairs = manager.eval_discrete_contact_pairs(&context).unwrap();
    let results = manager.eval_contact_solver_results(&context).unwrap();
    assert!(Rc::ptr_eq(
        &results,
        &manager.eval_contact_solver_results(&context).unwrap()
    ));

    // Time only feeds the non-contact forces and what depends on them.
    context.set_time(0.5);
    assert!(Rc::ptr_eq(
        &kinematics,
        &manager.eval_position_kinematics(&context).unwrap()
    ));
    assert!(Rc::ptr_eq(
        &pairs,
        &manager.eval_discrete_contact_pairs(&context).unwrap()
    ));
    let after_time = manager.eval_contact_solver_results(&context).unwrap();
    assert!(!Rc::ptr_eq(&results, &after_time));
    assert_eq!(after_time.v_next, results.v_next);

    // Parameters reach the solver results but not the kinematics.
    context.set_joint_damping(DVector::from_element(3, 5.0)).unwrap();
    let after_damping = manager.eval_contact_solver_results(&context).unwrap();
    assert!(Rc::ptr_eq(
        &kinematics,
        &manager.eval_position_kinematics(&context).unwrap()
    ));
    assert_ne!(after_damping.v_next, results.v_next);
}

#[test]
fn test_cloned_context_starts_with_empty_cache() {
    let (manager, _) = SphereOnGround::default().build().unwrap();
    let context = manager.create_default_context();
    let first = manager.eval_position_kinematics(&context).unwrap();
    let copy = context.clone();
    let second = manager.eval_position_kinematics(&copy).unwrap();
    assert!(!Rc::ptr_eq(&first, &second));
    assert_eq!(first.body_pose(BodyIndex::WORLD), second.body_pose(BodyIndex::WORLD));
}

#[test]
fn test_advance_invalidates_every_stage() {
    let (manager, _) = SphereOnGround::default().build().unwrap();
    let mut context = manager.create_default_context();
    context
        .set_positions(&DVector::from_vec(vec![0.0, 0.0, 0.5]))
        .unwrap();
    let before = manager.eval_position_kinematics(&context).unwrap();
    manager.advance(&mut context).unwrap();
    let after = manager.eval_position_kinematics(&context).unwrap();
    assert!(!Rc::ptr_eq(&before, &after));
    assert!(context.velocities()[2] < 0.0);
}
