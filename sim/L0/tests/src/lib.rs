//! Shared scenes for the end-to-end tests.
//!
//! Each builder returns a ready manager plus the handles a test needs to
//! set up its initial state.

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![warn(missing_docs)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

use nalgebra::{Isometry3, Vector3};
use sim_contact::{CoulombFriction, GeometryRegistry, ProximityProperties};
use sim_discrete::CompliantContactManager;
use sim_multibody::{Body, Joint, MultibodyModelBuilder, UniformGravity};
use sim_types::{BodyIndex, DiscreteUpdateConfig, GeometryId, JointIndex, Result};

/// Radius of every sphere in these scenes.
pub const RADIUS: f64 = 0.1;

/// Contact parameters of a sphere resting on a ground half-space.
#[derive(Debug, Clone, Copy)]
pub struct SphereOnGround {
    /// Sphere mass.
    pub mass: f64,
    /// Combined point stiffness of the pair.
    pub stiffness: f64,
    /// Combined dissipation time.
    pub dissipation_time: f64,
    /// Friction coefficient shared by both geometries.
    pub mu: f64,
    /// Time step.
    pub time_step: f64,
}

impl Default for SphereOnGround {
    fn default() -> Self {
        Self {
            mass: 1.0,
            stiffness: 1.0e3,
            dissipation_time: 0.0,
            mu: 0.0,
            time_step: 1.0e-3,
        }
    }
}

/// Handles into a [`SphereOnGround`] scene.
#[derive(Debug, Clone, Copy)]
pub struct SphereOnGroundIds {
    /// Ground half-space, geometry A of the contact.
    pub ground: GeometryId,
    /// Sphere, geometry B of the contact.
    pub sphere: GeometryId,
    /// Translational joint of the sphere.
    pub joint: JointIndex,
}

impl SphereOnGround {
    /// Build the scene under standard gravity.
    ///
    /// Both geometries get twice the requested stiffness and half the
    /// dissipation time so that the combined pair values match `self`.
    pub fn build(&self) -> Result<(CompliantContactManager, SphereOnGroundIds)> {
        let mut builder = MultibodyModelBuilder::new();
        let ball = builder.add_body(Body::solid_sphere("ball", self.mass, RADIUS));
        let joint = builder.add_joint(Joint::translational("free", BodyIndex::WORLD, ball));
        builder.add_force_element(UniformGravity::default());

        let props = ProximityProperties::new(0.5 * self.dissipation_time, CoulombFriction::uniform(self.mu)?)
            .with_point_stiffness(2.0 * self.stiffness);
        let mut geometry = GeometryRegistry::new();
        let ground = geometry.add_half_space("ground", BodyIndex::WORLD, Isometry3::identity(), props)?;
        let sphere = geometry.add_sphere("ball", ball, Vector3::zeros(), RADIUS, props)?;

        let manager = CompliantContactManager::new(
            builder.build()?,
            geometry,
            DiscreteUpdateConfig::with_time_step(self.time_step),
        )?;
        Ok((manager, SphereOnGroundIds { ground, sphere, joint }))
    }
}

/// Two disks spinning about z, each on its own tree, without geometry.
pub fn two_disks(time_step: f64) -> Result<(CompliantContactManager, JointIndex, JointIndex)> {
    let mut builder = MultibodyModelBuilder::new();
    let a = builder.add_body(Body::solid_sphere("disk_a", 1.0, RADIUS));
    let b = builder.add_body(Body::solid_sphere("disk_b", 1.0, RADIUS));
    let ja = builder.add_joint(Joint::revolute("ja", BodyIndex::WORLD, a, Vector3::z()));
    let jb = builder.add_joint(
        Joint::revolute("jb", BodyIndex::WORLD, b, Vector3::z()).at(Vector3::new(1.0, 0.0, 0.0)),
    );
    let manager = CompliantContactManager::new(
        builder.build()?,
        GeometryRegistry::new(),
        DiscreteUpdateConfig::with_time_step(time_step),
    )?;
    Ok((manager, ja, jb))
}

/// A unit point mass sliding along x between position limits.
pub fn limited_slider(lower: f64, upper: f64, time_step: f64) -> Result<CompliantContactManager> {
    let mut builder = MultibodyModelBuilder::new();
    let slider = builder.add_body(Body::point_mass("slider", 1.0));
    builder.add_joint(
        Joint::prismatic("x", BodyIndex::WORLD, slider, Vector3::x()).with_limits(lower, upper),
    );
    CompliantContactManager::new(
        builder.build()?,
        GeometryRegistry::new(),
        DiscreteUpdateConfig::with_time_step(time_step),
    )
}
