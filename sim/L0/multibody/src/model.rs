//! The multibody model: bodies, joints, force elements and tree topology.

use nalgebra::{DVector, Vector3};
use sim_types::{BodyIndex, JointIndex, Result, SimError, TreeIndex};
use tracing::debug;

use crate::body::Body;
use crate::forces::ForceElement;
use crate::joint::{Joint, JointType};
use crate::topology::TreeTopology;

/// Minimum axis norm accepted for revolute and prismatic joints.
const MIN_AXIS_NORM: f64 = 1e-12;

/// Builder for [`MultibodyModel`].
///
/// Bodies must be added before the joints that reference them, and every
/// joint must connect a parent to a child with a larger body index, so that
/// body order is a valid topological order.
#[derive(Debug)]
pub struct MultibodyModelBuilder {
    bodies: Vec<Body>,
    joints: Vec<Joint>,
    force_elements: Vec<Box<dyn ForceElement>>,
}

impl Default for MultibodyModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultibodyModelBuilder {
    /// Create a builder containing only the world body.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bodies: vec![Body::world()],
            joints: Vec::new(),
            force_elements: Vec::new(),
        }
    }

    /// Add a body. It must be connected by exactly one joint before building.
    pub fn add_body(&mut self, body: Body) -> BodyIndex {
        self.bodies.push(body);
        BodyIndex::new(self.bodies.len() - 1)
    }

    /// Add a joint.
    pub fn add_joint(&mut self, joint: Joint) -> JointIndex {
        self.joints.push(joint);
        JointIndex::new(self.joints.len() - 1)
    }

    /// Add a force element.
    pub fn add_force_element(&mut self, element: impl ForceElement + 'static) {
        self.force_elements.push(Box::new(element));
    }

    /// Validate the model, compute its tree topology and assign velocity
    /// indices.
    pub fn build(self) -> Result<MultibodyModel> {
        let Self {
            bodies,
            mut joints,
            force_elements,
        } = self;
        let num_bodies = bodies.len();

        for body in &bodies {
            if !(body.mass >= 0.0) || !body.mass.is_finite() {
                return Err(SimError::invalid_config(format!(
                    "body '{}' has invalid mass {}",
                    body.name, body.mass
                )));
            }
        }

        let mut inboard: Vec<Option<JointIndex>> = vec![None; num_bodies];
        for (j, joint) in joints.iter_mut().enumerate() {
            validate_joint(joint, num_bodies)?;
            normalize_axis(joint)?;
            let slot = &mut inboard[joint.child.index()];
            if slot.is_some() {
                return Err(SimError::invalid_config(format!(
                    "body {} has more than one inboard joint (joint '{}')",
                    joint.child, joint.name
                )));
            }
            *slot = Some(JointIndex::new(j));
        }
        for (b, slot) in inboard.iter().enumerate().skip(1) {
            if slot.is_none() {
                return Err(SimError::invalid_config(format!(
                    "body '{}' is not connected by any joint",
                    bodies[b].name
                )));
            }
        }

        let topology = compute_topology(&inboard, &mut joints);
        let num_velocities = topology.velocity_to_tree.len();
        debug!(
            bodies = num_bodies,
            joints = joints.len(),
            trees = topology.num_trees(),
            nv = num_velocities,
            "built multibody model"
        );

        let model = MultibodyModel {
            bodies,
            joints,
            inboard,
            force_elements,
            topology,
            num_velocities,
        };
        for element in &model.force_elements {
            element.validate(&model)?;
        }
        Ok(model)
    }
}

fn validate_joint(joint: &Joint, num_bodies: usize) -> Result<()> {
    if joint.parent.index() >= num_bodies {
        return Err(SimError::invalid_index("body", joint.parent.index()));
    }
    if joint.child.index() >= num_bodies {
        return Err(SimError::invalid_index("body", joint.child.index()));
    }
    if joint.parent >= joint.child {
        return Err(SimError::invalid_config(format!(
            "joint '{}' must connect a parent to a child added after it",
            joint.name
        )));
    }
    let nv = joint.num_velocities();
    for (what, len) in [
        ("damping", joint.damping.len()),
        ("reflected_inertia", joint.reflected_inertia.len()),
        ("position_lower_limits", joint.position_lower_limits.len()),
        ("position_upper_limits", joint.position_upper_limits.len()),
    ] {
        if len != nv {
            return Err(SimError::dimension_mismatch(
                format!("joint '{}' {what}", joint.name),
                nv,
                len,
            ));
        }
    }
    if joint.damping.iter().any(|d| !(*d >= 0.0)) {
        return Err(SimError::invalid_config(format!(
            "joint '{}' has negative damping",
            joint.name
        )));
    }
    if joint.reflected_inertia.iter().any(|r| !(*r >= 0.0)) {
        return Err(SimError::invalid_config(format!(
            "joint '{}' has negative reflected inertia",
            joint.name
        )));
    }
    let inverted = joint
        .position_lower_limits
        .iter()
        .zip(&joint.position_upper_limits)
        .any(|(lower, upper)| !(lower <= upper));
    if inverted {
        return Err(SimError::invalid_config(format!(
            "joint '{}' has a lower limit above its upper limit",
            joint.name
        )));
    }
    Ok(())
}

fn normalize_axis(joint: &mut Joint) -> Result<()> {
    let axis = match &mut joint.joint_type {
        JointType::Revolute { axis } | JointType::Prismatic { axis } => axis,
        JointType::Weld | JointType::Translational => return Ok(()),
    };
    let norm = axis.norm();
    if !(norm > MIN_AXIS_NORM) {
        return Err(SimError::invalid_config(format!(
            "joint '{}' has a degenerate axis",
            joint.name
        )));
    }
    *axis /= norm;
    Ok(())
}

/// Assign each body to a tree and lay out tree velocities contiguously.
fn compute_topology(inboard: &[Option<JointIndex>], joints: &mut [Joint]) -> TreeTopology {
    let num_bodies = inboard.len();
    let mut body_to_tree: Vec<Option<TreeIndex>> = vec![None; num_bodies];
    let mut num_trees = 0;

    for b in 1..num_bodies {
        let Some(j) = inboard[b] else { continue };
        let joint = &joints[j.index()];
        body_to_tree[b] = match body_to_tree[joint.parent.index()] {
            Some(tree) => Some(tree),
            None if matches!(joint.joint_type, JointType::Weld) => None,
            None => {
                num_trees += 1;
                Some(TreeIndex::new(num_trees - 1))
            }
        };
    }

    let mut topology = TreeTopology {
        body_to_tree,
        ..Default::default()
    };
    let mut next = 0;
    for t in 0..num_trees {
        let tree = TreeIndex::new(t);
        topology.tree_velocities_start.push(next);
        for b in 1..num_bodies {
            if topology.body_to_tree[b] != Some(tree) {
                continue;
            }
            let Some(j) = inboard[b] else { continue };
            let joint = &mut joints[j.index()];
            joint.velocity_start = next;
            next += joint.num_velocities();
        }
        let count = next - topology.tree_velocities_start[t];
        topology.num_tree_velocities.push(count);
        topology
            .velocity_to_tree
            .extend(std::iter::repeat_n(tree, count));
    }
    topology
}

/// A validated multibody model.
///
/// Generalized positions and velocities share the same indexing: every
/// supported joint has `nq == nv` and `q̇ = v`.
#[derive(Debug)]
pub struct MultibodyModel {
    pub(crate) bodies: Vec<Body>,
    pub(crate) joints: Vec<Joint>,
    pub(crate) inboard: Vec<Option<JointIndex>>,
    pub(crate) force_elements: Vec<Box<dyn ForceElement>>,
    pub(crate) topology: TreeTopology,
    pub(crate) num_velocities: usize,
}

impl MultibodyModel {
    /// Number of bodies, including the world.
    #[must_use]
    pub fn num_bodies(&self) -> usize {
        self.bodies.len()
    }

    /// Number of joints.
    #[must_use]
    pub fn num_joints(&self) -> usize {
        self.joints.len()
    }

    /// Number of generalized velocities.
    #[must_use]
    pub fn num_velocities(&self) -> usize {
        self.num_velocities
    }

    /// Number of generalized positions.
    #[must_use]
    pub fn num_positions(&self) -> usize {
        self.num_velocities
    }

    /// Size of the discrete state `[q; v]`.
    #[must_use]
    pub fn num_states(&self) -> usize {
        self.num_positions() + self.num_velocities()
    }

    /// Body by index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    #[must_use]
    pub fn body(&self, body: BodyIndex) -> &Body {
        &self.bodies[body.index()]
    }

    /// Joint by index.
    ///
    /// # Panics
    ///
    /// Panics if the index is out of range.
    #[must_use]
    pub fn joint(&self, joint: JointIndex) -> &Joint {
        &self.joints[joint.index()]
    }

    /// All joints in index order.
    #[must_use]
    pub fn joints(&self) -> &[Joint] {
        &self.joints
    }

    /// Look up a body by name.
    #[must_use]
    pub fn body_by_name(&self, name: &str) -> Option<BodyIndex> {
        self.bodies
            .iter()
            .position(|b| b.name == name)
            .map(BodyIndex::new)
    }

    /// Look up a joint by name.
    #[must_use]
    pub fn joint_by_name(&self, name: &str) -> Option<JointIndex> {
        self.joints
            .iter()
            .position(|j| j.name == name)
            .map(JointIndex::new)
    }

    /// Joint connecting `body` to its parent, `None` for the world.
    #[must_use]
    pub fn inboard_joint(&self, body: BodyIndex) -> Option<JointIndex> {
        self.inboard.get(body.index()).copied().flatten()
    }

    /// Tree partition.
    #[must_use]
    pub fn topology(&self) -> &TreeTopology {
        &self.topology
    }

    /// Registered force elements.
    #[must_use]
    pub fn force_elements(&self) -> &[Box<dyn ForceElement>] {
        &self.force_elements
    }

    /// Zero positions.
    #[must_use]
    pub fn default_positions(&self) -> DVector<f64> {
        DVector::zeros(self.num_positions())
    }

    /// Per-dof joint damping as declared on the joints.
    #[must_use]
    pub fn default_joint_damping(&self) -> DVector<f64> {
        self.gather_per_dof(|j| &j.damping)
    }

    /// Per-dof reflected inertia as declared on the joints.
    #[must_use]
    pub fn default_reflected_inertia(&self) -> DVector<f64> {
        self.gather_per_dof(|j| &j.reflected_inertia)
    }

    fn gather_per_dof(&self, field: impl Fn(&Joint) -> &Vec<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(self.num_velocities);
        for joint in &self.joints {
            let start = joint.velocity_start;
            for (i, value) in field(joint).iter().enumerate() {
                out[start + i] = *value;
            }
        }
        out
    }

    /// Map generalized velocities to position time derivatives.
    pub fn map_velocity_to_qdot(&self, _q: &DVector<f64>, v: &DVector<f64>) -> Result<DVector<f64>> {
        if v.len() != self.num_velocities {
            return Err(SimError::dimension_mismatch(
                "generalized velocities",
                self.num_velocities,
                v.len(),
            ));
        }
        Ok(v.clone())
    }

    /// Unit axis of a revolute or prismatic joint in its joint frame, `None`
    /// for other joint types.
    #[must_use]
    pub fn joint_axis(&self, joint: JointIndex) -> Option<Vector3<f64>> {
        match self.joint(joint).joint_type {
            JointType::Revolute { axis } | JointType::Prismatic { axis } => Some(axis),
            JointType::Weld | JointType::Translational => None,
        }
    }
}
