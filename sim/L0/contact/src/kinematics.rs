//! Per-contact kinematics: contact frame and per-tree Jacobian blocks.
//!
//! For a pair between bodies A and B with contact point C, the relative
//! velocity `v_AcBc = v_Bc − v_Ac` is expressed in a contact frame whose z
//! axis is the normal `n̂ = −n̂_BA` (from A into B):
//!
//! ```text
//! J_AcBc_C = R_WCᵀ·(Jv_WBc − Jv_WAc)
//! ```
//!
//! The columns of each valid tree form one [`JacobianTreeBlock`]. Anchored
//! bodies contribute no block, and a single block is emitted when both bodies
//! share a tree.

use nalgebra::{DMatrix, Matrix3, Rotation3, Vector3};
use sim_multibody::{MultibodyModel, PositionKinematics};
use sim_types::{BodyIndex, GeometryId, Result, SimError, TreeIndex};

use crate::discretizer::DiscreteContactPair;
use crate::query::GeometryQuery;

/// Normals shorter than this produce the identity frame.
const MIN_NORMAL_NORM: f64 = 1e-10;

/// Columns of a constraint Jacobian belonging to one tree.
#[derive(Debug, Clone, PartialEq)]
pub struct JacobianTreeBlock {
    /// Tree the columns belong to.
    pub tree: TreeIndex,
    /// Dense `rows × num_tree_velocities` block.
    pub jacobian: DMatrix<f64>,
}

impl JacobianTreeBlock {
    /// Create a block.
    #[must_use]
    pub fn new(tree: TreeIndex, jacobian: DMatrix<f64>) -> Self {
        Self { tree, jacobian }
    }
}

/// Kinematics of one discrete contact pair.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactPairKinematics {
    /// Signed separation, negative when penetrating.
    pub phi: f64,
    /// One or two Jacobian blocks of the relative contact velocity in the
    /// contact frame, ordered (t₁, t₂, n).
    pub jacobian: Vec<JacobianTreeBlock>,
    /// Orientation of the contact frame in the world. Its z axis is the
    /// normal from A into B.
    pub r_wc: Rotation3<f64>,
}

/// Rotation whose `axis`-th column is the unit vector along `b`, completed
/// to a right-handed orthonormal basis.
///
/// The two remaining columns are arbitrary but deterministic.
#[must_use]
pub fn make_rotation_from_one_vector(b: &Vector3<f64>, axis: usize) -> Rotation3<f64> {
    let (t1, t2, n) = tangent_frame(b);
    let columns = match axis % 3 {
        0 => [n, t1, t2],
        1 => [t2, n, t1],
        _ => [t1, t2, n],
    };
    Rotation3::from_matrix_unchecked(Matrix3::from_columns(&columns))
}

/// Orthonormal `(t1, t2, n)` with `t1 × t2 = n`.
fn tangent_frame(normal: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let norm = normal.norm();
    if !norm.is_finite() || norm < MIN_NORMAL_NORM {
        return (Vector3::x(), Vector3::y(), Vector3::z());
    }
    let n = normal / norm;

    // Reference direction not parallel to n, then Gram-Schmidt.
    let reference = if n.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    let t1 = (reference - n * n.dot(&reference)).normalize();
    let t2 = n.cross(&t1);
    (t1, t2, n)
}

/// Contact kinematics for every pair, in the same order.
pub fn calc_contact_kinematics(
    model: &MultibodyModel,
    kinematics: &PositionKinematics,
    query: &dyn GeometryQuery,
    pairs: &[DiscreteContactPair],
) -> Result<Vec<ContactPairKinematics>> {
    let topology = model.topology();
    let mut out = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let body_a = body_of(query, model, pair.id_a)?;
        let body_b = body_of(query, model, pair.id_b)?;

        let nhat_w = -pair.nhat_ba_w;
        let jv_wac = model.translational_jacobian(kinematics, body_a, &pair.p_wc);
        let jv_wbc = model.translational_jacobian(kinematics, body_b, &pair.p_wc);
        let jv_acbc_w = jv_wbc - jv_wac;

        let r_wc = make_rotation_from_one_vector(&nhat_w, 2);

        let tree_a = topology.body_to_tree(body_a);
        let tree_b = topology.body_to_tree(body_b);
        if tree_a.is_none() && tree_b.is_none() {
            return Err(SimError::structural(format!(
                "contact between {} and {} involves no valid tree",
                pair.id_a, pair.id_b
            )));
        }

        let mut blocks = Vec::with_capacity(2);
        let trees = [tree_a, tree_b.filter(|b| Some(*b) != tree_a)];
        for tree in trees.into_iter().flatten() {
            let start = topology.tree_velocities_start(tree);
            let nt = topology.num_tree_velocities(tree);
            let jacobian = r_wc.matrix().transpose() * jv_acbc_w.columns(start, nt);
            blocks.push(JacobianTreeBlock::new(
                tree,
                DMatrix::from_column_slice(3, nt, jacobian.as_slice()),
            ));
        }

        out.push(ContactPairKinematics {
            phi: pair.phi0,
            jacobian: blocks,
            r_wc,
        });
    }
    Ok(out)
}

fn body_of(query: &dyn GeometryQuery, model: &MultibodyModel, id: GeometryId) -> Result<BodyIndex> {
    let body = query
        .body_of(id)
        .ok_or_else(|| SimError::invalid_index("geometry", id.raw() as usize))?;
    if body.index() >= model.num_bodies() {
        return Err(SimError::invalid_index("body", body.index()));
    }
    Ok(body)
}
