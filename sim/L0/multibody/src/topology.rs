//! Partition of bodies and velocities into independent kinematic trees.
//!
//! A tree is rooted at a non-weld joint whose parent is anchored to the
//! world (the world itself, or a body welded to it through a chain of weld
//! joints). Anchored bodies belong to no tree. Velocities of one tree occupy
//! a contiguous range of the generalized velocity vector, so the mass matrix
//! is block diagonal with one block per tree.

use sim_types::{BodyIndex, TreeIndex};

/// Tree partition of a multibody model.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TreeTopology {
    pub(crate) body_to_tree: Vec<Option<TreeIndex>>,
    pub(crate) velocity_to_tree: Vec<TreeIndex>,
    pub(crate) tree_velocities_start: Vec<usize>,
    pub(crate) num_tree_velocities: Vec<usize>,
}

impl TreeTopology {
    /// Number of trees.
    #[must_use]
    pub fn num_trees(&self) -> usize {
        self.tree_velocities_start.len()
    }

    /// Tree of `body`, `None` if it is anchored to the world.
    #[must_use]
    pub fn body_to_tree(&self, body: BodyIndex) -> Option<TreeIndex> {
        self.body_to_tree.get(body.index()).copied().flatten()
    }

    /// Tree owning generalized velocity `v`.
    #[must_use]
    pub fn velocity_to_tree(&self, v: usize) -> Option<TreeIndex> {
        self.velocity_to_tree.get(v).copied()
    }

    /// First velocity of `tree`.
    #[must_use]
    pub fn tree_velocities_start(&self, tree: TreeIndex) -> usize {
        self.tree_velocities_start[tree.index()]
    }

    /// Number of velocities of `tree`.
    #[must_use]
    pub fn num_tree_velocities(&self, tree: TreeIndex) -> usize {
        self.num_tree_velocities[tree.index()]
    }

    /// Iterate over all trees in index order.
    pub fn trees(&self) -> impl Iterator<Item = TreeIndex> + '_ {
        (0..self.num_trees()).map(TreeIndex::new)
    }

    /// Local index of global velocity `v` within its tree.
    #[must_use]
    pub fn velocity_local_index(&self, v: usize) -> Option<(TreeIndex, usize)> {
        let tree = self.velocity_to_tree(v)?;
        Some((tree, v - self.tree_velocities_start(tree)))
    }
}
