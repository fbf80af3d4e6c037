// SPDX-License-Identifier: MPL-2.0

use core::fmt::Debug;

use crate::{NodeId, RbTree};

/// The maintenance callbacks of an augmented red-black tree.
///
/// An implementation only has to say how the augmented value of a node is
/// computed from the node itself and its children. The provided callbacks
/// derive the rest from [`Augment::compute`], which is what most trees need;
/// they may be overridden when a cheaper update is known.
pub trait Augment<T>: Sized {
    /// The per-node augmented value.
    type Value: Copy + PartialEq + Debug;

    /// Computes the augmented value of `node` from its item and the current
    /// augmented values of its children.
    fn compute(tree: &RbTree<T, Self>, node: NodeId) -> Self::Value;

    /// Recomputes the augmented values from `node` upward until `stop`
    /// (exclusive) is reached.
    ///
    /// The walk ends early once a recomputed value equals the cached one, since
    /// all the ancestors are then up to date as well.
    fn propagate(tree: &mut RbTree<T, Self>, mut node: Option<NodeId>, stop: Option<NodeId>) {
        while node != stop {
            let Some(current) = node else {
                break;
            };
            let augmented = Self::compute(tree, current);
            if tree.aug(current) == augmented {
                break;
            }
            tree.set_aug(current, augmented);
            node = tree.parent(current);
        }
    }

    /// Called when `new` structurally replaces `old`.
    fn copy(tree: &mut RbTree<T, Self>, old: NodeId, new: NodeId) {
        let augmented = tree.aug(old);
        tree.set_aug(new, augmented);
    }

    /// Called after a rotation moved `new` into the position of `old`.
    ///
    /// `new` now roots the subtree `old` used to root, so it inherits the
    /// summary of `old`; `old` has different children and is recomputed.
    fn rotate(tree: &mut RbTree<T, Self>, old: NodeId, new: NodeId) {
        let augmented = tree.aug(old);
        tree.set_aug(new, augmented);
        let augmented = Self::compute(tree, old);
        tree.set_aug(old, augmented);
    }
}

/// No augmentation, for plain ordered trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAugment;

impl<T> Augment<T> for NoAugment {
    type Value = ();

    fn compute(_tree: &RbTree<T, Self>, _node: NodeId) {}

    fn propagate(_tree: &mut RbTree<T, Self>, _node: Option<NodeId>, _stop: Option<NodeId>) {}

    fn copy(_tree: &mut RbTree<T, Self>, _old: NodeId, _new: NodeId) {}

    fn rotate(_tree: &mut RbTree<T, Self>, _old: NodeId, _new: NodeId) {}
}
