// SPDX-License-Identifier: MPL-2.0

use alloc::vec::Vec;
use core::{fmt, marker::PhantomData};

use crate::Augment;

/// The handle of a node in an [`RbTree`].
///
/// A handle stays valid until its node is erased. The slot may then be reused
/// by a later insertion, but under a new generation, so using a stale handle
/// panics instead of reaching the new node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    /// Returns the arena index of the node.
    pub const fn index(self) -> usize {
        self.index as usize
    }
}

/// A child direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    Left = 0,
    Right = 1,
}

impl Dir {
    /// Returns the other direction.
    pub const fn opposite(self) -> Self {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    Red,
    Black,
}

struct Slot<N> {
    generation: u32,
    node: Option<N>,
}

struct Node<T, V> {
    item: T,
    aug: V,
    parent: Option<NodeId>,
    children: [Option<NodeId>; 2],
    color: Color,
}

/// An augmented red-black tree.
///
/// See the [crate-level documentation](crate) for how insertion is split
/// between the caller and the tree.
pub struct RbTree<T, A: Augment<T>> {
    slots: Vec<Slot<Node<T, A::Value>>>,
    free: Vec<u32>,
    root: Option<NodeId>,
    len: usize,
    _augment: PhantomData<A>,
}

impl<T, A: Augment<T>> Default for RbTree<T, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug, A: Augment<T>> fmt::Debug for RbTree<T, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|(_, item)| item))
            .finish()
    }
}

impl<T, A: Augment<T>> RbTree<T, A> {
    /// Creates an empty tree.
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
            _augment: PhantomData,
        }
    }

    /// Returns the number of nodes in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Returns the root node.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Returns whether `id` names a node currently in the tree.
    pub fn contains(&self, id: NodeId) -> bool {
        self.try_node(id).is_some()
    }

    fn try_node(&self, id: NodeId) -> Option<&Node<T, A::Value>> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_ref())
    }

    fn node(&self, id: NodeId) -> &Node<T, A::Value> {
        let Some(node) = self.try_node(id) else {
            panic!("{:?} is not in the tree", id);
        };
        node
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<T, A::Value> {
        let Some(node) = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.node.as_mut())
        else {
            panic!("{:?} is not in the tree", id);
        };
        node
    }

    /// Returns the item of a node.
    pub fn get(&self, id: NodeId) -> &T {
        &self.node(id).item
    }

    /// Returns the item of a node mutably.
    ///
    /// The caller must not change anything the tree order or the augmented
    /// values depend on, unless it restores them itself.
    pub fn get_mut(&mut self, id: NodeId) -> &mut T {
        &mut self.node_mut(id).item
    }

    /// Returns the cached augmented value of a node.
    pub fn aug(&self, id: NodeId) -> A::Value {
        self.node(id).aug
    }

    /// Overwrites the cached augmented value of a node.
    pub fn set_aug(&mut self, id: NodeId, aug: A::Value) {
        self.node_mut(id).aug = aug;
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).parent
    }

    pub fn child(&self, id: NodeId, dir: Dir) -> Option<NodeId> {
        self.node(id).children[dir as usize]
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.child(id, Dir::Left)
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.child(id, Dir::Right)
    }

    /// Returns the leftmost node of the subtree rooted at `id`.
    pub fn leftmost(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.left(id) {
            id = left;
        }
        id
    }

    /// Returns the rightmost node of the subtree rooted at `id`.
    pub fn rightmost(&self, mut id: NodeId) -> NodeId {
        while let Some(right) = self.right(id) {
            id = right;
        }
        id
    }

    /// Returns the first node in order.
    pub fn first(&self) -> Option<NodeId> {
        self.root.map(|root| self.leftmost(root))
    }

    /// Returns the last node in order.
    pub fn last(&self) -> Option<NodeId> {
        self.root.map(|root| self.rightmost(root))
    }

    /// Returns the in-order successor of a node.
    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        if let Some(right) = self.right(id) {
            return Some(self.leftmost(right));
        }
        // Go up until we leave a left subtree.
        let mut node = id;
        while let Some(parent) = self.parent(node) {
            if self.left(parent) == Some(node) {
                return Some(parent);
            }
            node = parent;
        }
        None
    }

    /// Returns the in-order predecessor of a node.
    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        if let Some(left) = self.left(id) {
            return Some(self.rightmost(left));
        }
        let mut node = id;
        while let Some(parent) = self.parent(node) {
            if self.right(parent) == Some(node) {
                return Some(parent);
            }
            node = parent;
        }
        None
    }

    /// Returns an in-order iterator over the nodes.
    pub fn iter(&self) -> Iter<'_, T, A> {
        Iter {
            tree: self,
            next: self.first(),
        }
    }

    /// Removes all the nodes.
    ///
    /// All previously handed out [`NodeId`]s become stale.
    pub fn clear(&mut self) {
        self.free.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.node.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
            }
            self.free.push(index as u32);
        }
        self.root = None;
        self.len = 0;
    }

    /// Attaches a new red leaf holding `item` below `parent` in direction `dir`.
    ///
    /// `parent` being `None` makes the node the root, which requires an empty
    /// tree. The chosen child slot must be empty, and the position must be
    /// consistent with the caller's ordering. The tree is not rebalanced;
    /// [`Self::insert_augmented`] must be called next.
    pub fn link_node(
        &mut self,
        item: T,
        aug: A::Value,
        parent: Option<NodeId>,
        dir: Dir,
    ) -> NodeId {
        let id = self.alloc_node(Node {
            item,
            aug,
            parent,
            children: [None, None],
            color: Color::Red,
        });
        match parent {
            Some(parent) => {
                debug_assert!(
                    self.child(parent, dir).is_none(),
                    "linking into an occupied child slot"
                );
                self.set_child(parent, dir, Some(id));
            }
            None => {
                debug_assert!(self.root.is_none(), "linking a second root");
                self.root = Some(id);
            }
        }
        self.len += 1;
        id
    }

    /// Restores the red-black properties after [`Self::link_node`].
    ///
    /// The augmented values must already be correct for the linked shape;
    /// every rotation is reported through [`Augment::rotate`].
    pub fn insert_augmented(&mut self, node: NodeId) {
        let mut node = node;
        let mut parent = self.parent(node);
        loop {
            // Here `node` is always red.
            let Some(mut red_parent) = parent else {
                self.set_parent_color(node, None, Color::Black);
                break;
            };
            if self.color(red_parent) == Color::Black {
                break;
            }
            let Some(gparent) = self.parent(red_parent) else {
                unreachable!("the root is never red");
            };

            let dir = self.dir_of(red_parent, gparent);
            let uncle = self.child(gparent, dir.opposite());
            if let Some(uncle) = uncle.filter(|&uncle| self.is_red(uncle)) {
                // Case 1: flip colors and continue from the grandparent.
                self.set_parent_color(uncle, Some(gparent), Color::Black);
                self.set_parent_color(red_parent, Some(gparent), Color::Black);
                node = gparent;
                parent = self.parent(node);
                self.set_parent_color(node, parent, Color::Red);
                continue;
            }

            let mut tmp = self.child(red_parent, dir.opposite());
            if tmp == Some(node) {
                // Case 2: rotate at the parent so that the node and its parent
                // lean the same way.
                tmp = self.child(node, dir);
                self.set_child(red_parent, dir.opposite(), tmp);
                self.set_child(node, dir, Some(red_parent));
                if let Some(tmp) = tmp {
                    self.set_parent_color(tmp, Some(red_parent), Color::Black);
                }
                self.set_parent_color(red_parent, Some(node), Color::Red);
                A::rotate(self, red_parent, node);
                red_parent = node;
                tmp = self.child(node, dir.opposite());
            }

            // Case 3: rotate at the grandparent.
            self.set_child(gparent, dir, tmp);
            self.set_child(red_parent, dir.opposite(), Some(gparent));
            if let Some(tmp) = tmp {
                self.set_parent_color(tmp, Some(gparent), Color::Black);
            }
            self.rotate_set_parents(gparent, red_parent, Color::Red);
            A::rotate(self, gparent, red_parent);
            break;
        }
    }

    /// Erases a node, rebalances the tree and returns the node's item.
    pub fn erase_augmented(&mut self, node: NodeId) -> T {
        let right = self.right(node);
        let left = self.left(node);
        let parent = self.parent(node);
        let color = self.color(node);

        let (rebalance, propagate_from) = match (left, right) {
            (None, child) => {
                // At most one (right) child. A lone child must be red and its
                // parent black, so recoloring the child restores the balance.
                self.change_child(node, child, parent);
                let rebalance = if let Some(child) = child {
                    self.set_parent_color(child, parent, color);
                    None
                } else if color == Color::Black {
                    parent
                } else {
                    None
                };
                (rebalance, parent)
            }
            (Some(left), None) => {
                self.set_parent_color(left, parent, color);
                self.change_child(node, Some(left), parent);
                (None, parent)
            }
            (Some(left), Some(right)) => {
                let (successor, successor_parent, child) = match self.left(right) {
                    None => {
                        // The successor is the right child itself.
                        A::copy(self, node, right);
                        (right, right, self.right(right))
                    }
                    Some(mut tmp) => {
                        // The successor is the leftmost node under the right
                        // child. Splice it out and put it above `right`.
                        let mut successor_parent = right;
                        while let Some(next) = self.left(tmp) {
                            successor_parent = tmp;
                            tmp = next;
                        }
                        let successor = tmp;
                        let child = self.right(successor);
                        self.set_child(successor_parent, Dir::Left, child);
                        self.set_child(successor, Dir::Right, Some(right));
                        self.set_parent(right, successor);
                        A::copy(self, node, successor);
                        A::propagate(self, Some(successor_parent), Some(successor));
                        (successor, successor_parent, child)
                    }
                };

                self.set_child(successor, Dir::Left, Some(left));
                self.set_parent(left, successor);
                self.change_child(node, Some(successor), parent);

                let successor_color = self.color(successor);
                self.set_parent_color(successor, parent, color);
                let rebalance = if let Some(child) = child {
                    self.set_parent_color(child, Some(successor_parent), Color::Black);
                    None
                } else if successor_color == Color::Black {
                    Some(successor_parent)
                } else {
                    None
                };
                (rebalance, Some(successor))
            }
        };

        A::propagate(self, propagate_from, None);
        if let Some(parent) = rebalance {
            self.erase_color(parent);
        }
        self.free_node(node)
    }

    /// Restores the black height after a black leaf below `parent` went away.
    fn erase_color(&mut self, mut parent: NodeId) {
        let mut node: Option<NodeId> = None;
        loop {
            // `node` is the black-deficient child of `parent` (possibly empty).
            let dir = if node != self.right(parent) {
                Dir::Left
            } else {
                Dir::Right
            };
            let Some(mut sibling) = self.child(parent, dir.opposite()) else {
                unreachable!("a black-height deficit always has a sibling");
            };

            if self.is_red(sibling) {
                // Case 1: rotate at the parent to get a black sibling.
                let tmp = self.child(sibling, dir);
                self.set_child(parent, dir.opposite(), tmp);
                self.set_child(sibling, dir, Some(parent));
                let Some(tmp) = tmp else {
                    unreachable!("a red sibling has black children");
                };
                self.set_parent_color(tmp, Some(parent), Color::Black);
                self.rotate_set_parents(parent, sibling, Color::Red);
                A::rotate(self, parent, sibling);
                sibling = tmp;
            }

            let mut far = self.child(sibling, dir.opposite());
            if !far.is_some_and(|far| self.is_red(far)) {
                let near = self
                    .child(sibling, dir)
                    .filter(|&near| self.is_red(near));
                let Some(near) = near else {
                    // Case 2: flip the sibling color, pushing the deficit up
                    // unless the parent can absorb it.
                    self.set_parent_color(sibling, Some(parent), Color::Red);
                    if self.is_red(parent) {
                        self.set_color(parent, Color::Black);
                    } else {
                        node = Some(parent);
                        if let Some(grandparent) = self.parent(parent) {
                            parent = grandparent;
                            continue;
                        }
                    }
                    break;
                };

                // Case 3: rotate at the sibling so that its far child is red.
                let tmp = self.child(near, dir.opposite());
                self.set_child(sibling, dir, tmp);
                self.set_child(near, dir.opposite(), Some(sibling));
                self.set_child(parent, dir.opposite(), Some(near));
                if let Some(tmp) = tmp {
                    self.set_parent_color(tmp, Some(sibling), Color::Black);
                }
                A::rotate(self, sibling, near);
                far = Some(sibling);
                sibling = near;
            }

            // Case 4: rotate at the parent and recolor.
            let tmp = self.child(sibling, dir);
            self.set_child(parent, dir.opposite(), tmp);
            self.set_child(sibling, dir, Some(parent));
            if let Some(far) = far {
                self.set_parent_color(far, Some(sibling), Color::Black);
            }
            if let Some(tmp) = tmp {
                self.set_parent(tmp, parent);
            }
            self.rotate_set_parents(parent, sibling, Color::Black);
            A::rotate(self, parent, sibling);
            break;
        }
    }

    /// Checks the structure of the tree, panicking on the first violation.
    ///
    /// This verifies the parent links, the red-black properties and that every
    /// cached augmented value equals a fresh [`Augment::compute`]. It takes
    /// O(n) time and is meant for tests and debugging.
    pub fn validate(&self) {
        let count = match self.root {
            Some(root) => {
                assert!(self.parent(root).is_none(), "the root has a parent");
                assert!(!self.is_red(root), "the root is red");
                self.validate_subtree(root).1
            }
            None => 0,
        };
        assert_eq!(count, self.len, "the node count is out of sync");
        assert_eq!(
            self.slots.iter().filter(|slot| slot.node.is_some()).count(),
            self.len,
            "the arena leaks nodes"
        );
    }

    /// Returns the black height and the node count of a subtree.
    fn validate_subtree(&self, node: NodeId) -> (usize, usize) {
        let mut heights = [1; 2];
        let mut count = 1;
        for dir in [Dir::Left, Dir::Right] {
            if let Some(child) = self.child(node, dir) {
                assert_eq!(
                    self.parent(child),
                    Some(node),
                    "{:?} has a wrong parent link",
                    child
                );
                assert!(
                    !(self.is_red(node) && self.is_red(child)),
                    "{:?} and {:?} are both red",
                    node,
                    child
                );
                let (height, sub_count) = self.validate_subtree(child);
                heights[dir as usize] = height;
                count += sub_count;
            }
        }
        assert_eq!(
            heights[0], heights[1],
            "unequal black heights below {:?}",
            node
        );
        assert_eq!(
            self.aug(node),
            A::compute(self, node),
            "stale augmented value at {:?}",
            node
        );
        let own = if self.is_red(node) { 0 } else { 1 };
        (heights[0] + own, count)
    }

    fn alloc_node(&mut self, node: Node<T, A::Value>) -> NodeId {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.node.is_none());
            slot.node = Some(node);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }
        debug_assert!(self.slots.len() < u32::MAX as usize);
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    fn free_node(&mut self, id: NodeId) -> T {
        let Some(node) = self
            .slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| {
                let node = slot.node.take()?;
                slot.generation = slot.generation.wrapping_add(1);
                Some(node)
            })
        else {
            panic!("{:?} is not in the tree", id);
        };
        self.free.push(id.index);
        self.len -= 1;
        node.item
    }

    fn color(&self, id: NodeId) -> Color {
        self.node(id).color
    }

    fn is_red(&self, id: NodeId) -> bool {
        self.color(id) == Color::Red
    }

    fn set_color(&mut self, id: NodeId, color: Color) {
        self.node_mut(id).color = color;
    }

    fn set_parent(&mut self, id: NodeId, parent: NodeId) {
        self.node_mut(id).parent = Some(parent);
    }

    fn set_parent_color(&mut self, id: NodeId, parent: Option<NodeId>, color: Color) {
        let node = self.node_mut(id);
        node.parent = parent;
        node.color = color;
    }

    fn set_child(&mut self, id: NodeId, dir: Dir, child: Option<NodeId>) {
        self.node_mut(id).children[dir as usize] = child;
    }

    /// Returns on which side of `parent` the node `child` hangs.
    fn dir_of(&self, child: NodeId, parent: NodeId) -> Dir {
        if self.left(parent) == Some(child) {
            Dir::Left
        } else {
            Dir::Right
        }
    }

    /// Makes `new` take the place of `old` below `parent`.
    fn change_child(&mut self, old: NodeId, new: Option<NodeId>, parent: Option<NodeId>) {
        match parent {
            Some(parent) => {
                let dir = self.dir_of(old, parent);
                self.set_child(parent, dir, new);
            }
            None => self.root = new,
        }
    }

    /// Completes a rotation: `new` takes the parent and color of `old`, and
    /// `old` becomes a child of `new` with the given color.
    fn rotate_set_parents(&mut self, old: NodeId, new: NodeId, color: Color) {
        let parent = self.parent(old);
        let old_color = self.color(old);
        self.set_parent_color(new, parent, old_color);
        self.set_parent_color(old, Some(new), color);
        self.change_child(old, Some(new), parent);
    }
}

/// An in-order iterator over an [`RbTree`].
pub struct Iter<'a, T, A: Augment<T>> {
    tree: &'a RbTree<T, A>,
    next: Option<NodeId>,
}

impl<'a, T, A: Augment<T>> Iterator for Iter<'a, T, A> {
    type Item = (NodeId, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = self.tree.next(current);
        Some((current, self.tree.get(current)))
    }
}

#[cfg(test)]
mod test {
    use alloc::vec::Vec;

    use rand::{Rng, SeedableRng, rngs::SmallRng};

    use super::*;
    use crate::NoAugment;

    /// Counts the nodes of every subtree.
    struct SubtreeSize;

    impl Augment<u32> for SubtreeSize {
        type Value = usize;

        fn compute(tree: &RbTree<u32, Self>, node: NodeId) -> usize {
            let left = tree.left(node).map_or(0, |left| tree.aug(left));
            let right = tree.right(node).map_or(0, |right| tree.aug(right));
            1 + left + right
        }
    }

    fn insert(tree: &mut RbTree<u32, SubtreeSize>, key: u32) -> NodeId {
        let mut parent = None;
        let mut dir = Dir::Left;
        let mut link = tree.root();
        while let Some(node) = link {
            parent = Some(node);
            let size = tree.aug(node);
            tree.set_aug(node, size + 1);
            dir = if key < *tree.get(node) {
                Dir::Left
            } else {
                Dir::Right
            };
            link = tree.child(node, dir);
        }
        let id = tree.link_node(key, 1, parent, dir);
        tree.insert_augmented(id);
        id
    }

    fn keys<A: Augment<u32>>(tree: &RbTree<u32, A>) -> Vec<u32> {
        tree.iter().map(|(_, key)| *key).collect()
    }

    #[test]
    fn insert_ascending() {
        let mut tree = RbTree::new();
        for key in 0..200 {
            insert(&mut tree, key);
            tree.validate();
        }
        assert_eq!(tree.len(), 200);
        assert_eq!(tree.aug(tree.root().unwrap()), 200);
        assert_eq!(keys(&tree), (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn insert_descending() {
        let mut tree = RbTree::new();
        for key in (0..200).rev() {
            insert(&mut tree, key);
            tree.validate();
        }
        assert_eq!(keys(&tree), (0..200).collect::<Vec<_>>());
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let mut tree = RbTree::new();
        let ids: Vec<_> = (0..16).map(|_| insert(&mut tree, 7)).collect();
        tree.validate();
        let order: Vec<_> = tree.iter().map(|(id, _)| id).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn erase_root_until_empty() {
        let mut tree = RbTree::new();
        for key in 0..64 {
            insert(&mut tree, key);
        }
        let mut expected: Vec<u32> = (0..64).collect();
        while let Some(root) = tree.root() {
            let key = tree.erase_augmented(root);
            expected.retain(|&k| k != key);
            tree.validate();
            assert_eq!(keys(&tree), expected);
        }
        assert!(tree.is_empty());
        assert_eq!(tree.len(), 0);
    }

    #[test]
    fn erase_single_node() {
        let mut tree = RbTree::new();
        let id = insert(&mut tree, 1);
        assert_eq!(tree.erase_augmented(id), 1);
        tree.validate();
        assert!(tree.is_empty());
        assert!(!tree.contains(id));
    }

    #[test]
    fn random_insert_erase() {
        let mut rng = SmallRng::seed_from_u64(0);
        let mut tree = RbTree::new();
        let mut live: Vec<(NodeId, u32)> = Vec::new();

        for _ in 0..3000 {
            if live.is_empty() || rng.random_range(0..3) != 0 {
                let key = rng.random_range(0..500);
                let id = insert(&mut tree, key);
                live.push((id, key));
            } else {
                let victim = rng.random_range(0..live.len());
                let (id, key) = live.swap_remove(victim);
                assert_eq!(tree.erase_augmented(id), key);
            }
            tree.validate();
        }

        let mut expected: Vec<u32> = live.iter().map(|(_, key)| *key).collect();
        expected.sort_unstable();
        assert_eq!(keys(&tree), expected);
        assert_eq!(tree.len(), live.len());
    }

    #[test]
    fn next_and_prev() {
        let mut tree = RbTree::new();
        for key in [5, 1, 9, 3, 7] {
            insert(&mut tree, key);
        }
        let first = tree.first().unwrap();
        let last = tree.last().unwrap();
        assert_eq!(*tree.get(first), 1);
        assert_eq!(*tree.get(last), 9);
        assert!(tree.prev(first).is_none());
        assert!(tree.next(last).is_none());

        let mut forward = Vec::new();
        let mut cursor = Some(first);
        while let Some(node) = cursor {
            forward.push(*tree.get(node));
            cursor = tree.next(node);
        }
        assert_eq!(forward, [1, 3, 5, 7, 9]);

        let mut backward = Vec::new();
        let mut cursor = Some(last);
        while let Some(node) = cursor {
            backward.push(*tree.get(node));
            cursor = tree.prev(node);
        }
        assert_eq!(backward, [9, 7, 5, 3, 1]);
    }

    #[test]
    fn slots_are_reused() {
        let mut tree = RbTree::new();
        let a = insert(&mut tree, 1);
        insert(&mut tree, 2);
        tree.erase_augmented(a);
        let c = insert(&mut tree, 3);
        assert_eq!(a.index(), c.index());
        assert_ne!(a, c);
        assert!(!tree.contains(a));
        assert!(tree.contains(c));
        tree.validate();
        assert_eq!(keys(&tree), [2, 3]);
    }

    #[test]
    #[should_panic]
    fn erase_stale_id_after_reuse() {
        let mut tree = RbTree::new();
        let a = insert(&mut tree, 1);
        tree.erase_augmented(a);
        insert(&mut tree, 50);
        tree.erase_augmented(a);
    }

    #[test]
    fn clear_retires_ids() {
        let mut tree = RbTree::new();
        let a = insert(&mut tree, 1);
        tree.clear();
        let b = insert(&mut tree, 2);
        assert_eq!(a.index(), b.index());
        assert!(!tree.contains(a));
        assert_eq!(*tree.get(b), 2);
        tree.validate();
    }

    #[test]
    fn plain_tree() {
        let mut tree: RbTree<u32, NoAugment> = RbTree::new();
        let mut parent = None;
        let mut dir = Dir::Left;
        for key in 0..32 {
            let id = tree.link_node(key, (), parent, dir);
            tree.insert_augmented(id);
            parent = Some(tree.last().unwrap());
            dir = Dir::Right;
            tree.validate();
        }
        assert_eq!(keys(&tree), (0..32).collect::<Vec<_>>());
        tree.clear();
        assert!(tree.is_empty());
        tree.validate();
    }
}
