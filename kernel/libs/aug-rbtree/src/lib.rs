// SPDX-License-Identifier: MPL-2.0

//! Red-black trees with augmented per-node data.
//!
//! An augmented tree keeps, for every node, a value that summarizes the node's
//! whole subtree (e.g., the largest interval end below it). The summary must
//! stay exact across every shape mutation, so the rebalancing code reports each
//! structural change to an [`Augment`] implementation through three callbacks:
//!
//!  * `propagate`, after a node's own contribution changed;
//!  * `copy`, when a node takes over the position of another node;
//!  * `rotate`, after a rotation swapped the positions of two nodes.
//!
//! The tree does not know how its items are ordered. Callers find the empty
//! child slot for a new item themselves (updating summaries on the way down if
//! they like), attach it with [`RbTree::link_node`], and then let
//! [`RbTree::insert_augmented`] restore the red-black properties. This split is
//! what lets one engine serve both the interval trees and the gap-augmented
//! address-ordered trees.
//!
//! Nodes live in an arena owned by the tree and are named by [`NodeId`]s.
//! Child links are the only structural edges; parent links are lookup-only
//! back-references.
//!
//! The tree performs no synchronization. Callers serialize mutators against
//! each other and against readers.

#![no_std]
#![deny(unsafe_code)]

extern crate alloc;

mod augment;
mod tree;

pub use augment::{Augment, NoAugment};
pub use tree::{Dir, Iter, NodeId, RbTree};
