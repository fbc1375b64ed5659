//! Node publishing discipline for the copy-on-write state tree.
//!
//! Every node in the tree carries a [`NodeBase`] with a published flag. A
//! freshly constructed (or cloned) node is unpublished and may be mutated in
//! place by the transform that created it. Once a root is installed as the
//! current switch state, [`Node::publish`] marks the whole tree immutable;
//! from then on the only way to change a node is to clone it (and the path
//! of parents up to the root) via the `modify` helpers.

use std::sync::atomic::{AtomicBool, Ordering};

/// Per-node bookkeeping shared by all state-tree node types.
#[derive(Debug, Default)]
pub struct NodeBase {
    published: AtomicBool,
}

impl NodeBase {
    /// Returns true once the node has been published (made immutable).
    pub fn is_published(&self) -> bool {
        self.published.load(Ordering::Acquire)
    }

    /// Marks this node immutable. Irreversible.
    pub fn mark_published(&self) {
        self.published.store(true, Ordering::Release);
    }
}

// A clone is a new, writable node; it never inherits the published flag.
impl Clone for NodeBase {
    fn clone(&self) -> Self {
        NodeBase::default()
    }
}

/// A node in the switch state tree.
pub trait Node: Clone {
    /// Whether this node has been published.
    fn is_published(&self) -> bool;

    /// Publishes this node and, recursively, all child nodes.
    fn publish(&self);
}
