//! Keyed collections of state-tree nodes, with structural diffing.
//!
//! A [`NodeMap`] holds its children behind `Arc`, so cloning a map is cheap
//! (the children keep their pointer identity) and diffing two maps is a
//! pointer-equality walk, not a value comparison.

use crate::node::{Node, NodeBase};
use std::collections::BTreeMap;
use std::iter::Peekable;
use std::sync::Arc;

/// An ordered map of state-tree nodes.
#[derive(Debug, Clone)]
pub struct NodeMap<K, V> {
    base: NodeBase,
    nodes: BTreeMap<K, Arc<V>>,
}

// Not derived: a derive would bound K and V on Default, and an empty map
// needs neither.
impl<K, V> Default for NodeMap<K, V> {
    fn default() -> Self {
        NodeMap {
            base: NodeBase::default(),
            nodes: BTreeMap::new(),
        }
    }
}

impl<K: Ord + Clone, V: Node> NodeMap<K, V> {
    pub fn new() -> Self {
        NodeMap {
            base: NodeBase::default(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&Arc<V>> {
        self.nodes.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.nodes.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &Arc<V>)> {
        self.nodes.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &Arc<V>> {
        self.nodes.values()
    }

    /// Inserts a node, replacing any previous node under the same key.
    ///
    /// Must only be called on an unpublished map.
    pub fn insert(&mut self, key: K, node: Arc<V>) {
        debug_assert!(!self.is_published(), "insert into published node map");
        self.nodes.insert(key, node);
    }

    /// Removes a node. Must only be called on an unpublished map.
    pub fn remove(&mut self, key: &K) -> Option<Arc<V>> {
        debug_assert!(!self.is_published(), "remove from published node map");
        self.nodes.remove(key)
    }

    /// Returns a writable reference to the node under `key`, cloning the
    /// node first if it has been published.
    pub fn modify_node(&mut self, key: &K) -> Option<&mut V> {
        debug_assert!(!self.is_published(), "modify through published node map");
        let slot = self.nodes.get_mut(key)?;
        if slot.is_published() {
            *slot = Arc::new(V::clone(slot));
        }
        // An unpublished child is owned solely by this (in-flight) tree.
        Some(Arc::get_mut(slot).expect("unpublished node must be uniquely owned"))
    }
}

impl<K: Ord + Clone, V: Node> Node for NodeMap<K, V> {
    fn is_published(&self) -> bool {
        self.base.is_published()
    }

    fn publish(&self) {
        if self.is_published() {
            return;
        }
        for node in self.nodes.values() {
            node.publish();
        }
        self.base.mark_published();
    }
}

impl<K: Ord + serde::Serialize, V: serde::Serialize> serde::Serialize for NodeMap<K, V> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.nodes.serialize(serializer)
    }
}

/// An {old, new} pair produced by diffing two node maps.
///
/// `old == None` means the node was added; `new == None` means removed;
/// both present means the node changed in place.
#[derive(Debug)]
pub struct DeltaValue<'a, V> {
    pub old: Option<&'a Arc<V>>,
    pub new: Option<&'a Arc<V>>,
}

impl<'a, V> DeltaValue<'a, V> {
    pub fn is_added(&self) -> bool {
        self.old.is_none()
    }

    pub fn is_removed(&self) -> bool {
        self.new.is_none()
    }
}

/// Iterator over the changed entries of two [`NodeMap`]s.
///
/// Entries whose `Arc`s are pointer-equal are skipped without inspecting
/// the nodes, so the cost is O(changed nodes) when the maps share structure.
pub struct NodeMapDelta<'a, K: Ord, V> {
    old: Peekable<std::collections::btree_map::Iter<'a, K, Arc<V>>>,
    new: Peekable<std::collections::btree_map::Iter<'a, K, Arc<V>>>,
    identical: bool,
}

impl<'a, K: Ord + Clone, V: Node> NodeMapDelta<'a, K, V> {
    pub fn new(old: &'a NodeMap<K, V>, new: &'a NodeMap<K, V>) -> Self {
        NodeMapDelta {
            old: old.nodes.iter().peekable(),
            new: new.nodes.iter().peekable(),
            identical: std::ptr::eq(old, new),
        }
    }
}

impl<'a, K: Ord, V> Iterator for NodeMapDelta<'a, K, V> {
    type Item = DeltaValue<'a, V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.identical {
            return None;
        }
        loop {
            match (self.old.peek(), self.new.peek()) {
                (None, None) => return None,
                (Some(_), None) => {
                    let (_, old) = self.old.next().unwrap();
                    return Some(DeltaValue {
                        old: Some(old),
                        new: None,
                    });
                }
                (None, Some(_)) => {
                    let (_, new) = self.new.next().unwrap();
                    return Some(DeltaValue {
                        old: None,
                        new: Some(new),
                    });
                }
                (Some((ok, ov)), Some((nk, nv))) => match ok.cmp(nk) {
                    std::cmp::Ordering::Less => {
                        let (_, old) = self.old.next().unwrap();
                        return Some(DeltaValue {
                            old: Some(old),
                            new: None,
                        });
                    }
                    std::cmp::Ordering::Greater => {
                        let (_, new) = self.new.next().unwrap();
                        return Some(DeltaValue {
                            old: None,
                            new: Some(new),
                        });
                    }
                    std::cmp::Ordering::Equal => {
                        let changed = !Arc::ptr_eq(ov, nv);
                        let (_, old) = self.old.next().unwrap();
                        let (_, new) = self.new.next().unwrap();
                        if changed {
                            return Some(DeltaValue {
                                old: Some(old),
                                new: Some(new),
                            });
                        }
                        // Shared subtree: skip without comparing values.
                    }
                },
            }
        }
    }
}
