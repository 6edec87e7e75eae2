//! Keyed Dependencies
//!
//! Collaborators that wrap plain data (object proxies, reactive
//! collections) do not allocate a signal per property. Instead they call
//! `track(target, key)` on reads and `trigger(target, key)` on writes, and
//! the graph keeps one dependency node per `(target, key)` pair that has
//! at least one subscriber.

use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

use super::node::{NodeKey, NodeKind};
use super::system::Graph;

/// Identity of an object whose properties are tracked by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(u64);

impl TargetId {
    /// Wrap a caller-chosen identity.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Identity derived from the address of `target`.
    ///
    /// Only meaningful while `target` stays where it is; call
    /// [`forget_target`](crate::reactive::forget_target) before it moves or
    /// is dropped.
    pub fn of<T: ?Sized>(target: &T) -> Self {
        Self(target as *const T as *const () as usize as u64)
    }

    /// A fresh identity from a process-wide counter.
    ///
    /// Counter identities live in the upper half of the `u64` range so they
    /// never collide with [`TargetId::of`] on current platforms.
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1 << 63);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Which part of a target a read or write touched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepKey {
    /// A named property or map key.
    Prop(String),

    /// An element position.
    Index(usize),

    /// The shape of the collection (its key set or length), read by
    /// iteration.
    Iterate,
}

impl From<&str> for DepKey {
    fn from(name: &str) -> Self {
        DepKey::Prop(name.to_owned())
    }
}

impl From<String> for DepKey {
    fn from(name: String) -> Self {
        DepKey::Prop(name)
    }
}

impl From<usize> for DepKey {
    fn from(index: usize) -> Self {
        DepKey::Index(index)
    }
}

/// Registry of live keyed dependency nodes.
#[derive(Debug, Default)]
pub(crate) struct KeyedDeps {
    targets: IndexMap<TargetId, IndexMap<DepKey, NodeKey>>,
    owners: SecondaryMap<NodeKey, (TargetId, DepKey)>,
}

impl Graph {
    /// Look up the dependency node for `(target, key)`, if any reader
    /// subscribed to it.
    pub(crate) fn keyed_dep(&self, target: TargetId, key: &DepKey) -> Option<NodeKey> {
        self.keyed
            .targets
            .get(&target)
            .and_then(|deps| deps.get(key))
            .copied()
    }

    /// Get the dependency node for `(target, key)`, creating it if needed.
    pub(crate) fn keyed_dep_or_insert(&mut self, target: TargetId, key: DepKey) -> NodeKey {
        if let Some(existing) = self.keyed_dep(target, &key) {
            return existing;
        }

        let node = self.insert(NodeKind::Keyed);
        self.keyed.owners.insert(node, (target, key.clone()));
        self.keyed.targets.entry(target).or_default().insert(key, node);
        node
    }

    /// All dependency nodes of `target`, in creation order.
    pub(crate) fn keyed_deps_of(&self, target: TargetId) -> Vec<NodeKey> {
        self.keyed
            .targets
            .get(&target)
            .map(|deps| deps.values().copied().collect())
            .unwrap_or_default()
    }

    /// Where a keyed node came from, for debugger events.
    pub(crate) fn keyed_owner(&self, node: NodeKey) -> Option<&(TargetId, DepKey)> {
        self.keyed.owners.get(node)
    }

    /// Drop a keyed node that lost its last subscriber.
    pub(crate) fn release_keyed(&mut self, node: NodeKey) {
        self.forget_keyed_entry(node);
        self.nodes.remove(node);
    }

    /// Drop every dependency node of `target`, detaching their subscribers.
    pub(crate) fn forget_target(&mut self, target: TargetId) {
        let Some(deps) = self.keyed.targets.shift_remove(&target) else {
            return;
        };

        for node in deps.into_values() {
            self.keyed.owners.remove(node);
            self.remove_node(node);
        }
    }

    /// Number of targets with at least one live keyed dependency.
    #[cfg(test)]
    pub(crate) fn keyed_target_count(&self) -> usize {
        self.keyed.targets.len()
    }

    /// Remove `node` from the registry maps only; the arena slot is the
    /// caller's business.
    pub(crate) fn forget_keyed_entry(&mut self, node: NodeKey) {
        let Some((target, key)) = self.keyed.owners.remove(node) else {
            return;
        };

        if let Some(deps) = self.keyed.targets.get_mut(&target) {
            deps.shift_remove(&key);
            if deps.is_empty() {
                self.keyed.targets.shift_remove(&target);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyed_deps_are_created_once() {
        let mut graph = Graph::new();
        let target = TargetId::new(7);

        let a = graph.keyed_dep_or_insert(target, "name".into());
        let b = graph.keyed_dep_or_insert(target, "name".into());
        let c = graph.keyed_dep_or_insert(target, DepKey::Iterate);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(graph.keyed_deps_of(target), vec![a, c]);
        assert_eq!(graph.keyed_owner(c), Some(&(target, DepKey::Iterate)));
    }

    #[test]
    fn forgetting_a_target_drops_its_nodes() {
        let mut graph = Graph::new();
        let target = TargetId::new(1);
        let node = graph.keyed_dep_or_insert(target, 0usize.into());

        graph.forget_target(target);

        assert!(graph.node(node).is_none());
        assert!(graph.keyed_dep(target, &DepKey::Index(0)).is_none());
        assert_eq!(graph.keyed_target_count(), 0);
    }

    #[test]
    fn counter_targets_are_unique() {
        assert_ne!(TargetId::next(), TargetId::next());
    }

    #[test]
    fn address_targets_follow_the_object() {
        let a = 1u32;
        let b = 2u32;
        assert_eq!(TargetId::of(&a), TargetId::of(&a));
        assert_ne!(TargetId::of(&a), TargetId::of(&b));
    }
}
