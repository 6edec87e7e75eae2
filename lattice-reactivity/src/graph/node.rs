//! Graph Nodes
//!
//! This module defines the node and edge records that live in the graph
//! arenas.
//!
//! An edge ([`Link`]) is a member of two doubly-linked lists at once: the
//! dependency list of its subscriber and the subscriber list of its
//! dependency. Both lists are threaded through the links themselves, so a
//! node only stores the head and tail of each.

use serde::{Deserialize, Serialize};
use slotmap::{new_key_type, Key};

use super::flags::ReactiveFlags;

new_key_type! {
    /// Arena key of a reactive node.
    pub(crate) struct NodeKey;

    /// Arena key of a dependency edge.
    pub(crate) struct LinkKey;
}

/// Public, opaque identifier of a reactive node.
///
/// Used by debugger events and for display. Identifiers are not reused
/// while the node is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<NodeKey> for NodeId {
    fn from(key: NodeKey) -> Self {
        Self(key.data().as_ffi())
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node is. Behavior that differs per kind (what happens when the
/// last subscriber leaves, how a dirty node is refreshed) keys off this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// A value cell. No dependencies of its own.
    Signal,

    /// A keyed dependency created by `track`.
    Keyed,

    /// A lazily recomputed derived value.
    Computed,

    /// An eager sink.
    Effect,
}

impl NodeKind {
    /// Flags a freshly created node of this kind starts with.
    pub(crate) fn initial_flags(self) -> ReactiveFlags {
        match self {
            NodeKind::Signal | NodeKind::Keyed => ReactiveFlags::MUTABLE,
            NodeKind::Computed => ReactiveFlags::MUTABLE | ReactiveFlags::DIRTY,
            NodeKind::Effect => ReactiveFlags::WATCHING | ReactiveFlags::DIRTY,
        }
    }
}

/// A node in the dependency graph.
#[derive(Debug)]
pub(crate) struct ReactiveNode {
    pub(crate) kind: NodeKind,
    pub(crate) flags: ReactiveFlags,

    /// First edge to something this node reads.
    pub(crate) deps: Option<LinkKey>,
    /// Last edge touched during the current (or last completed) run.
    pub(crate) deps_tail: Option<LinkKey>,

    /// First edge to something that reads this node.
    pub(crate) subs: Option<LinkKey>,
    pub(crate) subs_tail: Option<LinkKey>,
}

impl ReactiveNode {
    pub(crate) fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            flags: kind.initial_flags(),
            deps: None,
            deps_tail: None,
            subs: None,
            subs_tail: None,
        }
    }
}

/// A dependency edge: `sub` read `dep`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Link {
    pub(crate) dep: NodeKey,
    pub(crate) sub: NodeKey,

    /// Neighbors in `sub`'s dependency list.
    pub(crate) prev_dep: Option<LinkKey>,
    pub(crate) next_dep: Option<LinkKey>,

    /// Neighbors in `dep`'s subscriber list.
    pub(crate) prev_sub: Option<LinkKey>,
    pub(crate) next_sub: Option<LinkKey>,
}
