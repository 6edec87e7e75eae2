//! Dependency Graph
//!
//! This module implements the bipartite graph that connects reactive
//! values to the computations that read them.
//!
//! # Overview
//!
//! - Nodes are signals, computeds, keyed dependencies, and effects.
//! - An edge (link) from `dep` to `sub` means `sub` read `dep` during its
//!   last completed run.
//!
//! When a value changes, the push phase walks outward along subscriber
//! lists and marks reachable nodes dirty or pending. The runtime then
//! resolves pending nodes lazily (the pull phase) only when they are read.
//!
//! # Design Decisions
//!
//! 1. Nodes and links live in generational arenas and refer to each other
//!    by key. There are no reference cycles to manage, and a key that
//!    outlived its node is detected instead of dangling.
//!
//! 2. Links are intrusive members of two doubly-linked lists, so both
//!    directions are walkable and every splice is O(1).
//!
//! 3. State is a single bitmask per node; the push phase classifies a node
//!    with a handful of mask tests.

mod flags;
mod keyed;
mod node;
mod propagate;
mod system;

pub(crate) use flags::ReactiveFlags;
pub use keyed::{DepKey, TargetId};
pub(crate) use node::{LinkKey, NodeKey, NodeKind};
pub use node::NodeId;
pub(crate) use system::Graph;
