//! Graph Storage and Edge Maintenance
//!
//! Nodes and links live in two `slotmap` arenas. Edges are intrusive:
//! every [`Link`] is threaded through its subscriber's dependency list and
//! its dependency's subscriber list, so insertion and removal are O(1) and
//! a node's dependency list can be rebuilt in place on every run.
//!
//! # Rebuilding a dependency list
//!
//! A run starts with [`Graph::start_tracking`], which rewinds the node's
//! `deps_tail` to the start of the list. Each read then calls
//! [`Graph::link`]: if the next slot already points at the dependency being
//! read (the common case when a computation reads the same things in the
//! same order as last time) the slot is reused and the tail advances.
//! Otherwise a new link is spliced in at the tail. [`Graph::end_tracking`]
//! removes whatever lies after the tail, i.e. the dependencies that were
//! not read this time.

use slotmap::SlotMap;
use smallvec::SmallVec;

use super::flags::ReactiveFlags;
use super::keyed::KeyedDeps;
use super::node::{Link, LinkKey, NodeKey, NodeKind, ReactiveNode};

/// The dependency graph.
#[derive(Debug, Default)]
pub(crate) struct Graph {
    pub(crate) nodes: SlotMap<NodeKey, ReactiveNode>,
    pub(crate) links: SlotMap<LinkKey, Link>,
    pub(crate) keyed: KeyedDeps,
}

impl Graph {
    /// Create a new empty graph.
    #[cfg(test)]
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a node of the given kind.
    pub(crate) fn insert(&mut self, kind: NodeKind) -> NodeKey {
        self.nodes.insert(ReactiveNode::new(kind))
    }

    #[cfg(test)]
    pub(crate) fn node(&self, key: NodeKey) -> Option<&ReactiveNode> {
        self.nodes.get(key)
    }

    pub(crate) fn link_record(&self, key: LinkKey) -> Option<&Link> {
        self.links.get(key)
    }

    /// Current flags of `key`, or empty if the node is gone.
    pub(crate) fn flags(&self, key: NodeKey) -> ReactiveFlags {
        self.nodes
            .get(key)
            .map(|node| node.flags)
            .unwrap_or_else(ReactiveFlags::empty)
    }

    pub(crate) fn set_flags(&mut self, key: NodeKey, flags: ReactiveFlags) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.flags = flags;
        }
    }

    pub(crate) fn insert_flags(&mut self, key: NodeKey, flags: ReactiveFlags) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.flags.insert(flags);
        }
    }

    pub(crate) fn remove_flags(&mut self, key: NodeKey, flags: ReactiveFlags) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.flags.remove(flags);
        }
    }

    /// First dependency edge of `key`.
    pub(crate) fn deps_of(&self, key: NodeKey) -> Option<LinkKey> {
        self.nodes.get(key).and_then(|node| node.deps)
    }

    /// First subscriber edge of `key`.
    pub(crate) fn subs_of(&self, key: NodeKey) -> Option<LinkKey> {
        self.nodes.get(key).and_then(|node| node.subs)
    }

    pub(crate) fn dependency_count(&self, key: NodeKey) -> usize {
        let mut count = 0;
        let mut cursor = self.deps_of(key);
        while let Some(link) = cursor {
            count += 1;
            cursor = self.links[link].next_dep;
        }
        count
    }

    pub(crate) fn subscriber_count(&self, key: NodeKey) -> usize {
        let mut count = 0;
        let mut cursor = self.subs_of(key);
        while let Some(link) = cursor {
            count += 1;
            cursor = self.links[link].next_sub;
        }
        count
    }

    /// Record that `sub` read `dep`.
    ///
    /// Returns `true` when a new edge was allocated, `false` when an
    /// existing edge was reused or the read was ignored.
    pub(crate) fn link(&mut self, dep: NodeKey, sub: NodeKey) -> bool {
        if dep == sub || !self.nodes.contains_key(dep) {
            return false;
        }
        let Some(sub_node) = self.nodes.get(sub) else {
            return false;
        };
        if sub_node.flags.contains(ReactiveFlags::STOP) {
            return false;
        }

        // Same dependency read twice in a row.
        let prev_dep = sub_node.deps_tail;
        if let Some(prev) = prev_dep {
            if self.links[prev].dep == dep {
                return false;
            }
        }

        // Same dependency in the same slot as last run.
        let recursed_check = sub_node.flags.contains(ReactiveFlags::RECURSED_CHECK);
        let mut next_dep = None;
        if recursed_check {
            next_dep = match prev_dep {
                Some(prev) => self.links[prev].next_dep,
                None => sub_node.deps,
            };
            if let Some(next) = next_dep {
                if self.links[next].dep == dep {
                    self.nodes[sub].deps_tail = Some(next);
                    return false;
                }
            }
        }

        // Already subscribed earlier in this run.
        let prev_sub = self.nodes[dep].subs_tail;
        if let Some(prev) = prev_sub {
            if self.links[prev].sub == sub && (!recursed_check || self.is_valid_link(prev, sub)) {
                return false;
            }
        }

        let link = self.links.insert(Link {
            dep,
            sub,
            prev_dep,
            next_dep,
            prev_sub,
            next_sub: None,
        });

        if let Some(next) = next_dep {
            self.links[next].prev_dep = Some(link);
        }
        match prev_dep {
            Some(prev) => self.links[prev].next_dep = Some(link),
            None => self.nodes[sub].deps = Some(link),
        }
        self.nodes[sub].deps_tail = Some(link);

        match prev_sub {
            Some(prev) => self.links[prev].next_sub = Some(link),
            None => self.nodes[dep].subs = Some(link),
        }
        self.nodes[dep].subs_tail = Some(link);

        true
    }

    /// Remove an edge from both of its lists.
    ///
    /// Returns the edge's `next_dep` so callers can keep walking the
    /// subscriber's dependency list while deleting from it. When the
    /// dependency loses its last subscriber the unwatched cascade runs.
    pub(crate) fn unlink(&mut self, link: LinkKey) -> Option<LinkKey> {
        let (next_dep, orphan) = self.splice_out(link);
        if let Some(dep) = orphan {
            self.unwatched(dep);
        }
        next_dep
    }

    /// Raw O(1) removal. Reports the dependency if it was left without
    /// subscribers.
    fn splice_out(&mut self, key: LinkKey) -> (Option<LinkKey>, Option<NodeKey>) {
        let Some(link) = self.links.remove(key) else {
            return (None, None);
        };

        // The tail may sit anywhere in the list while a run is in progress.
        if let Some(sub) = self.nodes.get_mut(link.sub) {
            if sub.deps_tail == Some(key) {
                sub.deps_tail = link.prev_dep;
            }
        }
        if let Some(next) = link.next_dep {
            self.links[next].prev_dep = link.prev_dep;
        }
        match link.prev_dep {
            Some(prev) => self.links[prev].next_dep = link.next_dep,
            None => {
                if let Some(sub) = self.nodes.get_mut(link.sub) {
                    sub.deps = link.next_dep;
                }
            }
        }

        match link.next_sub {
            Some(next) => self.links[next].prev_sub = link.prev_sub,
            None => {
                if let Some(dep) = self.nodes.get_mut(link.dep) {
                    dep.subs_tail = link.prev_sub;
                }
            }
        }
        let orphaned = match link.prev_sub {
            Some(prev) => {
                self.links[prev].next_sub = link.next_sub;
                false
            }
            None => match self.nodes.get_mut(link.dep) {
                Some(dep) => {
                    dep.subs = link.next_sub;
                    dep.subs.is_none()
                }
                None => false,
            },
        };

        (link.next_dep, orphaned.then_some(link.dep))
    }

    /// A dependency just lost its last subscriber.
    ///
    /// A computed nobody reads lets go of its own dependencies so whole
    /// chains of unread computeds are released, and is marked dirty so it
    /// starts fresh if it is ever read again. Keyed dependencies are
    /// deleted outright.
    fn unwatched(&mut self, dep: NodeKey) {
        let mut orphans: SmallVec<[NodeKey; 8]> = SmallVec::new();
        orphans.push(dep);

        while let Some(key) = orphans.pop() {
            let Some(node) = self.nodes.get_mut(key) else {
                continue;
            };
            if node.subs.is_some() {
                continue;
            }

            let kind = node.kind;
            match kind {
                NodeKind::Computed => {
                    if node.flags.contains(ReactiveFlags::RECURSED_CHECK) {
                        continue;
                    }
                    node.flags = (node.flags - ReactiveFlags::PENDING) | ReactiveFlags::DIRTY;

                    let mut cursor = node.deps;
                    while let Some(link) = cursor {
                        let (next, orphan) = self.splice_out(link);
                        orphans.extend(orphan);
                        cursor = next;
                    }
                }
                NodeKind::Keyed => self.release_keyed(key),
                NodeKind::Signal | NodeKind::Effect => {}
            }
        }
    }

    /// Begin a run of `sub`: rewind its dependency tail and mark it as
    /// rebuilding.
    pub(crate) fn start_tracking(&mut self, sub: NodeKey) {
        if let Some(node) = self.nodes.get_mut(sub) {
            node.deps_tail = None;
            node.flags = (node.flags
                - (ReactiveFlags::RECURSED | ReactiveFlags::DIRTY | ReactiveFlags::PENDING))
                | ReactiveFlags::RECURSED_CHECK;
        }
    }

    /// Finish a run of `sub`: drop every edge that was not re-touched.
    ///
    /// A node stopped during its own run loses all of its edges.
    pub(crate) fn end_tracking(&mut self, sub: NodeKey) {
        let Some(node) = self.nodes.get(sub) else {
            return;
        };

        let mut cursor = if node.flags.contains(ReactiveFlags::STOP) {
            node.deps
        } else {
            match node.deps_tail {
                Some(tail) => self.links[tail].next_dep,
                None => node.deps,
            }
        };
        while let Some(link) = cursor {
            cursor = self.unlink(link);
        }

        self.remove_flags(sub, ReactiveFlags::RECURSED_CHECK);
    }

    /// Whether `check` lies within the part of `sub`'s dependency list that
    /// was already re-touched during the current run.
    pub(crate) fn is_valid_link(&self, check: LinkKey, sub: NodeKey) -> bool {
        let Some(node) = self.nodes.get(sub) else {
            return false;
        };
        let Some(tail) = node.deps_tail else {
            return false;
        };

        let mut cursor = node.deps;
        while let Some(link) = cursor {
            if link == check {
                return true;
            }
            if link == tail {
                break;
            }
            cursor = self.links[link].next_dep;
        }
        false
    }

    /// Unlink every dependency of `key`.
    pub(crate) fn detach_deps(&mut self, key: NodeKey) {
        let mut cursor = self.deps_of(key);
        while let Some(link) = cursor {
            cursor = self.unlink(link);
        }
    }

    /// Unlink every subscriber of `key`. `key` itself is not treated as
    /// unwatched.
    pub(crate) fn detach_subs(&mut self, key: NodeKey) {
        while let Some(link) = self.subs_of(key) {
            self.splice_out(link);
        }
    }

    /// Remove a node and all of its edges.
    pub(crate) fn remove_node(&mut self, key: NodeKey) -> Option<ReactiveNode> {
        if !self.nodes.contains_key(key) {
            return None;
        }

        // Keep the cascade from visiting the node we are removing.
        self.insert_flags(key, ReactiveFlags::RECURSED_CHECK);
        self.detach_deps(key);
        self.detach_subs(key);
        self.forget_keyed_entry(key);
        self.nodes.remove(key)
    }

    #[cfg(test)]
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[cfg(test)]
    pub(crate) fn link_count(&self) -> usize {
        self.links.len()
    }
}
