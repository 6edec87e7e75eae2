//! Push Phase
//!
//! When a dependency changes, [`Graph::propagate`] walks outward through
//! subscriber lists and marks what it reaches:
//!
//! 1. Direct subscribers of the changed node are marked `DIRTY`: one of
//!    their inputs definitely changed.
//!
//! 2. Everything further out is marked `PENDING`: an input *might* have
//!    changed, but only recomputing the intermediate computeds can tell.
//!
//! 3. Effects reached by the walk are appended to a buffer instead of
//!    being run. The buffer is flushed when the outermost batch ends, so
//!    several writes collapse into one flush.
//!
//! Resolving `PENDING` into a verdict is the pull phase
//! (`check_dirty` in the runtime), which only happens for nodes that are
//! actually read or run.
//!
//! The walk uses an explicit stack so deep graphs cannot overflow the
//! call stack.

use std::collections::VecDeque;

use smallvec::SmallVec;

use super::flags::ReactiveFlags;
use super::node::{LinkKey, NodeKey};
use super::system::Graph;

impl Graph {
    /// Mark everything downstream of the subscriber list starting at `head`
    /// and queue the effects that need to be notified.
    pub(crate) fn propagate(&mut self, head: LinkKey, effects: &mut VecDeque<NodeKey>) {
        // Each saved level remembers the next sibling to visit and the
        // flag its siblings receive.
        let mut stack: SmallVec<[(Option<LinkKey>, ReactiveFlags); 16]> = SmallVec::new();
        let mut link = head;
        let mut next = self.links[head].next_sub;
        let mut target = ReactiveFlags::DIRTY;

        'walk: loop {
            let sub = self.links[link].sub;
            let forward = self.mark(link, sub, target);

            if forward.contains(ReactiveFlags::WATCHING) {
                effects.push_back(sub);
            }

            if forward.contains(ReactiveFlags::MUTABLE) {
                if let Some(sub_subs) = self.subs_of(sub) {
                    stack.push((next, target));
                    link = sub_subs;
                    next = self.links[sub_subs].next_sub;
                    target = ReactiveFlags::PENDING;
                    continue;
                }
            }

            if let Some(sibling) = next {
                link = sibling;
                next = self.links[sibling].next_sub;
                continue;
            }

            while let Some((saved, saved_target)) = stack.pop() {
                if let Some(sibling) = saved {
                    link = sibling;
                    next = self.links[sibling].next_sub;
                    target = saved_target;
                    continue 'walk;
                }
            }

            break;
        }
    }

    /// Apply `target` to the subscriber at the end of `link`.
    ///
    /// Returns which of `MUTABLE`/`WATCHING` the walk should act on: an
    /// empty set means this subscriber was already accounted for.
    fn mark(&mut self, link: LinkKey, sub: NodeKey, target: ReactiveFlags) -> ReactiveFlags {
        let flags = self.flags(sub);
        let kind = flags & ReactiveFlags::REACTIVE;
        if kind.is_empty() {
            return ReactiveFlags::empty();
        }

        if !flags.intersects(ReactiveFlags::RECURSION | ReactiveFlags::STALE) {
            // Clean.
            self.set_flags(sub, flags | target);
            kind
        } else if !flags.intersects(ReactiveFlags::RECURSION) {
            // Already marked and already forwarded. A direct write still
            // upgrades a maybe into a confirmed dirty.
            if target == ReactiveFlags::DIRTY && !flags.contains(ReactiveFlags::DIRTY) {
                self.set_flags(sub, flags | ReactiveFlags::DIRTY);
            }
            ReactiveFlags::empty()
        } else if !flags.contains(ReactiveFlags::RECURSED_CHECK) {
            // Left over from an earlier run that was written to mid-rebuild.
            self.set_flags(sub, (flags - ReactiveFlags::RECURSED) | target);
            kind
        } else if !flags.contains(ReactiveFlags::RECURSED) && self.is_valid_link(link, sub) {
            // Mid-rebuild, and this input was already read during the
            // current run: the value it saw is stale. Defer instead of
            // re-entering the node; downstream of a computed still hears
            // about it.
            self.set_flags(sub, flags | ReactiveFlags::RECURSED | target);
            kind & ReactiveFlags::MUTABLE
        } else {
            ReactiveFlags::empty()
        }
    }

    /// Upgrade every `PENDING` subscriber in the list starting at `head` to
    /// `DIRTY`. Does not walk further out.
    pub(crate) fn shallow_propagate(&mut self, head: LinkKey) {
        let mut cursor = Some(head);
        while let Some(link) = cursor {
            let Some(record) = self.link_record(link).copied() else {
                break;
            };
            let flags = self.flags(record.sub);
            if flags & ReactiveFlags::STALE == ReactiveFlags::PENDING {
                self.set_flags(record.sub, flags | ReactiveFlags::DIRTY);
            }
            cursor = record.next_sub;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::NodeKind;

    fn settle(graph: &mut Graph, sub: NodeKey, reads: &[NodeKey]) {
        graph.start_tracking(sub);
        for &dep in reads {
            graph.link(dep, sub);
        }
        graph.end_tracking(sub);
    }

    fn propagate_from(graph: &mut Graph, changed: NodeKey) -> Vec<NodeKey> {
        let mut effects = VecDeque::new();
        if let Some(head) = graph.subs_of(changed) {
            graph.propagate(head, &mut effects);
        }
        effects.into_iter().collect()
    }

    #[test]
    fn direct_subscribers_become_dirty_and_transitive_pending() {
        let mut graph = Graph::new();
        let s = graph.insert(NodeKind::Signal);
        let c = graph.insert(NodeKind::Computed);
        let e = graph.insert(NodeKind::Effect);
        settle(&mut graph, c, &[s]);
        settle(&mut graph, e, &[c]);

        let queued = propagate_from(&mut graph, s);

        assert!(graph.flags(c).contains(ReactiveFlags::DIRTY));
        assert!(graph.flags(e).contains(ReactiveFlags::PENDING));
        assert!(!graph.flags(e).contains(ReactiveFlags::DIRTY));
        assert_eq!(queued, vec![e]);
    }

    #[test]
    fn diamond_queues_the_effect_once() {
        let mut graph = Graph::new();
        let a = graph.insert(NodeKind::Signal);
        let b = graph.insert(NodeKind::Computed);
        let c = graph.insert(NodeKind::Computed);
        let e = graph.insert(NodeKind::Effect);
        settle(&mut graph, b, &[a]);
        settle(&mut graph, c, &[a]);
        settle(&mut graph, e, &[b, c]);

        let queued = propagate_from(&mut graph, a);

        assert_eq!(queued, vec![e]);
    }

    #[test]
    fn direct_write_upgrades_pending() {
        let mut graph = Graph::new();
        let s = graph.insert(NodeKind::Signal);
        let c = graph.insert(NodeKind::Computed);
        let e = graph.insert(NodeKind::Effect);
        settle(&mut graph, c, &[s]);
        settle(&mut graph, e, &[c, s]);

        let queued = propagate_from(&mut graph, s);

        assert!(graph.flags(e).contains(ReactiveFlags::DIRTY));
        assert_eq!(queued, vec![e]);
    }

    #[test]
    fn write_during_rebuild_sets_recursed_without_queueing() {
        let mut graph = Graph::new();
        let s = graph.insert(NodeKind::Signal);
        let e = graph.insert(NodeKind::Effect);
        settle(&mut graph, e, &[s]);

        graph.start_tracking(e);
        graph.link(s, e);
        let queued = propagate_from(&mut graph, s);
        graph.end_tracking(e);

        assert!(queued.is_empty());
        assert!(graph.flags(e).contains(ReactiveFlags::RECURSED));
        assert!(graph.flags(e).contains(ReactiveFlags::DIRTY));
    }

    #[test]
    fn write_to_unread_input_during_rebuild_is_ignored() {
        let mut graph = Graph::new();
        let s = graph.insert(NodeKind::Signal);
        let t = graph.insert(NodeKind::Signal);
        let e = graph.insert(NodeKind::Effect);
        settle(&mut graph, e, &[s, t]);

        graph.start_tracking(e);
        graph.link(s, e);
        let queued = propagate_from(&mut graph, t);
        graph.link(t, e);
        graph.end_tracking(e);

        assert!(queued.is_empty());
        assert!(!graph.flags(e).intersects(ReactiveFlags::RECURSED | ReactiveFlags::STALE));
    }

    #[test]
    fn stale_recursed_is_cleared_by_the_next_write() {
        let mut graph = Graph::new();
        let s = graph.insert(NodeKind::Signal);
        let e = graph.insert(NodeKind::Effect);
        settle(&mut graph, e, &[s]);
        graph.set_flags(
            e,
            ReactiveFlags::WATCHING | ReactiveFlags::RECURSED | ReactiveFlags::DIRTY,
        );

        let queued = propagate_from(&mut graph, s);

        assert_eq!(queued, vec![e]);
        assert!(!graph.flags(e).contains(ReactiveFlags::RECURSED));
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let mut graph = Graph::new();
        let s = graph.insert(NodeKind::Signal);
        let mut prev = s;
        for _ in 0..10_000 {
            let c = graph.insert(NodeKind::Computed);
            settle(&mut graph, c, &[prev]);
            prev = c;
        }
        let e = graph.insert(NodeKind::Effect);
        settle(&mut graph, e, &[prev]);

        let queued = propagate_from(&mut graph, s);

        assert_eq!(queued, vec![e]);
    }

    #[test]
    fn shallow_propagate_only_touches_pending() {
        let mut graph = Graph::new();
        let c = graph.insert(NodeKind::Computed);
        let x = graph.insert(NodeKind::Effect);
        let y = graph.insert(NodeKind::Effect);
        settle(&mut graph, x, &[c]);
        settle(&mut graph, y, &[c]);
        graph.set_flags(x, ReactiveFlags::WATCHING | ReactiveFlags::PENDING);

        graph.shallow_propagate(graph.subs_of(c).unwrap());

        assert!(graph.flags(x).contains(ReactiveFlags::DIRTY));
        assert!(!graph.flags(y).contains(ReactiveFlags::DIRTY));
    }
}
