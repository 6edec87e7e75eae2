//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! and effects. It owns the dependency graph and decides when things run.
//!
//! # How It Works
//!
//! 1. When a signal, computed, or effect is created, it gets a node in the
//!    graph.
//!
//! 2. When a computed or effect reads something, the runtime links the
//!    read node to the active subscriber.
//!
//! 3. When a signal's value changes, the runtime:
//!    a. Marks direct subscribers dirty and everything beyond them pending
//!    b. Buffers the effects it reached
//!    c. Flushes the buffer when the outermost batch ends
//!    d. Computeds stay lazy: they settle when read
//!
//! # Thread Model
//!
//! Every thread has its own runtime. Handles are `!Send`, so a graph is
//! only ever touched by the thread that built it.
//!
//! No `RefCell` borrow of the runtime is held while user code runs. Every
//! call back into a getter, an effect body, or a hook happens between
//! short borrows.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use slotmap::SecondaryMap;
use smallvec::SmallVec;

use crate::graph::{Graph, LinkKey, NodeKey, NodeKind, ReactiveFlags};

use super::batch::BatchGuard;
use super::debug::{DepInfo, TrackOpType, TriggerOpType};
use super::effect::EffectInner;
use super::scheduler::JobQueue;

thread_local! {
    static RUNTIME: Runtime = Runtime::default();
}

/// A node whose value can be recomputed on demand.
pub(crate) trait Recompute {
    /// Re-run the getter. Returns whether the cached value changed.
    fn update(&self) -> bool;

    /// Force the next read to re-run the getter.
    fn invalidate(&self);
}

/// Per-thread reactive state.
#[derive(Default)]
pub(crate) struct Runtime {
    graph: RefCell<Graph>,

    /// The node that reads are linked to.
    active_sub: Cell<Option<NodeKey>>,

    /// The effect whose body is on the stack, tracked or not.
    running_effect: Cell<Option<NodeKey>>,

    pub(crate) batch_depth: Cell<u32>,
    pub(crate) pending_effects: RefCell<VecDeque<NodeKey>>,

    pub(crate) jobs: RefCell<JobQueue>,
    pub(crate) flushing: Cell<bool>,

    computeds: RefCell<SecondaryMap<NodeKey, Weak<dyn Recompute>>>,

    /// Active effects are owned here; dropping a handle does not stop one.
    effects: RefCell<SecondaryMap<NodeKey, Rc<EffectInner>>>,
}

pub(crate) fn with_runtime<R>(f: impl FnOnce(&Runtime) -> R) -> R {
    RUNTIME.with(f)
}

pub(crate) fn with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> R {
    RUNTIME.with(|rt| f(&mut rt.graph.borrow_mut()))
}

/// Like [`with_graph`], but returns `None` instead of panicking when the
/// graph is already borrowed or the thread is shutting down. For `Drop`.
pub(crate) fn try_with_graph<R>(f: impl FnOnce(&mut Graph) -> R) -> Option<R> {
    RUNTIME
        .try_with(|rt| rt.graph.try_borrow_mut().ok().map(|mut graph| f(&mut graph)))
        .ok()
        .flatten()
}

pub(crate) fn create_node(kind: NodeKind) -> NodeKey {
    with_graph(|graph| graph.insert(kind))
}

/// Remove a node whose handle was dropped.
pub(crate) fn remove_node(node: NodeKey) {
    // During thread teardown the whole graph goes away anyway.
    let _ = RUNTIME.try_with(|rt| {
        match rt.graph.try_borrow_mut() {
            Ok(mut graph) => {
                graph.remove_node(node);
            }
            Err(_) => tracing::warn!(node = ?node, "graph busy while dropping a node; leaking it"),
        }
        if let Ok(mut computeds) = rt.computeds.try_borrow_mut() {
            computeds.remove(node);
        }
    });
}

pub(crate) fn active_sub() -> Option<NodeKey> {
    RUNTIME.with(|rt| rt.active_sub.get())
}

pub(crate) fn replace_active_sub(sub: Option<NodeKey>) -> Option<NodeKey> {
    RUNTIME
        .try_with(|rt| rt.active_sub.replace(sub))
        .ok()
        .flatten()
}

pub(crate) fn running_effect() -> Option<Rc<EffectInner>> {
    RUNTIME
        .with(|rt| rt.running_effect.get())
        .and_then(effect_of)
}

pub(crate) fn replace_running_effect(node: Option<NodeKey>) -> Option<NodeKey> {
    RUNTIME
        .try_with(|rt| rt.running_effect.replace(node))
        .ok()
        .flatten()
}

pub(crate) fn replace_flushing(flushing: bool) -> Option<bool> {
    RUNTIME.try_with(|rt| rt.flushing.replace(flushing)).ok()
}

pub(crate) fn register_computed(node: NodeKey, computed: Weak<dyn Recompute>) {
    RUNTIME.with(|rt| rt.computeds.borrow_mut().insert(node, computed));
}

pub(crate) fn register_effect(node: NodeKey, effect: Rc<EffectInner>) {
    RUNTIME.with(|rt| rt.effects.borrow_mut().insert(node, effect));
}

pub(crate) fn effect_of(node: NodeKey) -> Option<Rc<EffectInner>> {
    RUNTIME.with(|rt| rt.effects.borrow().get(node).cloned())
}

/// Give up the runtime's ownership of a stopped effect. The caller decides
/// when the returned handle is dropped.
pub(crate) fn release_effect(node: NodeKey) -> Option<Rc<EffectInner>> {
    RUNTIME.with(|rt| rt.effects.borrow_mut().remove(node))
}

/// Link `dep` to the active subscriber, if any.
pub(crate) fn track_read(dep: NodeKey, op: TrackOpType) {
    let Some(sub) = active_sub() else {
        return;
    };
    if !with_graph(|graph| graph.link(dep, sub)) {
        return;
    }
    if let Some(effect) = effect_of(sub) {
        effect.on_track(dep, op);
    }
}

/// Announce that `dep` changed.
///
/// Marks everything downstream and buffers reached effects. Unless a batch
/// is open, the buffer is flushed before this returns.
pub(crate) fn trigger_node(dep: NodeKey, op: TriggerOpType) {
    let _batch = BatchGuard::start();

    let queued: SmallVec<[NodeKey; 8]> = RUNTIME.with(|rt| {
        let mut graph = rt.graph.borrow_mut();
        let Some(head) = graph.subs_of(dep) else {
            return SmallVec::new();
        };
        let mut pending = rt.pending_effects.borrow_mut();
        let before = pending.len();
        graph.propagate(head, &mut pending);
        pending.range(before..).copied().collect()
    });

    tracing::trace!(dep = ?dep, ?op, queued = queued.len(), "triggered");

    let mut info = None;
    for node in queued {
        let Some(effect) = effect_of(node) else {
            continue;
        };
        if effect.wants_trigger_events() {
            let info = info.get_or_insert_with(|| with_graph(|graph| DepInfo::capture(graph, dep)));
            effect.record_trigger(info.clone(), op);
        }
    }
}

/// Hand every buffered effect to its scheduler, oldest first.
///
/// Entries are popped one at a time; effects that run may buffer more.
pub(crate) fn flush_effects() {
    while let Some(node) = RUNTIME.with(|rt| rt.pending_effects.borrow_mut().pop_front()) {
        if let Some(effect) = effect_of(node) {
            effect.schedule();
        }
    }
}

/// Re-run the computed behind `node`. Returns whether its value changed.
pub(crate) fn update_computed(node: NodeKey) -> bool {
    let computed = RUNTIME.with(|rt| rt.computeds.borrow().get(node).and_then(Weak::upgrade));
    match computed {
        Some(computed) => computed.update(),
        None => false,
    }
}

/// Upgrade the pending subscribers of `node` after its value changed.
pub(crate) fn shallow_propagate(node: NodeKey) {
    with_graph(|graph| {
        if let Some(head) = graph.subs_of(node) {
            graph.shallow_propagate(head);
        }
    });
}

/// Drop the `STALE` marks a pull was resolving when it unwound.
///
/// A stale node takes later writes without forwarding them, so leaving the
/// marks would cut off everything downstream for good. Computeds on the
/// path are invalidated instead, so their next read still re-evaluates.
struct PullUnwind {
    root: NodeKey,
    /// Links followed into pending computeds, so the walk can come back out.
    stack: SmallVec<[LinkKey; 8]>,
}

impl Drop for PullUnwind {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let nodes = try_with_graph(|graph| {
            let mut nodes: SmallVec<[NodeKey; 8]> = self
                .stack
                .iter()
                .filter_map(|&link| graph.link_record(link).map(|record| record.dep))
                .collect();
            nodes.push(self.root);
            for &node in &nodes {
                graph.remove_flags(node, ReactiveFlags::STALE);
            }
            nodes
        })
        .unwrap_or_default();

        for node in nodes {
            let computed = RUNTIME
                .try_with(|rt| {
                    rt.computeds
                        .try_borrow()
                        .ok()
                        .and_then(|computeds| computeds.get(node).and_then(Weak::upgrade))
                })
                .ok()
                .flatten();
            if let Some(computed) = computed {
                computed.invalidate();
            }
        }
    }
}

enum Probe {
    /// The link or its dependency no longer exists.
    Gone,
    /// The subscriber was already confirmed dirty.
    SubDirty,
    /// The dependency is a dirty computed; recompute it.
    Refresh(NodeKey),
    /// The dependency is a pending computed; check its own inputs first.
    Descend { dep: NodeKey, head: LinkKey },
    /// Nothing here changed.
    Clean,
}

fn probe(graph: &mut Graph, link: LinkKey, sub: NodeKey) -> Probe {
    if graph.flags(sub).contains(ReactiveFlags::DIRTY) {
        return Probe::SubDirty;
    }
    let Some(dep) = graph.link_record(link).map(|record| record.dep) else {
        return Probe::Gone;
    };
    let flags = graph.flags(dep);
    if flags.contains(ReactiveFlags::MUTABLE | ReactiveFlags::DIRTY) {
        Probe::Refresh(dep)
    } else if flags.contains(ReactiveFlags::MUTABLE | ReactiveFlags::PENDING) {
        match graph.deps_of(dep) {
            Some(head) => Probe::Descend { dep, head },
            None => {
                graph.remove_flags(dep, ReactiveFlags::PENDING);
                Probe::Clean
            }
        }
    } else {
        Probe::Clean
    }
}

/// Pull phase: decide whether a pending `sub` really has to re-run,
/// starting from its dependency list at `link`.
///
/// Walks depth first through pending computeds, recomputing the ones whose
/// inputs provably changed and stopping at the first change that reaches
/// `sub`. Intermediate computeds found clean have `PENDING` cleared. A
/// missing link means the graph changed under us; that counts as dirty.
///
/// If a getter panics, `sub` and the computeds being descended through are
/// left clean rather than stale, and the panic continues to the reader.
pub(crate) fn check_dirty(mut link: LinkKey, mut sub: NodeKey) -> bool {
    let mut walk = PullUnwind {
        root: sub,
        stack: SmallVec::new(),
    };

    'top: loop {
        let mut dirty = false;

        match with_graph(|graph| probe(graph, link, sub)) {
            Probe::Gone => return true,
            Probe::SubDirty => dirty = true,
            Probe::Refresh(dep) => {
                if update_computed(dep) {
                    shallow_propagate(dep);
                    dirty = true;
                }
            }
            Probe::Descend { dep, head } => {
                walk.stack.push(link);
                link = head;
                sub = dep;
                continue;
            }
            Probe::Clean => {}
        }

        if !dirty {
            match with_graph(|graph| graph.link_record(link).map(|record| record.next_dep)) {
                None => return true,
                Some(Some(next)) => {
                    link = next;
                    continue;
                }
                Some(None) => {}
            }
        }

        while let Some(parent_link) = walk.stack.pop() {
            let Some(parent) = with_graph(|graph| graph.link_record(parent_link).copied()) else {
                return true;
            };

            if dirty {
                if update_computed(sub) {
                    shallow_propagate(sub);
                    sub = parent.sub;
                    continue;
                }
            } else {
                with_graph(|graph| graph.remove_flags(sub, ReactiveFlags::PENDING));
            }

            sub = parent.sub;
            if let Some(next) = parent.next_dep {
                link = next;
                continue 'top;
            }
            dirty = false;
        }

        return dirty;
    }
}

#[cfg(test)]
pub(crate) fn node_count() -> usize {
    with_graph(|graph| graph.node_count())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_are_removed_from_the_graph() {
        let before = node_count();
        let node = create_node(NodeKind::Signal);
        assert_eq!(node_count(), before + 1);

        remove_node(node);
        assert_eq!(node_count(), before);
    }

    #[test]
    fn track_read_needs_an_active_subscriber() {
        let dep = create_node(NodeKind::Signal);
        let sub = create_node(NodeKind::Computed);

        track_read(dep, TrackOpType::Get);
        assert_eq!(with_graph(|g| g.subscriber_count(dep)), 0);

        let previous = replace_active_sub(Some(sub));
        track_read(dep, TrackOpType::Get);
        replace_active_sub(previous);
        assert_eq!(with_graph(|g| g.subscriber_count(dep)), 1);

        remove_node(sub);
        remove_node(dep);
    }

    #[test]
    fn pending_without_changed_inputs_is_clean() {
        let s = create_node(NodeKind::Signal);
        let c = create_node(NodeKind::Computed);
        let e = create_node(NodeKind::Effect);
        with_graph(|g| {
            g.start_tracking(c);
            g.link(s, c);
            g.end_tracking(c);
            g.start_tracking(e);
            g.link(c, e);
            g.end_tracking(e);
            g.set_flags(c, ReactiveFlags::MUTABLE | ReactiveFlags::PENDING);
            g.set_flags(e, ReactiveFlags::WATCHING | ReactiveFlags::PENDING);
        });

        let head = with_graph(|g| g.deps_of(e)).unwrap();
        assert!(!check_dirty(head, e));
        assert!(!with_graph(|g| g.flags(c)).contains(ReactiveFlags::PENDING));

        for node in [e, c, s] {
            remove_node(node);
        }
    }

    #[test]
    fn dirty_subscriber_short_circuits() {
        let s = create_node(NodeKind::Signal);
        let e = create_node(NodeKind::Effect);
        with_graph(|g| {
            g.start_tracking(e);
            g.link(s, e);
            g.end_tracking(e);
            g.insert_flags(e, ReactiveFlags::DIRTY);
        });

        let head = with_graph(|g| g.deps_of(e)).unwrap();
        assert!(check_dirty(head, e));

        remove_node(e);
        remove_node(s);
    }
}
