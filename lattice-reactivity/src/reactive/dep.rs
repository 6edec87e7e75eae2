//! Keyed Tracking
//!
//! Entry points for collaborators that wrap plain data instead of holding
//! signals: a reactive map calls [`track`] from its getters and
//! [`trigger`] from its mutators. Dependency nodes are created lazily on
//! the first tracked read of a `(target, key)` pair and released once no
//! reader subscribes to them.

use smallvec::SmallVec;

use crate::graph::{DepKey, NodeKey, ReactiveFlags, TargetId};

use super::batch::batch;
use super::debug::{TrackOpType, TriggerOpType};
use super::runtime::{self, with_graph};

/// Record that the running computation read `key` of `target`.
///
/// Outside a tracking context, or inside a stopped effect, this does
/// nothing and allocates nothing.
pub fn track(target: TargetId, op: TrackOpType, key: impl Into<DepKey>) {
    let Some(sub) = runtime::active_sub() else {
        return;
    };
    let key = key.into();
    let dep = with_graph(|graph| {
        // A stopped reader links nothing, so nothing would ever release the node.
        if graph.flags(sub).contains(ReactiveFlags::STOP) {
            return None;
        }
        Some(graph.keyed_dep_or_insert(target, key))
    });
    if let Some(dep) = dep {
        runtime::track_read(dep, op);
    }
}

/// Announce a write to `target`.
///
/// - `Set` invalidates readers of `key`.
/// - `Add` and `Delete` also invalidate iteration over the target.
/// - `Clear` invalidates every key of the target; `key` is ignored.
///
/// All affected dependencies are triggered in one batch.
pub fn trigger(target: TargetId, op: TriggerOpType, key: Option<DepKey>) {
    let deps: SmallVec<[NodeKey; 4]> = with_graph(|graph| match op {
        TriggerOpType::Clear => graph.keyed_deps_of(target).into_iter().collect(),
        TriggerOpType::Set => key
            .as_ref()
            .and_then(|key| graph.keyed_dep(target, key))
            .into_iter()
            .collect(),
        TriggerOpType::Add | TriggerOpType::Delete => {
            let mut deps: SmallVec<[NodeKey; 4]> = key
                .as_ref()
                .and_then(|key| graph.keyed_dep(target, key))
                .into_iter()
                .collect();
            if key != Some(DepKey::Iterate) {
                deps.extend(graph.keyed_dep(target, &DepKey::Iterate));
            }
            deps
        }
    });

    if deps.is_empty() {
        return;
    }

    tracing::trace!(target_id = target.raw(), ?op, deps = deps.len(), "keyed trigger");
    batch(|| {
        for dep in deps {
            runtime::trigger_node(dep, op);
        }
    });
}

/// Drop every keyed dependency of `target`.
///
/// Call when the target goes away. Subscribers lose the edge without
/// being notified.
pub fn forget_target(target: TargetId) {
    with_graph(|graph| graph.forget_target(target));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{effect, Computed, Effect};
    use std::cell::{Cell, RefCell};
    use std::collections::BTreeMap;
    use std::rc::Rc;

    /// Minimal reactive map: plain data plus track/trigger calls.
    struct ReactiveMap {
        id: TargetId,
        data: RefCell<BTreeMap<String, i32>>,
    }

    impl ReactiveMap {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                id: TargetId::next(),
                data: RefCell::new(BTreeMap::new()),
            })
        }

        fn get(&self, key: &str) -> Option<i32> {
            track(self.id, TrackOpType::Get, key);
            self.data.borrow().get(key).copied()
        }

        fn len(&self) -> usize {
            track(self.id, TrackOpType::Iterate, DepKey::Iterate);
            self.data.borrow().len()
        }

        fn insert(&self, key: &str, value: i32) {
            let previous = self.data.borrow_mut().insert(key.to_owned(), value);
            match previous {
                None => trigger(self.id, TriggerOpType::Add, Some(key.into())),
                Some(old) if old != value => trigger(self.id, TriggerOpType::Set, Some(key.into())),
                Some(_) => {}
            }
        }

        fn clear(&self) {
            self.data.borrow_mut().clear();
            trigger(self.id, TriggerOpType::Clear, None);
        }
    }

    #[test]
    fn set_only_reaches_readers_of_that_key() {
        let map = ReactiveMap::new();
        map.insert("a", 1);
        map.insert("b", 2);

        let runs = Rc::new(Cell::new(0));
        let (m, r) = (map.clone(), runs.clone());
        let _e = effect(move || {
            m.get("a");
            r.set(r.get() + 1);
        });

        map.insert("b", 20);
        assert_eq!(runs.get(), 1);

        map.insert("a", 10);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn add_reaches_iteration() {
        let map = ReactiveMap::new();
        let m = map.clone();
        let len = Computed::new(move |_| m.len());

        assert_eq!(len.get(), 0);
        map.insert("x", 1);
        assert_eq!(len.get(), 1);

        map.insert("x", 2);
        assert_eq!(len.get(), 1);
    }

    #[test]
    fn clear_reaches_every_key() {
        let map = ReactiveMap::new();
        map.insert("a", 1);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let (m, s) = (map.clone(), seen.clone());
        let _e = effect(move || s.borrow_mut().push(m.get("a")));

        map.clear();
        assert_eq!(*seen.borrow(), vec![Some(1), None]);
    }

    #[test]
    fn untracked_reads_allocate_nothing() {
        let map = ReactiveMap::new();
        let before = runtime::node_count();
        map.get("a");
        assert_eq!(runtime::node_count(), before);
    }

    #[test]
    fn keyed_nodes_are_released_with_their_last_reader() {
        let map = ReactiveMap::new();
        let before = runtime::node_count();

        let m = map.clone();
        let e = effect(move || {
            m.get("a");
        });
        assert_eq!(runtime::node_count(), before + 2);

        e.stop();
        drop(e);
        assert_eq!(runtime::node_count(), before);
    }

    #[test]
    fn effect_stopped_mid_run_allocates_nothing() {
        let map = ReactiveMap::new();
        let before = runtime::node_count();

        let handle: Rc<RefCell<Option<Effect>>> = Rc::default();
        let (m, h) = (map.clone(), handle.clone());
        let e = effect(move || {
            if let Some(this) = h.borrow().as_ref() {
                this.stop();
                m.get("a");
            }
        });
        *handle.borrow_mut() = Some(e.clone());
        e.run();
        assert!(!e.is_active());
        assert_eq!(runtime::node_count(), before + 1);

        handle.borrow_mut().take();
        drop(e);
        assert_eq!(runtime::node_count(), before);
    }

    #[test]
    fn forget_target_detaches_readers() {
        let map = ReactiveMap::new();
        let runs = Rc::new(Cell::new(0));
        let (m, r) = (map.clone(), runs.clone());
        let e = effect(move || {
            m.get("a");
            r.set(r.get() + 1);
        });

        forget_target(map.id);
        assert_eq!(e.dependency_count(), 0);

        map.insert("a", 1);
        assert_eq!(runs.get(), 1);
    }
}
