//! Reactive Context
//!
//! The reactive context tracks which computation is currently reading.
//! When a signal or computed is read, the runtime links it to the active
//! subscriber, if there is one.
//!
//! # Implementation
//!
//! The active subscriber is a single thread-local slot in the runtime.
//! Entering a context swaps a new subscriber in and the guard swaps the
//! previous one back on drop, so nested computations restore correctly
//! even when one of them panics.

use crate::graph::NodeKey;

use super::runtime;

/// Guard that restores the previous active subscriber when dropped.
pub(crate) struct ReactiveContext {
    previous: Option<NodeKey>,
}

impl ReactiveContext {
    /// Make `sub` the active subscriber until the guard is dropped.
    ///
    /// `None` suspends tracking.
    pub(crate) fn enter(sub: Option<NodeKey>) -> Self {
        Self {
            previous: runtime::replace_active_sub(sub),
        }
    }

    /// The subscriber that reads are currently linked to.
    pub(crate) fn current_subscriber() -> Option<NodeKey> {
        runtime::active_sub()
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        runtime::replace_active_sub(self.previous);
    }
}

/// One run of a computed or effect body.
///
/// On creation the node's dependency cursor is rewound and the node
/// becomes the active subscriber. On drop, whatever was not re-read is
/// unlinked and the previous subscriber is restored.
pub(crate) struct TrackingScope {
    node: NodeKey,
    _context: ReactiveContext,
}

impl TrackingScope {
    pub(crate) fn start(node: NodeKey) -> Self {
        runtime::with_graph(|graph| graph.start_tracking(node));
        Self {
            node,
            _context: ReactiveContext::enter(Some(node)),
        }
    }
}

impl Drop for TrackingScope {
    fn drop(&mut self) {
        let node = self.node;
        if runtime::try_with_graph(|graph| graph.end_tracking(node)).is_none() {
            tracing::warn!(node = ?node, "could not finish tracking; runtime unavailable");
        }
    }
}

/// Run `f` without linking anything it reads to the caller.
///
/// ```
/// use lattice_reactivity::{effect, untracked, Signal};
///
/// let a = Signal::new(1);
/// let b = Signal::new(10);
/// let (a2, b2) = (a.clone(), b.clone());
/// let _e = effect(move || {
///     let _ = a2.get() + untracked(|| b2.get());
/// });
/// assert_eq!(a.subscriber_count(), 1);
/// assert_eq!(b.subscriber_count(), 0);
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _context = ReactiveContext::enter(None);
    f()
}

/// Whether reads right now would be tracked.
pub fn is_tracking() -> bool {
    ReactiveContext::current_subscriber().is_some()
}
