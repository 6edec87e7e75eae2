//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! is a node in the dependency graph that computeds and effects link to.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a computed or effect is running, the
//!    runtime links the signal to that subscriber.
//!
//! 2. When a signal is written with a value its equality function
//!    considers different, the write propagates through the graph.
//!
//! 3. Writing an equal value does nothing at all.
//!
//! # Threading
//!
//! Signals are `!Send`. Each thread has its own graph and a signal belongs
//! to the thread that created it.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::Rc;

use crate::graph::{NodeId, NodeKey, NodeKind};

use super::debug::{TrackOpType, TriggerOpType};
use super::runtime::{self, with_graph};

struct SignalInner<T> {
    node: NodeKey,
    value: RefCell<T>,
    equals: fn(&T, &T) -> bool,
}

impl<T> Drop for SignalInner<T> {
    fn drop(&mut self) {
        runtime::remove_node(self.node);
    }
}

/// A reactive signal holding a value of type T.
///
/// Clones share the same value and node.
///
/// # Example
///
/// ```
/// use lattice_reactivity::Signal;
///
/// let count = Signal::new(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// count.update(|n| n + 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + PartialEq + 'static,
{
    /// Create a signal that compares values with `==`.
    pub fn new(value: T) -> Self {
        Self::with_equality(value, T::eq)
    }
}

impl<T> Signal<T>
where
    T: Clone + 'static,
{
    /// Create a signal with a custom equality. A write whose value is
    /// `equals` to the current one is a no-op.
    pub fn with_equality(value: T, equals: fn(&T, &T) -> bool) -> Self {
        let node = runtime::create_node(NodeKind::Signal);
        Self {
            inner: Rc::new(SignalInner {
                node,
                value: RefCell::new(value),
                equals,
            }),
        }
    }

    /// Get the signal's node id.
    pub fn id(&self) -> NodeId {
        self.inner.node.into()
    }

    /// Get the current value, tracking the read.
    pub fn get(&self) -> T {
        self.track();
        self.peek()
    }

    /// Borrow the current value, tracking the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Get the current value without tracking.
    pub fn peek(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Set a new value.
    ///
    /// If it differs from the current one, every dependent is marked and
    /// effects are flushed (or buffered, inside a batch).
    pub fn set(&self, value: T) {
        let unchanged = (self.inner.equals)(&self.inner.value.borrow(), &value);
        if unchanged {
            return;
        }
        *self.inner.value.borrow_mut() = value;
        runtime::trigger_node(self.inner.node, TriggerOpType::Set);
    }

    /// Update the value using a function of the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        let node = self.inner.node;
        with_graph(|graph| graph.subscriber_count(node))
    }

    fn track(&self) {
        runtime::track_read(self.inner.node, TrackOpType::Get);
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.id())
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::effect;
    use std::cell::Cell;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(42);
        assert_eq!(signal.get(), 42);

        signal.set(100);
        assert_eq!(signal.get(), 100);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|x| x * 2);
        assert_eq!(signal.get(), 20);
    }

    #[test]
    fn signal_with_borrows() {
        let signal = Signal::new(vec![1, 2, 3]);
        assert_eq!(signal.with(|v| v.len()), 3);
    }

    #[test]
    fn signal_notifies_subscribers() {
        let signal = Signal::new(0);
        let seen = Rc::new(Cell::new(-1));

        let (s, out) = (signal.clone(), seen.clone());
        let _e = effect(move || out.set(s.get()));
        assert_eq!(signal.subscriber_count(), 1);

        signal.set(7);
        assert_eq!(seen.get(), 7);
    }

    #[test]
    fn equal_writes_are_ignored() {
        let signal = Signal::new(1);
        let runs = Rc::new(Cell::new(0));

        let (s, r) = (signal.clone(), runs.clone());
        let _e = effect(move || {
            s.get();
            r.set(r.get() + 1);
        });

        signal.set(1);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn custom_equality_treats_nan_as_equal() {
        let signal = Signal::with_equality(f64::NAN, |a, b| a.to_bits() == b.to_bits());
        let runs = Rc::new(Cell::new(0));

        let (s, r) = (signal.clone(), runs.clone());
        let _e = effect(move || {
            s.get();
            r.set(r.get() + 1);
        });

        signal.set(f64::NAN);
        assert_eq!(runs.get(), 1);

        signal.set(1.0);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn peek_does_not_subscribe() {
        let signal = Signal::new(3);
        let s = signal.clone();
        let _e = effect(move || {
            s.peek();
        });
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let a = Signal::new(1);
        let b = a.clone();
        b.set(2);
        assert_eq!(a.get(), 2);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let a = Signal::new(0);
        let b = Signal::new(0);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn dropping_a_signal_removes_its_node() {
        let before = runtime::node_count();
        let signal = Signal::new(0);
        assert_eq!(runtime::node_count(), before + 1);
        drop(signal);
        assert_eq!(runtime::node_count(), before);
    }
}
