//! Computed Implementation
//!
//! A Computed is a derived value that caches its result and recomputes
//! only when read after one of its dependencies changed.
//!
//! # How Computeds Work
//!
//! 1. A computed is lazy. Creating one runs nothing; the getter first runs
//!    on the first read.
//!
//! 2. When a dependency changes, the push phase marks the computed dirty
//!    (a direct input changed) or pending (something further upstream
//!    changed).
//!
//! 3. On the next read, a dirty computed recomputes. A pending one first
//!    checks its inputs, recomputing upstream computeds as needed, and
//!    recomputes only if one of them really changed.
//!
//! 4. If the new value equals the cached one, nothing downstream re-runs.
//!
//! # Panics
//!
//! A panicking getter leaves the previous cached value in place and the
//! panic propagates to the reader. The node stays clean in the graph, so
//! later writes still reach it and everything downstream; the next read
//! evaluates again.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use crate::error::ReactiveError;
use crate::graph::{NodeId, NodeKey, NodeKind, ReactiveFlags};

use super::context::TrackingScope;
use super::debug::TrackOpType;
use super::runtime::{self, with_graph, Recompute};

type Getter<T> = Box<dyn Fn(Option<&T>) -> T>;
type Setter<T> = Box<dyn Fn(T)>;

struct ComputedInner<T> {
    node: NodeKey,
    value: RefCell<Option<T>>,
    getter: Getter<T>,
    setter: Option<Setter<T>>,
    equals: fn(&T, &T) -> bool,

    /// The last evaluation unwound; the cache is not current.
    failed: Cell<bool>,
}

impl<T: 'static> Recompute for ComputedInner<T> {
    fn update(&self) -> bool {
        let next = {
            let _retry = RetryOnPanic(&self.failed);
            let _scope = TrackingScope::start(self.node);
            let previous = self.value.borrow();
            (self.getter)(previous.as_ref())
        };
        self.failed.set(false);

        let changed = match self.value.borrow().as_ref() {
            Some(previous) => !(self.equals)(previous, &next),
            None => true,
        };
        if changed {
            *self.value.borrow_mut() = Some(next);
        }
        changed
    }

    fn invalidate(&self) {
        self.failed.set(true);
    }
}

impl<T: 'static> ComputedInner<T> {
    /// Bring the cached value up to date.
    fn refresh(&self) {
        let node = self.node;
        let flags = with_graph(|graph| graph.flags(node));

        // Read of itself from inside its own getter: serve the cache.
        if flags.contains(ReactiveFlags::RECURSED_CHECK) {
            return;
        }

        let empty = self.value.borrow().is_none();
        let needs_update = flags.contains(ReactiveFlags::DIRTY)
            || empty
            || self.failed.get()
            || (flags.contains(ReactiveFlags::PENDING)
                && with_graph(|graph| graph.deps_of(node))
                    .is_some_and(|head| runtime::check_dirty(head, node)));

        if needs_update {
            if self.update() {
                runtime::shallow_propagate(node);
            }
        } else if flags.contains(ReactiveFlags::PENDING) {
            with_graph(|graph| graph.remove_flags(node, ReactiveFlags::PENDING));
        }
    }
}

/// Flags the cache as failed if the getter unwinds, so the next read
/// tries again instead of serving the old value as current.
///
/// The graph flags are left alone: tracking already cleared them, and a
/// stale node would swallow later writes instead of forwarding them.
struct RetryOnPanic<'a>(&'a Cell<bool>);

impl Drop for RetryOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.set(true);
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        runtime::remove_node(self.node);
    }
}

/// A lazily evaluated, cached derived value.
///
/// # Example
///
/// ```
/// use lattice_reactivity::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let c = count.clone();
/// let doubled = Computed::new(move |_| c.get() * 2);
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: PartialEq + 'static,
{
    /// Create a computed from a getter. The getter receives the previous
    /// value, if any.
    pub fn new(getter: impl Fn(Option<&T>) -> T + 'static) -> Self {
        Self::build(Box::new(getter), None, T::eq)
    }

    /// Create a writable computed. Writes are forwarded to `setter`.
    pub fn with_setter(
        getter: impl Fn(Option<&T>) -> T + 'static,
        setter: impl Fn(T) + 'static,
    ) -> Self {
        Self::build(Box::new(getter), Some(Box::new(setter)), T::eq)
    }
}

impl<T: 'static> Computed<T> {
    /// Create a computed with a custom equality. A recompute that yields a
    /// value `equals` to the cached one does not notify dependents.
    pub fn with_equality(
        getter: impl Fn(Option<&T>) -> T + 'static,
        equals: fn(&T, &T) -> bool,
    ) -> Self {
        Self::build(Box::new(getter), None, equals)
    }

    fn build(getter: Getter<T>, setter: Option<Setter<T>>, equals: fn(&T, &T) -> bool) -> Self {
        let node = runtime::create_node(NodeKind::Computed);
        let inner = Rc::new(ComputedInner {
            node,
            value: RefCell::new(None),
            getter,
            setter,
            equals,
            failed: Cell::new(false),
        });
        let weak = Rc::downgrade(&inner);
        let recompute: Weak<dyn Recompute> = weak;
        runtime::register_computed(node, recompute);
        Self { inner }
    }

    /// Get the computed's node id.
    pub fn id(&self) -> NodeId {
        self.inner.node.into()
    }

    /// Borrow the current value, recomputing if needed and tracking the read.
    ///
    /// # Panics
    ///
    /// Panics if the getter reads this computed before it has ever produced
    /// a value. Later self-reads see the previous value.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.refresh();
        runtime::track_read(self.inner.node, TrackOpType::Get);
        let value = self.inner.value.borrow();
        f(value
            .as_ref()
            .expect("computed read itself during its first evaluation"))
    }

    /// Write through the setter.
    ///
    /// Returns [`ReactiveError::ReadonlyComputed`] if there is none.
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        match &self.inner.setter {
            Some(setter) => {
                setter(value);
                Ok(())
            }
            None => {
                tracing::warn!(computed = %self.id(), "write to a readonly computed");
                Err(ReactiveError::ReadonlyComputed)
            }
        }
    }

    /// Whether this computed was created with a setter.
    pub fn is_writable(&self) -> bool {
        self.inner.setter.is_some()
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        let node = self.inner.node;
        with_graph(|graph| graph.subscriber_count(node))
    }

    /// Number of distinct dependencies read by the last evaluation.
    pub fn dependency_count(&self) -> usize {
        let node = self.inner.node;
        with_graph(|graph| graph.dependency_count(node))
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.borrow().is_some()
    }
}

impl<T: Clone + 'static> Computed<T> {
    /// Get the current value, recomputing if needed and tracking the read.
    ///
    /// # Panics
    ///
    /// See [`Computed::with`].
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    /// Get the current value, recomputing if needed, without tracking.
    ///
    /// # Panics
    ///
    /// See [`Computed::with`].
    pub fn peek(&self) -> T {
        self.inner.refresh();
        let value = self.inner.value.borrow();
        value
            .as_ref()
            .expect("computed read itself during its first evaluation")
            .clone()
    }
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Debug + 'static> Debug for Computed<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.id())
            .field("value", &self.inner.value.try_borrow().ok())
            .field("dependency_count", &self.dependency_count())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
