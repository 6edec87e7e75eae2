//! Batching
//!
//! Every write opens and closes a batch around its propagation, so a single
//! write flushes its effects immediately. Opening an outer batch defers the
//! flush until the outermost batch closes; effects reached by several
//! writes run once.

use super::runtime::{self, with_runtime};

/// Open a batch. Must be paired with [`end_batch`].
pub fn start_batch() {
    with_runtime(|rt| rt.batch_depth.set(rt.batch_depth.get() + 1));
}

/// Close a batch. Closing the outermost one flushes buffered effects.
pub fn end_batch() {
    if leave() == 0 {
        runtime::flush_effects();
    }
}

/// Decrement the depth without flushing. Returns the new depth.
fn leave() -> u32 {
    with_runtime(|rt| {
        let depth = rt.batch_depth.get();
        if depth == 0 {
            tracing::warn!("end_batch() called without a matching start_batch()");
            return 0;
        }
        rt.batch_depth.set(depth - 1);
        depth - 1
    })
}

/// Run `f` inside a batch and flush once it returns.
///
/// ```
/// use lattice_reactivity::{batch, effect, Signal};
/// use std::{cell::Cell, rc::Rc};
///
/// let a = Signal::new(1);
/// let b = Signal::new(2);
/// let runs = Rc::new(Cell::new(0));
///
/// let (a2, b2, r) = (a.clone(), b.clone(), runs.clone());
/// let _e = effect(move || {
///     let _ = a2.get() + b2.get();
///     r.set(r.get() + 1);
/// });
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
/// });
/// assert_eq!(runs.get(), 2);
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::start();
    f()
}

/// Closes the batch it opened, even on unwind.
///
/// While unwinding the depth is restored but nothing is flushed; the
/// buffered effects run at the next batch boundary.
pub(crate) struct BatchGuard(());

impl BatchGuard {
    pub(crate) fn start() -> Self {
        start_batch();
        Self(())
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            leave();
        } else {
            end_batch();
        }
    }
}
