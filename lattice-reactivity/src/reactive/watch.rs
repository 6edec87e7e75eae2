//! Watchers
//!
//! A watcher splits an effect in two: a tracked `source` that produces a
//! value, and an untracked `callback` that receives the new and previous
//! values whenever the source produces something different.

use serde::{Deserialize, Serialize};

use super::context::untracked;
use super::effect::{effect_with, Effect, EffectOptions};
use super::runtime;
use super::scheduler::FlushMode;

/// Configuration for [`watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchOptions {
    /// Call the callback once right away, with no previous value.
    pub immediate: bool,
    /// Stop after the first callback.
    pub once: bool,
    /// When the watcher re-evaluates. Defaults to [`FlushMode::Pre`].
    pub flush: FlushMode,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            immediate: false,
            once: false,
            flush: FlushMode::Pre,
        }
    }
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    pub fn once(mut self, once: bool) -> Self {
        self.once = once;
        self
    }

    pub fn flush(mut self, flush: FlushMode) -> Self {
        self.flush = flush;
        self
    }
}

/// Watch `source` and call `callback(new, previous)` when it changes.
///
/// The returned effect can be paused or stopped like any other.
///
/// ```
/// use lattice_reactivity::{flush_jobs, watch, Signal, WatchOptions};
/// use std::{cell::RefCell, rc::Rc};
///
/// let count = Signal::new(1);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let (c, l) = (count.clone(), log.clone());
/// let _w = watch(
///     move || c.get(),
///     move |new, old| l.borrow_mut().push((*new, old.copied())),
///     WatchOptions::new(),
/// );
///
/// count.set(2);
/// flush_jobs();
/// assert_eq!(*log.borrow(), vec![(2, Some(1))]);
/// ```
pub fn watch<T, S, C>(source: S, mut callback: C, options: WatchOptions) -> Effect
where
    T: PartialEq + 'static,
    S: Fn() -> T + 'static,
    C: FnMut(&T, Option<&T>) + 'static,
{
    let mut previous: Option<T> = None;
    let mut first = true;

    let body = move || {
        let value = source();
        let initial = std::mem::replace(&mut first, false);
        let fire = if initial {
            options.immediate
        } else {
            previous.as_ref() != Some(&value)
        };

        if fire {
            untracked(|| callback(&value, previous.as_ref()));
            if options.once {
                if let Some(effect) = runtime::running_effect() {
                    effect.stop();
                }
            }
        }
        previous = Some(value);
    };

    effect_with(body, EffectOptions::new().flush(options.flush))
}
