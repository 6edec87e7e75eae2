//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When a dependency changes, the effect is handed to its scheduler
//!    (see [`FlushMode`]). Before re-running it confirms that something it
//!    read really changed, so a computed that recomputes to the same value
//!    does not re-run it.
//!
//! 3. Each run re-tracks from scratch: dependencies read again keep their
//!    edge, dependencies no longer read are unlinked.
//!
//! # Ownership
//!
//! The runtime owns active effects. Dropping an [`Effect`] handle does not
//! stop it; call [`Effect::stop`].
//!
//! # Cleanup
//!
//! Effects register cleanups with [`on_effect_cleanup`]. Cleanups run
//! untracked before the next run and when the effect is stopped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::graph::{NodeId, NodeKey, NodeKind, ReactiveFlags};

use super::context::{untracked, TrackingScope};
use super::debug::{DebugOp, DebuggerEvent, DepInfo, TrackOpType, TriggerOpType};
use super::runtime::{self, with_graph};
use super::scheduler::{self, FlushMode};

type EffectFn = Box<dyn FnMut()>;
type Hook = Box<dyn Fn(&DebuggerEvent)>;

/// Configuration for [`effect_with`].
#[derive(Default)]
pub struct EffectOptions {
    flush: FlushMode,
    allow_recurse: bool,
    on_stop: Option<Box<dyn FnOnce()>>,
    on_track: Option<Hook>,
    on_trigger: Option<Hook>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// When the effect re-runs. Defaults to [`FlushMode::Sync`].
    pub fn flush(mut self, flush: FlushMode) -> Self {
        self.flush = flush;
        self
    }

    /// Let the effect re-run for writes it makes to its own dependencies.
    ///
    /// Without this, such writes are ignored for the effect that made them.
    pub fn allow_recurse(mut self, allow: bool) -> Self {
        self.allow_recurse = allow;
        self
    }

    /// Called once when the effect is stopped.
    pub fn on_stop(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_stop = Some(Box::new(f));
        self
    }

    /// Called whenever a run links a new dependency.
    pub fn on_track(mut self, f: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.on_track = Some(Box::new(f));
        self
    }

    /// Called before a re-run, with the write that caused it.
    pub fn on_trigger(mut self, f: impl Fn(&DebuggerEvent) + 'static) -> Self {
        self.on_trigger = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("flush", &self.flush)
            .field("allow_recurse", &self.allow_recurse)
            .field("on_stop", &self.on_stop.is_some())
            .field("on_track", &self.on_track.is_some())
            .field("on_trigger", &self.on_trigger.is_some())
            .finish()
    }
}

pub(crate) struct EffectInner {
    node: NodeKey,

    /// Taken out while the body runs.
    func: RefCell<Option<EffectFn>>,

    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    flush: FlushMode,
    on_stop: RefCell<Option<Box<dyn FnOnce()>>>,
    on_track: Option<Hook>,
    on_trigger: Option<Hook>,

    /// The write that last queued this effect, for `on_trigger`.
    last_trigger: RefCell<Option<(DepInfo, TriggerOpType)>>,

    run_count: Cell<usize>,
}

impl EffectInner {
    fn id(&self) -> NodeId {
        self.node.into()
    }

    fn flags(&self) -> ReactiveFlags {
        let node = self.node;
        with_graph(|graph| graph.flags(node))
    }

    fn is_active(&self) -> bool {
        !self.flags().contains(ReactiveFlags::STOP)
    }

    /// Whether a dependency really changed since the last run.
    fn dirty(&self) -> bool {
        let node = self.node;
        let flags = self.flags();
        if flags.contains(ReactiveFlags::DIRTY) {
            return true;
        }
        if flags.contains(ReactiveFlags::PENDING) {
            if let Some(head) = with_graph(|graph| graph.deps_of(node)) {
                if runtime::check_dirty(head, node) {
                    return true;
                }
            }
            with_graph(|graph| graph.remove_flags(node, ReactiveFlags::PENDING));
        }
        false
    }

    /// Dispatch to the scheduler this effect was configured with.
    pub(crate) fn schedule(&self) {
        match self.flush {
            FlushMode::Sync => self.notify(),
            mode => scheduler::queue_job(self.node, mode),
        }
    }

    /// Re-run if active, not paused, and actually dirty.
    pub(crate) fn notify(&self) {
        if self.flags().intersects(ReactiveFlags::PAUSED | ReactiveFlags::STOP) {
            return;
        }
        if !self.dirty() {
            *self.last_trigger.borrow_mut() = None;
            return;
        }
        self.fire_trigger();
        self.run();
    }

    pub(crate) fn run(&self) {
        if self.func.borrow().is_none() {
            tracing::warn!(effect = %self.id(), "effect is already running; nested run skipped");
            return;
        }

        if !self.is_active() {
            untracked(|| self.call());
            return;
        }

        loop {
            self.run_cleanups();
            {
                let _scope = TrackingScope::start(self.node);
                self.call();
            }

            let flags = self.flags();
            if !flags.contains(ReactiveFlags::RECURSED) {
                break;
            }

            let node = self.node;
            if !flags.contains(ReactiveFlags::ALLOW_RECURSE) {
                with_graph(|graph| {
                    graph.remove_flags(node, ReactiveFlags::RECURSED | ReactiveFlags::STALE)
                });
                tracing::debug!(effect = %self.id(), "ignoring write to own dependency during run");
                break;
            }

            with_graph(|graph| graph.remove_flags(node, ReactiveFlags::RECURSED));
            if flags.contains(ReactiveFlags::PAUSED) || !self.dirty() {
                break;
            }
            self.fire_trigger();
        }
    }

    fn call(&self) {
        let Some(func) = self.func.borrow_mut().take() else {
            return;
        };
        let mut slot = FuncSlot {
            owner: &self.func,
            func: Some(func),
        };
        let _running = RunningEffect::enter(self.node);
        self.run_count.set(self.run_count.get() + 1);
        if let Some(func) = slot.func.as_mut() {
            func();
        }
    }

    fn run_cleanups(&self) {
        let cleanups = std::mem::take(&mut *self.cleanups.borrow_mut());
        if cleanups.is_empty() {
            return;
        }
        untracked(|| {
            for cleanup in cleanups {
                cleanup();
            }
        });
    }

    pub(crate) fn stop(&self) {
        let node = self.node;
        let stopped = with_graph(|graph| {
            if graph.flags(node).contains(ReactiveFlags::STOP) {
                return false;
            }
            graph.set_flags(node, ReactiveFlags::STOP);
            graph.detach_deps(node);
            graph.detach_subs(node);
            true
        });
        if !stopped {
            return;
        }

        let owned = runtime::release_effect(node);
        self.run_cleanups();
        let on_stop = self.on_stop.borrow_mut().take();
        if let Some(on_stop) = on_stop {
            untracked(on_stop);
        }
        drop(owned);

        tracing::debug!(effect = %self.id(), "effect stopped");
    }

    pub(crate) fn wants_trigger_events(&self) -> bool {
        self.on_trigger.is_some()
    }

    pub(crate) fn record_trigger(&self, info: DepInfo, op: TriggerOpType) {
        *self.last_trigger.borrow_mut() = Some((info, op));
    }

    fn fire_trigger(&self) {
        let Some(hook) = &self.on_trigger else {
            return;
        };
        let recorded = self.last_trigger.borrow_mut().take();
        if let Some((info, op)) = recorded {
            let event = info.event(self.node, DebugOp::Trigger(op));
            untracked(|| hook(&event));
        }
    }

    pub(crate) fn on_track(&self, dep: NodeKey, op: TrackOpType) {
        let Some(hook) = &self.on_track else {
            return;
        };
        let event =
            with_graph(|graph| DepInfo::capture(graph, dep)).event(self.node, DebugOp::Track(op));
        untracked(|| hook(&event));
    }

    fn register_cleanup(&self, cleanup: Box<dyn FnOnce()>) {
        self.cleanups.borrow_mut().push(cleanup);
    }
}

impl Drop for EffectInner {
    fn drop(&mut self) {
        runtime::remove_node(self.node);
    }
}

/// Puts the body back after a run, including one that panicked.
struct FuncSlot<'a> {
    owner: &'a RefCell<Option<EffectFn>>,
    func: Option<EffectFn>,
}

impl Drop for FuncSlot<'_> {
    fn drop(&mut self) {
        if let Ok(mut owner) = self.owner.try_borrow_mut() {
            *owner = self.func.take();
        }
    }
}

/// Marks which effect body is on the stack, for [`on_effect_cleanup`].
struct RunningEffect {
    previous: Option<NodeKey>,
}

impl RunningEffect {
    fn enter(node: NodeKey) -> Self {
        Self {
            previous: runtime::replace_running_effect(Some(node)),
        }
    }
}

impl Drop for RunningEffect {
    fn drop(&mut self) {
        runtime::replace_running_effect(self.previous);
    }
}

/// A side-effecting computation that re-runs when its dependencies change.
///
/// # Example
///
/// ```
/// use lattice_reactivity::{effect, Signal};
/// use std::{cell::RefCell, rc::Rc};
///
/// let count = Signal::new(0);
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let (c, l) = (count.clone(), log.clone());
/// let e = effect(move || l.borrow_mut().push(c.get()));
///
/// count.set(5);
/// e.stop();
/// count.set(6);
/// assert_eq!(*log.borrow(), vec![0, 5]);
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// The effect's node id.
    pub fn id(&self) -> NodeId {
        self.inner.id()
    }

    /// Run the body now, re-tracking dependencies.
    ///
    /// A stopped effect runs its body once, untracked.
    pub fn run(&self) {
        self.inner.run();
    }

    /// Stop the effect: unlink its dependencies, run its cleanups and
    /// `on_stop`. Idempotent.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Hold re-runs until [`Effect::resume`]. Changes are not lost.
    pub fn pause(&self) {
        let node = self.inner.node;
        with_graph(|graph| {
            if !graph.flags(node).contains(ReactiveFlags::STOP) {
                graph.insert_flags(node, ReactiveFlags::PAUSED);
            }
        });
    }

    /// Undo [`Effect::pause`]. If anything changed in between, the effect
    /// is scheduled once.
    pub fn resume(&self) {
        let node = self.inner.node;
        let flags = with_graph(|graph| {
            let flags = graph.flags(node);
            graph.remove_flags(node, ReactiveFlags::PAUSED);
            flags
        });
        if flags.contains(ReactiveFlags::PAUSED) && flags.intersects(ReactiveFlags::STALE) {
            self.inner.schedule();
        }
    }

    /// Whether the effect has not been stopped.
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }

    pub fn is_paused(&self) -> bool {
        self.inner.flags().contains(ReactiveFlags::PAUSED)
    }

    /// Number of distinct dependencies read by the last run.
    pub fn dependency_count(&self) -> usize {
        let node = self.inner.node;
        with_graph(|graph| graph.dependency_count(node))
    }

    /// Number of times the body has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .field("paused", &self.is_paused())
            .field("run_count", &self.run_count())
            .finish()
    }
}

/// Create an effect with default options and run it once.
pub fn effect(f: impl FnMut() + 'static) -> Effect {
    effect_with(f, EffectOptions::default())
}

/// Create an effect and run it once.
///
/// If the first run panics the effect is stopped and the panic resumes.
pub fn effect_with(f: impl FnMut() + 'static, options: EffectOptions) -> Effect {
    let EffectOptions {
        flush,
        allow_recurse,
        on_stop,
        on_track,
        on_trigger,
    } = options;

    let node = runtime::create_node(NodeKind::Effect);
    if allow_recurse {
        with_graph(|graph| graph.insert_flags(node, ReactiveFlags::ALLOW_RECURSE));
    }

    let func: EffectFn = Box::new(f);
    let inner = Rc::new(EffectInner {
        node,
        func: RefCell::new(Some(func)),
        cleanups: RefCell::new(Vec::new()),
        flush,
        on_stop: RefCell::new(on_stop),
        on_track,
        on_trigger,
        last_trigger: RefCell::new(None),
        run_count: Cell::new(0),
    });
    runtime::register_effect(node, Rc::clone(&inner));
    tracing::trace!(effect = %inner.id(), ?flush, "effect created");

    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| inner.run())) {
        inner.stop();
        panic::resume_unwind(payload);
    }

    Effect { inner }
}

/// Register a cleanup for the effect whose body is running.
///
/// Cleanups run before the next run and when the effect stops. Outside an
/// effect body the cleanup is dropped with a warning.
pub fn on_effect_cleanup(f: impl FnOnce() + 'static) {
    match runtime::running_effect() {
        Some(effect) => effect.register_cleanup(Box::new(f)),
        None => tracing::warn!("on_effect_cleanup() called outside of an active effect; ignored"),
    }
}
