//! Lattice Reactivity
//!
//! This crate provides the fine-grained reactive runtime for the Lattice UI
//! framework. It implements:
//!
//! - Reactive primitives (signals, computeds, effects, watchers)
//! - A push-pull dependency graph with glitch-free propagation
//! - Batching and a pre/post job scheduler
//! - Keyed tracking for wrappers around plain data
//!
//! The crate is designed to be used both as a native Rust library and,
//! with the `python` feature, as a Python extension module via PyO3.
//!
//! # Architecture
//!
//! - `graph`: the dependency graph, its flags, and the push phase
//! - `reactive`: user-facing primitives, the pull phase, and scheduling
//! - `error`: errors surfaced by the runtime
//!
//! # Example
//!
//! ```
//! use lattice_reactivity::{effect, Computed, Signal};
//! use std::{cell::RefCell, rc::Rc};
//!
//! // Create a signal
//! let count = Signal::new(0);
//!
//! // Create a derived value
//! let c = count.clone();
//! let doubled = Computed::new(move |_| c.get() * 2);
//!
//! // Create an effect
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let (c, d, l) = (count.clone(), doubled.clone(), log.clone());
//! let _e = effect(move || l.borrow_mut().push((c.get(), d.get())));
//!
//! // Update the signal; the effect re-runs once
//! count.set(5);
//! assert_eq!(*log.borrow(), vec![(0, 0), (5, 10)]);
//! ```

pub mod error;
pub mod graph;
pub mod reactive;

#[cfg(feature = "python")]
mod python;

pub use error::ReactiveError;
pub use graph::{DepKey, NodeId, TargetId};
pub use reactive::{
    batch, effect, effect_with, end_batch, flush_jobs, forget_target, has_pending_jobs, is_tracking,
    next_tick, on_effect_cleanup, start_batch, track, trigger, untracked, watch, Computed, DebugOp,
    DebuggerEvent, Effect, EffectOptions, FlushMode, Signal, TrackOpType, TriggerOpType,
    WatchOptions, RECURSION_LIMIT,
};
