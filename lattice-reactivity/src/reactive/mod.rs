//! Reactive Primitives
//!
//! This module implements the user-facing reactive system: signals,
//! computeds, effects, and the scheduling around them. The graph they
//! share lives in [`crate::graph`].
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal is read while
//! a computed or effect runs, that reader is linked to it. When the
//! signal's value changes, every reader downstream is marked.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It is lazy: it
//! re-evaluates on read, and only if one of its inputs really changed.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that re-runs when its
//! dependencies change, inline or through the job queues depending on its
//! [`FlushMode`].
//!
//! ## Keyed tracking
//!
//! [`track`] and [`trigger`] let wrappers around plain data (maps, object
//! proxies) take part in the graph without holding a signal per key.
//!
//! # Implementation Notes
//!
//! Reads are tracked through a thread-local active subscriber. Writes mark
//! the graph (push) and reads settle it (pull), so a node recomputes at
//! most once per change and never observes a half-updated state.

mod batch;
mod computed;
mod context;
mod debug;
mod dep;
mod effect;
mod runtime;
mod scheduler;
mod signal;
mod watch;

pub use batch::{batch, end_batch, start_batch};
pub use computed::Computed;
pub use context::{is_tracking, untracked};
pub use debug::{DebugOp, DebuggerEvent, TrackOpType, TriggerOpType};
pub use dep::{forget_target, track, trigger};
pub use effect::{effect, effect_with, on_effect_cleanup, Effect, EffectOptions};
pub use scheduler::{flush_jobs, has_pending_jobs, next_tick, FlushMode, RECURSION_LIMIT};
pub use signal::Signal;
pub use watch::{watch, WatchOptions};
