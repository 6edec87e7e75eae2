//! Job Scheduler
//!
//! Effects choose when they run through [`FlushMode`]:
//!
//! - `Sync` effects are notified inline while the write's batch closes.
//! - `Pre` and `Post` effects are queued as jobs and run by [`flush_jobs`]
//!   (or [`next_tick`]). All pre jobs run before any post job.
//!
//! Each queue is an insertion-ordered set, so a job queued again before it
//! runs keeps its place and runs once. A job that keeps re-queueing itself
//! is dropped after [`RECURSION_LIMIT`] runs in one flush.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

use crate::error::ReactiveError;
use crate::graph::{NodeId, NodeKey};

use super::runtime::{self, with_runtime};

/// How many times one job may run within a single flush.
pub const RECURSION_LIMIT: usize = 100;

/// When an effect runs after its dependencies change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// Inline, as soon as the outermost batch closes.
    #[default]
    Sync,
    /// In the pre queue of the next flush.
    Pre,
    /// In the post queue of the next flush, after every pre job.
    Post,
}

#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    pre: IndexSet<NodeKey>,
    post: IndexSet<NodeKey>,
}

impl JobQueue {
    fn pop(&mut self) -> Option<(NodeKey, FlushMode)> {
        if let Some(job) = self.pre.shift_remove_index(0) {
            return Some((job, FlushMode::Pre));
        }
        self.post
            .shift_remove_index(0)
            .map(|job| (job, FlushMode::Post))
    }

    fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }
}

/// Queue the effect behind `node` for the next flush.
pub(crate) fn queue_job(node: NodeKey, mode: FlushMode) {
    let queued = with_runtime(|rt| {
        let mut jobs = rt.jobs.borrow_mut();
        match mode {
            FlushMode::Pre => jobs.pre.insert(node),
            FlushMode::Post => jobs.post.insert(node),
            FlushMode::Sync => false,
        }
    });
    if queued {
        tracing::trace!(effect = %NodeId::from(node), ?mode, "job queued");
    }
}

/// Whether any pre or post job is waiting.
pub fn has_pending_jobs() -> bool {
    with_runtime(|rt| !rt.jobs.borrow().is_empty())
}

/// Run queued jobs until both queues are empty.
///
/// Pre jobs run first; jobs they queue run in the same flush. A panic in a
/// pre job propagates and leaves the rest queued. A panic in a post job is
/// logged and the flush continues. Calling this from inside a flush does
/// nothing.
pub fn flush_jobs() {
    if with_runtime(|rt| rt.flushing.replace(true)) {
        return;
    }
    let _flushing = FlushingGuard;

    let mut runs: SecondaryMap<NodeKey, usize> = SecondaryMap::new();
    while let Some((node, mode)) = with_runtime(|rt| rt.jobs.borrow_mut().pop()) {
        let count = runs.get(node).copied().unwrap_or(0) + 1;
        runs.insert(node, count);
        if count > RECURSION_LIMIT {
            let error = ReactiveError::RecursionLimit {
                limit: RECURSION_LIMIT,
            };
            tracing::error!(effect = %NodeId::from(node), %error, "dropping job");
            continue;
        }

        let Some(effect) = runtime::effect_of(node) else {
            continue;
        };

        if mode == FlushMode::Post {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| effect.notify()));
            if let Err(payload) = result {
                let error = ReactiveError::from_panic(payload.as_ref());
                tracing::error!(effect = %NodeId::from(node), %error, "post-flush job failed");
            }
        } else {
            effect.notify();
        }
    }
}

struct FlushingGuard;

impl Drop for FlushingGuard {
    fn drop(&mut self) {
        let _ = runtime::replace_flushing(false);
    }
}

/// Yield to the async runtime once, then flush queued jobs.
///
/// ```
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// use lattice_reactivity::{effect_with, next_tick, EffectOptions, FlushMode, Signal};
/// use std::{cell::Cell, rc::Rc};
///
/// let count = Signal::new(0);
/// let seen = Rc::new(Cell::new(-1));
/// let (c, s) = (count.clone(), seen.clone());
/// let _e = effect_with(move || s.set(c.get()), EffectOptions::new().flush(FlushMode::Pre));
///
/// count.set(5);
/// assert_eq!(seen.get(), 0);
/// next_tick().await;
/// assert_eq!(seen.get(), 5);
/// # }
/// ```
pub async fn next_tick() {
    tokio::task::yield_now().await;
    flush_jobs();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::NodeKind;

    #[test]
    fn queues_dedup_and_drain_pre_first() {
        let a = runtime::create_node(NodeKind::Effect);
        let b = runtime::create_node(NodeKind::Effect);

        queue_job(a, FlushMode::Post);
        queue_job(b, FlushMode::Pre);
        queue_job(a, FlushMode::Post);
        queue_job(b, FlushMode::Sync);
        assert!(has_pending_jobs());

        let order: Vec<_> =
            std::iter::from_fn(|| with_runtime(|rt| rt.jobs.borrow_mut().pop())).collect();
        assert_eq!(order, vec![(b, FlushMode::Pre), (a, FlushMode::Post)]);
        assert!(!has_pending_jobs());

        runtime::remove_node(a);
        runtime::remove_node(b);
    }

    #[test]
    fn flushing_jobs_of_dropped_effects_is_harmless() {
        let a = runtime::create_node(NodeKind::Effect);
        queue_job(a, FlushMode::Pre);
        runtime::remove_node(a);

        flush_jobs();
        assert!(!has_pending_jobs());
    }

    #[test]
    fn flush_mode_config_is_lowercase() {
        assert_eq!(serde_json::to_string(&FlushMode::Post).unwrap(), "\"post\"");
        let mode: FlushMode = serde_json::from_str("\"pre\"").unwrap();
        assert_eq!(mode, FlushMode::Pre);
        assert_eq!(FlushMode::default(), FlushMode::Sync);
    }
}
