//! Debugger Events
//!
//! Effects can be given `on_track` and `on_trigger` hooks for devtools.
//! `on_track` fires when a run creates a new dependency edge; `on_trigger`
//! fires right before a re-run that was confirmed necessary. Hooks observe
//! the graph; they never change what runs.

use serde::{Deserialize, Serialize};

use crate::graph::{DepKey, Graph, NodeId, NodeKey, TargetId};

/// Kind of read that created a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackOpType {
    /// A value read.
    Get,
    /// A membership test (`has`, `contains_key`).
    Has,
    /// An iteration over keys or elements.
    Iterate,
}

/// Kind of write that invalidated a dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOpType {
    /// An existing key changed value.
    Set,
    /// A key was added; the shape changed.
    Add,
    /// A key was removed; the shape changed.
    Delete,
    /// Every key was removed.
    Clear,
}

/// Whether an event reports a read or a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "op", rename_all = "snake_case")]
pub enum DebugOp {
    /// Reported to `on_track`.
    Track(TrackOpType),
    /// Reported to `on_trigger`.
    Trigger(TriggerOpType),
}

/// Payload handed to `on_track` and `on_trigger` hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebuggerEvent {
    /// The effect the hook belongs to.
    pub effect: NodeId,

    /// The dependency that was read or written.
    pub dep: NodeId,

    /// For keyed dependencies, the object they belong to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetId>,

    /// For keyed dependencies, which part of the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<DepKey>,

    /// What happened.
    pub op: DebugOp,
}

/// A dependency as seen at the moment it was read or written, before the
/// graph has a chance to forget where it came from.
#[derive(Debug, Clone)]
pub(crate) struct DepInfo {
    dep: NodeId,
    target: Option<TargetId>,
    key: Option<DepKey>,
}

impl DepInfo {
    pub(crate) fn capture(graph: &Graph, dep: NodeKey) -> Self {
        let (target, key) = match graph.keyed_owner(dep) {
            Some((target, key)) => (Some(*target), Some(key.clone())),
            None => (None, None),
        };
        Self {
            dep: dep.into(),
            target,
            key,
        }
    }

    pub(crate) fn event(&self, effect: NodeKey, op: DebugOp) -> DebuggerEvent {
        DebuggerEvent {
            effect: effect.into(),
            dep: self.dep,
            target: self.target,
            key: self.key.clone(),
            op,
        }
    }
}
