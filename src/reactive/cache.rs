//! The value cache: one slot per node, with versions, staleness flags and
//! recompute counters.

use crate::reactive::registry::NodeId;
use crate::timer::ClockTick;
use std::sync::Arc;

pub use self::error::ComputeError;
mod error {
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum ComputeError {
        /// A node read itself, directly or transitively, during its own
        /// recompute. Graph wiring bug, not a user condition.
        #[error("cyclic dependency: node '{0}' read during its own recompute")]
        CyclicDependency(String),
        #[error("unknown node '{0}'")]
        UnknownNode(String),
        #[error("node '{0}' registered twice")]
        DuplicateNode(String),
        #[error("unknown control '{0}'")]
        UnknownControl(String),
        #[error("node '{node}' read control '{control}' as {expected}, which it is not")]
        ControlKind { node: String, control: String, expected: &'static str },
        #[error("node '{node}' read '{upstream}' expecting {expected}")]
        ValueKind { node: String, upstream: String, expected: &'static str },
    }
}

/// A chart-ready series for one group of the chosen dimension. Scatter
/// groups fill `xs`/`ys` with (bill, tip) pairs; distribution groups fill
/// `xs` with tip percentages and leave `ys` empty.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupSeries {
    pub label: String,
    pub xs: Vec<f64>,
    pub ys: Vec<f64>,
}

/// The atomic unit of data flowing out of the graph.
///
/// Row sets and group series are shared behind `Arc` so a cached read is a
/// cheap clone. Statistics over an empty filtered set are `Stat(None)`,
/// never zero and never NaN.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Indices into the base table.
    Rows(Arc<Vec<usize>>),
    Count(u64),
    Stat(Option<f64>),
    Groups(Arc<Vec<GroupSeries>>),
    Tick(ClockTick),
    Text(String),
}

impl Value {
    pub fn as_rows(&self) -> Option<&Arc<Vec<usize>>> {
        match self {
            Self::Rows(rows) => Some(rows),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_stat(&self) -> Option<Option<f64>> {
        match self {
            Self::Stat(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_groups(&self) -> Option<&Arc<Vec<GroupSeries>>> {
        match self {
            Self::Groups(groups) => Some(groups),
            _ => None,
        }
    }

    pub fn as_tick(&self) -> Option<&ClockTick> {
        match self {
            Self::Tick(tick) => Some(tick),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Dense per-node storage of cached values and recompute bookkeeping.
///
/// A freshly registered node starts stale with an empty slot, so the first
/// read always recomputes. A failed recompute leaves the previous value in
/// place and the node stale, so the next read retries.
#[derive(Debug, Clone, Default)]
pub struct ValueCache {
    values: Vec<Option<Value>>,
    versions: Vec<u64>,
    stale: Vec<bool>,
    recomputes: Vec<u64>,
}

impl ValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the slot for a newly registered node.
    pub fn push_slot(&mut self) {
        self.values.push(None);
        self.versions.push(0);
        self.stale.push(true);
        self.recomputes.push(0);
    }

    #[inline(always)]
    pub fn get(&self, id: NodeId) -> Option<&Value> {
        self.values.get(id.index())?.as_ref()
    }

    #[inline(always)]
    pub fn is_stale(&self, id: NodeId) -> bool {
        self.stale[id.index()]
    }

    pub fn version(&self, id: NodeId) -> u64 {
        self.versions[id.index()]
    }

    /// Stores a freshly computed value: bumps the node version, clears
    /// staleness.
    pub fn store(&mut self, id: NodeId, value: Value) {
        let idx = id.index();
        self.values[idx] = Some(value);
        self.versions[idx] += 1;
        self.stale[idx] = false;
    }

    /// Marks a node stale. Returns `true` when the node was fresh, i.e.
    /// this wave is the one that invalidated it.
    pub fn mark_stale(&mut self, id: NodeId) -> bool {
        let idx = id.index();
        let was_fresh = !self.stale[idx];
        self.stale[idx] = true;
        was_fresh
    }

    /// Counts one recompute invocation (successful or not).
    pub fn note_recompute(&mut self, id: NodeId) {
        self.recomputes[id.index()] += 1;
    }

    /// Total recompute invocations for a node. Test + telemetry hook for
    /// the pure-read guarantee.
    pub fn recompute_count(&self, id: NodeId) -> u64 {
        self.recomputes[id.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_slot_is_stale_and_empty() {
        let mut cache = ValueCache::new();
        cache.push_slot();
        let id = NodeId::new(0);
        assert!(cache.is_stale(id));
        assert!(cache.get(id).is_none());
        assert_eq!(cache.version(id), 0);
    }

    #[test]
    fn test_store_clears_staleness_and_bumps_version() {
        let mut cache = ValueCache::new();
        cache.push_slot();
        let id = NodeId::new(0);
        cache.store(id, Value::Count(3));
        assert!(!cache.is_stale(id));
        assert_eq!(cache.version(id), 1);
        assert_eq!(cache.get(id).and_then(Value::as_count), Some(3));
    }

    #[test]
    fn test_mark_stale_reports_first_marking_only() {
        let mut cache = ValueCache::new();
        cache.push_slot();
        let id = NodeId::new(0);
        cache.store(id, Value::Count(1));
        assert!(cache.mark_stale(id));
        assert!(!cache.mark_stale(id));
        // The previous value survives staleness for retry semantics.
        assert_eq!(cache.get(id).and_then(Value::as_count), Some(1));
    }
}
