//! Lazy, memoized, dependency-tracked recomputation.
//!
//! Reads go through a [`Scope`], which records every control and node a
//! recompute touches into the in-flight frame; the recorded set becomes the
//! node's dependency set for the next invalidation. Staleness is applied
//! eagerly across the whole wave, recomputation is deferred to the next
//! read. Single-writer: all mutation flows through `&mut self` on the
//! session thread, so a recompute never observes a torn input state.

use crate::dataset::{Dimension, MealPeriod};
use crate::inputs::{ControlValue, Inputs};
use crate::reactive::cache::{ComputeError, Value, ValueCache};
use crate::reactive::registry::{DepSet, NodeId, NodeRegistry, SourceId};
use crate::timer::ClockTick;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Engine {
    nodes: NodeRegistry,
    cache: ValueCache,

    /// In-progress markers, one per node. A marked node reached again
    /// before its recompute finished is a cycle.
    in_progress: Vec<bool>,
    /// Stack of dependency frames, one per recompute on the call stack.
    frames: Vec<DepSet>,
    /// Nodes owning those frames, for error messages.
    active: Vec<NodeId>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a derived computation. The node starts stale; its
    /// dependencies are discovered on first read.
    pub fn register(
        &mut self,
        name: &str,
        compute: impl Fn(&mut Scope<'_>) -> Result<Value, ComputeError> + 'static,
    ) -> Result<NodeId, ComputeError> {
        let id = self.nodes.add_node(name, Rc::new(compute))?;
        self.cache.push_slot();
        self.in_progress.push(false);
        Ok(id)
    }

    pub fn node_id(&self, name: &str) -> Option<NodeId> {
        self.nodes.id(name)
    }

    pub fn node_name(&self, id: NodeId) -> &str {
        self.nodes.name(id)
    }

    pub fn is_stale(&self, id: NodeId) -> bool {
        self.cache.is_stale(id)
    }

    pub fn version(&self, id: NodeId) -> u64 {
        self.cache.version(id)
    }

    /// Dependency set observed during the node's last execution.
    pub fn deps(&self, id: NodeId) -> &[SourceId] {
        self.nodes.deps(id)
    }

    /// Total recompute invocations for a node. Backs the pure-read
    /// guarantee in tests.
    pub fn recompute_count(&self, id: NodeId) -> u64 {
        self.cache.recompute_count(id)
    }

    /// Reads a node, recomputing first if it is stale. A non-stale read is
    /// pure: it returns the cached value and runs nothing.
    pub fn read(&mut self, id: NodeId, inputs: &Inputs) -> Result<Value, ComputeError> {
        if !self.cache.is_stale(id) {
            if let Some(value) = self.cache.get(id) {
                return Ok(value.clone());
            }
        }
        self.recompute(id, inputs)
    }

    pub fn read_by_name(&mut self, name: &str, inputs: &Inputs) -> Result<Value, ComputeError> {
        let id = self
            .node_id(name)
            .ok_or_else(|| ComputeError::UnknownNode(name.to_string()))?;
        self.read(id, inputs)
    }

    fn recompute(&mut self, id: NodeId, inputs: &Inputs) -> Result<Value, ComputeError> {
        if self.in_progress[id.index()] {
            return Err(ComputeError::CyclicDependency(self.nodes.name(id).to_string()));
        }
        self.in_progress[id.index()] = true;
        self.frames.push(DepSet::new());
        self.active.push(id);
        self.cache.note_recompute(id);

        let compute = self.nodes.compute_fn(id);
        let result = (*compute)(&mut Scope { engine: self, inputs });

        let observed = self.frames.pop().unwrap_or_default();
        self.active.pop();
        self.in_progress[id.index()] = false;

        match result {
            Ok(value) => {
                // The observed set replaces the previous one wholesale;
                // dependencies may shrink as well as grow.
                self.nodes.replace_deps(id, observed);
                self.cache.store(id, value.clone());
                log::trace!(
                    "recomputed '{}' (v{})",
                    self.nodes.name(id),
                    self.cache.version(id)
                );
                Ok(value)
            }
            Err(err) => {
                // Keep the old value and the stale flag: next read retries.
                log::warn!("recompute of '{}' failed: {err}", self.nodes.name(id));
                Err(err)
            }
        }
    }

    /// One invalidation wave: marks every transitive reader of the given
    /// sources stale, before any recompute happens. Returns the nodes that
    /// went from fresh to stale in this wave.
    pub fn invalidate(&mut self, sources: &[SourceId]) -> Vec<NodeId> {
        let mut wave = Vec::new();
        let mut visited: HashSet<SourceId> = sources.iter().copied().collect();
        let mut queue: VecDeque<SourceId> = sources.iter().copied().collect();

        while let Some(source) = queue.pop_front() {
            let Some(readers) = self.nodes.dependents_of(source) else {
                continue;
            };
            let readers: Vec<NodeId> = readers.iter().copied().collect();
            for reader in readers {
                if self.cache.mark_stale(reader) {
                    wave.push(reader);
                }
                let downstream = SourceId::Node(reader);
                if visited.insert(downstream) {
                    queue.push_back(downstream);
                }
            }
        }

        log::debug!("invalidation wave: {} sources, {} nodes stale", sources.len(), wave.len());
        wave
    }

    fn record(&mut self, source: SourceId) {
        if let Some(frame) = self.frames.last_mut() {
            if !frame.contains(&source) {
                frame.push(source);
            }
        }
    }

    fn reading_node(&self) -> String {
        match self.active.last() {
            Some(id) => self.nodes.name(*id).to_string(),
            None => "<root>".to_string(),
        }
    }
}

/// The read surface handed to recompute functions. Every access records a
/// dependency against the in-flight node.
pub struct Scope<'a> {
    engine: &'a mut Engine,
    inputs: &'a Inputs,
}

impl Scope<'_> {
    /// Reads a control, recording the dependency.
    pub fn control(&mut self, name: &str) -> Result<ControlValue, ComputeError> {
        let id = self
            .inputs
            .id(name)
            .ok_or_else(|| ComputeError::UnknownControl(name.to_string()))?;
        self.engine.record(SourceId::Control(id));
        Ok(self.inputs.value(id).clone())
    }

    pub fn range(&mut self, name: &str) -> Result<(f64, f64), ComputeError> {
        match self.control(name)? {
            ControlValue::Range(lo, hi) => Ok((lo, hi)),
            _ => Err(self.control_kind(name, "a range")),
        }
    }

    pub fn periods(&mut self, name: &str) -> Result<Vec<MealPeriod>, ComputeError> {
        match self.control(name)? {
            ControlValue::Periods(periods) => Ok(periods),
            _ => Err(self.control_kind(name, "a period set")),
        }
    }

    pub fn grouping(&mut self, name: &str) -> Result<Option<Dimension>, ComputeError> {
        match self.control(name)? {
            ControlValue::Grouping(dim) => Ok(dim),
            _ => Err(self.control_kind(name, "a grouping")),
        }
    }

    pub fn tick(&mut self, name: &str) -> Result<ClockTick, ComputeError> {
        match self.control(name)? {
            ControlValue::Tick(tick) => Ok(tick),
            _ => Err(self.control_kind(name, "a tick")),
        }
    }

    /// Reads another node, recording the dependency and recomputing it
    /// first if stale.
    pub fn value(&mut self, name: &str) -> Result<Value, ComputeError> {
        let id = self
            .engine
            .node_id(name)
            .ok_or_else(|| ComputeError::UnknownNode(name.to_string()))?;
        self.engine.record(SourceId::Node(id));
        self.engine.read(id, self.inputs)
    }

    /// Reads an upstream node that must yield row indices.
    pub fn rows(&mut self, name: &str) -> Result<Arc<Vec<usize>>, ComputeError> {
        let value = self.value(name)?;
        value.as_rows().cloned().ok_or_else(|| ComputeError::ValueKind {
            node: self.engine.reading_node(),
            upstream: name.to_string(),
            expected: "row indices",
        })
    }

    fn control_kind(&self, control: &str, expected: &'static str) -> ComputeError {
        ComputeError::ControlKind {
            node: self.engine.reading_node(),
            control: control.to_string(),
            expected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inputs::ControlSpec;
    use std::cell::Cell;

    fn make_inputs() -> Inputs {
        let mut inputs = Inputs::new();
        inputs
            .register("a", ControlSpec::Range, ControlValue::Range(0.0, 10.0))
            .expect("register");
        inputs
            .register("b", ControlSpec::Range, ControlValue::Range(0.0, 20.0))
            .expect("register");
        inputs
    }

    fn set(inputs: &mut Inputs, engine: &mut Engine, name: &str, hi: f64) {
        let id = inputs.set(name, ControlValue::Range(0.0, hi)).expect("set");
        engine.invalidate(&[SourceId::Control(id)]);
    }

    #[test]
    fn test_non_stale_read_is_pure() {
        let inputs = make_inputs();
        let mut engine = Engine::new();
        let id = engine
            .register("upper_a", |scope| {
                let (_, hi) = scope.range("a")?;
                Ok(Value::Stat(Some(hi)))
            })
            .expect("register");

        let first = engine.read(id, &inputs).expect("read");
        let second = engine.read(id, &inputs).expect("read");
        assert_eq!(first, second);
        assert_eq!(engine.recompute_count(id), 1);
    }

    #[test]
    fn test_unrelated_input_does_not_invalidate() {
        let mut inputs = make_inputs();
        let mut engine = Engine::new();
        let id = engine
            .register("upper_a", |scope| {
                let (_, hi) = scope.range("a")?;
                Ok(Value::Stat(Some(hi)))
            })
            .expect("register");
        engine.read(id, &inputs).expect("read");

        set(&mut inputs, &mut engine, "b", 99.0);
        assert!(!engine.is_stale(id));
        engine.read(id, &inputs).expect("read");
        assert_eq!(engine.recompute_count(id), 1);

        set(&mut inputs, &mut engine, "a", 99.0);
        assert!(engine.is_stale(id));
        let v = engine.read(id, &inputs).expect("read");
        assert_eq!(v, Value::Stat(Some(99.0)));
        assert_eq!(engine.recompute_count(id), 2);
    }

    #[test]
    fn test_staleness_propagates_transitively_but_lazily() {
        let mut inputs = make_inputs();
        let mut engine = Engine::new();
        let base = engine
            .register("base", |scope| {
                let (_, hi) = scope.range("a")?;
                Ok(Value::Stat(Some(hi)))
            })
            .expect("register");
        let doubled = engine
            .register("doubled", |scope| {
                let v = scope.value("base")?;
                let hi = v.as_stat().flatten().unwrap_or(0.0);
                Ok(Value::Stat(Some(hi * 2.0)))
            })
            .expect("register");

        assert_eq!(engine.read(doubled, &inputs).expect("read"), Value::Stat(Some(20.0)));

        set(&mut inputs, &mut engine, "a", 5.0);
        // Both marked stale, neither recomputed yet.
        assert!(engine.is_stale(base));
        assert!(engine.is_stale(doubled));
        assert_eq!(engine.recompute_count(base), 1);

        assert_eq!(engine.read(doubled, &inputs).expect("read"), Value::Stat(Some(10.0)));
        assert_eq!(engine.recompute_count(base), 2);
        assert_eq!(engine.recompute_count(doubled), 2);
    }

    #[test]
    fn test_conditional_dependency_shrinks() {
        let mut inputs = make_inputs();
        let mut engine = Engine::new();
        // Reads 'b' only while 'a' has a positive upper bound.
        let id = engine
            .register("conditional", |scope| {
                let (_, a_hi) = scope.range("a")?;
                if a_hi > 0.0 {
                    let (_, b_hi) = scope.range("b")?;
                    Ok(Value::Stat(Some(b_hi)))
                } else {
                    Ok(Value::Stat(None))
                }
            })
            .expect("register");

        engine.read(id, &inputs).expect("read");
        set(&mut inputs, &mut engine, "b", 7.0);
        assert!(engine.is_stale(id), "b is currently a dependency");
        engine.read(id, &inputs).expect("read");

        // Flip 'a' so the branch reading 'b' is skipped.
        set(&mut inputs, &mut engine, "a", 0.0);
        engine.read(id, &inputs).expect("read");

        set(&mut inputs, &mut engine, "b", 3.0);
        assert!(!engine.is_stale(id), "b was not read in the last execution");
    }

    #[test]
    fn test_cycle_is_detected() {
        let inputs = make_inputs();
        let mut engine = Engine::new();
        engine
            .register("ouroboros", |scope| scope.value("ouroboros"))
            .expect("register");
        let id = engine.node_id("ouroboros").expect("id");
        let err = engine.read(id, &inputs).unwrap_err();
        assert_eq!(err, ComputeError::CyclicDependency("ouroboros".into()));
    }

    #[test]
    fn test_indirect_cycle_is_detected() {
        let inputs = make_inputs();
        let mut engine = Engine::new();
        engine.register("x", |scope| scope.value("y")).expect("register");
        engine.register("y", |scope| scope.value("x")).expect("register");
        let id = engine.node_id("x").expect("id");
        let err = engine.read(id, &inputs).unwrap_err();
        assert!(matches!(err, ComputeError::CyclicDependency(_)));
    }

    #[test]
    fn test_failed_recompute_keeps_previous_value_and_retries() {
        let mut inputs = make_inputs();
        let mut engine = Engine::new();
        let fail = Rc::new(Cell::new(false));
        let fail_flag = Rc::clone(&fail);
        let id = engine
            .register("flaky", move |scope| {
                let (_, hi) = scope.range("a")?;
                if fail_flag.get() {
                    return Err(ComputeError::UnknownControl("injected".into()));
                }
                Ok(Value::Stat(Some(hi)))
            })
            .expect("register");

        assert_eq!(engine.read(id, &inputs).expect("read"), Value::Stat(Some(10.0)));

        fail.set(true);
        set(&mut inputs, &mut engine, "a", 42.0);
        assert!(engine.read(id, &inputs).is_err());
        assert!(engine.is_stale(id), "failed recompute leaves the node stale");
        assert_eq!(engine.version(id), 1, "failed recompute must not bump the version");

        fail.set(false);
        assert_eq!(engine.read(id, &inputs).expect("retry"), Value::Stat(Some(42.0)));
        assert_eq!(engine.version(id), 2);
    }

    #[test]
    fn test_wave_reports_each_node_once() {
        let mut inputs = make_inputs();
        let mut engine = Engine::new();
        // Diamond: left and right both read 'a'; top reads both.
        engine
            .register("left", |scope| {
                let (_, hi) = scope.range("a")?;
                Ok(Value::Stat(Some(hi)))
            })
            .expect("register");
        engine
            .register("right", |scope| {
                let (_, hi) = scope.range("a")?;
                Ok(Value::Stat(Some(-hi)))
            })
            .expect("register");
        let top = engine
            .register("top", |scope| {
                let l = scope.value("left")?.as_stat().flatten().unwrap_or(0.0);
                let r = scope.value("right")?.as_stat().flatten().unwrap_or(0.0);
                Ok(Value::Stat(Some(l + r)))
            })
            .expect("register");
        engine.read(top, &inputs).expect("read");

        let a = inputs.set("a", ControlValue::Range(0.0, 4.0)).expect("set");
        let wave = engine.invalidate(&[SourceId::Control(a)]);
        assert_eq!(wave.len(), 3, "left, right and top each stale exactly once");

        // A second wave from the same source has nothing fresh to mark.
        let wave = engine.invalidate(&[SourceId::Control(a)]);
        assert!(wave.is_empty());
    }
}
