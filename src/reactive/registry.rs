//! Columnar storage of the node topology.
//!
//! Unlike a statically declared formula graph, edges here are observed:
//! each node's dependency set is whatever it read during its most recent
//! execution, and the reverse index is rebuilt from that set after every
//! successful recompute. Dependencies can shrink or grow across
//! recomputations.

use crate::inputs::ControlId;
use crate::reactive::cache::{ComputeError, Value};
use crate::reactive::engine::Scope;
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// A unique, stable identifier for a node within the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
    pub fn new(idx: usize) -> Self {
        Self(idx as u32)
    }
}

/// Anything a node can depend on: a control or another node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceId {
    Control(ControlId),
    Node(NodeId),
}

/// The recompute function of a node. Pure over what it reads through the
/// scope; reads are how dependencies get recorded.
pub type ComputeFn = Rc<dyn for<'a> Fn(&mut Scope<'a>) -> Result<Value, ComputeError>>;

/// Most nodes read a couple of controls plus one upstream node.
pub type DepSet = SmallVec<[SourceId; 4]>;

#[derive(Default)]
pub struct NodeRegistry {
    names: Vec<String>,
    compute: Vec<ComputeFn>,

    /// Dependency set observed during each node's last execution.
    deps: Vec<DepSet>,
    /// Reverse index: which nodes read a given source last time.
    dependents: HashMap<SourceId, HashSet<NodeId>>,

    by_name: HashMap<String, NodeId>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.names.len()
    }

    pub fn add_node(&mut self, name: &str, compute: ComputeFn) -> Result<NodeId, ComputeError> {
        if self.by_name.contains_key(name) {
            return Err(ComputeError::DuplicateNode(name.to_string()));
        }
        let id = NodeId::new(self.names.len());
        self.names.push(name.to_string());
        self.compute.push(compute);
        self.deps.push(DepSet::new());
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn id(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: NodeId) -> &str {
        &self.names[id.index()]
    }

    pub fn compute_fn(&self, id: NodeId) -> ComputeFn {
        Rc::clone(&self.compute[id.index()])
    }

    pub fn deps(&self, id: NodeId) -> &[SourceId] {
        &self.deps[id.index()]
    }

    pub fn dependents_of(&self, source: SourceId) -> Option<&HashSet<NodeId>> {
        self.dependents.get(&source)
    }

    /// Replaces a node's dependency set with the one observed in its latest
    /// execution, keeping the reverse index consistent.
    pub fn replace_deps(&mut self, id: NodeId, observed: DepSet) {
        for old in &self.deps[id.index()] {
            if let Some(readers) = self.dependents.get_mut(old) {
                readers.remove(&id);
                if readers.is_empty() {
                    self.dependents.remove(old);
                }
            }
        }
        for &src in &observed {
            self.dependents.entry(src).or_default().insert(id);
        }
        self.deps[id.index()] = observed;
    }
}

impl std::fmt::Debug for NodeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRegistry")
            .field("names", &self.names)
            .field("deps", &self.deps)
            .field("dependents", &self.dependents)
            .finish_non_exhaustive()
    }
}
