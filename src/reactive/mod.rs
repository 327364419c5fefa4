//! The invalidation/recompute core: dependency-tracked, memoized, lazy.
pub mod cache;
pub mod engine;
pub mod registry;

// Re-export key types for convenient access
pub use cache::{ComputeError, GroupSeries, Value, ValueCache};
pub use engine::{Engine, Scope};
pub use registry::{NodeId, NodeRegistry, SourceId};
