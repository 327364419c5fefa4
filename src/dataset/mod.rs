//! The immutable base table and its loader.
pub mod loader;
pub mod types;

// Re-export key types for convenient access
pub use loader::{from_reader, load, DataLoadError};
pub use types::{ColumnBounds, Dataset, Dimension, MealPeriod, NumericColumn, Record};
