//! Reactive core of the restaurant-tipping dashboard.
//!
//! The crate owns everything behind the view layer: the immutable base
//! table, the versioned control state, the dependency-tracked recompute
//! engine, the standard derived views and the live-update timer. Rendering
//! (charts, tables, layout) is an external collaborator that reads views
//! through [`Session::current`] and re-renders on wave notifications.

pub mod dataset;
pub mod inputs;
pub mod logging;
pub mod reactive;
pub mod session;
pub mod timer;
pub mod views;

pub use dataset::{DataLoadError, Dataset, Dimension, MealPeriod, Record};
pub use inputs::{ControlValue, Inputs, InvalidInputError};
pub use reactive::{ComputeError, Engine, GroupSeries, Value};
pub use session::{Session, SessionError};
pub use timer::{ClockTick, RandomTicks, TickScheduler, TickSource, DEFAULT_INTERVAL};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
