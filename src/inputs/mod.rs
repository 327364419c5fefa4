//! Current values of the session controls, with per-control versioning.
pub mod state;

pub use state::{ControlId, ControlSpec, ControlValue, Inputs, InvalidInputError};
