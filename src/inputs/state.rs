//! Columnar storage of control state.
//!
//! Every control carries a monotonically increasing logical version; the
//! engine invalidates against control identifiers, never against raw values.
//! Validation happens on write: a rejected `set` leaves the prior state
//! untouched.

use crate::dataset::{Dimension, MealPeriod};
use crate::timer::ClockTick;
use std::collections::HashMap;
use thiserror::Error;

/// A unique, stable identifier for a registered control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ControlId(pub u16);

impl ControlId {
    #[inline(always)]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
    pub fn new(idx: usize) -> Self {
        Self(idx as u16)
    }
}

/// What a control accepts. Fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSpec {
    /// Numeric interval, validated `lo <= hi`.
    Range,
    /// Subset of the known meal periods. Empty is legal.
    Periods,
    /// A chart grouping dimension; `allow_none` permits the ungrouped state.
    Grouping { allow_none: bool },
    /// Scheduler-written pseudo-input. Rejected by user-facing `set`.
    Virtual,
}

/// The current value of a control.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlValue {
    Range(f64, f64),
    /// Kept sorted and deduplicated so equality means set equality.
    Periods(Vec<MealPeriod>),
    Grouping(Option<Dimension>),
    Tick(ClockTick),
}

impl ControlValue {
    fn kind(&self) -> &'static str {
        match self {
            Self::Range(..) => "a range",
            Self::Periods(_) => "a period set",
            Self::Grouping(_) => "a grouping",
            Self::Tick(_) => "a tick",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvalidInputError {
    #[error("unknown control '{0}'")]
    UnknownControl(String),
    #[error("control '{0}' registered twice")]
    DuplicateControl(String),
    #[error("range lower bound {lo} exceeds upper bound {hi}")]
    MalformedRange { lo: f64, hi: f64 },
    #[error("control '{name}' does not accept {given}")]
    WrongKind { name: String, given: &'static str },
    #[error("grouping control '{name}' requires a dimension")]
    GroupingRequired { name: String },
    #[error("control '{name}' is written by the scheduler, not by user input")]
    VirtualControl { name: String },
}

/// The control registry: names, specs, values, defaults and versions in
/// parallel columns.
#[derive(Debug, Default)]
pub struct Inputs {
    names: Vec<String>,
    specs: Vec<ControlSpec>,
    values: Vec<ControlValue>,
    defaults: Vec<ControlValue>,
    versions: Vec<u64>,
    by_name: HashMap<String, ControlId>,
}

impl Inputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a control with its default value. The default doubles as
    /// the reset snapshot entry.
    pub fn register(
        &mut self,
        name: &str,
        spec: ControlSpec,
        default: ControlValue,
    ) -> Result<ControlId, InvalidInputError> {
        if self.by_name.contains_key(name) {
            return Err(InvalidInputError::DuplicateControl(name.to_string()));
        }
        Self::validate(name, spec, &default)?;

        let id = ControlId::new(self.names.len());
        self.names.push(name.to_string());
        self.specs.push(spec);
        self.values.push(default.clone());
        self.defaults.push(default);
        self.versions.push(0);
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn id(&self, name: &str) -> Option<ControlId> {
        self.by_name.get(name).copied()
    }

    pub fn name(&self, id: ControlId) -> &str {
        &self.names[id.index()]
    }

    pub fn value(&self, id: ControlId) -> &ControlValue {
        &self.values[id.index()]
    }

    pub fn version(&self, id: ControlId) -> u64 {
        self.versions[id.index()]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// User-facing write. Validates against the control's spec; a failure
    /// leaves value and version untouched.
    pub fn set(&mut self, name: &str, value: ControlValue) -> Result<ControlId, InvalidInputError> {
        let id = self
            .id(name)
            .ok_or_else(|| InvalidInputError::UnknownControl(name.to_string()))?;
        let spec = self.specs[id.index()];
        if spec == ControlSpec::Virtual {
            return Err(InvalidInputError::VirtualControl { name: name.to_string() });
        }
        Self::validate(name, spec, &value)?;
        self.store(id, value);
        Ok(id)
    }

    /// Scheduler-facing write for virtual controls. Bypasses the user guard
    /// but still versions the change.
    pub fn write_virtual(&mut self, id: ControlId, value: ControlValue) {
        self.store(id, value);
    }

    fn store(&mut self, id: ControlId, mut value: ControlValue) {
        if let ControlValue::Periods(periods) = &mut value {
            periods.sort();
            periods.dedup();
        }
        self.values[id.index()] = value;
        self.versions[id.index()] += 1;
    }

    /// Restores every user control to its default as one logical change.
    /// Returns the ids whose value actually changed, for a single
    /// invalidation wave. Virtual controls keep their latest payload.
    pub fn reset_to_defaults(&mut self) -> Vec<ControlId> {
        let mut changed = Vec::new();
        for idx in 0..self.names.len() {
            if self.specs[idx] == ControlSpec::Virtual {
                continue;
            }
            if self.values[idx] != self.defaults[idx] {
                self.values[idx] = self.defaults[idx].clone();
                self.versions[idx] += 1;
                changed.push(ControlId::new(idx));
            }
        }
        changed
    }

    fn validate(
        name: &str,
        spec: ControlSpec,
        value: &ControlValue,
    ) -> Result<(), InvalidInputError> {
        match (spec, value) {
            (ControlSpec::Range, ControlValue::Range(lo, hi)) => {
                if lo > hi {
                    Err(InvalidInputError::MalformedRange { lo: *lo, hi: *hi })
                } else {
                    Ok(())
                }
            }
            // Period membership is closed by the MealPeriod type itself.
            (ControlSpec::Periods, ControlValue::Periods(_)) => Ok(()),
            (ControlSpec::Grouping { allow_none }, ControlValue::Grouping(dim)) => {
                if dim.is_none() && !allow_none {
                    Err(InvalidInputError::GroupingRequired { name: name.to_string() })
                } else {
                    Ok(())
                }
            }
            (ControlSpec::Virtual, ControlValue::Tick(_)) => Ok(()),
            (_, given) => Err(InvalidInputError::WrongKind {
                name: name.to_string(),
                given: given.kind(),
            }),
        }
    }
}
