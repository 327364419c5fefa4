//! The session: one user's dashboard state, explicitly constructed and
//! passed down. Nothing here is process-wide.
//!
//! A session owns the dataset, the control registry, the reactive engine
//! and (optionally) the live-update scheduler. All mutation flows through
//! `&mut self`, so one invalidation wave always completes before the next
//! external event is accepted. Timer firings are drained cooperatively via
//! [`Session::pump`]; tearing the session down cancels the scheduler.

use crate::dataset::{ColumnBounds, Dataset, Dimension, NumericColumn, Record};
use crate::inputs::{ControlId, ControlSpec, ControlValue, Inputs, InvalidInputError};
use crate::reactive::{ComputeError, Engine, SourceId, Value};
use crate::timer::{ClockTick, TickScheduler, TickSource};
use crate::views::{self, controls, names};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Construction-time failures: control or node wiring rejected.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Input(#[from] InvalidInputError),
    #[error(transparent)]
    Compute(#[from] ComputeError),
}

/// Listener invoked after each invalidation wave with the names of the
/// nodes that wave made stale.
pub type WaveListener = Box<dyn FnMut(&[String])>;

pub struct Session {
    dataset: Arc<Dataset>,
    inputs: Inputs,
    engine: Engine,
    scheduler: Option<TickScheduler>,
    live_tick: ControlId,
    listeners: Vec<WaveListener>,
}

impl Session {
    /// Wires the standard controls (defaults derived from the data) and
    /// the standard derived views.
    pub fn new(dataset: Dataset) -> Result<Self, SessionError> {
        let dataset = Arc::new(dataset);
        let bill = dataset.bounds(NumericColumn::TotalBill);

        let mut inputs = Inputs::new();
        inputs.register(
            controls::TOTAL_BILL,
            ControlSpec::Range,
            ControlValue::Range(bill.min, bill.max),
        )?;
        inputs.register(
            controls::TIME,
            ControlSpec::Periods,
            ControlValue::Periods(vec![
                crate::dataset::MealPeriod::Lunch,
                crate::dataset::MealPeriod::Dinner,
            ]),
        )?;
        inputs.register(
            controls::SCATTER_COLOR,
            ControlSpec::Grouping { allow_none: true },
            ControlValue::Grouping(None),
        )?;
        inputs.register(
            controls::TIP_PERC_Y,
            ControlSpec::Grouping { allow_none: false },
            ControlValue::Grouping(Some(Dimension::Day)),
        )?;
        let live_tick = inputs.register(
            controls::LIVE_TICK,
            ControlSpec::Virtual,
            ControlValue::Tick(ClockTick::zero()),
        )?;

        let mut engine = Engine::new();
        views::register_views(&mut engine, Arc::clone(&dataset))?;

        log::info!(
            "session started: {} rows, bill range [{}, {}]",
            dataset.len(),
            bill.min,
            bill.max
        );

        Ok(Self { dataset, inputs, engine, scheduler: None, live_tick, listeners: Vec::new() })
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    /// Bounds for seeding the bill-range control in the view layer.
    pub fn bill_bounds(&self) -> ColumnBounds {
        self.dataset.bounds(NumericColumn::TotalBill)
    }

    /// Registers a re-render hook. Called after every invalidation wave
    /// that made at least one node stale.
    pub fn subscribe(&mut self, listener: impl FnMut(&[String]) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Writes a control value; on success, fires one invalidation wave.
    /// A rejected write leaves everything untouched.
    pub fn set(&mut self, control: &str, value: ControlValue) -> Result<(), InvalidInputError> {
        let id = self.inputs.set(control, value)?;
        self.fire_wave(&[SourceId::Control(id)]);
        Ok(())
    }

    /// Restores every user control to its default snapshot as a single
    /// logical change: one coordinated write, one invalidation wave.
    pub fn reset(&mut self) {
        let changed = self.inputs.reset_to_defaults();
        if changed.is_empty() {
            return;
        }
        let sources: Vec<SourceId> = changed.into_iter().map(SourceId::Control).collect();
        self.fire_wave(&sources);
    }

    /// Reads a derived view by name, recomputing lazily if it is stale.
    pub fn current(&mut self, view: &str) -> Result<Value, ComputeError> {
        self.engine.read_by_name(view, &self.inputs)
    }

    // --- Typed conveniences for the view layer ---

    pub fn filtered_records(&mut self) -> Result<Vec<Record>, ComputeError> {
        let value = self.current(names::FILTERED)?;
        let rows = value.as_rows().cloned().unwrap_or_default();
        Ok(rows.iter().map(|&i| self.dataset.records()[i].clone()).collect())
    }

    pub fn row_count(&mut self) -> Result<u64, ComputeError> {
        Ok(self.current(names::ROW_COUNT)?.as_count().unwrap_or(0))
    }

    pub fn mean_bill(&mut self) -> Result<Option<f64>, ComputeError> {
        Ok(self.current(names::MEAN_BILL)?.as_stat().flatten())
    }

    pub fn mean_tip_pct(&mut self) -> Result<Option<f64>, ComputeError> {
        Ok(self.current(names::MEAN_TIP_PCT)?.as_stat().flatten())
    }

    pub fn live_tip(&mut self) -> Result<String, ComputeError> {
        Ok(self.current(names::LIVE_TIP)?.as_text().unwrap_or_default().to_string())
    }

    // --- Live updates ---

    /// Arms the live-update trigger with the production tick source.
    pub fn start_live_updates(&mut self, interval: Duration) {
        self.scheduler = Some(TickScheduler::schedule(interval));
    }

    /// Arms the live-update trigger with an injected tick source.
    pub fn start_live_updates_with(
        &mut self,
        interval: Duration,
        source: impl TickSource + 'static,
    ) {
        self.scheduler = Some(TickScheduler::schedule_with(interval, source));
    }

    /// Cancels pending firings. Idempotent; also runs on drop.
    pub fn stop_live_updates(&mut self) {
        if let Some(mut scheduler) = self.scheduler.take() {
            scheduler.cancel();
        }
    }

    /// Applies the latest pending timer firing, if any, as one invalidation
    /// wave. Intervening unread firings are discarded (no catch-up).
    /// Returns whether a tick was applied.
    pub fn pump(&mut self) -> bool {
        let Some(tick) = self.scheduler.as_ref().and_then(TickScheduler::latest) else {
            return false;
        };
        self.apply_tick(tick);
        true
    }

    /// Writes a tick into the virtual control. Public as the deterministic
    /// seam for tests and embedders driving time themselves.
    pub fn apply_tick(&mut self, tick: ClockTick) {
        self.inputs.write_virtual(self.live_tick, ControlValue::Tick(tick));
        self.fire_wave(&[SourceId::Control(self.live_tick)]);
    }

    /// Recompute-invocation counter for a node; test + telemetry hook.
    pub fn recompute_count(&self, view: &str) -> Option<u64> {
        let id = self.engine.node_id(view)?;
        Some(self.engine.recompute_count(id))
    }

    fn fire_wave(&mut self, sources: &[SourceId]) {
        let wave = self.engine.invalidate(sources);
        if wave.is_empty() {
            return;
        }
        let stale: Vec<String> =
            wave.iter().map(|&id| self.engine.node_name(id).to_string()).collect();
        for listener in &mut self.listeners {
            listener(&stale);
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_live_updates();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MealPeriod;
    use chrono::Utc;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn make_record(bill: f64, tip: f64, time: MealPeriod) -> Record {
        Record {
            total_bill: bill,
            tip,
            sex: "Female".into(),
            smoker: "No".into(),
            day: "Sun".into(),
            time,
            size: None,
        }
    }

    fn make_session() -> Session {
        let dataset = Dataset::new(vec![
            make_record(10.0, 1.0, MealPeriod::Lunch),
            make_record(20.0, 4.0, MealPeriod::Dinner),
        ]);
        Session::new(dataset).expect("session")
    }

    #[test]
    fn test_scenario_default_filters() {
        let mut session = make_session();
        assert_eq!(session.row_count().expect("count"), 2);
        assert_eq!(session.mean_bill().expect("bill"), Some(15.0));
        let tip = session.mean_tip_pct().expect("tip").expect("non-empty set");
        assert!((tip - 0.15).abs() < 1e-12);
    }

    #[test]
    fn test_scenario_dinner_only() {
        let mut session = make_session();
        session
            .set(controls::TIME, ControlValue::Periods(vec![MealPeriod::Dinner]))
            .expect("set");
        assert_eq!(session.row_count().expect("count"), 1);
        assert_eq!(session.mean_bill().expect("bill"), Some(20.0));
        assert_eq!(session.mean_tip_pct().expect("tip"), Some(0.2));
    }

    #[test]
    fn test_scenario_excluding_range() {
        let mut session = make_session();
        session.set(controls::TOTAL_BILL, ControlValue::Range(0.0, 5.0)).expect("set");
        assert_eq!(session.row_count().expect("count"), 0);
        assert_eq!(session.mean_bill().expect("bill"), None);
        assert_eq!(session.mean_tip_pct().expect("tip"), None);
    }

    #[test]
    fn test_rejected_set_changes_nothing() {
        let mut session = make_session();
        assert_eq!(session.row_count().expect("count"), 2);
        let before = session.recompute_count(names::ROW_COUNT).expect("counter");

        let err = session.set(controls::TOTAL_BILL, ControlValue::Range(9.0, 2.0)).unwrap_err();
        assert!(matches!(err, InvalidInputError::MalformedRange { .. }));

        assert_eq!(session.row_count().expect("count"), 2);
        assert_eq!(session.recompute_count(names::ROW_COUNT), Some(before));
    }

    #[test]
    fn test_reset_restores_defaults_in_one_wave() {
        let mut session = make_session();
        let waves = Rc::new(RefCell::new(Vec::<Vec<String>>::new()));
        // Materialize the graph so waves have dependents to mark.
        assert_eq!(session.row_count().expect("count"), 2);
        let _ = session.mean_bill().expect("bill");

        let seen = Rc::clone(&waves);
        session.subscribe(move |stale| seen.borrow_mut().push(stale.to_vec()));

        // Read between writes so each wave marks fresh nodes.
        session.set(controls::TOTAL_BILL, ControlValue::Range(0.0, 12.0)).expect("set");
        assert_eq!(session.row_count().expect("count"), 1);
        session
            .set(controls::TIME, ControlValue::Periods(vec![MealPeriod::Lunch]))
            .expect("set");
        assert_eq!(session.row_count().expect("count"), 1);
        assert_eq!(waves.borrow().len(), 2);

        let filtered_before = session.recompute_count(names::FILTERED).expect("counter");
        session.reset();
        // One wave for the whole snapshot, not one per field.
        assert_eq!(waves.borrow().len(), 3);

        assert_eq!(session.row_count().expect("count"), 2);
        assert_eq!(session.mean_bill().expect("bill"), Some(15.0));
        // Both reset fields feed `filtered`, which recomputed exactly once.
        assert_eq!(
            session.recompute_count(names::FILTERED),
            Some(filtered_before + 1)
        );

        // Nothing diverges from the defaults now: reset is a no-op wave.
        session.reset();
        assert_eq!(waves.borrow().len(), 3);
    }

    #[test]
    fn test_pure_reread_does_not_recompute() {
        let mut session = make_session();
        let first = session.current(names::FILTERED).expect("read");
        let count = session.recompute_count(names::FILTERED).expect("counter");
        let second = session.current(names::FILTERED).expect("read");
        assert_eq!(first, second);
        assert_eq!(session.recompute_count(names::FILTERED), Some(count));
    }

    #[test]
    fn test_grouping_change_leaves_summaries_fresh() {
        let mut session = make_session();
        let _ = session.row_count().expect("count");
        let _ = session.current(names::SCATTER_GROUPS).expect("read");
        let count_before = session.recompute_count(names::ROW_COUNT).expect("counter");

        session
            .set(controls::SCATTER_COLOR, ControlValue::Grouping(Some(Dimension::Time)))
            .expect("set");
        let _ = session.current(names::SCATTER_GROUPS).expect("read");

        // Summaries never read the color control, so they stayed fresh.
        assert_eq!(session.row_count().expect("count"), 2);
        assert_eq!(session.recompute_count(names::ROW_COUNT), Some(count_before));
    }

    #[test]
    fn test_apply_tick_drives_the_live_view() {
        let mut session = make_session();
        let initial = session.live_tip().expect("read");

        let timestamp = chrono::DateTime::parse_from_rfc3339("2026-08-27T08:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc);
        session.apply_tick(ClockTick { value: 12.5, timestamp });

        let updated = session.live_tip().expect("read");
        assert_ne!(initial, updated);
        assert_eq!(updated, "Live Tip: 12.50 at 2026-08-27 08:00:00");
    }

    #[test]
    fn test_tick_does_not_touch_the_filter_chain() {
        let mut session = make_session();
        let _ = session.row_count().expect("count");
        let before = session.recompute_count(names::FILTERED).expect("counter");

        session.apply_tick(ClockTick::zero());
        let _ = session.row_count().expect("count");
        assert_eq!(session.recompute_count(names::FILTERED), Some(before));
    }

    #[test]
    fn test_scheduler_smoke() {
        struct Steady;
        impl TickSource for Steady {
            fn next_tick(&mut self) -> ClockTick {
                ClockTick { value: 7.0, timestamp: Utc::now() }
            }
        }

        let mut session = make_session();
        let initial = session.live_tip().expect("read");
        session.start_live_updates_with(Duration::from_millis(10), Steady);
        std::thread::sleep(Duration::from_millis(80));

        assert!(session.pump(), "at least one firing expected");
        let updated = session.live_tip().expect("read");
        assert_ne!(initial, updated);
        assert!(updated.starts_with("Live Tip: 7.00 at "));

        session.stop_live_updates();
        let _ = session.pump(); // drain whatever slipped in before the join
        assert!(!session.pump(), "no firings after cancellation");
    }

    #[test]
    fn test_filtered_records_clone_the_rows() {
        let mut session = make_session();
        session
            .set(controls::TIME, ControlValue::Periods(vec![MealPeriod::Dinner]))
            .expect("set");
        let rows = session.filtered_records().expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_bill, 20.0);
    }
}
