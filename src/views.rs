//! The standard derived views, registered as graph nodes.
//!
//! Every view is a pure function over what it reads through its scope:
//! the filtered row set, the controls, or the live tick. Statistics over
//! an empty filtered set are `Stat(None)` by explicit check; no view ever
//! divides by zero or emits NaN.

use crate::dataset::Dataset;
use crate::reactive::{ComputeError, Engine, GroupSeries, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Node names exposed to the view layer.
pub mod names {
    pub const FILTERED: &str = "filtered";
    pub const ROW_COUNT: &str = "row_count";
    pub const MEAN_BILL: &str = "mean_bill";
    pub const MEAN_TIP_PCT: &str = "mean_tip_pct";
    pub const SCATTER_GROUPS: &str = "scatter_groups";
    pub const TIP_PERC_GROUPS: &str = "tip_perc_groups";
    pub const LIVE_TIP: &str = "live_tip";
}

/// Control names as the view layer knows them.
pub mod controls {
    pub const TOTAL_BILL: &str = "total_bill";
    pub const TIME: &str = "time";
    pub const SCATTER_COLOR: &str = "scatter_color";
    pub const TIP_PERC_Y: &str = "tip_perc_y";
    pub const LIVE_TICK: &str = "live_tick";
}

/// Label of the single scatter group when no color dimension is chosen.
const UNGROUPED: &str = "all";

/// Registers the standard dashboard nodes against the given engine.
pub fn register_views(engine: &mut Engine, dataset: Arc<Dataset>) -> Result<(), ComputeError> {
    let data = Arc::clone(&dataset);
    engine.register(names::FILTERED, move |scope| {
        let (lo, hi) = scope.range(controls::TOTAL_BILL)?;
        let periods = scope.periods(controls::TIME)?;
        // Range bounds are inclusive on both ends.
        let rows: Vec<usize> = data
            .records()
            .iter()
            .enumerate()
            .filter(|(_, r)| r.total_bill >= lo && r.total_bill <= hi && periods.contains(&r.time))
            .map(|(i, _)| i)
            .collect();
        Ok(Value::Rows(Arc::new(rows)))
    })?;

    engine.register(names::ROW_COUNT, |scope| {
        let rows = scope.rows(names::FILTERED)?;
        Ok(Value::Count(rows.len() as u64))
    })?;

    let data = Arc::clone(&dataset);
    engine.register(names::MEAN_BILL, move |scope| {
        let rows = scope.rows(names::FILTERED)?;
        Ok(Value::Stat(mean(rows.iter().map(|&i| data.records()[i].total_bill))))
    })?;

    let data = Arc::clone(&dataset);
    engine.register(names::MEAN_TIP_PCT, move |scope| {
        let rows = scope.rows(names::FILTERED)?;
        Ok(Value::Stat(mean(rows.iter().map(|&i| data.records()[i].tip_pct()))))
    })?;

    let data = Arc::clone(&dataset);
    engine.register(names::SCATTER_GROUPS, move |scope| {
        let rows = scope.rows(names::FILTERED)?;
        let color = scope.grouping(controls::SCATTER_COLOR)?;
        let mut groups: BTreeMap<String, GroupSeries> = BTreeMap::new();
        for &i in rows.iter() {
            let record = &data.records()[i];
            let label = match color {
                Some(dim) => record.dimension(dim),
                None => UNGROUPED,
            };
            let series = groups.entry(label.to_string()).or_insert_with(|| GroupSeries {
                label: label.to_string(),
                xs: Vec::new(),
                ys: Vec::new(),
            });
            series.xs.push(record.total_bill);
            series.ys.push(record.tip);
        }
        Ok(Value::Groups(Arc::new(groups.into_values().collect())))
    })?;

    let data = Arc::clone(&dataset);
    engine.register(names::TIP_PERC_GROUPS, move |scope| {
        let rows = scope.rows(names::FILTERED)?;
        let by = scope.grouping(controls::TIP_PERC_Y)?;
        let mut groups: BTreeMap<String, GroupSeries> = BTreeMap::new();
        for &i in rows.iter() {
            let record = &data.records()[i];
            let label = match by {
                Some(dim) => record.dimension(dim),
                // Unreachable through the session (the control rejects
                // `none`), but a registered engine is usable standalone.
                None => UNGROUPED,
            };
            let series = groups.entry(label.to_string()).or_insert_with(|| GroupSeries {
                label: label.to_string(),
                xs: Vec::new(),
                ys: Vec::new(),
            });
            series.xs.push(record.tip_pct());
        }
        Ok(Value::Groups(Arc::new(groups.into_values().collect())))
    })?;

    engine.register(names::LIVE_TIP, |scope| {
        let tick = scope.tick(controls::LIVE_TICK)?;
        Ok(Value::Text(format!(
            "Live Tip: {:.2} at {}",
            tick.value,
            tick.timestamp_label()
        )))
    })?;

    Ok(())
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut n = 0u64;
    for v in values {
        sum += v;
        n += 1;
    }
    // Empty set yields no value, never zero and never a division.
    if n == 0 {
        None
    } else {
        Some(sum / n as f64)
    }
}

/// Display helpers for the summary value boxes.
pub fn format_mean_tip(stat: Option<f64>) -> Option<String> {
    stat.map(|v| format!("{:.1}%", v * 100.0))
}

pub fn format_mean_bill(stat: Option<f64>) -> Option<String> {
    stat.map(|v| format!("${v:.2}"))
}
