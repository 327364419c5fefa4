//! Terminal view layer over the dashboard core.
//!
//! Loads the tips table, walks through a filter change, a reset and a few
//! live-update firings, rendering each state as text. This binary is the
//! swappable collaborator the core is designed against; everything it does
//! goes through `Session::current` and the typed conveniences.

use std::error::Error;
use std::time::Duration;
use tipboard_core::views::{controls, format_mean_bill, format_mean_tip, names};
use tipboard_core::{dataset, ControlValue, MealPeriod, Session, Value, DEFAULT_INTERVAL};

fn main() {
    let path = std::env::args().nth(1).unwrap_or_else(|| "tips.csv".to_string());
    if let Err(err) = run(&path) {
        eprintln!("tipboard: {err}");
        std::process::exit(1);
    }
}

fn run(path: &str) -> Result<(), Box<dyn Error>> {
    if let Err(err) = tipboard_core::logging::init_logging("logs") {
        eprintln!("tipboard: logging unavailable: {err}");
    }

    let table = dataset::load(path)?;
    let mut session = Session::new(table)?;
    session.subscribe(|stale| log::debug!("re-render needed for {stale:?}"));

    println!("== defaults ==");
    render(&mut session)?;

    println!("\n== dinner only, bills up to $30 ==");
    session.set(controls::TIME, ControlValue::Periods(vec![MealPeriod::Dinner]))?;
    let bounds = session.bill_bounds();
    session.set(controls::TOTAL_BILL, ControlValue::Range(bounds.min, 30.0))?;
    render(&mut session)?;

    println!("\n== after reset ==");
    session.reset();
    render(&mut session)?;

    println!("\n== live updates ==");
    session.start_live_updates(DEFAULT_INTERVAL);
    for _ in 0..3 {
        std::thread::sleep(Duration::from_millis(1100));
        if session.pump() {
            println!("{}", session.live_tip()?);
        }
    }
    session.stop_live_updates();

    Ok(())
}

fn render(session: &mut Session) -> Result<(), Box<dyn Error>> {
    println!("total tippers: {}", session.row_count()?);
    println!(
        "average tip:   {}",
        format_mean_tip(session.mean_tip_pct()?).unwrap_or_else(|| "-".to_string())
    );
    println!(
        "average bill:  {}",
        format_mean_bill(session.mean_bill()?).unwrap_or_else(|| "-".to_string())
    );
    println!("{}", session.live_tip()?);

    let rows = session.filtered_records()?;
    for record in rows.iter().take(5) {
        println!("  {}", serde_json::to_string(record)?);
    }
    if rows.len() > 5 {
        println!("  ... {} more rows", rows.len() - 5);
    }

    if let Value::Groups(groups) = session.current(names::TIP_PERC_GROUPS)? {
        for group in groups.iter() {
            println!("  tip% by {}: {} rows", group.label, group.xs.len());
        }
    }
    Ok(())
}
