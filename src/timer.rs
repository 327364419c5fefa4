//! The scheduled invalidation trigger.
//!
//! A [`TickScheduler`] runs a background worker that emits a fresh
//! [`ClockTick`] at a fixed interval. Firings land in a single overwrite
//! slot read by the owning session between events; an unread firing is
//! simply replaced by the next one, never queued, so at most one tick
//! exists at a time. Cancellation (explicit or on drop) joins the worker,
//! so no orphaned firing can outlive the session.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Lower bound of the generated live-tip payload.
pub const TICK_MIN: f64 = -20.0;
/// Upper bound of the generated live-tip payload.
pub const TICK_MAX: f64 = 35.0;
/// Firing interval of the live-update trigger.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// One firing of the virtual live-update input. Ephemeral: regenerated per
/// firing, latest wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ClockTick {
    /// Payload in `[TICK_MIN, TICK_MAX]`, rounded to two decimals.
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl ClockTick {
    /// The neutral tick a session starts with before the first firing.
    pub fn zero() -> Self {
        Self { value: 0.0, timestamp: Utc::now() }
    }

    /// Wall-clock label in the display format of the live-update view.
    pub fn timestamp_label(&self) -> String {
        self.timestamp.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Seam for tick generation: the scheduler pulls ticks from a source so
/// tests can substitute a deterministic one.
pub trait TickSource: Send {
    fn next_tick(&mut self) -> ClockTick;
}

/// Production source: uniform payload in `[TICK_MIN, TICK_MAX]`, wall-clock
/// timestamp.
#[derive(Debug, Default)]
pub struct RandomTicks;

impl TickSource for RandomTicks {
    fn next_tick(&mut self) -> ClockTick {
        let raw: f64 = rand::thread_rng().gen_range(TICK_MIN..=TICK_MAX);
        ClockTick {
            value: (raw * 100.0).round() / 100.0,
            timestamp: Utc::now(),
        }
    }
}

/// A repeating trigger backed by a worker thread.
///
/// The worker parks on a stop channel with the firing interval as timeout;
/// a timeout overwrites the slot with one fresh tick, a stop message (or a
/// dropped scheduler) ends the loop.
pub struct TickScheduler {
    stop: Sender<()>,
    worker: Option<JoinHandle<()>>,
    /// The single pending firing. Overwritten by the worker, taken by
    /// [`TickScheduler::latest`]; never holds more than one tick.
    slot: Arc<Mutex<Option<ClockTick>>>,
}

impl TickScheduler {
    /// Arms a repeating trigger with the production tick source.
    pub fn schedule(interval: Duration) -> Self {
        Self::schedule_with(interval, RandomTicks)
    }

    /// Arms a repeating trigger with an injected tick source.
    pub fn schedule_with(interval: Duration, mut source: impl TickSource + 'static) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let slot = Arc::new(Mutex::new(None));

        let shared = Arc::clone(&slot);
        let worker = thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    if let Ok(mut pending) = shared.lock() {
                        *pending = Some(source.next_tick());
                    }
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });

        Self { stop: stop_tx, worker: Some(worker), slot }
    }

    /// Takes the pending firing, if any. Intervening unread firings were
    /// already overwritten; returns `None` when nothing fired since the
    /// last take.
    pub fn latest(&self) -> Option<ClockTick> {
        self.slot.lock().ok().and_then(|mut pending| pending.take())
    }

    /// Stops future firings and joins the worker. Idempotent.
    pub fn cancel(&mut self) {
        let _ = self.stop.send(());
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for TickScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic source counting up from 1.0.
    struct SequenceTicks {
        next: f64,
    }

    impl TickSource for SequenceTicks {
        fn next_tick(&mut self) -> ClockTick {
            self.next += 1.0;
            ClockTick { value: self.next, timestamp: Utc::now() }
        }
    }

    #[test]
    fn test_random_payload_stays_in_range() {
        let mut source = RandomTicks;
        for _ in 0..200 {
            let tick = source.next_tick();
            assert!(tick.value >= TICK_MIN && tick.value <= TICK_MAX);
            // Two-decimal rounding must be exact.
            assert_eq!(tick.value, (tick.value * 100.0).round() / 100.0);
        }
    }

    #[test]
    fn test_unread_firings_collapse_to_latest() {
        let mut scheduler =
            TickScheduler::schedule_with(Duration::from_millis(5), SequenceTicks { next: 0.0 });
        // Let several firings land unread, then stop the worker so the
        // pending state is frozen.
        thread::sleep(Duration::from_millis(60));
        scheduler.cancel();

        let latest = scheduler.latest().expect("at least one firing");
        assert!(latest.value >= 2.0, "expected several firings, got {}", latest.value);
        // Exactly one tick was pending after N firings, never a queue.
        assert!(scheduler.latest().is_none());
    }

    #[test]
    fn test_cancel_stops_firings() {
        let mut scheduler =
            TickScheduler::schedule_with(Duration::from_millis(5), SequenceTicks { next: 0.0 });
        thread::sleep(Duration::from_millis(25));
        scheduler.cancel();
        let _ = scheduler.latest(); // drain whatever fired before the join
        thread::sleep(Duration::from_millis(25));
        assert!(scheduler.latest().is_none(), "worker fired after cancel");
        scheduler.cancel(); // idempotent
    }
}
