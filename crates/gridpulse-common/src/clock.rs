//! Monotonic timing and the sampling-cadence barrier.

use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

fn anchor() -> Instant {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    *ANCHOR.get_or_init(Instant::now)
}

/// Milliseconds of monotonic (non-wall) time since the first use in this
/// process. Unaffected by wall-clock adjustments.
pub fn monotonic_millis() -> u64 {
    anchor().elapsed().as_millis() as u64
}

/// Seconds since the Unix epoch, for stamping measurements.
pub fn epoch_seconds() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs(),
        Err(_) => 0,
    }
}

/// Sleep for the full interval. The standard library resumes the
/// underlying nanosleep across signal interruption.
pub fn sleep_millis(millis: u64) {
    thread::sleep(Duration::from_millis(millis));
}

/// Outcome of one barrier wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// False when the previous tick overran the interval and no sleep
    /// was possible (a cadence slip).
    pub on_time: bool,
    /// Milliseconds elapsed since the previous tick was released.
    pub elapsed_ms: u64,
}

/// Paces a loop to a fixed cadence against the monotonic clock.
///
/// The first wait returns immediately; every later wait measures the time
/// since the previous release and sleeps off the remainder of the
/// interval. The stored timestamp is taken after the sleep, so delays in
/// the caller shorten the next sleep instead of shifting the grid.
#[derive(Debug, Default)]
pub struct TickBarrier {
    last_release: Option<u64>,
}

impl TickBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wait(&mut self, interval_ms: u64) -> Tick {
        let tick = match self.last_release {
            None => Tick {
                on_time: true,
                elapsed_ms: 0,
            },
            Some(last) => {
                let elapsed_ms = monotonic_millis().saturating_sub(last);
                if elapsed_ms < interval_ms {
                    sleep_millis(interval_ms - elapsed_ms);
                    Tick {
                        on_time: true,
                        elapsed_ms,
                    }
                } else {
                    Tick {
                        on_time: false,
                        elapsed_ms,
                    }
                }
            }
        };

        self.last_release = Some(monotonic_millis());
        tick
    }
}
