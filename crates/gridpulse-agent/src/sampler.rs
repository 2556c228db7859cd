//! The sampling driver: one thread invoking an on-tick callback at a
//! fixed cadence.

use std::io;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{Relaxed, Release};
use std::thread::{self, JoinHandle};

use gridpulse_common::clock::TickBarrier;
use tracing::info;

/// Shared stop flag of a running sampler. Clones observe the same flag,
/// so a callback (or a signal handler) can request the stop itself.
#[derive(Debug, Clone)]
pub struct SamplerControl {
    running: Arc<AtomicBool>,
}

impl SamplerControl {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Request the sampler to stop. The thread exits after the current
    /// callback returns; a stopped sampler never resumes.
    pub fn stop(&self) {
        self.running.store(false, Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Relaxed)
    }
}

/// A running sampler thread. Dropping the handle without [`Sampler::join`]
/// detaches the thread; `stop` + `join` is the orderly way down.
pub struct Sampler {
    control: SamplerControl,
    thread: JoinHandle<()>,
}

impl Sampler {
    /// Spawn the sampler thread. Every iteration waits out the interval
    /// barrier (when `interval_ms` is non-negative), invokes `on_tick`,
    /// and re-checks the stop flag. A negative interval samples as fast
    /// as the callback returns, for sources that block on their own
    /// input.
    pub fn start<F>(interval_ms: i64, mut on_tick: F) -> io::Result<Self>
    where
        F: FnMut(&SamplerControl) + Send + 'static,
    {
        let control = SamplerControl::new();
        let thread_control = control.clone();

        let thread = thread::Builder::new()
            .name("sampler".to_string())
            .spawn(move || {
                let mut barrier = TickBarrier::new();

                while thread_control.is_running() {
                    if interval_ms >= 0 {
                        let tick = barrier.wait(interval_ms as u64);
                        if !tick.on_time {
                            info!(
                                "cannot keep up with sampling interval {interval_ms} ms, time elapsed: {} ms",
                                tick.elapsed_ms
                            );
                        }
                    }

                    on_tick(&thread_control);
                }
            })?;

        Ok(Self { control, thread })
    }

    /// A control clone, e.g. for a signal handler.
    pub fn control(&self) -> SamplerControl {
        self.control.clone()
    }

    pub fn stop(&self) {
        self.control.stop();
    }

    /// Wait for the sampler thread to exit.
    pub fn join(self) -> io::Result<()> {
        self.thread
            .join()
            .map_err(|_| io::Error::other("sampler thread panicked"))
    }
}
