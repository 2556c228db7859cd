//! The bounded, observable queue between the sampler and the upload
//! workers.
//!
//! All operations are non-blocking and serialise on one mutex; producers
//! see back-pressure as `enqueue` handing the item back. Occupancy
//! crossing one of the capacity thresholds logs a warning exactly once
//! per direction, with a ±1% hysteresis band so a level hovering around
//! a threshold does not flap the log.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::warn;

// Occupancy fractions worth a warning, lowest first.
const THRESHOLDS: [f64; 5] = [0.01, 0.25, 0.5, 0.75, 0.99];
const HYSTERESIS: f64 = 0.01;

struct Inner<T> {
    items: VecDeque<T>,
    // index of the lowest threshold not yet crossed upward
    level: usize,
}

pub struct BoundedQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                level: 0,
            }),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an item. A full queue refuses and returns the item so the
    /// caller keeps ownership.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.items.len() >= self.capacity {
            return Err(item);
        }

        let count = inner.items.len();
        for i in inner.level..THRESHOLDS.len() {
            if count == ((THRESHOLDS[i] + HYSTERESIS) * self.capacity as f64) as usize {
                warn!(
                    "queue exceeds {:.0}% of its capacity ({} items)",
                    THRESHOLDS[i] * 100.0,
                    count
                );
                inner.level = i + 1;
            }
        }

        inner.items.push_back(item);
        Ok(())
    }

    /// Remove the oldest item, if any.
    pub fn dequeue(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner.items.is_empty() {
            return None;
        }

        let count = inner.items.len();
        for i in 0..inner.level {
            if count == ((THRESHOLDS[i] - HYSTERESIS) * self.capacity as f64) as usize {
                warn!(
                    "queue falls below {:.0}% of its capacity ({} items)",
                    THRESHOLDS[i] * 100.0,
                    count
                );
                inner.level = i;
            }
        }

        inner.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .items
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued item.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.items.clear();
        inner.level = 0;
    }

    #[cfg(test)]
    fn level(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).level
    }
}
