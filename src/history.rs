//! Bounded in-memory history of accepted readings.
//!
//! The ingestion loop is the only writer; the dashboard holds a cloned
//! handle and reads through snapshots. Storing whole [`Reading`]s in a
//! single deque keeps every channel the same length by construction, so a
//! reader can never observe a torn cross-channel state. All access is a
//! short critical section under one mutex.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Local};

use crate::protocol::{Channel, Reading};

/// Default retention window, matching the device's low sample rate: at one
/// sample per second this is a bit over two days of history.
pub const DEFAULT_CAPACITY: usize = 200_000;

/// Shared handle to the history buffer. Cheap to clone.
#[derive(Debug, Clone)]
pub struct History {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug)]
struct Inner {
    capacity: usize,
    readings: VecDeque<Reading>,
}

impl History {
    /// Create a history bounded at [`DEFAULT_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a history bounded at `capacity` entries (minimum 1).
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                capacity,
                readings: VecDeque::with_capacity(capacity.min(1024)),
            })),
        }
    }

    /// Append one reading, evicting the oldest entry first when full.
    pub fn append(&self, reading: Reading) {
        let mut inner = self.inner.lock().unwrap();
        if inner.readings.len() == inner.capacity {
            inner.readings.pop_front();
        }
        inner.readings.push_back(reading);
    }

    /// Number of retained readings (identical for every channel).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retention bound this history was created with.
    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    /// The most recent `count` values of one channel, oldest first.
    /// Returns fewer if the history is shorter.
    pub fn snapshot(&self, channel: Channel, count: usize) -> Vec<f64> {
        let inner = self.inner.lock().unwrap();
        let skip = inner.readings.len().saturating_sub(count);
        inner
            .readings
            .iter()
            .skip(skip)
            .map(|r| r.values.channel(channel))
            .collect()
    }

    /// The most recent `count` acceptance timestamps, oldest first.
    pub fn timestamps(&self, count: usize) -> Vec<DateTime<Local>> {
        let inner = self.inner.lock().unwrap();
        let skip = inner.readings.len().saturating_sub(count);
        inner.readings.iter().skip(skip).map(|r| r.timestamp).collect()
    }

    /// The most recently accepted reading, if any. Backs the dashboard's
    /// live-value display.
    pub fn latest(&self) -> Option<Reading> {
        self.inner.lock().unwrap().readings.back().cloned()
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
