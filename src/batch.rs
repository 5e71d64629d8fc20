//! Grouping of a sample stream into batches.
//!
//! [`TimeBatchManager`] cuts the stream into windows of a target duration;
//! [`CountBatchManager`] into runs of a fixed number of samples.
//! [`Batcher`] picks one of the two from a [`CollectionMode`] and feeds it
//! with the sample's own device timestamp.
//!
//! None of these types are `Sync`-aware: one instance belongs to one stream
//! and is driven from one control flow.

use crate::config::{BatchConfig, CollectionMode};
use crate::types::{SensorType, Timestamped};

// ── Time windows ──────────────────────────────────────────────────────────────

/// Collects samples and releases them once `target_interval_ms` has elapsed
/// since the window opened.
///
/// The sample that closes a window is not part of the batch it releases; it
/// opens the next window.  With a 1000 ms target, samples at
/// `[0, 300, 600, 900, 1200]` release `[0, 300, 600, 900]` on the 1200 call
/// and leave `[1200]` buffered.
#[derive(Debug)]
pub struct TimeBatchManager<T> {
    target_interval_ms: f64,
    buffer: Vec<T>,
    window_start: Option<f64>,
}

impl<T> TimeBatchManager<T> {
    pub fn new(target_interval_ms: u64) -> Self {
        Self {
            target_interval_ms: target_interval_ms as f64,
            buffer: Vec::new(),
            window_start: None,
        }
    }

    /// Add one sample observed at `now` (milliseconds).
    ///
    /// Returns the completed window when `now - window_start >= target`.
    /// Time running backwards (a wrapped tick counter) also closes the window.
    pub fn add_sample(&mut self, sample: T, now: f64) -> Option<Vec<T>> {
        let start = *self.window_start.get_or_insert(now);
        let elapsed = now - start;
        if (elapsed >= self.target_interval_ms || elapsed < 0.0) && !self.buffer.is_empty() {
            let batch = std::mem::replace(&mut self.buffer, vec![sample]);
            self.window_start = Some(now);
            return Some(batch);
        }
        self.buffer.push(sample);
        None
    }

    /// Release whatever is buffered, e.g. when streaming stops.
    pub fn flush(&mut self) -> Option<Vec<T>> {
        self.window_start = None;
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    /// Drop buffered samples without returning them.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.window_start = None;
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// ── Sample counts ─────────────────────────────────────────────────────────────

/// Releases exactly `count` samples at a time.
#[derive(Debug)]
pub struct CountBatchManager<T> {
    count: usize,
    buffer: Vec<T>,
}

impl<T> CountBatchManager<T> {
    pub fn new(count: usize) -> Self {
        let count = count.max(1);
        Self {
            count,
            buffer: Vec::with_capacity(count),
        }
    }

    pub fn add_sample(&mut self, sample: T) -> Option<Vec<T>> {
        self.buffer.push(sample);
        if self.buffer.len() >= self.count {
            Some(std::mem::replace(
                &mut self.buffer,
                Vec::with_capacity(self.count),
            ))
        } else {
            None
        }
    }

    pub fn flush(&mut self) -> Option<Vec<T>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buffer))
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

// ── Mode-selected batcher ─────────────────────────────────────────────────────

/// One stream's batcher, built from the configured [`CollectionMode`].
#[derive(Debug)]
pub enum Batcher<T> {
    Time(TimeBatchManager<T>),
    Count(CountBatchManager<T>),
}

impl<T: Timestamped> Batcher<T> {
    pub fn for_sensor(sensor: SensorType, cfg: &BatchConfig) -> Self {
        match cfg.mode {
            CollectionMode::Duration => Batcher::Time(TimeBatchManager::new(cfg.duration_ms)),
            CollectionMode::SampleCount => {
                Batcher::Count(CountBatchManager::new(cfg.sample_count.get(sensor)))
            }
        }
    }

    /// Feed a run of samples, returning every batch they complete.
    pub fn extend(&mut self, samples: impl IntoIterator<Item = T>) -> Vec<Vec<T>> {
        samples
            .into_iter()
            .filter_map(|s| match self {
                Batcher::Time(m) => {
                    let now = s.timestamp_ms();
                    m.add_sample(s, now)
                }
                Batcher::Count(m) => m.add_sample(s),
            })
            .collect()
    }

    pub fn flush(&mut self) -> Option<Vec<T>> {
        match self {
            Batcher::Time(m) => m.flush(),
            Batcher::Count(m) => m.flush(),
        }
    }

    pub fn clear(&mut self) {
        match self {
            Batcher::Time(m) => m.clear(),
            Batcher::Count(m) => m.clear(),
        }
    }
}
