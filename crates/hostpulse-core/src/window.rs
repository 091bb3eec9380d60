//! Bounded, append-ordered buffer of recent snapshots for one entity.
//!
//! Order is arrival order from polling, not instant order: a skewed sample
//! stays where it arrived and the rate guards in [`crate::rates`] absorb it.
//! Eviction is FIFO by insertion.
//!
//! Derived views (frozen contents, per-counter rate series) are computed on
//! first use and cached until the next mutation, so several consumers reading
//! the same tick share one computation.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};

use crate::model::{MetricKey, Snapshot};
use crate::rates::{self, Counter, DerivedRates};

/// Default number of snapshots kept per entity (matches the fetch limit).
pub const DEFAULT_WINDOW_CAPACITY: usize = 100;

/// `(instant, value)` points of a derived series.
pub type Points = Arc<[(DateTime<Utc>, f64)]>;

#[derive(Debug)]
pub struct SampleWindow {
    capacity: usize,
    samples: VecDeque<Snapshot>,
    frozen: OnceLock<Arc<[Snapshot]>>,
    rate_cache: [OnceLock<Points>; 4],
}

impl SampleWindow {
    /// Creates an empty window. A capacity of zero is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: VecDeque::with_capacity(capacity),
            frozen: OnceLock::new(),
            rate_cache: Default::default(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Appends at the back, evicting from the front past capacity.
    pub fn append(&mut self, snapshot: Snapshot) {
        self.samples.push_back(snapshot);
        while self.samples.len() > self.capacity {
            self.samples.pop_front();
        }
        self.invalidate();
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.invalidate();
    }

    /// Most recently appended snapshot.
    pub fn latest(&self) -> Option<&Snapshot> {
        self.samples.back()
    }

    pub fn contains_instant(&self, instant: DateTime<Utc>) -> bool {
        self.samples.iter().any(|s| s.instant == instant)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.samples.iter()
    }

    /// Immutable copy of the current contents, shared until the next mutation.
    pub fn snapshots(&self) -> Arc<[Snapshot]> {
        self.frozen
            .get_or_init(|| self.samples.iter().cloned().collect())
            .clone()
    }

    /// Raw values of `key` as of now. Later appends do not affect the result.
    pub fn series(&self, key: MetricKey) -> Series {
        Series::new(self.snapshots(), key)
    }

    /// Rates between the last two entries; all zero with fewer than two.
    pub fn derived_rates(&self) -> DerivedRates {
        let n = self.samples.len();
        if n < 2 {
            return DerivedRates::default();
        }
        DerivedRates::between(&self.samples[n - 1], &self.samples[n - 2])
    }

    /// Display-unit rate of `counter` at every entry (first entry is 0).
    pub fn rate_series(&self, counter: Counter) -> Points {
        self.rate_cache[counter as usize]
            .get_or_init(|| rates::rate_series(self.samples.iter(), counter).into())
            .clone()
    }

    /// Trailing simple moving average of `key` over `width` entries.
    ///
    /// Early points average whatever precedes them; `width` of 0 acts as 1.
    pub fn moving_average(&self, key: MetricKey, width: usize) -> Vec<(DateTime<Utc>, f64)> {
        let width = width.max(1);
        let values: Vec<f64> = self.samples.iter().map(|s| s.value(key)).collect();
        let mut out = Vec::with_capacity(values.len());
        let mut sum = 0.0;
        for (i, s) in self.samples.iter().enumerate() {
            sum += values[i];
            if i >= width {
                sum -= values[i - width];
            }
            let n = (i + 1).min(width);
            out.push((s.instant, sum / n as f64));
        }
        out
    }

    fn invalidate(&mut self) {
        self.frozen.take();
        for cell in &mut self.rate_cache {
            cell.take();
        }
    }
}

impl Default for SampleWindow {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_CAPACITY)
    }
}

/// Raw `(instant, value)` sequence for one metric, frozen at creation.
///
/// Can be iterated any number of times.
#[derive(Debug, Clone)]
pub struct Series {
    samples: Arc<[Snapshot]>,
    key: MetricKey,
}

impl Series {
    pub(crate) fn new(samples: Arc<[Snapshot]>, key: MetricKey) -> Self {
        Self { samples, key }
    }

    pub fn key(&self) -> MetricKey {
        self.key
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> SeriesIter<'_> {
        SeriesIter {
            inner: self.samples.iter(),
            key: self.key,
        }
    }
}

impl<'a> IntoIterator for &'a Series {
    type Item = (DateTime<Utc>, f64);
    type IntoIter = SeriesIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

pub struct SeriesIter<'a> {
    inner: std::slice::Iter<'a, Snapshot>,
    key: MetricKey,
}

impl Iterator for SeriesIter<'_> {
    type Item = (DateTime<Utc>, f64);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|s| (s.instant, s.value(self.key)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for SeriesIter<'_> {}
