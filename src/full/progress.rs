//! Record counters shared by every task of a run.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indicatif::ProgressBar;
use parking_lot::Mutex;

const FLUSH_EVERY: u64 = 1024;

/// Aggregates per-task progress into run totals and, optionally, a bar.
pub struct ProgressAggregator {
    records: AtomicU64,
    finished: Mutex<Vec<(String, u64)>>,
    bar: Option<ProgressBar>,
}

impl ProgressAggregator {
    /// Aggregator mirroring onto `bar` when given.
    pub fn new(bar: Option<ProgressBar>) -> Self {
        Self {
            records: AtomicU64::new(0),
            finished: Mutex::new(Vec::new()),
            bar,
        }
    }

    /// Aggregator without a bar.
    pub fn hidden() -> Self {
        Self::new(None)
    }

    /// Sets the number of units the run is expected to process.
    pub fn set_length(&self, units: u64) {
        if let Some(bar) = &self.bar {
            bar.set_length(units);
        }
    }

    /// Starts tracking one task.
    pub fn task(&self, name: &str) -> TaskProgress<'_> {
        if let Some(bar) = &self.bar {
            bar.set_message(name.to_owned());
        }
        TaskProgress {
            aggregator: self,
            name: name.to_owned(),
            pending: 0,
            total: 0,
        }
    }

    /// Units processed so far across all tasks.
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Finished tasks with the units each processed, in completion order.
    pub fn finished_tasks(&self) -> Vec<(String, u64)> {
        self.finished.lock().clone()
    }

    /// Clears the bar once the run is over.
    pub fn finish(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }

    fn flush(&self, units: u64) {
        if units == 0 {
            return;
        }
        self.records.fetch_add(units, Ordering::Relaxed);
        if let Some(bar) = &self.bar {
            bar.inc(units);
        }
    }
}

impl fmt::Debug for ProgressAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressAggregator")
            .field("records", &self.records())
            .field("bar", &self.bar.is_some())
            .finish()
    }
}

/// Progress of one task, flushed to the aggregator in batches.
pub struct TaskProgress<'a> {
    aggregator: &'a ProgressAggregator,
    name: String,
    pending: u64,
    total: u64,
}

impl TaskProgress<'_> {
    /// Counts `units` more processed units.
    pub fn add(&mut self, units: u64) {
        self.pending += units;
        self.total += units;
        if self.pending >= FLUSH_EVERY {
            self.aggregator.flush(self.pending);
            self.pending = 0;
        }
    }

    /// Flushes and records the task as finished; returns its unit count.
    pub fn finish(mut self) -> u64 {
        self.aggregator.flush(self.pending);
        self.pending = 0;
        self.aggregator
            .finished
            .lock()
            .push((std::mem::take(&mut self.name), self.total));
        self.total
    }
}

impl Drop for TaskProgress<'_> {
    fn drop(&mut self) {
        self.aggregator.flush(self.pending);
        self.pending = 0;
    }
}
