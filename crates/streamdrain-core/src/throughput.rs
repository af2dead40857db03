//! Throughput reporting.
//!
//! The [`ThroughputReporter`] watches the cumulative record count of a drain
//! and emits a [`ThroughputSample`] each time the count crosses a multiple of
//! the reporting interval. At the end it produces a [`ThroughputSummary`].
//!
//! Rates are `count / elapsed_seconds`. A zero elapsed time yields no rate
//! rather than infinity or NaN.

use std::time::Duration;

use tokio::time::Instant;

/// Records per second, or `None` when the rate is undefined.
pub fn rate(count: u64, elapsed: Duration) -> Option<f64> {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return None;
    }
    let rate = count as f64 / secs;
    rate.is_finite().then_some(rate)
}

/// A single progress observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSample {
    /// Time since the drain started.
    pub elapsed: Duration,
    /// Cumulative records consumed.
    pub count: u64,
}

impl ThroughputSample {
    pub fn rate(&self) -> Option<f64> {
        rate(self.count, self.elapsed)
    }
}

impl std::fmt::Display for ThroughputSample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "total count: {}, elapsed: {:.3}s",
            self.count,
            self.elapsed.as_secs_f64()
        )?;
        match self.rate() {
            Some(r) => write!(f, ", rate: {}/s", r.round()),
            None => write!(f, ", rate: n/a"),
        }
    }
}

/// Final (or partial) result of a drain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThroughputSummary {
    /// Total records consumed.
    pub total: u64,
    /// Total drain time.
    pub elapsed: Duration,
    /// Number of non-empty batches read.
    pub batches: u64,
    /// `false` when the drain was cut short by an error.
    pub complete: bool,
}

impl ThroughputSummary {
    pub fn rate(&self) -> Option<f64> {
        rate(self.total, self.elapsed)
    }
}

impl std::fmt::Display for ThroughputSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.complete {
            writeln!(f, "Performance Summary:")?;
        } else {
            writeln!(f, "Partial Performance Summary (drain did not finish):")?;
        }
        writeln!(f, "- Total records read: {}", self.total)?;
        writeln!(f, "- Total batches read: {}", self.batches)?;
        writeln!(f, "- Total read duration: {:.3}s", self.elapsed.as_secs_f64())?;
        match self.rate() {
            Some(r) => write!(f, "- Read rate: {:.2} records/second", r),
            None => write!(f, "- Read rate: n/a"),
        }
    }
}

/// Emits progress every `interval` records.
#[derive(Debug, Clone)]
pub struct ThroughputReporter {
    start: Instant,
    interval: u64,
    next_boundary: u64,
    last: Option<ThroughputSample>,
}

impl ThroughputReporter {
    /// Start a reporter now. An interval of 0 disables progress samples.
    pub fn new(interval: u64) -> Self {
        Self::started_at(Instant::now(), interval)
    }

    pub fn started_at(start: Instant, interval: u64) -> Self {
        Self {
            start,
            interval,
            next_boundary: interval,
            last: None,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Observe the cumulative count now.
    pub fn observe(&mut self, cumulative: u64) -> Option<ThroughputSample> {
        let elapsed = self.elapsed();
        self.observe_at(cumulative, elapsed)
    }

    /// Observe the cumulative count at a given elapsed time.
    ///
    /// Returns a sample if the count crossed at least one interval boundary.
    /// Crossing several boundaries in one step yields one sample.
    pub fn observe_at(&mut self, cumulative: u64, elapsed: Duration) -> Option<ThroughputSample> {
        if self.interval == 0 || cumulative < self.next_boundary {
            return None;
        }

        let crossed = cumulative / self.interval;
        self.next_boundary = crossed.saturating_add(1).saturating_mul(self.interval);

        let sample = ThroughputSample {
            elapsed,
            count: cumulative,
        };
        self.last = Some(sample);
        Some(sample)
    }

    /// The most recent progress sample, if any.
    pub fn last_sample(&self) -> Option<ThroughputSample> {
        self.last
    }

    /// Summarise the drain as of now.
    pub fn summary(&self, total: u64, batches: u64, complete: bool) -> ThroughputSummary {
        ThroughputSummary {
            total,
            elapsed: self.elapsed(),
            batches,
            complete,
        }
    }
}
