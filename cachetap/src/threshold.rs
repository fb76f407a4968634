//! Hit/miss threshold: fixed or calibrated
//!
//! A sample at or below the threshold is a hit (the line was cache-resident),
//! anything above is a miss. Classification is a pure function of the sample.
//!
//! ## Calibration
//!
//! Calibration times reloads of a private, cache-line-aligned buffer:
//! - **hit** distribution: reload a line that was just loaded
//! - **miss** distribution: reload a line that was just flushed
//!
//! The threshold sits one third of the way from the hit median to the miss
//! median, `(miss + 2 * hit) / 3`. When the two distributions overlap
//! (hit p95 ≥ miss p5) the result is still returned, with a warning.

use log::{info, warn};
use std::fmt;

use crate::domain::Sample;
use crate::probe::{CacheProbe, CACHE_LINE_SIZE};

/// Fixed threshold tuned for a desktop x86_64 part (TSC ticks)
pub const DEFAULT_THRESHOLD: Sample = Sample(220);

/// Samples taken per distribution during calibration
pub const DEFAULT_CALIBRATION_ROUNDS: usize = 100_000;

/// Result of a calibration run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calibration {
    pub threshold: Sample,
    pub hit_median: Sample,
    pub hit_p95: Sample,
    pub miss_median: Sample,
    pub miss_p5: Sample,
    /// True if the hit and miss distributions could not be cleanly separated
    pub overlapping: bool,
}

impl Calibration {
    fn from_samples(mut hits: Vec<u64>, mut misses: Vec<u64>) -> Self {
        hits.sort_unstable();
        misses.sort_unstable();

        let hit_median = percentile(&hits, 50);
        let hit_p95 = percentile(&hits, 95);
        let miss_median = percentile(&misses, 50);
        let miss_p5 = percentile(&misses, 5);

        let threshold = miss_median.saturating_add(hit_median.saturating_mul(2)) / 3;

        Self {
            threshold: Sample(threshold),
            hit_median: Sample(hit_median),
            hit_p95: Sample(hit_p95),
            miss_median: Sample(miss_median),
            miss_p5: Sample(miss_p5),
            overlapping: hit_p95 >= miss_p5,
        }
    }
}

impl fmt::Display for Calibration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "threshold={} (hit median={} p95={}, miss median={} p5={})",
            self.threshold.0, self.hit_median.0, self.hit_p95.0, self.miss_median.0, self.miss_p5.0
        )
    }
}

/// Boundary between cache-resident and evicted reload latencies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdModel {
    Fixed(Sample),
    Calibrated(Calibration),
}

impl ThresholdModel {
    #[must_use]
    pub fn threshold(&self) -> Sample {
        match self {
            ThresholdModel::Fixed(threshold) => *threshold,
            ThresholdModel::Calibrated(calibration) => calibration.threshold,
        }
    }

    /// `sample <= threshold`
    #[inline]
    #[must_use]
    pub fn is_hit(&self, sample: Sample) -> bool {
        sample <= self.threshold()
    }
}

impl Default for ThresholdModel {
    fn default() -> Self {
        ThresholdModel::Fixed(DEFAULT_THRESHOLD)
    }
}

impl fmt::Display for ThresholdModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThresholdModel::Fixed(threshold) => write!(f, "{} (fixed)", threshold.0),
            ThresholdModel::Calibrated(calibration) => {
                write!(f, "{} (calibrated)", calibration.threshold.0)
            }
        }
    }
}

#[repr(C, align(64))]
struct CalibrationLine([u8; CACHE_LINE_SIZE]);

/// Measure hit and miss latencies with `probe` and derive a threshold.
///
/// Never fails: overlapping distributions are reported through
/// [`Calibration::overlapping`] and a warning.
pub fn calibrate<P: CacheProbe>(probe: &mut P, rounds: usize) -> Calibration {
    let rounds = rounds.max(1);
    let line = Box::new(CalibrationLine([1; CACHE_LINE_SIZE]));
    let addr = line.0.as_ptr();

    let mut hits = Vec::with_capacity(rounds);
    let mut misses = Vec::with_capacity(rounds);

    // SAFETY: `addr` points into `line`, which outlives both loops.
    #[allow(unsafe_code)]
    unsafe {
        probe.timed_reload(addr);
        for _ in 0..rounds {
            probe.timed_reload(addr);
            hits.push(probe.timed_reload(addr).0);
        }
        for _ in 0..rounds {
            probe.flush(addr);
            misses.push(probe.timed_reload(addr).0);
        }
    }

    let calibration = Calibration::from_samples(hits, misses);
    if calibration.overlapping {
        warn!(
            "Hit and miss latencies overlap ({calibration}); expect missed or spurious symbols"
        );
    } else {
        info!("Calibrated: {calibration}");
    }
    calibration
}

/// Nearest-rank percentile of an already sorted slice
fn percentile(sorted: &[u64], pct: usize) -> u64 {
    if sorted.is_empty() {
        return 0;
    }
    let rank = (sorted.len() * pct).div_ceil(100);
    sorted[rank.saturating_sub(1).min(sorted.len() - 1)]
}
