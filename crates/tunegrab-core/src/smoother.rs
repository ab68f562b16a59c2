//! Exponential smoothing of the raw speed signal into a bounded chart series.

use std::collections::VecDeque;

/// Weight of the newest raw sample in the moving average.
pub const DEFAULT_SMOOTHING_FACTOR: f64 = 0.3;
/// Number of smoothed values kept for the chart (~30s at two events per second).
pub const DEFAULT_WINDOW: usize = 60;

/// Whether the average has seen a sample since the last reset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SmoothingState {
    Uninitialized,
    Initialized(f64),
}

/// Fixed-capacity FIFO of smoothed speeds, oldest first.
#[derive(Debug, Clone)]
pub struct SmoothedSeries {
    values: VecDeque<f64>,
    capacity: usize,
}

impl SmoothedSeries {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append `value`, evicting the oldest entry first when full.
    fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.back().copied()
    }

    pub fn max(&self) -> Option<f64> {
        self.iter().reduce(f64::max)
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }
}

/// EMA over raw speed samples with a bounded history for charting.
#[derive(Debug, Clone)]
pub struct SpeedSmoother {
    alpha: f64,
    state: SmoothingState,
    series: SmoothedSeries,
}

impl Default for SpeedSmoother {
    fn default() -> Self {
        Self::new(DEFAULT_SMOOTHING_FACTOR, DEFAULT_WINDOW)
    }
}

impl SpeedSmoother {
    /// `alpha` is clamped into (0, 1]; `window` is at least 1.
    pub fn new(alpha: f64, window: usize) -> Self {
        let alpha = if alpha.is_finite() && alpha > 0.0 {
            alpha.min(1.0)
        } else {
            DEFAULT_SMOOTHING_FACTOR
        };
        Self {
            alpha,
            state: SmoothingState::Uninitialized,
            series: SmoothedSeries::with_capacity(window),
        }
    }

    /// Drop all history; the next sample is taken unblended.
    pub fn reset(&mut self) {
        self.state = SmoothingState::Uninitialized;
        self.series.clear();
    }

    /// Blend `raw` into the average, record it, and return the smoothed value.
    pub fn ingest(&mut self, raw: f64) -> f64 {
        let smoothed = match self.state {
            SmoothingState::Uninitialized => raw,
            SmoothingState::Initialized(last) => self.alpha * raw + (1.0 - self.alpha) * last,
        };
        self.state = SmoothingState::Initialized(smoothed);
        self.series.push(smoothed);
        smoothed
    }

    pub fn state(&self) -> SmoothingState {
        self.state
    }

    pub fn last(&self) -> Option<f64> {
        match self.state {
            SmoothingState::Uninitialized => None,
            SmoothingState::Initialized(v) => Some(v),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn series(&self) -> &SmoothedSeries {
        &self.series
    }
}
