//! Copy progress estimation.
//!
//! Turns noisy inputs (periodic target-size measurements plus whatever percentage the
//! copy tool prints) into a smooth, monotonic "displayed bytes" value.
//!
//! Rules per sample:
//! - A reported percentage wins: displayed = total * pct / 100, and speed is derived from
//!   the change of that displayed value.
//! - Without one, displayed grows by smoothed speed * elapsed, clamped to the measured size.
//!   The very first growth is seeded with min(measured, total / 100).
//! - Speed is an exponential moving average (factor 0.3) seeded by the first non-zero sample.
//! - Displayed never decreases and never exceeds the total.
//! - Ten consecutive samples without measured growth and a speed under 1 KiB/s mark the copy
//!   as "stalled" (busy with metadata rather than bytes).
//! - The copy occupies the 10..90 window of the overall workflow percentage.

use std::time::Duration;

pub const SMOOTHING_FACTOR: f64 = 0.3;
pub const STALL_SAMPLES: u32 = 10;
pub const STALL_SPEED: f64 = 1024.0;
pub const COPY_WINDOW_START: f64 = 10.0;
pub const COPY_WINDOW_SPAN: f64 = 80.0;

/// One estimator output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub displayed_bytes: u64,
    /// 0..=100 within the copy itself
    pub copy_percent: f64,
    /// 10..=90 within the whole workflow
    pub overall_percent: f64,
    pub speed: f64,
    pub eta: Option<Duration>,
    pub stalled: bool,
}

#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    total: u64,
    displayed: u64,
    prev_actual: u64,
    smoothed: f64,
    no_change: u32,
}

impl ProgressEstimator {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total: total_bytes,
            displayed: 0,
            prev_actual: 0,
            smoothed: 0.0,
            no_change: 0,
        }
    }

    fn blend(&mut self, instant: f64) {
        if self.smoothed <= 0.0 {
            if instant > 0.0 {
                self.smoothed = instant;
            }
        } else {
            self.smoothed = SMOOTHING_FACTOR * instant + (1.0 - SMOOTHING_FACTOR) * self.smoothed;
        }
    }

    /// Feed one measurement: `actual` bytes present at the target, the latest percentage the
    /// tool reported (if any), and the time since the previous sample.
    pub fn sample(&mut self, actual: u64, reported_percent: Option<f64>, dt: Duration) -> Estimate {
        let secs = dt.as_secs_f64();
        let delta = actual.saturating_sub(self.prev_actual);
        self.prev_actual = actual;
        if delta == 0 {
            self.no_change += 1;
        } else {
            self.no_change = 0;
        }

        let prev_displayed = self.displayed;
        let mut displayed = prev_displayed;

        match reported_percent.filter(|p| *p > 0.0) {
            Some(pct) => {
                displayed = (self.total as f64 * pct.min(100.0) / 100.0) as u64;
                let gained = displayed.saturating_sub(prev_displayed);
                let instant = if secs > 0.0 { gained as f64 / secs } else { 0.0 };
                self.blend(instant);
            }
            None => {
                let instant = if secs > 0.0 { delta as f64 / secs } else { 0.0 };
                self.blend(instant);
                if secs > 0.0 && self.smoothed > 0.0 && prev_displayed > 0 {
                    displayed = prev_displayed + (self.smoothed * secs) as u64;
                    displayed = displayed.min(actual);
                } else if prev_displayed == 0 && actual > 0 {
                    displayed = actual.min((self.total / 100).max(1));
                }
            }
        }

        displayed = displayed.max(prev_displayed).min(self.total);
        self.displayed = displayed;

        let copy_percent = if self.total == 0 {
            0.0
        } else {
            displayed as f64 * 100.0 / self.total as f64
        };
        let overall_percent = COPY_WINDOW_START + copy_percent * COPY_WINDOW_SPAN / 100.0;
        let remaining = self.total.saturating_sub(displayed);
        // a decaying average during a long stall drives the quotient past Duration's range
        let eta = (self.smoothed > 0.0)
            .then(|| Duration::try_from_secs_f64(remaining as f64 / self.smoothed).ok())
            .flatten();
        let stalled = self.no_change >= STALL_SAMPLES && self.smoothed < STALL_SPEED;

        Estimate {
            displayed_bytes: displayed,
            copy_percent,
            overall_percent,
            speed: self.smoothed,
            eta,
            stalled,
        }
    }
}
