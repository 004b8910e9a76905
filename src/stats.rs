// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Time-windowed statistics.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy)]
struct TimedMeasurement {
    at: DateTime<Utc>,
    value: f64,
}

/// Average over the measurements of the last `window_secs` seconds.
///
/// Measurements are evicted once their age in whole seconds exceeds the
/// window. With fewer than `min_samples` measurements left there is no
/// average.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use tbkit::stats::MovingAverage;
///
/// let start = Utc::now();
/// let mut avg = MovingAverage::new(10, 2);
///
/// avg.add_measurement(1.0, start);
/// assert_eq!(avg.current_average(start), None);
///
/// avg.add_measurement(3.0, start + Duration::seconds(5));
/// assert_eq!(avg.current_average(start + Duration::seconds(5)), Some(2.0));
///
/// // the first measurement is 11 s old now
/// assert_eq!(avg.current_average(start + Duration::seconds(11)), None);
/// ```
#[derive(Debug, Clone)]
pub struct MovingAverage {
    window_secs: i64,
    min_samples: usize,
    measurements: VecDeque<TimedMeasurement>,
}

impl MovingAverage {
    /// Creates an empty moving average.
    #[must_use]
    pub fn new(window_secs: u32, min_samples: usize) -> Self {
        Self {
            window_secs: i64::from(window_secs),
            min_samples,
            measurements: VecDeque::new(),
        }
    }

    /// Adds a measurement taken at `at`.
    pub fn add_measurement(&mut self, value: f64, at: DateTime<Utc>) {
        self.evict(at);
        self.measurements.push_back(TimedMeasurement { at, value });
    }

    /// Adds a measurement taken now.
    pub fn add_measurement_now(&mut self, value: f64) {
        self.add_measurement(value, Utc::now());
    }

    /// Returns the average at `now`, or `None` below `min_samples`.
    pub fn current_average(&mut self, now: DateTime<Utc>) -> Option<f64> {
        self.evict(now);
        if self.measurements.is_empty() || self.measurements.len() < self.min_samples {
            return None;
        }

        let sum: f64 = self.measurements.iter().map(|m| m.value).sum();
        #[allow(clippy::cast_precision_loss)]
        let count = self.measurements.len() as f64;
        Some(sum / count)
    }

    /// Returns the average now.
    pub fn current_average_now(&mut self) -> Option<f64> {
        self.current_average(Utc::now())
    }

    /// Returns the number of measurements in the window as of the last call.
    #[must_use]
    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    #[must_use]
    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    #[must_use]
    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    fn evict(&mut self, now: DateTime<Utc>) {
        let window = self.window_secs;
        self.measurements
            .retain(|m| (now - m.at).num_seconds() <= window);
    }
}
