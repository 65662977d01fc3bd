// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Reconnect delay policy: exponential backoff with a cap and jitter.
//!
//! Each failed connect attempt doubles the delay up to a maximum, with a
//! random jitter spread so a fleet of clients does not reconnect in
//! lockstep against a recovering server.

use std::time::Duration;

use rand::Rng;

/// Exponential backoff calculator.
///
/// The attempt counter increments on every [`next_delay`](Self::next_delay)
/// and resets to zero on [`reset`](Self::reset) after a successful open.
#[derive(Debug)]
pub struct Backoff {
    base_delay: Duration,
    max_delay: Duration,
    jitter_factor: f64,
    attempt: u32,
}

impl Backoff {
    /// Create a backoff policy.
    ///
    /// `jitter_factor` is the relative spread around the computed delay,
    /// e.g. `0.2` for ±20%.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, jitter_factor: f64) -> Self {
        Self {
            base_delay,
            max_delay,
            jitter_factor,
            attempt: 0,
        }
    }

    /// Compute the delay for the next reconnect attempt and advance the
    /// attempt counter.
    pub fn next_delay(&mut self) -> Duration {
        let exponential =
            self.base_delay.as_millis() as f64 * 2_f64.powi(self.attempt.min(31) as i32);
        let capped = exponential.min(self.max_delay.as_millis() as f64);

        let delay_ms = if self.jitter_factor > 0.0 {
            let spread = capped * self.jitter_factor;
            capped + rand::thread_rng().gen_range(-spread..=spread)
        } else {
            capped
        };

        self.attempt = self.attempt.saturating_add(1);

        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Reset the attempt counter after a successful open.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    /// Number of delays handed out since the last reset.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}
