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

//! Session counters for monitoring.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, TimeZone, Utc};

/// Relaxed-atomic counters for one session.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    connect_attempts: AtomicU64,
    opens: AtomicU64,
    disconnects: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
    malformed_frames: AtomicU64,
    /// Epoch millis of the last open, 0 while not connected.
    connected_since_ms: AtomicI64,
}

impl SessionMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_connect_attempt(&self) {
        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_open(&self) {
        self.opens.fetch_add(1, Ordering::Relaxed);
        self.connected_since_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub(crate) fn record_disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
        self.connected_since_ms.store(0, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    /// When the current connection was opened, if it is open.
    #[must_use]
    pub fn connected_since(&self) -> Option<DateTime<Utc>> {
        let millis = self.connected_since_ms.load(Ordering::Relaxed);
        if millis == 0 {
            None
        } else {
            Utc.timestamp_millis_opt(millis).single()
        }
    }

    /// Take a consistent-enough snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            opens: self.opens.load(Ordering::Relaxed),
            disconnects: self.disconnects.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connect_attempts: u64,
    pub opens: u64,
    pub disconnects: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
    pub malformed_frames: u64,
}

impl MetricsSnapshot {
    /// Summary string for logging.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "opens={}/{} disconnects={} sent={} received={} malformed={}",
            self.opens,
            self.connect_attempts,
            self.disconnects,
            self.frames_sent,
            self.frames_received,
            self.malformed_frames,
        )
    }
}
