//! Timestamps and latency measurement
//!
//! Venue timestamps are milliseconds since the Unix epoch; internal
//! measurement uses nanoseconds.

use std::time::{SystemTime, UNIX_EPOCH};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// High-precision timestamp type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    /// Nanoseconds since Unix epoch
    pub nanos: u64,
}

impl Timestamp {
    /// Create a timestamp from venue milliseconds
    pub fn from_millis(millis: u64) -> Self {
        Self {
            nanos: millis.saturating_mul(1_000_000),
        }
    }

    /// Create a timestamp from the current time
    pub fn now() -> Self {
        Self { nanos: nanos() }
    }

    /// Convert to chrono DateTime<Utc>
    pub fn to_datetime(&self) -> DateTime<Utc> {
        let secs = self.nanos / 1_000_000_000;
        let nsecs = (self.nanos % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs as i64, nsecs).unwrap_or_default()
    }

    /// Get elapsed time since this timestamp in microseconds
    pub fn elapsed_micros(&self) -> u64 {
        nanos().saturating_sub(self.nanos) / 1_000
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

/// Nanoseconds since the Unix epoch (wall clock)
#[inline(always)]
pub fn nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// Milliseconds since the Unix epoch, the unit of the venue's `timestamp` parameter
#[inline]
pub fn timestamp_ms() -> u64 {
    nanos() / 1_000_000
}

/// Performance measurement utilities
///
/// Logs the elapsed time at debug level when dropped.
pub struct PerfTimer {
    start: Timestamp,
    name: String,
}

impl PerfTimer {
    /// Start a new performance timer
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Timestamp::now(),
            name: name.into(),
        }
    }

    /// Get elapsed time in microseconds
    pub fn elapsed_micros(&self) -> u64 {
        self.start.elapsed_micros()
    }
}

impl Drop for PerfTimer {
    fn drop(&mut self) {
        crate::log_latency!(self.name, self.elapsed_micros());
    }
}
