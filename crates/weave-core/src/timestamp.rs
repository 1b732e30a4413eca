//! Server timestamps
//!
//! Dispatch stamps every request with the wall-clock time it started at,
//! rounded to hundredths of a second, and echoes it back in the
//! `X-Weave-Timestamp` header.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Header carrying the dispatch-start time
pub const TIMESTAMP_HEADER: &str = "X-Weave-Timestamp";

/// Seconds since the Unix epoch with two decimals of precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerTime(u64);

impl ServerTime {
    /// Current time, rounded to the nearest 10ms
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self::from_duration(elapsed)
    }

    /// Round a duration since the epoch
    pub fn from_duration(elapsed: Duration) -> Self {
        Self(((elapsed.as_millis() + 5) / 10) as u64)
    }

    /// Build from hundredths of a second
    pub fn from_centis(centis: u64) -> Self {
        Self(centis)
    }

    /// Hundredths of a second since the epoch
    pub fn as_centis(&self) -> u64 {
        self.0
    }

    /// Seconds since the epoch
    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for ServerTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}
