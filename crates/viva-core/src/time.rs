//! Media time for VIVA
//!
//! Every time-dependent operation in the pipeline takes the current media time
//! explicitly instead of reading a wall clock. The host advances it from its
//! own monotonic clock; tests advance it by hand.

use std::ops::{Add, Sub};
use std::time::Duration;

/// Media time - monotonic, microseconds since the host epoch
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct MediaTime(pub u64);

impl MediaTime {
    pub const ZERO: MediaTime = MediaTime(0);

    #[inline]
    pub fn from_micros(micros: u64) -> Self {
        MediaTime(micros)
    }

    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        MediaTime(millis * 1000)
    }

    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        MediaTime((secs.max(0.0) * 1_000_000.0) as u64)
    }

    #[inline]
    pub fn from_duration(duration: Duration) -> Self {
        MediaTime(duration.as_micros().min(u64::MAX as u128) as u64)
    }

    #[inline]
    pub fn as_micros(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn as_millis(self) -> u64 {
        self.0 / 1000
    }

    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    #[inline]
    pub fn as_duration(self) -> Duration {
        Duration::from_micros(self.0)
    }

    #[inline]
    pub fn saturating_add(self, duration: Duration) -> Self {
        MediaTime(self.0.saturating_add(duration.as_micros() as u64))
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future
    #[inline]
    pub fn since(self, earlier: MediaTime) -> Duration {
        self - earlier
    }
}

impl Add<Duration> for MediaTime {
    type Output = MediaTime;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        self.saturating_add(rhs)
    }
}

impl Sub<MediaTime> for MediaTime {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: MediaTime) -> Self::Output {
        Duration::from_micros(self.0.saturating_sub(rhs.0))
    }
}

impl std::fmt::Debug for MediaTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "τm({:.3}ms)", self.0 as f64 / 1000.0)
    }
}
