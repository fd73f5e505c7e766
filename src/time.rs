//! Fixed-point time domain used by the rate controller.
//!
//! All timestamps are unsigned 32-bit values in Q16.16 seconds (65536 ticks
//! per second, the short NTP format), supplied by the caller. The domain
//! wraps every ~18.2 hours; subtraction is wrapping, so intervals and
//! cooldowns keep working across the wrap boundary.

use std::ops::{Add, Sub};

/// Ticks per second of the Q16.16 time domain.
pub const NTP_TICKS_PER_SEC: u32 = 65536;

/// Seconds per tick.
pub const NTP_TICK_SECS: f64 = 1.0 / NTP_TICKS_PER_SEC as f64;

/// A monotonic timestamp in Q16.16 seconds.
///
/// Opaque on purpose: the only ways out are [`NtpTimestamp::ticks`],
/// [`NtpTimestamp::as_secs_f64`] and wrapping-safe
/// [`NtpTimestamp::duration_since`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NtpTimestamp(u32);

impl NtpTimestamp {
    /// Construct from a raw tick count.
    pub const fn from_ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    /// Construct from seconds, truncating to tick resolution.
    ///
    /// Values are taken modulo the ~18.2 hour wrap period.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * NTP_TICKS_PER_SEC as f64) as u64 as u32)
    }

    /// The raw tick count.
    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// This timestamp expressed in seconds since the (wrapping) epoch.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 * NTP_TICK_SECS
    }

    /// Elapsed time since `earlier`, modulo the wrap period.
    pub const fn duration_since(self, earlier: NtpTimestamp) -> NtpDuration {
        NtpDuration(self.0.wrapping_sub(earlier.0))
    }

    /// Elapsed seconds since `earlier`, modulo the wrap period.
    pub fn seconds_since(self, earlier: NtpTimestamp) -> f64 {
        self.duration_since(earlier).as_secs_f64()
    }
}

/// A span of time in Q16.16 ticks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NtpDuration(u32);

impl NtpDuration {
    /// Zero-length duration.
    pub const ZERO: NtpDuration = NtpDuration(0);

    /// Construct from a raw tick count.
    pub const fn from_ticks(ticks: u32) -> Self {
        Self(ticks)
    }

    /// Construct from seconds, truncating to tick resolution.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self((secs * NTP_TICKS_PER_SEC as f64) as u64 as u32)
    }

    /// The raw tick count.
    pub const fn ticks(self) -> u32 {
        self.0
    }

    /// The span expressed in seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 * NTP_TICK_SECS
    }
}

impl Add<NtpDuration> for NtpTimestamp {
    type Output = NtpTimestamp;

    fn add(self, rhs: NtpDuration) -> NtpTimestamp {
        NtpTimestamp(self.0.wrapping_add(rhs.0))
    }
}

impl Sub<NtpDuration> for NtpTimestamp {
    type Output = NtpTimestamp;

    fn sub(self, rhs: NtpDuration) -> NtpTimestamp {
        NtpTimestamp(self.0.wrapping_sub(rhs.0))
    }
}
