//! Per-stream configuration.

use crate::error::{Error, Result};
use crate::time::NtpDuration;

/// Configuration for one media stream's rate controller.
///
/// Bounds and priority are fixed at registration time. The smoothing
/// factors, scale bounds and thresholds are empirically tuned constants;
/// the defaults are the values the algorithm was tuned with and should
/// only be changed for experimentation.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// SSRC identifying this stream's packets.
    pub ssrc: u32,
    /// Priority weight for congestion-window sharing, must be positive.
    pub priority: f64,
    /// Lowest bitrate the controller will ever request, bits/s.
    pub min_bitrate: f64,
    /// Bitrate requested before any network feedback, bits/s. Clamped into
    /// `[min_bitrate, max_bitrate]`.
    pub start_bitrate: f64,
    /// Highest bitrate the controller will ever request, bits/s.
    pub max_bitrate: f64,
    /// RTP queueing delay in seconds above which the queue is discarded.
    pub max_rtp_queue_delay: f64,
    /// Enable the slow multiplicative correction that compensates encoders
    /// whose produced rate persistently deviates from the requested target.
    pub adaptive_target_rate_scale: bool,
    /// Relative change required before a new target bitrate is published to
    /// the encoder. Decreases pass at a quarter of this threshold.
    pub hysteresis: f64,

    /// Number of RTP rate samples in the averaging window.
    pub rate_history_len: usize,
    /// Smoothing factor of the target-rate-scale filter.
    pub target_rate_scale_alpha: f64,
    /// Lower clamp of the target rate scale.
    pub target_rate_scale_min: f64,
    /// Upper clamp of the target rate scale.
    pub target_rate_scale_max: f64,
    /// Weight of the stored estimate in the frame-period filter.
    pub frame_period_alpha: f64,
    /// Frame period in seconds assumed before two frames have been seen.
    pub initial_frame_period: f64,
    /// Expected average frame size in bytes below which adaptive pacing
    /// stays disabled (scale pinned at 1.0).
    pub adaptive_pacing_min_frame_size: f64,
    /// Minimum spacing between two queue discards.
    pub min_queue_discard_interval: NtpDuration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            ssrc: 0,
            priority: 1.0,
            min_bitrate: 64_000.0,
            start_bitrate: 512_000.0,
            max_bitrate: 5_000_000.0,
            max_rtp_queue_delay: 0.1,
            adaptive_target_rate_scale: true,
            hysteresis: 0.1,
            rate_history_len: 8,
            target_rate_scale_alpha: 0.02,
            target_rate_scale_min: 0.8,
            target_rate_scale_max: 1.1,
            frame_period_alpha: 0.1,
            initial_frame_period: 0.02,
            adaptive_pacing_min_frame_size: 500.0,
            // 16384 ticks == 0.25 s
            min_queue_discard_interval: NtpDuration::from_ticks(16384),
        }
    }
}

impl StreamConfig {
    /// Check the configuration for values the controller cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(self.priority.is_finite() && self.priority > 0.0) {
            return Err(Error::ErrInvalidPriority);
        }
        if !(self.min_bitrate.is_finite()
            && self.max_bitrate.is_finite()
            && self.min_bitrate > 0.0
            && self.min_bitrate <= self.max_bitrate)
        {
            return Err(Error::ErrInvalidBitrateBounds);
        }
        if !(self.hysteresis.is_finite() && self.hysteresis >= 0.0) {
            return Err(Error::ErrInvalidHysteresis);
        }
        if !(self.max_rtp_queue_delay.is_finite() && self.max_rtp_queue_delay > 0.0) {
            return Err(Error::ErrInvalidQueueDelay);
        }
        if self.rate_history_len == 0 {
            return Err(Error::ErrEmptyRateHistory);
        }
        if !(self.target_rate_scale_min > 0.0
            && self.target_rate_scale_min <= self.target_rate_scale_max)
        {
            return Err(Error::ErrInvalidRateScaleBounds);
        }
        for alpha in [self.target_rate_scale_alpha, self.frame_period_alpha] {
            if !(alpha.is_finite() && (0.0..=1.0).contains(&alpha)) {
                return Err(Error::ErrInvalidSmoothing);
            }
        }
        Ok(())
    }
}
