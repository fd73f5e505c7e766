//! Per-stream rate estimator and target-bitrate controller.
//!
//! One [`Stream`] exists per media source. It turns network feedback
//! (bytes transmitted/acked/lost/CE-marked, the shared congestion window,
//! smoothed RTT) and local encoder events (frame boundaries) into a
//! bounded, hysteresis-filtered target bitrate for the encoder, plus a
//! frame-size-driven pacing-rate scale for the pacer.
//!
//! Everything here is synchronous arithmetic over caller-supplied time;
//! aggregate congestion state is read from a [`NetworkState`] snapshot and
//! the active-priority sum is supplied by the session (see
//! [`Session`](crate::Session) for the drivers that compute it).

mod flag;
mod history;

pub use flag::EdgeFlag;
pub use history::RateHistory;

use crate::config::StreamConfig;
use crate::diagnostics::{DiagnosticSink, QueueDiscardEvent};
use crate::error::Result;
use crate::queue::RtpQueue;
use crate::session::NetworkState;
use crate::time::NtpTimestamp;

/// Clamp bounds for the smoothed RTT when converting the window share to a
/// rate; tiny or stale samples would otherwise blow the rate up.
const MIN_SRTT: f64 = 0.001;
const MAX_SRTT: f64 = 0.2;

/// Floor for the refresh interval so a repeated timestamp yields finite
/// rates.
const MIN_RATE_INTERVAL: f64 = 1e-6;

/// Rate controller for one media stream.
pub struct Stream {
    config: StreamConfig,
    priority_inv: f64,
    rtp_queue: Box<dyn RtpQueue>,

    /// Raw target, recomputed on every update.
    target_bitrate: f64,
    /// Hysteresis-filtered target, the published value.
    target_bitrate_h: f64,
    /// Multiplicative correction for encoder rate deviation, kept within
    /// the configured scale bounds.
    target_rate_scale: f64,

    // Byte counters, reset every rate refresh.
    bytes_transmitted: u64,
    bytes_acked: u64,
    bytes_lost: u64,
    bytes_ce: u64,
    bytes_rtp: u64,

    // Rates derived at the last refresh, bits/s.
    rate_transmitted: f64,
    rate_acked: f64,
    rate_lost: f64,
    rate_ce: f64,
    rate_rtp: f64,
    rate_rtp_hist: RateHistory,
    num_rate_updates: u64,

    // Highest sequence numbers seen, diagnostics only.
    hi_seq_tx: u16,
    hi_seq_ack: u16,

    last_rate_update_t: Option<NtpTimestamp>,
    last_bitrate_adjust_t: Option<NtpTimestamp>,
    init_t: Option<NtpTimestamp>,
    last_frame_t: Option<NtpTimestamp>,
    last_rtp_queue_discard_t: NtpTimestamp,

    rtp_queue_discard: EdgeFlag,
    loss_epoch: EdgeFlag,
    repair_loss: bool,
    /// Latch ensuring the refresh sentinel is returned once per episode.
    was_repair_loss: bool,

    /// Payload bytes of the frame currently being produced.
    frame_size_acc: usize,
    /// Size of the previous completed frame.
    frame_size: usize,
    /// Expected frame size at the current target bitrate and frame period.
    frame_size_avg: f64,
    /// EWMA of the inter-frame interval, seconds.
    frame_period: f64,

    adaptive_pacing_rate_scale: f64,
    /// Set once the stream has produced a target-bitrate update; inactive
    /// streams do not take part in priority sharing.
    is_active: bool,
    packets_discarded_total: u64,
    last_rtp_queue_delay: f64,
}

/// Diagnostic snapshot of a stream's rate state.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamStats {
    pub rate_transmitted: f64,
    pub rate_acked: f64,
    pub rate_lost: f64,
    pub rate_ce: f64,
    pub rate_rtp: f64,
    pub rate_rtp_avg: f64,
    pub target_bitrate: f64,
    pub target_bitrate_h: f64,
    pub target_rate_scale: f64,
    pub adaptive_pacing_rate_scale: f64,
    pub frame_period: f64,
    pub frame_size_avg: f64,
    pub rtp_queue_delay: f64,
    pub packets_discarded: u64,
    pub hi_seq_tx: u16,
    pub hi_seq_ack: u16,
}

/// True if `a` is ahead of `b` in the 16-bit wrapping sequence space.
fn seq_newer(a: u16, b: u16) -> bool {
    a != b && a.wrapping_sub(b) < 0x8000
}

impl Stream {
    /// Create a stream controller over its RTP transmission queue.
    ///
    /// The start bitrate is clamped into `[min_bitrate, max_bitrate]` and
    /// seeds both the raw and the published target.
    pub fn new(config: StreamConfig, rtp_queue: Box<dyn RtpQueue>) -> Result<Self> {
        config.validate()?;
        let target_bitrate = config
            .start_bitrate
            .clamp(config.min_bitrate, config.max_bitrate);
        Ok(Self {
            priority_inv: 1.0 / config.priority,
            rtp_queue,
            target_bitrate,
            target_bitrate_h: target_bitrate,
            target_rate_scale: 1.0,
            bytes_transmitted: 0,
            bytes_acked: 0,
            bytes_lost: 0,
            bytes_ce: 0,
            bytes_rtp: 0,
            rate_transmitted: 0.0,
            rate_acked: 0.0,
            rate_lost: 0.0,
            rate_ce: 0.0,
            rate_rtp: 0.0,
            rate_rtp_hist: RateHistory::with_capacity(config.rate_history_len),
            num_rate_updates: 0,
            hi_seq_tx: 0,
            hi_seq_ack: 0,
            last_rate_update_t: None,
            last_bitrate_adjust_t: None,
            init_t: None,
            last_frame_t: None,
            last_rtp_queue_discard_t: NtpTimestamp::default(),
            rtp_queue_discard: EdgeFlag::default(),
            loss_epoch: EdgeFlag::default(),
            repair_loss: false,
            was_repair_loss: false,
            frame_size_acc: 0,
            frame_size: 0,
            frame_size_avg: 0.0,
            frame_period: config.initial_frame_period,
            adaptive_pacing_rate_scale: 1.0,
            is_active: false,
            packets_discarded_total: 0,
            last_rtp_queue_delay: 0.0,
            config,
        })
    }

    /// Refresh the rate statistics from the byte counters.
    ///
    /// Called periodically by the session scheduler. On the first call only
    /// the reference time is recorded; afterwards, if the parent enables
    /// rate updates, the per-cycle counters are converted to bits/s over
    /// the elapsed interval, the RTP rate sample enters the averaging
    /// window, and the target rate scale is nudged toward the observed
    /// encoder deviation. Counters are reset on every call.
    pub fn update_rate(&mut self, now: NtpTimestamp, network: &NetworkState) {
        if let Some(last) = self.last_rate_update_t
            && network.enable_rate_update
        {
            self.num_rate_updates += 1;
            let t_delta = now.seconds_since(last).max(MIN_RATE_INTERVAL);
            self.rate_transmitted = self.bytes_transmitted as f64 * 8.0 / t_delta;
            self.rate_acked = self.bytes_acked as f64 * 8.0 / t_delta;
            self.rate_lost = self.bytes_lost as f64 * 8.0 / t_delta;
            self.rate_ce = self.bytes_ce as f64 * 8.0 / t_delta;
            self.rate_rtp = self.bytes_rtp as f64 * 8.0 / t_delta;
            self.rate_rtp_hist.push(self.rate_rtp);

            let rate_rtp_avg = self.rate_rtp_hist.average();
            if rate_rtp_avg > 0.0
                && self.config.adaptive_target_rate_scale
                && self.num_rate_updates > self.rate_rtp_hist.len() as u64
            {
                // Encoders routinely produce consistently more or less than
                // the requested rate; fold the long-term deviation into the
                // scale applied to the published target.
                let diff = self.target_bitrate * self.target_rate_scale / rate_rtp_avg;
                let alpha = self.config.target_rate_scale_alpha;
                self.target_rate_scale = (self.target_rate_scale * (1.0 - alpha) + alpha * diff)
                    .clamp(
                        self.config.target_rate_scale_min,
                        self.config.target_rate_scale_max,
                    );
            }
            if self.rate_lost > 0.0 {
                self.loss_epoch.raise();
            }
        }
        self.bytes_transmitted = 0;
        self.bytes_acked = 0;
        self.bytes_lost = 0;
        self.bytes_ce = 0;
        self.bytes_rtp = 0;
        self.last_rate_update_t = Some(now);
    }

    /// Larger of the transmitted and acknowledged rate, bits/s.
    pub fn get_max_rate(&self) -> f64 {
        self.rate_transmitted.max(self.rate_acked)
    }

    /// Register one RTP packet produced for the in-progress frame.
    ///
    /// Called once per packet; `is_marker` is true on the frame's last
    /// packet. On the marker the inter-frame period estimate, the expected
    /// frame size and the adaptive pacing-rate scale are refreshed, and the
    /// target bitrate is updated. `priority_sum` must include this stream's
    /// priority (see [`Session::new_media_frame`](crate::Session::new_media_frame)).
    pub fn new_media_frame(
        &mut self,
        now: NtpTimestamp,
        payload_bytes: usize,
        is_marker: bool,
        network: &NetworkState,
        priority_sum: f64,
        sink: &mut dyn DiagnosticSink,
    ) {
        self.frame_size_acc += payload_bytes;
        self.bytes_rtp += payload_bytes as u64;
        if !is_marker {
            return;
        }

        // EWMA of the inter-frame interval; the stored period is the
        // slow-moving component.
        let alpha = self.config.frame_period_alpha;
        if let Some(last_frame) = self.last_frame_t {
            let d_t = now.seconds_since(last_frame);
            self.frame_period = d_t * (1.0 - alpha) + self.frame_period * alpha;
        }
        self.last_frame_t = Some(now);

        self.frame_size_avg = self.target_bitrate * self.frame_period / 8.0;
        self.frame_size = self.rtp_queue.bytes_in_queue().max(self.frame_size_acc);
        self.frame_size_acc = 0;

        // Large frames are paced out faster to bound queueing delay; small
        // steady-state frames keep the nominal pacing rate.
        if self.frame_size_avg > self.config.adaptive_pacing_min_frame_size {
            self.adaptive_pacing_rate_scale = (self.frame_size as f64 / self.frame_size_avg)
                .clamp(1.0, network.max_adaptive_pacing_rate_scale.max(1.0));
        } else {
            self.adaptive_pacing_rate_scale = 1.0;
        }

        self.update_target_bitrate(now, network, priority_sum, sink);
    }

    /// Bitrate the encoder should use for the next frame, bits/s.
    ///
    /// Returns `-1.0` exactly once per loss or queue-discard episode, a
    /// request to the encoder for a clean refresh (e.g. a keyframe); the
    /// following call returns the scaled, hysteresis-filtered target again.
    pub fn get_target_bitrate(&mut self) -> f64 {
        let request_refresh = self.rtp_queue_discard.take() || self.repair_loss;
        self.repair_loss = false;
        if request_refresh && !self.was_repair_loss {
            self.was_repair_loss = true;
            return -1.0;
        }
        self.was_repair_loss = false;
        self.target_rate_scale * self.target_bitrate_h
    }

    /// Recompute the raw and published target bitrate from current network
    /// state.
    ///
    /// Runs at every frame boundary and at any additional schedule point the
    /// caller chooses. `priority_sum` is the sum of the active siblings'
    /// priorities including this stream; a non-positive sum gives this
    /// stream the whole congestion window.
    pub fn update_target_bitrate(
        &mut self,
        now: NtpTimestamp,
        network: &NetworkState,
        priority_sum: f64,
        sink: &mut dyn DiagnosticSink,
    ) {
        self.is_active = true;
        if self.init_t.is_none() {
            self.init_t = Some(now);
            self.last_rtp_queue_discard_t = now;
        }
        if self.last_bitrate_adjust_t.is_none() {
            self.last_bitrate_adjust_t = Some(now);
        }

        let mut rtp_queue_delay = self.rtp_queue.delay(now.as_secs_f64());
        if rtp_queue_delay > self.config.max_rtp_queue_delay
            && now.duration_since(self.last_rtp_queue_discard_t)
                > self.config.min_queue_discard_interval
        {
            // The queue has grown past the delay ceiling; drop it wholesale
            // and let the encoder refresh. The cooldown keeps this from
            // firing repeatedly while the delay estimate settles.
            let seq_nr_of_next_rtp = self.rtp_queue.seq_nr_of_next_rtp();
            let seq_nr_of_last_rtp = self.rtp_queue.seq_nr_of_last_rtp();
            let packets_discarded = self.rtp_queue.clear();
            self.packets_discarded_total += packets_discarded as u64;
            self.rtp_queue_discard.raise();
            self.loss_epoch.raise();
            self.last_rtp_queue_discard_t = now;
            self.target_rate_scale = 1.0;

            sink.queue_discard(&QueueDiscardEvent {
                ssrc: self.config.ssrc,
                now,
                queue_delay: rtp_queue_delay,
                packets_discarded,
                packets_discarded_total: self.packets_discarded_total,
                hi_seq_tx: self.hi_seq_tx,
                hi_seq_ack: self.hi_seq_ack,
                seq_nr_of_next_rtp,
                seq_nr_of_last_rtp,
                seq_gap: seq_nr_of_last_rtp.map(|seq| seq.wrapping_sub(self.hi_seq_tx)),
            });

            // The queue is empty now; re-read the delay estimate.
            rtp_queue_delay = self.rtp_queue.delay(now.as_secs_f64());
        }
        self.last_rtp_queue_delay = rtp_queue_delay;

        // The congestion window is split between streams according to their
        // priorities: share = cwnd * priority / sum(active priorities).
        let mut cwnd_share = network.cwnd;
        if priority_sum > 0.0 {
            cwnd_share *= self.config.priority / priority_sum;
        }

        // Derate when the window is small relative to the packet size;
        // without this the rate oscillates at very low bitrates.
        let mut tmp = 1.0 - (network.cwnd_ratio - 0.1).clamp(0.0, 0.8);

        // Bits per second from bytes per round trip.
        tmp *= 8.0 * cwnd_share / network.s_rtt.clamp(MIN_SRTT, MAX_SRTT);

        self.target_bitrate = tmp.clamp(self.config.min_bitrate, self.config.max_bitrate);

        // Publish only when the scaled target moved enough; decreases pass
        // at a quarter of the threshold. This keeps rate signaling to the
        // encoder from churning its own control loop.
        let candidate = self.target_bitrate * self.target_rate_scale;
        let diff = (candidate - self.target_bitrate_h) / self.target_bitrate_h;
        if diff > self.config.hysteresis || diff < -self.config.hysteresis / 4.0 {
            self.target_bitrate_h = candidate;
        }
    }

    /// Read and clear the queue-discard flag.
    pub fn is_rtp_queue_discard(&mut self) -> bool {
        self.rtp_queue_discard.take()
    }

    /// Read and clear the loss-epoch flag.
    pub fn is_loss_epoch(&mut self) -> bool {
        self.loss_epoch.take()
    }

    /// Account payload bytes handed to the transport, with the packet's
    /// RTP sequence number.
    pub fn account_transmitted(&mut self, bytes: usize, seq: u16) {
        self.bytes_transmitted += bytes as u64;
        if seq_newer(seq, self.hi_seq_tx) {
            self.hi_seq_tx = seq;
        }
    }

    /// Account payload bytes acknowledged by the receiver.
    pub fn account_acked(&mut self, bytes: usize, seq: u16) {
        self.bytes_acked += bytes as u64;
        if seq_newer(seq, self.hi_seq_ack) {
            self.hi_seq_ack = seq;
        }
    }

    /// Account payload bytes declared lost.
    pub fn account_lost(&mut self, bytes: usize) {
        self.bytes_lost += bytes as u64;
    }

    /// Account payload bytes whose packets carried a CE mark.
    pub fn account_ce(&mut self, bytes: usize) {
        self.bytes_ce += bytes as u64;
    }

    /// Arm the repair-loss refresh request; the next
    /// [`get_target_bitrate`](Self::get_target_bitrate) returns the sentinel.
    pub fn signal_repair_loss(&mut self) {
        self.repair_loss = true;
    }

    /// SSRC of this stream.
    pub fn ssrc(&self) -> u32 {
        self.config.ssrc
    }

    /// Priority weight used for congestion-window sharing.
    pub fn priority(&self) -> f64 {
        self.config.priority
    }

    /// Reciprocal of the priority weight.
    pub fn priority_inv(&self) -> f64 {
        self.priority_inv
    }

    /// Whether the stream has produced a target-bitrate update yet.
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Raw (unfiltered) target bitrate, bits/s.
    pub fn target_bitrate(&self) -> f64 {
        self.target_bitrate
    }

    /// Hysteresis-filtered target bitrate, bits/s.
    pub fn target_bitrate_h(&self) -> f64 {
        self.target_bitrate_h
    }

    /// Current encoder-deviation correction factor.
    pub fn target_rate_scale(&self) -> f64 {
        self.target_rate_scale
    }

    /// Multiplier the pacer applies on top of the nominal pacing rate.
    pub fn adaptive_pacing_rate_scale(&self) -> f64 {
        self.adaptive_pacing_rate_scale
    }

    /// Diagnostic snapshot of the stream's rate state.
    pub fn stats(&self) -> StreamStats {
        StreamStats {
            rate_transmitted: self.rate_transmitted,
            rate_acked: self.rate_acked,
            rate_lost: self.rate_lost,
            rate_ce: self.rate_ce,
            rate_rtp: self.rate_rtp,
            rate_rtp_avg: self.rate_rtp_hist.average(),
            target_bitrate: self.target_bitrate,
            target_bitrate_h: self.target_bitrate_h,
            target_rate_scale: self.target_rate_scale,
            adaptive_pacing_rate_scale: self.adaptive_pacing_rate_scale,
            frame_period: self.frame_period,
            frame_size_avg: self.frame_size_avg,
            rtp_queue_delay: self.last_rtp_queue_delay,
            packets_discarded: self.packets_discarded_total,
            hi_seq_tx: self.hi_seq_tx,
            hi_seq_ack: self.hi_seq_ack,
        }
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("ssrc", &self.config.ssrc)
            .field("priority", &self.config.priority)
            .field("target_bitrate", &self.target_bitrate)
            .field("target_bitrate_h", &self.target_bitrate_h)
            .field("target_rate_scale", &self.target_rate_scale)
            .field("is_active", &self.is_active)
            .finish_non_exhaustive()
    }
}
