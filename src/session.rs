//! Session-level driver: aggregate congestion state and the stream registry.
//!
//! The network-wide congestion controller (out of scope here) publishes its
//! aggregate state into a [`NetworkState`]; the [`Session`] holds that state
//! together with the live set of [`Stream`]s and drives the per-stream
//! operations, computing the active-priority sum each update needs.

use crate::config::StreamConfig;
use crate::diagnostics::{DiagnosticSink, LogSink};
use crate::error::{Error, Result};
use crate::queue::RtpQueue;
use crate::stream::Stream;
use crate::time::NtpTimestamp;

/// Aggregate congestion state published by the network controller.
///
/// This crate only reads these values; producing them (congestion-window
/// updates, RTT estimation, loss detection) is the network controller's job.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NetworkState {
    /// Congestion window in bytes.
    pub cwnd: f64,
    /// Smoothed round-trip time in seconds.
    pub s_rtt: f64,
    /// Window-utilization ratio in [0, 1]; grows as the window shrinks
    /// toward a single packet.
    pub cwnd_ratio: f64,
    /// Gates the statistics-driven target-rate-scale adaptation.
    pub enable_rate_update: bool,
    /// Ceiling for the frame-size-driven pacing-rate scale.
    pub max_adaptive_pacing_rate_scale: f64,
}

impl Default for NetworkState {
    fn default() -> Self {
        Self {
            cwnd: 0.0,
            s_rtt: 0.0,
            cwnd_ratio: 0.0,
            enable_rate_update: true,
            max_adaptive_pacing_rate_scale: 1.5,
        }
    }
}

/// Registry of media streams sharing one congestion window.
///
/// Single-threaded by construction: every operation takes `&mut self` and
/// runs to completion, so per-stream counters and the sibling scan can never
/// interleave.
pub struct Session {
    network: NetworkState,
    streams: Vec<Stream>,
    sink: Box<dyn DiagnosticSink>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Create a session that reports diagnostics through the `log` facade.
    pub fn new() -> Self {
        Self::with_diagnostics(Box::new(LogSink))
    }

    /// Create a session with an injected diagnostic sink.
    pub fn with_diagnostics(sink: Box<dyn DiagnosticSink>) -> Self {
        Self {
            network: NetworkState::default(),
            streams: Vec::new(),
            sink,
        }
    }

    /// Publish new aggregate congestion state.
    pub fn set_network_state(&mut self, network: NetworkState) {
        self.network = network;
    }

    /// The currently published aggregate state.
    pub fn network_state(&self) -> NetworkState {
        self.network
    }

    /// Replace the diagnostic sink.
    pub fn set_diagnostic_sink(&mut self, sink: Box<dyn DiagnosticSink>) {
        self.sink = sink;
    }

    /// Register a media stream, returning its positional index.
    ///
    /// The index stays valid until a stream with a lower index is
    /// deregistered.
    pub fn register_stream(
        &mut self,
        config: StreamConfig,
        rtp_queue: Box<dyn RtpQueue>,
    ) -> Result<usize> {
        if self.streams.iter().any(|s| s.ssrc() == config.ssrc) {
            return Err(Error::ErrDuplicateSsrc);
        }
        let ssrc = config.ssrc;
        self.streams.push(Stream::new(config, rtp_queue)?);
        log::debug!("registered stream with SSRC {ssrc}");
        Ok(self.streams.len() - 1)
    }

    /// Remove the stream with the given SSRC, returning it if present.
    pub fn deregister_stream(&mut self, ssrc: u32) -> Option<Stream> {
        let index = self.streams.iter().position(|s| s.ssrc() == ssrc)?;
        log::debug!("deregistered stream with SSRC {ssrc}");
        Some(self.streams.remove(index))
    }

    /// Number of registered streams.
    pub fn n_streams(&self) -> usize {
        self.streams.len()
    }

    /// Read-only iteration over the registered streams, in index order.
    pub fn streams(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter()
    }

    /// The stream at `index`, if any.
    pub fn stream(&self, index: usize) -> Option<&Stream> {
        self.streams.get(index)
    }

    /// Mutable access to the stream at `index`, for the feedback and
    /// encoder-facing per-stream operations.
    pub fn stream_mut(&mut self, index: usize) -> Option<&mut Stream> {
        self.streams.get_mut(index)
    }

    /// Find the stream matching `ssrc` and its positional index.
    pub fn find_stream(&self, ssrc: u32) -> Option<(usize, &Stream)> {
        self.streams
            .iter()
            .enumerate()
            .find(|(_, s)| s.ssrc() == ssrc)
    }

    /// Mutable variant of [`find_stream`](Self::find_stream).
    pub fn find_stream_mut(&mut self, ssrc: u32) -> Option<(usize, &mut Stream)> {
        self.streams
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.ssrc() == ssrc)
    }

    /// Refresh the rate statistics of every stream.
    ///
    /// Call periodically, e.g. every few hundred milliseconds.
    pub fn update_rate(&mut self, now: NtpTimestamp) {
        for stream in &mut self.streams {
            stream.update_rate(now, &self.network);
        }
    }

    /// Register one produced RTP packet for the stream at `index`.
    ///
    /// On the frame's last packet this refreshes the stream's pacing scale
    /// and target bitrate against the current aggregate state.
    pub fn new_media_frame(
        &mut self,
        index: usize,
        now: NtpTimestamp,
        payload_bytes: usize,
        is_marker: bool,
    ) {
        let priority_sum = self.priority_sum(index);
        if let Some(stream) = self.streams.get_mut(index) {
            stream.new_media_frame(
                now,
                payload_bytes,
                is_marker,
                &self.network,
                priority_sum,
                self.sink.as_mut(),
            );
        }
    }

    /// Recompute the target bitrate of the stream at `index` outside the
    /// frame-boundary schedule.
    pub fn update_target_bitrate(&mut self, index: usize, now: NtpTimestamp) {
        let priority_sum = self.priority_sum(index);
        if let Some(stream) = self.streams.get_mut(index) {
            stream.update_target_bitrate(now, &self.network, priority_sum, self.sink.as_mut());
        }
    }

    /// Sum of the active streams' priorities. The stream being updated
    /// counts as active even before its first update completes.
    fn priority_sum(&self, updating: usize) -> f64 {
        self.streams
            .iter()
            .enumerate()
            .filter(|(i, s)| *i == updating || s.is_active())
            .map(|(_, s)| s.priority())
            .sum()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("network", &self.network)
            .field("streams", &self.streams)
            .finish_non_exhaustive()
    }
}
