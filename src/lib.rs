//! Sender-side per-stream rate control for real-time media, after SCReAM V2
//! (Self-Clocked Rate Adaptation for Multimedia, RFC 8298 and its V2
//! successor).
//!
//! For each media stream this crate converts network feedback (bytes
//! transmitted/acked/lost/CE-marked, the shared congestion window, smoothed
//! RTT) and local encoder events (frame boundaries) into a bounded,
//! hysteresis-filtered target bitrate fed back to the encoder, plus a
//! frame-size-driven pacing-rate scale for the pacer.
//!
//! # Components
//!
//! | Type | Role |
//! |------|------|
//! | [`Session`] | Stream registry plus the aggregate [`NetworkState`] published by the network congestion controller |
//! | [`Stream`] | Per-stream rate statistics, target-bitrate state machine and discard/loss flags |
//! | [`StreamConfig`] | Bounds, priority and the tuned constants, validated at registration |
//! | [`RtpQueue`] | Boundary to the sender-side RTP transmission queue |
//! | [`DiagnosticSink`] | Injected receiver of structured queue-discard records |
//! | [`NtpTimestamp`] | Q16.16 fixed-point time supplied by the caller; no internal clock reads |
//!
//! # Sans-IO
//!
//! The crate performs no I/O, reads no clocks and spawns nothing. Every
//! operation is synchronous, takes the current time as an argument and runs
//! to completion, so behavior is a pure function of state, supplied time and
//! the external queue/controller reads. Drive all mutation of one session
//! from a single logical thread (or under one external lock).
//!
//! # Example
//!
//! ```ignore
//! use rtc_scream::{NetworkState, NtpTimestamp, Session, StreamConfig};
//!
//! let mut session = Session::new();
//! let video = session.register_stream(
//!     StreamConfig {
//!         ssrc: 0x1234,
//!         priority: 1.0,
//!         min_bitrate: 150_000.0,
//!         start_bitrate: 500_000.0,
//!         max_bitrate: 3_000_000.0,
//!         ..Default::default()
//!     },
//!     Box::new(queue),
//! )?;
//!
//! // Periodically, from the session scheduler:
//! session.set_network_state(controller_state);
//! session.update_rate(now);
//!
//! // Once per produced RTP packet, marker on the frame's last packet:
//! session.new_media_frame(video, now, payload_bytes, is_marker);
//!
//! // Before encoding the next frame; -1.0 asks for a refresh frame:
//! let rate = session.stream_mut(video).unwrap().get_target_bitrate();
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

mod config;
mod diagnostics;
mod error;
mod queue;
mod session;
mod stream;
mod time;

pub use config::StreamConfig;
pub use diagnostics::{DiagnosticSink, LogSink, QueueDiscardEvent};
pub use error::{Error, Result};
pub use queue::RtpQueue;
pub use session::{NetworkState, Session};
pub use stream::{EdgeFlag, RateHistory, Stream, StreamStats};
pub use time::{NTP_TICK_SECS, NTP_TICKS_PER_SEC, NtpDuration, NtpTimestamp};
