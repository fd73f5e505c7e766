//! Structured diagnostics for non-fatal rate-control events.
//!
//! Queue discards are expected, recoverable events; they are reported as
//! structured records through an injected [`DiagnosticSink`] rather than
//! written to any particular logging transport. [`LogSink`] is the default
//! sink and renders events through the `log` facade.

use crate::time::NtpTimestamp;

/// Record of one RTP-queue discard episode.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueDiscardEvent {
    /// SSRC of the stream whose queue was cleared.
    pub ssrc: u32,
    /// Time of the discard.
    pub now: NtpTimestamp,
    /// Queueing delay in seconds that triggered the discard (pre-clear).
    pub queue_delay: f64,
    /// Packets discarded by this clear.
    pub packets_discarded: usize,
    /// Packets discarded over the stream's lifetime, including this clear.
    pub packets_discarded_total: u64,
    /// Highest RTP sequence number transmitted so far.
    pub hi_seq_tx: u16,
    /// Highest RTP sequence number acknowledged so far.
    pub hi_seq_ack: u16,
    /// Sequence number of the packet that was next in the queue.
    pub seq_nr_of_next_rtp: Option<u16>,
    /// Sequence number of the last packet in the queue.
    pub seq_nr_of_last_rtp: Option<u16>,
    /// Wrapping gap from the highest transmitted sequence number to the last
    /// queued one, `None` if the queue had no last sequence number.
    pub seq_gap: Option<u16>,
}

/// Receiver of non-fatal diagnostic records.
pub trait DiagnosticSink {
    /// Called once per queue-discard episode.
    fn queue_discard(&mut self, event: &QueueDiscardEvent);
}

/// Default sink: renders events through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn queue_discard(&mut self, event: &QueueDiscardEvent) {
        log::warn!(
            "SSRC {}: RTP queue delay {:.3}s too large at {:.3}s, {} packets discarded \
             ({} total), hiSeqTx {} hiSeqAck {} seqNrOfNextRtp {:?} seqNrOfLastRtp {:?} gap {:?}",
            event.ssrc,
            event.queue_delay,
            event.now.as_secs_f64(),
            event.packets_discarded,
            event.packets_discarded_total,
            event.hi_seq_tx,
            event.hi_seq_ack,
            event.seq_nr_of_next_rtp,
            event.seq_nr_of_last_rtp,
            event.seq_gap,
        );
    }
}
