//! Boundary to the sender-side RTP transmission queue.
//!
//! The queue's enqueue/dequeue and delay-measurement mechanics live outside
//! this crate; the rate controller only reads its fill level and delay
//! estimate, and clears it when the delay grows past the configured ceiling.

/// Read/clear interface to one stream's RTP transmission queue.
///
/// Implemented by the transport layer; each [`Stream`](crate::Stream) owns
/// a boxed handle to its queue.
pub trait RtpQueue {
    /// Total payload bytes currently queued.
    fn bytes_in_queue(&self) -> usize;

    /// Estimated one-way queueing delay in seconds, given the current time
    /// in seconds (same epoch as the packets' enqueue times).
    fn delay(&self, now_secs: f64) -> f64;

    /// Sequence number of the next packet to be dequeued, `None` if empty.
    fn seq_nr_of_next_rtp(&self) -> Option<u16>;

    /// Sequence number of the most recently enqueued packet, `None` if empty.
    fn seq_nr_of_last_rtp(&self) -> Option<u16>;

    /// Drop everything in the queue, returning the number of packets
    /// discarded.
    fn clear(&mut self) -> usize;
}
