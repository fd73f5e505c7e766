//! End-to-end tests for the per-stream rate controller, driven through the
//! public `Session`/`Stream` API with a scripted RTP queue.

use rtc_scream::{
    DiagnosticSink, NetworkState, NtpTimestamp, QueueDiscardEvent, RtpQueue, Session, StreamConfig,
};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Debug, Default)]
struct ScriptedQueueState {
    bytes: usize,
    delay: f64,
    next_seq: Option<u16>,
    last_seq: Option<u16>,
    packets: usize,
    clears: usize,
}

/// RTP queue whose fill level and delay are set by the test; the handle can
/// be cloned so the test keeps control after the stream takes ownership.
#[derive(Debug, Default, Clone)]
struct ScriptedQueue(Rc<RefCell<ScriptedQueueState>>);

impl ScriptedQueue {
    fn fill(&self, packets: usize, bytes: usize, delay: f64, first_seq: u16) {
        let mut state = self.0.borrow_mut();
        state.packets = packets;
        state.bytes = bytes;
        state.delay = delay;
        state.next_seq = Some(first_seq);
        state.last_seq = Some(first_seq.wrapping_add(packets.saturating_sub(1) as u16));
    }

    fn clears(&self) -> usize {
        self.0.borrow().clears
    }
}

impl RtpQueue for ScriptedQueue {
    fn bytes_in_queue(&self) -> usize {
        self.0.borrow().bytes
    }
    fn delay(&self, _now_secs: f64) -> f64 {
        self.0.borrow().delay
    }
    fn seq_nr_of_next_rtp(&self) -> Option<u16> {
        self.0.borrow().next_seq
    }
    fn seq_nr_of_last_rtp(&self) -> Option<u16> {
        self.0.borrow().last_seq
    }
    fn clear(&mut self) -> usize {
        let mut state = self.0.borrow_mut();
        let n = state.packets;
        state.packets = 0;
        state.bytes = 0;
        state.delay = 0.0;
        state.next_seq = None;
        state.last_seq = None;
        state.clears += 1;
        n
    }
}

#[derive(Default, Clone)]
struct CaptureSink(Rc<RefCell<Vec<QueueDiscardEvent>>>);

impl DiagnosticSink for CaptureSink {
    fn queue_discard(&mut self, event: &QueueDiscardEvent) {
        self.0.borrow_mut().push(event.clone());
    }
}

fn secs(s: f64) -> NtpTimestamp {
    NtpTimestamp::from_secs_f64(s)
}

fn video_config(ssrc: u32, priority: f64) -> StreamConfig {
    StreamConfig {
        ssrc,
        priority,
        min_bitrate: 64_000.0,
        start_bitrate: 512_000.0,
        max_bitrate: 5_000_000.0,
        max_rtp_queue_delay: 0.1,
        ..Default::default()
    }
}

/// Bounds hold after every update, whatever the network state does.
#[test]
fn test_target_bitrate_and_scale_always_bounded() {
    let queue = ScriptedQueue::default();
    let mut session = Session::new();
    let index = session
        .register_stream(video_config(1, 1.0), Box::new(queue.clone()))
        .unwrap();

    let mut now = 0.0;
    for step in 0u32..500 {
        now += 0.02;
        // Sweep the network through extremes, including garbage-ish values.
        session.set_network_state(NetworkState {
            cwnd: [0.0, 50.0, 1e4, 1e9][step as usize % 4],
            s_rtt: [0.0, 0.0001, 0.05, 3.0][step as usize % 4],
            cwnd_ratio: [0.0, 0.5, 0.95, 1.0][(step as usize / 4) % 4],
            ..Default::default()
        });
        session.new_media_frame(index, secs(now), 1200, step % 3 == 0);
        if step % 10 == 0 {
            session.update_rate(secs(now));
        }

        let stream = session.stream(index).unwrap();
        let stats = stream.stats();
        assert!(
            (64_000.0..=5_000_000.0).contains(&stats.target_bitrate),
            "target {} out of bounds at step {step}",
            stats.target_bitrate
        );
        assert!(
            (0.8..=1.1).contains(&stats.target_rate_scale),
            "scale {} out of bounds at step {step}",
            stats.target_rate_scale
        );
    }
}

/// The -1.0 refresh request is an edge, not a level: once per episode.
#[test]
fn test_refresh_sentinel_once_per_episode() {
    let queue = ScriptedQueue::default();
    let mut session = Session::new();
    let index = session
        .register_stream(video_config(1, 1.0), Box::new(queue.clone()))
        .unwrap();
    session.set_network_state(NetworkState {
        cwnd: 10_000.0,
        s_rtt: 0.05,
        ..Default::default()
    });

    // Seed the discard timer, then run into a queue discard.
    session.update_target_bitrate(index, secs(1.0));
    queue.fill(10, 12_000, 0.4, 100);
    session.update_target_bitrate(index, secs(1.3));
    assert_eq!(queue.clears(), 1);

    let stream = session.stream_mut(index).unwrap();
    assert_eq!(stream.get_target_bitrate(), -1.0);
    let rate = stream.get_target_bitrate();
    assert!(rate > 0.0, "second call must return a usable rate");
    assert_eq!(
        stream.get_target_bitrate(),
        rate,
        "third call must not repeat the sentinel without a new event"
    );
}

/// Two active streams with priorities 1 and 3 split a 4000 byte window
/// into 1000 and 3000 byte shares.
#[test]
fn test_priority_split_preserves_window() {
    let mut session = Session::new();
    session.set_network_state(NetworkState {
        cwnd: 4000.0,
        s_rtt: 0.125,
        cwnd_ratio: 0.0,
        ..Default::default()
    });
    let low = session
        .register_stream(
            StreamConfig {
                min_bitrate: 1_000.0,
                start_bitrate: 1_000.0,
                max_bitrate: 10_000_000.0,
                ..video_config(1, 1.0)
            },
            Box::new(ScriptedQueue::default()),
        )
        .unwrap();
    let high = session
        .register_stream(
            StreamConfig {
                min_bitrate: 1_000.0,
                start_bitrate: 1_000.0,
                max_bitrate: 10_000_000.0,
                ..video_config(2, 3.0)
            },
            Box::new(ScriptedQueue::default()),
        )
        .unwrap();

    for t in [1.0, 1.1] {
        session.update_target_bitrate(low, secs(t));
        session.update_target_bitrate(high, secs(t));
    }

    let low_share = session.stream(low).unwrap().target_bitrate() * 0.125 / 8.0;
    let high_share = session.stream(high).unwrap().target_bitrate() * 0.125 / 8.0;
    assert_eq!(low_share, 1000.0);
    assert_eq!(high_share, 3000.0);
    assert_eq!(low_share + high_share, 4000.0);
}

/// The queue cannot be discarded twice within the 0.25 s cooldown even if
/// the delay stays above the ceiling on every intervening update.
#[test]
fn test_discard_cooldown_is_honored() {
    let queue = ScriptedQueue::default();
    let sink = CaptureSink::default();
    let mut session = Session::with_diagnostics(Box::new(sink.clone()));
    let index = session
        .register_stream(video_config(7, 1.0), Box::new(queue.clone()))
        .unwrap();

    session.update_target_bitrate(index, secs(5.0));
    queue.fill(20, 24_000, 0.5, 200);

    // Hammer updates every 50 ms for one second; the delay is refilled
    // above the ceiling after each clear.
    for n in 1u16..=20 {
        session.update_target_bitrate(index, secs(5.0 + f64::from(n) * 0.05));
        if queue.0.borrow().packets == 0 {
            queue.fill(20, 24_000, 0.5, 200 + 20 * n);
        }
    }

    // Discard windows open at +0.3, +0.6, +0.9 s (first at 0.25 s after
    // the seeding update, then every 0.25 s).
    assert_eq!(queue.clears(), 3);

    let events = sink.0.borrow();
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].ssrc, 7);
    assert_eq!(events[0].packets_discarded, 20);
    assert_eq!(events[2].packets_discarded_total, 60);
    for pair in events.windows(2) {
        assert!(pair[1].now.seconds_since(pair[0].now) > 0.25);
    }
}

/// A zero-elapsed refresh keeps every derived rate finite.
#[test]
fn test_zero_elapsed_refresh_is_finite() {
    let mut session = Session::new();
    let index = session
        .register_stream(video_config(1, 1.0), Box::new(ScriptedQueue::default()))
        .unwrap();

    session.update_rate(secs(2.0));
    session.stream_mut(index).unwrap().account_transmitted(1500, 1);
    session.stream_mut(index).unwrap().account_acked(1500, 1);
    session.update_rate(secs(2.0));

    let stats = session.stream(index).unwrap().stats();
    for rate in [
        stats.rate_transmitted,
        stats.rate_acked,
        stats.rate_lost,
        stats.rate_ce,
        stats.rate_rtp,
        stats.rate_rtp_avg,
    ] {
        assert!(rate.is_finite());
    }
}

/// Loss reported by the feedback path surfaces once through the loss-epoch
/// flag and, via repair-loss, once through the bitrate sentinel.
#[test]
fn test_loss_signals() {
    let mut session = Session::new();
    let index = session
        .register_stream(video_config(1, 1.0), Box::new(ScriptedQueue::default()))
        .unwrap();

    session.update_rate(secs(0.0));
    session.stream_mut(index).unwrap().account_lost(1200);
    session.update_rate(secs(0.5));

    let stream = session.stream_mut(index).unwrap();
    assert!(stream.is_loss_epoch());
    assert!(!stream.is_loss_epoch());

    stream.signal_repair_loss();
    assert_eq!(stream.get_target_bitrate(), -1.0);
    assert!(stream.get_target_bitrate() > 0.0);
}

/// Frame-boundary driving: large frames raise the pacing scale up to the
/// parent ceiling, steady small frames relax it back to 1.0.
#[test]
fn test_pacing_scale_tracks_frame_sizes() {
    let queue = ScriptedQueue::default();
    let mut session = Session::new();
    // Pin the target so the expected frame size stays 1280 bytes.
    let index = session
        .register_stream(
            StreamConfig {
                min_bitrate: 512_000.0,
                start_bitrate: 512_000.0,
                max_bitrate: 512_000.0,
                ..video_config(1, 1.0)
            },
            Box::new(queue.clone()),
        )
        .unwrap();
    session.set_network_state(NetworkState {
        cwnd: 8_000.0,
        s_rtt: 0.125,
        max_adaptive_pacing_rate_scale: 2.0,
        ..Default::default()
    });

    // An I-frame split over three packets, 8000 bytes in total.
    session.new_media_frame(index, secs(1.0), 4000, false);
    session.new_media_frame(index, secs(1.0), 3000, false);
    session.new_media_frame(index, secs(1.0), 1000, true);
    let scale = session.stream(index).unwrap().adaptive_pacing_rate_scale();
    assert_eq!(scale, 2.0, "6.25x the expected size, capped at the ceiling");

    // Steady 1 kB deltas settle the scale back down.
    let mut now = 1.0;
    for _ in 0..5 {
        now += 0.02;
        session.new_media_frame(index, secs(now), 1000, true);
    }
    let scale = session.stream(index).unwrap().adaptive_pacing_rate_scale();
    assert_eq!(scale, 1.0);
}

/// The published (hysteresis-filtered) rate lags the raw rate by design.
#[test]
fn test_published_rate_filtered_by_hysteresis() {
    let mut session = Session::new();
    let index = session
        .register_stream(
            StreamConfig {
                hysteresis: 0.1,
                min_bitrate: 1_000.0,
                start_bitrate: 1_000_000.0,
                max_bitrate: 10_000_000.0,
                ..video_config(1, 1.0)
            },
            Box::new(ScriptedQueue::default()),
        )
        .unwrap();

    // +5%: raw target moves, published rate does not.
    session.set_network_state(NetworkState {
        cwnd: 1_050_000.0 * 0.125 / 8.0,
        s_rtt: 0.125,
        ..Default::default()
    });
    session.update_target_bitrate(index, secs(1.0));
    let stream = session.stream(index).unwrap();
    assert_eq!(stream.target_bitrate(), 1_050_000.0);
    assert_eq!(stream.target_bitrate_h(), 1_000_000.0);

    // +15% from the published value: goes through.
    session.set_network_state(NetworkState {
        cwnd: 1_150_000.0 * 0.125 / 8.0,
        s_rtt: 0.125,
        ..Default::default()
    });
    session.update_target_bitrate(index, secs(2.0));
    assert_eq!(session.stream(index).unwrap().target_bitrate_h(), 1_150_000.0);
}

/// Time wrap: cooldowns keep working when timestamps cross the 18.2 h wrap.
#[test]
fn test_discard_timer_across_time_wrap() {
    let queue = ScriptedQueue::default();
    let mut session = Session::new();
    let index = session
        .register_stream(video_config(1, 1.0), Box::new(queue.clone()))
        .unwrap();

    let before_wrap = NtpTimestamp::from_ticks(u32::MAX - 6000);
    session.update_target_bitrate(index, before_wrap);

    queue.fill(4, 4800, 0.5, 10);
    // ~0.18 s later, past the wrap point: still inside the cooldown.
    session.update_target_bitrate(index, NtpTimestamp::from_ticks(6000));
    assert_eq!(queue.clears(), 0);
    // ~0.37 s later: discard allowed.
    session.update_target_bitrate(index, NtpTimestamp::from_ticks(18_000));
    assert_eq!(queue.clears(), 1);
}
