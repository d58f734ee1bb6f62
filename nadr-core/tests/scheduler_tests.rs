//! Scheduler + jitter buffer integration tests
//!
//! Backpressure ordering, liveness on short sources, stall detection,
//! and seek handling, driven by scripted decoders and capture sinks.

mod helpers;

use helpers::{pattern, CaptureSink, ScriptedDecoder, Step};
use nadr_common::config::JitterConfig;
use nadr_common::AudioFormat;
use nadr_core::playback::scheduler::Cycle;
use nadr_core::playback::{ChunkSink, Delivery, Outcome, PlaybackControl, Scheduler};
use nadr_core::Error;
use std::time::{Duration, Instant};

fn cd_format() -> AudioFormat {
    AudioFormat::pcm(44_100, 16, 2)
}

#[test]
fn test_backpressure_preserves_byte_order() {
    let control = PlaybackControl::new();
    let decoder = ScriptedDecoder::steady(cd_format(), 100_000, 3000);
    let sink = CaptureSink::with_limits(4, [5000, 0, 1234, 8192, 100, 0, 0, 3000, 7]);

    let mut scheduler = Scheduler::new(decoder, sink, &JitterConfig::default(), &control)
        .with_period(Duration::ZERO);
    assert_eq!(scheduler.run().unwrap(), Outcome::Finished);

    let stats = scheduler.stats();
    assert!(stats.backpressure_events >= 8);
    assert_eq!(stats.bytes_delivered, 100_000);

    let (_, sink) = scheduler.into_parts();
    assert_eq!(sink.received.len(), 100_000);
    assert_eq!(sink.received, pattern(0, 100_000), "no byte lost, duplicated or reordered");
}

#[test]
fn test_short_source_still_plays() {
    // Far below the 100ms target: exhaustion alone must start draining
    let control = PlaybackControl::new();
    let decoder = ScriptedDecoder::steady(cd_format(), 1000, 1000);
    let mut scheduler = Scheduler::new(decoder, CaptureSink::default(), &JitterConfig::default(), &control)
        .with_period(Duration::ZERO);

    assert_eq!(scheduler.run().unwrap(), Outcome::Finished);
    let (_, sink) = scheduler.into_parts();
    assert_eq!(sink.received, pattern(0, 1000));
    assert_eq!(sink.finished, 1, "sink told the source ended");
}

#[test]
fn test_empty_source_finishes() {
    let control = PlaybackControl::new();
    let decoder = ScriptedDecoder::new(cd_format(), []);
    let mut scheduler = Scheduler::new(decoder, CaptureSink::default(), &JitterConfig::default(), &control)
        .with_period(Duration::ZERO);

    assert_eq!(scheduler.run().unwrap(), Outcome::Finished);
    let (_, sink) = scheduler.into_parts();
    assert_eq!(sink.calls, 0);
}

#[test]
fn test_decoder_stall_fails_track() {
    let config = JitterConfig {
        max_stalled_cycles: 5,
        ..JitterConfig::default()
    };
    let control = PlaybackControl::new();
    let mut script = vec![Step::Bytes(4000)];
    script.extend(std::iter::repeat(Step::NoProgress).take(10));
    let decoder = ScriptedDecoder::new(cd_format(), script);

    let mut scheduler = Scheduler::new(decoder, CaptureSink::default(), &config, &control)
        .with_period(Duration::ZERO);
    let result = scheduler.run();
    assert!(matches!(result, Err(Error::DecodeStalled { cycles: 5 })));
}

#[test]
fn test_would_block_is_not_a_stall() {
    let config = JitterConfig {
        max_stalled_cycles: 3,
        ..JitterConfig::default()
    };
    let control = PlaybackControl::new();
    let mut script = vec![Step::Bytes(4000)];
    script.extend(std::iter::repeat(Step::WouldBlock).take(10));
    script.push(Step::Bytes(4000));
    let decoder = ScriptedDecoder::new(cd_format(), script);

    let mut scheduler = Scheduler::new(decoder, CaptureSink::default(), &config, &control)
        .with_period(Duration::ZERO);
    assert_eq!(scheduler.run().unwrap(), Outcome::Finished);

    let (_, sink) = scheduler.into_parts();
    assert_eq!(sink.received, pattern(0, 8000));
}

#[test]
fn test_seek_drops_pending_and_queued_audio() {
    let control = PlaybackControl::new();
    let decoder = ScriptedDecoder::steady(cd_format(), 200_000, 8192);
    let sink = CaptureSink::with_limits(4, [100]);
    let mut scheduler = Scheduler::new(decoder, sink, &JitterConfig::default(), &control);

    // First cycle queues three 8192-byte decodes, sink takes 100 bytes
    assert_eq!(scheduler.cycle().unwrap(), Cycle::Continue);
    assert_eq!(scheduler.sink_mut().received.len(), 100);

    control.request_seek(2.5);
    assert_eq!(scheduler.cycle().unwrap(), Cycle::Continue);
    assert_eq!(scheduler.stats().seeks, 1);

    let (decoder, sink) = scheduler.into_parts();
    assert_eq!(decoder.seeks, vec![2.5]);
    assert_eq!(sink.discards, 1);

    // Refused remainder and queued chunks were dropped; delivery resumes
    // with freshly decoded audio
    let mut expected = pattern(0, 100);
    expected.extend_from_slice(&pattern(3 * 8192, 8192));
    assert_eq!(sink.received, expected);
}

#[test]
fn test_stop_from_another_thread() {
    let control = PlaybackControl::new();
    let decoder = ScriptedDecoder::steady(cd_format(), 10_000_000, 8192);

    std::thread::scope(|s| {
        let handle = s.spawn(|| {
            let mut scheduler = Scheduler::new(decoder, CaptureSink::default(), &JitterConfig::default(), &control)
                .with_period(Duration::from_millis(1));
            scheduler.run()
        });
        std::thread::sleep(Duration::from_millis(30));
        control.request_stop();
        assert_eq!(handle.join().unwrap().unwrap(), Outcome::Stopped);
    });
}

/// Accepts everything; one delivery overruns the cycle
struct SlowOnceSink {
    stall_on: usize,
    stall: Duration,
    delivered_at: Vec<Instant>,
}

impl ChunkSink for SlowOnceSink {
    fn deliver(&mut self, _chunk: &[u8]) -> Delivery {
        self.delivered_at.push(Instant::now());
        if self.delivered_at.len() == self.stall_on {
            std::thread::sleep(self.stall);
        }
        Delivery::Sent
    }
}

#[test]
fn test_absolute_deadlines_recover_from_overrun_without_burst() {
    let period = Duration::from_millis(10);
    let stall = Duration::from_millis(55);
    let control = PlaybackControl::new();
    let decoder = ScriptedDecoder::steady(cd_format(), 10_000_000, 8192);
    let sink = SlowOnceSink {
        stall_on: 5,
        stall,
        delivered_at: Vec::new(),
    };

    let (stats, elapsed, sink) = std::thread::scope(|s| {
        let handle = s.spawn(|| {
            let mut scheduler =
                Scheduler::new(decoder, sink, &JitterConfig::default(), &control).with_period(period);
            let start = Instant::now();
            let outcome = scheduler.run().unwrap();
            let elapsed = start.elapsed();
            assert_eq!(outcome, Outcome::Stopped);
            let stats = scheduler.stats();
            let (_, sink) = scheduler.into_parts();
            (stats, elapsed, sink)
        });
        std::thread::sleep(Duration::from_millis(400));
        control.request_stop();
        handle.join().unwrap()
    });

    assert!(stats.late_cycles >= 1, "the stalled cycle is counted late");

    // Slots lost to the stall are skipped, not made up: about
    // (elapsed - lost) / period cycles, never the elapsed / period a
    // catch-up burst would give
    let lost = stall - period;
    let on_time = (elapsed - lost).as_secs_f64() / period.as_secs_f64();
    let cycles = stats.cycles as f64;
    assert!(cycles <= on_time + 2.0, "{} cycles in {:?}", cycles, elapsed);
    assert!(cycles >= on_time * 0.7, "{} cycles in {:?}", cycles, elapsed);

    // Deliveries after the stall stay spaced by the period
    let after: Vec<_> = sink.delivered_at[sink.stall_on..].windows(2).map(|w| w[1] - w[0]).collect();
    assert!(after.len() > 10);
    assert!(after.iter().all(|&gap| gap >= period / 4), "burst after overrun: {:?}", after);
}
