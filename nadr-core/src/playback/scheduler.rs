//! Steady-cadence delivery loop
//!
//! One scheduler runs per track on the producer thread:
//!
//! 1. Check stop and seek at the top of the cycle
//! 2. Maintain the jitter buffer (bounded decode)
//! 3. Retry any remainder the sink refused last cycle, then drain one chunk
//! 4. Sleep to the next absolute deadline
//!
//! The period is one chunk of audio, fixed per format. A late cycle resets
//! the deadline to now rather than firing a burst of catch-up cycles.
//! Backpressure never blocks: the refused remainder is kept and offered
//! first on the next cycle, so byte order is preserved.

use crate::audio::decoder::Decoder;
use crate::error::Result;
use crate::playback::jitter::{JitterBuffer, JitterState};
use crate::playback::sink::{ChunkSink, Delivery};
use nadr_common::config::JitterConfig;
use nadr_common::timing::chunk_period;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Stop and seek requests, polled once per cycle
#[derive(Debug, Default)]
pub struct PlaybackControl {
    stop: AtomicBool,
    seek_pending: AtomicBool,
    /// f64 seconds as bits
    seek_target: AtomicU64,
}

impl PlaybackControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Clear a previous stop before reusing the control for a new track
    pub fn reset_stop(&self) {
        self.stop.store(false, Ordering::Release);
    }

    pub fn request_seek(&self, seconds: f64) {
        self.seek_target.store(seconds.to_bits(), Ordering::Relaxed);
        self.seek_pending.store(true, Ordering::Release);
    }

    fn take_seek(&self) -> Option<f64> {
        self.seek_pending
            .swap(false, Ordering::AcqRel)
            .then(|| f64::from_bits(self.seek_target.load(Ordering::Relaxed)))
    }
}

/// How a track ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Source exhausted and everything delivered
    Finished,
    /// Stop requested, or the sink reported it is gone
    Stopped,
}

/// Result of one scheduler cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cycle {
    Continue,
    Done(Outcome),
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub chunks_drained: u64,
    pub bytes_delivered: u64,
    pub backpressure_events: u64,
    pub late_cycles: u64,
    pub seeks: u64,
}

/// Refused bytes carried to the next cycle
struct Pending {
    buf: Vec<u8>,
    offset: usize,
}

impl Pending {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            offset: 0,
        }
    }

    fn bytes(&self) -> &[u8] {
        &self.buf[self.offset..]
    }

    fn is_empty(&self) -> bool {
        self.offset >= self.buf.len()
    }

    fn set(&mut self, rest: &[u8]) {
        self.buf.clear();
        self.buf.extend_from_slice(rest);
        self.offset = 0;
    }

    fn consume(&mut self, n: usize) {
        self.offset = (self.offset + n).min(self.buf.len());
    }

    fn clear(&mut self) {
        self.buf.clear();
        self.offset = 0;
    }
}

pub struct Scheduler<'c, D, S> {
    decoder: D,
    sink: S,
    jitter: JitterBuffer,
    pending: Pending,
    period: Duration,
    control: &'c PlaybackControl,
    stats: SchedulerStats,
}

impl<'c, D: Decoder, S: ChunkSink> Scheduler<'c, D, S> {
    pub fn new(decoder: D, sink: S, config: &JitterConfig, control: &'c PlaybackControl) -> Self {
        let info = decoder.track_info().clone();
        let jitter = JitterBuffer::new(&info, config);
        let period = chunk_period(&info.format);
        let pending = Pending::with_capacity(jitter.chunk_bytes());

        debug!(
            "Scheduler for {}: period={}µs, chunk={} bytes",
            info.format,
            period.as_micros(),
            jitter.chunk_bytes()
        );

        Self {
            decoder,
            sink,
            jitter,
            pending,
            period,
            control,
            stats: SchedulerStats::default(),
        }
    }

    /// Override the cycle period (tests run faster than real time)
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    pub fn jitter(&self) -> &JitterBuffer {
        &self.jitter
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_parts(self) -> (D, S) {
        (self.decoder, self.sink)
    }

    /// Run cycles at the chunk cadence until the track ends
    pub fn run(&mut self) -> Result<Outcome> {
        info!("Scheduler started");
        let mut deadline = Instant::now();
        loop {
            if let Cycle::Done(outcome) = self.cycle()? {
                info!(
                    "Scheduler finished: {:?} after {} cycles, {} bytes delivered",
                    outcome, self.stats.cycles, self.stats.bytes_delivered
                );
                return Ok(outcome);
            }

            deadline += self.period;
            let now = Instant::now();
            if deadline > now {
                std::thread::sleep(deadline - now);
            } else {
                if now - deadline > self.period {
                    self.stats.late_cycles += 1;
                    trace!("Scheduler cycle late by {:?}", now - deadline);
                }
                deadline = now;
            }
        }
    }

    /// One cycle without sleeping
    pub fn cycle(&mut self) -> Result<Cycle> {
        self.stats.cycles += 1;

        if self.control.is_stop_requested() {
            return Ok(Cycle::Done(Outcome::Stopped));
        }
        if let Some(seconds) = self.control.take_seek() {
            self.seek(seconds)?;
        }

        self.jitter.maintain(&mut self.decoder)?;

        if !self.pending.is_empty() {
            match self.sink.deliver(self.pending.bytes()) {
                Delivery::Sent => {
                    self.stats.bytes_delivered += self.pending.bytes().len() as u64;
                    self.pending.clear();
                }
                Delivery::Backpressure { consumed } => {
                    self.stats.backpressure_events += 1;
                    self.stats.bytes_delivered += consumed as u64;
                    self.pending.consume(consumed);
                }
                Delivery::Stop => return Ok(Cycle::Done(Outcome::Stopped)),
            }
        }

        if self.pending.is_empty() && self.jitter.state() == JitterState::Ready {
            if let Some(chunk) = self.jitter.drain() {
                self.stats.chunks_drained += 1;
                match self.sink.deliver(chunk) {
                    Delivery::Sent => self.stats.bytes_delivered += chunk.len() as u64,
                    Delivery::Backpressure { consumed } => {
                        self.stats.backpressure_events += 1;
                        self.stats.bytes_delivered += consumed as u64;
                        self.pending.set(&chunk[consumed.min(chunk.len())..]);
                    }
                    Delivery::Stop => return Ok(Cycle::Done(Outcome::Stopped)),
                }
            }
        }

        if self.jitter.is_finished() && self.pending.is_empty() {
            self.sink.finish();
            return Ok(Cycle::Done(Outcome::Finished));
        }
        Ok(Cycle::Continue)
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        debug!("Scheduler seeking to {:.3}s", seconds);
        self.decoder.seek(seconds)?;
        self.pending.clear();
        self.jitter.reset();
        self.sink.discard()?;
        self.stats.seeks += 1;
        Ok(())
    }
}
