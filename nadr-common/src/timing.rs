//! Cadence calculations for the scheduler and the transport
//!
//! Two clocks drive delivery:
//!
//! 1. **Scheduler chunk period**: the decode side drains one quantized chunk
//!    per period (`chunk_samples * 1e6 / sample_rate` microseconds).
//! 2. **Transport cycle**: the sink pulls one MTU-sized payload per cycle
//!    (`(mtu - 24) / bytes_per_second` seconds, clamped to 100µs..50ms).
//!
//! Both are computed once per format and never on the hot path.

use crate::format::{AudioFormat, DSD_SAMPLES_PER_FRAME};
use crate::params::{
    DSD_CHUNK_SAMPLES, MAX_CYCLE_US, MIN_CYCLE_US, PCM_CHUNK_HIGH, PCM_CHUNK_LOW, PCM_CHUNK_MID,
    PCM_LOW_RATE_MAX, PCM_MID_RATE_MAX, TRANSPORT_OVERHEAD_BYTES,
};
use std::time::Duration;

/// Quantized chunk size in samples per channel
///
/// - PCM ≤ 48 kHz: 2048
/// - PCM ≤ 96 kHz: 4096
/// - PCM above: 8192
/// - DSD (any rate): 32768 one-bit samples
pub fn chunk_samples(format: &AudioFormat) -> usize {
    if format.is_dsd() {
        DSD_CHUNK_SAMPLES
    } else if format.sample_rate <= PCM_LOW_RATE_MAX {
        PCM_CHUNK_LOW
    } else if format.sample_rate <= PCM_MID_RATE_MAX {
        PCM_CHUNK_MID
    } else {
        PCM_CHUNK_HIGH
    }
}

/// Chunk size in frames (DSD frames hold 32 samples per channel)
pub fn chunk_frames(format: &AudioFormat) -> usize {
    if format.is_dsd() {
        DSD_CHUNK_SAMPLES / DSD_SAMPLES_PER_FRAME as usize
    } else {
        chunk_samples(format)
    }
}

/// Scheduler period for one chunk
pub fn chunk_period(format: &AudioFormat) -> Duration {
    if format.sample_rate == 0 {
        return Duration::ZERO;
    }
    let micros = chunk_samples(format) as u64 * 1_000_000 / format.sample_rate as u64;
    Duration::from_micros(micros)
}

/// Transport cycle time from MTU and stream byte rate
#[derive(Debug, Clone, Copy)]
pub struct CycleCalculator {
    mtu: u32,
}

impl CycleCalculator {
    pub fn new(mtu: u32) -> Self {
        Self { mtu }
    }

    /// Payload bytes available per packet after protocol overhead
    pub fn efficient_mtu(&self) -> u32 {
        self.mtu.saturating_sub(TRANSPORT_OVERHEAD_BYTES)
    }

    /// Cycle time in microseconds, rounded and clamped to [100, 50000]
    pub fn cycle_us(&self, bytes_per_second: u64) -> u64 {
        if bytes_per_second == 0 {
            return MAX_CYCLE_US;
        }
        let cycle = self.efficient_mtu() as f64 / bytes_per_second as f64 * 1_000_000.0;
        (cycle.round() as u64).clamp(MIN_CYCLE_US, MAX_CYCLE_US)
    }

    pub fn cycle(&self, bytes_per_second: u64) -> Duration {
        Duration::from_micros(self.cycle_us(bytes_per_second))
    }
}

/// Whole-frame byte counts per transport cycle with remainder carry
///
/// `frames_per_second * cycle_us / 1e6` is rarely an integer. Each call to
/// [`FramePacer::next_bytes`] returns the whole frames due this cycle and
/// carries the fractional part, so the long-run byte rate equals the format
/// rate exactly.
#[derive(Debug, Clone)]
pub struct FramePacer {
    bytes_per_frame: usize,
    /// frames_per_second * cycle_us
    numerator: u64,
    accumulator: u64,
}

impl FramePacer {
    pub fn new(frames_per_second: u32, bytes_per_frame: usize, cycle_us: u64) -> Self {
        Self {
            bytes_per_frame,
            numerator: frames_per_second as u64 * cycle_us,
            accumulator: 0,
        }
    }

    /// Bytes the sink should pull this cycle (always whole frames)
    pub fn next_bytes(&mut self) -> usize {
        self.accumulator += self.numerator;
        let frames = self.accumulator / 1_000_000;
        self.accumulator %= 1_000_000;
        frames as usize * self.bytes_per_frame
    }

    pub fn reset(&mut self) {
        self.accumulator = 0;
    }
}
