//! Test helpers for nadr-core integration tests
//!
//! - Pattern generators with known byte sequences
//! - Scripted decoders (fixed output sizes, stalls, would-block runs)
//! - Capture sinks with configurable acceptance limits
//! - WAV fixture writer (hound)

#![allow(dead_code)]

use hound::{WavSpec, WavWriter};
use nadr_common::AudioFormat;
use nadr_core::audio::types::{DecodeStatus, TrackInfo};
use nadr_core::audio::Decoder;
use nadr_core::playback::{ChunkSink, Delivery};
use nadr_core::Result;
use std::collections::VecDeque;
use std::path::Path;

/// Byte `i` of a stream that never repeats within 251 bytes
pub fn pattern_byte(i: usize) -> u8 {
    (i % 251) as u8
}

pub fn pattern(start: usize, len: usize) -> Vec<u8> {
    (start..start + len).map(pattern_byte).collect()
}

/// Decoder emitting the byte pattern in scripted steps
pub struct ScriptedDecoder {
    info: TrackInfo,
    script: VecDeque<Step>,
    /// Bytes emitted so far (pattern position)
    pub emitted: usize,
    pub seeks: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Emit up to this many bytes (whole frames)
    Bytes(usize),
    WouldBlock,
    NoProgress,
}

impl ScriptedDecoder {
    pub fn new(format: AudioFormat, script: impl IntoIterator<Item = Step>) -> Self {
        Self {
            info: TrackInfo::new(format),
            script: script.into_iter().collect(),
            emitted: 0,
            seeks: Vec::new(),
        }
    }

    /// Emit `total` bytes in `per_call` pieces, then end
    pub fn steady(format: AudioFormat, total: usize, per_call: usize) -> Self {
        let mut steps = Vec::new();
        let mut left = total;
        while left > 0 {
            let n = per_call.min(left);
            steps.push(Step::Bytes(n));
            left -= n;
        }
        Self::new(format, steps)
    }

    pub fn with_info(mut self, info: TrackInfo) -> Self {
        self.info = info;
        self
    }
}

impl Decoder for ScriptedDecoder {
    fn track_info(&self) -> &TrackInfo {
        &self.info
    }

    fn decode(&mut self, out: &mut [u8]) -> Result<DecodeStatus> {
        let frame = self.info.format.input_bytes_per_frame();
        match self.script.pop_front() {
            None => Ok(DecodeStatus::EndOfStream),
            Some(Step::WouldBlock) => Ok(DecodeStatus::WouldBlock),
            Some(Step::NoProgress) => Ok(DecodeStatus::Frames(0)),
            Some(Step::Bytes(n)) => {
                let take = n.min(out.len());
                let take = take - take % frame;
                if take < n {
                    self.script.push_front(Step::Bytes(n - take));
                }
                for (i, b) in out[..take].iter_mut().enumerate() {
                    *b = pattern_byte(self.emitted + i);
                }
                self.emitted += take;
                Ok(DecodeStatus::Frames(take))
            }
        }
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        self.seeks.push(seconds);
        Ok(())
    }
}

/// Sink recording everything it accepts
#[derive(Default)]
pub struct CaptureSink {
    pub received: Vec<u8>,
    /// Per-call acceptance limits; unlimited once exhausted
    pub limits: VecDeque<usize>,
    pub frame: usize,
    pub calls: usize,
    pub discards: usize,
    /// End-of-stream notifications
    pub finished: usize,
}

impl CaptureSink {
    pub fn with_limits(frame: usize, limits: impl IntoIterator<Item = usize>) -> Self {
        Self {
            frame,
            limits: limits.into_iter().collect(),
            ..Default::default()
        }
    }
}

impl ChunkSink for CaptureSink {
    fn deliver(&mut self, chunk: &[u8]) -> Delivery {
        self.calls += 1;
        let limit = self.limits.pop_front().unwrap_or(usize::MAX);
        let frame = self.frame.max(1);
        let take = chunk.len().min(limit);
        let take = take - take % frame;
        self.received.extend_from_slice(&chunk[..take]);
        if take < chunk.len() {
            Delivery::Backpressure { consumed: take }
        } else {
            Delivery::Sent
        }
    }

    fn discard(&mut self) -> Result<()> {
        self.discards += 1;
        Ok(())
    }

    fn finish(&mut self) {
        self.finished += 1;
    }
}

/// Write a 16-bit stereo WAV with a ramp in each channel
pub fn write_ramp_wav(path: &Path, sample_rate: u32, frames: u32) -> std::result::Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for i in 0..frames {
        let v = (i % 30_000) as i16;
        writer.write_sample(v)?;
        writer.write_sample(-v)?;
    }
    writer.finalize()
}

/// Write a 24-bit stereo WAV with a constant sample value
pub fn write_24bit_wav(path: &Path, sample_rate: u32, frames: u32, value: i32) -> std::result::Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 24,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for _ in 0..frames * 2 {
        writer.write_sample(value)?;
    }
    writer.finalize()
}
