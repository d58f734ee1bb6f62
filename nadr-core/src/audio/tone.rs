//! Synthetic sine source
//!
//! Finite-length test tone in any supported format. PCM 24-bit samples are
//! written low-aligned and sign-extended in 4-byte containers. DSD output is
//! a first-order delta-sigma modulation of the sine, emitted as planar
//! blocks of one scheduler chunk, the last block padded with idle pattern.

use crate::audio::decoder::Decoder;
use crate::audio::types::{DecodeStatus, TrackInfo};
use crate::error::{Error, Result};
use nadr_common::format::DSD_SAMPLES_PER_FRAME;
use nadr_common::params::DSD_SILENCE;
use nadr_common::timing::chunk_frames;
use nadr_common::{AudioFormat, DsdBitOrder, S24Hint, SampleKind};
use std::f64::consts::TAU;
use std::time::Duration;

pub struct ToneDecoder {
    info: TrackInfo,
    frequency: f64,
    amplitude: f64,
    total_frames: u64,
    position: u64,
    /// Delta-sigma integrator per channel
    integrators: Vec<f64>,
}

impl ToneDecoder {
    pub fn new(format: AudioFormat, frequency: f64, duration: Duration) -> Result<Self> {
        if !format.is_valid() {
            return Err(Error::InvalidFormat(format.to_string()));
        }
        let total_frames = (duration.as_secs_f64() * format.frames_per_second() as f64) as u64;

        let mut info = TrackInfo::new(format);
        info.duration_secs = Some(duration.as_secs_f64());
        if !format.is_dsd() && format.bit_depth == 24 {
            info.s24_hint = S24Hint::LowAligned;
        }

        Ok(Self {
            info,
            frequency,
            amplitude: 0.5,
            total_frames,
            position: 0,
            integrators: vec![0.0; format.channels as usize],
        })
    }

    /// Mark the source as a network stream (jitter headroom)
    pub fn with_network(mut self, network: bool) -> Self {
        self.info.network = network;
        self
    }

    pub fn remaining_frames(&self) -> u64 {
        self.total_frames - self.position
    }

    fn decode_pcm(&mut self, out: &mut [u8]) -> usize {
        let format = self.info.format;
        let channels = format.channels as usize;
        let container = format.input_container_bytes();
        let bpf = format.input_bytes_per_frame();
        let frames = ((out.len() / bpf) as u64).min(self.remaining_frames()) as usize;
        let full_scale = ((1i64 << (format.bit_depth - 1)) - 1) as f64;

        for (i, frame) in out[..frames * bpf].chunks_exact_mut(bpf).enumerate() {
            let t = (self.position + i as u64) as f64 / format.sample_rate as f64;
            let value = ((TAU * self.frequency * t).sin() * self.amplitude * full_scale) as i32;
            for sample in frame.chunks_exact_mut(container).take(channels) {
                match container {
                    2 => sample.copy_from_slice(&(value as i16).to_le_bytes()),
                    _ => sample.copy_from_slice(&value.to_le_bytes()),
                }
            }
        }

        self.position += frames as u64;
        frames * bpf
    }

    fn decode_dsd(&mut self, out: &mut [u8], order: DsdBitOrder) -> usize {
        let format = self.info.format;
        let channels = format.channels as usize;
        let frames = chunk_frames(&format);
        let block = frames * 4;
        if out.len() < block * channels {
            return 0;
        }

        let live = (frames as u64).min(self.remaining_frames()) as usize;
        let bit_rate = format.sample_rate as f64;
        for ch in 0..channels {
            let plane = &mut out[ch * block..(ch + 1) * block];
            plane[live * 4..].fill(DSD_SILENCE);

            let mut acc = self.integrators[ch];
            for (byte_index, byte) in plane[..live * 4].iter_mut().enumerate() {
                let mut packed = 0u8;
                for bit in 0..8 {
                    let n = (self.position * DSD_SAMPLES_PER_FRAME as u64) + (byte_index * 8 + bit) as u64;
                    let x = (TAU * self.frequency * n as f64 / bit_rate).sin() * self.amplitude;
                    let one = acc >= 0.0;
                    acc += x - if one { 1.0 } else { -1.0 };
                    if one {
                        packed |= match order {
                            DsdBitOrder::MsbFirst => 0x80 >> bit,
                            DsdBitOrder::LsbFirst => 1 << bit,
                        };
                    }
                }
                *byte = packed;
            }
            self.integrators[ch] = acc;
        }

        self.position += live as u64;
        block * channels
    }
}

impl Decoder for ToneDecoder {
    fn track_info(&self) -> &TrackInfo {
        &self.info
    }

    fn decode(&mut self, out: &mut [u8]) -> Result<DecodeStatus> {
        if self.remaining_frames() == 0 {
            return Ok(DecodeStatus::EndOfStream);
        }
        let written = match self.info.format.kind {
            SampleKind::Pcm => self.decode_pcm(out),
            SampleKind::Dsd(order) => self.decode_dsd(out, order),
        };
        Ok(DecodeStatus::Frames(written))
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let frame = (seconds.max(0.0) * self.info.format.frames_per_second() as f64) as u64;
        self.position = frame.min(self.total_frames);
        self.integrators.fill(0.0);
        Ok(())
    }
}
