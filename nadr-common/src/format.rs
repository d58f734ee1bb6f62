//! Stream format model
//!
//! Describes what a decoder hands to the delivery core. PCM samples arrive as
//! interleaved little-endian integers: 16-bit sources in 2-byte containers,
//! 24- and 32-bit sources in 4-byte containers. DSD arrives planar, one block
//! of bytes per channel, and `sample_rate` is the 1-bit rate per channel
//! (2 822 400 for DSD64).
//!
//! A *frame* is the unit the ring and scheduler stay aligned to:
//! - PCM: one sample per channel
//! - DSD: one 32-bit group per channel (32 one-bit samples)

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of one-bit DSD samples packed into a single frame per channel
pub const DSD_SAMPLES_PER_FRAME: u32 = 32;

/// Bit order of DSD source bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DsdBitOrder {
    /// Oldest sample in bit 0 (DSF files)
    LsbFirst,
    /// Oldest sample in bit 7 (DFF files)
    MsbFirst,
}

/// Sample encoding family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleKind {
    Pcm,
    Dsd(DsdBitOrder),
}

/// Out-of-band alignment hint for 24-bit samples carried in 32-bit containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum S24Hint {
    #[default]
    Unknown,
    /// Significant bytes are 0..3 of each container
    LowAligned,
    /// Significant bytes are 1..4 of each container
    HighAligned,
}

/// Format of one decoded stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    /// Significant bits per sample (1 for DSD)
    pub bit_depth: u16,
    pub channels: u16,
    pub kind: SampleKind,
    /// Source was decoded from a compressed codec (affects jitter target only)
    #[serde(default)]
    pub compressed: bool,
}

impl AudioFormat {
    pub fn pcm(sample_rate: u32, bit_depth: u16, channels: u16) -> Self {
        Self {
            sample_rate,
            bit_depth,
            channels,
            kind: SampleKind::Pcm,
            compressed: false,
        }
    }

    pub fn dsd(sample_rate: u32, channels: u16, order: DsdBitOrder) -> Self {
        Self {
            sample_rate,
            bit_depth: 1,
            channels,
            kind: SampleKind::Dsd(order),
            compressed: false,
        }
    }

    pub fn with_compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    pub fn is_dsd(&self) -> bool {
        matches!(self.kind, SampleKind::Dsd(_))
    }

    /// PCM at or below 48 kHz
    pub fn is_low_rate(&self) -> bool {
        !self.is_dsd() && self.sample_rate <= 48_000
    }

    /// Bytes per sample container as delivered by a decoder
    pub fn input_container_bytes(&self) -> usize {
        match self.kind {
            SampleKind::Dsd(_) => (DSD_SAMPLES_PER_FRAME / 8) as usize,
            SampleKind::Pcm if self.bit_depth <= 16 => 2,
            SampleKind::Pcm => 4,
        }
    }

    pub fn input_bytes_per_frame(&self) -> usize {
        self.input_container_bytes() * self.channels as usize
    }

    /// Frames per second (PCM sample rate, or DSD rate / 32)
    pub fn frames_per_second(&self) -> u32 {
        match self.kind {
            SampleKind::Pcm => self.sample_rate,
            SampleKind::Dsd(_) => self.sample_rate / DSD_SAMPLES_PER_FRAME,
        }
    }

    /// Source byte rate as delivered by a decoder
    pub fn input_bytes_per_second(&self) -> u64 {
        self.frames_per_second() as u64 * self.input_bytes_per_frame() as u64
    }

    /// True when switching between PCM and DSD
    pub fn family_changed(&self, other: &AudioFormat) -> bool {
        self.is_dsd() != other.is_dsd()
    }

    /// Structural validity: non-zero rate and channels, supported depth
    pub fn is_valid(&self) -> bool {
        if self.sample_rate == 0 || self.channels == 0 {
            return false;
        }
        match self.kind {
            SampleKind::Pcm => matches!(self.bit_depth, 16 | 24 | 32),
            SampleKind::Dsd(_) => {
                self.bit_depth == 1 && self.sample_rate % DSD_SAMPLES_PER_FRAME == 0
            }
        }
    }
}

// `compressed` only tunes the jitter target; it never changes buffer layout.
impl PartialEq for AudioFormat {
    fn eq(&self, other: &Self) -> bool {
        self.sample_rate == other.sample_rate
            && self.bit_depth == other.bit_depth
            && self.channels == other.channels
            && self.kind == other.kind
    }
}

impl Eq for AudioFormat {}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SampleKind::Pcm => write!(
                f,
                "PCM {}Hz/{}bit/{}ch",
                self.sample_rate, self.bit_depth, self.channels
            ),
            SampleKind::Dsd(order) => write!(
                f,
                "DSD{} {}ch ({:?})",
                self.sample_rate / 44_100,
                self.channels,
                order
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcm_frame_sizes() {
        assert_eq!(AudioFormat::pcm(44_100, 16, 2).input_bytes_per_frame(), 4);
        assert_eq!(AudioFormat::pcm(96_000, 24, 2).input_bytes_per_frame(), 8);
        assert_eq!(AudioFormat::pcm(192_000, 32, 2).input_bytes_per_frame(), 8);
    }

    #[test]
    fn test_dsd_rates() {
        let dsd64 = AudioFormat::dsd(2_822_400, 2, DsdBitOrder::LsbFirst);
        assert_eq!(dsd64.frames_per_second(), 88_200);
        assert_eq!(dsd64.input_bytes_per_frame(), 8);
        // 1-bit rate * channels / 8
        assert_eq!(dsd64.input_bytes_per_second(), 2_822_400 * 2 / 8);
        assert!(!dsd64.is_low_rate());
    }

    #[test]
    fn test_equality_ignores_compressed() {
        let a = AudioFormat::pcm(44_100, 16, 2);
        let b = a.with_compressed(true);
        assert_eq!(a, b);
        assert_ne!(a, AudioFormat::pcm(48_000, 16, 2));
    }

    #[test]
    fn test_family_changed() {
        let pcm = AudioFormat::pcm(44_100, 16, 2);
        let dsd = AudioFormat::dsd(2_822_400, 2, DsdBitOrder::MsbFirst);
        assert!(pcm.family_changed(&dsd));
        assert!(!pcm.family_changed(&AudioFormat::pcm(192_000, 24, 2)));
    }

    #[test]
    fn test_validity() {
        assert!(AudioFormat::pcm(44_100, 16, 2).is_valid());
        assert!(!AudioFormat::pcm(44_100, 20, 2).is_valid());
        assert!(!AudioFormat::pcm(0, 16, 2).is_valid());
        assert!(!AudioFormat::pcm(44_100, 16, 0).is_valid());
        assert!(AudioFormat::dsd(5_644_800, 2, DsdBitOrder::LsbFirst).is_valid());
    }
}
