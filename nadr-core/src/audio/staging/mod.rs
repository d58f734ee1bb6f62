//! Format staging layer
//!
//! Normalizes decoder output into the layout the sink accepts before it
//! enters the ring. Every converter reads an unaligned source and writes
//! either a cache-line aligned scratch buffer or a contiguous ring region,
//! in lane blocks of [`LANES`] samples plus a bounded scalar remainder.
//!
//! The conversion for a stream is fixed once per format as a
//! [`ConversionPlan`] derived from the format and the sink's
//! [`SinkCapabilities`].

pub mod detect;
pub mod dsd;
pub mod pack24;
pub mod widen;

pub use detect::{Detection, S24Detector};
pub use dsd::DsdOps;
pub use pack24::S24Alignment;

use crate::audio::copy::copy;
use crate::audio::types::AlignedBuffer;
use crate::error::{Error, Result};
use nadr_common::params::STAGING_BUFFER_BYTES;
use nadr_common::{AudioFormat, DsdBitOrder, SampleKind};
use serde::{Deserialize, Serialize};

/// Samples per fixed-iteration block
pub const LANES: usize = 8;

/// What the downstream transport can take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkCapabilities {
    pub accepts_16: bool,
    /// Tight 3-byte samples
    pub accepts_packed_24: bool,
    pub accepts_32: bool,
    /// 16-bit sources widened into 32-bit containers occupy the upper half
    pub msb_aligned_32: bool,
    pub dsd_bit_order: DsdBitOrder,
    /// DSD groups are sent as little-endian 32-bit words
    pub dsd_little_endian: bool,
}

impl Default for SinkCapabilities {
    fn default() -> Self {
        Self {
            accepts_16: true,
            accepts_packed_24: true,
            accepts_32: true,
            msb_aligned_32: true,
            dsd_bit_order: DsdBitOrder::MsbFirst,
            dsd_little_endian: false,
        }
    }
}

/// Per-format conversion between decoder output and ring contents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConversionPlan {
    /// Byte-for-byte copy
    Direct,
    /// 32-bit containers to 3-byte samples. `None` detects the alignment from
    /// content; `Some` forces it.
    Pack24(Option<S24Alignment>),
    /// 16-bit to 32-bit containers
    Widen16To32 { msb_aligned: bool },
    /// 32-bit containers to 16-bit. `None` detects 24-bit alignment from
    /// content; `Some` forces it.
    Narrow32To16(Option<S24Alignment>),
    /// Planar to interleaved DSD groups
    Dsd(DsdOps),
}

impl ConversionPlan {
    /// Choose the cheapest conversion the sink accepts
    pub fn derive(format: &AudioFormat, caps: &SinkCapabilities) -> Result<Self> {
        let plan = match format.kind {
            SampleKind::Dsd(order) => ConversionPlan::Dsd(DsdOps {
                reverse_bits: order != caps.dsd_bit_order,
                byte_swap: caps.dsd_little_endian,
            }),
            SampleKind::Pcm => match format.bit_depth {
                16 if caps.accepts_16 => ConversionPlan::Direct,
                16 if caps.accepts_32 => ConversionPlan::Widen16To32 {
                    msb_aligned: caps.msb_aligned_32,
                },
                24 if caps.accepts_packed_24 => ConversionPlan::Pack24(None),
                24 | 32 if caps.accepts_32 => ConversionPlan::Direct,
                // 32-bit content: the top three bytes are the most significant
                32 if caps.accepts_packed_24 => ConversionPlan::Pack24(Some(S24Alignment::High)),
                24 if caps.accepts_16 => ConversionPlan::Narrow32To16(None),
                32 if caps.accepts_16 => ConversionPlan::Narrow32To16(Some(S24Alignment::High)),
                depth => {
                    return Err(Error::InvalidFormat(format!(
                        "sink accepts no container for {}-bit PCM",
                        depth
                    )))
                }
            },
        };
        Ok(plan)
    }

    /// Bytes per frame after conversion
    pub fn output_bytes_per_frame(&self, format: &AudioFormat) -> usize {
        let channels = format.channels as usize;
        match self {
            ConversionPlan::Direct | ConversionPlan::Dsd(_) => format.input_bytes_per_frame(),
            ConversionPlan::Pack24(_) => channels * 3,
            ConversionPlan::Widen16To32 { .. } => channels * 4,
            ConversionPlan::Narrow32To16(_) => channels * 2,
        }
    }

    /// Significant bits per sample as seen by the sink
    pub fn output_bit_depth(&self, format: &AudioFormat) -> u16 {
        match self {
            ConversionPlan::Direct | ConversionPlan::Dsd(_) => format.bit_depth,
            ConversionPlan::Pack24(_) => 24,
            ConversionPlan::Widen16To32 { .. } => 32,
            ConversionPlan::Narrow32To16(_) => 16,
        }
    }

    /// Convert interleaved PCM samples from `src` into `dst`
    ///
    /// Converts as many whole samples as both buffers allow. Returns
    /// `(input bytes consumed, output bytes written)`. DSD plans go through
    /// [`dsd::interleave`] instead and return `(0, 0)` here.
    pub fn convert_pcm(&self, src: &[u8], dst: &mut [u8], alignment: S24Alignment) -> (usize, usize) {
        match *self {
            ConversionPlan::Direct => {
                let n = copy(dst, src);
                (n, n)
            }
            ConversionPlan::Pack24(forced) => {
                let n = pack24::pack_24(src, dst, forced.unwrap_or(alignment));
                (n * 4, n * 3)
            }
            ConversionPlan::Widen16To32 { msb_aligned: true } => {
                let n = widen::widen_16_to_32_msb(src, dst);
                (n * 2, n * 4)
            }
            ConversionPlan::Widen16To32 { msb_aligned: false } => {
                let n = widen::widen_16_to_32_sign_extend(src, dst);
                (n * 2, n * 4)
            }
            ConversionPlan::Narrow32To16(forced) => {
                let n = widen::narrow_32_to_16(src, dst, forced.unwrap_or(alignment));
                (n * 4, n * 2)
            }
            ConversionPlan::Dsd(_) => (0, 0),
        }
    }

    /// Needs 24-bit alignment detection on the producer side
    pub fn detects_alignment(&self) -> bool {
        matches!(self, ConversionPlan::Pack24(None) | ConversionPlan::Narrow32To16(None))
    }

    fn family(&self) -> Family {
        match self {
            ConversionPlan::Direct | ConversionPlan::Pack24(_) => Family::Pack24,
            ConversionPlan::Widen16To32 { .. } | ConversionPlan::Narrow32To16(_) => Family::Widen,
            ConversionPlan::Dsd(_) => Family::Dsd,
        }
    }
}

#[derive(Clone, Copy)]
enum Family {
    Pack24,
    Widen,
    Dsd,
}

/// Producer-owned scratch buffers, one per converter family
///
/// Allocated once when the producer is created and reused for every call.
pub struct StagingBuffers {
    pack24: AlignedBuffer,
    widen: AlignedBuffer,
    dsd: AlignedBuffer,
}

impl Default for StagingBuffers {
    fn default() -> Self {
        Self::new()
    }
}

impl StagingBuffers {
    pub fn new() -> Self {
        Self {
            pack24: AlignedBuffer::new(STAGING_BUFFER_BYTES, 0),
            widen: AlignedBuffer::new(STAGING_BUFFER_BYTES, 0),
            dsd: AlignedBuffer::new(STAGING_BUFFER_BYTES, 0),
        }
    }

    /// Scratch space for the plan's converter family
    pub fn scratch(&mut self, plan: &ConversionPlan) -> &mut [u8] {
        match plan.family() {
            Family::Pack24 => self.pack24.as_mut_slice(),
            Family::Widen => self.widen.as_mut_slice(),
            Family::Dsd => self.dsd.as_mut_slice(),
        }
    }
}
