//! Core audio data types
//!
//! Cache-line aligned byte storage shared by the ring and the staging
//! converters, plus the decoder-facing status and track descriptors.

use bytemuck::{Pod, Zeroable};
use nadr_common::params::CACHE_LINE;
use nadr_common::{AudioFormat, S24Hint};
use serde::Serialize;

/// One 64-byte, 64-byte-aligned block
#[derive(Clone, Copy)]
#[repr(C, align(64))]
pub struct CacheLine(pub [u8; CACHE_LINE]);

// SAFETY: a plain byte array with size equal to its alignment; no padding and
// every bit pattern is valid.
unsafe impl Zeroable for CacheLine {}
unsafe impl Pod for CacheLine {}

/// Heap byte buffer whose start is cache-line aligned
///
/// Allocated once on a cold path. The usable length is exactly the requested
/// length even though storage is rounded up to whole cache lines.
pub struct AlignedBuffer {
    lines: Box<[CacheLine]>,
    len: usize,
}

impl AlignedBuffer {
    /// Allocate `len` bytes filled with `fill`
    pub fn new(len: usize, fill: u8) -> Self {
        let count = len.div_ceil(CACHE_LINE);
        let lines = vec![CacheLine([fill; CACHE_LINE]); count].into_boxed_slice();
        Self { lines, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &bytemuck::cast_slice(&self.lines)[..self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut(&mut self.lines)[..self.len]
    }

    /// Raw base pointer for cross-thread region access
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.lines.as_mut_ptr().cast()
    }

    pub fn fill(&mut self, value: u8) {
        self.as_mut_slice().fill(value);
    }
}

impl std::fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuffer").field("len", &self.len).finish()
    }
}

/// Result of one decoder call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Bytes written to the output buffer (always whole frames).
    /// `Frames(0)` means the decoder made no progress.
    Frames(usize),
    /// Source briefly exhausted; try again next cycle
    WouldBlock,
    /// No more data for this track
    EndOfStream,
}

/// Track description reported by a decoder
#[derive(Debug, Clone, Serialize)]
pub struct TrackInfo {
    pub format: AudioFormat,
    /// Alignment hint for 24-bit samples in 32-bit containers
    pub s24_hint: S24Hint,
    /// Source is a network stream (adds jitter headroom)
    pub network: bool,
    pub duration_secs: Option<f64>,
}

impl TrackInfo {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            format,
            s24_hint: S24Hint::Unknown,
            network: false,
            duration_secs: None,
        }
    }
}
