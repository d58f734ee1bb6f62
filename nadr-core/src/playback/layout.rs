//! Per-format ring layout
//!
//! Everything the producer and consumer need to know about the current
//! stream, fixed once per configuration and swapped only under the
//! reconfiguration gate.

use crate::audio::staging::{ConversionPlan, SinkCapabilities};
use crate::error::{Error, Result};
use nadr_common::config::BufferConfig;
use nadr_common::{AudioFormat, S24Hint};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct StreamLayout {
    /// Decoder-side format; `None` until the first configure
    pub format: Option<AudioFormat>,
    pub plan: ConversionPlan,
    pub s24_hint: S24Hint,
    /// Ring-side bytes per frame (after conversion)
    pub bytes_per_frame: usize,
    /// Ring-side byte rate
    pub bytes_per_second: u64,
    /// Ring fill required before the first non-silent pull
    pub prefill_bytes: usize,
    pub silence: u8,
}

impl StreamLayout {
    /// Placeholder before any format is known: byte frames, no prefill
    pub fn unconfigured() -> Self {
        Self {
            format: None,
            plan: ConversionPlan::Direct,
            s24_hint: S24Hint::Unknown,
            bytes_per_frame: 1,
            bytes_per_second: 0,
            prefill_bytes: 0,
            silence: 0,
        }
    }

    /// Layout and ring size for a new format
    pub fn for_format(
        format: AudioFormat,
        hint: S24Hint,
        caps: &SinkCapabilities,
        buffer: &BufferConfig,
    ) -> Result<(Self, usize)> {
        if !format.is_valid() {
            return Err(Error::InvalidFormat(format.to_string()));
        }

        let plan = ConversionPlan::derive(&format, caps)?;
        let bytes_per_frame = plan.output_bytes_per_frame(&format);
        let bytes_per_second = format.frames_per_second() as u64 * bytes_per_frame as u64;
        let ring_size = buffer.ring_size(&format, bytes_per_second);

        let layout = Self {
            format: Some(format),
            plan,
            s24_hint: hint,
            bytes_per_frame,
            bytes_per_second,
            prefill_bytes: buffer
                .prefill_bytes(&format, bytes_per_second)
                .min(ring_size - 1),
            silence: BufferConfig::silence_byte(&format),
        };
        Ok((layout, ring_size))
    }

    /// Round `bytes` down to whole ring frames
    #[inline]
    pub fn align_down(&self, bytes: usize) -> usize {
        bytes - bytes % self.bytes_per_frame
    }
}
