//! Producer side: converted chunks into the ring
//!
//! The scheduler delivers decoder-format chunks to a [`ChunkSink`]. The
//! [`RingSink`] converts them with the current [`ConversionPlan`] straight
//! into a contiguous ring region when one is free, or through the
//! producer-owned staging scratch otherwise.
//!
//! Acceptance is reported, never waited for:
//! - PCM is accepted in whole frames, as many as fit
//! - A DSD chunk is one planar block and is accepted whole or not at all
//!
//! The layout (plan, frame size, alignment hint) is cached per ring
//! generation and re-read only when the generation changes.

use crate::audio::staging::dsd::{self, GROUP_BYTES};
use crate::audio::staging::{ConversionPlan, Detection, S24Alignment, S24Detector, StagingBuffers};
use crate::error::Result;
use crate::playback::layout::StreamLayout;
use crate::playback::ring_buffer::{RingControl, RingCounters, RingProducer, WriteSession};
use nadr_common::{AudioFormat, S24Hint, SampleKind};
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of offering one chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Whole chunk accepted
    Sent,
    /// Only `consumed` leading bytes accepted (frame aligned, may be 0)
    Backpressure { consumed: usize },
    /// Downstream is gone; stop the track
    Stop,
}

/// Destination of scheduler output
pub trait ChunkSink {
    /// Offer one chunk of decoder-format bytes. Must not block.
    fn deliver(&mut self, chunk: &[u8]) -> Delivery;

    /// Drop everything buffered downstream (seek)
    fn discard(&mut self) -> Result<()> {
        Ok(())
    }

    /// The source is exhausted and every chunk has been accepted
    fn finish(&mut self) {}
}

#[derive(Debug, Clone, Copy)]
struct CachedLayout {
    generation: u64,
    layout: StreamLayout,
}

/// [`ChunkSink`] writing into the ring producer half
pub struct RingSink {
    tx: RingProducer,
    control: RingControl,
    staging: StagingBuffers,
    detector: S24Detector,
    hint: S24Hint,
    cached: Option<CachedLayout>,
    reconfigure_timeout: Duration,
}

impl RingSink {
    pub fn new(tx: RingProducer, control: RingControl, reconfigure_timeout: Duration) -> Self {
        Self {
            tx,
            control,
            staging: StagingBuffers::new(),
            detector: S24Detector::default(),
            hint: S24Hint::Unknown,
            cached: None,
            reconfigure_timeout,
        }
    }

    /// Adopt a new track's alignment hint (gapless change, same format)
    pub fn set_s24_hint(&mut self, hint: S24Hint) {
        debug!("RingSink: S24 hint {:?}", hint);
        self.hint = hint;
        self.detector.reset(hint);
    }

    pub fn detection(&self) -> Detection {
        self.detector.state()
    }

    /// Layout as of the last delivery
    pub fn cached_layout(&self) -> Option<StreamLayout> {
        self.cached.map(|c| c.layout)
    }

    pub fn producer(&self) -> &RingProducer {
        &self.tx
    }
}

impl ChunkSink for RingSink {
    fn deliver(&mut self, chunk: &[u8]) -> Delivery {
        if self.control.ring().is_closed() {
            return Delivery::Stop;
        }
        if chunk.is_empty() {
            return Delivery::Sent;
        }
        self.tx.resume_stream();

        let Some(mut session) = self.tx.session() else {
            // Reconfiguring; the scheduler retries next cycle
            return Delivery::Backpressure { consumed: 0 };
        };

        let generation = session.generation();
        if self.cached.map(|c| c.generation) != Some(generation) {
            let layout = *session.layout();
            let previous = self.cached.map(|c| c.layout);
            let changed = previous.map_or(true, |p| p.format != layout.format || p.s24_hint != layout.s24_hint);
            if changed {
                self.hint = layout.s24_hint;
            }
            self.detector.reset(self.hint);
            self.cached = Some(CachedLayout { generation, layout });
        }
        let Some(CachedLayout { layout, .. }) = self.cached else {
            return Delivery::Backpressure { consumed: 0 };
        };

        let delivery = match layout.format {
            Some(format @ AudioFormat {
                kind: SampleKind::Dsd(_),
                ..
            }) => deliver_dsd(&mut session, &layout, &format, &mut self.staging, chunk),
            _ => deliver_pcm(&mut session, &layout, &mut self.staging, &mut self.detector, chunk),
        };

        if let Delivery::Backpressure { .. } = delivery {
            RingCounters::bump(&session.counters().truncated_pushes);
        }
        delivery
    }

    fn discard(&mut self) -> Result<()> {
        self.control.clear(self.reconfigure_timeout)?;
        Ok(())
    }

    fn finish(&mut self) {
        debug!("RingSink: end of stream");
        self.tx.mark_end_of_stream();
    }
}

fn deliver_pcm(
    session: &mut WriteSession<'_>,
    layout: &StreamLayout,
    staging: &mut StagingBuffers,
    detector: &mut S24Detector,
    chunk: &[u8],
) -> Delivery {
    let in_bpf = layout.format.map_or(1, |f| f.input_bytes_per_frame());
    let out_bpf = layout.bytes_per_frame;
    let plan = layout.plan;

    let offered = chunk.len() / in_bpf;
    let frames = offered.min(session.free_space() / out_bpf);
    if frames == 0 {
        return Delivery::Backpressure { consumed: 0 };
    }

    let in_len = frames * in_bpf;
    let out_len = frames * out_bpf;
    let input = &chunk[..in_len];
    let alignment = if plan.detects_alignment() {
        detector.observe(input)
    } else {
        S24Alignment::Low
    };

    match plan {
        ConversionPlan::Direct => {
            session.push(input);
        }
        _ => {
            if let Some(region) = session.direct_write_region(out_len) {
                plan.convert_pcm(input, region, alignment);
                session.commit_write(out_len);
            } else {
                let scratch = staging.scratch(&plan);
                let frames_per_pass = scratch.len() / out_bpf;
                let mut done = 0;
                while done < frames {
                    let n = (frames - done).min(frames_per_pass);
                    let src = &input[done * in_bpf..(done + n) * in_bpf];
                    let (_, written) = plan.convert_pcm(src, &mut scratch[..n * out_bpf], alignment);
                    session.push(&scratch[..written]);
                    done += n;
                }
            }
        }
    }

    if frames < offered {
        Delivery::Backpressure { consumed: in_len }
    } else {
        Delivery::Sent
    }
}

fn deliver_dsd(
    session: &mut WriteSession<'_>,
    layout: &StreamLayout,
    format: &AudioFormat,
    staging: &mut StagingBuffers,
    chunk: &[u8],
) -> Delivery {
    let ConversionPlan::Dsd(ops) = layout.plan else {
        return Delivery::Backpressure { consumed: 0 };
    };
    let channels = format.channels as usize;
    let block = chunk.len() / channels;
    let groups = block / GROUP_BYTES;
    let frame_bytes = channels * GROUP_BYTES;
    let whole = groups * frame_bytes;
    let tail = if block % GROUP_BYTES == 0 { 0 } else { frame_bytes };
    let out_len = whole + tail;

    if chunk.len() % channels != 0 {
        warn!(
            "DSD block of {} bytes does not split into {} planes",
            chunk.len(),
            channels
        );
    }

    if session.free_space() < out_len {
        return Delivery::Backpressure { consumed: 0 };
    }

    if let Some(region) = session.direct_write_region(out_len) {
        dsd::interleave(chunk, channels, 0, groups, region, ops);
        dsd::interleave_tail(chunk, channels, layout.silence, &mut region[whole..], ops);
        session.commit_write(out_len);
    } else {
        let scratch = staging.scratch(&layout.plan);
        let groups_per_pass = scratch.len() / frame_bytes;
        let mut done = 0;
        while done < groups {
            let n = (groups - done).min(groups_per_pass);
            let written = dsd::interleave(chunk, channels, done, n, scratch, ops);
            session.push(&scratch[..written]);
            done += n;
        }
        let written = dsd::interleave_tail(chunk, channels, layout.silence, scratch, ops);
        session.push(&scratch[..written]);
    }

    Delivery::Sent
}
