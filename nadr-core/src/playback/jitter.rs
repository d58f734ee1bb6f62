//! Look-ahead jitter buffer
//!
//! Sits between the decoder and the ring on the scheduler thread. The decoder
//! is called in bounded bursts until the queue reaches its target fill; the
//! scheduler then drains exactly one chunk per cycle.
//!
//! ```text
//! Decoder ──decode()──▶ look-ahead queue ──drain()──▶ one chunk ──▶ sink
//!                        (target fill)
//! ```
//!
//! States:
//! - **Filling**: decoding toward the target, nothing drained yet
//! - **Ready**: target reached (or source exhausted); maintain + drain
//!
//! The target is recomputed once per track and clamped so it never exceeds
//! what the queue can actually hold.
//!
//! DSD arrives as planar blocks of exactly one chunk and `drain` re-slices the
//! queue at chunk boundaries. A short block may only be the last one; any
//! data after it is a decode error.

use crate::audio::decoder::Decoder;
use crate::audio::types::{DecodeStatus, TrackInfo};
use crate::error::{Error, Result};
use nadr_common::config::JitterConfig;
use nadr_common::timing::chunk_frames;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use serde::Serialize;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JitterState {
    Filling,
    Ready,
}

/// What one maintain pass achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Maintain {
    /// Target reached, or decoded as much as this cycle allows
    Progress,
    /// Decoder briefly had nothing (`WouldBlock`)
    SourceIdle,
    /// End of stream reached earlier or during this pass
    Exhausted,
    /// Below target and the decoder made no progress
    Stalled,
}

pub struct JitterBuffer {
    prod: HeapProd<u8>,
    cons: HeapCons<u8>,
    /// Decoder output, one chunk
    decode_buf: Vec<u8>,
    /// Most recently drained chunk
    chunk_buf: Vec<u8>,
    chunk_bytes: usize,
    bytes_per_frame: usize,
    capacity: usize,
    target: usize,
    state: JitterState,
    exhausted: bool,
    /// Planar blocks must stay chunk-aligned in the queue
    planar: bool,
    /// A short planar block was queued; only end of stream may follow
    short_block: bool,
    stalled_cycles: u32,
    max_decode_calls: u32,
    max_stalled_cycles: u32,
}

impl JitterBuffer {
    pub fn new(track: &TrackInfo, config: &JitterConfig) -> Self {
        let format = track.format;
        let bytes_per_frame = format.input_bytes_per_frame().max(1);
        let chunk_bytes = chunk_frames(&format) * bytes_per_frame;
        let bytes_per_second = format.input_bytes_per_second() as usize;

        let queue = bytes_per_second * config.queue_ms as usize / 1000;
        let capacity = queue.div_ceil(chunk_bytes).max(4) * chunk_bytes;

        let target_ms = config.target_ms(format.compressed, track.network);
        let wanted = bytes_per_second * target_ms as usize / 1000;
        // Decoding stops once less than one chunk is vacant
        let target = align_down(wanted.min(capacity - chunk_bytes), bytes_per_frame);

        debug!(
            "Jitter buffer: capacity={} bytes, target={} bytes ({}ms), chunk={} bytes",
            capacity, target, target_ms, chunk_bytes
        );

        let (prod, cons) = HeapRb::<u8>::new(capacity).split();
        Self {
            prod,
            cons,
            decode_buf: vec![0; chunk_bytes],
            chunk_buf: Vec::with_capacity(chunk_bytes),
            chunk_bytes,
            bytes_per_frame,
            capacity,
            target,
            state: JitterState::Filling,
            exhausted: false,
            planar: format.is_dsd(),
            short_block: false,
            stalled_cycles: 0,
            max_decode_calls: config.max_decode_calls,
            max_stalled_cycles: config.max_stalled_cycles,
        }
    }

    /// Decode until the target is reached, the source pauses, or the
    /// per-cycle call budget runs out
    ///
    /// Errors only when the decoder fails or has made no progress for
    /// `max_stalled_cycles` consecutive cycles while data is needed.
    pub fn maintain<D: Decoder + ?Sized>(&mut self, decoder: &mut D) -> Result<Maintain> {
        if self.exhausted {
            return Ok(Maintain::Exhausted);
        }

        let mut progressed = false;
        let mut outcome = Maintain::Progress;
        for _ in 0..self.max_decode_calls {
            if self.fill() >= self.target || self.prod.vacant_len() < self.decode_buf.len() {
                break;
            }
            match decoder.decode(&mut self.decode_buf)? {
                DecodeStatus::Frames(0) => break,
                DecodeStatus::Frames(n) => {
                    let n = align_down(n.min(self.decode_buf.len()), self.bytes_per_frame);
                    if self.planar {
                        self.check_block(n)?;
                    }
                    self.prod.push_slice(&self.decode_buf[..n]);
                    progressed = true;
                }
                DecodeStatus::WouldBlock => {
                    outcome = Maintain::SourceIdle;
                    break;
                }
                DecodeStatus::EndOfStream => {
                    debug!("Decoder reached end of stream, {} bytes queued", self.fill());
                    self.exhausted = true;
                    outcome = Maintain::Exhausted;
                    break;
                }
            }
        }

        if progressed {
            self.stalled_cycles = 0;
        } else if outcome == Maintain::Progress && self.fill() < self.target {
            self.stalled_cycles += 1;
            trace!("Decoder made no progress ({} cycles)", self.stalled_cycles);
            if self.stalled_cycles >= self.max_stalled_cycles {
                warn!(
                    "Decoder stalled for {} cycles below target ({} of {} bytes)",
                    self.stalled_cycles,
                    self.fill(),
                    self.target
                );
                return Err(Error::DecodeStalled {
                    cycles: self.stalled_cycles,
                });
            }
            outcome = Maintain::Stalled;
        }

        if self.state == JitterState::Filling && (self.fill() >= self.target || self.exhausted) {
            debug!("Jitter buffer ready: {} bytes queued", self.fill());
            self.state = JitterState::Ready;
        }

        Ok(outcome)
    }

    fn check_block(&mut self, n: usize) -> Result<()> {
        if self.short_block {
            warn!(
                "DSD block of {} bytes after a short block, channel layout lost",
                n
            );
            return Err(Error::Decode(format!(
                "DSD block of {} bytes follows a short block mid-stream",
                n
            )));
        }
        if n != self.chunk_bytes {
            debug!(
                "Short DSD block: {} of {} bytes, expecting end of stream",
                n, self.chunk_bytes
            );
            self.short_block = true;
        }
        Ok(())
    }

    /// Take the next chunk
    ///
    /// `None` while filling, or when less than a chunk is queued and the
    /// source is not exhausted. After end of stream the last, shorter chunk
    /// is returned as-is.
    pub fn drain(&mut self) -> Option<&[u8]> {
        if self.state != JitterState::Ready {
            return None;
        }
        let fill = self.fill();
        let take = if fill >= self.chunk_bytes {
            self.chunk_bytes
        } else if self.exhausted && fill > 0 {
            fill
        } else {
            return None;
        };

        self.chunk_buf.resize(take, 0);
        let n = self.cons.pop_slice(&mut self.chunk_buf);
        self.chunk_buf.truncate(n);
        Some(&self.chunk_buf)
    }

    /// Forget queued audio and start filling again (seek, track change)
    pub fn reset(&mut self) {
        let dropped = self.cons.clear();
        trace!("Jitter buffer reset, dropped {} bytes", dropped);
        self.state = JitterState::Filling;
        self.exhausted = false;
        self.short_block = false;
        self.stalled_cycles = 0;
    }

    /// Source exhausted and everything drained
    pub fn is_finished(&self) -> bool {
        self.exhausted && self.fill() == 0
    }

    pub fn fill(&self) -> usize {
        self.cons.occupied_len()
    }

    pub fn target(&self) -> usize {
        self.target
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    pub fn state(&self) -> JitterState {
        self.state
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }
}

#[inline]
fn align_down(bytes: usize, frame: usize) -> usize {
    bytes - bytes % frame
}
