//! Consumer handoff: zero-copy or fallback copy
//!
//! Each transport pull gets exactly the requested byte count as one of:
//!
//! - **Zero-copy**: a slice pointing straight into ring memory, when the data
//!   is contiguous and zero-copy is enabled
//! - **Copied**: the data popped into a pinned scratch buffer, when it wraps
//!   or zero-copy is disabled
//! - **Silence**: the scratch buffer filled with the format's silence byte,
//!   during prefill, on underrun, or while the ring is being reconfigured
//!
//! Once the producer marks the end of its stream, prefill no longer applies
//! and a final tail shorter than the pull is copied out and padded with
//! silence.
//!
//! # Deferred release
//!
//! After a zero-copy pull the read cursor is *not* advanced: the transport may
//! still be reading that memory. The advance is applied at the start of the
//! next pull (or after [`HandoffConsumer::release`]). Borrowing enforces the
//! transport side of the contract: the returned slice borrows the consumer, so
//! the next pull cannot happen while it is still alive.
//!
//! The lifecycle is an explicit state machine driven by [`HandleState::step`]:
//!
//! ```text
//! Idle ──Issue──▶ HandleOutstanding ──Release──▶ PendingAdvance ──Apply──▶ Idle
//! ```
//!
//! While a handle is outstanding the gate's flag is set, so a reconfiguration
//! waits (bounded) instead of freeing memory the transport may still read.
//! A pending advance carries the generation it was issued under and is
//! dropped if the ring was cleared or resized in between.

use crate::audio::types::AlignedBuffer;
use crate::playback::ring_buffer::{RingConsumer, RingCounters};
use crate::playback::transport::StreamProvider;
use serde::Serialize;

/// Lifetime of the most recent zero-copy handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum HandleState {
    #[default]
    Idle,
    /// Transport may be reading `len` bytes at the read cursor
    HandleOutstanding { len: usize, generation: u64 },
    /// Transport is done; advance by `len` on the next pull
    PendingAdvance { len: usize, generation: u64 },
}

/// Inputs to the handle state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleEvent {
    /// A zero-copy region of `len` bytes was handed out
    Issue { len: usize, generation: u64 },
    /// The transport finished with the previous region
    Release,
    /// Start of a pull under `generation`; apply any pending advance
    Apply { generation: u64 },
}

/// Result of one state machine step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: HandleState,
    /// Bytes to advance the read cursor by now
    pub advance: usize,
}

impl HandleState {
    /// The single transition function for the handle lifecycle
    pub fn step(self, event: HandleEvent) -> Transition {
        use HandleEvent::*;
        use HandleState::*;

        let (next, advance) = match (self, event) {
            (Idle, Issue { len, generation }) => (HandleOutstanding { len, generation }, 0),
            (HandleOutstanding { len, generation }, Release) => {
                (PendingAdvance { len, generation }, 0)
            }
            (
                PendingAdvance { len, generation } | HandleOutstanding { len, generation },
                Apply { generation: current },
            ) => {
                // Contents from an older generation were discarded
                let advance = if generation == current { len } else { 0 };
                (Idle, advance)
            }
            (Idle, Release | Apply { .. }) => (Idle, 0),
            (PendingAdvance { len, generation }, Release) => {
                (PendingAdvance { len, generation }, 0)
            }
            // Issue always follows Apply; a stale state here is replaced
            (HandleOutstanding { .. } | PendingAdvance { .. }, Issue { len, generation }) => {
                (HandleOutstanding { len, generation }, 0)
            }
        };
        Transition { next, advance }
    }

    pub fn is_outstanding(&self) -> bool {
        matches!(self, HandleState::HandleOutstanding { .. })
    }
}

/// Why a pull was answered with silence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SilenceReason {
    /// Ring is being resized or cleared
    Reconfiguring,
    /// Waiting for the initial fill after configure/clear
    Prefill,
    /// Streaming, but fewer bytes available than requested
    Underrun,
    /// Source finished and everything was delivered
    Drained,
}

/// One pull's worth of audio
#[derive(Debug)]
pub enum Pull<'a> {
    ZeroCopy(&'a [u8]),
    Copied(&'a [u8]),
    Silence(&'a [u8], SilenceReason),
}

impl<'a> Pull<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        match *self {
            Pull::ZeroCopy(b) | Pull::Copied(b) | Pull::Silence(b, _) => b,
        }
    }

    pub fn is_silence(&self) -> bool {
        matches!(self, Pull::Silence(..))
    }
}

/// Transport-facing consumer
pub struct HandoffConsumer {
    rx: RingConsumer,
    /// Pinned fallback buffer; grows only when a larger pull size appears
    scratch: AlignedBuffer,
    state: HandleState,
    /// Streaming has started since the last generation change
    primed: bool,
    seen_generation: u64,
}

impl HandoffConsumer {
    /// Wrap the consumer half with a scratch sized for `max_pull` bytes
    pub fn new(rx: RingConsumer, max_pull: usize) -> Self {
        let seen_generation = rx.ring().gate().generation();
        let silence = rx.ring().silence_byte();
        Self {
            rx,
            scratch: AlignedBuffer::new(max_pull.max(64), silence),
            state: HandleState::Idle,
            primed: false,
            seen_generation,
        }
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    /// Streaming (past prefill) under the current generation
    pub fn is_primed(&self) -> bool {
        self.primed
    }

    /// Declare the previous zero-copy region no longer in use
    ///
    /// Called implicitly at the start of every pull. Call it explicitly when
    /// the transport stops pulling so reconfiguration is not held up.
    pub fn release(&mut self) {
        self.state = self.state.step(HandleEvent::Release).next;
        if !self.state.is_outstanding() {
            self.rx.ring().gate().clear_handle_outstanding();
        }
    }

    /// Supply exactly `bytes` bytes of audio or silence
    ///
    /// Never blocks. The returned slice stays valid until the next call.
    pub fn pull(&mut self, bytes: usize) -> Pull<'_> {
        self.release();
        if bytes == 0 {
            return Pull::Copied(&[]);
        }

        if bytes > self.scratch.len() {
            // New, larger transport payload; happens once per format
            self.scratch = AlignedBuffer::new(bytes.next_power_of_two(), self.rx.ring().silence_byte());
        }

        RingCounters::bump(&self.rx.ring().counters().pulls);

        let Some(mut session) = self.rx.session() else {
            let counters = self.rx.ring().counters();
            RingCounters::bump(&counters.silence_pulls);
            RingCounters::bump(&counters.reconfigure_pulls);
            let byte = self.rx.ring().silence_byte();
            return silence(&mut self.scratch, bytes, byte, SilenceReason::Reconfiguring);
        };

        let generation = session.generation();
        let transition = self.state.step(HandleEvent::Apply { generation });
        self.state = transition.next;
        if transition.advance > 0 {
            session.advance_read(transition.advance);
        }

        if generation != self.seen_generation {
            self.seen_generation = generation;
            self.primed = false;
        }

        let counters = session.counters();
        let layout = *session.layout();
        // Acquire on the flag makes the producer's last push visible
        let ending = session.is_end_of_stream();
        let available = session.available();

        if !self.primed {
            if available < layout.prefill_bytes.max(bytes) && !(ending && available > 0) {
                RingCounters::bump(&counters.silence_pulls);
                return silence(&mut self.scratch, bytes, layout.silence, SilenceReason::Prefill);
            }
            self.primed = true;
        }

        if available < bytes {
            if ending && available > 0 {
                let out = &mut self.scratch.as_mut_slice()[..bytes];
                let read = session.pop(&mut out[..available]);
                out[read..].fill(layout.silence);
                RingCounters::bump(&counters.copy_pulls);
                RingCounters::bump(&counters.tail_pulls);
                return Pull::Copied(&self.scratch.as_slice()[..bytes]);
            }
            RingCounters::bump(&counters.silence_pulls);
            let reason = if ending {
                SilenceReason::Drained
            } else {
                RingCounters::bump(&counters.underruns);
                SilenceReason::Underrun
            };
            return silence(&mut self.scratch, bytes, layout.silence, reason);
        }

        if session.zero_copy_enabled() {
            if let Some(ptr) = session.direct_read_ptr(bytes) {
                // Flag before the access ends so a reconfigurer cannot slip in
                session.mark_handle_outstanding();
                self.state = self
                    .state
                    .step(HandleEvent::Issue {
                        len: bytes,
                        generation,
                    })
                    .next;
                RingCounters::bump(&counters.zero_copy_pulls);
                drop(session);

                // SAFETY: `bytes` live, contiguous bytes at the read cursor.
                // The producer cannot overwrite them until read_pos moves,
                // which only happens on a later call taking &mut self; the
                // outstanding flag keeps reconfiguration from freeing them.
                let region = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), bytes) };
                return Pull::ZeroCopy(region);
            }
        }

        let out = &mut self.scratch.as_mut_slice()[..bytes];
        let read = session.pop(out);
        debug_assert_eq!(read, bytes);
        RingCounters::bump(&counters.copy_pulls);
        Pull::Copied(&self.scratch.as_slice()[..bytes])
    }
}

fn silence(scratch: &mut AlignedBuffer, bytes: usize, byte: u8, reason: SilenceReason) -> Pull<'_> {
    let out = &mut scratch.as_mut_slice()[..bytes];
    out.fill(byte);
    Pull::Silence(out, reason)
}

impl StreamProvider for HandoffConsumer {
    fn next_buffer(&mut self, bytes: usize) -> &[u8] {
        self.pull(bytes).bytes()
    }

    fn release(&mut self) {
        HandoffConsumer::release(self);
    }
}

impl Drop for HandoffConsumer {
    fn drop(&mut self) {
        self.rx.ring().gate().clear_handle_outstanding();
    }
}
