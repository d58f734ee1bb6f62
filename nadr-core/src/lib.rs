//! # nadr delivery core (nadr-core)
//!
//! Real-time audio delivery between a bursty decoder and a transport that
//! pulls fixed-size buffers on a strict clock.
//!
//! **Data flow:**
//!
//! ```text
//! Decoder → JitterBuffer → Scheduler → RingSink (staging) → ByteRing
//!                                                             ↓
//!                              Transport ← HandoffConsumer (zero-copy / copy / silence)
//! ```
//!
//! The hot path never blocks, allocates, or logs; counters owned by the ring
//! are reported by [`playback::PullMonitor`] on a cold path.

pub mod audio;
pub mod error;
pub mod playback;

pub use error::{Error, Result};
pub use playback::{Engine, Player};
