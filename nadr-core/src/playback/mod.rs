//! Delivery pipeline: ring, handoff, jitter buffer, scheduler, transport

pub mod engine;
pub mod gate;
pub mod handoff;
pub mod jitter;
pub mod layout;
pub mod monitor;
pub mod ring_buffer;
pub mod scheduler;
pub mod sink;
pub mod transport;

pub use engine::{Engine, EngineStats, Player};
pub use handoff::{HandoffConsumer, Pull, SilenceReason};
pub use layout::StreamLayout;
pub use monitor::PullMonitor;
pub use ring_buffer::{ByteRing, RingBufferStats, RingConsumer, RingControl, RingProducer};
pub use scheduler::{Outcome, PlaybackControl, Scheduler};
pub use sink::{ChunkSink, Delivery, RingSink};
pub use transport::{ClockedTransport, StreamProvider, TransportTiming};
