//! Delivery engine - session wiring and track lifecycle
//!
//! **Responsibilities:**
//! - Own the ring shared by producer, consumer, and reconfiguration
//! - Hand out the producer ([`RingSink`]) and consumer ([`HandoffConsumer`])
//!   halves, once each
//! - Reconfigure on format change, clear on stop/seek
//! - Run tracks on a scheduler thread ([`Player`])

use crate::audio::decoder::Decoder;
use crate::audio::staging::SinkCapabilities;
use crate::error::{Error, Result};
use crate::playback::handoff::HandoffConsumer;
use crate::playback::layout::StreamLayout;
use crate::playback::ring_buffer::{ByteRing, RingBufferStats, RingControl};
use crate::playback::scheduler::{Outcome, PlaybackControl, Scheduler, SchedulerStats};
use crate::playback::sink::RingSink;
use crate::playback::transport::TransportTiming;
use nadr_common::{AudioFormat, Config, S24Hint};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Ring size before the first configure
const INITIAL_RING_BYTES: usize = 4096;

/// Engine statistics snapshot
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub ring: RingBufferStats,
    pub fill_percent: f32,
    pub layout: Option<StreamLayout>,
    pub zero_copy: bool,
}

/// One delivery session
pub struct Engine {
    config: Config,
    caps: SinkCapabilities,
    control: RingControl,
    producer: Mutex<Option<RingSink>>,
    consumer: Mutex<Option<HandoffConsumer>>,
    timeout: Duration,
}

impl Engine {
    pub fn new(config: Config, caps: SinkCapabilities) -> Result<Self> {
        config.validate()?;
        let timeout = Duration::from_millis(config.transport.reconfigure_timeout_ms);

        let (tx, rx, control) = ByteRing::new(INITIAL_RING_BYTES)?.split();
        control.set_zero_copy(config.transport.zero_copy);

        let producer = RingSink::new(tx, control.clone(), timeout);
        let consumer = HandoffConsumer::new(rx, config.transport.mtu as usize);

        info!(
            "Engine created: zero_copy={}, reconfigure_timeout={}ms",
            config.transport.zero_copy, config.transport.reconfigure_timeout_ms
        );

        Ok(Self {
            config,
            caps,
            control,
            producer: Mutex::new(Some(producer)),
            consumer: Mutex::new(Some(consumer)),
            timeout,
        })
    }

    /// Install a new stream format
    ///
    /// Waits (bounded) for in-flight accesses and any outstanding zero-copy
    /// handle, then resizes, fills silence, and bumps the generation. On
    /// timeout nothing is changed.
    pub fn configure(&self, format: AudioFormat, hint: S24Hint) -> Result<StreamLayout> {
        let (layout, size) = StreamLayout::for_format(format, hint, &self.caps, &self.config.buffer)?;
        let generation = self.control.reconfigure(size, layout, self.timeout)?;
        info!(
            "Configured {} as {:?}: ring={} bytes, generation {}",
            format, layout.plan, size, generation
        );
        Ok(layout)
    }

    /// Drop buffered audio (stop/seek)
    pub fn clear(&self) -> Result<u64> {
        self.control.clear(self.timeout)
    }

    /// Switch between zero-copy handles and always-copy
    pub fn set_zero_copy(&self, enabled: bool) {
        debug!("Zero-copy {}", if enabled { "enabled" } else { "disabled" });
        self.control.set_zero_copy(enabled);
    }

    /// Producer half; available once
    pub fn producer(&self) -> Result<RingSink> {
        take_once(&self.producer, "producer")
    }

    /// Consumer half; available once
    pub fn consumer(&self) -> Result<HandoffConsumer> {
        take_once(&self.consumer, "consumer")
    }

    pub fn control(&self) -> &RingControl {
        &self.control
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn layout(&self) -> Option<StreamLayout> {
        self.control.layout()
    }

    /// Transport pacing for the current layout
    pub fn transport_timing(&self) -> Result<TransportTiming> {
        let layout = self
            .layout()
            .ok_or_else(|| Error::InvalidState("ring is being reconfigured".to_string()))?;
        TransportTiming::for_layout(&layout, &self.config.transport)
    }

    pub fn stats(&self) -> EngineStats {
        let ring = self.control.stats();
        EngineStats {
            ring,
            fill_percent: ring.fill_percent(),
            layout: self.layout(),
            zero_copy: self.control.ring().zero_copy_enabled(),
        }
    }

    /// End the session: producers get `Delivery::Stop`
    pub fn shutdown(&self) {
        info!("Engine shutting down");
        self.control.close();
    }
}

fn take_once<T>(slot: &Mutex<Option<T>>, what: &str) -> Result<T> {
    slot.lock()
        .map_err(|_| Error::InvalidState(format!("{} lock poisoned", what)))?
        .take()
        .ok_or_else(|| Error::InvalidState(format!("{} already taken", what)))
}

type TrackThread = JoinHandle<(RingSink, Result<(Outcome, SchedulerStats)>)>;

/// Runs tracks one at a time on a scheduler thread
pub struct Player {
    engine: Arc<Engine>,
    control: Arc<PlaybackControl>,
    sink: Option<RingSink>,
    current: Option<TrackThread>,
    format: Option<AudioFormat>,
    period: Option<Duration>,
}

impl Player {
    pub fn new(engine: Arc<Engine>) -> Result<Self> {
        let sink = engine.producer()?;
        Ok(Self {
            engine,
            control: Arc::new(PlaybackControl::new()),
            sink: Some(sink),
            current: None,
            format: None,
            period: None,
        })
    }

    /// Override the scheduler period (tests)
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = Some(period);
        self
    }

    /// Start a track
    ///
    /// Reconfigures when the format differs from the previous track;
    /// otherwise the ring keeps playing and only the alignment hint changes.
    pub fn play<D: Decoder + 'static>(&mut self, decoder: D) -> Result<()> {
        if self.current.is_some() {
            return Err(Error::InvalidState("a track is already playing".to_string()));
        }
        let mut sink = self
            .sink
            .take()
            .ok_or_else(|| Error::InvalidState("producer unavailable".to_string()))?;

        let info = decoder.track_info().clone();
        let result = if self.format != Some(info.format) {
            self.engine.configure(info.format, info.s24_hint).map(|_| ())
        } else {
            sink.set_s24_hint(info.s24_hint);
            Ok(())
        };
        if let Err(e) = result {
            self.sink = Some(sink);
            return Err(e);
        }
        self.format = Some(info.format);
        self.control.reset_stop();

        info!("Playing track: {}", info.format);
        let control = Arc::clone(&self.control);
        let jitter = self.engine.config().jitter.clone();
        let period = self.period;
        let handle = thread::Builder::new()
            .name("nadr-scheduler".to_string())
            .spawn(move || {
                let mut scheduler = Scheduler::new(decoder, sink, &jitter, &control);
                if let Some(period) = period {
                    scheduler = scheduler.with_period(period);
                }
                let outcome = scheduler.run().map(|o| (o, scheduler.stats()));
                let (_, sink) = scheduler.into_parts();
                (sink, outcome)
            })
            .map_err(|e| Error::InvalidState(format!("failed to spawn scheduler: {}", e)))?;

        self.current = Some(handle);
        Ok(())
    }

    /// Wait for the current track to end
    pub fn wait(&mut self) -> Result<(Outcome, SchedulerStats)> {
        let handle = self
            .current
            .take()
            .ok_or_else(|| Error::InvalidState("no track playing".to_string()))?;
        let (sink, outcome) = handle
            .join()
            .map_err(|_| Error::InvalidState("scheduler thread panicked".to_string()))?;
        self.sink = Some(sink);
        if let Err(e) = &outcome {
            warn!("Track ended with error: {}", e);
        }
        outcome
    }

    /// Stop the current track and drop buffered audio
    pub fn stop(&mut self) -> Result<(Outcome, SchedulerStats)> {
        self.control.request_stop();
        let outcome = self.wait()?;
        self.engine.clear()?;
        Ok(outcome)
    }

    pub fn seek(&self, seconds: f64) {
        self.control.request_seek(seconds);
    }

    /// Stop/seek flags for use from other threads
    pub fn playback_control(&self) -> Arc<PlaybackControl> {
        Arc::clone(&self.control)
    }

    pub fn is_playing(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if self.current.is_some() {
            self.control.request_stop();
            if let Err(e) = self.wait() {
                debug!("Player dropped during track: {}", e);
            }
        }
    }
}
