//! Transport side: the pull trait and a clocked driver
//!
//! A network transport pulls one payload per cycle on its own clock. The
//! core only exposes [`StreamProvider`]; [`ClockedTransport`] drives a
//! provider the way a transport worker would, writing each payload to an
//! `io::Write` target.

use crate::error::{Error, Result};
use crate::playback::layout::StreamLayout;
use crate::playback::monitor::PullMonitor;
use nadr_common::config::TransportConfig;
use nadr_common::timing::{CycleCalculator, FramePacer};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Pull interface offered to the transport
pub trait StreamProvider {
    /// Exactly `bytes` bytes of audio or silence
    ///
    /// The slice borrows the provider and stays valid until the next call.
    /// Must not block.
    fn next_buffer(&mut self, bytes: usize) -> &[u8];

    /// The last buffer handed out is no longer read
    fn release(&mut self) {}
}

/// Per-format pacing for a clocked transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTiming {
    pub cycle: Duration,
    pub frames_per_second: u32,
    pub bytes_per_frame: usize,
}

impl TransportTiming {
    /// Cycle from the configured override or from MTU and byte rate
    pub fn for_layout(layout: &StreamLayout, config: &TransportConfig) -> Result<Self> {
        let format = layout
            .format
            .ok_or_else(|| Error::InvalidState("transport timing needs a configured format".to_string()))?;

        let cycle_us = match config.cycle_time_us {
            Some(us) => us,
            None => CycleCalculator::new(config.mtu).cycle_us(layout.bytes_per_second),
        };

        Ok(Self {
            cycle: Duration::from_micros(cycle_us),
            frames_per_second: format.frames_per_second(),
            bytes_per_frame: layout.bytes_per_frame,
        })
    }

    /// Largest single pull this timing produces
    pub fn max_pull_bytes(&self) -> usize {
        let frames = (self.frames_per_second as u128 * self.cycle.as_micros()).div_ceil(1_000_000);
        (frames as usize + 1) * self.bytes_per_frame
    }
}

/// Drives a [`StreamProvider`] from its own thread at a fixed cycle
pub struct ClockedTransport<P, W> {
    handle: Option<JoinHandle<Result<(P, W)>>>,
    stop: Arc<AtomicBool>,
}

impl<P, W> ClockedTransport<P, W>
where
    P: StreamProvider + Send + 'static,
    W: Write + Send + 'static,
{
    /// Start pulling immediately
    pub fn spawn(
        mut provider: P,
        mut writer: W,
        timing: TransportTiming,
        monitor: Option<Arc<PullMonitor>>,
    ) -> Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        info!(
            "Starting clocked transport: cycle={}µs, {} bytes/frame",
            timing.cycle.as_micros(),
            timing.bytes_per_frame
        );

        let handle = thread::Builder::new()
            .name("nadr-transport".to_string())
            .spawn(move || {
                let cycle_us = timing.cycle.as_micros() as u64;
                let mut pacer = FramePacer::new(timing.frames_per_second, timing.bytes_per_frame, cycle_us);
                let mut deadline = Instant::now();
                let mut cycles = 0u64;

                while !stop_flag.load(Ordering::Acquire) {
                    let bytes = pacer.next_bytes();
                    let buffer = provider.next_buffer(bytes);
                    if let Some(monitor) = &monitor {
                        monitor.record_pull();
                    }
                    writer.write_all(buffer)?;
                    cycles += 1;

                    deadline += timing.cycle;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else {
                        // Late: restart the schedule from now instead of bursting
                        deadline = now;
                    }
                }

                provider.release();
                writer.flush()?;
                debug!("Clocked transport stopped after {} cycles", cycles);
                Ok((provider, writer))
            })
            .map_err(|e| Error::Transport(format!("failed to spawn transport thread: {}", e)))?;

        Ok(Self {
            handle: Some(handle),
            stop,
        })
    }

    /// Stop pulling and hand back the provider and writer
    pub fn stop(mut self) -> Result<(P, W)> {
        self.stop.store(true, Ordering::Release);
        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::InvalidState("transport already stopped".to_string()))?;
        handle
            .join()
            .map_err(|_| Error::Transport("transport thread panicked".to_string()))?
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl<P, W> Drop for ClockedTransport<P, W> {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Transport thread panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::staging::SinkCapabilities;
    use nadr_common::config::BufferConfig;
    use nadr_common::{AudioFormat, S24Hint};

    struct Counting {
        calls: usize,
        buf: Vec<u8>,
    }

    impl StreamProvider for Counting {
        fn next_buffer(&mut self, bytes: usize) -> &[u8] {
            self.calls += 1;
            self.buf.resize(bytes, 0xAB);
            &self.buf
        }
    }

    fn cd_layout() -> StreamLayout {
        StreamLayout::for_format(
            AudioFormat::pcm(44_100, 16, 2),
            S24Hint::Unknown,
            &SinkCapabilities::default(),
            &BufferConfig::default(),
        )
        .unwrap()
        .0
    }

    #[test]
    fn test_timing_from_mtu() {
        let timing = TransportTiming::for_layout(&cd_layout(), &TransportConfig::default()).unwrap();
        assert_eq!(timing.cycle, Duration::from_micros(8367));
        assert_eq!(timing.bytes_per_frame, 4);
        assert!(timing.max_pull_bytes() >= 1476);
    }

    #[test]
    fn test_timing_override() {
        let config = TransportConfig {
            cycle_time_us: Some(2000),
            ..TransportConfig::default()
        };
        let timing = TransportTiming::for_layout(&cd_layout(), &config).unwrap();
        assert_eq!(timing.cycle, Duration::from_millis(2));
    }

    #[test]
    fn test_timing_requires_format() {
        let result = TransportTiming::for_layout(&StreamLayout::unconfigured(), &TransportConfig::default());
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_transport_writes_every_pull() {
        let timing = TransportTiming {
            cycle: Duration::from_millis(1),
            frames_per_second: 48_000,
            bytes_per_frame: 4,
        };
        let provider = Counting {
            calls: 0,
            buf: Vec::new(),
        };
        let transport = ClockedTransport::spawn(provider, Vec::new(), timing, None).unwrap();
        thread::sleep(Duration::from_millis(30));
        let (provider, written) = transport.stop().unwrap();

        assert!(provider.calls > 0);
        assert_eq!(written.len() % 4, 0);
        assert!(written.iter().all(|&b| b == 0xAB));
    }
}
