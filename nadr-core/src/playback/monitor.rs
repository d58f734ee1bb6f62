//! Transport pull timing monitor
//!
//! Tracks every transport pull to detect irregular pull intervals and reports
//! ring underruns. The pull path only touches atomics; all logging happens in
//! a separate monitoring task on the tokio runtime.
//!
//! **Dynamic calibration:** the expected interval starts from the configured
//! cycle time and is replaced by the median of the first measured intervals,
//! since the real pacing of a transport rarely matches the nominal value.

use crate::playback::ring_buffer::RingControl;
use nadr_common::params::{MONITOR_CALIBRATION_SAMPLES, MONITOR_TOLERANCE_FRACTION};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Pulls collected before calibration stops sampling
const CALIBRATION_WINDOW: u64 = 2 * MONITOR_CALIBRATION_SAMPLES as u64;

pub struct PullMonitor {
    /// Monotonic reference for pull timestamps
    start_time: Instant,
    last_pull_ns: AtomicU64,
    pull_count: AtomicU64,
    irregular_pulls: AtomicU64,
    expected_cycle_ns: AtomicU64,
    jitter_tolerance_ns: AtomicU64,
    /// Filled from the pull path with try_lock, drained by the monitor task
    first_intervals: Mutex<Vec<u64>>,
    calibrated: AtomicBool,
    ring: RingControl,
}

impl PullMonitor {
    pub fn new(expected_cycle: Duration, ring: RingControl) -> Self {
        let expected_cycle_ns = expected_cycle.as_nanos() as u64;
        let jitter_tolerance_ns = (expected_cycle_ns as f64 * MONITOR_TOLERANCE_FRACTION) as u64;

        info!(
            "PullMonitor initialized: expected_interval={:.3}ms, tolerance={:.3}ms (calibrating...)",
            expected_cycle_ns as f64 / 1_000_000.0,
            jitter_tolerance_ns as f64 / 1_000_000.0
        );

        Self {
            start_time: Instant::now(),
            last_pull_ns: AtomicU64::new(0),
            pull_count: AtomicU64::new(0),
            irregular_pulls: AtomicU64::new(0),
            expected_cycle_ns: AtomicU64::new(expected_cycle_ns),
            jitter_tolerance_ns: AtomicU64::new(jitter_tolerance_ns),
            first_intervals: Mutex::new(Vec::with_capacity(CALIBRATION_WINDOW as usize)),
            calibrated: AtomicBool::new(false),
            ring,
        }
    }

    /// Record one pull (call from the transport thread)
    ///
    /// Atomics only, plus a try_lock during calibration. Never logs.
    pub fn record_pull(&self) {
        // +1 keeps a pull at t=0 distinguishable from "no previous pull"
        let now_ns = self.start_time.elapsed().as_nanos() as u64 + 1;
        let last_ns = self.last_pull_ns.swap(now_ns, Ordering::Relaxed);
        let count = self.pull_count.fetch_add(1, Ordering::Relaxed);

        if last_ns == 0 {
            return;
        }

        let interval_ns = now_ns.saturating_sub(last_ns);

        if !self.calibrated.load(Ordering::Relaxed) && count <= CALIBRATION_WINDOW {
            if let Ok(mut samples) = self.first_intervals.try_lock() {
                samples.push(interval_ns);
            }
        }

        let expected = self.expected_cycle_ns.load(Ordering::Relaxed);
        let tolerance = self.jitter_tolerance_ns.load(Ordering::Relaxed);
        if interval_ns.abs_diff(expected) > tolerance {
            self.irregular_pulls.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> PullStats {
        let ring = self.ring.stats();
        PullStats {
            pull_count: self.pull_count.load(Ordering::Relaxed),
            underrun_count: ring.counters.underruns,
            irregular_pulls: self.irregular_pulls.load(Ordering::Relaxed),
            expected_interval_us: self.expected_cycle_ns.load(Ordering::Relaxed) / 1_000,
            calibrated: self.calibrated.load(Ordering::Relaxed),
            ring_fill_percent: ring.fill_percent(),
        }
    }

    /// Finalize calibration from the median interval once enough samples exist
    ///
    /// Called by the monitoring task, never from the pull path.
    pub fn check_calibration(&self) {
        if self.calibrated.load(Ordering::Relaxed) {
            return;
        }

        let Ok(samples) = self.first_intervals.lock() else {
            return;
        };
        if samples.len() < MONITOR_CALIBRATION_SAMPLES {
            return;
        }

        let mut sorted = samples.clone();
        drop(samples);
        sorted.sort_unstable();
        let median_ns = sorted[sorted.len() / 2];
        let jitter_tolerance_ns = (median_ns as f64 * MONITOR_TOLERANCE_FRACTION) as u64;

        self.expected_cycle_ns.store(median_ns, Ordering::Relaxed);
        self.jitter_tolerance_ns.store(jitter_tolerance_ns, Ordering::Relaxed);
        self.calibrated.store(true, Ordering::Relaxed);

        info!(
            "PullMonitor calibration complete: measured_interval={:.3}ms (median of {} samples), tolerance={:.3}ms",
            median_ns as f64 / 1_000_000.0,
            sorted.len(),
            jitter_tolerance_ns as f64 / 1_000_000.0
        );
    }

    /// Spawn the task that polls stats and logs changes
    ///
    /// Polls every 100ms. Returns the shutdown flag (set to true to stop).
    pub fn spawn_monitoring_task(self: Arc<Self>, rt_handle: tokio::runtime::Handle) -> Arc<AtomicBool> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&shutdown);
        let monitor = self;

        rt_handle.spawn(async move {
            let mut last_pull_count = 0u64;
            let mut logged_underruns = 0u64;
            let mut logged_irregular = 0u64;
            let mut last_health_log = Instant::now();

            debug!("PullMonitor: monitoring task started");

            while !stop_flag.load(Ordering::Relaxed) {
                tokio::time::sleep(Duration::from_millis(100)).await;

                let stats = monitor.stats();

                if !stats.calibrated {
                    monitor.check_calibration();
                }

                if stats.underrun_count > logged_underruns {
                    warn!(
                        "Ring underrun: {} total (+{} since last check), ring {:.1}% full",
                        stats.underrun_count,
                        stats.underrun_count - logged_underruns,
                        stats.ring_fill_percent
                    );
                    logged_underruns = stats.underrun_count;
                }

                if stats.irregular_pulls > logged_irregular {
                    let irregular_delta = stats.irregular_pulls - logged_irregular;
                    if irregular_delta >= 100 || logged_irregular == 0 {
                        warn!(
                            "Irregular pull intervals: {} total (+{}), {} pulls ({:.1}%)",
                            stats.irregular_pulls,
                            irregular_delta,
                            stats.pull_count,
                            stats.irregular_percent()
                        );
                        logged_irregular = stats.irregular_pulls;
                    } else {
                        trace!("Irregular pull intervals: +{}", irregular_delta);
                    }
                }

                if stats.pull_count > last_pull_count && last_health_log.elapsed() >= Duration::from_secs(30) {
                    debug!(
                        "Transport health: {} pulls, {} underruns, {} irregular intervals ({:.1}%)",
                        stats.pull_count,
                        stats.underrun_count,
                        stats.irregular_pulls,
                        stats.irregular_percent()
                    );
                    last_health_log = Instant::now();
                }

                last_pull_count = stats.pull_count;
            }

            info!("PullMonitor: monitoring task stopped");
        });

        shutdown
    }
}

/// Pull statistics snapshot
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PullStats {
    pub pull_count: u64,
    pub underrun_count: u64,
    pub irregular_pulls: u64,
    pub expected_interval_us: u64,
    pub calibrated: bool,
    pub ring_fill_percent: f32,
}

impl PullStats {
    pub fn irregular_percent(&self) -> f64 {
        if self.pull_count == 0 {
            return 0.0;
        }
        self.irregular_pulls as f64 / self.pull_count as f64 * 100.0
    }
}
