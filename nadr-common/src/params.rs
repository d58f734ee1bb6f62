//! Fixed tuning constants
//!
//! Values that are part of the delivery contract rather than user tuning.
//! User-adjustable defaults live in [`crate::config`]; everything here is
//! compiled in.

/// Scratch buffer size for each staging converter family
///
/// One buffer per family (24-bit pack, 16→32, DSD). Allocated once, reused on
/// every call, never resized on the hot path.
pub const STAGING_BUFFER_BYTES: usize = 64 * 1024;

/// Alignment of ring and staging storage
pub const CACHE_LINE: usize = 64;

/// Copies larger than this use the general bulk copy instead of the
/// fixed-cost block loop
pub const BULK_COPY_THRESHOLD: usize = 64 * 1024;

/// Block size of the fixed-cost copy main loop
pub const COPY_BLOCK: usize = 128;

/// Quantized scheduler chunk sizes, in samples per channel
///
/// PCM tiers by rate; DSD uses a single size expressed in one-bit samples.
pub const PCM_CHUNK_LOW: usize = 2048;
pub const PCM_CHUNK_MID: usize = 4096;
pub const PCM_CHUNK_HIGH: usize = 8192;
pub const DSD_CHUNK_SAMPLES: usize = 32_768;

/// Upper rate bounds for the PCM chunk tiers
pub const PCM_LOW_RATE_MAX: u32 = 48_000;
pub const PCM_MID_RATE_MAX: u32 = 96_000;

/// Silence byte written for PCM streams
pub const PCM_SILENCE: u8 = 0x00;

/// DSD idle pattern (alternating bits, zero DC)
pub const DSD_SILENCE: u8 = 0x69;

/// Number of 32-bit containers inspected when detecting 24-bit alignment
pub const S24_DETECT_SAMPLES: usize = 32;

/// Samples after which an undecided 24-bit alignment defaults to low-aligned
///
/// Roughly one second of audio at 48 kHz.
pub const S24_DEFER_SAMPLES: usize = 48_000;

/// Protocol overhead subtracted from the MTU when sizing a transport cycle
pub const TRANSPORT_OVERHEAD_BYTES: u32 = 24;

/// Transport cycle bounds in microseconds
pub const MIN_CYCLE_US: u64 = 100;
pub const MAX_CYCLE_US: u64 = 50_000;

/// Number of pull intervals sampled before the pull monitor calibrates
pub const MONITOR_CALIBRATION_SAMPLES: usize = 50;

/// Irregular pull tolerance as a fraction of the calibrated interval
pub const MONITOR_TOLERANCE_FRACTION: f64 = 0.20;
