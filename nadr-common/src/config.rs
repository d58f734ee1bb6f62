//! Configuration loading and validation
//!
//! A single TOML file with four optional sections. Every field has a
//! built-in default, so a missing file or a missing section is not an error.
//!
//! ```toml
//! [buffer]
//! pcm_seconds = 1.0
//! dsd_seconds = 0.8
//!
//! [jitter]
//! compressed_ms = 200
//! uncompressed_ms = 100
//!
//! [transport]
//! mtu = 1500
//! zero_copy = true
//!
//! [logging]
//! level = "info"
//! ```
//!
//! # Path Resolution
//!
//! 1. Command-line argument (highest priority)
//! 2. `NADR_CONFIG` environment variable
//! 3. `<config_dir>/nadr/config.toml`
//! 4. Built-in defaults (no file)

use crate::format::AudioFormat;
use crate::params::{DSD_SILENCE, PCM_SILENCE};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "NADR_CONFIG";

/// Complete configuration file contents
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub buffer: BufferConfig,
    pub jitter: JitterConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

/// Ring sizing and prefill
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    /// Seconds of PCM audio the ring holds
    pub pcm_seconds: f64,
    /// Seconds of DSD audio the ring holds
    pub dsd_seconds: f64,
    /// Lower clamp on ring size before power-of-two rounding
    pub min_bytes: usize,
    /// Upper clamp on ring size before power-of-two rounding
    pub max_bytes: usize,
    pub prefill_ms_pcm: u32,
    /// Prefill for PCM at or below 48 kHz
    pub prefill_ms_pcm_low_rate: u32,
    pub prefill_ms_dsd: u32,
    pub min_prefill_bytes: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            pcm_seconds: 1.0,
            dsd_seconds: 0.8,
            min_bytes: 3_072_000,
            max_bytes: 16 * 1024 * 1024,
            prefill_ms_pcm: 50,
            prefill_ms_pcm_low_rate: 100,
            prefill_ms_dsd: 200,
            min_prefill_bytes: 1024,
        }
    }
}

impl BufferConfig {
    /// Ring size for a stream of `bytes_per_second`
    ///
    /// `bytes_per_second * seconds`, clamped to `[min_bytes, max_bytes]`,
    /// rounded up to the next power of two.
    pub fn ring_size(&self, format: &AudioFormat, bytes_per_second: u64) -> usize {
        let seconds = if format.is_dsd() {
            self.dsd_seconds
        } else {
            self.pcm_seconds
        };
        let raw = (bytes_per_second as f64 * seconds) as usize;
        raw.clamp(self.min_bytes, self.max_bytes).next_power_of_two()
    }

    /// Bytes the ring must hold before the first non-silent pull
    pub fn prefill_bytes(&self, format: &AudioFormat, bytes_per_second: u64) -> usize {
        let ms = if format.is_dsd() {
            self.prefill_ms_dsd
        } else if format.is_low_rate() {
            self.prefill_ms_pcm_low_rate
        } else {
            self.prefill_ms_pcm
        };
        let bytes = (bytes_per_second * ms as u64 / 1000) as usize;
        bytes.max(self.min_prefill_bytes)
    }

    /// Idle byte pattern for a format family
    pub fn silence_byte(format: &AudioFormat) -> u8 {
        if format.is_dsd() {
            DSD_SILENCE
        } else {
            PCM_SILENCE
        }
    }

    fn validate(&self) -> Result<()> {
        if !(self.pcm_seconds > 0.0) || !(self.dsd_seconds > 0.0) {
            return Err(Error::Config(
                "buffer seconds must be greater than zero".to_string(),
            ));
        }
        if self.min_bytes == 0 || self.min_bytes > self.max_bytes {
            return Err(Error::Config(format!(
                "buffer byte bounds invalid: min={} max={}",
                self.min_bytes, self.max_bytes
            )));
        }
        if self.max_bytes > isize::MAX as usize / 2 {
            return Err(Error::Config(format!(
                "buffer max_bytes too large: {}",
                self.max_bytes
            )));
        }
        Ok(())
    }
}

/// Jitter buffer targets and decode budget
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JitterConfig {
    /// Target fill for compressed sources (FLAC, ALAC, MP3)
    pub compressed_ms: u32,
    /// Target fill for uncompressed sources (WAV, AIFF)
    pub uncompressed_ms: u32,
    /// Extra target when the source is a network stream
    pub network_extra_ms: u32,
    /// Look-ahead queue capacity
    pub queue_ms: u32,
    /// Upper bound on decoder calls per scheduler cycle
    pub max_decode_calls: u32,
    /// Consecutive cycles without decode progress before a track fails
    pub max_stalled_cycles: u32,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            compressed_ms: 200,
            uncompressed_ms: 100,
            network_extra_ms: 100,
            queue_ms: 1000,
            max_decode_calls: 16,
            max_stalled_cycles: 200,
        }
    }
}

impl JitterConfig {
    /// Target fill in milliseconds for one track
    pub fn target_ms(&self, compressed: bool, network: bool) -> u32 {
        let base = if compressed {
            self.compressed_ms
        } else {
            self.uncompressed_ms
        };
        if network {
            base + self.network_extra_ms
        } else {
            base
        }
    }

    fn validate(&self) -> Result<()> {
        if self.queue_ms == 0 {
            return Err(Error::Config("jitter queue_ms must be non-zero".to_string()));
        }
        if self.max_decode_calls == 0 || self.max_stalled_cycles == 0 {
            return Err(Error::Config(
                "jitter decode budget must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transport cadence and handoff policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TransportConfig {
    pub mtu: u32,
    /// Fixed cycle time; computed from MTU and byte rate when absent
    pub cycle_time_us: Option<u64>,
    /// Hand out direct ring regions; false forces the copy path
    pub zero_copy: bool,
    /// Bound on the reconfiguration rendezvous
    pub reconfigure_timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            mtu: 1500,
            cycle_time_us: None,
            zero_copy: true,
            reconfigure_timeout_ms: 500,
        }
    }
}

impl TransportConfig {
    fn validate(&self) -> Result<()> {
        if self.mtu <= crate::params::TRANSPORT_OVERHEAD_BYTES {
            return Err(Error::Config(format!("transport mtu too small: {}", self.mtu)));
        }
        if self.cycle_time_us == Some(0) {
            return Err(Error::Config(
                "transport cycle_time_us must be non-zero".to_string(),
            ));
        }
        if self.reconfigure_timeout_ms == 0 {
            return Err(Error::Config(
                "transport reconfigure_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parse and validate TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Resolve the config path and load it, falling back to defaults
    ///
    /// An explicitly named file (CLI or environment) must exist and parse. The
    /// per-user default location is optional: when absent, built-in defaults
    /// are used.
    pub fn resolve(cli_path: Option<&Path>) -> Result<Self> {
        match ConfigSource::resolve(cli_path) {
            ConfigSource::Explicit(path) => Self::load(&path),
            ConfigSource::UserDefault(path) if path.exists() => Self::load(&path),
            ConfigSource::UserDefault(path) => {
                debug!("No config file at {}, using defaults", path.display());
                Ok(Self::default())
            }
            ConfigSource::Defaults => {
                warn!("Could not determine config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.buffer.validate()?;
        self.jitter.validate()?;
        self.transport.validate()?;
        Ok(())
    }
}

/// Where the configuration comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// CLI argument or environment variable
    Explicit(PathBuf),
    /// `<config_dir>/nadr/config.toml`
    UserDefault(PathBuf),
    /// No path could be determined
    Defaults,
}

impl ConfigSource {
    pub fn resolve(cli_path: Option<&Path>) -> Self {
        // Priority 1: Command-line argument
        if let Some(path) = cli_path {
            return ConfigSource::Explicit(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return ConfigSource::Explicit(PathBuf::from(path));
            }
        }

        // Priority 3: Per-user config directory
        match default_config_path() {
            Some(path) => ConfigSource::UserDefault(path),
            None => ConfigSource::Defaults,
        }
    }
}

/// `<config_dir>/nadr/config.toml` for the current platform
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("nadr").join("config.toml"))
}
