//! # nadr Common Library
//!
//! Shared definitions for the nadr delivery core:
//! - Stream format model
//! - Fixed tuning constants
//! - Chunk and transport cadence calculations
//! - TOML configuration loading

pub mod config;
pub mod error;
pub mod format;
pub mod params;
pub mod timing;

pub use config::Config;
pub use error::{Error, Result};
pub use format::{AudioFormat, DsdBitOrder, S24Hint, SampleKind};
