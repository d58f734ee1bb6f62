//! Audio data path: copy primitive, staging converters, decoders

pub mod copy;
pub mod decoder;
pub mod staging;
pub mod tone;
pub mod types;

pub use copy::copy;
pub use decoder::{Decoder, FileDecoder};
pub use tone::ToneDecoder;
pub use types::{AlignedBuffer, DecodeStatus, TrackInfo};
