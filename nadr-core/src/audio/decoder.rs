//! Decoder interface and a symphonia-backed file decoder
//!
//! The delivery core pulls decoded audio in the format reported by
//! [`Decoder::track_info`]: interleaved little-endian PCM (16-bit samples in
//! 2-byte containers, 24/32-bit samples in 4-byte containers) or planar DSD
//! blocks of exactly one scheduler chunk.

use crate::audio::types::{DecodeStatus, TrackInfo};
use crate::error::{Error, Result};
use nadr_common::{AudioFormat, S24Hint};
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{self, CodecType, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

/// Pull-based decoder feeding the jitter buffer
pub trait Decoder: Send {
    fn track_info(&self) -> &TrackInfo;

    /// Write whole frames into `out`
    ///
    /// Returns `Frames(bytes)` (0 = no progress), `WouldBlock` when the
    /// source is briefly empty, or `EndOfStream`.
    fn decode(&mut self, out: &mut [u8]) -> Result<DecodeStatus>;

    /// Reposition to `seconds` from the start of the track
    fn seek(&mut self, seconds: f64) -> Result<()>;
}

impl<D: Decoder + ?Sized> Decoder for Box<D> {
    fn track_info(&self) -> &TrackInfo {
        (**self).track_info()
    }

    fn decode(&mut self, out: &mut [u8]) -> Result<DecodeStatus> {
        (**self).decode(out)
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        (**self).seek(seconds)
    }
}

/// Streaming file decoder using symphonia
///
/// Decodes one packet at a time; converted bytes not yet handed out are held
/// until the next call.
pub struct FileDecoder {
    path: PathBuf,
    info: TrackInfo,
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn codecs::Decoder>,
    track_id: u32,
    /// Reused conversion buffer, regrown only for larger packets
    samples: Option<SampleBuffer<i32>>,
    pending: Vec<u8>,
    pending_pos: usize,
    /// Bytes still to drop after a seek landed before the target
    skip_bytes: usize,
    finished: bool,
}

impl FileDecoder {
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening file decoder: {}", path.display());

        let file = File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open file {}: {}", path.display(), e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;
        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;
        let bit_depth = match params.bits_per_sample.unwrap_or(16) {
            0..=16 => 16,
            17..=24 => 24,
            _ => 32,
        };

        let format = AudioFormat::pcm(sample_rate, bit_depth, channels).with_compressed(!is_pcm_codec(params.codec));
        let mut info = TrackInfo::new(format);
        // Samples are widened to i32 full scale: 24-bit content sits in bytes 1..4
        if bit_depth == 24 {
            info.s24_hint = S24Hint::HighAligned;
        }
        info.duration_secs = params.n_frames.map(|n| n as f64 / sample_rate as f64);

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        debug!("File decoder ready: {} ({})", path.display(), format);

        Ok(Self {
            path: path.to_path_buf(),
            info,
            reader,
            decoder,
            track_id,
            samples: None,
            pending: Vec::new(),
            pending_pos: 0,
            skip_bytes: 0,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the next packet of this track into `pending`
    ///
    /// Returns false at end of stream.
    fn refill(&mut self) -> Result<bool> {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(Error::Decode(format!("Error reading packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error in {}: {}", self.path.display(), e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            };

            let needed = decoded.capacity() as u64;
            let spec = *decoded.spec();
            let fits = self
                .samples
                .as_ref()
                .is_some_and(|buf| buf.capacity() as u64 >= needed * spec.channels.count() as u64);
            if !fits {
                self.samples = Some(SampleBuffer::<i32>::new(needed, spec));
            }
            let Some(samples) = self.samples.as_mut() else {
                continue;
            };
            samples.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending_pos = 0;
            if self.info.format.bit_depth == 16 {
                for s in samples.samples() {
                    self.pending.extend_from_slice(&((*s >> 16) as i16).to_le_bytes());
                }
            } else {
                for s in samples.samples() {
                    self.pending.extend_from_slice(&s.to_le_bytes());
                }
            }

            let skip = self.skip_bytes.min(self.pending.len());
            self.pending_pos = skip;
            self.skip_bytes -= skip;

            if self.pending_pos < self.pending.len() {
                return Ok(true);
            }
        }
    }
}

impl Decoder for FileDecoder {
    fn track_info(&self) -> &TrackInfo {
        &self.info
    }

    fn decode(&mut self, out: &mut [u8]) -> Result<DecodeStatus> {
        let frame = self.info.format.input_bytes_per_frame();
        if self.pending_pos >= self.pending.len() {
            if self.finished || !self.refill()? {
                self.finished = true;
                return Ok(DecodeStatus::EndOfStream);
            }
        }

        let remaining = &self.pending[self.pending_pos..];
        let n = remaining.len().min(out.len());
        let n = n - n % frame;
        out[..n].copy_from_slice(&remaining[..n]);
        self.pending_pos += n;
        Ok(DecodeStatus::Frames(n))
    }

    fn seek(&mut self, seconds: f64) -> Result<()> {
        let seek_to = SeekTo::Time {
            time: Time::from(seconds.max(0.0)),
            track_id: Some(self.track_id),
        };
        let seeked = self
            .reader
            .seek(SeekMode::Accurate, seek_to)
            .map_err(|e| Error::Decode(format!("Failed to seek to {:.3}s: {}", seconds, e)))?;
        self.decoder.reset();
        self.pending.clear();
        self.pending_pos = 0;
        // The reader may land on an earlier packet boundary
        let early_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.skip_bytes = early_frames as usize * self.info.format.input_bytes_per_frame();
        self.finished = false;
        debug!("File decoder seeked to {:.3}s", seconds);
        Ok(())
    }
}

fn is_pcm_codec(codec: CodecType) -> bool {
    [
        codecs::CODEC_TYPE_PCM_S16LE,
        codecs::CODEC_TYPE_PCM_S16BE,
        codecs::CODEC_TYPE_PCM_S24LE,
        codecs::CODEC_TYPE_PCM_S24BE,
        codecs::CODEC_TYPE_PCM_S32LE,
        codecs::CODEC_TYPE_PCM_S32BE,
        codecs::CODEC_TYPE_PCM_F32LE,
        codecs::CODEC_TYPE_PCM_F64LE,
        codecs::CODEC_TYPE_PCM_U8,
        codecs::CODEC_TYPE_PCM_S8,
    ]
    .contains(&codec)
}
