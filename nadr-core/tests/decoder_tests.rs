//! File decoder tests against generated WAV fixtures

mod helpers;

use helpers::{write_24bit_wav, write_ramp_wav};
use nadr_common::S24Hint;
use nadr_core::audio::{DecodeStatus, Decoder, FileDecoder};
use tempfile::TempDir;

fn decode_to_end(decoder: &mut FileDecoder, chunk: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = vec![0u8; chunk];
    loop {
        match decoder.decode(&mut buf).unwrap() {
            DecodeStatus::Frames(n) => out.extend_from_slice(&buf[..n]),
            DecodeStatus::EndOfStream => return out,
            DecodeStatus::WouldBlock => {}
        }
    }
}

#[test]
fn test_wav_16bit_format_and_content() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ramp.wav");
    write_ramp_wav(&path, 44_100, 10_000).unwrap();

    let mut decoder = FileDecoder::open(&path).unwrap();
    let info = decoder.track_info().clone();
    assert_eq!(info.format.sample_rate, 44_100);
    assert_eq!(info.format.channels, 2);
    assert_eq!(info.format.bit_depth, 16);
    assert!(!info.format.compressed);
    assert_eq!(info.s24_hint, S24Hint::Unknown);

    // Odd buffer size: output is still whole frames
    let bytes = decode_to_end(&mut decoder, 1001);
    assert_eq!(bytes.len(), 10_000 * 4);

    for (i, frame) in bytes.chunks_exact(4).enumerate() {
        let left = i16::from_le_bytes([frame[0], frame[1]]);
        let right = i16::from_le_bytes([frame[2], frame[3]]);
        assert_eq!(left, i as i16, "frame {}", i);
        assert_eq!(right, -(i as i16));
    }

    // End of stream is sticky
    let mut buf = [0u8; 64];
    assert_eq!(decoder.decode(&mut buf).unwrap(), DecodeStatus::EndOfStream);
}

#[test]
fn test_wav_24bit_is_high_aligned() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("s24.wav");
    write_24bit_wav(&path, 96_000, 2000, 0x123456).unwrap();

    let mut decoder = FileDecoder::open(&path).unwrap();
    assert_eq!(decoder.track_info().format.bit_depth, 24);
    assert_eq!(decoder.track_info().s24_hint, S24Hint::HighAligned);

    let bytes = decode_to_end(&mut decoder, 4096);
    assert_eq!(bytes.len(), 2000 * 8);
    // Containers hold the sample in bytes 1..4
    assert_eq!(&bytes[..4], &[0x00, 0x56, 0x34, 0x12]);
}

#[test]
fn test_seek_repositions() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ramp.wav");
    write_ramp_wav(&path, 44_100, 44_100).unwrap();

    let mut decoder = FileDecoder::open(&path).unwrap();
    let mut buf = vec![0u8; 4096];
    decoder.decode(&mut buf).unwrap();

    decoder.seek(0.5).unwrap();
    let rest = decode_to_end(&mut decoder, 4096);
    assert_eq!(rest.len(), 22_050 * 4);
    assert_eq!(i16::from_le_bytes([rest[0], rest[1]]), 22_050);
}

#[test]
fn test_seek_after_end_restarts_decoding() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ramp.wav");
    write_ramp_wav(&path, 48_000, 4800).unwrap();

    let mut decoder = FileDecoder::open(&path).unwrap();
    decode_to_end(&mut decoder, 8192);

    decoder.seek(0.0).unwrap();
    assert_eq!(decode_to_end(&mut decoder, 8192).len(), 4800 * 4);
}

#[test]
fn test_garbage_file_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("noise.wav");
    std::fs::write(&path, b"definitely not audio").unwrap();
    assert!(FileDecoder::open(&path).is_err());
}
