//! DSD planar → interleaved conversion
//!
//! Input is planar: `channels` equal blocks, one per channel. Output is
//! interleaved 4-byte groups: `[ch0 b0..b3][ch1 b0..b3][ch0 b4..b7]...`.
//! Bit reversal goes through a 256-entry table and byte swapping through a
//! fixed permutation, both selected once per call.

/// Bit-reversal table (`BIT_REVERSE[0b0000_0001] == 0b1000_0000`)
pub static BIT_REVERSE: [u8; 256] = build_bit_reverse();

static IDENTITY: [u8; 256] = build_identity();

const fn build_bit_reverse() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).reverse_bits();
        i += 1;
    }
    table
}

const fn build_identity() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = i as u8;
        i += 1;
    }
    table
}

const FORWARD: [usize; 4] = [0, 1, 2, 3];
const SWAPPED: [usize; 4] = [3, 2, 1, 0];

/// Bytes per channel in one interleaved group
pub const GROUP_BYTES: usize = 4;

/// Per-stream DSD bit and byte operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct DsdOps {
    /// Reverse bit order inside every byte (DSF LSB-first ↔ MSB-first)
    pub reverse_bits: bool,
    /// Reverse byte order inside every 4-byte group (32-bit little-endian words)
    pub byte_swap: bool,
}

/// Interleave `groups` groups per channel starting at group `first_group`
///
/// `src` is one planar block (`src.len() / channels` bytes per channel).
/// Returns bytes written, which is `groups * channels * 4` clamped to what
/// both buffers can hold.
pub fn interleave(
    src: &[u8],
    channels: usize,
    first_group: usize,
    groups: usize,
    dst: &mut [u8],
    ops: DsdOps,
) -> usize {
    if channels == 0 {
        return 0;
    }
    let block = src.len() / channels;
    let total_groups = block / GROUP_BYTES;
    let frame_bytes = channels * GROUP_BYTES;
    let groups = groups
        .min(total_groups.saturating_sub(first_group))
        .min(dst.len() / frame_bytes);

    let table: &[u8; 256] = if ops.reverse_bits { &BIT_REVERSE } else { &IDENTITY };
    let order = if ops.byte_swap { SWAPPED } else { FORWARD };

    for (g, frame) in dst[..groups * frame_bytes]
        .chunks_exact_mut(frame_bytes)
        .enumerate()
    {
        let src_offset = (first_group + g) * GROUP_BYTES;
        for (ch, out) in frame.chunks_exact_mut(GROUP_BYTES).enumerate() {
            let input = &src[ch * block + src_offset..ch * block + src_offset + GROUP_BYTES];
            out[0] = table[input[order[0]] as usize];
            out[1] = table[input[order[1]] as usize];
            out[2] = table[input[order[2]] as usize];
            out[3] = table[input[order[3]] as usize];
        }
    }

    groups * frame_bytes
}

/// Write the final partial group of each channel as one padded frame
///
/// Used when a planar block is not a whole number of groups per channel.
/// Positions past the block's last byte take `idle`, which is already in
/// output bit order. Returns bytes written, zero when there is no tail.
pub fn interleave_tail(src: &[u8], channels: usize, idle: u8, dst: &mut [u8], ops: DsdOps) -> usize {
    if channels == 0 {
        return 0;
    }
    let block = src.len() / channels;
    let rem = block % GROUP_BYTES;
    let frame_bytes = channels * GROUP_BYTES;
    if rem == 0 || dst.len() < frame_bytes {
        return 0;
    }
    let start = block - rem;

    let table: &[u8; 256] = if ops.reverse_bits { &BIT_REVERSE } else { &IDENTITY };
    let order = if ops.byte_swap { SWAPPED } else { FORWARD };

    for (ch, out) in dst[..frame_bytes].chunks_exact_mut(GROUP_BYTES).enumerate() {
        let input = &src[ch * block + start..ch * block + block];
        for (o, &i) in out.iter_mut().zip(order.iter()) {
            *o = input.get(i).map_or(idle, |&b| table[b as usize]);
        }
    }

    frame_bytes
}
