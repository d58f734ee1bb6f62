//! 24-bit packing: 32-bit containers down to tight 3-byte samples

use super::LANES;

/// Position of the three significant bytes inside each 4-byte container
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum S24Alignment {
    /// Bytes 0..3 significant, byte 3 padding or sign
    Low,
    /// Bytes 1..4 significant, byte 0 padding
    High,
}

impl S24Alignment {
    #[inline]
    fn offset(self) -> usize {
        match self {
            S24Alignment::Low => 0,
            S24Alignment::High => 1,
        }
    }
}

/// Pack `min(src.len() / 4, dst.len() / 3)` samples
///
/// Full lane blocks of eight samples run a fixed-count loop; the remaining
/// zero to seven samples go through the scalar path. Returns samples packed.
pub fn pack_24(src: &[u8], dst: &mut [u8], alignment: S24Alignment) -> usize {
    let samples = (src.len() / 4).min(dst.len() / 3);
    let offset = alignment.offset();
    let blocks = samples / LANES;

    let (src_body, src_rest) = src[..samples * 4].split_at(blocks * LANES * 4);
    let (dst_body, dst_rest) = dst[..samples * 3].split_at_mut(blocks * LANES * 3);

    for (s, d) in src_body
        .chunks_exact(LANES * 4)
        .zip(dst_body.chunks_exact_mut(LANES * 3))
    {
        pack_block(s, d, offset);
    }

    for (s, d) in src_rest.chunks_exact(4).zip(dst_rest.chunks_exact_mut(3)) {
        d.copy_from_slice(&s[offset..offset + 3]);
    }

    samples
}

#[inline(always)]
fn pack_block(src: &[u8], dst: &mut [u8], offset: usize) {
    for lane in 0..LANES {
        let s = lane * 4 + offset;
        let d = lane * 3;
        dst[d] = src[s];
        dst[d + 1] = src[s + 1];
        dst[d + 2] = src[s + 2];
    }
}
