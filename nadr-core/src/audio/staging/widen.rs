//! 16-bit ↔ 32-bit container conversion

use super::{S24Alignment, LANES};

/// 16-bit samples into 32-bit containers, sample in the upper half
///
/// `[lo, hi]` becomes `[0, 0, lo, hi]`. Returns samples converted.
pub fn widen_16_to_32_msb(src: &[u8], dst: &mut [u8]) -> usize {
    convert(src, dst, 2, 4, |s, d| {
        d[0] = 0;
        d[1] = 0;
        d[2] = s[0];
        d[3] = s[1];
    })
}

/// 16-bit samples into 32-bit containers, sign-extended in the lower half
///
/// `[lo, hi]` becomes `[lo, hi, s, s]` where `s` replicates the sign bit.
pub fn widen_16_to_32_sign_extend(src: &[u8], dst: &mut [u8]) -> usize {
    convert(src, dst, 2, 4, |s, d| {
        let sign = ((s[1] as i8) >> 7) as u8;
        d[0] = s[0];
        d[1] = s[1];
        d[2] = sign;
        d[3] = sign;
    })
}

/// 32-bit containers down to 16-bit, keeping the two most significant
/// bytes of the sample
///
/// High-aligned samples keep container bytes 2..4; low-aligned 24-bit
/// samples keep bytes 1..3.
pub fn narrow_32_to_16(src: &[u8], dst: &mut [u8], alignment: S24Alignment) -> usize {
    let top = match alignment {
        S24Alignment::High => 2,
        S24Alignment::Low => 1,
    };
    convert(src, dst, 4, 2, |s, d| {
        d[0] = s[top];
        d[1] = s[top + 1];
    })
}

/// Lane blocks of eight samples followed by a scalar remainder
#[inline(always)]
fn convert<F>(src: &[u8], dst: &mut [u8], in_size: usize, out_size: usize, sample: F) -> usize
where
    F: Fn(&[u8], &mut [u8]),
{
    let samples = (src.len() / in_size).min(dst.len() / out_size);
    let blocks = samples / LANES;

    let (src_body, src_rest) = src[..samples * in_size].split_at(blocks * LANES * in_size);
    let (dst_body, dst_rest) = dst[..samples * out_size].split_at_mut(blocks * LANES * out_size);

    for (s, d) in src_body
        .chunks_exact(LANES * in_size)
        .zip(dst_body.chunks_exact_mut(LANES * out_size))
    {
        for lane in 0..LANES {
            sample(
                &s[lane * in_size..(lane + 1) * in_size],
                &mut d[lane * out_size..(lane + 1) * out_size],
            );
        }
    }

    for (s, d) in src_rest
        .chunks_exact(in_size)
        .zip(dst_rest.chunks_exact_mut(out_size))
    {
        sample(s, d);
    }

    samples
}
